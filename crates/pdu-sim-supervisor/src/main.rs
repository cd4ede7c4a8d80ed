//! Supervisor binary: parses the CLI surface, constructs the state store,
//! starts the selected endpoints and (in emulator mode) the Hardware
//! Projector, and runs them until a termination signal arrives.

use std::net::UdpSocket;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use log::{error, info, warn};

use pdu_sim_core::types::APID_NOMINAL;
use pdu_sim_core::{net_endpoint, projector, serial_endpoint, PduStateManager};
use pdu_sim_linux::{I2cExpanderBank, Rs422Port};

/// How long the supervisor waits for endpoint threads to notice shutdown
/// and return before giving up and exiting anyway (§4.7).
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Poll interval the Network Endpoint uses to re-check the shutdown flag.
const SOCKET_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum RunMode {
    /// No hardware: endpoints run, the Hardware Projector does not.
    Simulator,
    /// Also drives the MCP23017 expanders and samples the ADC bus.
    Emulator,
}

#[derive(Parser, Debug)]
#[command(name = "pdu-sim-supervisor", about = "Dual-PDU command/telemetry simulator and GPIO emulator")]
struct Cli {
    #[arg(long, value_enum, default_value = "simulator")]
    mode: RunMode,

    /// Bind address for the Network Endpoint's UDP socket.
    #[arg(long, default_value = "127.0.0.1")]
    tcp_ip: String,

    /// Bind port for the Network Endpoint's UDP socket.
    #[arg(long, default_value_t = 5004)]
    tcp_port: u16,

    /// RS422 device path. The Serial Endpoint is enabled only if this is set.
    #[arg(long)]
    rs422_port: Option<String>,

    #[arg(long, default_value_t = 115_200)]
    rs422_baud: u32,

    /// Disable the Serial Endpoint even if `--rs422-port` is set.
    #[arg(long)]
    no_rs422: bool,

    /// I2C bus device node used by the emulator's GPIO driver.
    #[arg(long, default_value = "/dev/i2c-1")]
    i2c_bus: String,

    /// Hardware Projector cadence, in Hz. Ignored in simulator mode.
    #[arg(long, default_value_t = 10)]
    projector_hz: u32,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(()) => ExitCode::FAILURE,
    }
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

fn run(cli: &Cli) -> Result<(), ()> {
    let state = Arc::new(PduStateManager::new());
    let shutdown = Arc::new(AtomicBool::new(false));
    register_signal_handlers(&shutdown)?;

    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    handles.push(spawn_network_endpoint(cli, &state, &shutdown)?);

    if let Some(path) = cli.rs422_port.as_deref().filter(|_| !cli.no_rs422) {
        handles.push(spawn_serial_endpoint(path, cli.rs422_baud, &state, &shutdown)?);
    } else if cli.rs422_port.is_some() && cli.no_rs422 {
        info!("--rs422-port given but --no-rs422 set, serial endpoint disabled");
    }

    if cli.mode == RunMode::Emulator {
        handles.push(spawn_projector(cli, &state, &shutdown)?);
    }

    info!("pdu-sim-supervisor running, send SIGINT/SIGTERM to shut down");
    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }

    join_with_grace_period(handles);
    info!("shutdown complete");
    Ok(())
}

fn register_signal_handlers(shutdown: &Arc<AtomicBool>) -> Result<(), ()> {
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        if let Err(err) = signal_hook::flag::register(signal, shutdown.clone()) {
            error!("failed to register signal handler for {signal}: {err}");
            return Err(());
        }
    }
    Ok(())
}

fn spawn_network_endpoint(
    cli: &Cli,
    state: &Arc<PduStateManager>,
    shutdown: &Arc<AtomicBool>,
) -> Result<JoinHandle<()>, ()> {
    let addr = (cli.tcp_ip.as_str(), cli.tcp_port);
    let socket = UdpSocket::bind(addr).map_err(|err| {
        error!("failed to bind network endpoint on {}:{}: {err}", cli.tcp_ip, cli.tcp_port);
    })?;
    socket.set_read_timeout(Some(SOCKET_POLL)).expect("valid timeout");
    info!("network endpoint bound to {}:{}", cli.tcp_ip, cli.tcp_port);

    let state = state.clone();
    let shutdown = shutdown.clone();
    Ok(thread::spawn(move || net_endpoint::run(&socket, &state, &shutdown)))
}

fn spawn_serial_endpoint(
    path: &str,
    baud: u32,
    state: &Arc<PduStateManager>,
    shutdown: &Arc<AtomicBool>,
) -> Result<JoinHandle<()>, ()> {
    let transport = Rs422Port::open(path, baud).map_err(|err| {
        error!("failed to open serial device {path}: {err}");
    })?;
    info!("serial endpoint opened on {path} at {baud} baud");

    let state = state.clone();
    let shutdown = shutdown.clone();
    let reopen_path = path.to_string();
    Ok(thread::spawn(move || {
        let reopen = move || Rs422Port::open(&reopen_path, baud);
        // The serial framing carries no APID of its own; this link is wired
        // to the nominal unit (APID 0x65).
        serial_endpoint::run(transport, reopen, APID_NOMINAL, &state, &shutdown);
    }))
}

fn spawn_projector(
    cli: &Cli,
    state: &Arc<PduStateManager>,
    shutdown: &Arc<AtomicBool>,
) -> Result<JoinHandle<()>, ()> {
    let mut driver = I2cExpanderBank::open(&cli.i2c_bus).map_err(|err| {
        error!("failed to open i2c bus {}: {err}", cli.i2c_bus);
    })?;
    info!("hardware projector driving {} at {} Hz", cli.i2c_bus, cli.projector_hz);

    let state = state.clone();
    let shutdown = shutdown.clone();
    let cadence_hz = cli.projector_hz;
    Ok(thread::spawn(move || projector::run(&mut driver, &state, cadence_hz, &shutdown)))
}

fn join_with_grace_period(mut handles: Vec<JoinHandle<()>>) {
    let deadline = Instant::now() + SHUTDOWN_GRACE;
    while Instant::now() < deadline && handles.iter().any(|h| !h.is_finished()) {
        thread::sleep(Duration::from_millis(50));
    }

    for handle in handles.drain(..) {
        if !handle.is_finished() {
            warn!("an endpoint thread did not exit within the shutdown grace period, joining anyway");
        }
        if handle.join().is_err() {
            warn!("an endpoint thread panicked during shutdown");
        }
    }
}
