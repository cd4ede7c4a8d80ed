//! Hardware Projector (§4.6, emulator mode only): maps modeled line states
//! onto GPIO pins and samples ADC inputs back into telemetry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::warn;

use crate::hal::GpioExpanderDriver;
use crate::state::{ConvertedMeasurements, PduStateManager, RawMeasurements, UnitLineStates};
use crate::types::{self, EXPANDER_ADDRESSES, EXPANDER_COUNT, LINE_COUNT};

/// Runs the projector loop at `cadence_hz` until `shutdown` is set.
///
/// Both PDU units' line states are projected onto the same physical pin
/// table every cycle, nominal first: the emulator has one bank of hardware
/// behind it and impersonates whichever unit the OBC currently drives (§4.6).
pub fn run<D: GpioExpanderDriver>(driver: &mut D, state: &PduStateManager, cadence_hz: u32, shutdown: &AtomicBool) {
    let period = Duration::from_secs_f64(1.0 / cadence_hz.max(1) as f64);
    configure_outputs(driver);

    while !shutdown.load(Ordering::Relaxed) {
        tick(driver, state);
        thread::sleep(period);
    }
}

fn configure_outputs<D: GpioExpanderDriver>(driver: &mut D) {
    for line in 0..LINE_COUNT {
        let (expander_index, pin) = types::line_pin_location(line);
        let address = EXPANDER_ADDRESSES[expander_index];
        if let Err(err) = driver.configure_pin_as_output(address, pin as u8) {
            warn!("failed to configure expander {address:#04x} pin {pin} as output: {err}");
        }
    }
}

fn tick<D: GpioExpanderDriver>(driver: &mut D, state: &PduStateManager) {
    for apid in [types::APID_NOMINAL, types::APID_REDUNDANT] {
        project_unit(driver, state, apid);
    }
}

fn project_unit<D: GpioExpanderDriver>(driver: &mut D, state: &PduStateManager, apid: u16) {
    let Some(unit_lock) = state.unit(apid) else { return };

    let (lines, previous_raw) = {
        let unit = unit_lock.lock().expect("pdu unit lock poisoned");
        (unit.lines, unit.raw)
    };

    let line_faults = project_lines(driver, &lines);
    let (raw, adc_faults) = sample_adc(driver, &previous_raw);
    let converted = ConvertedMeasurements::from_raw(&raw, &state.coefficients);

    let mut unit = unit_lock.lock().expect("pdu unit lock poisoned");
    unit.status.hardware_fault = unit.status.hardware_fault.saturating_add(line_faults + adc_faults);
    unit.raw = raw;
    unit.converted = converted;
}

/// Drives every wired pin to the logical NOT of its line's enable state
/// (§4.6: inverted output polarity). A write failure on one expander skips
/// the rest of that expander's pins for this cycle but does not abort the
/// others. Returns the number of expanders that faulted.
fn project_lines<D: GpioExpanderDriver>(driver: &mut D, lines: &UnitLineStates) -> u16 {
    let mut faulted = [false; EXPANDER_COUNT];
    let mut fault_count = 0u16;
    for line in 0..LINE_COUNT {
        let (expander_index, pin) = types::line_pin_location(line);
        if faulted[expander_index] {
            continue;
        }
        let address = EXPANDER_ADDRESSES[expander_index];
        if let Err(err) = driver.write_pin(address, pin as u8, !lines.0[line]) {
            warn!("expander {address:#04x} write failed, skipping it for this cycle: {err}");
            faulted[expander_index] = true;
            fault_count += 1;
        }
    }
    fault_count
}

/// Samples every instrumented channel, falling back to `previous`'s value on
/// a per-channel read failure so telemetry never regresses to zero (§4.6).
/// Returns the updated samples and the number of channels that faulted.
fn sample_adc<D: GpioExpanderDriver>(driver: &mut D, previous: &RawMeasurements) -> (RawMeasurements, u16) {
    let mut raw = *previous;
    let mut fault_count = 0u16;
    for (channel, sample) in raw.0.iter_mut().enumerate() {
        match driver.read_adc(channel) {
            Ok(value) => *sample = value,
            Err(err) => {
                warn!("adc channel {channel} read failed, keeping last-known sample: {err}");
                fault_count += 1;
            }
        }
    }
    (raw, fault_count)
}
