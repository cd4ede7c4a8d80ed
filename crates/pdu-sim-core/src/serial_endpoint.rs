//! Serial Endpoint (§4.5): a framed byte stream over an RS422 device,
//! generic over the `SerialTransport` HAL trait so tests never touch a
//! real port. On I/O error the endpoint closes, backs off, and reopens via
//! a caller-supplied factory rather than owning device-open logic itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{error, warn};

use crate::codec::serial_frame::{self, ParseOutcome};
use crate::dispatcher;
use crate::error::PduError;
use crate::hal::SerialTransport;
use crate::state::PduStateManager;

const MIN_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);
const READ_CHUNK: usize = 512;

/// Runs the endpoint until `shutdown` is set, addressing commands to `apid`
/// (the PDU unit this physical RS422 link is wired to — the framing carries
/// no APID of its own). `reopen` rebuilds the transport after an I/O error.
pub fn run<T, F>(mut transport: T, mut reopen: F, apid: u16, state: &PduStateManager, shutdown: &AtomicBool)
where
    T: SerialTransport,
    F: FnMut() -> Result<T, PduError>,
{
    let mut buffer: Vec<u8> = Vec::new();
    let mut read_chunk = [0u8; READ_CHUNK];
    let mut backoff = MIN_BACKOFF;

    while !shutdown.load(Ordering::Relaxed) {
        match transport.read(&mut read_chunk) {
            Ok(0) => continue,
            Ok(n) => {
                buffer.extend_from_slice(&read_chunk[..n]);
                backoff = MIN_BACKOFF;
            }
            Err(err) => {
                error!("serial endpoint read failed, reopening: {err}");
                thread::sleep(backoff);
                backoff = (backoff * 2).min(MAX_BACKOFF);
                match reopen() {
                    Ok(reopened) => {
                        transport = reopened;
                        buffer.clear();
                    }
                    Err(err) => warn!("serial endpoint reopen failed, will retry: {err}"),
                }
                continue;
            }
        }

        drain_frames(&mut buffer, apid, state, &mut transport);
    }
}

fn drain_frames<T: SerialTransport>(buffer: &mut Vec<u8>, apid: u16, state: &PduStateManager, transport: &mut T) {
    loop {
        match serial_frame::parse_one(buffer) {
            ParseOutcome::Incomplete => break,
            ParseOutcome::Frame { consumed, request } => {
                if let Some(response) = dispatcher::dispatch(state, apid, request) {
                    let encoded = serial_frame::encode_response(&response);
                    if let Err(err) = transport.write(&encoded) {
                        error!("serial endpoint write failed: {err}");
                    }
                }
                buffer.drain(..consumed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::message::CommandPayload;
    use crate::codec::Request;
    use crate::types::{MessageId, APID_NOMINAL};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct LoopbackTransport {
        inbound: VecDeque<u8>,
        pub outbound: Vec<u8>,
    }

    impl SerialTransport for LoopbackTransport {
        fn read(&mut self, buffer: &mut [u8]) -> Result<usize, PduError> {
            let mut n = 0;
            while n < buffer.len() {
                match self.inbound.pop_front() {
                    Some(byte) => {
                        buffer[n] = byte;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }

        fn write(&mut self, frame: &[u8]) -> Result<(), PduError> {
            self.outbound.extend_from_slice(frame);
            Ok(())
        }
    }

    #[test]
    fn s1_heartbeat_over_serial_framing() {
        let state = PduStateManager::new();
        let request = Request {
            message_id: MessageId::ObcHeartBeat,
            logical_unit_id: 0,
            payload: CommandPayload::HeartBeat { counter: 7 },
        };
        let mut transport = LoopbackTransport::default();
        transport.inbound.extend(serial_frame::encode_command(&request));

        let mut buffer = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        let n = transport.read(&mut chunk).unwrap();
        buffer.extend_from_slice(&chunk[..n]);
        drain_frames(&mut buffer, APID_NOMINAL, &state, &mut transport);

        let response = serial_frame::decode_response(&transport.outbound).unwrap();
        assert_eq!(response.status, 0x00);
    }

    #[test]
    fn two_frames_in_one_read_are_both_dispatched() {
        let state = PduStateManager::new();
        let mut transport = LoopbackTransport::default();
        let empty = |mid| Request { message_id: mid, logical_unit_id: 0, payload: CommandPayload::Empty };
        transport.inbound.extend(serial_frame::encode_command(&empty(MessageId::GetPduStatus)));
        transport.inbound.extend(serial_frame::encode_command(&empty(MessageId::GetPduStatus)));

        let mut buffer = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        let n = transport.read(&mut chunk).unwrap();
        buffer.extend_from_slice(&chunk[..n]);
        drain_frames(&mut buffer, APID_NOMINAL, &state, &mut transport);

        assert!(buffer.is_empty());
        let mut responses = 0;
        let mut rest = transport.outbound.as_slice();
        while !rest.is_empty() {
            let frame_len = 4 + rest[3] as usize + 1;
            serial_frame::decode_response(&rest[..frame_len]).unwrap();
            rest = &rest[frame_len..];
            responses += 1;
        }
        assert_eq!(responses, 2);
    }
}
