//! Network Endpoint (§4.4): one UDP socket, one decode/dispatch/encode turn
//! per datagram. No reassembly — a datagram is a packet.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, warn};

use crate::codec::space_packet;
use crate::dispatcher;
use crate::state::PduStateManager;

/// Largest UDP payload this endpoint will attempt to decode; larger
/// datagrams are dropped with a log line rather than a response (§4.4).
const MAX_DATAGRAM: usize = 65_527;

/// Runs the endpoint until `shutdown` is set. `socket` should have a read
/// timeout configured so the shutdown flag is re-checked periodically
/// instead of blocking forever in `recv_from` (§5's cancellation model).
pub fn run(socket: &UdpSocket, state: &PduStateManager, shutdown: &AtomicBool) {
    let mut buffer = [0u8; MAX_DATAGRAM];
    while !shutdown.load(Ordering::Relaxed) {
        let (len, source) = match socket.recv_from(&mut buffer) {
            Ok(received) => received,
            Err(err) if is_poll_timeout(&err) => continue,
            Err(err) => {
                error!("network endpoint recv failed: {err}");
                continue;
            }
        };

        let datagram = &buffer[..len];
        let (apid, decoded) = match space_packet::decode_command(datagram) {
            Ok(decoded) => decoded,
            Err(_) => {
                warn!("dropped unparseable datagram ({len} bytes) from {source}");
                continue;
            }
        };

        let Some(response) = dispatcher::dispatch(state, apid, decoded) else {
            debug!("ignored command for unknown apid {apid:#06x} from {source}");
            continue;
        };

        let encoded = space_packet::encode_response(apid, 0, &response);
        if let Err(err) = socket.send_to(&encoded, source) {
            error!("network endpoint send to {source} failed: {err}");
        }
    }
}

fn is_poll_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::message::CommandPayload;
    use crate::codec::{Request, ResponsePayload};
    use crate::types::{MessageId, APID_NOMINAL};
    use std::net::UdpSocket;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn heartbeat_roundtrips_through_the_running_endpoint() {
        let state = Arc::new(PduStateManager::new());
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        server.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
        let server_addr = server.local_addr().unwrap();

        let shutdown = Arc::new(AtomicBool::new(false));
        let endpoint_state = state.clone();
        let endpoint_shutdown = shutdown.clone();
        let endpoint_socket = server.try_clone().unwrap();
        let handle = thread::spawn(move || run(&endpoint_socket, &endpoint_state, &endpoint_shutdown));

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let request = Request {
            message_id: MessageId::ObcHeartBeat,
            logical_unit_id: 0,
            payload: CommandPayload::HeartBeat { counter: 0xABCD },
        };
        client.send_to(&space_packet::encode_command(APID_NOMINAL, 0, &request), server_addr).unwrap();

        let mut reply_buf = [0u8; MAX_DATAGRAM];
        let (reply_len, _) = client.recv_from(&mut reply_buf).unwrap();
        let (_, reply) = space_packet::decode_response(&reply_buf[..reply_len]).unwrap();
        assert_eq!(
            reply.payload,
            ResponsePayload::HeartBeat { echoed_counter: 0xABCD, pdu_counter: 0xABCD }
        );

        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }

    #[test]
    fn truncated_datagram_still_gets_an_error_response_and_bumps_the_counter() {
        let state = Arc::new(PduStateManager::new());
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        server.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
        let server_addr = server.local_addr().unwrap();

        let shutdown = Arc::new(AtomicBool::new(false));
        let endpoint_state = state.clone();
        let endpoint_shutdown = shutdown.clone();
        let endpoint_socket = server.try_clone().unwrap();
        let handle = thread::spawn(move || run(&endpoint_socket, &endpoint_state, &endpoint_shutdown));

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let request = Request {
            message_id: MessageId::ObcHeartBeat,
            logical_unit_id: 0,
            payload: CommandPayload::HeartBeat { counter: 7 },
        };
        let mut encoded = space_packet::encode_command(APID_NOMINAL, 0, &request);
        encoded.truncate(encoded.len() - 1); // header decodes, declared length no longer matches
        client.send_to(&encoded, server_addr).unwrap();

        let mut reply_buf = [0u8; MAX_DATAGRAM];
        let (reply_len, _) = client.recv_from(&mut reply_buf).unwrap();
        let (_, reply) = space_packet::decode_response(&reply_buf[..reply_len]).unwrap();
        assert_eq!(reply.status, crate::error::PduError::MalformedFrame.status_code());

        let status_request = Request { message_id: MessageId::GetPduStatus, logical_unit_id: 0, payload: CommandPayload::Empty };
        client.send_to(&space_packet::encode_command(APID_NOMINAL, 1, &status_request), server_addr).unwrap();
        let (reply_len, _) = client.recv_from(&mut reply_buf).unwrap();
        let (_, status_reply) = space_packet::decode_response(&reply_buf[..reply_len]).unwrap();
        match status_reply.payload {
            ResponsePayload::Status { checksum_failed, .. } => assert_eq!(checksum_failed, 1),
            other => panic!("unexpected payload {other:?}"),
        }

        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }
}
