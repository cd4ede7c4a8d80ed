//! RS422 serial framing (§4.1): `0x55 | MessageID | LogicalUnitID | PayloadLen | Payload… | 0x55`.
//!
//! Parsing is length-prefix authoritative (Q3): the trailing `0x55` is a
//! sanity check, never a search token, so payload bytes equal to `0x55` do
//! not need escaping.

use super::message::{self, Request, Response};
use crate::error::PduError;

const DELIMITER: u8 = 0x55;
const HEADER_LEN: usize = 4; // delimiter, message id, logical unit id, payload len

/// Outcome of attempting to pull one frame out of a growing receive buffer.
pub enum ParseOutcome {
    /// Not enough bytes yet to tell; caller should read more and retry.
    Incomplete,
    /// A frame-shaped run of bytes was consumed. `consumed` bytes must be
    /// drained from the front of the buffer regardless of whether `request`
    /// succeeded, so a malformed frame is never reparsed.
    Frame {
        consumed: usize,
        request: Result<Request, (u8, u8, PduError)>,
    },
}

/// Scans `buf` for the next frame. Bytes preceding the first `0x55` are
/// reported as their own malformed frame so the caller can bump
/// `checksum-failed` and resynchronize on the following call.
pub fn parse_one(buf: &[u8]) -> ParseOutcome {
    let Some(start) = buf.iter().position(|&b| b == DELIMITER) else {
        return ParseOutcome::Incomplete;
    };
    if start > 0 {
        return ParseOutcome::Frame {
            consumed: start,
            request: Err((0, 0, PduError::MalformedFrame)),
        };
    }
    if buf.len() < HEADER_LEN {
        return ParseOutcome::Incomplete;
    }
    let message_id_raw = buf[1];
    let logical_unit_id = buf[2];
    let payload_len = buf[3] as usize;
    let total_len = HEADER_LEN + payload_len + 1;
    if buf.len() < total_len {
        return ParseOutcome::Incomplete;
    }
    let payload = &buf[HEADER_LEN..HEADER_LEN + payload_len];
    let trailing = buf[HEADER_LEN + payload_len];
    if trailing != DELIMITER {
        return ParseOutcome::Frame {
            consumed: total_len,
            request: Err((message_id_raw, logical_unit_id, PduError::MalformedFrame)),
        };
    }
    let request = match message::decode_command_payload(message_id_raw, payload) {
        Ok((message_id, command_payload)) => Ok(Request {
            message_id,
            logical_unit_id,
            payload: command_payload,
        }),
        Err(err) => Err((message_id_raw, logical_unit_id, err)),
    };
    ParseOutcome::Frame { consumed: total_len, request }
}

/// Encodes `request` as one RS422 frame.
pub fn encode_command(request: &Request) -> Vec<u8> {
    let mut payload = Vec::new();
    request.payload.encode(&mut payload);

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len() + 1);
    buf.push(DELIMITER);
    buf.push(request.message_id as u8);
    buf.push(request.logical_unit_id);
    buf.push(payload.len() as u8);
    buf.extend_from_slice(&payload);
    buf.push(DELIMITER);
    buf
}

/// Encodes `response` as one RS422 frame.
pub fn encode_response(response: &Response) -> Vec<u8> {
    let mut payload = vec![response.status];
    response.payload.encode(&mut payload);

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len() + 1);
    buf.push(DELIMITER);
    buf.push(response.message_id_raw);
    buf.push(response.logical_unit_id);
    buf.push(payload.len() as u8);
    buf.extend_from_slice(&payload);
    buf.push(DELIMITER);
    buf
}

/// Decodes one complete response frame. Used by OBC-side tooling and the
/// codec round-trip tests; the PDU endpoint itself only ever encodes responses.
pub fn decode_response(buf: &[u8]) -> Result<Response, PduError> {
    if buf.len() < HEADER_LEN + 1 || buf[0] != DELIMITER {
        return Err(PduError::MalformedFrame);
    }
    let message_id_raw = buf[1];
    let logical_unit_id = buf[2];
    let payload_len = buf[3] as usize;
    let total_len = HEADER_LEN + payload_len + 1;
    if buf.len() != total_len || buf[total_len - 1] != DELIMITER {
        return Err(PduError::MalformedFrame);
    }
    let payload = &buf[HEADER_LEN..HEADER_LEN + payload_len];
    let status = *payload.first().ok_or(PduError::MalformedFrame)?;
    let response_payload = message::decode_response_payload(message_id_raw, &payload[1..])?;
    Ok(Response {
        message_id_raw,
        logical_unit_id,
        status,
        payload: response_payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::message::{CommandPayload, ResponsePayload};
    use crate::types::MessageId;

    #[test]
    fn command_frame_roundtrips() {
        let request = Request {
            message_id: MessageId::SetUnitPwLines,
            logical_unit_id: 5,
            payload: CommandPayload::LineMask { mask: 0x0FFF },
        };
        let encoded = encode_command(&request);
        match parse_one(&encoded) {
            ParseOutcome::Frame { consumed, request: decoded } => {
                assert_eq!(consumed, encoded.len());
                assert_eq!(decoded.unwrap(), request);
            }
            ParseOutcome::Incomplete => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn response_frame_roundtrips() {
        let response = Response::ok(MessageId::ObcHeartBeat, 0, ResponsePayload::HeartBeat {
            echoed_counter: 0x1234,
            pdu_counter: 1,
        });
        let encoded = encode_response(&response);
        let decoded = decode_response(&encoded).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn partial_frame_is_reported_incomplete() {
        let request = Request {
            message_id: MessageId::ObcHeartBeat,
            logical_unit_id: 0,
            payload: CommandPayload::HeartBeat { counter: 7 },
        };
        let encoded = encode_command(&request);
        assert!(matches!(parse_one(&encoded[..encoded.len() - 1]), ParseOutcome::Incomplete));
    }

    #[test]
    fn leading_garbage_is_skipped_one_frame_at_a_time() {
        let mut buf = vec![0xAA, 0xBB];
        buf.extend_from_slice(&encode_command(&Request {
            message_id: MessageId::GetPduStatus,
            logical_unit_id: 0,
            payload: CommandPayload::Empty,
        }));
        match parse_one(&buf) {
            ParseOutcome::Frame { consumed, request } => {
                assert_eq!(consumed, 2);
                assert_eq!(request.unwrap_err().2, PduError::MalformedFrame);
            }
            ParseOutcome::Incomplete => panic!("expected garbage to be reported"),
        }
    }

    #[test]
    fn wrong_trailing_delimiter_is_malformed_but_still_consumes_the_frame() {
        let mut encoded = encode_command(&Request {
            message_id: MessageId::ObcHeartBeat,
            logical_unit_id: 0,
            payload: CommandPayload::HeartBeat { counter: 7 },
        });
        let last = encoded.len() - 1;
        encoded[last] = 0x00;
        match parse_one(&encoded) {
            ParseOutcome::Frame { consumed, request } => {
                assert_eq!(consumed, encoded.len());
                assert_eq!(request.unwrap_err().2, PduError::MalformedFrame);
            }
            ParseOutcome::Incomplete => panic!("expected a complete (if malformed) frame"),
        }
    }
}
