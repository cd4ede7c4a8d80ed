//! Command/response payload schemas shared by both wire framings (§4.1).
//!
//! The schemas here are framing-agnostic: they cover only the bytes that
//! follow the Message ID and Logical Unit ID fields, which each framing
//! module owns and serializes itself.

use crate::error::PduError;
use crate::types::MessageId;

/// The command-specific parameters of a request, beyond MessageID/LogicalUnitID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPayload {
    HeartBeat { counter: u16 },
    LineMask { mask: u32 },
    Empty,
}

impl CommandPayload {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            CommandPayload::HeartBeat { counter } => buf.extend_from_slice(&counter.to_be_bytes()),
            CommandPayload::LineMask { mask } => buf.extend_from_slice(&mask.to_be_bytes()),
            CommandPayload::Empty => {}
        }
    }

    fn decode(message_id: MessageId, body: &[u8]) -> Result<Self, PduError> {
        use MessageId::*;
        match message_id {
            ObcHeartBeat => {
                let bytes: [u8; 2] = body.try_into().map_err(|_| PduError::MalformedFrame)?;
                Ok(CommandPayload::HeartBeat { counter: u16::from_be_bytes(bytes) })
            }
            SetUnitPwLines | ResetUnitPwLines | OverwriteUnitPwLines => {
                let bytes: [u8; 4] = body.try_into().map_err(|_| PduError::MalformedFrame)?;
                Ok(CommandPayload::LineMask { mask: u32::from_be_bytes(bytes) })
            }
            GetPduStatus | PduGoLoad | PduGoOperate | PduGoSafe | PduGoMaintenance
            | GetUnitLineStates | GetRawMeasurements | GetConvertedMeasurements => {
                if body.is_empty() {
                    Ok(CommandPayload::Empty)
                } else {
                    Err(PduError::MalformedFrame)
                }
            }
        }
    }
}

/// The command-specific parameters of a response, beyond MessageID/LogicalUnitID/status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePayload {
    HeartBeat {
        echoed_counter: u16,
        pdu_counter: u16,
    },
    Status {
        mode: u8,
        command_rejected: u16,
        checksum_failed: u16,
        unknown_command: u16,
        hardware_fault: u16,
        uptime_ticks: u32,
    },
    Mode {
        mode: u8,
    },
    Mask {
        mask: u32,
    },
    RawSamples(Vec<u16>),
    ConvertedSamples(Vec<i32>),
    /// Carried by error responses whose Message ID was not recognized, or by
    /// any response that has nothing beyond the status byte.
    None,
}

impl ResponsePayload {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            ResponsePayload::HeartBeat { echoed_counter, pdu_counter } => {
                buf.extend_from_slice(&echoed_counter.to_be_bytes());
                buf.extend_from_slice(&pdu_counter.to_be_bytes());
            }
            ResponsePayload::Status {
                mode,
                command_rejected,
                checksum_failed,
                unknown_command,
                hardware_fault,
                uptime_ticks,
            } => {
                buf.push(*mode);
                buf.extend_from_slice(&command_rejected.to_be_bytes());
                buf.extend_from_slice(&checksum_failed.to_be_bytes());
                buf.extend_from_slice(&unknown_command.to_be_bytes());
                buf.extend_from_slice(&hardware_fault.to_be_bytes());
                buf.extend_from_slice(&uptime_ticks.to_be_bytes());
            }
            ResponsePayload::Mode { mode } => buf.push(*mode),
            ResponsePayload::Mask { mask } => buf.extend_from_slice(&mask.to_be_bytes()),
            ResponsePayload::RawSamples(samples) => {
                buf.push(samples.len() as u8);
                for sample in samples {
                    buf.extend_from_slice(&sample.to_be_bytes());
                }
            }
            ResponsePayload::ConvertedSamples(samples) => {
                buf.push(samples.len() as u8);
                for sample in samples {
                    buf.extend_from_slice(&sample.to_be_bytes());
                }
            }
            ResponsePayload::None => {}
        }
    }

    fn decode(message_id: MessageId, body: &[u8]) -> Result<Self, PduError> {
        use MessageId::*;
        match message_id {
            ObcHeartBeat => {
                if body.len() != 4 {
                    return Err(PduError::MalformedFrame);
                }
                Ok(ResponsePayload::HeartBeat {
                    echoed_counter: u16::from_be_bytes([body[0], body[1]]),
                    pdu_counter: u16::from_be_bytes([body[2], body[3]]),
                })
            }
            GetPduStatus => {
                if body.len() != 13 {
                    return Err(PduError::MalformedFrame);
                }
                Ok(ResponsePayload::Status {
                    mode: body[0],
                    command_rejected: u16::from_be_bytes([body[1], body[2]]),
                    checksum_failed: u16::from_be_bytes([body[3], body[4]]),
                    unknown_command: u16::from_be_bytes([body[5], body[6]]),
                    hardware_fault: u16::from_be_bytes([body[7], body[8]]),
                    uptime_ticks: u32::from_be_bytes([body[9], body[10], body[11], body[12]]),
                })
            }
            PduGoLoad | PduGoOperate | PduGoSafe | PduGoMaintenance => {
                if body.len() != 1 {
                    return Err(PduError::MalformedFrame);
                }
                Ok(ResponsePayload::Mode { mode: body[0] })
            }
            SetUnitPwLines | ResetUnitPwLines | OverwriteUnitPwLines | GetUnitLineStates => {
                let bytes: [u8; 4] = body.try_into().map_err(|_| PduError::MalformedFrame)?;
                Ok(ResponsePayload::Mask { mask: u32::from_be_bytes(bytes) })
            }
            GetRawMeasurements => {
                let count = *body.first().ok_or(PduError::MalformedFrame)? as usize;
                let samples = &body[1..];
                if samples.len() != count * 2 {
                    return Err(PduError::MalformedFrame);
                }
                Ok(ResponsePayload::RawSamples(
                    samples.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect(),
                ))
            }
            GetConvertedMeasurements => {
                let count = *body.first().ok_or(PduError::MalformedFrame)? as usize;
                let samples = &body[1..];
                if samples.len() != count * 4 {
                    return Err(PduError::MalformedFrame);
                }
                Ok(ResponsePayload::ConvertedSamples(
                    samples
                        .chunks_exact(4)
                        .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                        .collect(),
                ))
            }
        }
    }
}

/// A fully decoded request, independent of framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub message_id: MessageId,
    pub logical_unit_id: u8,
    pub payload: CommandPayload,
}

/// A fully decoded response, independent of framing.
///
/// `message_id_raw` is the raw octet rather than `MessageId` so an error
/// response can still echo back a Message ID the decoder did not recognize
/// (the echo rule in §4.2 applies byte-for-byte even to a rejected frame).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub message_id_raw: u8,
    pub logical_unit_id: u8,
    pub status: u8,
    pub payload: ResponsePayload,
}

impl Response {
    pub fn ok(message_id: MessageId, logical_unit_id: u8, payload: ResponsePayload) -> Self {
        Self {
            message_id_raw: message_id as u8,
            logical_unit_id,
            status: 0x00,
            payload,
        }
    }

    pub fn error(message_id_raw: u8, logical_unit_id: u8, error: PduError) -> Self {
        Self {
            message_id_raw,
            logical_unit_id,
            status: error.status_code(),
            payload: ResponsePayload::None,
        }
    }
}

/// Decodes the params following MessageID/LogicalUnitID into a `Request`.
/// Both framing modules call this once they have split off their own header
/// fields.
pub fn decode_command_payload(message_id_raw: u8, body: &[u8]) -> Result<(MessageId, CommandPayload), PduError> {
    let message_id = MessageId::from_u8(message_id_raw).ok_or(PduError::UnknownMessage)?;
    let payload = CommandPayload::decode(message_id, body)?;
    Ok((message_id, payload))
}

/// Decodes the params following MessageID/LogicalUnitID/status into a
/// `ResponsePayload`. An unrecognized Message ID decodes to `None` provided
/// there is nothing beyond the status byte, matching how this build encodes
/// its own error responses.
pub fn decode_response_payload(message_id_raw: u8, body: &[u8]) -> Result<ResponsePayload, PduError> {
    match MessageId::from_u8(message_id_raw) {
        Some(message_id) => ResponsePayload::decode(message_id, body),
        None if body.is_empty() => Ok(ResponsePayload::None),
        None => Err(PduError::MalformedFrame),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_command_payload_roundtrips() {
        let payload = CommandPayload::HeartBeat { counter: 0x1234 };
        let mut buf = Vec::new();
        payload.encode(&mut buf);
        let (message_id, decoded) =
            decode_command_payload(MessageId::ObcHeartBeat as u8, &buf).unwrap();
        assert_eq!(message_id, MessageId::ObcHeartBeat);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn empty_command_payload_rejects_trailing_bytes() {
        let err = decode_command_payload(MessageId::GetPduStatus as u8, &[0x00]).unwrap_err();
        assert_eq!(err, PduError::MalformedFrame);
    }

    #[test]
    fn unknown_message_id_is_rejected_before_payload_is_inspected() {
        let err = decode_command_payload(0xFE, &[]).unwrap_err();
        assert_eq!(err, PduError::UnknownMessage);
    }

    #[test]
    fn status_response_payload_roundtrips() {
        let payload = ResponsePayload::Status {
            mode: 2,
            command_rejected: 1,
            checksum_failed: 2,
            unknown_command: 3,
            hardware_fault: 4,
            uptime_ticks: 123456,
        };
        let mut buf = Vec::new();
        payload.encode(&mut buf);
        let decoded = ResponsePayload::decode(MessageId::GetPduStatus, &buf).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn measurement_response_payload_roundtrips() {
        let payload = ResponsePayload::RawSamples(vec![10, 20, 30]);
        let mut buf = Vec::new();
        payload.encode(&mut buf);
        assert_eq!(buf[0], 3);
        let decoded = ResponsePayload::decode(MessageId::GetRawMeasurements, &buf).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn unrecognized_message_id_response_decodes_to_none_when_bodyless() {
        let decoded = decode_response_payload(0xFE, &[]).unwrap();
        assert_eq!(decoded, ResponsePayload::None);
    }
}
