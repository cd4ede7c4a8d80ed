//! CCSDS-style Space Packet framing for the datagram transport (§4.1).

use super::message::{self, Request, Response};
use crate::error::PduError;

const PRIMARY_HEADER_LEN: usize = 6;

/// The fields of the 6-octet primary header this build populates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PrimaryHeader {
    version: u8,
    is_command: bool,
    secondary_header_flag: bool,
    apid: u16,
    sequence_count: u16,
}

impl PrimaryHeader {
    fn encode(&self, buf: &mut Vec<u8>, packet_data_length: u16) {
        let mut octet01 = ((self.version & 0x07) as u16) << 13;
        if self.is_command {
            octet01 |= 1 << 12;
        }
        if self.secondary_header_flag {
            octet01 |= 1 << 11;
        }
        octet01 |= self.apid & 0x07FF;
        buf.extend_from_slice(&octet01.to_be_bytes());

        // Unsegmented grouping (0b11), the only value this build produces or accepts.
        let octet23 = (0b11u16 << 14) | (self.sequence_count & 0x3FFF);
        buf.extend_from_slice(&octet23.to_be_bytes());

        buf.extend_from_slice(&packet_data_length.to_be_bytes());
    }

    fn decode(buf: &[u8]) -> Result<(Self, u16), PduError> {
        if buf.len() < PRIMARY_HEADER_LEN {
            return Err(PduError::MalformedFrame);
        }
        let octet01 = u16::from_be_bytes([buf[0], buf[1]]);
        let octet23 = u16::from_be_bytes([buf[2], buf[3]]);
        let packet_data_length = u16::from_be_bytes([buf[4], buf[5]]);
        let header = PrimaryHeader {
            version: ((octet01 >> 13) & 0x07) as u8,
            is_command: (octet01 & (1 << 12)) != 0,
            secondary_header_flag: (octet01 & (1 << 11)) != 0,
            apid: octet01 & 0x07FF,
            sequence_count: octet23 & 0x3FFF,
        };
        Ok((header, packet_data_length))
    }
}

/// Encodes `request` as a telecommand Space Packet addressed to `apid`.
pub fn encode_command(apid: u16, sequence_count: u16, request: &Request) -> Vec<u8> {
    let mut payload = vec![request.message_id as u8, request.logical_unit_id];
    request.payload.encode(&mut payload);

    let header = PrimaryHeader {
        version: 0,
        is_command: true,
        secondary_header_flag: false,
        apid,
        sequence_count,
    };
    let mut buf = Vec::with_capacity(PRIMARY_HEADER_LEN + payload.len());
    header.encode(&mut buf, payload.len().saturating_sub(1) as u16);
    buf.extend_from_slice(&payload);
    buf
}

/// Decodes a received datagram into its APID and the request it carries.
///
/// Only a header too short to even hold the 6-octet primary header (so no
/// APID can be recovered at all) fails outright with a bare `Err`. Once the
/// primary header itself has decoded, `header.apid` is known and this
/// always returns `Ok` from that point on: a declared `packet_data_length`
/// that doesn't match the bytes actually present, or a payload too short to
/// hold a Message ID/Logical Unit ID pair, still carries the recovered APID
/// with a `(0, 0, MalformedFrame)` placeholder id pair, so the caller can
/// route it through the dispatcher and get a real telemetry error response
/// with the counter bump §4.1/§7 require rather than silently dropping it.
/// A malformed or unrecognized *payload* (header and id octets both fine)
/// returns the APID plus whatever id octets were present instead.
pub fn decode_command(buf: &[u8]) -> Result<(u16, Result<Request, (u8, u8, PduError)>), PduError> {
    let (header, packet_data_length) = PrimaryHeader::decode(buf)?;
    let total_len = PRIMARY_HEADER_LEN + packet_data_length as usize + 1;
    if buf.len() < total_len {
        return Ok((header.apid, Err((0, 0, PduError::MalformedFrame))));
    }
    let payload = &buf[PRIMARY_HEADER_LEN..total_len];
    if payload.len() < 2 {
        return Ok((header.apid, Err((0, 0, PduError::MalformedFrame))));
    }
    let message_id_raw = payload[0];
    let logical_unit_id = payload[1];
    let body = &payload[2..];
    let request = match message::decode_command_payload(message_id_raw, body) {
        Ok((message_id, command_payload)) => Ok(Request {
            message_id,
            logical_unit_id,
            payload: command_payload,
        }),
        Err(err) => Err((message_id_raw, logical_unit_id, err)),
    };
    Ok((header.apid, request))
}

/// Encodes `response` as a telemetry Space Packet from `apid`.
pub fn encode_response(apid: u16, sequence_count: u16, response: &Response) -> Vec<u8> {
    let mut payload = vec![response.message_id_raw, response.logical_unit_id, response.status];
    response.payload.encode(&mut payload);

    let header = PrimaryHeader {
        version: 0,
        is_command: false,
        secondary_header_flag: false,
        apid,
        sequence_count,
    };
    let mut buf = Vec::with_capacity(PRIMARY_HEADER_LEN + payload.len());
    header.encode(&mut buf, payload.len().saturating_sub(1) as u16);
    buf.extend_from_slice(&payload);
    buf
}

/// Decodes a telemetry Space Packet. Used by OBC-side tooling and by the
/// codec round-trip tests; the PDU endpoint itself only ever encodes responses.
pub fn decode_response(buf: &[u8]) -> Result<(u16, Response), PduError> {
    let (header, packet_data_length) = PrimaryHeader::decode(buf)?;
    let total_len = PRIMARY_HEADER_LEN + packet_data_length as usize + 1;
    if buf.len() < total_len {
        return Err(PduError::MalformedFrame);
    }
    let payload = &buf[PRIMARY_HEADER_LEN..total_len];
    if payload.len() < 3 {
        return Err(PduError::MalformedFrame);
    }
    let message_id_raw = payload[0];
    let logical_unit_id = payload[1];
    let status = payload[2];
    let response_payload = message::decode_response_payload(message_id_raw, &payload[3..])?;
    Ok((
        header.apid,
        Response {
            message_id_raw,
            logical_unit_id,
            status,
            payload: response_payload,
        },
    ))
}
