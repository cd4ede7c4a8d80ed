//! Command dispatch (§4.2): routes a decoded request to its handler under
//! the addressed PduUnit's lock and produces the response payload.

use std::time::Instant;

use crate::codec::{CommandPayload, Request, Response, ResponsePayload};
use crate::error::PduError;
use crate::mode::Mode;
use crate::state::{PduStateManager, PduUnit, Status, UnitLineStates};
use crate::types::{self, MessageId};

/// Dispatches one decoded frame against `state`. Returns `None` when `apid`
/// belongs to neither PDU unit — unknown APIDs are ignored silently (§4.2),
/// since another process on the bus may own them.
pub fn dispatch(
    state: &PduStateManager,
    apid: u16,
    decoded: Result<Request, (u8, u8, PduError)>,
) -> Option<Response> {
    let unit_lock = state.unit(apid)?;
    let mut unit = unit_lock.lock().expect("pdu unit lock poisoned");
    unit.status.uptime_ticks = state.uptime_ticks();

    let request = match decoded {
        Ok(request) => request,
        Err((message_id_raw, logical_unit_id, err)) => {
            bump_error_counter(&mut unit.status, err);
            return Some(Response::error(message_id_raw, logical_unit_id, err));
        }
    };

    Some(handle(&mut unit, &request))
}

fn bump_error_counter(status: &mut Status, err: PduError) {
    match err {
        PduError::MalformedFrame => status.checksum_failed += 1,
        PduError::UnknownMessage => status.unknown_command += 1,
        _ => status.command_rejected += 1,
    }
}

fn reject(unit: &mut PduUnit, request: &Request, err: PduError) -> Response {
    bump_error_counter(&mut unit.status, err);
    Response::error(request.message_id as u8, request.logical_unit_id, err)
}

fn handle(unit: &mut PduUnit, request: &Request) -> Response {
    match (request.message_id, &request.payload) {
        (MessageId::ObcHeartBeat, CommandPayload::HeartBeat { counter }) => {
            unit.heartbeat.last_received_counter = *counter;
            unit.heartbeat.last_reply_counter = *counter;
            unit.heartbeat.last_exchange = Some(Instant::now());
            unit.heartbeat.missed_count = 0;
            Response::ok(
                request.message_id,
                request.logical_unit_id,
                ResponsePayload::HeartBeat { echoed_counter: *counter, pdu_counter: *counter },
            )
        }
        (MessageId::GetPduStatus, CommandPayload::Empty) => {
            let status = &unit.status;
            Response::ok(
                request.message_id,
                request.logical_unit_id,
                ResponsePayload::Status {
                    mode: status.mode.as_u8(),
                    command_rejected: status.command_rejected,
                    checksum_failed: status.checksum_failed,
                    unknown_command: status.unknown_command,
                    hardware_fault: status.hardware_fault,
                    uptime_ticks: status.uptime_ticks,
                },
            )
        }
        (MessageId::PduGoLoad, CommandPayload::Empty)
        | (MessageId::PduGoOperate, CommandPayload::Empty)
        | (MessageId::PduGoSafe, CommandPayload::Empty)
        | (MessageId::PduGoMaintenance, CommandPayload::Empty) => apply_mode_transition(unit, request),
        (MessageId::SetUnitPwLines, CommandPayload::LineMask { mask }) => {
            apply_line_command(unit, request, *mask, LineOp::Set)
        }
        (MessageId::ResetUnitPwLines, CommandPayload::LineMask { mask }) => {
            apply_line_command(unit, request, *mask, LineOp::Reset)
        }
        (MessageId::OverwriteUnitPwLines, CommandPayload::LineMask { mask }) => {
            apply_line_command(unit, request, *mask, LineOp::Overwrite)
        }
        (MessageId::GetUnitLineStates, CommandPayload::Empty) => match types::logical_unit(request.logical_unit_id) {
            Some(lu) => Response::ok(
                request.message_id,
                request.logical_unit_id,
                ResponsePayload::Mask { mask: unit.lines.mask_for(lu) },
            ),
            None => reject(unit, request, PduError::UnknownLogicalUnit),
        },
        (MessageId::GetRawMeasurements, CommandPayload::Empty) => match types::logical_unit(request.logical_unit_id) {
            Some(lu) => {
                let samples = unit.raw.0[lu.first_line..lu.first_line + lu.line_count].to_vec();
                Response::ok(request.message_id, request.logical_unit_id, ResponsePayload::RawSamples(samples))
            }
            None => reject(unit, request, PduError::UnknownLogicalUnit),
        },
        (MessageId::GetConvertedMeasurements, CommandPayload::Empty) => {
            match types::logical_unit(request.logical_unit_id) {
                Some(lu) => {
                    let samples = unit.converted.0[lu.first_line..lu.first_line + lu.line_count].to_vec();
                    Response::ok(request.message_id, request.logical_unit_id, ResponsePayload::ConvertedSamples(samples))
                }
                None => reject(unit, request, PduError::UnknownLogicalUnit),
            }
        }
        // decode_command_payload always pairs a MessageId with the one
        // CommandPayload shape it decodes for that id; no other combination
        // can reach this function.
        _ => unreachable!("message id / payload shape mismatch"),
    }
}

fn apply_mode_transition(unit: &mut PduUnit, request: &Request) -> Response {
    match unit.status.mode.transition(request.message_id) {
        Ok(new_mode) => {
            unit.status.mode = new_mode;
            if new_mode == Mode::Safe {
                unit.lines = UnitLineStates::default(); // (P3) Safe forces every line off
            }
            Response::ok(request.message_id, request.logical_unit_id, ResponsePayload::Mode { mode: new_mode.as_u8() })
        }
        Err(err) => reject(unit, request, err),
    }
}

#[derive(Clone, Copy)]
enum LineOp {
    Set,
    Reset,
    Overwrite,
}

fn apply_line_command(unit: &mut PduUnit, request: &Request, mask: u32, op: LineOp) -> Response {
    let Some(lu) = types::logical_unit(request.logical_unit_id) else {
        return reject(unit, request, PduError::UnknownLogicalUnit);
    };
    if !unit.status.mode.allows_line_transitions() {
        return reject(unit, request, PduError::LineTransitionForbidden);
    }
    for offset in 0..lu.line_count {
        let bit = (mask >> offset) & 1 != 0;
        let line = &mut unit.lines.0[lu.first_line + offset];
        *line = match op {
            LineOp::Set => *line || bit,
            LineOp::Reset => *line && !bit,
            LineOp::Overwrite => bit,
        };
    }
    Response::ok(request.message_id, request.logical_unit_id, ResponsePayload::Mask { mask: unit.lines.mask_for(lu) })
}
