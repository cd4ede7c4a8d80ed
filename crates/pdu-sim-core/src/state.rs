//! In-memory dual-PDU state (§3) and the lock that guards it (§5).

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::mode::Mode;
use crate::types::{self, ChannelCoefficients, CHANNEL_COUNT, LINE_COUNT};

/// Last-exchange bookkeeping for the OBC heartbeat command.
#[derive(Debug, Clone, Copy)]
pub struct Heartbeat {
    pub last_received_counter: u16,
    pub last_reply_counter: u16,
    pub last_exchange: Option<Instant>,
    pub missed_count: u32,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            last_received_counter: 0,
            last_reply_counter: 0,
            last_exchange: None,
            missed_count: 0,
        }
    }
}

/// Operating mode plus the error counters and uptime ticks of §3/§4.2.
#[derive(Debug, Clone, Copy, Default)]
pub struct Status {
    pub mode: Mode,
    pub command_rejected: u16,
    pub checksum_failed: u16,
    pub unknown_command: u16,
    pub hardware_fault: u16,
    /// Refreshed from `PduStateManager::uptime_ticks` on every dispatched
    /// command (see `dispatcher::dispatch`), not incremented in place.
    pub uptime_ticks: u32,
}

/// The 71 switchable power lines. `true` means the line should be delivering
/// power (I1: always exactly `LINE_COUNT` entries).
#[derive(Debug, Clone, Copy)]
pub struct UnitLineStates(pub [bool; LINE_COUNT]);

impl Default for UnitLineStates {
    fn default() -> Self {
        Self([false; LINE_COUNT])
    }
}

impl UnitLineStates {
    /// Returns the bits of `self` belonging to `lu`, packed into a mask
    /// starting at bit 0 for `lu.first_line`.
    pub fn mask_for(&self, lu: &types::LogicalUnit) -> u32 {
        let mut mask = 0u32;
        for offset in 0..lu.line_count {
            if self.0[lu.first_line + offset] {
                mask |= 1 << offset;
            }
        }
        mask
    }
}

/// Raw 12-bit ADC samples for every instrumented channel (§3, §4.6).
#[derive(Debug, Clone, Copy)]
pub struct RawMeasurements(pub [u16; CHANNEL_COUNT]);

impl Default for RawMeasurements {
    fn default() -> Self {
        Self([0; CHANNEL_COUNT])
    }
}

/// Engineering-unit projections of `RawMeasurements`, always updated
/// together with it (I5).
#[derive(Debug, Clone, Copy)]
pub struct ConvertedMeasurements(pub [i32; CHANNEL_COUNT]);

impl Default for ConvertedMeasurements {
    fn default() -> Self {
        Self([0; CHANNEL_COUNT])
    }
}

impl ConvertedMeasurements {
    /// Recomputes every channel from `raw` using `coefficients` (I5: a pure
    /// function of raw samples and static coefficients).
    pub fn from_raw(raw: &RawMeasurements, coefficients: &[ChannelCoefficients; CHANNEL_COUNT]) -> Self {
        let mut out = [0i32; CHANNEL_COUNT];
        for (i, sample) in raw.0.iter().enumerate() {
            let c = coefficients[i];
            out[i] = (*sample as i32) * c.gain_milli_per_count / 4096 + c.offset_milli;
        }
        Self(out)
    }
}

/// The full state of one PDU unit (nominal or redundant).
#[derive(Debug, Clone, Copy, Default)]
pub struct PduUnit {
    pub heartbeat: Heartbeat,
    pub status: Status,
    pub lines: UnitLineStates,
    pub raw: RawMeasurements,
    pub converted: ConvertedMeasurements,
}

/// Length of one uptime tick, matching the Projector's default cadence
/// (§4.6) so "uptime ticks" and "Projector cycles" agree in the common case.
const UPTIME_TICK: Duration = Duration::from_millis(100);

/// Holds both PDU units behind independent locks, keyed by APID (I6: no
/// command addressed to one unit can reach the other's lock).
pub struct PduStateManager {
    nominal: Mutex<PduUnit>,
    redundant: Mutex<PduUnit>,
    pub coefficients: [ChannelCoefficients; CHANNEL_COUNT],
    created_at: Instant,
}

impl Default for PduStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PduStateManager {
    pub fn new() -> Self {
        Self {
            nominal: Mutex::new(PduUnit::default()),
            redundant: Mutex::new(PduUnit::default()),
            coefficients: types::default_coefficients(),
            created_at: Instant::now(),
        }
    }

    /// Returns the unit lock for `apid`, or `None` if the APID belongs to
    /// neither unit (the dispatcher ignores those silently per §4.2).
    pub fn unit(&self, apid: u16) -> Option<&Mutex<PduUnit>> {
        match apid {
            types::APID_NOMINAL => Some(&self.nominal),
            types::APID_REDUNDANT => Some(&self.redundant),
            _ => None,
        }
    }

    /// Ticks elapsed since this manager was created, i.e. since process
    /// start (§3's lifecycle: state is created at process start). Live,
    /// not a stored counter nobody increments.
    pub fn uptime_ticks(&self) -> u32 {
        let ticks = self.created_at.elapsed().as_millis() / UPTIME_TICK.as_millis();
        ticks.min(u32::MAX as u128) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LOGICAL_UNITS;

    #[test]
    fn mask_for_extracts_only_the_addressed_unit_bits() {
        let mut lines = UnitLineStates::default();
        lines.0[0] = true;
        lines.0[2] = true;
        lines.0[18] = true; // belongs to the next logical unit, must not leak in
        let lu0 = &LOGICAL_UNITS[0];
        assert_eq!(lines.mask_for(lu0), 0b101);
    }

    #[test]
    fn nominal_and_redundant_units_are_independent_locks() {
        let mgr = PduStateManager::new();
        {
            let mut nominal = mgr.unit(0x65).unwrap().lock().unwrap();
            nominal.status.mode = Mode::Operate;
        }
        let redundant = mgr.unit(0x66).unwrap().lock().unwrap();
        assert_eq!(redundant.status.mode, Mode::Boot);
    }

    #[test]
    fn unknown_apid_resolves_to_no_unit() {
        let mgr = PduStateManager::new();
        assert!(mgr.unit(0x01).is_none());
    }

    #[test]
    fn uptime_ticks_advances_with_wall_clock_time() {
        let mgr = PduStateManager::new();
        assert_eq!(mgr.uptime_ticks(), 0);
        std::thread::sleep(UPTIME_TICK * 2);
        assert!(mgr.uptime_ticks() >= 2);
    }

    #[test]
    fn converted_measurements_are_a_pure_affine_function_of_raw() {
        let mut raw = RawMeasurements::default();
        raw.0[0] = 4096; // one full gain step for a line channel
        let coefficients = types::default_coefficients();
        let converted = ConvertedMeasurements::from_raw(&raw, &coefficients);
        assert_eq!(converted.0[0], 500); // gain=500, offset=0 -> 4096*500/4096
    }
}
