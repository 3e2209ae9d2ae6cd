use crate::clock::event::{ClockEvent, ClockSource};
use crate::config::{SYNC_DETECT_DEBOUNCE_US, SYNC_PULSE_COOLDOWN_US};

/// Analog 2 PPQN sync jack input: rising-edge pulse detection with
/// cooldown, plus cable-presence debouncing.
pub struct ExternalSyncInput {
    last_pulse_us: Option<u32>,
    cable_present_raw: bool,
    cable_present_stable: bool,
    last_raw_change_us: Option<u32>,
}

impl ExternalSyncInput {
    pub fn new() -> Self {
        ExternalSyncInput {
            last_pulse_us: None,
            cable_present_raw: false,
            cable_present_stable: false,
            last_raw_change_us: None,
        }
    }

    /// Call on every rising edge observed on the sync pin.
    pub fn on_rising_edge(&mut self, now_us: u32) -> Option<ClockEvent> {
        if let Some(last) = self.last_pulse_us {
            if now_us.wrapping_sub(last) < SYNC_PULSE_COOLDOWN_US {
                return None;
            }
        }
        self.last_pulse_us = Some(now_us);
        Some(ClockEvent::new(ClockSource::ExternalSync, false, true, now_us))
    }

    /// Call whenever cable-detect sense line changes, with a timestamp.
    pub fn set_cable_sensed(&mut self, present: bool, now_us: u32) {
        if present != self.cable_present_raw {
            self.cable_present_raw = present;
            self.last_raw_change_us = Some(now_us);
        }
    }

    /// Poll regularly to let debounced cable state settle.
    pub fn update(&mut self, now_us: u32) {
        if let Some(changed_at) = self.last_raw_change_us {
            if now_us.wrapping_sub(changed_at) >= SYNC_DETECT_DEBOUNCE_US {
                self.cable_present_stable = self.cable_present_raw;
                self.last_raw_change_us = None;
            }
        }
    }

    pub fn is_cable_connected(&self) -> bool {
        self.cable_present_stable
    }

    pub fn last_pulse_time(&self) -> Option<u32> {
        self.last_pulse_us
    }
}

impl Default for ExternalSyncInput {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_pulse_always_emits() {
        let mut s = ExternalSyncInput::new();
        assert!(s.on_rising_edge(0).is_some());
    }

    #[test]
    fn pulse_within_cooldown_is_rejected() {
        let mut s = ExternalSyncInput::new();
        s.on_rising_edge(0);
        assert!(s.on_rising_edge(SYNC_PULSE_COOLDOWN_US - 1).is_none());
    }

    #[test]
    fn pulse_after_cooldown_is_accepted() {
        let mut s = ExternalSyncInput::new();
        s.on_rising_edge(0);
        assert!(s.on_rising_edge(SYNC_PULSE_COOLDOWN_US).is_some());
    }

    #[test]
    fn cable_state_requires_debounce() {
        let mut s = ExternalSyncInput::new();
        s.set_cable_sensed(true, 0);
        assert!(!s.is_cable_connected());
        s.update(SYNC_DETECT_DEBOUNCE_US - 1);
        assert!(!s.is_cable_connected());
        s.update(SYNC_DETECT_DEBOUNCE_US);
        assert!(s.is_cable_connected());
    }

    #[test]
    fn bouncing_cable_resets_debounce_window() {
        let mut s = ExternalSyncInput::new();
        s.set_cable_sensed(true, 0);
        s.set_cable_sensed(false, 5_000);
        s.update(SYNC_DETECT_DEBOUNCE_US);
        assert!(!s.is_cable_connected());
    }
}
