use crate::clock::event::{ClockEvent, ClockSource};

/// Free-running clock derived from a BPM setting, ticking at 24 pulses
/// per quarter note. `set_bpm` and `start`/`stop` are idempotent; a BPM
/// change takes effect on the next scheduled tick rather than
/// retroactively rewinding the currently pending one.
pub struct InternalClock {
    bpm: u16,
    pending_bpm: Option<u16>,
    running: bool,
    next_tick_us: u32,
}

impl InternalClock {
    pub fn new(initial_bpm: u16) -> Self {
        InternalClock {
            bpm: initial_bpm.max(1),
            pending_bpm: None,
            running: false,
            next_tick_us: 0,
        }
    }

    /// Interval between ticks, in microseconds, at the current BPM.
    pub fn tick_interval_us(&self) -> u32 {
        Self::calculate_interval(self.bpm)
    }

    fn calculate_interval(bpm: u16) -> u32 {
        // 60_000_000 us/min / (bpm * 24 ticks/beat)
        60_000_000u32 / (bpm as u32 * 24)
    }

    /// Values of zero or below are rejected; the clock keeps its
    /// previous tempo.
    pub fn set_bpm(&mut self, bpm: u16) {
        if bpm == 0 {
            return;
        }
        self.pending_bpm = Some(bpm);
    }

    pub fn start(&mut self, now_us: u32) {
        if self.running {
            return;
        }
        self.running = true;
        self.next_tick_us = now_us + self.tick_interval_us();
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.pending_bpm = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn bpm(&self) -> u16 {
        self.bpm
    }

    /// Advances the clock; returns a tick event if one fell due at or
    /// before `now_us`. At most one tick is emitted per call even if
    /// multiple intervals have elapsed, matching the original firmware's
    /// single-tick-per-poll behaviour under the cooperative scheduler.
    pub fn update(&mut self, now_us: u32) -> Option<ClockEvent> {
        if !self.running {
            return None;
        }
        if now_us < self.next_tick_us {
            return None;
        }
        if let Some(pending) = self.pending_bpm.take() {
            self.bpm = pending;
        }
        self.next_tick_us = now_us + self.tick_interval_us();
        Some(ClockEvent::new(ClockSource::Internal, false, false, now_us))
    }
}
