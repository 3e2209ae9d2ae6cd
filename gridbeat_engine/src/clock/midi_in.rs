use crate::clock::event::{ClockEvent, ClockSource};
use crate::config::MIDI_CLOCK_STALE_US;

/// Tracks liveness of an inbound MIDI clock (0xF8 realtime) stream and
/// optionally echoes it back out with minimal added jitter.
pub struct MidiClockProcessor {
    last_raw_tick_time_us: Option<u32>,
    forward_echo_enabled: bool,
}

impl MidiClockProcessor {
    pub fn new() -> Self {
        MidiClockProcessor {
            last_raw_tick_time_us: None,
            forward_echo_enabled: false,
        }
    }

    pub fn set_forward_echo_enabled(&mut self, enabled: bool) {
        self.forward_echo_enabled = enabled;
    }

    pub fn forward_echo_enabled(&self) -> bool {
        self.forward_echo_enabled
    }

    /// Call when an 0xF8 byte is received off the wire. A gap since the
    /// previous tick longer than [`MIDI_CLOCK_STALE_US`] means the stream
    /// was considered stale; this tick is flagged as a resync so
    /// downstream phase tracking realigns to it.
    pub fn on_midi_clock_tick_received(&mut self, now_us: u32) -> ClockEvent {
        let was_stale = !self.is_active(now_us);
        self.last_raw_tick_time_us = Some(now_us);
        ClockEvent::new(ClockSource::Midi, was_stale, false, now_us)
    }

    pub fn last_raw_tick_time(&self) -> Option<u32> {
        self.last_raw_tick_time_us
    }

    /// A source with no ticks in the last [`MIDI_CLOCK_STALE_US`] is no
    /// longer considered active.
    pub fn is_active(&self, now_us: u32) -> bool {
        match self.last_raw_tick_time_us {
            Some(t) => now_us.wrapping_sub(t) < MIDI_CLOCK_STALE_US,
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.last_raw_tick_time_us = None;
    }
}

impl Default for MidiClockProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_before_first_tick() {
        let p = MidiClockProcessor::new();
        assert!(!p.is_active(1_000_000));
    }

    #[test]
    fn active_immediately_after_tick() {
        let mut p = MidiClockProcessor::new();
        p.on_midi_clock_tick_received(1_000);
        assert!(p.is_active(1_000));
        assert!(p.is_active(1_000 + MIDI_CLOCK_STALE_US - 1));
    }

    #[test]
    fn goes_stale_after_window() {
        let mut p = MidiClockProcessor::new();
        p.on_midi_clock_tick_received(0);
        assert!(!p.is_active(MIDI_CLOCK_STALE_US));
    }

    #[test]
    fn reset_clears_activity() {
        let mut p = MidiClockProcessor::new();
        p.on_midi_clock_tick_received(0);
        p.reset();
        assert!(!p.is_active(0));
    }

    #[test]
    fn first_tick_is_resync() {
        let mut p = MidiClockProcessor::new();
        let evt = p.on_midi_clock_tick_received(0);
        assert!(evt.is_resync);
    }

    #[test]
    fn consecutive_ticks_not_resync() {
        let mut p = MidiClockProcessor::new();
        p.on_midi_clock_tick_received(0);
        let evt = p.on_midi_clock_tick_received(1_000);
        assert!(!evt.is_resync);
    }

    #[test]
    fn stale_then_resume_emits_resync() {
        let mut p = MidiClockProcessor::new();
        p.on_midi_clock_tick_received(0);
        let evt = p.on_midi_clock_tick_received(MIDI_CLOCK_STALE_US);
        assert!(evt.is_resync);
        let evt = p.on_midi_clock_tick_received(MIDI_CLOCK_STALE_US + 1_000);
        assert!(!evt.is_resync);
    }
}
