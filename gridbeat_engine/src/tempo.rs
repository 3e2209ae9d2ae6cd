//! Drives playback state and phase-12 position from internal-timebase
//! ticks, and decides when the device should emit its own MIDI realtime
//! clock bytes.

use crate::clock::{ClockEvent, ClockSource};
use crate::config::INTERNAL_PPQN;
use crate::speed::SpeedModifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
}

/// Sub-state entered while `ExternalSync` is selected but playback has
/// not yet been aligned to an incoming downbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalSyncPhase {
    WaitingForDownbeat,
    Synced,
}

/// Emitted once per forwarded internal-timebase tick, carrying the
/// position within the current quarter note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoEvent {
    pub tick_count: u32,
    /// Position within the quarter note, `0..INTERNAL_PPQN`.
    pub phase_12: u8,
    pub is_resync: bool,
}

pub struct TempoHandler {
    state: PlaybackState,
    source: ClockSource,
    external_phase: ExternalSyncPhase,
    tick_count: u32,
    phase_12: u8,
    send_midi_clock_when_stopped: bool,
    pending_modifier: Option<SpeedModifier>,
}

impl TempoHandler {
    pub fn new(initial_source: ClockSource, send_midi_clock_when_stopped: bool) -> Self {
        TempoHandler {
            state: PlaybackState::Stopped,
            source: initial_source,
            external_phase: ExternalSyncPhase::WaitingForDownbeat,
            tick_count: 0,
            phase_12: 0,
            send_midi_clock_when_stopped,
            pending_modifier: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn start(&mut self) {
        self.state = PlaybackState::Playing;
        if self.source == ClockSource::ExternalSync {
            self.external_phase = ExternalSyncPhase::WaitingForDownbeat;
        }
    }

    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
    }

    pub fn set_source(&mut self, source: ClockSource) {
        self.source = source;
        if source == ClockSource::ExternalSync {
            self.external_phase = ExternalSyncPhase::WaitingForDownbeat;
        }
    }

    /// Requests that the next beat marker also realign `phase_12` under
    /// the given speed modifier's rule, instead of just advancing by one.
    pub fn queue_speed_realignment(&mut self, modifier: SpeedModifier) {
        self.pending_modifier = Some(modifier);
    }

    /// Only ticks from the currently selected source advance tempo.
    /// `ExternalSync` only advances on its own `is_beat` pulses until the
    /// first one arrives; every other selected source advances on every
    /// tick.
    pub fn on_tick(&mut self, event: ClockEvent) -> Option<TempoEvent> {
        if event.source != self.source {
            return None;
        }

        if self.source == ClockSource::ExternalSync {
            if event.is_beat {
                self.external_phase = ExternalSyncPhase::Synced;
                self.tick_count = self.tick_count.wrapping_add(1);
                self.phase_12 = self.realign_phase();
                return Some(TempoEvent {
                    tick_count: self.tick_count,
                    phase_12: self.phase_12,
                    is_resync: false,
                });
            }
            if self.external_phase == ExternalSyncPhase::WaitingForDownbeat {
                return None;
            }
        }

        self.tick_count = self.tick_count.wrapping_add(1);
        self.phase_12 = (self.phase_12 + 1) % INTERNAL_PPQN;
        Some(TempoEvent {
            tick_count: self.tick_count,
            phase_12: self.phase_12,
            is_resync: false,
        })
    }

    /// Resolves a pending speed-modifier realignment against the phase
    /// the beat arrived at: `NormalSpeed` snaps to the nearest multiple
    /// of 3, `HalfSpeed` snaps to 0, `DoubleSpeed` snaps to the next even
    /// phase. With nothing pending, the phase simply resets to 0.
    fn realign_phase(&mut self) -> u8 {
        match self.pending_modifier.take() {
            Some(SpeedModifier::NormalSpeed) => {
                let rem = self.phase_12 % 3;
                if rem == 0 {
                    self.phase_12
                } else {
                    (self.phase_12 + (3 - rem)) % INTERNAL_PPQN
                }
            }
            Some(SpeedModifier::HalfSpeed) => 0,
            Some(SpeedModifier::DoubleSpeed) => {
                if self.phase_12 % 2 == 0 {
                    self.phase_12
                } else {
                    (self.phase_12 + 1) % INTERNAL_PPQN
                }
            }
            None => 0,
        }
    }

    /// True while the device itself should be the one driving the MIDI
    /// realtime clock line out (internal source, and either playing or
    /// configured to keep the clock running while stopped).
    pub fn should_send_midi_clock(&self) -> bool {
        self.source == ClockSource::Internal
            && (self.state == PlaybackState::Playing || self.send_midi_clock_when_stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evt(source: ClockSource) -> ClockEvent {
        ClockEvent::new(source, false, false, 0)
    }

    fn beat(source: ClockSource) -> ClockEvent {
        ClockEvent::new(source, false, true, 0)
    }

    #[test]
    fn ignores_ticks_from_unselected_source() {
        let mut h = TempoHandler::new(ClockSource::Internal, false);
        h.start();
        assert!(h.on_tick(evt(ClockSource::Midi)).is_none());
    }

    #[test]
    fn phase_12_wraps_at_twelve() {
        let mut h = TempoHandler::new(ClockSource::Internal, false);
        h.start();
        let mut last = None;
        for _ in 0..12 {
            last = h.on_tick(evt(ClockSource::Internal));
        }
        assert_eq!(last.unwrap().phase_12, 0);
    }

    #[test]
    fn external_sync_waits_for_downbeat() {
        let mut h = TempoHandler::new(ClockSource::ExternalSync, false);
        h.start();
        assert!(h.on_tick(evt(ClockSource::ExternalSync)).is_none());
        assert!(h.on_tick(beat(ClockSource::ExternalSync)).is_some());
    }

    #[test]
    fn external_sync_beat_resets_phase_with_nothing_pending() {
        let mut h = TempoHandler::new(ClockSource::ExternalSync, false);
        h.start();
        h.on_tick(beat(ClockSource::ExternalSync));
        h.on_tick(evt(ClockSource::ExternalSync));
        h.on_tick(evt(ClockSource::ExternalSync));
        let last = h.on_tick(beat(ClockSource::ExternalSync)).unwrap();
        assert_eq!(last.phase_12, 0);
    }

    #[test]
    fn speed_realignment_applies_on_next_beat() {
        let mut h = TempoHandler::new(ClockSource::ExternalSync, false);
        h.start();
        h.on_tick(beat(ClockSource::ExternalSync));
        h.on_tick(evt(ClockSource::ExternalSync));
        h.on_tick(evt(ClockSource::ExternalSync));
        // phase_12 is now 2; queue a DoubleSpeed realignment, which
        // should snap forward to the next even phase (2 stays at 2).
        h.queue_speed_realignment(SpeedModifier::DoubleSpeed);
        let realigned = h.on_tick(beat(ClockSource::ExternalSync)).unwrap();
        assert_eq!(realigned.phase_12, 2);
    }

    #[test]
    fn internal_source_sends_clock_while_playing() {
        let mut h = TempoHandler::new(ClockSource::Internal, false);
        assert!(!h.should_send_midi_clock());
        h.start();
        assert!(h.should_send_midi_clock());
        h.stop();
        assert!(!h.should_send_midi_clock());
    }

    #[test]
    fn send_midi_clock_when_stopped_override() {
        let h = TempoHandler::new(ClockSource::Internal, true);
        assert!(h.should_send_midi_clock());
    }

    #[test]
    fn non_internal_source_never_sends_clock() {
        let mut h = TempoHandler::new(ClockSource::Midi, true);
        h.start();
        assert!(!h.should_send_midi_clock());
    }
}
