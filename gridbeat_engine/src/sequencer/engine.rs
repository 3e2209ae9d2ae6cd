use heapless::Vec;

use crate::config::{INTERNAL_PPQN, STEPS_PER_TRACK, TRACK_COUNT};
use crate::rng::EntropySource;
use crate::sequencer::note_event::NoteEvent;
use crate::sequencer::step::Track;
use crate::tempo::TempoEvent;

/// Ticks, at the internal 12 PPQN timebase, that make up one step. A
/// quarter note is 12 internal ticks, and the default grid plays
/// sixteenth notes (3 ticks/step).
const TICKS_PER_STEP: u32 = INTERNAL_PPQN as u32 / 4;

/// A retrigger still owed within the step window it was scheduled for.
struct PendingRetrigger {
    fire_at_tick: u32,
    event: NoteEvent,
}

/// Owns the four tracks and turns incoming [`TempoEvent`]s into
/// [`NoteEvent`]s, applying swing, retrigger, repeat-loop, and
/// probability/offset randomization per track.
pub struct Sequencer {
    tracks: [Track; TRACK_COUNT],
    position: [usize; TRACK_COUNT],
    step_counter: [u32; TRACK_COUNT],
    next_trigger_tick: [u32; TRACK_COUNT],
    last_played_note: [Option<NoteEvent>; TRACK_COUNT],
    pending_retriggers: Vec<PendingRetrigger, { TRACK_COUNT * 2 }>,
    running: bool,
}

impl Sequencer {
    pub fn new(tracks: [Track; TRACK_COUNT]) -> Self {
        Sequencer {
            tracks,
            position: [0; TRACK_COUNT],
            step_counter: [0; TRACK_COUNT],
            next_trigger_tick: [0; TRACK_COUNT],
            last_played_note: [None; TRACK_COUNT],
            pending_retriggers: Vec::new(),
            running: false,
        }
    }

    pub fn track(&self, index: usize) -> &Track {
        &self.tracks[index]
    }

    pub fn track_mut(&mut self, index: usize) -> &mut Track {
        &mut self.tracks[index]
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Starts playback from wherever the per-track step counters
    /// currently are; does not reset position (use [`Sequencer::reset`]
    /// for that).
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stops playback and releases every track with a sounding note.
    pub fn stop(&mut self) -> Vec<NoteEvent, TRACK_COUNT> {
        self.running = false;
        self.pending_retriggers.clear();
        self.emit_all_note_offs()
    }

    pub fn toggle(&mut self) -> Vec<NoteEvent, TRACK_COUNT> {
        if self.running {
            self.stop()
        } else {
            self.start();
            Vec::new()
        }
    }

    /// Releases sounding notes and zeros every track's position and
    /// timing state, independent of whether playback is running.
    pub fn reset(&mut self) -> Vec<NoteEvent, TRACK_COUNT> {
        let offs = self.emit_all_note_offs();
        self.position = [0; TRACK_COUNT];
        self.step_counter = [0; TRACK_COUNT];
        self.next_trigger_tick = [0; TRACK_COUNT];
        self.pending_retriggers.clear();
        offs
    }

    fn emit_all_note_offs(&mut self) -> Vec<NoteEvent, TRACK_COUNT> {
        let mut out = Vec::new();
        for slot in &mut self.last_played_note {
            if let Some(prev) = slot.take() {
                let off = NoteEvent::new(prev.track, prev.note, 0u8.into(), prev.channel);
                let _ = out.push(off);
            }
        }
        out
    }

    /// Feed one internal-timebase tick; returns every note event that
    /// should fire at this tick, across all tracks. Produces nothing
    /// while stopped, except for the position reset a resync always
    /// applies so playback resumes from the top.
    pub fn advance(
        &mut self,
        event: TempoEvent,
        entropy: &mut EntropySource,
    ) -> Vec<NoteEvent, { TRACK_COUNT * 3 }> {
        let mut out = Vec::new();

        if event.is_resync {
            self.position = [0; TRACK_COUNT];
            self.step_counter = [0; TRACK_COUNT];
            self.next_trigger_tick = [event.tick_count; TRACK_COUNT];
            self.pending_retriggers.clear();
        }

        if !self.running {
            return out;
        }

        let mut i = 0;
        while i < self.pending_retriggers.len() {
            if self.pending_retriggers[i].fire_at_tick <= event.tick_count {
                let pending = self.pending_retriggers.swap_remove(i);
                let _ = out.push(pending.event);
            } else {
                i += 1;
            }
        }

        for track_idx in 0..TRACK_COUNT {
            if event.tick_count < self.next_trigger_tick[track_idx] {
                continue;
            }

            let step_index = self.step_counter[track_idx] as usize;
            let track = &self.tracks[track_idx];
            let mut resolved = track.resolve_step_index(step_index);

            if track.random_step_offset_percent > 0
                && entropy.roll_percent() < track.random_step_offset_percent
            {
                resolved = Self::apply_random_offset(resolved, entropy);
            }
            self.position[track_idx] = resolved;

            if let Some(prev) = self.last_played_note[track_idx].take() {
                let off = NoteEvent::new(prev.track, prev.note, 0u8.into(), prev.channel);
                let _ = out.push(off);
            }

            let duration = Self::step_duration(track, step_index, TICKS_PER_STEP);

            if let Some(step) = track.step_at(resolved).copied() {
                if entropy.roll_percent() < step.probability_percent {
                    let evt = NoteEvent::from_step(
                        track_idx as u8,
                        step.note,
                        step.velocity,
                        track.midi_channel,
                    );
                    let _ = out.push(evt);
                    self.last_played_note[track_idx] = Some(evt);

                    let trigger_count = step.trigger_count() as u32;
                    for k in 1..trigger_count {
                        let fire_at = event.tick_count + duration * k / trigger_count;
                        let _ = self.pending_retriggers.push(PendingRetrigger {
                            fire_at_tick: fire_at,
                            event: evt,
                        });
                    }
                }
            }

            self.step_counter[track_idx] = self.step_counter[track_idx].wrapping_add(1);
            self.next_trigger_tick[track_idx] = event.tick_count + duration;
        }

        out
    }

    /// Shifts `step_index` by a signed offset in `[-STEPS_PER_TRACK/2,
    /// STEPS_PER_TRACK/2]`, wrapping within the grid, without disturbing
    /// the track's own step counter.
    fn apply_random_offset(step_index: usize, entropy: &mut EntropySource) -> usize {
        let span = STEPS_PER_TRACK as i32;
        let half = span / 2;
        let shift = (entropy.roll_percent() as i32 % span) - half;
        (step_index as i32 + shift).rem_euclid(span) as usize
    }

    /// Ticks between this step firing and the next, applying the
    /// track's swing delay to both step boundaries.
    fn step_duration(track: &Track, step_index: usize, ticks_per_step: u32) -> u32 {
        let delay_here = track.swing_delay_for_step(step_index, ticks_per_step) as i64;
        let delay_next = track.swing_delay_for_step(step_index + 1, ticks_per_step) as i64;
        (ticks_per_step as i64 + delay_next - delay_here) as u32
    }

    /// Live-pad retrigger: immediately fire the current step's note on
    /// the given track at the pad's own velocity, independent of the
    /// sequencer's own clock-driven advance.
    pub fn trigger_live_pad(&self, track_idx: usize, velocity: u8) -> Option<NoteEvent> {
        let track = self.tracks.get(track_idx)?;
        let pos = *self.position.get(track_idx)?;
        let step = track.step_at(pos)?;
        Some(NoteEvent::from_step(
            track_idx as u8,
            step.note,
            velocity.into(),
            track.midi_channel,
        ))
    }
}
