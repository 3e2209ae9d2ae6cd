use midi_types::{Note, Value7};

use crate::config::STEPS_PER_TRACK;

/// How many times a step's note re-triggers within its own duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetriggerMode {
    Off,
    Single,
    Double,
}

/// A single programmable step. `None` slots are empty (no note plays).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub note: Note,
    pub velocity: Value7,
    pub retrigger: RetriggerMode,
    /// 0-100, chance this step actually fires when its tick arrives.
    pub probability_percent: u8,
}

impl Step {
    pub fn new(note: u8, velocity: u8) -> Self {
        Step {
            note: note.into(),
            velocity: velocity.into(),
            retrigger: RetriggerMode::Off,
            probability_percent: 100,
        }
    }

    pub fn with_retrigger(mut self, mode: RetriggerMode) -> Self {
        self.retrigger = mode;
        self
    }

    pub fn with_probability(mut self, percent: u8) -> Self {
        self.probability_percent = percent.min(100);
        self
    }

    /// Number of discrete note-on events this step produces within its
    /// window, given its retrigger mode.
    pub fn trigger_count(&self) -> u8 {
        match self.retrigger {
            RetriggerMode::Off => 1,
            RetriggerMode::Single => 2,
            RetriggerMode::Double => 3,
        }
    }
}

/// One of the four playable tracks: a fixed-size grid of optional steps
/// plus per-track swing, repeat, and randomization settings.
#[derive(Debug, Clone)]
pub struct Track {
    pub steps: [Option<Step>; STEPS_PER_TRACK],
    pub midi_channel: u8,
    /// 0 = no swing, 100 = maximum (long/short split of the step pair).
    pub swing_percent: u8,
    /// When true, odd-numbered steps (1, 3, 5, 7) are delayed by the
    /// swing amount; even steps are delayed when false.
    pub swing_delays_odd_steps: bool,
    /// When `Some(n)`, the track repeats its first `n` steps in a loop
    /// instead of playing the full grid.
    pub repeat_loop_length: Option<u8>,
    /// 0-100 chance, applied per-step on top of the step's own
    /// probability, used for generative randomization.
    pub random_step_offset_percent: u8,
}

impl Track {
    pub fn new(midi_channel: u8) -> Self {
        Track {
            steps: [None; STEPS_PER_TRACK],
            midi_channel,
            swing_percent: 0,
            swing_delays_odd_steps: true,
            repeat_loop_length: None,
            random_step_offset_percent: 0,
        }
    }

    pub fn set_step(&mut self, index: usize, step: Option<Step>) {
        if index < STEPS_PER_TRACK {
            self.steps[index] = step;
        }
    }

    pub fn step_at(&self, index: usize) -> Option<&Step> {
        self.steps.get(index).and_then(|s| s.as_ref())
    }

    /// Which step index plays at logical position `position`, taking
    /// the repeat-loop setting into account.
    pub fn resolve_step_index(&self, position: usize) -> usize {
        match self.repeat_loop_length {
            Some(len) if len > 0 => position % (len as usize).min(STEPS_PER_TRACK),
            _ => position % STEPS_PER_TRACK,
        }
    }

    /// Splits `2 * ticks_per_step` into a (long, short) pair of
    /// durations for a swung step pair, per `swing_percent`. At 0%
    /// swing both halves are equal; at 100% the long half consumes
    /// nearly the whole pair window. Durations are rounded down so
    /// `long + short <= 2 * ticks_per_step` always holds.
    pub fn swing_split(&self, ticks_per_step: u32) -> (u32, u32) {
        let pair = ticks_per_step * 2;
        let extra = (pair as u64 * self.swing_percent as u64 / 200) as u32;
        let long = ticks_per_step + extra;
        let short = pair - long;
        (long, short)
    }

    /// Delay, in ticks, applied to the step at `step_index` within its
    /// pair due to swing.
    pub fn swing_delay_for_step(&self, step_index: usize, ticks_per_step: u32) -> u32 {
        let is_odd = step_index % 2 == 1;
        let delayed = is_odd == self.swing_delays_odd_steps;
        if !delayed {
            return 0;
        }
        let (long, _short) = self.swing_split(ticks_per_step);
        long - ticks_per_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_swing_splits_evenly() {
        let t = Track::new(0);
        assert_eq!(t.swing_split(12), (12, 12));
    }

    #[test]
    fn fifty_percent_swing_matches_classic_triplet_feel() {
        let mut t = Track::new(0);
        t.swing_percent = 50;
        let (long, short) = t.swing_split(12);
        assert_eq!(long + short, 24);
        assert!(long > short);
    }

    #[test]
    fn swing_delay_only_applies_to_targeted_parity() {
        let mut t = Track::new(0);
        t.swing_percent = 50;
        t.swing_delays_odd_steps = true;
        assert_eq!(t.swing_delay_for_step(0, 12), 0);
        assert!(t.swing_delay_for_step(1, 12) > 0);
    }

    #[test]
    fn repeat_loop_wraps_within_length() {
        let mut t = Track::new(0);
        t.repeat_loop_length = Some(3);
        assert_eq!(t.resolve_step_index(3), 0);
        assert_eq!(t.resolve_step_index(4), 1);
    }

    #[test]
    fn no_repeat_loop_wraps_at_full_grid() {
        let t = Track::new(0);
        assert_eq!(t.resolve_step_index(STEPS_PER_TRACK), 0);
    }

    #[test]
    fn retrigger_trigger_counts() {
        let step = Step::new(60, 100).with_retrigger(RetriggerMode::Double);
        assert_eq!(step.trigger_count(), 3);
    }

    #[test]
    fn probability_is_clamped() {
        let step = Step::new(60, 100).with_probability(250);
        assert_eq!(step.probability_percent, 100);
    }
}
