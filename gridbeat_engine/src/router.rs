//! Arbitrates between the three raw clock sources and decides, on each
//! poll, which one currently drives playback.

use crate::clock::{ClockEvent, ClockSource};

/// Routes [`ClockEvent`]s from whichever source is currently active to
/// the rest of the engine, and runs the auto-switching policy.
///
/// Side effects on switching (stopping the previous source's echo,
/// resetting the new source's staleness tracking) are the caller's
/// responsibility via [`ClockRouter::set_clock_source`]'s return value,
/// since the router itself only tracks which source is selected; it does
/// not own the source objects (composition root wires them together).
pub struct ClockRouter {
    current_source: ClockSource,
    cable_connected: bool,
    midi_active: bool,
}

/// Returned by [`ClockRouter::set_clock_source`] so the caller can apply
/// the attach/detach side effects on the concrete source objects it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceTransition {
    pub detached: ClockSource,
    pub attached: ClockSource,
}

impl ClockRouter {
    pub fn new(initial_source: ClockSource) -> Self {
        ClockRouter {
            current_source: initial_source,
            cable_connected: false,
            midi_active: false,
        }
    }

    pub fn current_source(&self) -> ClockSource {
        self.current_source
    }

    /// Explicit user- or MIDI-driven source change. Always allowed.
    pub fn set_clock_source(&mut self, new_source: ClockSource) -> Option<SourceTransition> {
        if new_source == self.current_source {
            return None;
        }
        let detached = self.current_source;
        self.current_source = new_source;
        Some(SourceTransition {
            detached,
            attached: new_source,
        })
    }

    /// Only events from the currently selected source are forwarded.
    pub fn forward(&self, event: ClockEvent) -> Option<ClockEvent> {
        if event.source == self.current_source {
            Some(event)
        } else {
            None
        }
    }

    /// Reflects the debounced state of the external sync jack's cable
    /// sense line.
    pub fn set_cable_connected(&mut self, connected: bool) {
        self.cable_connected = connected;
    }

    pub fn set_midi_active(&mut self, active: bool) {
        self.midi_active = active;
    }

    /// Priority is External > Midi > Internal, but Midi never
    /// auto-falls back to Internal: once Midi is selected it stays
    /// selected until an explicit [`set_clock_source`] call or External
    /// sync becomes available, matching the asymmetric hysteresis rule.
    pub fn update_auto_source_switching(&mut self) -> Option<SourceTransition> {
        let desired = if self.cable_connected {
            ClockSource::ExternalSync
        } else if self.current_source == ClockSource::ExternalSync {
            // The cable was just pulled: prefer Midi if it is live,
            // otherwise fall back to Internal.
            if self.midi_active {
                ClockSource::Midi
            } else {
                ClockSource::Internal
            }
        } else {
            // Internal never auto-promotes itself over an already
            // selected Midi source, and Midi never auto-demotes to
            // Internal.
            self.current_source
        };

        self.set_clock_source(desired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwards_only_selected_source() {
        let router = ClockRouter::new(ClockSource::Internal);
        let internal_evt = ClockEvent::new(ClockSource::Internal, false, false, 0);
        let midi_evt = ClockEvent::new(ClockSource::Midi, false, false, 0);
        assert!(router.forward(internal_evt).is_some());
        assert!(router.forward(midi_evt).is_none());
    }

    #[test]
    fn explicit_switch_reports_transition() {
        let mut router = ClockRouter::new(ClockSource::Internal);
        let t = router.set_clock_source(ClockSource::Midi).unwrap();
        assert_eq!(t.detached, ClockSource::Internal);
        assert_eq!(t.attached, ClockSource::Midi);
        assert_eq!(router.current_source(), ClockSource::Midi);
    }

    #[test]
    fn same_source_is_a_noop() {
        let mut router = ClockRouter::new(ClockSource::Internal);
        assert!(router.set_clock_source(ClockSource::Internal).is_none());
    }

    #[test]
    fn external_sync_preempts_others() {
        let mut router = ClockRouter::new(ClockSource::Internal);
        router.set_cable_connected(true);
        let t = router.update_auto_source_switching().unwrap();
        assert_eq!(t.attached, ClockSource::ExternalSync);
    }

    #[test]
    fn midi_never_auto_falls_back_to_internal() {
        let mut router = ClockRouter::new(ClockSource::Midi);
        router.set_midi_active(true);
        // cable never connected
        assert!(router.update_auto_source_switching().is_none());
        assert_eq!(router.current_source(), ClockSource::Midi);
    }

    #[test]
    fn external_stale_falls_back_to_midi_if_live() {
        let mut router = ClockRouter::new(ClockSource::ExternalSync);
        router.set_cable_connected(true);
        router.set_midi_active(true);
        router.set_cable_connected(false);
        let t = router.update_auto_source_switching().unwrap();
        assert_eq!(t.attached, ClockSource::Midi);
    }

    #[test]
    fn external_stale_falls_back_to_internal_if_midi_inactive() {
        let mut router = ClockRouter::new(ClockSource::ExternalSync);
        router.set_cable_connected(true);
        router.set_midi_active(false);
        router.set_cable_connected(false);
        let t = router.update_auto_source_switching().unwrap();
        assert_eq!(t.attached, ClockSource::Internal);
    }
}
