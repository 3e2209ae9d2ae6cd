//! Ties the clock sources, router, speed adapter, tempo handler, and
//! step sequencer together into the single per-iteration contract the
//! firmware's idle task runs on every pass: poll sync input, run
//! auto-switching, advance whichever source is selected, and hand any
//! resulting note events to the sound collaborator.

use crate::clock::{ClockEvent, ClockSource, ExternalSyncInput, InternalClock, MidiClockProcessor};
use crate::collaborators::{DisplaySink, SoundRouter};
use crate::config::TRACK_COUNT;
use crate::rng::EntropySource;
use crate::router::ClockRouter;
use crate::sequencer::{NoteEvent, Sequencer};
use crate::speed::SpeedAdapter;
use crate::tempo::TempoHandler;

/// Owns the timing stack and sequencer; the firmware binary constructs
/// one of these at boot and calls [`EventLoop::run_iteration`] from its
/// idle task.
pub struct EventLoop {
    pub router: ClockRouter,
    pub sync_in: ExternalSyncInput,
    pub internal_clock: InternalClock,
    pub midi_clock: MidiClockProcessor,
    pub speed: SpeedAdapter,
    pub tempo: TempoHandler,
    pub sequencer: Sequencer,
    pub entropy: EntropySource,
    /// Input channel external channel-voice messages are filtered to.
    pub midi_channel: u8,
}

impl EventLoop {
    /// Runs one full pass of the coordination contract and returns any
    /// note events produced, ready to be handed to a [`SoundRouter`].
    pub fn run_iteration<SR: SoundRouter, DS: DisplaySink>(
        &mut self,
        now_us: u32,
        sound_router: &mut SR,
        display: &mut DS,
    ) -> heapless::Vec<NoteEvent, { TRACK_COUNT * 3 }> {
        self.sync_in.update(now_us);
        self.midi_clock
            .set_forward_echo_enabled(self.router.current_source() != ClockSource::Midi);
        self.router.set_midi_active(self.midi_clock.is_active(now_us));
        self.router.set_cable_connected(self.sync_in.is_cable_connected());
        if let Some(transition) = self.router.update_auto_source_switching() {
            self.tempo.set_source(transition.attached);
            self.speed.reset_tick_counter();
        }

        let raw_tick = self.internal_clock.update(now_us);
        let mut events = heapless::Vec::new();

        if let Some(raw_tick) = raw_tick {
            if let Some(forwarded) = self.router.forward(raw_tick) {
                self.dispatch_tick(forwarded, sound_router, &mut events);
            }
        }

        display.set_bpm(self.internal_clock.bpm());
        display.set_playback_state(self.tempo.state());

        events
    }

    /// Feed an externally-observed raw tick (MIDI clock byte or sync
    /// pulse edge) into the stack outside the regular poll cadence,
    /// since those arrive from ISR contexts rather than the idle loop.
    pub fn on_raw_tick<SR: SoundRouter>(
        &mut self,
        event: ClockEvent,
        sound_router: &mut SR,
    ) -> heapless::Vec<NoteEvent, { TRACK_COUNT * 3 }> {
        let mut events = heapless::Vec::new();
        if let Some(forwarded) = self.router.forward(event) {
            self.dispatch_tick(forwarded, sound_router, &mut events);
        }
        events
    }

    fn dispatch_tick<SR: SoundRouter>(
        &mut self,
        event: ClockEvent,
        sound_router: &mut SR,
        out: &mut heapless::Vec<NoteEvent, { TRACK_COUNT * 3 }>,
    ) {
        let Some(scaled) = self.speed.process_tick(event) else {
            return;
        };
        let Some(tempo_event) = self.tempo.on_tick(scaled) else {
            return;
        };
        let notes = self.sequencer.advance(tempo_event, &mut self.entropy);
        for note in notes {
            sound_router.trigger(note);
            let _ = out.push(note);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::test_doubles::{RecordingDisplaySink, RecordingSoundRouter};
    use crate::sequencer::{Step, Track};

    fn make_event_loop() -> EventLoop {
        let tracks = [Track::new(0), Track::new(1), Track::new(2), Track::new(3)];
        let mut sequencer = Sequencer::new(tracks);
        sequencer.track_mut(0).set_step(0, Some(Step::new(36, 100)));

        EventLoop {
            router: ClockRouter::new(ClockSource::Internal),
            sync_in: ExternalSyncInput::new(),
            internal_clock: InternalClock::new(120),
            midi_clock: MidiClockProcessor::new(),
            speed: SpeedAdapter::new(crate::speed::SpeedModifier::NormalSpeed),
            tempo: TempoHandler::new(ClockSource::Internal, false),
            sequencer,
            entropy: EntropySource::default(),
            midi_channel: 0,
        }
    }

    #[test]
    fn idle_until_internal_clock_started() {
        let mut el = make_event_loop();
        let mut sound = RecordingSoundRouter::default();
        let mut display = RecordingDisplaySink::default();
        let events = el.run_iteration(0, &mut sound, &mut display);
        assert!(events.is_empty());
    }

    #[test]
    fn display_reflects_tempo_state() {
        let mut el = make_event_loop();
        el.internal_clock.start(0);
        el.tempo.start();
        el.sequencer.start();
        let mut sound = RecordingSoundRouter::default();
        let mut display = RecordingDisplaySink::default();
        el.run_iteration(0, &mut sound, &mut display);
        assert_eq!(display.last_bpm, Some(120));
        assert_eq!(display.last_state, Some(crate::tempo::PlaybackState::Playing));
    }

    #[test]
    fn running_clock_eventually_fires_a_note() {
        let mut el = make_event_loop();
        el.internal_clock.start(0);
        el.tempo.start();
        el.sequencer.start();
        let mut sound = RecordingSoundRouter::default();
        let mut display = RecordingDisplaySink::default();

        let interval = el.internal_clock.tick_interval_us();
        let mut now = 0u32;
        let mut fired = false;
        for _ in 0..200 {
            now += interval;
            let events = el.run_iteration(now, &mut sound, &mut display);
            if !events.is_empty() {
                fired = true;
                break;
            }
        }
        assert!(fired);
        assert!(!sound.triggered.is_empty());
    }
}
