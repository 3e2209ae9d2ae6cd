//! Trait boundaries for the external collaborators this engine drives
//! but does not implement: LED/pad feedback, the OLED display, and
//! whatever handles inbound channel-voice MIDI messages. All are out of
//! scope here; the event loop only needs to know it can notify them.

use midi_types::{MidiMessage, Note, Value7};

use crate::sequencer::NoteEvent;
use crate::tempo::PlaybackState;

/// Receives note triggers to drive audio playback or LED feedback.
pub trait SoundRouter {
    fn trigger(&mut self, event: NoteEvent);
}

/// Receives high-level state changes to render on the device's display.
pub trait DisplaySink {
    fn set_playback_state(&mut self, state: PlaybackState);
    fn set_bpm(&mut self, bpm: u16);
}

/// Receives inbound channel-voice messages already filtered to the
/// configured input channel, with velocity-0 note-ons folded into
/// note-offs.
pub trait MessageRouter {
    fn note_on(&mut self, note: Note, velocity: Value7);
    fn note_off(&mut self, note: Note, velocity: Value7);
    fn control_change(&mut self, control: u8, value: Value7);
}

/// What an inbound channel-voice message resolves to once it has been
/// filtered by input channel and had velocity-0 note-ons reinterpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMessageAction {
    NoteOn { note: Note, velocity: Value7 },
    NoteOff { note: Note, velocity: Value7 },
    ControlChange { control: u8, value: Value7 },
    Ignored,
}

/// Classifies a single inbound message against the configured input
/// channel. Messages on any other channel, and anything that isn't a
/// note or CC, are `Ignored`.
pub fn classify_channel_voice_message(
    message: &MidiMessage,
    input_channel: u8,
) -> InputMessageAction {
    match *message {
        MidiMessage::NoteOn(channel, note, velocity) => {
            if u8::from(channel) != input_channel {
                return InputMessageAction::Ignored;
            }
            if u8::from(velocity) == 0 {
                InputMessageAction::NoteOff { note, velocity }
            } else {
                InputMessageAction::NoteOn { note, velocity }
            }
        }
        MidiMessage::NoteOff(channel, note, velocity) => {
            if u8::from(channel) != input_channel {
                return InputMessageAction::Ignored;
            }
            InputMessageAction::NoteOff { note, velocity }
        }
        MidiMessage::ControlChange(channel, control, value) => {
            if u8::from(channel) != input_channel {
                return InputMessageAction::Ignored;
            }
            InputMessageAction::ControlChange {
                control: u8::from(control),
                value,
            }
        }
        _ => InputMessageAction::Ignored,
    }
}

/// Dispatches a single inbound message to a [`MessageRouter`], dropping
/// it silently while a file transfer holds the device busy (the
/// transfer protocol owns the wire while it's active).
pub fn route_incoming_message<R: MessageRouter>(
    router: &mut R,
    message: &MidiMessage,
    input_channel: u8,
    transfer_busy: bool,
) {
    if transfer_busy {
        return;
    }
    match classify_channel_voice_message(message, input_channel) {
        InputMessageAction::NoteOn { note, velocity } => router.note_on(note, velocity),
        InputMessageAction::NoteOff { note, velocity } => router.note_off(note, velocity),
        InputMessageAction::ControlChange { control, value } => {
            router.control_change(control, value)
        }
        InputMessageAction::Ignored => {}
    }
}

#[cfg(test)]
pub(crate) mod test_doubles {
    use super::*;
    use heapless::Vec;

    #[derive(Default)]
    pub struct RecordingSoundRouter {
        pub triggered: Vec<NoteEvent, 32>,
    }

    impl SoundRouter for RecordingSoundRouter {
        fn trigger(&mut self, event: NoteEvent) {
            let _ = self.triggered.push(event);
        }
    }

    #[derive(Default)]
    pub struct RecordingDisplaySink {
        pub last_state: Option<PlaybackState>,
        pub last_bpm: Option<u16>,
    }

    impl DisplaySink for RecordingDisplaySink {
        fn set_playback_state(&mut self, state: PlaybackState) {
            self.last_state = Some(state);
        }

        fn set_bpm(&mut self, bpm: u16) {
            self.last_bpm = Some(bpm);
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum RecordedMessage {
        NoteOn(Note, Value7),
        NoteOff(Note, Value7),
        ControlChange(u8, Value7),
    }

    #[derive(Default)]
    pub struct RecordingMessageRouter {
        pub received: Vec<RecordedMessage, 32>,
    }

    impl MessageRouter for RecordingMessageRouter {
        fn note_on(&mut self, note: Note, velocity: Value7) {
            let _ = self.received.push(RecordedMessage::NoteOn(note, velocity));
        }

        fn note_off(&mut self, note: Note, velocity: Value7) {
            let _ = self
                .received
                .push(RecordedMessage::NoteOff(note, velocity));
        }

        fn control_change(&mut self, control: u8, value: Value7) {
            let _ = self
                .received
                .push(RecordedMessage::ControlChange(control, value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_doubles::RecordingMessageRouter;
    use super::*;

    #[test]
    fn note_on_with_velocity_zero_is_a_note_off() {
        let action = classify_channel_voice_message(
            &MidiMessage::NoteOn(0.into(), 60.into(), 0.into()),
            0,
        );
        assert_eq!(
            action,
            InputMessageAction::NoteOff {
                note: 60.into(),
                velocity: 0.into(),
            }
        );
    }

    #[test]
    fn message_on_other_channel_is_ignored() {
        let action = classify_channel_voice_message(
            &MidiMessage::NoteOn(1.into(), 60.into(), 100.into()),
            0,
        );
        assert_eq!(action, InputMessageAction::Ignored);
    }

    #[test]
    fn control_change_routes_through() {
        let mut router = RecordingMessageRouter::default();
        route_incoming_message(
            &mut router,
            &MidiMessage::ControlChange(0.into(), 7.into(), 100.into()),
            0,
            false,
        );
        assert_eq!(router.received.len(), 1);
    }

    #[test]
    fn busy_transfer_drops_the_message() {
        let mut router = RecordingMessageRouter::default();
        route_incoming_message(
            &mut router,
            &MidiMessage::NoteOn(0.into(), 60.into(), 100.into()),
            0,
            true,
        );
        assert!(router.received.is_empty());
    }
}
