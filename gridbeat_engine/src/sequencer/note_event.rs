use midi_types::{Channel, Note, Value7};

/// A single note trigger produced by the sequencer, ready to be handed
/// to the MIDI output queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub track: u8,
    pub note: Note,
    pub velocity: Value7,
    pub channel: Channel,
}

impl NoteEvent {
    pub fn new(track: u8, note: Note, velocity: Value7, channel: Channel) -> Self {
        NoteEvent {
            track,
            note,
            velocity,
            channel,
        }
    }

    pub fn from_raw(track: u8, note: u8, velocity: u8, channel: u8) -> Self {
        NoteEvent {
            track,
            note: note.into(),
            velocity: velocity.into(),
            channel: channel.into(),
        }
    }

    pub fn from_step(track: u8, note: Note, velocity: Value7, channel: u8) -> Self {
        NoteEvent {
            track,
            note,
            velocity,
            channel: channel.into(),
        }
    }
}
