//! Structured logging for inbound/outbound MIDI traffic.

use defmt::trace;
use midi_types::MidiMessage;

pub fn log_message(message: &MidiMessage) {
    match message {
        MidiMessage::NoteOn(channel, note, velocity) => {
            trace!(
                "[midi] note on ch={} note={} vel={}",
                u8::from(*channel),
                u8::from(*note),
                u8::from(*velocity)
            );
        }
        MidiMessage::NoteOff(channel, note, velocity) => {
            trace!(
                "[midi] note off ch={} note={} vel={}",
                u8::from(*channel),
                u8::from(*note),
                u8::from(*velocity)
            );
        }
        MidiMessage::TimingClock => trace!("[midi] clock"),
        MidiMessage::Start => trace!("[midi] start"),
        MidiMessage::Continue => trace!("[midi] continue"),
        MidiMessage::Stop => trace!("[midi] stop"),
        _ => trace!("[midi] other"),
    }
}
