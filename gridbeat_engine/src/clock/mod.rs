//! Raw clock sources: internal BPM-derived clock, MIDI clock ingress
//! tracking, and the external analog sync input. Each source only
//! knows how to produce [`ClockEvent`]s; arbitration between them lives
//! in [`crate::router`].

mod event;
mod internal;
mod midi_in;
mod sync_in;

pub use event::{ClockEvent, ClockSource};
pub use internal::InternalClock;
pub use midi_in::MidiClockProcessor;
pub use sync_in::ExternalSyncInput;
