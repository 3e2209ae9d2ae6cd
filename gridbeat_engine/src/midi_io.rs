//! Bounded ingress/egress MIDI queues shared between the UART/USB ISR
//! context and the cooperative main loop.

use heapless::spsc::{Consumer, Producer, Queue};
use midi_types::MidiMessage;

use crate::config::{MIDI_QUEUE_SIZE, MIN_INTERVAL_US_NON_REALTIME};

/// Maximum SysEx payload buffered per outgoing message, matching the
/// 123-byte SDS data-packet envelope plus a small margin.
pub const SYSEX_MAX_SIZE: usize = 128;

/// A queued outgoing message: either a regular typed MIDI message or a
/// raw SysEx byte buffer (used for transfer ACK/NAK/data replies).
#[derive(Debug, Clone)]
pub enum OutgoingMidiMessage {
    Typed(MidiMessage),
    SysEx(heapless::Vec<u8, SYSEX_MAX_SIZE>),
}

impl OutgoingMidiMessage {
    /// Realtime clock/start/stop/continue bytes bypass the rate limiter
    /// since they must stay phase-locked to the tempo handler.
    pub fn is_realtime(&self) -> bool {
        matches!(
            self,
            OutgoingMidiMessage::Typed(
                MidiMessage::TimingClock
                    | MidiMessage::Start
                    | MidiMessage::Continue
                    | MidiMessage::Stop
            )
        )
    }
}

pub type OutQueue = Queue<OutgoingMidiMessage, MIDI_QUEUE_SIZE>;
pub type InQueue = Queue<MidiMessage, MIDI_QUEUE_SIZE>;

/// Producer half of the outgoing queue, used from the main loop / note
/// generation paths.
pub struct MidiOutputProducer<'q> {
    producer: Producer<'q, OutgoingMidiMessage, MIDI_QUEUE_SIZE>,
}

impl<'q> MidiOutputProducer<'q> {
    pub fn new(producer: Producer<'q, OutgoingMidiMessage, MIDI_QUEUE_SIZE>) -> Self {
        MidiOutputProducer { producer }
    }

    /// Returns `false` if the queue is full; the caller drops the
    /// message rather than blocking, matching the no-panic policy.
    pub fn enqueue(&mut self, message: OutgoingMidiMessage) -> bool {
        self.producer.enqueue(message).is_ok()
    }
}

/// Consumer half of the outgoing queue, drained by the egress task
/// under the non-realtime rate limit.
pub struct MidiOutputConsumer<'q> {
    consumer: Consumer<'q, OutgoingMidiMessage, MIDI_QUEUE_SIZE>,
    last_non_realtime_send_us: Option<u32>,
}

impl<'q> MidiOutputConsumer<'q> {
    pub fn new(consumer: Consumer<'q, OutgoingMidiMessage, MIDI_QUEUE_SIZE>) -> Self {
        MidiOutputConsumer {
            consumer,
            last_non_realtime_send_us: None,
        }
    }

    /// Pops and returns the next message to send, if the rate limiter
    /// allows sending one right now. Realtime messages are never held
    /// back; non-realtime messages wait at least
    /// [`MIN_INTERVAL_US_NON_REALTIME`] after the previous send.
    pub fn poll(&mut self, now_us: u32) -> Option<OutgoingMidiMessage> {
        let next = self.consumer.peek()?;
        if !next.is_realtime() {
            if let Some(last) = self.last_non_realtime_send_us {
                if now_us.wrapping_sub(last) < MIN_INTERVAL_US_NON_REALTIME {
                    return None;
                }
            }
        }
        let message = self.consumer.dequeue()?;
        if !message.is_realtime() {
            self.last_non_realtime_send_us = Some(now_us);
        }
        Some(message)
    }
}

/// Consumer half of the incoming queue, drained one-at-a-time by the
/// event loop so a storm of inbound bytes never blocks the main loop
/// for longer than one message's processing.
pub struct MidiInputConsumer<'q> {
    consumer: Consumer<'q, MidiMessage, MIDI_QUEUE_SIZE>,
}

impl<'q> MidiInputConsumer<'q> {
    pub fn new(consumer: Consumer<'q, MidiMessage, MIDI_QUEUE_SIZE>) -> Self {
        MidiInputConsumer { consumer }
    }

    pub fn poll(&mut self) -> Option<MidiMessage> {
        self.consumer.dequeue()
    }
}

/// Producer half of the incoming queue, fed from the UART/USB receive
/// ISR context.
pub struct MidiInputProducer<'q> {
    producer: Producer<'q, MidiMessage, MIDI_QUEUE_SIZE>,
}

impl<'q> MidiInputProducer<'q> {
    pub fn new(producer: Producer<'q, MidiMessage, MIDI_QUEUE_SIZE>) -> Self {
        MidiInputProducer { producer }
    }

    pub fn enqueue(&mut self, message: MidiMessage) -> bool {
        self.producer.enqueue(message).is_ok()
    }
}
