/// Which raw source produced a [`ClockEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    Internal,
    Midi,
    ExternalSync,
}

/// A single tick notification from one of the raw clock sources.
///
/// `is_resync` asks downstream observers to realign their phase to a
/// downbeat (a stale MIDI stream resuming, a source switch), and
/// `is_beat` marks a source's own coarser musical pulse (external
/// sync's 2 PPQN edge) rather than every raw tick. Both are false for
/// an ordinary tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockEvent {
    pub source: ClockSource,
    pub is_resync: bool,
    pub is_beat: bool,
    pub timestamp_us: u32,
}

impl ClockEvent {
    pub fn new(source: ClockSource, is_resync: bool, is_beat: bool, timestamp_us: u32) -> Self {
        ClockEvent {
            source,
            is_resync,
            is_beat,
            timestamp_us,
        }
    }
}
