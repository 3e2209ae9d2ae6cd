//! Runtime configuration, built once at boot and handed to components by
//! value or reference. Keeps magic numbers in one place instead of
//! scattered through the timing/transfer modules.

/// SysEx manufacturer ID used to address this device (non-commercial /
/// educational-use ID block, matching the original firmware's choice).
pub const MANUFACTURER_ID: u8 = 0x7D;

/// Device channel byte folded into the SDS data-packet checksum.
pub const SYSEX_DEVICE_CHANNEL: u8 = 0x65;

/// Minimum spacing enforced between non-realtime outgoing MIDI messages.
pub const MIN_INTERVAL_US_NON_REALTIME: u32 = 960;

/// How long a MIDI clock source may go without a tick before it is
/// considered stale.
pub const MIDI_CLOCK_STALE_US: u32 = 500_000;

/// Minimum time between two edges on the sync input, used to reject
/// contact bounce.
pub const SYNC_PULSE_COOLDOWN_US: u32 = 2_000;

/// Minimum stable time before a sync cable insertion/removal is trusted.
pub const SYNC_DETECT_DEBOUNCE_US: u32 = 20_000;

/// Flash sector size assumed by the partition writer.
pub const FLASH_SECTOR_SIZE: usize = 4096;

/// Flash page size assumed by the partition writer.
pub const FLASH_PAGE_SIZE: usize = 256;

/// Fixed size of a Sample Dump Standard data packet payload.
pub const SDS_PACKET_DATA_LEN: usize = 120;

/// Bounded queue depth for MIDI ingress/egress.
pub const MIDI_QUEUE_SIZE: usize = 64;

/// Number of tracks in a sequence.
pub const TRACK_COUNT: usize = 4;

/// Number of steps per track.
pub const STEPS_PER_TRACK: usize = 8;

/// Internal sequencer timebase, in pulses per quarter note.
pub const INTERNAL_PPQN: u8 = 12;

/// Raw MIDI clock timebase, in pulses per quarter note.
pub const MIDI_PPQN: u8 = 24;

/// Top-level tunables assembled at boot and threaded into components by
/// reference. Fields beyond the module-level constants above are the
/// ones a user is expected to actually change (stored in `config.json`
/// on the device).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub default_bpm: u16,
    pub default_swing_percent: u8,
    pub midi_channel: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_bpm: 120,
            default_swing_percent: 50,
            midi_channel: 0,
        }
    }
}
