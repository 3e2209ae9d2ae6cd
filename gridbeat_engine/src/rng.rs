//! Source of randomness for step probability/offset generation, backed
//! by the RP2040's ring oscillator on-device and the OS RNG on the
//! desktop under `host_testing`.

#[cfg(feature = "target_release")]
use rp2040_hal::rosc::{Enabled, RingOscillator};

#[cfg(feature = "host_testing")]
use rand::prelude::*;

#[cfg(feature = "target_release")]
use rand_core::RngCore;

pub struct EntropySource {
    #[cfg(feature = "target_release")]
    rosc: RingOscillator<Enabled>,
}

impl EntropySource {
    #[cfg(feature = "target_release")]
    pub fn new(rosc: RingOscillator<Enabled>) -> EntropySource {
        EntropySource { rosc }
    }

    #[cfg(feature = "host_testing")]
    pub fn new() -> EntropySource {
        EntropySource {}
    }

    #[cfg(feature = "target_release")]
    pub fn random_u32(&mut self) -> u32 {
        self.rosc.next_u64() as u32
    }

    #[cfg(feature = "host_testing")]
    pub fn random_u32(&mut self) -> u32 {
        random()
    }

    /// Uniform percentage roll in `0..100`, used for probability and
    /// random-offset gating.
    pub fn roll_percent(&mut self) -> u8 {
        (self.random_u32() % 100) as u8
    }
}

#[cfg(feature = "host_testing")]
impl Default for EntropySource {
    fn default() -> Self {
        Self::new()
    }
}
