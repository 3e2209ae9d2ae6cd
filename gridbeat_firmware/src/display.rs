//! Minimal status rendering: this device's display only needs to reflect
//! the [`gridbeat_engine::collaborators::DisplaySink`] contract (playback
//! state and BPM), not full UI chrome.

use core::fmt::Write;
use display_interface::DisplayError;
use embedded_graphics::{
    mono_font::{ascii::FONT_8X13, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    text::{Baseline, Text},
};
use gridbeat_engine::collaborators::DisplaySink;
use gridbeat_engine::tempo::PlaybackState;
use heapless::String;

use crate::peripherals::Display;

fn character_style() -> MonoTextStyle<'static, BinaryColor> {
    MonoTextStyle::new(&FONT_8X13, BinaryColor::On)
}

/// Buffers the latest state from the engine; a lower-priority task drains
/// it and flushes to the physical display, keeping I2C traffic off the
/// timing-critical path.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: PlaybackState,
    pub bpm: u16,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        StatusSnapshot {
            state: PlaybackState::Stopped,
            bpm: 0,
        }
    }
}

#[derive(Default)]
pub struct StatusSink {
    pub snapshot: StatusSnapshot,
}

impl DisplaySink for StatusSink {
    fn set_playback_state(&mut self, state: PlaybackState) {
        self.snapshot.state = state;
    }

    fn set_bpm(&mut self, bpm: u16) {
        self.snapshot.bpm = bpm;
    }
}

pub fn render_status(display: &mut Display, snapshot: StatusSnapshot) -> Result<(), DisplayError> {
    display.clear();

    let icon = match snapshot.state {
        PlaybackState::Playing => ">",
        PlaybackState::Stopped => "-",
    };
    let mut line: String<16> = String::new();
    let _ = write!(line, "{} {} bpm", icon, snapshot.bpm);

    Text::with_baseline(line.as_str(), Point::new(0, 0), character_style(), Baseline::Top)
        .draw(display)?;

    display.flush()?;
    Ok(())
}
