#![cfg_attr(not(test), no_std)]

//! Real-time timing and playback engine: multi-source clock
//! arbitration, phase-coherent speed scaling, swing-aware step
//! sequencing, and reliable MIDI sample/firmware transfer to
//! flash-backed storage.
//!
//! Hardware access (UART, USB, QSPI flash, display) lives in the
//! `gridbeat_firmware` binary crate; this crate only knows about the
//! trait boundaries in [`collaborators`] and [`file_ops`] plus the
//! [`transfer::PartitionFlashWriter`]'s generic `NorFlash` bound.

pub mod clock;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod file_ops;
pub mod midi_io;
pub mod rng;
pub mod router;
pub mod sequencer;
pub mod speed;
pub mod tempo;
pub mod transfer;
