//! Page-buffered, erase-then-program flash writer used to stage a
//! firmware image into a [`PartitionRegion`] before it is committed.

use embedded_storage::nor_flash::NorFlash;

use crate::config::FLASH_PAGE_SIZE;
use crate::error::PartitionError;
use crate::transfer::partition::PartitionRegion;

fn align_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Buffers writes up to one flash page, erasing each sector the first
/// time a write touches it, and programs whole pages at a time.
pub struct PartitionFlashWriter<'a, F: NorFlash> {
    flash: &'a mut F,
    region: PartitionRegion,
    busy: bool,
    bytes_written: u32,
    erased_bytes: u32,
    buffer_base_offset: u32,
    buffer_count: usize,
    buffer: [u8; FLASH_PAGE_SIZE],
}

impl<'a, F: NorFlash> PartitionFlashWriter<'a, F> {
    pub fn new(flash: &'a mut F) -> Self {
        PartitionFlashWriter {
            flash,
            region: PartitionRegion::default(),
            busy: false,
            bytes_written: 0,
            erased_bytes: 0,
            buffer_base_offset: 0,
            buffer_count: 0,
            buffer: [0u8; FLASH_PAGE_SIZE],
        }
    }

    pub fn page_size_bytes(&self) -> usize {
        FLASH_PAGE_SIZE
    }

    pub fn bytes_written(&self) -> u32 {
        self.bytes_written
    }

    pub fn begin(&mut self, region: PartitionRegion) -> bool {
        if self.busy {
            return false;
        }
        self.region = region;
        self.busy = true;
        self.bytes_written = 0;
        self.erased_bytes = 0;
        self.buffer_base_offset = 0;
        self.buffer_count = 0;
        true
    }

    fn ensure_erased(&mut self, relative_offset: u32, length: u32) -> Result<(), PartitionError> {
        if relative_offset + length <= self.erased_bytes {
            return Ok(());
        }
        let erase_to = align_up(relative_offset + length, F::ERASE_SIZE as u32);
        let erase_from = self.erased_bytes;
        self.flash
            .erase(self.region.offset + erase_from, self.region.offset + erase_to)
            .map_err(|_| PartitionError::EraseFailed)?;
        self.erased_bytes = erase_to;
        Ok(())
    }

    fn flush_buffer(&mut self) -> Result<(), PartitionError> {
        if self.buffer_count == 0 {
            return Ok(());
        }
        self.ensure_erased(self.buffer_base_offset, self.buffer.len() as u32)?;
        self.flash
            .write(self.region.offset + self.buffer_base_offset, &self.buffer)
            .map_err(|_| PartitionError::ProgramFailed)?;
        self.buffer_count = 0;
        Ok(())
    }

    /// Writes a chunk of decoded firmware bytes, buffering up to one
    /// page at a time and flushing full pages as they fill.
    pub fn write_chunk(&mut self, mut chunk: &[u8]) -> Result<(), PartitionError> {
        if !self.busy {
            return Err(PartitionError::NotFinalized);
        }
        if !self
            .region
            .contains_range(self.bytes_written, chunk.len() as u32)
        {
            return Err(PartitionError::OutOfBounds);
        }

        while !chunk.is_empty() {
            if self.buffer_count == 0 {
                self.buffer_base_offset = self.bytes_written - (self.bytes_written % FLASH_PAGE_SIZE as u32);
                let into_page = (self.bytes_written - self.buffer_base_offset) as usize;
                self.buffer_count = into_page;
            }
            let space = self.buffer.len() - self.buffer_count;
            let take = space.min(chunk.len());
            self.buffer[self.buffer_count..self.buffer_count + take].copy_from_slice(&chunk[..take]);
            self.buffer_count += take;
            self.bytes_written += take as u32;
            chunk = &chunk[take..];

            if self.buffer_count == self.buffer.len() {
                self.flush_buffer()?;
            }
        }
        Ok(())
    }

    /// Pads a final partial page with `0xFF` before flushing it, so the
    /// tail of the last page beyond the declared image size reads back
    /// erased rather than whatever stale bytes were in the buffer. An
    /// image whose size is an exact multiple of the page size leaves
    /// `buffer_count` at zero here and needs no padding.
    pub fn finalize(&mut self) -> Result<(), PartitionError> {
        if self.buffer_count > 0 && self.buffer_count < self.buffer.len() {
            for b in &mut self.buffer[self.buffer_count..] {
                *b = 0xFF;
            }
            self.buffer_count = self.buffer.len();
        }
        self.flush_buffer()?;
        self.busy = false;
        Ok(())
    }

    pub fn cancel(&mut self) {
        self.busy = false;
        self.buffer_count = 0;
        self.bytes_written = 0;
    }
}
