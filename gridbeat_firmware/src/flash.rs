//! Thin [`embedded_storage::nor_flash`] wrapper over the RP2040's onboard
//! QSPI flash, used to stage firmware images into the inactive A/B slot.
//! Erase and program both run through the bootrom helpers, which require
//! interrupts disabled on both cores for the duration of the flash
//! access window.

use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash};
use rp2040_hal::rom_data;

/// Base address of flash as seen from the XIP memory map, used to turn a
/// partition-relative offset into the absolute address the bootrom calls
/// expect (which are already flash-relative, not XIP-mapped, so no
/// translation is actually needed beyond bounds checking).
pub const FLASH_SIZE_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug)]
pub struct FlashError;

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        NorFlashErrorKind::Other
    }
}

/// Exclusive handle to the onboard flash chip. Holding one implies no
/// other code on either core is concurrently executing from flash,
/// which the caller must arrange (RTIC's `#[local]` ownership is enough
/// on a single-core build; the dual-core case additionally needs the
/// other core parked for the access window).
pub struct OnboardFlash;

impl ErrorType for OnboardFlash {
    type Error = FlashError;
}

impl ReadNorFlash for OnboardFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        if start + bytes.len() > FLASH_SIZE_BYTES {
            return Err(FlashError);
        }
        let xip_base = 0x1000_0000usize as *const u8;
        unsafe {
            core::ptr::copy_nonoverlapping(xip_base.add(start), bytes.as_mut_ptr(), bytes.len());
        }
        Ok(())
    }

    fn capacity(&self) -> usize {
        FLASH_SIZE_BYTES
    }
}

impl NorFlash for OnboardFlash {
    const WRITE_SIZE: usize = 256;
    const ERASE_SIZE: usize = 4096;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        let len = to.checked_sub(from).ok_or(FlashError)?;
        cortex_m::interrupt::free(|_| unsafe {
            rom_data::connect_internal_flash();
            rom_data::flash_exit_xip();
            rom_data::flash_range_erase(from, len as usize, 1 << 16, 0xD8);
            rom_data::flash_flush_cache();
            rom_data::flash_enter_cmd_xip();
        });
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        cortex_m::interrupt::free(|_| unsafe {
            rom_data::connect_internal_flash();
            rom_data::flash_exit_xip();
            rom_data::flash_range_program(offset, bytes.as_ptr(), bytes.len());
            rom_data::flash_flush_cache();
            rom_data::flash_enter_cmd_xip();
        });
        Ok(())
    }
}
