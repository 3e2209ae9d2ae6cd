//! Payload handler for firmware image transfers, staged through
//! [`PartitionManager`]/[`PartitionFlashWriter`] instead of the
//! filesystem the sample handler uses.

use embedded_storage::nor_flash::NorFlash;

use crate::config::SYSEX_DEVICE_CHANNEL;
use crate::transfer::checksum::sds_data_checksum;
use crate::transfer::codec::decode_8_to_7;
use crate::transfer::flash_writer::PartitionFlashWriter;
use crate::transfer::partition::{FirmwareImageMetadata, PartitionManager};
use crate::transfer::protocol::{PayloadHandler, PayloadProcessResult};

/// 14-bit sentinel in a dump header's sample-number field position that
/// marks it as a firmware header rather than a sample header.
const FIRMWARE_HEADER_TOKEN: u16 = 0x3FFF;

fn parse_14bit(low: u8, high: u8) -> u16 {
    (low as u16 & 0x7F) | ((high as u16 & 0x7F) << 7)
}

fn parse_21bit(b0: u8, b1: u8, b2: u8) -> u32 {
    (b0 as u32 & 0x7F) | ((b1 as u32 & 0x7F) << 7) | ((b2 as u32 & 0x7F) << 14)
}

fn combine_checksum_fields(high21: u32, low21: u32) -> u32 {
    let high_bits = high21 & 0x7FF;
    (high_bits << 21) | (low21 & 0x1FFFFF)
}

/// Returns `true` if `message`'s second/third bytes carry the firmware
/// sentinel, distinguishing a firmware dump header from a sample one
/// before either payload handler commits to parsing the rest.
pub fn is_firmware_header(message: &[u8]) -> bool {
    message.len() >= 3 && parse_14bit(message[1], message[2]) == FIRMWARE_HEADER_TOKEN
}

fn parse_firmware_header(message: &[u8]) -> Option<FirmwareImageMetadata> {
    if message.len() < 17 {
        return None;
    }
    if parse_14bit(message[1], message[2]) != FIRMWARE_HEADER_TOKEN {
        return None;
    }

    let declared_size = parse_21bit(message[4], message[5], message[6]);
    if declared_size == 0 {
        return None;
    }

    let checksum_high = parse_21bit(message[7], message[8], message[9]);
    let checksum_low = parse_21bit(message[10], message[11], message[12]);

    Some(FirmwareImageMetadata {
        format_version: message[3] & 0x7F,
        declared_size,
        checksum: combine_checksum_fields(checksum_high, checksum_low),
        version_tag: parse_21bit(message[13], message[14], message[15]),
        partition_hint: message[16] & 0x7F,
    })
}

pub struct FirmwarePayloadHandler<'a, F: NorFlash> {
    partition_manager: &'a mut PartitionManager,
    flash_writer: PartitionFlashWriter<'a, F>,
    metadata: FirmwareImageMetadata,
    bytes_received: u32,
    has_active_transfer: bool,
    checksum_accumulator: u32,
}

impl<'a, F: NorFlash> FirmwarePayloadHandler<'a, F> {
    pub fn new(partition_manager: &'a mut PartitionManager, flash: &'a mut F) -> Self {
        FirmwarePayloadHandler {
            partition_manager,
            flash_writer: PartitionFlashWriter::new(flash),
            metadata: FirmwareImageMetadata::default(),
            bytes_received: 0,
            has_active_transfer: false,
            checksum_accumulator: 0,
        }
    }

    pub fn bytes_received(&self) -> u32 {
        self.bytes_received
    }

    pub fn checksum_accumulator(&self) -> u32 {
        self.checksum_accumulator
    }
}

impl<'a, F: NorFlash> PayloadHandler for FirmwarePayloadHandler<'a, F> {
    fn begin_transfer(&mut self, header_data: &[u8]) -> bool {
        let Some(metadata) = parse_firmware_header(header_data) else {
            return false;
        };

        if self.has_active_transfer {
            self.cancel_transfer();
        }

        let Some(region) = self.partition_manager.begin_staging(&metadata) else {
            return false;
        };

        if !self.flash_writer.begin(region) {
            self.partition_manager.abort_staging();
            return false;
        }

        self.metadata = metadata;
        self.has_active_transfer = true;
        self.bytes_received = 0;
        self.checksum_accumulator = 0;
        true
    }

    fn process_packet(&mut self, packet_data: &[u8], _packet_num: u8) -> PayloadProcessResult {
        if !self.has_active_transfer {
            return PayloadProcessResult::Error;
        }
        if packet_data.len() != 120 {
            return PayloadProcessResult::Error;
        }

        let mut decode_buffer = [0u8; 128];
        let (consumed, decoded_len) = decode_8_to_7(packet_data, &mut decode_buffer);
        if consumed != packet_data.len() {
            return PayloadProcessResult::Error;
        }

        if self.bytes_received > self.metadata.declared_size {
            return PayloadProcessResult::Error;
        }
        let remaining = self.metadata.declared_size - self.bytes_received;
        if decoded_len as u32 > remaining {
            return PayloadProcessResult::Error;
        }

        if decoded_len > 0 {
            let chunk = &decode_buffer[..decoded_len];
            if self.flash_writer.write_chunk(chunk).is_err() {
                return PayloadProcessResult::Error;
            }
            for &b in chunk {
                self.checksum_accumulator = self.checksum_accumulator.wrapping_add(b as u32);
            }
            self.bytes_received += decoded_len as u32;
        }

        if self.bytes_received >= self.metadata.declared_size {
            PayloadProcessResult::TransferComplete
        } else {
            PayloadProcessResult::Ok
        }
    }

    fn finalize_transfer(&mut self) -> bool {
        if !self.has_active_transfer {
            return false;
        }
        if self.flash_writer.finalize().is_err() {
            self.cancel_transfer();
            return false;
        }
        if self.partition_manager.commit_staging(&self.metadata).is_err() {
            self.cancel_transfer();
            return false;
        }
        self.has_active_transfer = false;
        true
    }

    fn cancel_transfer(&mut self) {
        if self.has_active_transfer {
            self.flash_writer.cancel();
            self.partition_manager.abort_staging();
            self.has_active_transfer = false;
        }
        self.bytes_received = 0;
        self.checksum_accumulator = 0;
    }

    fn calculate_checksum(&self, packet_num: u8, data: &[u8]) -> u8 {
        sds_data_checksum(SYSEX_DEVICE_CHANNEL, packet_num, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::partition::PartitionRegion;
    use embedded_storage::nor_flash::{ErrorType, NorFlashError, NorFlashErrorKind, ReadNorFlash};

    const FLASH_SIZE: usize = 8192;

    struct FakeFlash {
        data: [u8; FLASH_SIZE],
    }

    #[derive(Debug)]
    struct FakeFlashError;
    impl NorFlashError for FakeFlashError {
        fn kind(&self) -> NorFlashErrorKind {
            NorFlashErrorKind::Other
        }
    }
    impl ErrorType for FakeFlash {
        type Error = FakeFlashError;
    }
    impl ReadNorFlash for FakeFlash {
        const READ_SIZE: usize = 1;
        fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            let start = offset as usize;
            bytes.copy_from_slice(&self.data[start..start + bytes.len()]);
            Ok(())
        }
        fn capacity(&self) -> usize {
            FLASH_SIZE
        }
    }
    impl NorFlash for FakeFlash {
        const WRITE_SIZE: usize = 1;
        const ERASE_SIZE: usize = 4096;
        fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
            for b in &mut self.data[from as usize..to as usize] {
                *b = 0xFF;
            }
            Ok(())
        }
        fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
            let start = offset as usize;
            self.data[start..start + bytes.len()].copy_from_slice(bytes);
            Ok(())
        }
    }

    fn header(declared_size: u32) -> [u8; 17] {
        let mut h = [0u8; 17];
        h[0] = 0x01;
        h[1] = (FIRMWARE_HEADER_TOKEN & 0x7F) as u8;
        h[2] = ((FIRMWARE_HEADER_TOKEN >> 7) & 0x7F) as u8;
        h[3] = 1;
        h[4] = (declared_size & 0x7F) as u8;
        h[5] = ((declared_size >> 7) & 0x7F) as u8;
        h[6] = ((declared_size >> 14) & 0x7F) as u8;
        h
    }

    #[test]
    fn recognizes_firmware_sentinel() {
        let h = header(1000);
        assert!(is_firmware_header(&h));
    }

    #[test]
    fn sample_header_is_not_firmware() {
        let h = [0x01u8; 17];
        assert!(!is_firmware_header(&h));
    }

    #[test]
    fn begin_transfer_stages_into_inactive_slot() {
        let mut flash = FakeFlash { data: [0u8; FLASH_SIZE] };
        let mut mgr = PartitionManager::new(
            PartitionRegion { offset: 0, length: 4096 },
            PartitionRegion { offset: 4096, length: 4096 },
            true,
        );
        let mut handler = FirmwarePayloadHandler::new(&mut mgr, &mut flash);
        assert!(handler.begin_transfer(&header(1024)));
    }

    #[test]
    fn oversized_firmware_is_rejected() {
        let mut flash = FakeFlash { data: [0u8; FLASH_SIZE] };
        let mut mgr = PartitionManager::new(
            PartitionRegion { offset: 0, length: 4096 },
            PartitionRegion { offset: 4096, length: 100 },
            true,
        );
        let mut handler = FirmwarePayloadHandler::new(&mut mgr, &mut flash);
        assert!(!handler.begin_transfer(&header(1024)));
    }
}
