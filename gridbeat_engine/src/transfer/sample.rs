//! Payload handler for 16-bit PCM sample dumps (SDS DUMP_HEADER/DATA_PACKET
//! with bit depth fixed at 16).

use crate::config::SYSEX_DEVICE_CHANNEL;
use crate::file_ops::{sample_filename, FileHandle, FileSystem};
use crate::transfer::checksum::sds_data_checksum;
use crate::transfer::protocol::{PayloadHandler, PayloadProcessResult};

/// Metadata parsed from an SDS dump header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleInfo {
    pub sample_number: u16,
    pub bit_depth: u8,
    pub sample_period_ns: u32,
    pub length_words: u32,
    pub loop_start: u32,
    pub loop_end: u32,
    pub loop_type: u8,
}

impl SampleInfo {
    pub fn sample_rate_hz(&self) -> u32 {
        if self.sample_period_ns > 0 {
            1_000_000_000u32 / self.sample_period_ns
        } else {
            44_100
        }
    }

    pub fn byte_length(&self) -> u32 {
        self.length_words * 2
    }
}

fn parse_14bit(low: u8, high: u8) -> u16 {
    (low as u16 & 0x7F) | ((high as u16 & 0x7F) << 7)
}

fn parse_21bit(b0: u8, b1: u8, b2: u8) -> u32 {
    (b0 as u32 & 0x7F) | ((b1 as u32 & 0x7F) << 7) | ((b2 as u32 & 0x7F) << 14)
}

/// Reconstructs a signed 16-bit sample from its 3-byte SDS encoding:
/// the unsigned value is left-justified across the 3 bytes' low 7 bits
/// each, then `0x8000` is subtracted to map SDS's unsigned convention
/// (`0x0000` = full negative) back to a signed sample.
fn unpack_16bit_sample(b0: u8, b1: u8, b2: u8) -> i16 {
    let unsigned_sample = ((b0 as u16 & 0x7F) << 9) | ((b1 as u16 & 0x7F) << 2) | ((b2 as u16 & 0x7F) >> 5);
    (unsigned_sample as i32 - 0x8000) as i16
}

pub struct SamplePayloadHandler<FS: FileSystem> {
    file_system: FS,
    sample: SampleInfo,
    bytes_received: u32,
    open_file: Option<FS::Handle>,
}

impl<FS: FileSystem> SamplePayloadHandler<FS> {
    pub fn new(file_system: FS) -> Self {
        SamplePayloadHandler {
            file_system,
            sample: SampleInfo::default(),
            bytes_received: 0,
            open_file: None,
        }
    }

    pub fn sample_info(&self) -> SampleInfo {
        self.sample
    }

    pub fn bytes_received(&self) -> u32 {
        self.bytes_received
    }
}

impl<FS: FileSystem> PayloadHandler for SamplePayloadHandler<FS> {
    fn begin_transfer(&mut self, header_data: &[u8]) -> bool {
        if header_data.len() < 17 {
            return false;
        }

        let sample = SampleInfo {
            sample_number: parse_14bit(header_data[1], header_data[2]),
            bit_depth: header_data[3],
            sample_period_ns: parse_21bit(header_data[4], header_data[5], header_data[6]),
            length_words: parse_21bit(header_data[7], header_data[8], header_data[9]),
            loop_start: parse_21bit(header_data[10], header_data[11], header_data[12]),
            loop_end: parse_21bit(header_data[13], header_data[14], header_data[15]),
            loop_type: header_data[16],
        };

        if sample.byte_length() == 0 {
            return false;
        }

        let filename = sample_filename(sample.sample_number);
        let handle = match self.file_system.open_for_write(filename.as_str()) {
            Some(h) => h,
            None => return false,
        };

        self.sample = sample;
        self.open_file = Some(handle);
        self.bytes_received = 0;
        true
    }

    fn process_packet(&mut self, packet_data: &[u8], _packet_num: u8) -> PayloadProcessResult {
        let Some(handle) = self.open_file.as_mut() else {
            return PayloadProcessResult::Error;
        };
        if packet_data.len() != 120 {
            return PayloadProcessResult::Error;
        }

        let mut unpacked = [0u8; 80];
        let mut out_pos = 0;
        for i in 0..40 {
            let offset = i * 3;
            if offset + 2 >= packet_data.len() {
                break;
            }
            let sample =
                unpack_16bit_sample(packet_data[offset], packet_data[offset + 1], packet_data[offset + 2]);
            unpacked[out_pos] = (sample & 0xFF) as u8;
            unpacked[out_pos + 1] = ((sample >> 8) & 0xFF) as u8;
            out_pos += 2;
        }

        let remaining = self.sample.byte_length().saturating_sub(self.bytes_received);
        let bytes_to_write = (remaining as usize).min(out_pos);

        let written = handle.write(&unpacked[..bytes_to_write]);
        if written != bytes_to_write {
            return PayloadProcessResult::Error;
        }
        self.bytes_received += written as u32;

        if self.bytes_received >= self.sample.byte_length() {
            PayloadProcessResult::TransferComplete
        } else {
            PayloadProcessResult::Ok
        }
    }

    fn finalize_transfer(&mut self) -> bool {
        if let Some(handle) = self.open_file.take() {
            handle.close();
        }
        true
    }

    fn cancel_transfer(&mut self) {
        if let Some(handle) = self.open_file.take() {
            handle.close();
        }
        self.bytes_received = 0;
    }

    fn calculate_checksum(&self, packet_num: u8, data: &[u8]) -> u8 {
        sds_data_checksum(SYSEX_DEVICE_CHANNEL, packet_num, data)
    }
}
