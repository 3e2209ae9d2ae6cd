//! Top-level SysEx session router: inspects each inbound dump header to
//! decide whether it starts a sample transfer or a firmware transfer,
//! then holds that choice until the transfer finishes or is cancelled.
//! Only one kind of transfer can be active at a time; a header for the
//! other kind cancels whatever was in flight.

use embedded_storage::nor_flash::NorFlash;

use crate::config::MANUFACTURER_ID;
use crate::file_ops::FileSystem;
use crate::transfer::firmware::{is_firmware_header, FirmwarePayloadHandler};
use crate::transfer::protocol::{
    DataTransferProtocol, TransferResponse, TransferResult, CANCEL, DATA_PACKET, DUMP_HEADER,
};
use crate::transfer::sample::SamplePayloadHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveTransfer {
    None,
    Sample,
    Firmware,
}

/// Owns both payload protocols and decides which one a given SysEx
/// message belongs to.
pub struct SysexDispatcher<'a, FS: FileSystem, F: NorFlash> {
    sample: DataTransferProtocol<SamplePayloadHandler<FS>>,
    firmware: DataTransferProtocol<FirmwarePayloadHandler<'a, F>>,
    active: ActiveTransfer,
}

impl<'a, FS: FileSystem, F: NorFlash> SysexDispatcher<'a, FS, F> {
    pub fn new(file_system: FS, firmware_handler: FirmwarePayloadHandler<'a, F>) -> Self {
        SysexDispatcher {
            sample: DataTransferProtocol::new(SamplePayloadHandler::new(file_system)),
            firmware: DataTransferProtocol::new(firmware_handler),
            active: ActiveTransfer::None,
        }
    }

    /// True while a sample or firmware transfer session is in progress.
    pub fn is_busy(&self) -> bool {
        self.active != ActiveTransfer::None
    }

    /// Feeds one already-unwrapped SysEx message (type byte plus the
    /// body the matching handler expects) through the session that owns
    /// it, routing a fresh `DUMP_HEADER` to whichever payload kind it
    /// declares itself as.
    pub fn process_message(
        &mut self,
        message_type: u8,
        message_data: &[u8],
    ) -> (TransferResult, TransferResponse) {
        match message_type {
            DUMP_HEADER => {
                let wants_firmware = is_firmware_header(message_data);
                match (wants_firmware, self.active) {
                    (true, ActiveTransfer::Sample) => {
                        self.sample.process_message(CANCEL, &[]);
                    }
                    (false, ActiveTransfer::Firmware) => {
                        self.firmware.process_message(CANCEL, &[]);
                    }
                    _ => {}
                }
                self.active = if wants_firmware {
                    ActiveTransfer::Firmware
                } else {
                    ActiveTransfer::Sample
                };
                self.dispatch_to_active(message_type, message_data)
            }
            DATA_PACKET | CANCEL => {
                if self.active == ActiveTransfer::None {
                    return (TransferResult::StateError, TransferResponse::Nak(0));
                }
                let result = self.dispatch_to_active(message_type, message_data);
                if message_type == CANCEL
                    || result.0 == TransferResult::TransferComplete
                    || result.0 == TransferResult::PayloadError
                {
                    self.active = ActiveTransfer::None;
                }
                result
            }
            _ => (TransferResult::InvalidMessage, TransferResponse::Nak(0)),
        }
    }

    fn dispatch_to_active(
        &mut self,
        message_type: u8,
        message_data: &[u8],
    ) -> (TransferResult, TransferResponse) {
        match self.active {
            ActiveTransfer::Sample => self.sample.process_message(message_type, message_data),
            ActiveTransfer::Firmware => self.firmware.process_message(message_type, message_data),
            ActiveTransfer::None => (TransferResult::StateError, TransferResponse::Nak(0)),
        }
    }
}

/// Strips the `F0 7E <channel> ... F7` Universal Non-Realtime envelope
/// and returns the message type byte plus the remaining payload, or
/// `None` if `bytes` is not addressed to this device or malformed.
pub fn unwrap_sysex_frame(bytes: &[u8]) -> Option<(u8, &[u8])> {
    let last = *bytes.last()?;
    if bytes.len() < 5 || bytes[0] != 0xF0 || bytes[1] != 0x7E || last != 0xF7 {
        return None;
    }
    let body = &bytes[3..bytes.len() - 1];
    let (message_type, rest) = body.split_first()?;
    Some((*message_type, rest))
}

/// Builds the `F0 7E <channel> <byte> <packet_num> F7` handshake frame
/// for an ACK/NAK response, writing into `out` and returning the number
/// of bytes written.
pub fn build_handshake_frame(out: &mut [u8; 6], response: TransferResponse) -> usize {
    out[0] = 0xF0;
    out[1] = 0x7E;
    out[2] = MANUFACTURER_ID;
    match response {
        TransferResponse::Ack(packet_num) => {
            out[3] = 0x7F;
            out[4] = packet_num;
            out[5] = 0xF7;
            6
        }
        TransferResponse::Nak(packet_num) => {
            out[3] = 0x7E;
            out[4] = packet_num;
            out[5] = 0xF7;
            6
        }
        TransferResponse::NoReply => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::partition::{PartitionManager, PartitionRegion};
    use embedded_storage::nor_flash::{ErrorType, NorFlashError, NorFlashErrorKind, ReadNorFlash};
    use heapless::Vec;

    struct FakeHandle {
        written: Vec<u8, 4096>,
    }

    impl crate::file_ops::FileHandle for FakeHandle {
        fn write(&mut self, bytes: &[u8]) -> usize {
            let _ = self.written.extend_from_slice(bytes);
            bytes.len()
        }
        fn close(self) {}
    }

    struct FakeFileSystem;

    impl FileSystem for FakeFileSystem {
        type Handle = FakeHandle;
        fn open_for_write(&mut self, _path: &str) -> Option<Self::Handle> {
            Some(FakeHandle { written: Vec::new() })
        }
    }

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

    fn sample_header() -> [u8; 17] {
        let mut h = [0u8; 17];
        h[0] = 0x01;
        h[3] = 16;
        h[7] = 4; // length_words low byte -> 4 words, nonzero
        h
    }

    fn firmware_header(declared_size: u32) -> [u8; 17] {
        let mut h = [0u8; 17];
        h[0] = 0x01;
        h[1] = 0x7F;
        h[2] = 0x7F;
        h[3] = 1;
        h[4] = (declared_size & 0x7F) as u8;
        h[5] = ((declared_size >> 7) & 0x7F) as u8;
        h[6] = ((declared_size >> 14) & 0x7F) as u8;
        h
    }

    fn make_dispatcher<'a>(
        mgr: &'a mut PartitionManager,
        flash: &'a mut FakeFlash,
    ) -> SysexDispatcher<'a, FakeFileSystem, FakeFlash> {
        let firmware_handler = FirmwarePayloadHandler::new(mgr, flash);
        SysexDispatcher::new(FakeFileSystem, firmware_handler)
    }

    #[test]
    fn sample_header_routes_to_sample_session() {
        let mut mgr = PartitionManager::new(
            PartitionRegion { offset: 0, length: 4096 },
            PartitionRegion { offset: 4096, length: 4096 },
            true,
        );
        let mut flash = FakeFlash { data: [0u8; FLASH_SIZE] };
        let mut dispatcher = make_dispatcher(&mut mgr, &mut flash);
        let (result, resp) = dispatcher.process_message(DUMP_HEADER, &sample_header());
        assert_eq!(result, TransferResult::Ok);
        assert_eq!(resp, TransferResponse::Ack(0));
    }

    #[test]
    fn is_busy_reflects_active_session() {
        let mut mgr = PartitionManager::new(
            PartitionRegion { offset: 0, length: 4096 },
            PartitionRegion { offset: 4096, length: 4096 },
            true,
        );
        let mut flash = FakeFlash { data: [0u8; FLASH_SIZE] };
        let mut dispatcher = make_dispatcher(&mut mgr, &mut flash);
        assert!(!dispatcher.is_busy());
        dispatcher.process_message(DUMP_HEADER, &sample_header());
        assert!(dispatcher.is_busy());
    }

    #[test]
    fn firmware_header_routes_to_firmware_session() {
        let mut mgr = PartitionManager::new(
            PartitionRegion { offset: 0, length: 4096 },
            PartitionRegion { offset: 4096, length: 4096 },
            true,
        );
        let mut flash = FakeFlash { data: [0u8; FLASH_SIZE] };
        let mut dispatcher = make_dispatcher(&mut mgr, &mut flash);
        let (result, _) = dispatcher.process_message(DUMP_HEADER, &firmware_header(1024));
        assert_eq!(result, TransferResult::Ok);
    }

    #[test]
    fn data_packet_without_header_is_state_error() {
        let mut mgr = PartitionManager::new(
            PartitionRegion { offset: 0, length: 4096 },
            PartitionRegion { offset: 4096, length: 4096 },
            true,
        );
        let mut flash = FakeFlash { data: [0u8; FLASH_SIZE] };
        let mut dispatcher = make_dispatcher(&mut mgr, &mut flash);
        let (result, _) = dispatcher.process_message(DATA_PACKET, &[0u8; 122]);
        assert_eq!(result, TransferResult::StateError);
    }

    #[test]
    fn second_kind_header_cancels_first_session() {
        let mut mgr = PartitionManager::new(
            PartitionRegion { offset: 0, length: 4096 },
            PartitionRegion { offset: 4096, length: 4096 },
            true,
        );
        let mut flash = FakeFlash { data: [0u8; FLASH_SIZE] };
        let mut dispatcher = make_dispatcher(&mut mgr, &mut flash);
        dispatcher.process_message(DUMP_HEADER, &sample_header());
        let (result, _) = dispatcher.process_message(DUMP_HEADER, &firmware_header(1024));
        assert_eq!(result, TransferResult::Ok);
    }

    #[test]
    fn round_trips_frame_envelope() {
        let raw = [0xF0, 0x7E, 0x7D, 0x01, 0xAA, 0xF7];
        let (message_type, data) = unwrap_sysex_frame(&raw).unwrap();
        assert_eq!(message_type, 0x01);
        assert_eq!(data, &[0xAA]);
    }

    #[test]
    fn builds_ack_frame() {
        let mut buf = [0u8; 6];
        let len = build_handshake_frame(&mut buf, TransferResponse::Ack(5));
        assert_eq!(len, 6);
        assert_eq!(buf, [0xF0, 0x7E, MANUFACTURER_ID, 0x7F, 5, 0xF7]);
    }

    #[test]
    fn cancel_produces_no_reply_bytes() {
        let mut buf = [0u8; 6];
        let len = build_handshake_frame(&mut buf, TransferResponse::NoReply);
        assert_eq!(len, 0);
    }
}
