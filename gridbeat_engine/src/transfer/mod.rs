//! Reliable MIDI SysEx transfer of sample PCM data and firmware images
//! to flash-backed storage, built on a generic packet transport shared
//! by both payload kinds.

mod checksum;
mod codec;
mod dispatch;
mod firmware;
mod flash_writer;
mod partition;
mod protocol;
mod sample;

pub use dispatch::{build_handshake_frame, unwrap_sysex_frame, SysexDispatcher};
pub use firmware::{is_firmware_header, FirmwarePayloadHandler};
pub use flash_writer::PartitionFlashWriter;
pub use partition::{FirmwareImageMetadata, PartitionManager, PartitionRegion};
pub use protocol::{
    DataTransferProtocol, PayloadHandler, PayloadProcessResult, TransferResponse, TransferResult,
    TransferState,
};
pub use sample::{SampleInfo, SamplePayloadHandler};
