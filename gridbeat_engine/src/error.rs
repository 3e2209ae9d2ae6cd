//! Error types shared across the engine. No component panics on
//! malformed input from MIDI or flash; callers get one of these back.

/// Failure modes for the transfer subsystem (sample and firmware dumps).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    /// A data packet arrived with no active session.
    NoActiveSession,
    /// The packet's checksum did not match the recomputed one.
    ChecksumMismatch,
    /// A data packet's sequence number did not match the expected one.
    OutOfOrderPacket,
    /// More bytes arrived than the header declared.
    DeclaredSizeExceeded,
    /// The underlying file or flash write failed.
    StorageWrite,
    /// The destination partition is too small for the declared payload.
    PartitionTooSmall,
    /// A transfer was already in progress when a new header arrived.
    SessionAlreadyActive,
}

/// Failure modes for flash partition staging and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionError {
    /// The requested write range falls outside the partition region.
    OutOfBounds,
    /// The underlying flash erase operation failed.
    EraseFailed,
    /// The underlying flash program operation failed.
    ProgramFailed,
    /// `commit_staging` was called before `finalize`.
    NotFinalized,
    /// No inactive slot was available to stage into.
    NoFreeSlot,
}

/// Failure modes surfaced by parameter/config accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamError {
    /// Value was outside the parameter's valid range.
    OutOfRange,
}
