//! A/B firmware partition staging, modelled after the bootrom-backed
//! slot manager: two fixed flash regions (slot A / slot B), one active
//! and one free to stage a new image into.

use crate::config::FLASH_SECTOR_SIZE;
use crate::error::PartitionError;

/// A contiguous byte range within flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartitionRegion {
    pub offset: u32,
    pub length: u32,
}

impl PartitionRegion {
    pub fn contains_range(&self, relative_offset: u32, len: u32) -> bool {
        relative_offset.checked_add(len).map_or(false, |end| end <= self.length)
    }
}

/// Metadata parsed from a firmware dump header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FirmwareImageMetadata {
    pub format_version: u8,
    pub declared_size: u32,
    pub checksum: u32,
    pub version_tag: u32,
    pub partition_hint: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotInfo {
    region: PartitionRegion,
    valid: bool,
}

/// Tracks which of the two firmware slots is currently active and
/// arbitrates staging a new image into the inactive one.
pub struct PartitionManager {
    slot_a: SlotInfo,
    slot_b: SlotInfo,
    active_slot_is_a: bool,
    staging_active: bool,
    staging_region: PartitionRegion,
}

impl PartitionManager {
    pub fn new(slot_a_region: PartitionRegion, slot_b_region: PartitionRegion, active_slot_is_a: bool) -> Self {
        PartitionManager {
            slot_a: SlotInfo {
                region: slot_a_region,
                valid: true,
            },
            slot_b: SlotInfo {
                region: slot_b_region,
                valid: true,
            },
            active_slot_is_a,
            staging_active: false,
            staging_region: PartitionRegion::default(),
        }
    }

    pub fn active_region(&self) -> PartitionRegion {
        if self.active_slot_is_a {
            self.slot_a.region
        } else {
            self.slot_b.region
        }
    }

    fn inactive_slot(&self) -> SlotInfo {
        if self.active_slot_is_a {
            self.slot_b
        } else {
            self.slot_a
        }
    }

    /// Reserves the inactive slot for staging, rejecting if the
    /// declared image size would not fit.
    pub fn begin_staging(&mut self, metadata: &FirmwareImageMetadata) -> Option<PartitionRegion> {
        if self.staging_active {
            return None;
        }
        let region = self.inactive_slot().region;
        if metadata.declared_size > region.length {
            return None;
        }
        self.staging_active = true;
        self.staging_region = region;
        Some(region)
    }

    pub fn abort_staging(&mut self) {
        self.staging_active = false;
        self.staging_region = PartitionRegion::default();
    }

    /// Marks the staged slot as the new active one. Only valid once the
    /// flash writer has finalized its writes.
    pub fn commit_staging(&mut self, _metadata: &FirmwareImageMetadata) -> Result<(), PartitionError> {
        if !self.staging_active {
            return Err(PartitionError::NotFinalized);
        }
        self.active_slot_is_a = !self.active_slot_is_a;
        self.staging_active = false;
        Ok(())
    }

    pub fn is_staging(&self) -> bool {
        self.staging_active
    }
}

/// Round a byte count up to the nearest flash sector boundary.
pub fn sectors_covering(length: u32) -> u32 {
    (length + FLASH_SECTOR_SIZE as u32 - 1) / FLASH_SECTOR_SIZE as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regions() -> (PartitionRegion, PartitionRegion) {
        (
            PartitionRegion { offset: 0, length: 1_048_576 },
            PartitionRegion { offset: 1_048_576, length: 1_048_576 },
        )
    }

    #[test]
    fn stages_into_inactive_slot() {
        let (a, b) = regions();
        let mut mgr = PartitionManager::new(a, b, true);
        let meta = FirmwareImageMetadata { declared_size: 1024, ..Default::default() };
        let staged = mgr.begin_staging(&meta).unwrap();
        assert_eq!(staged, b);
    }

    #[test]
    fn oversized_image_is_rejected() {
        let (a, b) = regions();
        let mut mgr = PartitionManager::new(a, b, true);
        let meta = FirmwareImageMetadata { declared_size: b.length + 1, ..Default::default() };
        assert!(mgr.begin_staging(&meta).is_none());
    }

    #[test]
    fn commit_flips_active_slot() {
        let (a, b) = regions();
        let mut mgr = PartitionManager::new(a, b, true);
        let meta = FirmwareImageMetadata { declared_size: 1024, ..Default::default() };
        mgr.begin_staging(&meta).unwrap();
        mgr.commit_staging(&meta).unwrap();
        assert_eq!(mgr.active_region(), b);
    }

    #[test]
    fn commit_without_staging_errors() {
        let (a, b) = regions();
        let mut mgr = PartitionManager::new(a, b, true);
        let meta = FirmwareImageMetadata::default();
        assert_eq!(mgr.commit_staging(&meta), Err(PartitionError::NotFinalized));
    }

    #[test]
    fn double_staging_is_rejected() {
        let (a, b) = regions();
        let mut mgr = PartitionManager::new(a, b, true);
        let meta = FirmwareImageMetadata { declared_size: 1024, ..Default::default() };
        mgr.begin_staging(&meta).unwrap();
        assert!(mgr.begin_staging(&meta).is_none());
    }

    #[test]
    fn abort_frees_staging_slot() {
        let (a, b) = regions();
        let mut mgr = PartitionManager::new(a, b, true);
        let meta = FirmwareImageMetadata { declared_size: 1024, ..Default::default() };
        mgr.begin_staging(&meta).unwrap();
        mgr.abort_staging();
        assert!(mgr.begin_staging(&meta).is_some());
    }

    #[test]
    fn sector_rounding() {
        assert_eq!(sectors_covering(1), 1);
        assert_eq!(sectors_covering(FLASH_SECTOR_SIZE as u32), 1);
        assert_eq!(sectors_covering(FLASH_SECTOR_SIZE as u32 + 1), 2);
    }

    #[test]
    fn region_containment() {
        let region = PartitionRegion { offset: 0, length: 100 };
        assert!(region.contains_range(0, 100));
        assert!(!region.contains_range(1, 100));
        assert!(!region.contains_range(0, 101));
    }
}
