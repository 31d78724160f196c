//! # Calibration Store
//!
//! Versioned, checksummed record of per-channel calibration.
//!
//! ## Block Layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | format version (u32 LE) |
//! | 4 | 4 | checksum (u32 LE) |
//! | 8 | 72 | 6 × channel calibration (6 × u16 LE each) |
//! | 80 | 48 | reserved |
//!
//! The checksum is a CRC-32 over every byte after the checksum field,
//! reserved bytes included, so a flipped bit anywhere in the block is caught.

use bytes::{Buf, BufMut};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::storage::Storage;
use crate::calibration::mapping::ChannelCalibration;
use crate::error::Result;
use crate::packet::protocol::NUM_CALIBRATION_PARAMS;

/// Record format accepted by this build
pub const SETTINGS_FORMAT_VERSION: u32 = 2;

/// Size of the persisted block
pub const SETTINGS_BLOCK_SIZE: usize = 128;

/// 5 analog channels + 1 reserved
pub const NUM_CALIBRATED_CHANNELS: usize = 6;

/// Index of the unused sixth calibration slot
pub const RESERVED_CHANNEL: usize = 5;

const CHECKSUMMED_OFFSET: usize = 8;
const CHANNEL_TABLE_LEN: usize = NUM_CALIBRATED_CHANNELS * NUM_CALIBRATION_PARAMS * 2;
const RESERVED_LEN: usize = SETTINGS_BLOCK_SIZE - CHECKSUMMED_OFFSET - CHANNEL_TABLE_LEN;

/// Factory calibration, indexed like [`crate::packet::protocol::channels`]
pub const FACTORY_CALIBRATION: [ChannelCalibration; NUM_CALIBRATED_CHANNELS] = [
    // Throttle
    ChannelCalibration::new(685, 1145, 1647, 1000, 1500, 2000),
    // Rudder
    ChannelCalibration::new(410, 1880, 3350, 1000, 1500, 2000),
    // Elevator
    ChannelCalibration::new(395, 1905, 3420, 1000, 1500, 2000),
    // Aileron
    ChannelCalibration::new(430, 1870, 3310, 1000, 1500, 2000),
    // Channel 5
    ChannelCalibration::new(0, 2048, 4095, 1000, 1500, 2000),
    // Reserved
    ChannelCalibration::new(0, 2048, 4095, 1000, 1500, 2000),
];

/// Why a stored record was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SettingsFault {
    #[error("checksum mismatch (stored 0x{stored:08X}, computed 0x{computed:08X})")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("format version {found} (expected {})", SETTINGS_FORMAT_VERSION)]
    VersionMismatch { found: u32 },
}

/// The persisted settings record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub format_version: u32,
    pub checksum: u32,
    pub channels: [ChannelCalibration; NUM_CALIBRATED_CHANNELS],
    reserved: [u8; RESERVED_LEN],
}

impl Settings {
    /// Fresh factory record
    ///
    /// The checksum is left at zero; it is stamped by
    /// [`CalibrationStore::prepare_for_save`].
    #[must_use]
    pub fn factory_default() -> Self {
        Self {
            format_version: SETTINGS_FORMAT_VERSION,
            checksum: 0,
            channels: FACTORY_CALIBRATION,
            reserved: [0; RESERVED_LEN],
        }
    }

    /// Interpret a stored block
    ///
    /// Short blocks are zero-extended and longer ones truncated; validity is
    /// judged separately by [`Settings::check`].
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut block = [0u8; SETTINGS_BLOCK_SIZE];
        let len = bytes.len().min(SETTINGS_BLOCK_SIZE);
        block[..len].copy_from_slice(&bytes[..len]);

        let mut buf = &block[..];
        let format_version = buf.get_u32_le();
        let checksum = buf.get_u32_le();

        let mut channels = [ChannelCalibration::default(); NUM_CALIBRATED_CHANNELS];
        for channel in channels.iter_mut() {
            let mut params = [0u16; NUM_CALIBRATION_PARAMS];
            for param in params.iter_mut() {
                *param = buf.get_u16_le();
            }
            *channel = ChannelCalibration::from_params(params);
        }

        let mut reserved = [0u8; RESERVED_LEN];
        buf.copy_to_slice(&mut reserved);

        Self {
            format_version,
            checksum,
            channels,
            reserved,
        }
    }

    /// Serialize into a storage block
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SETTINGS_BLOCK_SIZE] {
        let mut block = [0u8; SETTINGS_BLOCK_SIZE];
        let mut buf = &mut block[..];

        buf.put_u32_le(self.format_version);
        buf.put_u32_le(self.checksum);
        for channel in &self.channels {
            for param in channel.to_params() {
                buf.put_u16_le(param);
            }
        }
        buf.put_slice(&self.reserved);

        block
    }

    /// CRC-32 over every byte after the checksum field
    #[must_use]
    pub fn compute_checksum(&self) -> u32 {
        crc32fast::hash(&self.to_bytes()[CHECKSUMMED_OFFSET..])
    }

    /// Check checksum and format version
    pub fn check(&self) -> std::result::Result<(), SettingsFault> {
        let computed = self.compute_checksum();
        if computed != self.checksum {
            return Err(SettingsFault::ChecksumMismatch {
                stored: self.checksum,
                computed,
            });
        }
        if self.format_version != SETTINGS_FORMAT_VERSION {
            return Err(SettingsFault::VersionMismatch {
                found: self.format_version,
            });
        }
        Ok(())
    }
}

/// How [`CalibrationStore::open`] obtained its record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The stored record was valid
    Loaded,
    /// The stored record was missing or invalid and factory defaults were
    /// written in its place
    Reset,
}

/// Owner of the live settings record
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    settings: Settings,
}

impl Default for CalibrationStore {
    fn default() -> Self {
        Self {
            settings: Settings::factory_default(),
        }
    }
}

impl CalibrationStore {
    /// Wrap a stored block without validating it
    #[must_use]
    pub fn load(bytes: &[u8]) -> Self {
        Self {
            settings: Settings::from_bytes(bytes),
        }
    }

    /// Load the record from `storage`, repairing it if invalid
    ///
    /// An invalid or unreadable record is replaced by factory defaults and
    /// written back exactly once. Storage failures are logged, never fatal.
    pub fn open<S: Storage>(storage: &mut S) -> (Self, LoadOutcome) {
        let block = storage.read_block().unwrap_or_else(|e| {
            warn!("Failed to read settings block: {}", e);
            Vec::new()
        });

        let mut store = Self::load(&block);
        match store.settings.check() {
            Ok(()) => {
                debug!("Settings loaded (checksum 0x{:08X})", store.settings.checksum);
                (store, LoadOutcome::Loaded)
            }
            Err(fault) => {
                warn!("Stored settings rejected: {}; restoring factory defaults", fault);
                store.reset_to_default();
                store.prepare_for_save();
                if let Err(e) = store.write_to(storage) {
                    warn!("Failed to persist factory settings: {}", e);
                }
                (store, LoadOutcome::Reset)
            }
        }
    }

    /// Whether the record is trustworthy
    #[must_use]
    pub fn validate(&self) -> bool {
        self.settings.check().is_ok()
    }

    /// Replace the record with factory defaults
    pub fn reset_to_default(&mut self) {
        self.settings = Settings::factory_default();
    }

    /// Stamp version and checksum; returns whether the checksum changed
    pub fn prepare_for_save(&mut self) -> bool {
        let checksum = self.settings.compute_checksum();
        let changed = checksum != self.settings.checksum;

        self.settings.checksum = checksum;
        self.settings.format_version = SETTINGS_FORMAT_VERSION;

        changed
    }

    /// Persist the record if it changed since the last save
    ///
    /// Returns `true` when a write was issued. A failed write leaves the
    /// record dirty so the next call retries it.
    pub fn persist<S: Storage>(&mut self, storage: &mut S) -> Result<bool> {
        let previous = self.settings.checksum;
        if !self.prepare_for_save() {
            debug!("Settings unchanged, skipping write");
            return Ok(false);
        }

        if let Err(e) = self.write_to(storage) {
            self.settings.checksum = previous;
            return Err(e);
        }
        info!("Settings saved (checksum 0x{:08X})", self.settings.checksum);
        Ok(true)
    }

    fn write_to<S: Storage>(&self, storage: &mut S) -> Result<()> {
        storage.write_block(&self.settings.to_bytes())?;
        storage.commit()
    }

    /// The live record
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Calibration of `channel`
    ///
    /// # Panics
    ///
    /// Panics if `channel >= NUM_CALIBRATED_CHANNELS`.
    #[must_use]
    pub fn channel(&self, channel: usize) -> ChannelCalibration {
        self.settings.channels[channel]
    }

    /// Mutable calibration of `channel`
    ///
    /// # Panics
    ///
    /// Panics if `channel >= NUM_CALIBRATED_CHANNELS`.
    pub fn channel_mut(&mut self, channel: usize) -> &mut ChannelCalibration {
        &mut self.settings.channels[channel]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::storage::mocks::MemoryStorage;
    use crate::settings::storage::MockStorage;

    fn saved_block() -> Vec<u8> {
        let mut store = CalibrationStore::default();
        store.prepare_for_save();
        store.settings().to_bytes().to_vec()
    }

    #[test]
    fn test_layout_sizes() {
        assert_eq!(CHANNEL_TABLE_LEN, 72);
        assert_eq!(RESERVED_LEN, 48);
    }

    #[test]
    fn test_factory_default_is_fresh() {
        let settings = Settings::factory_default();
        assert_eq!(settings.format_version, SETTINGS_FORMAT_VERSION);
        assert_eq!(settings.checksum, 0);
        assert_eq!(settings.channels[0], ChannelCalibration::new(685, 1145, 1647, 1000, 1500, 2000));
        // Unsaved factory record is not yet valid
        assert!(settings.check().is_err());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let block = saved_block();
        let settings = Settings::from_bytes(&block);
        assert_eq!(settings.to_bytes().to_vec(), block);
        assert!(settings.check().is_ok());
    }

    #[test]
    fn test_header_layout() {
        let block = saved_block();
        assert_eq!(&block[0..4], &SETTINGS_FORMAT_VERSION.to_le_bytes());
        let checksum = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
        assert_eq!(checksum, crc32fast::hash(&block[8..]));
        assert_eq!(&block[8..10], &685u16.to_le_bytes());
    }

    #[test]
    fn test_every_single_bit_flip_is_detected() {
        let block = saved_block();
        for byte in 0..SETTINGS_BLOCK_SIZE {
            for bit in 0..8 {
                let mut corrupted = block.clone();
                corrupted[byte] ^= 1 << bit;
                let store = CalibrationStore::load(&corrupted);
                assert!(!store.validate(), "flip of byte {} bit {} went unnoticed", byte, bit);
            }
        }
    }

    #[test]
    fn test_version_mismatch_with_consistent_checksum() {
        let mut settings = Settings::from_bytes(&saved_block());
        settings.format_version = 1;
        // Version is outside the checksummed region, so the checksum still matches
        assert_eq!(settings.compute_checksum(), settings.checksum);

        assert_eq!(
            settings.check(),
            Err(SettingsFault::VersionMismatch { found: 1 })
        );
    }

    #[test]
    fn test_open_valid_block_does_not_write() {
        let mut storage = MemoryStorage::with_block(saved_block());
        let (store, outcome) = CalibrationStore::open(&mut storage);

        assert_eq!(outcome, LoadOutcome::Loaded);
        assert!(store.validate());
        assert_eq!(storage.writes, 0);
        assert_eq!(storage.commits, 0);
    }

    #[test]
    fn test_open_corrupted_block_resets_and_writes_once() {
        let mut block = saved_block();
        block[20] ^= 0x10;
        let mut storage = MemoryStorage::with_block(block);

        let (store, outcome) = CalibrationStore::open(&mut storage);

        assert_eq!(outcome, LoadOutcome::Reset);
        assert!(store.validate());
        assert_eq!(store.settings().channels, FACTORY_CALIBRATION);
        assert_eq!(storage.writes, 1);
        assert_eq!(storage.commits, 1);
        assert_eq!(storage.block, saved_block());
    }

    #[test]
    fn test_open_empty_storage_resets() {
        let mut storage = MemoryStorage::default();
        let (_, outcome) = CalibrationStore::open(&mut storage);
        assert_eq!(outcome, LoadOutcome::Reset);
        assert_eq!(storage.writes, 1);
    }

    #[test]
    fn test_open_old_version_resets() {
        let mut settings = Settings::from_bytes(&saved_block());
        settings.format_version = 1;
        let mut storage = MemoryStorage::with_block(settings.to_bytes().to_vec());

        let (store, outcome) = CalibrationStore::open(&mut storage);
        assert_eq!(outcome, LoadOutcome::Reset);
        assert_eq!(store.settings().format_version, SETTINGS_FORMAT_VERSION);
    }

    #[test]
    fn test_open_survives_read_error() {
        let mut storage = MockStorage::new();
        storage
            .expect_read_block()
            .times(1)
            .returning(|| Err(crate::error::RcLinkError::Storage("bus error".to_string())));
        storage.expect_write_block().times(1).returning(|_| Ok(()));
        storage.expect_commit().times(1).returning(|| Ok(()));

        let (store, outcome) = CalibrationStore::open(&mut storage);
        assert_eq!(outcome, LoadOutcome::Reset);
        assert!(store.validate());
    }

    #[test]
    fn test_prepare_for_save_reports_change() {
        let mut store = CalibrationStore::load(&saved_block());
        assert!(!store.prepare_for_save());

        store.channel_mut(1).raw_center = 1900;
        assert!(store.prepare_for_save());
        assert!(!store.prepare_for_save());
        assert!(store.validate());
    }

    #[test]
    fn test_persist_only_when_dirty() {
        let mut storage = MockStorage::new();
        storage.expect_write_block().times(1).returning(|_| Ok(()));
        storage.expect_commit().times(1).returning(|| Ok(()));

        let mut store = CalibrationStore::load(&saved_block());
        assert!(!store.persist(&mut storage).unwrap());

        store.channel_mut(0).toggle_reversed();
        assert!(store.persist(&mut storage).unwrap());
        assert!(!store.persist(&mut storage).unwrap());
    }

    #[test]
    fn test_persist_propagates_write_error() {
        let mut storage = MockStorage::new();
        storage
            .expect_write_block()
            .returning(|_| Err(crate::error::RcLinkError::Storage("full".to_string())));

        let mut store = CalibrationStore::default();
        assert!(store.persist(&mut storage).is_err());
    }

    #[test]
    fn test_persist_retries_after_failed_write() {
        let mut storage = MockStorage::new();
        let mut attempts = 0;
        storage.expect_write_block().times(2).returning(move |_| {
            attempts += 1;
            if attempts == 1 {
                Err(crate::error::RcLinkError::Storage("busy".to_string()))
            } else {
                Ok(())
            }
        });
        storage.expect_commit().times(1).returning(|| Ok(()));

        let mut store = CalibrationStore::load(&saved_block());
        store.channel_mut(2).toggle_reversed();

        assert!(store.persist(&mut storage).is_err());
        assert!(!store.validate());
        assert!(store.persist(&mut storage).unwrap());
        assert!(store.validate());
    }

    #[test]
    fn test_persist_retries_after_failed_commit() {
        let mut storage = MemoryStorage::with_block(saved_block());
        let mut store = CalibrationStore::load(&saved_block());
        store.channel_mut(0).raw_max = 1700;

        let mut failing = MockStorage::new();
        failing.expect_write_block().times(1).returning(|_| Ok(()));
        failing
            .expect_commit()
            .times(1)
            .returning(|| Err(crate::error::RcLinkError::Storage("flash locked".to_string())));
        assert!(store.persist(&mut failing).is_err());

        assert!(store.persist(&mut storage).unwrap());
        assert_eq!(storage.writes, 1);
        assert_eq!(CalibrationStore::load(&storage.block).channel(0).raw_max, 1700);
    }

    #[test]
    fn test_fault_messages() {
        let fault = SettingsFault::ChecksumMismatch {
            stored: 0xDEAD_BEEF,
            computed: 0x0000_0001,
        };
        assert_eq!(
            fault.to_string(),
            "checksum mismatch (stored 0xDEADBEEF, computed 0x00000001)"
        );
        assert_eq!(
            SettingsFault::VersionMismatch { found: 1 }.to_string(),
            "format version 1 (expected 2)"
        );
    }

    #[test]
    fn test_short_block_is_invalid() {
        let store = CalibrationStore::load(&[0x02, 0x00]);
        assert!(!store.validate());
    }
}
