//! Persistent calibration settings

pub mod storage;
pub mod store;

pub use storage::{FileStorage, Storage};
pub use store::{CalibrationStore, LoadOutcome, Settings, SettingsFault};
