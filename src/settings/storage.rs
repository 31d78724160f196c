//! # Settings Storage
//!
//! Block storage for the persisted settings record.
//!
//! The embedded target keeps the record in an EEPROM-emulation page; on a
//! Linux host the block lives in a file. Writes are staged by
//! [`Storage::write_block`] and only become durable on [`Storage::commit`].

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{RcLinkError, Result};

/// Nonvolatile block holding the settings record
#[cfg_attr(test, mockall::automock)]
pub trait Storage {
    /// Read the stored block; an empty block means nothing was ever stored
    fn read_block(&mut self) -> Result<Vec<u8>>;

    /// Stage a new block
    fn write_block(&mut self, block: &[u8]) -> Result<()>;

    /// Make the staged block durable
    fn commit(&mut self) -> Result<()>;
}

/// File-backed settings block
///
/// Commit writes to a sibling temp file and renames it over the target so
/// a crash never leaves a half-written record.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    staged: Option<Vec<u8>>,
}

impl FileStorage {
    /// Use `path` as the settings block
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            staged: None,
        }
    }

    /// Path of the settings file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn read_block(&mut self) -> Result<Vec<u8>> {
        match fs::read(&self.path) {
            Ok(block) => Ok(block),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No settings file at {}", self.path.display());
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_block(&mut self, block: &[u8]) -> Result<()> {
        self.staged = Some(block.to_vec());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let block = self
            .staged
            .take()
            .ok_or_else(|| RcLinkError::Storage("commit without a staged block".to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, &block)?;
        fs::rename(&tmp_path, &self.path)?;

        debug!("Committed {} byte settings block to {}", block.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;

    /// In-memory storage counting writes and commits
    #[derive(Debug, Default)]
    pub struct MemoryStorage {
        pub block: Vec<u8>,
        pub staged: Option<Vec<u8>>,
        pub writes: usize,
        pub commits: usize,
    }

    impl MemoryStorage {
        pub fn with_block(block: Vec<u8>) -> Self {
            Self {
                block,
                ..Self::default()
            }
        }
    }

    impl Storage for MemoryStorage {
        fn read_block(&mut self) -> Result<Vec<u8>> {
            Ok(self.block.clone())
        }

        fn write_block(&mut self, block: &[u8]) -> Result<()> {
            self.writes += 1;
            self.staged = Some(block.to_vec());
            Ok(())
        }

        fn commit(&mut self) -> Result<()> {
            self.commits += 1;
            if let Some(block) = self.staged.take() {
                self.block = block;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let mut storage = FileStorage::new(dir.path().join("settings.bin"));
        assert!(storage.read_block().unwrap().is_empty());
    }

    #[test]
    fn test_write_is_not_durable_until_commit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.bin");
        let mut storage = FileStorage::new(&path);

        storage.write_block(&[1, 2, 3]).unwrap();
        assert!(!path.exists());

        storage.commit().unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3]);
        assert_eq!(storage.read_block().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_commit_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.bin");
        let mut storage = FileStorage::new(&path);

        storage.write_block(&[9; 8]).unwrap();
        storage.commit().unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_commit_without_write_fails() {
        let dir = TempDir::new().unwrap();
        let mut storage = FileStorage::new(dir.path().join("settings.bin"));

        match storage.commit() {
            Err(RcLinkError::Storage(msg)) => assert!(msg.contains("commit")),
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }
}
