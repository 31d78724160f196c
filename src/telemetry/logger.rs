//! JSONL status logger with file rotation

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::types::StatusRecord;
use crate::error::Result;

const FILE_PREFIX: &str = "status_";
const FILE_SUFFIX: &str = ".jsonl";

/// Appends status records to `status_NNNN.jsonl` files
#[derive(Debug)]
pub struct TelemetryLogger {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    next_index: u32,
}

impl TelemetryLogger {
    /// Create the log directory if needed
    ///
    /// Numbering continues after the highest file already present, so a
    /// restart never appends to an older run's file.
    pub fn new<P: AsRef<Path>>(
        dir: P,
        max_records_per_file: usize,
        max_files_to_keep: usize,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let next_index = log_files(&dir)?
            .last()
            .map_or(0, |(index, _)| index.saturating_add(1));

        info!("Telemetry logging to {} (next file {})", dir.display(), next_index);

        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            writer: None,
            records_in_file: 0,
            next_index,
        })
    }

    /// Append one record as a JSON line
    pub fn log(&mut self, record: &StatusRecord) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, record)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            self.records_in_file += 1;
        }
        Ok(())
    }

    /// Current log files, oldest first
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        Ok(log_files(&self.dir)?.into_iter().map(|(_, path)| path).collect())
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        let path = self.dir.join(file_name(self.next_index));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Opened telemetry file {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;
        self.next_index = self.next_index.saturating_add(1);

        self.prune()
    }

    fn prune(&self) -> Result<()> {
        let files = log_files(&self.dir)?;
        let excess = files.len().saturating_sub(self.max_files_to_keep);
        for (_, path) in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove old telemetry file {}: {}", path.display(), e);
            }
        }
        Ok(())
    }
}

fn file_name(index: u32) -> String {
    format!("{}{:04}{}", FILE_PREFIX, index, FILE_SUFFIX)
}

fn parse_index(name: &str) -> Option<u32> {
    name.strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .parse()
        .ok()
}

/// Log files in `dir` sorted by index
fn log_files(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(index) = name.to_str().and_then(parse_index) {
            files.push((index, entry.path()));
        }
    }
    files.sort_by_key(|(index, _)| *index);
    Ok(files)
}
