//! On-disk layout of captured transactions.
//!
//! Every record becomes one JSON file whose path is rendered from the
//! configured strftime template over the transaction's local arrival time,
//! followed by the arrival nanosecond, the correlation identity and the
//! record kind. The template may contain directory separators; missing
//! directories are created on demand. An optional `index.log` in the storage
//! root maps identities to file paths for quick lookup.

use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Local, Timelike};
use log::warn;

use crate::error_handling::{ConfigError, StorageError};
use crate::recording::RecordKind;

const INDEX_FILE: &str = "index.log";

pub struct RecordWriter {
    date_format: String,
    root: PathBuf,
    /// Append handle for the index, shared across handler tasks. The mutex
    /// keeps concurrent lines from interleaving.
    index: Option<Mutex<File>>,
}

impl RecordWriter {
    /// Opens a writer rooted at `root`. When `index_enabled`, the index file
    /// is opened for append up front so a bad storage root fails at startup
    /// instead of on the first transaction.
    pub fn new(
        date_format: &str,
        root: impl Into<PathBuf>,
        index_enabled: bool,
    ) -> Result<Self, ConfigError> {
        let root = root.into();
        let index = if index_enabled {
            fs::create_dir_all(&root).map_err(ConfigError::IndexOpenFailed)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(root.join(INDEX_FILE))
                .map_err(ConfigError::IndexOpenFailed)?;
            Some(Mutex::new(file))
        } else {
            None
        };
        Ok(Self {
            date_format: date_format.to_string(),
            root,
            index,
        })
    }

    /// Renders the storage path for a record observed at `received`.
    ///
    /// Both halves of one transaction render the same prefix because they
    /// share `received`; only the kind suffix differs.
    pub fn relative_path(&self, kind: RecordKind, id: &str, received: DateTime<Local>) -> String {
        format!(
            "{}{:09}.{}.{}.json",
            received.format(&self.date_format),
            received.nanosecond(),
            id,
            kind.as_str()
        )
    }

    /// Writes one serialized record and appends its index line. Index
    /// failures are logged but never fail the persist: the record itself is
    /// already durable at that point.
    pub fn persist(
        &self,
        kind: RecordKind,
        id: &str,
        description: &str,
        received: DateTime<Local>,
        json: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let relative = self.relative_path(kind, id, received);
        let path = self.root.join(&relative);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(StorageError::CreateDirFailed)?;
        }
        fs::write(&path, json).map_err(StorageError::WriteFailed)?;

        if let Some(index) = &self.index {
            if let Err(e) = Self::append_index(index, id, &relative, description) {
                warn!("could not append to {}: {}", INDEX_FILE, e);
            }
        }
        Ok(path)
    }

    fn append_index(
        index: &Mutex<File>,
        id: &str,
        relative: &str,
        description: &str,
    ) -> Result<(), StorageError> {
        let mut file = match index.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        writeln!(file, "{}\t{}\t{}", id, relative, description)
            .map_err(StorageError::IndexAppendFailed)
    }
}
