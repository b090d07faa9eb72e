//! Applies redaction and identity assignment, then hands records to storage.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use log::debug;

use super::identity::make_transaction_id;
use super::record::{RecordKind, RequestRecord, ResponseRecord};
use crate::configuration::RecordConfig;
use crate::error_handling::{ConfigError, StorageError};
use crate::redaction::RedactRules;
use crate::storage::RecordWriter;

/// Outcome of persisting one record. `json` is the exact bytes written to
/// disk, after redaction, so callers can echo it without a second pass.
pub struct SavedRecord {
    pub id: String,
    pub path: PathBuf,
    pub json: Vec<u8>,
}

/// A record that has been redacted and serialized but not yet written.
pub struct PreparedRecord {
    pub id: String,
    pub date: DateTime<Local>,
    pub json: Vec<u8>,
}

/// Persistence front door shared by the direct and proxy handlers.
///
/// Redaction happens here, immediately before serialization, so no code path
/// can write an unredacted record. Identities are assigned here as well when
/// the caller has not minted one earlier.
pub struct Recorder {
    writer: RecordWriter,
    redact_headers: RedactRules,
    redact_body: RedactRules,
}

impl Recorder {
    pub fn new(config: &RecordConfig, root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        Ok(Self {
            writer: RecordWriter::new(&config.date_format, root, config.index)?,
            redact_headers: config.redact_headers.clone(),
            redact_body: config.redact_body.clone(),
        })
    }

    /// Redacts and serializes a request record without writing it. Echo mode
    /// needs the serialized bytes before the client is answered while the
    /// write itself still happens afterwards, via [`Self::persist_prepared`].
    pub fn prepare_request(
        &self,
        mut record: RequestRecord,
        description: &str,
    ) -> Result<PreparedRecord, StorageError> {
        self.redact_base(&mut record.base);
        let id = self.ensure_id(&mut record.base, description);
        let date = record.base.date;
        let json =
            serde_json::to_vec_pretty(&record).map_err(StorageError::SerializeFailed)?;
        Ok(PreparedRecord { id, date, json })
    }

    pub fn persist_prepared(
        &self,
        prepared: &PreparedRecord,
        description: &str,
    ) -> Result<PathBuf, StorageError> {
        let path = self.writer.persist(
            RecordKind::Request,
            &prepared.id,
            description,
            prepared.date,
            &prepared.json,
        )?;
        debug!("request {} recorded to {}", prepared.id, path.display());
        Ok(path)
    }

    pub fn save_request(
        &self,
        record: RequestRecord,
        description: &str,
    ) -> Result<SavedRecord, StorageError> {
        let prepared = self.prepare_request(record, description)?;
        let path = self.persist_prepared(&prepared, description)?;
        Ok(SavedRecord {
            id: prepared.id,
            path,
            json: prepared.json,
        })
    }

    /// Persists a response record. `path_date` renders the storage path and
    /// is normally the paired request's arrival time, so both halves of a
    /// transaction sit on the same filename prefix; the record's own dates
    /// stay the response arrival.
    pub fn save_response(
        &self,
        mut record: ResponseRecord,
        description: &str,
        path_date: chrono::DateTime<chrono::Local>,
    ) -> Result<SavedRecord, StorageError> {
        self.redact_base(&mut record.base);
        let id = self.ensure_id(&mut record.base, description);

        let json =
            serde_json::to_vec_pretty(&record).map_err(StorageError::SerializeFailed)?;
        let path = self
            .writer
            .persist(RecordKind::Response, &id, description, path_date, &json)?;
        debug!("response {} recorded to {}", id, path.display());
        Ok(SavedRecord { id, path, json })
    }

    fn redact_base(&self, base: &mut super::record::RecordBase) {
        base.headers = redact_lines(&self.redact_headers, std::mem::take(&mut base.headers));
        base.trailers = redact_lines(&self.redact_headers, std::mem::take(&mut base.trailers));
        if !self.redact_body.is_empty() {
            base.body = self.redact_body.redact(&base.body);
        }
    }

    fn ensure_id(&self, base: &mut super::record::RecordBase, description: &str) -> String {
        if base.id.is_empty() {
            base.id = make_transaction_id(description, base.date);
        }
        base.id.clone()
    }
}

fn redact_lines(rules: &RedactRules, lines: Vec<String>) -> Vec<String> {
    if rules.is_empty() {
        return lines;
    }
    lines.iter().map(|line| rules.redact(line)).collect()
}
