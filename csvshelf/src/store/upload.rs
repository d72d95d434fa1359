//! Upload pipeline: validate, resolve the stored name, write.
//!
//! The name is resolved in two steps. First the unique `name` index is consulted and, on a hit,
//! the upload is renamed to `"<name>-<suffix>"`. The write is then an insert-only `add`; if another
//! writer claimed the candidate between the lookup and the insert, the engine reports a uniqueness
//! violation and the insert is retried with a fresh suffix, up to `upload.max_name_attempts`
//! attempts in total.

use bytes::Bytes;
use tracing::{info, instrument, warn};

use crate::config::{StoreConfig, UploadConfig};
use crate::db::gateway::StoreGateway;
use crate::db::models::files::{FileCreateDBRequest, StoredFileRecord};
use crate::errors::{Error, Result};
use crate::store::lookup::fetch_file_metadata_by_name;
use crate::store::naming::{random_suffix, suffixed_name};
use crate::store::validation::validate_upload;

/// A file as handed over by the uploader
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub name: String,
    pub mime_type: String,
    /// Milliseconds since the Unix epoch
    pub last_modified: i64,
    pub data: Bytes,
}

impl IncomingFile {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Validate `file` and persist it, returning the stored record (with its final name)
pub async fn upload(store: &StoreConfig, limits: &UploadConfig, file: Option<IncomingFile>) -> Result<StoredFileRecord> {
    upload_with_suffixes(store, limits, file, random_suffix).await
}

#[instrument(skip_all, fields(store = %store.name, name = file.as_ref().map(|f| f.name.as_str())))]
pub(crate) async fn upload_with_suffixes<F>(
    store: &StoreConfig,
    limits: &UploadConfig,
    file: Option<IncomingFile>,
    mut next_suffix: F,
) -> Result<StoredFileRecord>
where
    F: FnMut() -> String,
{
    let file = validate_upload(file.as_ref(), limits)?;
    let original = file.name.clone();

    let mut record = FileCreateDBRequest {
        name: original.clone(),
        mime_type: file.mime_type.clone(),
        last_modified: file.last_modified,
        raw_data: file.data.to_vec(),
    }
    .into_record();

    if fetch_file_metadata_by_name(store, &original).await?.is_some() {
        record.name = suffixed_name(&original, &next_suffix());
        info!(original = %original, renamed = %record.name, "File name already taken, storing under a new name");
    }

    let mut handle = StoreGateway::open(store).await?;
    let mut attempt = 1;

    loop {
        let written = {
            let mut tx = handle.write().await?;
            match tx.add(&record.name, &record).await {
                Ok(()) => tx.commit().await,
                Err(e) => Err(e),
            }
        };

        match written {
            Ok(()) => break,
            Err(e) if e.is_unique_violation() && attempt < limits.max_name_attempts => {
                let taken = std::mem::replace(&mut record.name, suffixed_name(&original, &next_suffix()));
                warn!(attempt, taken = %taken, retry = %record.name, "Name claimed concurrently, retrying with a new suffix");
                attempt += 1;
            }
            Err(e) if e.is_unique_violation() => {
                return Err(Error::DuplicateNameRace {
                    name: original,
                    attempts: attempt,
                });
            }
            Err(e) => return Err(e.into()),
        }
    }

    handle.close().await?;

    info!(stored_as = %record.name, size = record.size, "Stored file");
    Ok(record)
}
