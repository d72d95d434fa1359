//! Exact-match lookups by file name.

use tracing::{debug, instrument};

use crate::config::StoreConfig;
use crate::db::gateway::{StoreGateway, StoreIndex};
use crate::db::models::files::{StoredFileMetadata, StoredFileRecord};
use crate::errors::Result;

/// Exact-match lookup through the unique `name` index.
///
/// An empty name short-circuits to `None` without opening the store. A miss is `None`, not an error.
#[instrument(skip(store), fields(store = %store.name))]
pub async fn fetch_file_by_name(store: &StoreConfig, name: &str) -> Result<Option<StoredFileRecord>> {
    if name.is_empty() {
        return Ok(None);
    }

    let mut handle = StoreGateway::open(store).await?;
    let record = {
        let mut tx = handle.read().await?;
        let record = tx.get_by_index(StoreIndex::Name, name).await?;
        tx.finish().await?;
        record
    };
    handle.close().await?;

    if record.is_none() {
        debug!("No file stored under this name");
    }

    Ok(record)
}

/// Same lookup as [`fetch_file_by_name`], returning metadata only. Used where the content is not
/// needed, such as the name check before an upload.
#[instrument(skip(store), fields(store = %store.name))]
pub async fn fetch_file_metadata_by_name(store: &StoreConfig, name: &str) -> Result<Option<StoredFileMetadata>> {
    if name.is_empty() {
        return Ok(None);
    }

    let mut handle = StoreGateway::open(store).await?;
    let metadata = {
        let mut tx = handle.read().await?;
        let metadata = tx.get_metadata_by_index(StoreIndex::Name, name).await?;
        tx.finish().await?;
        metadata
    };
    handle.close().await?;

    Ok(metadata)
}
