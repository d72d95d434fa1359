//! Primary-key listing.

use tracing::instrument;

use crate::config::StoreConfig;
use crate::db::gateway::StoreGateway;
use crate::errors::Result;

/// All primary keys in store order. A store that was never created yields an empty list.
///
/// Read-only: the store is never created or upgraded here. A store below the configured schema
/// version is listed as it is.
#[instrument(skip_all, fields(store = %store.name))]
pub async fn get_keys(store: &StoreConfig) -> Result<Vec<String>> {
    let Some(mut handle) = StoreGateway::open_existing(store).await? else {
        return Ok(Vec::new());
    };

    let keys = {
        let mut tx = handle.read().await?;
        let keys = tx.get_all_keys().await?;
        tx.finish().await?;
        keys
    };
    handle.close().await?;

    Ok(keys)
}
