//! Store gateway: opens the embedded store and hands out scoped transactions.
//!
//! Each store is a single SQLite file named after the store inside `store.data_dir`.
//! A [`StoreHandle`] owns one connection and is meant to live for a single public
//! operation; nothing is pooled or held between calls.
//!
//! Transactions are typed by mode. Reads are available on both [`ReadTxn`] and
//! [`WriteTxn`]; `put`/`add` only exist on [`WriteTxn`].

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::TryStreamExt;
use futures::stream::BoxStream;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, Sqlite, SqliteConnection};
use tracing::{debug, instrument, warn};

use crate::config::StoreConfig;
use crate::db::errors::{DbError, Result, is_busy};
use crate::db::migrations;
use crate::db::models::files::{StoredFileMetadata, StoredFileRecord};

const SELECT_BY_KEY: &str =
    "SELECT name, size, mime_type, last_modified, raw_data, annotation_count FROM files WHERE key = ?1";
const SELECT_BY_NAME: &str =
    "SELECT name, size, mime_type, last_modified, raw_data, annotation_count FROM files INDEXED BY files_name_idx WHERE name = ?1";
const SELECT_METADATA_BY_NAME: &str =
    "SELECT name, size, mime_type, last_modified, annotation_count FROM files INDEXED BY files_name_idx WHERE name = ?1";
const SELECT_ALL_METADATA_BY_KEY: &str =
    "SELECT name, size, mime_type, last_modified, annotation_count FROM files ORDER BY key";

/// How long a connection waits on a lock held by another connection
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Attempts at switching a new store to WAL while other openers hold it
const JOURNAL_MODE_ATTEMPTS: u32 = 10;
const JOURNAL_MODE_BACKOFF: Duration = Duration::from_millis(25);

/// Secondary indexes available for exact-value lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreIndex {
    /// Unique index over `name`
    Name,
}

pub struct StoreGateway;

impl StoreGateway {
    /// Open (creating if needed) the store described by `config`, upgrading its schema to
    /// `config.schema_version`. Re-opening at the same version is a no-op upgrade.
    #[instrument(skip_all, fields(store = %config.name, version = config.schema_version))]
    pub async fn open(config: &StoreConfig) -> Result<StoreHandle> {
        let path = config.path();

        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .map_err(|e| DbError::unavailable(&path, format!("cannot create data directory: {e}")))?;

        Self::connect(config, path, true).await
    }

    /// Open the store only if it already exists on disk. Never creates anything and never
    /// writes: a store below `config.schema_version` is opened as it is, and
    /// [`StoreHandle::version`] reports the stored version. A file that has no schema yet
    /// (another opener is still creating it) counts as missing.
    #[instrument(skip_all, fields(store = %config.name, version = config.schema_version))]
    pub async fn open_existing(config: &StoreConfig) -> Result<Option<StoreHandle>> {
        let path = config.path();

        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| DbError::unavailable(&path, format!("cannot stat store file: {e}")))?;
        if !exists {
            debug!(path = %path.display(), "Store does not exist yet");
            return Ok(None);
        }

        let handle = Self::connect(config, path, false).await?;
        if handle.version == 0 {
            debug!(path = %handle.path.display(), "Store has no schema yet");
            handle.close().await?;
            return Ok(None);
        }

        Ok(Some(handle))
    }

    async fn connect(config: &StoreConfig, path: PathBuf, create: bool) -> Result<StoreHandle> {
        let target = config.schema_version;
        if target == 0 {
            return Err(DbError::unavailable(&path, "schema version must be at least 1"));
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(create)
            .busy_timeout(BUSY_TIMEOUT);

        let mut conn = SqliteConnection::connect_with(&options)
            .await
            .map_err(|e| DbError::unavailable(&path, e))?;

        if create {
            enable_wal(&mut conn).await.map_err(|e| DbError::unavailable(&path, e))?;
        }

        let mut stored = migrations::current_version(&mut conn)
            .await
            .map_err(|e| DbError::unavailable(&path, e))?;

        if create && stored < target {
            stored = migrations::upgrade(&mut conn, target)
                .await
                .map_err(|e| DbError::unavailable(&path, e))?
                .max(target);
        }

        if stored > target {
            // Mirrors a version-change rejection: never downgrade a store
            return Err(DbError::unavailable(
                &path,
                format!("requested schema version {target} is older than stored version {stored}"),
            ));
        }

        if stored < target {
            debug!(path = %path.display(), stored, requested = target, "Opened store below requested version without upgrading");
        } else {
            debug!(path = %path.display(), "Opened store");
        }

        Ok(StoreHandle {
            conn,
            path,
            version: stored,
        })
    }
}

/// Put the store in WAL mode.
///
/// WAL is recorded in the file, so this is a no-op after the first successful switch. The switch
/// itself needs an exclusive lock that the busy timeout does not wait for, so it is retried
/// while other openers of a brand-new store hold the file.
async fn enable_wal(conn: &mut SqliteConnection) -> std::result::Result<(), sqlx::Error> {
    let mut attempt = 1;
    loop {
        match sqlx::query_scalar::<_, String>("PRAGMA journal_mode = WAL")
            .fetch_one(&mut *conn)
            .await
        {
            Ok(mode) => {
                if !mode.eq_ignore_ascii_case("wal") {
                    warn!(mode = %mode, "Store did not switch to WAL");
                }
                return Ok(());
            }
            Err(e) if is_busy(&e) && attempt < JOURNAL_MODE_ATTEMPTS => {
                debug!(attempt, "Journal mode switch contended, retrying");
                tokio::time::sleep(JOURNAL_MODE_BACKOFF * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// A live connection to one store, scoped to a single operation
pub struct StoreHandle {
    conn: SqliteConnection,
    path: PathBuf,
    version: u32,
}

impl StoreHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Begin a read-only transaction
    pub async fn read(&mut self) -> Result<ReadTxn<'_>> {
        Ok(StoreTxn::new(self.conn.begin().await?))
    }

    /// Begin a read-write transaction.
    ///
    /// The write lock is taken up front, so a concurrent writer is waited on for the busy
    /// timeout instead of failing a later read-to-write upgrade.
    pub async fn write(&mut self) -> Result<WriteTxn<'_>> {
        Ok(StoreTxn::new(self.conn.begin_with("BEGIN IMMEDIATE").await?))
    }

    /// Close the underlying connection
    pub async fn close(self) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}

/// Marker for read-only transactions
#[derive(Debug)]
pub enum ReadOnly {}

/// Marker for read-write transactions
#[derive(Debug)]
pub enum ReadWrite {}

/// A transaction scoped to the files object store
pub struct StoreTxn<'c, M> {
    tx: sqlx::Transaction<'c, Sqlite>,
    _mode: PhantomData<M>,
}

pub type ReadTxn<'c> = StoreTxn<'c, ReadOnly>;
pub type WriteTxn<'c> = StoreTxn<'c, ReadWrite>;

impl<'c, M> StoreTxn<'c, M> {
    fn new(tx: sqlx::Transaction<'c, Sqlite>) -> Self {
        Self { tx, _mode: PhantomData }
    }

    /// Fetch a record by primary key
    pub async fn get_by_key(&mut self, key: &str) -> Result<Option<StoredFileRecord>> {
        let record = sqlx::query_as::<_, StoredFileRecord>(SELECT_BY_KEY)
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(record)
    }

    /// Fetch a record by exact value through a secondary index
    pub async fn get_by_index(&mut self, index: StoreIndex, value: &str) -> Result<Option<StoredFileRecord>> {
        let sql = match index {
            StoreIndex::Name => SELECT_BY_NAME,
        };
        let record = sqlx::query_as::<_, StoredFileRecord>(sql)
            .bind(value)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(record)
    }

    /// Like [`get_by_index`](Self::get_by_index), without loading the content
    pub async fn get_metadata_by_index(&mut self, index: StoreIndex, value: &str) -> Result<Option<StoredFileMetadata>> {
        let sql = match index {
            StoreIndex::Name => SELECT_METADATA_BY_NAME,
        };
        let metadata = sqlx::query_as::<_, StoredFileMetadata>(sql)
            .bind(value)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(metadata)
    }

    /// All primary keys in store order
    pub async fn get_all_keys(&mut self) -> Result<Vec<String>> {
        let keys = sqlx::query_scalar::<_, String>("SELECT key FROM files ORDER BY key")
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(keys)
    }

    /// Open a forward-only cursor over every record's metadata in primary-key order.
    ///
    /// Content is not read. The cursor borrows the transaction and cannot be rewound; open a
    /// new one to rescan.
    pub fn open_forward_cursor(&mut self) -> Cursor<'_> {
        let stream = sqlx::query_as::<_, StoredFileMetadata>(SELECT_ALL_METADATA_BY_KEY).fetch(&mut *self.tx);
        Cursor {
            stream,
            position: 0,
            exhausted: false,
        }
    }

    /// Commit (or, for read-only work, simply release) the transaction
    pub async fn finish(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

impl<'c> WriteTxn<'c> {
    /// Insert or replace the record stored under `key`
    pub async fn put(&mut self, key: &str, record: &StoredFileRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files (key, name, size, mime_type, last_modified, raw_data, annotation_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (key) DO UPDATE SET
                name = excluded.name,
                size = excluded.size,
                mime_type = excluded.mime_type,
                last_modified = excluded.last_modified,
                raw_data = excluded.raw_data,
                annotation_count = excluded.annotation_count
            "#,
        )
        .bind(key)
        .bind(&record.name)
        .bind(record.size)
        .bind(&record.mime_type)
        .bind(record.last_modified)
        .bind(&record.raw_data)
        .bind(record.annotation_count)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Insert a record under `key`, failing with [`DbError::UniqueViolation`] if the key or
    /// the record's name is already taken
    pub async fn add(&mut self, key: &str, record: &StoredFileRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO files (key, name, size, mime_type, last_modified, raw_data, annotation_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(key)
        .bind(&record.name)
        .bind(record.size)
        .bind(&record.mime_type)
        .bind(record.last_modified)
        .bind(&record.raw_data)
        .bind(record.annotation_count)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Commit all writes made in this transaction
    pub async fn commit(self) -> Result<()> {
        self.finish().await
    }
}

/// Forward-only cursor over stored file metadata.
///
/// Finite and not restartable: once [`Cursor::next`] returns `None` it keeps returning `None`.
pub struct Cursor<'t> {
    stream: BoxStream<'t, std::result::Result<StoredFileMetadata, sqlx::Error>>,
    position: usize,
    exhausted: bool,
}

impl Cursor<'_> {
    /// Advance one record
    pub async fn next(&mut self) -> Result<Option<StoredFileMetadata>> {
        if self.exhausted {
            return Ok(None);
        }
        match self.stream.try_next().await? {
            Some(record) => {
                self.position += 1;
                Ok(Some(record))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    /// Number of records yielded so far
    pub fn position(&self) -> usize {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_record, seed_records, test_store_config, unreadable_payloads};
    use tempfile::TempDir;
    use tokio::task::JoinSet;

    #[tokio::test]
    async fn test_open_creates_store_and_schema() {
        let dir = TempDir::new().unwrap();
        let config = test_store_config(&dir);

        let handle = StoreGateway::open(&config).await.unwrap();
        assert_eq!(handle.version(), 1);
        assert!(handle.path().exists());
        handle.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_reopen_same_version_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let config = test_store_config(&dir);

        let mut handle = StoreGateway::open(&config).await.unwrap();
        let mut tx = handle.write().await.unwrap();
        tx.add("a.csv", &sample_record("a.csv", 3)).await.unwrap();
        tx.commit().await.unwrap();
        handle.close().await.unwrap();

        let mut handle = StoreGateway::open(&config).await.unwrap();
        let mut tx = handle.read().await.unwrap();
        assert_eq!(tx.get_all_keys().await.unwrap(), vec!["a.csv".to_string()]);
        tx.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_older_version_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let mut config = test_store_config(&dir);
        config.schema_version = 3;
        StoreGateway::open(&config).await.unwrap().close().await.unwrap();

        config.schema_version = 2;
        let err = StoreGateway::open(&config).await.err().expect("downgrade must fail");
        assert!(matches!(err, DbError::StorageUnavailable { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_version_zero_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let mut config = test_store_config(&dir);
        config.schema_version = 0;

        let err = StoreGateway::open(&config).await.err().unwrap();
        assert!(matches!(err, DbError::StorageUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_open_existing_on_missing_store() {
        let dir = TempDir::new().unwrap();
        let config = test_store_config(&dir);

        assert!(StoreGateway::open_existing(&config).await.unwrap().is_none());
        assert!(!config.path().exists(), "open_existing must not create the store");
    }

    #[tokio::test]
    async fn test_add_rejects_duplicate_name() {
        let dir = TempDir::new().unwrap();
        let config = test_store_config(&dir);
        let mut handle = StoreGateway::open(&config).await.unwrap();

        let mut tx = handle.write().await.unwrap();
        tx.add("x.csv", &sample_record("x.csv", 3)).await.unwrap();
        tx.commit().await.unwrap();

        // Same name under a different key still trips the unique index
        let mut tx = handle.write().await.unwrap();
        let err = tx.add("other-key", &sample_record("x.csv", 4)).await.unwrap_err();
        assert!(err.is_unique_violation(), "got {err:?}");
    }

    #[tokio::test]
    async fn test_put_overwrites_by_key() {
        let dir = TempDir::new().unwrap();
        let config = test_store_config(&dir);
        let mut handle = StoreGateway::open(&config).await.unwrap();

        let mut tx = handle.write().await.unwrap();
        tx.put("x.csv", &sample_record("x.csv", 3)).await.unwrap();
        tx.put("x.csv", &sample_record("x.csv", 9)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = handle.read().await.unwrap();
        let record = tx.get_by_key("x.csv").await.unwrap().unwrap();
        assert_eq!(record.size, 9);
    }

    #[tokio::test]
    async fn test_get_by_index_exact_match_only() {
        let dir = TempDir::new().unwrap();
        let config = test_store_config(&dir);
        let mut handle = StoreGateway::open(&config).await.unwrap();

        let mut tx = handle.write().await.unwrap();
        tx.add("speed.csv", &sample_record("speed.csv", 3)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = handle.read().await.unwrap();
        assert!(tx.get_by_index(StoreIndex::Name, "speed.csv").await.unwrap().is_some());
        assert!(tx.get_by_index(StoreIndex::Name, "speed").await.unwrap().is_none());
        assert!(tx.get_by_index(StoreIndex::Name, "SPEED.CSV").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cursor_streams_in_key_order_and_stays_exhausted() {
        let dir = TempDir::new().unwrap();
        let config = test_store_config(&dir);
        let mut handle = StoreGateway::open(&config).await.unwrap();

        let mut tx = handle.write().await.unwrap();
        for name in ["c.csv", "a.csv", "b.csv"] {
            tx.add(name, &sample_record(name, 3)).await.unwrap();
        }
        tx.commit().await.unwrap();

        let mut tx = handle.read().await.unwrap();
        let mut cursor = tx.open_forward_cursor();
        let mut seen = Vec::new();
        while let Some(record) = cursor.next().await.unwrap() {
            seen.push(record.name);
        }
        assert_eq!(seen, vec!["a.csv", "b.csv", "c.csv"]);
        assert_eq!(cursor.position(), 3);
        assert!(cursor.next().await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_opens_of_new_store() {
        for _ in 0..10 {
            let dir = TempDir::new().unwrap();
            let config = test_store_config(&dir);

            let mut openers = JoinSet::new();
            for _ in 0..6 {
                let config = config.clone();
                openers.spawn(async move {
                    let handle = StoreGateway::open(&config).await?;
                    let version = handle.version();
                    handle.close().await?;
                    Ok::<_, DbError>(version)
                });
            }
            while let Some(opened) = openers.join_next().await {
                assert_eq!(opened.unwrap().unwrap(), 1);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_schema_bump() {
        let dir = TempDir::new().unwrap();
        let mut config = test_store_config(&dir);
        seed_records(&config, &[("a.csv", 3)]).await;
        config.schema_version = 3;

        let mut openers = JoinSet::new();
        for _ in 0..6 {
            let config = config.clone();
            openers.spawn(async move {
                let mut handle = StoreGateway::open(&config).await?;
                let stored = migrations::current_version(&mut handle.conn).await?;
                handle.close().await?;
                Ok::<_, DbError>(stored)
            });
        }
        while let Some(opened) = openers.join_next().await {
            assert_eq!(opened.unwrap().unwrap(), 3);
        }

        // Upgrading kept the data
        let mut handle = StoreGateway::open(&config).await.unwrap();
        let mut tx = handle.read().await.unwrap();
        assert_eq!(tx.get_all_keys().await.unwrap(), vec!["a.csv".to_string()]);
    }

    #[tokio::test]
    async fn test_open_existing_never_upgrades() {
        let dir = TempDir::new().unwrap();
        let mut config = test_store_config(&dir);
        seed_records(&config, &[("a.csv", 3)]).await;
        config.schema_version = 2;

        let mut handle = StoreGateway::open_existing(&config).await.unwrap().unwrap();
        assert_eq!(handle.version(), 1);
        assert_eq!(migrations::current_version(&mut handle.conn).await.unwrap(), 1);

        let mut tx = handle.read().await.unwrap();
        assert_eq!(tx.get_all_keys().await.unwrap(), vec!["a.csv".to_string()]);
    }

    #[tokio::test]
    async fn test_open_existing_on_store_without_schema() {
        let dir = TempDir::new().unwrap();
        let config = test_store_config(&dir);
        std::fs::File::create(config.path()).unwrap();

        assert!(StoreGateway::open_existing(&config).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cursor_does_not_read_content() {
        let dir = TempDir::new().unwrap();
        let config = test_store_config(&dir);
        seed_records(&config, &[("a.csv", 3), ("b.csv", 5)]).await;
        unreadable_payloads(&config).await;

        let mut handle = StoreGateway::open(&config).await.unwrap();
        let mut tx = handle.read().await.unwrap();
        {
            let mut cursor = tx.open_forward_cursor();
            let first = cursor.next().await.unwrap().unwrap();
            assert_eq!((first.name.as_str(), first.size), ("a.csv", 3));
            assert!(cursor.next().await.unwrap().is_some());
        }
        assert!(tx.get_metadata_by_index(StoreIndex::Name, "b.csv").await.unwrap().is_some());

        // Decoding the full record does touch the content
        assert!(tx.get_by_index(StoreIndex::Name, "b.csv").await.is_err());
    }
}
