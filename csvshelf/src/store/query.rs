//! Query engine: bounded streaming filter, sort, paginate.
//!
//! The three stages are independent functions so they can be chained or used alone:
//!
//! 1. [`filter_files`] walks a forward metadata cursor in primary-key order and keeps records whose
//!    lowercased name contains the lowercased search text, stopping as soon as
//!    `offset + limit` records matched.
//! 2. [`sort_files`] orders that window by one field.
//! 3. [`paginate_files`] slices `[offset, offset + limit)` out of the result.
//!
//! Because stage 1 stops early, stage 2 only ever sees the first `offset + limit` matches in key
//! order. When more records match than fit the window, the result is the sorted window, not the
//! global top of the store.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use tracing::{debug, instrument};

use crate::config::StoreConfig;
use crate::db::gateway::{Cursor, StoreGateway};
use crate::db::models::files::StoredFileMetadata;
use crate::errors::{Error, Result};

/// Default page size
pub const DEFAULT_LIMIT: i64 = 100;

/// Fields a listing can be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Name,
    Size,
    MimeType,
    LastModified,
    AnnotationCount,
}

/// Comparable projection of one field of a record
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey<'a> {
    Text(&'a str),
    Integer(i64),
    /// Date-like values compare as numeric timestamps
    Timestamp(i64),
}

impl SortField {
    pub fn as_str(self) -> &'static str {
        match self {
            SortField::Name => "name",
            SortField::Size => "size",
            SortField::MimeType => "mimeType",
            SortField::LastModified => "lastModified",
            SortField::AnnotationCount => "annotationCount",
        }
    }

    fn key(self, record: &StoredFileMetadata) -> SortKey<'_> {
        match self {
            SortField::Name => SortKey::Text(&record.name),
            SortField::Size => SortKey::Integer(record.size),
            SortField::MimeType => SortKey::Text(&record.mime_type),
            SortField::LastModified => SortKey::Timestamp(record.last_modified),
            SortField::AnnotationCount => SortKey::Integer(record.annotation_count),
        }
    }

    pub fn compare(self, a: &StoredFileMetadata, b: &StoredFileMetadata) -> Ordering {
        self.key(a).cmp(&self.key(b))
    }
}

impl FromStr for SortField {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "name" => Ok(SortField::Name),
            "size" => Ok(SortField::Size),
            "mimeType" | "mime_type" => Ok(SortField::MimeType),
            "lastModified" | "last_modified" | "lastModifiedTimestamp" => Ok(SortField::LastModified),
            "annotationCount" | "annotation_count" => Ok(SortField::AnnotationCount),
            _ => Err(Error::UnknownSortField { field: s.to_string() }),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(Error::BadRequest {
                message: "Order must be 'asc' or 'desc'".to_string(),
            }),
        }
    }
}

/// Parameters for [`fetch_files`]
#[derive(Debug, Clone)]
pub struct FileQuery {
    pub search: Option<String>,
    pub sort: Option<SortField>,
    pub order: SortOrder,
    pub offset: i64,
    pub limit: i64,
}

impl Default for FileQuery {
    fn default() -> Self {
        Self {
            search: None,
            sort: None,
            order: SortOrder::Asc,
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Stream the store through the filter, sort and paginate stages.
///
/// Opens a fresh handle and cursor for every call. A negative offset is treated as 0 and a
/// negative limit as 0.
#[instrument(skip_all, fields(store = %store.name, search = ?query.search, sort = ?query.sort, offset = query.offset, limit = query.limit))]
pub async fn fetch_files(store: &StoreConfig, query: &FileQuery) -> Result<Vec<StoredFileMetadata>> {
    let offset = query.offset.max(0);
    let limit = query.limit.max(0);
    let window = (offset as usize).saturating_add(limit as usize);

    let mut handle = StoreGateway::open(store).await?;
    let mut window_records = {
        let mut tx = handle.read().await?;
        let records = {
            let mut cursor = tx.open_forward_cursor();
            let records = filter_files(&mut cursor, query.search.as_deref(), window).await?;
            debug!(scanned = cursor.position(), matched = records.len(), "Filtered store");
            records
        };
        tx.finish().await?;
        records
    };
    handle.close().await?;

    if let Some(field) = query.sort {
        sort_files(&mut window_records, field, query.order);
    }

    Ok(paginate_files(window_records, offset, limit))
}

/// Stage 1: collect up to `window` records whose name contains `search`, case-insensitively.
///
/// An absent or empty search matches everything. Scanning stops once the window is full.
pub async fn filter_files(cursor: &mut Cursor<'_>, search: Option<&str>, window: usize) -> Result<Vec<StoredFileMetadata>> {
    let needle = search.filter(|s| !s.is_empty()).map(str::to_lowercase);
    let mut matched = Vec::new();

    if window == 0 {
        return Ok(matched);
    }

    while let Some(record) = cursor.next().await? {
        if needle.as_deref().is_none_or(|n| record.name.to_lowercase().contains(n)) {
            matched.push(record);
            if matched.len() >= window {
                break;
            }
        }
    }

    Ok(matched)
}

/// Stage 2: stable sort on one field
pub fn sort_files(records: &mut [StoredFileMetadata], field: SortField, order: SortOrder) {
    records.sort_by(|a, b| match order {
        SortOrder::Asc => field.compare(a, b),
        SortOrder::Desc => field.compare(a, b).reverse(),
    });
}

/// Stage 3: slice `[offset, offset + limit)`, clipped to the input. Negative values count as 0.
pub fn paginate_files(records: Vec<StoredFileMetadata>, offset: i64, limit: i64) -> Vec<StoredFileMetadata> {
    let offset = offset.max(0) as usize;
    let limit = limit.max(0) as usize;
    records.into_iter().skip(offset).take(limit).collect()
}
