use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::db::models::files::StoredFileMetadata;
use crate::store::query::DEFAULT_LIMIT;

/// Query parameters for listing files
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListFilesQuery {
    /// Case-insensitive substring matched against file names
    pub search: Option<String>,

    /// Field to sort by: name, size, mimeType, lastModified or annotationCount
    pub sort: Option<String>,

    /// Sort direction (asc or desc, default asc)
    #[serde(default = "default_order")]
    pub order: String,

    /// Number of matches to skip; negative values count as 0
    #[param(default = 0)]
    pub offset: Option<i64>,

    /// Maximum number of files to return (default 100)
    #[param(default = 100, minimum = 0)]
    pub limit: Option<i64>,
}

fn default_order() -> String {
    "asc".to_string()
}

impl ListFilesQuery {
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}

/// File metadata, without content
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileResponse {
    pub name: String,
    pub size: i64,
    pub mime_type: String,
    /// Milliseconds since the Unix epoch
    pub last_modified: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_at: Option<DateTime<Utc>>,
    pub annotation_count: i64,
}

impl From<&StoredFileMetadata> for FileResponse {
    fn from(record: &StoredFileMetadata) -> Self {
        Self {
            name: record.name.clone(),
            size: record.size,
            mime_type: record.mime_type.clone(),
            last_modified: record.last_modified,
            last_modified_at: DateTime::from_timestamp_millis(record.last_modified),
            annotation_count: record.annotation_count,
        }
    }
}

/// One page of files
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileListResponse {
    pub data: Vec<FileResponse>,
    /// Offset actually applied, after clamping
    pub offset: i64,
    pub limit: i64,
}
