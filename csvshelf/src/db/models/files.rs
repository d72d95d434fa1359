use serde::{Deserialize, Serialize};

/// A stored file, the only entity in the store.
///
/// `name` doubles as the primary key and is kept unique by the `files_name_idx`
/// index. `raw_data` belongs to the record and is never shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredFileRecord {
    pub name: String,
    pub size: i64,
    pub mime_type: String,
    /// Milliseconds since the Unix epoch, as reported by the uploader
    pub last_modified: i64,
    #[serde(skip)]
    pub raw_data: Vec<u8>,
    /// Starts at 0; nothing in this crate mutates it
    pub annotation_count: i64,
}

impl StoredFileRecord {
    /// Everything but the content
    pub fn metadata(&self) -> StoredFileMetadata {
        StoredFileMetadata {
            name: self.name.clone(),
            size: self.size,
            mime_type: self.mime_type.clone(),
            last_modified: self.last_modified,
            annotation_count: self.annotation_count,
        }
    }
}

/// A stored file without its content.
///
/// Listing and name lookups that only report metadata read this projection, so scanning the
/// store never loads `raw_data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredFileMetadata {
    pub name: String,
    pub size: i64,
    pub mime_type: String,
    /// Milliseconds since the Unix epoch, as reported by the uploader
    pub last_modified: i64,
    pub annotation_count: i64,
}

/// Database request for creating a new stored file
#[derive(Debug, Clone)]
pub struct FileCreateDBRequest {
    pub name: String,
    pub mime_type: String,
    pub last_modified: i64,
    pub raw_data: Vec<u8>,
}

impl FileCreateDBRequest {
    /// Build the record that gets persisted under `name`
    pub fn into_record(self) -> StoredFileRecord {
        StoredFileRecord {
            size: self.raw_data.len() as i64,
            name: self.name,
            mime_type: self.mime_type,
            last_modified: self.last_modified,
            raw_data: self.raw_data,
            annotation_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_has_no_annotations() {
        let record = FileCreateDBRequest {
            name: "speed.csv".to_string(),
            mime_type: "text/csv".to_string(),
            last_modified: 1_700_000_000_000,
            raw_data: b"a,b\n1,2\n".to_vec(),
        }
        .into_record();

        assert_eq!(record.size, 8);
        assert_eq!(record.annotation_count, 0);
        assert_eq!(record.name, "speed.csv");

        let metadata = record.metadata();
        assert_eq!(metadata.size, 8);
        assert_eq!(metadata.name, record.name);
    }
}
