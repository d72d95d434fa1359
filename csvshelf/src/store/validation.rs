//! Upload validation.
//!
//! Checks run in a fixed order and the first failure wins: missing file, size, extension,
//! then content shape.

use thiserror::Error;

use crate::config::UploadConfig;
use crate::store::upload::IncomingFile;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No file provided")]
    MissingFile,

    #[error("File size {size} bytes exceeds maximum allowed size of {max} bytes ({} MB)", .max / (1024 * 1024))]
    Oversized { size: u64, max: u64 },

    #[error("File '{name}' must have a .csv extension")]
    BadExtension { name: String },

    #[error("Line {line} is not comma-separated")]
    BadContent { line: usize },
}

impl ValidationError {
    /// Stable machine-readable reason
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::MissingFile => "missing-file",
            ValidationError::Oversized { .. } => "oversized",
            ValidationError::BadExtension { .. } => "bad-extension",
            ValidationError::BadContent { .. } => "bad-content",
        }
    }
}

/// Run every upload check in order, returning the file when all pass
pub fn validate_upload<'f>(file: Option<&'f IncomingFile>, limits: &UploadConfig) -> Result<&'f IncomingFile, ValidationError> {
    let file = file.ok_or(ValidationError::MissingFile)?;

    let size = file.size();
    if size > limits.max_file_size {
        return Err(ValidationError::Oversized {
            size,
            max: limits.max_file_size,
        });
    }

    if !has_csv_extension(&file.name) {
        return Err(ValidationError::BadExtension { name: file.name.clone() });
    }

    check_csv_content(&file.data)?;

    Ok(file)
}

pub fn has_csv_extension(name: &str) -> bool {
    name.to_lowercase().ends_with(".csv")
}

/// Every line must hold a non-empty value, a comma, and a comma-free tail.
///
/// A single trailing newline is allowed. Line numbers in errors are 1-based.
pub fn check_csv_content(data: &[u8]) -> Result<(), ValidationError> {
    let text = std::str::from_utf8(data).map_err(|e| ValidationError::BadContent {
        line: line_number_at(&data[..e.valid_up_to()]),
    })?;

    let body = match text.strip_suffix('\n') {
        Some(rest) => rest.strip_suffix('\r').unwrap_or(rest),
        None => text,
    };
    if body.is_empty() {
        return Err(ValidationError::BadContent { line: 1 });
    }

    for (idx, line) in body.split('\n').enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if !is_delimited_line(line) {
            return Err(ValidationError::BadContent { line: idx + 1 });
        }
    }

    Ok(())
}

fn is_delimited_line(line: &str) -> bool {
    match line.rfind(',') {
        Some(comma) => comma > 0 && comma + 1 < line.len(),
        None => false,
    }
}

fn line_number_at(prefix: &[u8]) -> usize {
    prefix.iter().filter(|b| **b == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn file(name: &str, content: &str) -> IncomingFile {
        IncomingFile {
            name: name.to_string(),
            mime_type: "text/csv".to_string(),
            last_modified: 0,
            data: Bytes::copy_from_slice(content.as_bytes()),
        }
    }

    #[test]
    fn test_accepts_well_formed_csv() {
        let f = file("speed.csv", "timestamp,speedometer_x,speedometer_y\n1,2,3\n");
        assert!(validate_upload(Some(&f), &UploadConfig::default()).is_ok());
    }

    #[test]
    fn test_missing_file() {
        let err = validate_upload(None, &UploadConfig::default()).unwrap_err();
        assert_eq!(err, ValidationError::MissingFile);
        assert_eq!(err.reason(), "missing-file");
    }

    #[test]
    fn test_size_checked_before_extension() {
        let limits = UploadConfig {
            max_file_size: 4,
            ..Default::default()
        };
        let err = validate_upload(Some(&file("data.txt", "a,b\n1,2\n")), &limits).unwrap_err();
        assert_eq!(err, ValidationError::Oversized { size: 8, max: 4 });
        assert_eq!(err.reason(), "oversized");
    }

    #[test]
    fn test_size_at_limit_is_accepted() {
        let limits = UploadConfig {
            max_file_size: 3,
            ..Default::default()
        };
        assert!(validate_upload(Some(&file("x.csv", "a,b")), &limits).is_ok());
    }

    #[test]
    fn test_extension_checked_before_content() {
        let err = validate_upload(Some(&file("data.txt", "no commas here")), &UploadConfig::default()).unwrap_err();
        assert_eq!(err.reason(), "bad-extension");
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        assert!(has_csv_extension("REPORT.CSV"));
        assert!(has_csv_extension("mixed.CsV"));
        assert!(!has_csv_extension("report.csv.bak"));
        assert!(!has_csv_extension("csv"));
    }

    #[test]
    fn test_content_rules() {
        assert!(check_csv_content(b"a,b").is_ok());
        assert!(check_csv_content(b"a,,b\r\nc,d\r\n").is_ok());
        assert_eq!(check_csv_content(b"").unwrap_err(), ValidationError::BadContent { line: 1 });
        assert_eq!(check_csv_content(b"a,b\nplain\n").unwrap_err(), ValidationError::BadContent { line: 2 });
        assert_eq!(check_csv_content(b",b\n").unwrap_err(), ValidationError::BadContent { line: 1 });
        assert_eq!(check_csv_content(b"a,b\nc,\n").unwrap_err(), ValidationError::BadContent { line: 2 });
        // Blank line in the middle breaks the shape
        assert_eq!(check_csv_content(b"a,b\n\nc,d\n").unwrap_err(), ValidationError::BadContent { line: 2 });
    }

    #[test]
    fn test_invalid_utf8_reports_line() {
        let err = check_csv_content(b"a,b\nc,\xff\n").unwrap_err();
        assert_eq!(err, ValidationError::BadContent { line: 2 });
    }
}
