//! Operations on the file store.
//!
//! Every operation takes the store section of the configuration explicitly and opens its own
//! handle; nothing is cached between calls.

pub mod keys;
pub mod lookup;
pub mod naming;
pub mod query;
pub mod upload;
pub mod validation;

pub use keys::get_keys;
pub use lookup::{fetch_file_by_name, fetch_file_metadata_by_name};
pub use query::{FileQuery, SortField, SortOrder, fetch_files};
pub use upload::{IncomingFile, upload};
