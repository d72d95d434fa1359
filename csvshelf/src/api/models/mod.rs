//! API request and response data models.
//!
//! API models are kept apart from the stored record so the raw bytes never end up in a JSON body.

pub mod files;
