//! HTTP request handlers.
//!
//! Handlers parse the request, call into [`crate::store`] with the relevant configuration
//! section, and map the outcome to a response. Errors convert through [`crate::errors::Error`].
//!
//! - [`files`]: File upload, listing and retrieval

pub mod files;
