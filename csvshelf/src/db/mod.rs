//! Persistence layer over the embedded store.
//!
//! One SQLite file per store, opened through sqlx for the duration of a single operation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │   store::*  │  (upload, query, lookup, keys)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │   gateway   │  (open/upgrade, typed transactions, cursor)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │   SQLite    │
//! └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`gateway`]: Opening stores, read/write transactions and the forward cursor
//! - [`migrations`]: Versioned schema, tracked in `PRAGMA user_version`
//! - [`models`]: Record structures matching the `files` table
//! - [`errors`]: Store-specific error types
//!
//! ## Example Usage
//!
//! ```ignore
//! use csvshelf::db::gateway::{StoreGateway, StoreIndex};
//!
//! let mut handle = StoreGateway::open(&config.store).await?;
//! let mut tx = handle.read().await?;
//! if let Some(file) = tx.get_by_index(StoreIndex::Name, "speed.csv").await? {
//!     println!("{} is {} bytes", file.name, file.size);
//! }
//! tx.finish().await?;
//! handle.close().await?;
//! ```

pub mod errors;
pub mod gateway;
pub mod migrations;
pub mod models;
