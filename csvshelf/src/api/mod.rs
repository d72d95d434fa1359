//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! Everything lives under `/api/v1`:
//!
//! - `POST /files`: upload a CSV file (multipart)
//! - `GET /files`: search, sort and page through stored files
//! - `GET /files/keys`: every primary key in store order
//! - `GET /files/by-name/{name}`: metadata for one file
//! - `GET /files/by-name/{name}/content`: raw bytes of one file
//!
//! The OpenAPI document is served at `/api-docs/openapi.json`.

pub mod handlers;
pub mod models;
