use crate::AppState;
use crate::api::models::files::{FileListResponse, FileResponse, ListFilesQuery};
use crate::db::errors::DbError;
use crate::errors::{Error, Result};
use crate::store::validation::ValidationError;
use crate::store::{self, FileQuery, IncomingFile, SortField, SortOrder};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::Response,
};
use bytes::BytesMut;
use chrono::Utc;

fn multipart_error(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return Error::PayloadTooLarge {
            message: format!("Request body too large: {}", e.body_text()),
        };
    }
    Error::BadRequest {
        message: format!("Failed to parse multipart data: {}", e.body_text()),
    }
}

#[utoipa::path(
    post,
    path = "/files",
    tag = "files",
    summary = "Upload file",
    description = "Upload a CSV file. If the name is already taken the file is stored as `<name>-<suffix>`.",
    request_body(
        content_type = "multipart/form-data",
        description = "A `file` part, plus an optional `last_modified` field in milliseconds since the Unix epoch"
    ),
    responses(
        (status = 201, description = "File stored", body = FileResponse),
        (status = 400, description = "Missing file, wrong extension or content that is not comma-separated"),
        (status = 409, description = "Name still taken after every retry"),
        (status = 413, description = "Payload too large"),
        (status = 503, description = "Store unavailable")
    )
)]
pub async fn upload_file(State(state): State<AppState>, mut multipart: Multipart) -> Result<(StatusCode, Json<FileResponse>)> {
    let max_file_size = state.config.upload.max_file_size;

    let mut file: Option<IncomingFile> = None;
    let mut last_modified: Option<i64> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                let name = field.file_name().map(|s| s.to_string()).unwrap_or_default();
                let mime_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| mime_guess::from_path(&name).first_or_octet_stream().to_string());

                tracing::debug!(filename = %name, mime_type = %mime_type, "Receiving file");

                let mut data = BytesMut::new();
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    let total_size = (data.len() + chunk.len()) as u64;

                    // Abort as soon as the limit is crossed instead of buffering the rest
                    if total_size > max_file_size {
                        tracing::warn!(
                            filename = %name,
                            total_size = total_size,
                            max_file_size = max_file_size,
                            "File size limit exceeded, aborting upload"
                        );
                        return Err(ValidationError::Oversized {
                            size: total_size,
                            max: max_file_size,
                        }
                        .into());
                    }

                    data.extend_from_slice(&chunk);
                }

                file = Some(IncomingFile {
                    name,
                    mime_type,
                    last_modified: 0,
                    data: data.freeze(),
                });
            }
            "last_modified" | "lastModified" => {
                let text = field.text().await.map_err(multipart_error)?;
                let millis = text.trim().parse::<i64>().map_err(|_| Error::BadRequest {
                    message: format!("last_modified must be milliseconds since the Unix epoch, got '{}'", text.trim()),
                })?;
                last_modified = Some(millis);
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    let file = file.map(|mut f| {
        f.last_modified = last_modified.unwrap_or_else(|| Utc::now().timestamp_millis());
        f
    });

    let record = store::upload(&state.config.store, &state.config.upload, file).await?;

    Ok((StatusCode::CREATED, Json(FileResponse::from(&record.metadata()))))
}

#[utoipa::path(
    get,
    path = "/files",
    tag = "files",
    summary = "List files",
    description = "Scans the store in key order, keeps names containing `search`, stops after `offset + limit` matches, \
                   then sorts that window and returns the requested page. Sorting only sees the scanned window.",
    responses(
        (status = 200, description = "One page of files", body = FileListResponse),
        (status = 400, description = "Unknown sort field or order"),
        (status = 503, description = "Store unavailable")
    ),
    params(
        ListFilesQuery
    )
)]
pub async fn list_files(State(state): State<AppState>, Query(query): Query<ListFilesQuery>) -> Result<Json<FileListResponse>> {
    let order = query.order.parse::<SortOrder>()?;
    let sort = query
        .sort
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<SortField>)
        .transpose()?;

    let file_query = FileQuery {
        search: query.search.clone(),
        sort,
        order,
        offset: query.offset(),
        limit: query.limit(),
    };

    let records = store::fetch_files(&state.config.store, &file_query).await?;

    Ok(Json(FileListResponse {
        data: records.iter().map(FileResponse::from).collect(),
        offset: file_query.offset.max(0),
        limit: file_query.limit.max(0),
    }))
}

#[utoipa::path(
    get,
    path = "/files/keys",
    tag = "files",
    summary = "List keys",
    description = "Every primary key in store order. Empty if nothing was ever stored.",
    responses(
        (status = 200, description = "Keys", body = Vec<String>),
        (status = 503, description = "Store unavailable")
    )
)]
pub async fn list_keys(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(store::get_keys(&state.config.store).await?))
}

#[utoipa::path(
    get,
    path = "/files/by-name/{name}",
    tag = "files",
    summary = "Retrieve file",
    description = "Exact-match lookup by stored name.",
    responses(
        (status = 200, description = "File metadata", body = FileResponse),
        (status = 404, description = "File not found"),
        (status = 503, description = "Store unavailable")
    ),
    params(
        ("name" = String, Path, description = "The stored name of the file")
    )
)]
pub async fn get_file_by_name(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<FileResponse>> {
    let metadata = store::fetch_file_metadata_by_name(&state.config.store, &name)
        .await?
        .ok_or(Error::Database(DbError::NotFound))?;

    Ok(Json(FileResponse::from(&metadata)))
}

#[utoipa::path(
    get,
    path = "/files/by-name/{name}/content",
    tag = "files",
    summary = "Retrieve file content",
    description = "Returns the stored bytes with the recorded MIME type.",
    responses(
        (status = 200, description = "File content", body = String, content_type = "text/csv"),
        (status = 404, description = "File not found"),
        (status = 503, description = "Store unavailable")
    ),
    params(
        ("name" = String, Path, description = "The stored name of the file")
    )
)]
pub async fn get_file_content(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response> {
    let record = store::fetch_file_by_name(&state.config.store, &name)
        .await?
        .ok_or(Error::Database(DbError::NotFound))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, record.mime_type.as_str())
        .header(header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", record.name.replace('"', "")))
        .body(Body::from(record.raw_data))
        .map_err(|e| Error::Internal {
            operation: format!("build content response: {e}"),
        })
}
