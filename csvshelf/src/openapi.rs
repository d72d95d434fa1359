//! OpenAPI document for the `/api/v1` surface, served at `/api-docs/openapi.json`.

use utoipa::OpenApi;

use crate::api;
use crate::api::models::files::{FileListResponse, FileResponse};

#[derive(OpenApi)]
#[openapi(
    servers(
        (url = "/api/v1", description = "CSV file store API")
    ),
    paths(
        api::handlers::files::upload_file,
        api::handlers::files::list_files,
        api::handlers::files::list_keys,
        api::handlers::files::get_file_by_name,
        api::handlers::files::get_file_content,
    ),
    components(schemas(FileResponse, FileListResponse)),
    tags(
        (name = "files", description = "Upload, search and retrieve CSV files")
    ),
    info(
        title = "csvshelf",
        description = "Upload CSV files into an embedded store and search, sort and page through them"
    )
)]
pub struct ApiDoc;
