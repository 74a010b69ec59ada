//! Defines the HTTP surface of the photo library.
//!
//! ## Structure
//! - **Health**: `GET /healthz`, `GET /readyz`
//! - **Photos**
//!   - `GET    /photos?prefix=&page_size=&page_token=`: one page of photos
//!   - `PUT    /photos/{*key}`: upload (streamed body)
//!   - `GET    /photos/{*key}`: download (streamed body)
//!   - `HEAD   /photos/{*key}`: headers only
//!   - `DELETE /photos/{*key}`: delete
//!   - `GET    /info/{*key}`, `PATCH /info/{*key}`: record plus attributes; update metadata
//!   - `GET    /exists/{*key}`
//! - **Library**
//!   - `GET  /directories?prefix=&recursive=`
//!   - `POST /copy`, `POST /rename`, `POST /sync`, `POST /signed-urls`
//! - **Markdown**: `POST/GET/PUT/DELETE /markdown/{*prefix}`
//! - **Signed downloads**: `GET/HEAD /signed/{*key}?method=&expires=&signature=`
//!
//! The wildcard `*key` allows nested keys like `trips/2025/img.jpg`.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        markdown_handlers::{create_markdown, delete_markdown, get_markdown, update_markdown},
        photo_handlers::{
            copy_photo, create_signed_url, delete_photo, download_photo, get_info, head_photo,
            list_directories, list_photos, photo_exists, rename_photo, sync_library, update_info,
            upload_photo,
        },
        signed_handlers::{get_signed, head_signed},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build the router. Handlers share [`AppState`].
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/photos", get(list_photos))
        .route(
            "/photos/{*key}",
            put(upload_photo)
                .get(download_photo)
                .head(head_photo)
                .delete(delete_photo),
        )
        .route("/info/{*key}", get(get_info).patch(update_info))
        .route("/exists/{*key}", get(photo_exists))
        .route("/directories", get(list_directories))
        .route("/copy", post(copy_photo))
        .route("/rename", post(rename_photo))
        .route("/sync", post(sync_library))
        .route("/signed-urls", post(create_signed_url))
        .route(
            "/markdown/{*prefix}",
            post(create_markdown)
                .get(get_markdown)
                .put(update_markdown)
                .delete(delete_markdown),
        )
        .route("/signed/{*key}", get(get_signed).head(head_signed))
}
