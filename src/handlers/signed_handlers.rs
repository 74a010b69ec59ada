//! Serving URLs signed by the local blob store.
//!
//! These routes carry no caller identity; the signature is the authorization.

use super::photo_handlers::stream_response;
use crate::{
    errors::AppError,
    services::blob_store::{SignMethod, SignedRequest},
    state::AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Response,
};

/// `GET /signed/{*key}?method=&expires=&signature=`
pub async fn get_signed(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(request): Query<SignedRequest>,
) -> Result<Response, AppError> {
    let download = state
        .service
        .open_signed(&key, &request, SignMethod::Get)
        .await?;
    Ok(stream_response(download))
}

/// `HEAD /signed/{*key}`: headers only.
pub async fn head_signed(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(request): Query<SignedRequest>,
) -> Result<Response, AppError> {
    let download = state
        .service
        .open_signed(&key, &request, SignMethod::Head)
        .await?;
    Ok(stream_response(download))
}
