//! Directory index documents (`<prefix>/index.md`).

use crate::{
    auth::Caller, errors::AppError, services::library_service::MarkdownDocument, state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct MarkdownReq {
    #[serde(default)]
    pub markdown: String,
}

pub async fn create_markdown(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(prefix): Path<String>,
    Json(req): Json<MarkdownReq>,
) -> Result<impl IntoResponse, AppError> {
    let key = state
        .service
        .create_markdown(owner, &prefix, &req.markdown)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "key": key }))))
}

pub async fn get_markdown(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(prefix): Path<String>,
) -> Result<Json<MarkdownDocument>, AppError> {
    Ok(Json(state.service.get_markdown(owner, &prefix).await?))
}

pub async fn update_markdown(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(prefix): Path<String>,
    Json(req): Json<MarkdownReq>,
) -> Result<impl IntoResponse, AppError> {
    let key = state
        .service
        .update_markdown(owner, &prefix, &req.markdown)
        .await?;
    Ok(Json(json!({ "key": key })))
}

pub async fn delete_markdown(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(prefix): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let success = state.service.delete_markdown(owner, &prefix).await?;
    Ok(Json(json!({ "success": success })))
}
