//! HTTP handlers for photos, directories and library maintenance.
//! Photo bodies are streamed in both directions; every other payload is JSON.

use crate::{
    auth::Caller,
    errors::AppError,
    models::photo::Photo,
    services::{
        blob_store::{BlobAttributes, ByteStream},
        library_service::{Download, PhotoPage, SignedUrl},
    },
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::{collections::HashMap, io};

#[derive(Debug, Deserialize)]
pub struct ListPhotosQuery {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub page_size: i64,
    pub page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListDirectoriesQuery {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMetadataReq {
    pub content_type: Option<String>,
    pub custom_metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub struct TransferReq {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Deserialize)]
pub struct SyncReq {
    #[serde(default)]
    pub refresh_metadata: bool,
}

#[derive(Debug, Deserialize)]
pub struct SignedUrlReq {
    pub key: String,
    pub method: Option<String>,
    pub expiration_seconds: Option<i64>,
}

/// `PUT /photos/{*key}`: stream the request body into the library.
pub async fn upload_photo(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<Photo>, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let stream: ByteStream = Box::pin(
        body.into_data_stream()
            .map(|chunk| chunk.map_err(io::Error::other)),
    );

    let photo = state
        .service
        .upload(owner, &key, content_type, stream)
        .await?;
    Ok(Json(photo))
}

/// `GET /photos/{*key}` as a streaming response.
pub async fn download_photo(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let download = state.service.download(owner, &key).await?;
    Ok(stream_response(download))
}

/// `HEAD /photos/{*key}`: same headers as GET but no body.
pub async fn head_photo(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let attrs = state.service.attributes(owner, &key).await?;
    let mut response = Response::new(Body::empty());
    set_attribute_headers(response.headers_mut(), &attrs);
    Ok(response)
}

pub async fn delete_photo(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let success = state.service.delete(owner, &key).await?;
    Ok(Json(json!({ "success": success })))
}

pub async fn get_info(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(key): Path<String>,
) -> Result<Json<Photo>, AppError> {
    Ok(Json(state.service.get(owner, &key).await?))
}

pub async fn update_info(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(key): Path<String>,
    Json(req): Json<UpdateMetadataReq>,
) -> Result<Json<Photo>, AppError> {
    let photo = state
        .service
        .update_metadata(owner, &key, req.content_type, req.custom_metadata)
        .await?;
    Ok(Json(photo))
}

pub async fn photo_exists(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let exists = state.service.exists(owner, &key).await?;
    Ok(Json(json!({ "exists": exists })))
}

/// `GET /photos?prefix=&page_size=&page_token=`
pub async fn list_photos(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Query(q): Query<ListPhotosQuery>,
) -> Result<Json<PhotoPage>, AppError> {
    let page = state
        .service
        .list_photos(owner, &q.prefix, q.page_size, q.page_token.as_deref())
        .await?;
    Ok(Json(page))
}

/// `GET /directories?prefix=&recursive=`
pub async fn list_directories(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Query(q): Query<ListDirectoriesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let directories = state
        .service
        .list_directories(owner, &q.prefix, q.recursive)
        .await?;
    Ok(Json(json!({ "directories": directories })))
}

pub async fn copy_photo(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Json(req): Json<TransferReq>,
) -> Result<Json<Photo>, AppError> {
    let photo = state
        .service
        .copy(owner, &req.source, &req.destination)
        .await?;
    Ok(Json(photo))
}

pub async fn rename_photo(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Json(req): Json<TransferReq>,
) -> Result<Json<Photo>, AppError> {
    let photo = state
        .service
        .rename(owner, &req.source, &req.destination)
        .await?;
    Ok(Json(photo))
}

/// `POST /sync`: run one reconciliation pass for the caller. 204 on success.
pub async fn sync_library(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Json(req): Json<SyncReq>,
) -> Result<StatusCode, AppError> {
    state.service.sync(owner, req.refresh_metadata).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_signed_url(
    State(state): State<AppState>,
    Caller(owner): Caller,
    Json(req): Json<SignedUrlReq>,
) -> Result<Json<SignedUrl>, AppError> {
    let signed = state
        .service
        .signed_url(owner, &req.key, req.method.as_deref(), req.expiration_seconds)
        .await?;
    Ok(Json(signed))
}

pub(crate) fn stream_response(download: Download) -> Response {
    let mut response = Response::new(Body::from_stream(download.body));
    set_attribute_headers(response.headers_mut(), &download.attributes);
    response
}

fn set_attribute_headers(headers: &mut HeaderMap, attrs: &BlobAttributes) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&attrs.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(attrs.size.max(0)));

    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", attrs.checksum)) {
        headers.insert(header::ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(&attrs.updated_at.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
