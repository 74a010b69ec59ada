//! Caller identity resolution.
//!
//! Identity is resolved once per request by the [`Caller`] extractor and
//! handed to the service as a plain owner id.

use crate::{
    errors::AppError,
    models::user::OwnerId,
    services::error::LibraryError,
    state::AppState,
};
use axum::{extract::FromRequestParts, http::request::Parts};

/// How requests are mapped to an owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthMode {
    /// Every request acts as this owner. Single-user deployments.
    Fixed(OwnerId),
    /// A trusted reverse proxy puts the username in this header.
    Header(String),
}

/// Owner id of the authenticated caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caller(pub OwnerId);

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match &state.auth {
            AuthMode::Fixed(owner) => Ok(Caller(*owner)),
            AuthMode::Header(name) => {
                let username = parts
                    .headers
                    .get(name.as_str())
                    .and_then(|v| v.to_str().ok())
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| {
                        LibraryError::Unauthenticated(format!("missing {} header", name))
                    })?;
                let user = state.service.index.get_or_create_user(username).await?;
                Ok(Caller(user.id))
            }
        }
    }
}
