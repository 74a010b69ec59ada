//! Caller identities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Numeric identity that owns index records.
pub type OwnerId = i64;

/// A user resolved from a trusted identity header.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct User {
    pub id: OwnerId,
    pub username: String,
    pub created_at: DateTime<Utc>,
}
