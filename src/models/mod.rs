//! Core data models for the photo library index.
//!
//! Object and directory records map to SQLite tables via `sqlx::FromRow`;
//! the metadata record maps to the blob store's string side-channel.

pub mod directory;
pub mod metadata;
pub mod object;
pub mod photo;
pub mod user;
