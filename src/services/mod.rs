//! Library services: the two stores, their adapters and the operations
//! composed on top of them.

pub mod blob_store;
pub mod directory_gc;
pub mod error;
pub mod extractor;
pub mod frontmatter;
pub mod index_store;
pub mod library_service;
pub mod local_blob_store;
#[cfg(test)]
pub mod memory_blob_store;
pub mod pagination;
pub mod paths;
pub mod reconcile;
pub mod transfer;
