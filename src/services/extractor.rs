//! Metadata extraction seam.
//!
//! Decoding EXIF is left to whatever implementation is plugged in here; the
//! service only hands over the leading bytes of an object and stores the
//! record that comes back.

use crate::models::metadata::PhotoMetadata;

/// Bytes handed to an extractor. EXIF lives in the first segments of a JPEG,
/// so the head of the object is enough.
pub const METADATA_HEAD_LIMIT: usize = 256 * 1024;

pub trait MetadataExtractor: Send + Sync {
    /// Build a metadata record from the head of an object. Must not fail:
    /// undecodable input yields a record holding only `original_filename`.
    fn extract(&self, head: &[u8], original_filename: &str) -> PhotoMetadata;
}

/// Records the original filename and nothing else.
#[derive(Clone, Copy, Debug, Default)]
pub struct FilenameExtractor;

impl MetadataExtractor for FilenameExtractor {
    fn extract(&self, _head: &[u8], original_filename: &str) -> PhotoMetadata {
        PhotoMetadata::with_filename(original_filename)
    }
}
