//! EXIF tag registry, value coercion, and the TIFF blob codec.
//!
//! - [`tags`]: per-group tables mapping tag names to ids and declared types
//! - [`coerce`]: JSON-shaped values ↔ codec-ready values
//! - [`TiffCodec`]: the shipped [`ExifCodec`] (kamadak-exif + img-parts)
//! - [`read_metadata`]: the full readable tree of a container (EXIF, PNG text, XMP)

pub mod coerce;
mod reader;
pub mod tags;
mod tiff;
mod writer;

pub use coerce::CoercedValue;
pub use reader::read_metadata;
pub use tags::{TagDescriptor, TagType, by_id, lookup};
pub use tiff::{EncodedField, TiffCodec};

use crate::error::Result;
use crate::metadata::{Group, MetadataTree};
use crate::pipeline::ImageKind;

/// Serialization of the EXIF TIFF structure and its placement in containers.
///
/// The blob-level methods operate on raw TIFF data (no `Exif\0\0` prefix). The
/// container-level methods support JPEG, PNG and WebP; other kinds return
/// [`EngineError::Codec`](crate::error::EngineError::Codec).
pub trait ExifCodec: Send + Sync {
    /// Decode a TIFF blob into the `0th` / `Exif` / `GPS` / `1st` groups.
    fn decode(&self, blob: &[u8]) -> Result<MetadataTree>;

    /// Serialize fields into a fresh TIFF blob.
    fn encode(&self, fields: &[EncodedField]) -> Result<Vec<u8>>;

    /// Re-serialize `blob` without the listed `(group, tag id)` entries. Every
    /// other field keeps its exact value; an embedded thumbnail is preserved.
    fn retain(&self, blob: &[u8], drop: &[(Group, u16)]) -> Result<Vec<u8>>;

    fn extract(&self, kind: ImageKind, container: &[u8]) -> Result<Option<Vec<u8>>>;

    fn insert(&self, kind: ImageKind, container: &[u8], blob: &[u8]) -> Result<Vec<u8>>;

    fn remove(&self, kind: ImageKind, container: &[u8]) -> Result<Vec<u8>>;
}
