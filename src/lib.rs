//! # exif-forge
//!
//! Lossless image metadata editing: read EXIF, PNG text and XMP into one
//! grouped tree, rewrite EXIF from presets, clear everything, or strip only the
//! markers that reveal an image as AI-generated while keeping camera data.
//!
//! JPEG files are edited segment by segment so the compressed image data is
//! never touched. Formats that cannot be patched in place are re-encoded, with
//! a fallback ladder when a codec step fails.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use exif_forge::config::Config;
//! use exif_forge::engine::Engine;
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!     let engine = Engine::new(&config);
//!
//!     let path = Path::new("render.png");
//!     let verdict = engine.scan_provenance(path)?;
//!     if verdict.is_aigc {
//!         println!("Found `{:?}` in {:?}", verdict.matched, verdict.source);
//!         let outcome = engine.strip_provenance(path, path)?;
//!         println!("Removed: {}", outcome.removed.join(", "));
//!     }
//!
//!     // Replace metadata with a camera preset, converting to JPEG.
//!     let preset = config.load_preset("sony_a7m4")?;
//!     engine.modify(path, Path::new("out/render.jpg"), &preset, true)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`engine`] — clear / modify / strip-provenance with lossless strategies
//! - [`metadata`] — the grouped [`metadata::MetadataTree`] and its values
//! - [`exif`] — tag registry, value coercion and the EXIF codec
//! - [`scanner`] — AI-generation keyword heuristics
//! - [`strategy`] — per-format strategy selection and fallback ladder
//! - [`jpeg`], [`png`], [`xmp`] — container-level helpers
//! - [`image_codec`] — pixel decode / encode
//! - [`pipeline`] — batch helpers: file collection, backups, per-file results
//! - [`config`] — JSON configuration and metadata presets

pub mod config;
pub mod engine;
pub mod error;
pub mod exif;
pub mod image_codec;
pub mod jpeg;
pub mod metadata;
pub mod pipeline;
pub mod png;
pub mod scanner;
pub mod strategy;
pub mod xmp;

#[cfg(test)]
pub(crate) mod test_support;
