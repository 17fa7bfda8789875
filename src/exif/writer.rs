//! Container-level EXIF placement: where the TIFF blob lives inside a JPEG,
//! PNG or WebP file. The blob itself is opaque here.

use img_parts::jpeg::Jpeg;
use img_parts::png::Png;
use img_parts::webp::WebP;
use img_parts::{Bytes, ImageEXIF};

use crate::error::{EngineError, Result};
use crate::pipeline::ImageKind;

const EXIF_PREFIX: &[u8] = b"Exif\0\0";

/// Return the TIFF blob embedded in `container`, if any.
///
/// For TIFF files the whole file is the blob.
pub fn extract(kind: ImageKind, container: &[u8]) -> Result<Option<Vec<u8>>> {
    let exif = match kind {
        ImageKind::Jpeg => parse_jpeg(container)?.exif(),
        ImageKind::Png => parse_png(container)?.exif(),
        ImageKind::WebP => parse_webp(container)?.exif(),
        ImageKind::Tiff => return Ok(Some(container.to_vec())),
        ImageKind::Bmp | ImageKind::Gif => return Ok(None),
    };
    Ok(exif.filter(|b| !b.is_empty()).map(|b| b.to_vec()))
}

/// Replace (or add) the EXIF blob. Every other segment / chunk is kept as-is.
pub fn insert(kind: ImageKind, container: &[u8], blob: &[u8]) -> Result<Vec<u8>> {
    let blob = Bytes::copy_from_slice(blob);
    let out = match kind {
        ImageKind::Jpeg => {
            let mut jpeg = parse_jpeg(container)?;
            let orig_pos = find_exif_segment_pos(&jpeg);
            jpeg.set_exif(Some(blob));

            // set_exif() appends after the APPn run it finds, which may put EXIF
            // behind XMP. Move it back to where it was (or right after APP0).
            if let Some(new_pos) = find_exif_segment_pos(&jpeg) {
                let target_pos = orig_pos.unwrap_or(1).min(new_pos);
                if new_pos != target_pos {
                    let segments = jpeg.segments_mut();
                    let seg = segments.remove(new_pos);
                    segments.insert(target_pos, seg);
                }
            }
            jpeg.encoder().bytes()
        }
        ImageKind::Png => {
            let mut png = parse_png(container)?;
            png.set_exif(Some(blob));
            png.encoder().bytes()
        }
        ImageKind::WebP => {
            let mut webp = parse_webp(container)?;
            webp.set_exif(Some(blob));
            webp.encoder().bytes()
        }
        ImageKind::Tiff | ImageKind::Bmp | ImageKind::Gif => {
            return Err(EngineError::codec(format!(
                "cannot place an EXIF blob inside {kind}"
            )));
        }
    };
    Ok(out.to_vec())
}

/// Drop the EXIF blob, leaving every other segment / chunk untouched.
pub fn remove(kind: ImageKind, container: &[u8]) -> Result<Vec<u8>> {
    let out = match kind {
        ImageKind::Jpeg => {
            let mut jpeg = parse_jpeg(container)?;
            jpeg.set_exif(None);
            jpeg.encoder().bytes()
        }
        ImageKind::Png => {
            let mut png = parse_png(container)?;
            png.set_exif(None);
            png.encoder().bytes()
        }
        ImageKind::WebP => {
            let mut webp = parse_webp(container)?;
            webp.set_exif(None);
            webp.encoder().bytes()
        }
        ImageKind::Bmp | ImageKind::Gif => return Ok(container.to_vec()),
        ImageKind::Tiff => {
            return Err(EngineError::codec("TIFF metadata cannot be removed in place"));
        }
    };
    Ok(out.to_vec())
}

/// Find the position of the EXIF APP1 segment in a JPEG.
fn find_exif_segment_pos(jpeg: &Jpeg) -> Option<usize> {
    jpeg.segments()
        .iter()
        .position(|s| s.marker() == 0xE1 && s.contents().starts_with(EXIF_PREFIX))
}

fn parse_jpeg(bytes: &[u8]) -> Result<Jpeg> {
    Jpeg::from_bytes(Bytes::copy_from_slice(bytes))
        .map_err(|e| EngineError::codec(format!("failed to parse JPEG: {e}")))
}

fn parse_png(bytes: &[u8]) -> Result<Png> {
    Png::from_bytes(Bytes::copy_from_slice(bytes))
        .map_err(|e| EngineError::codec(format!("failed to parse PNG: {e}")))
}

fn parse_webp(bytes: &[u8]) -> Result<WebP> {
    WebP::from_bytes(Bytes::copy_from_slice(bytes))
        .map_err(|e| EngineError::codec(format!("failed to parse WebP: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{jpeg_fixture, png_fixture};

    const BLOB: &[u8] = b"MM\0\x2a\0\0\0\x08\0\0\0\0\0\0";

    #[test]
    fn jpeg_insert_extract_remove() {
        let plain = jpeg_fixture();
        assert_eq!(extract(ImageKind::Jpeg, &plain).unwrap(), None);

        let with_exif = insert(ImageKind::Jpeg, &plain, BLOB).unwrap();
        assert_eq!(extract(ImageKind::Jpeg, &with_exif).unwrap().as_deref(), Some(BLOB));

        let jpeg = parse_jpeg(&with_exif).unwrap();
        assert!(find_exif_segment_pos(&jpeg).unwrap() <= 1);

        let removed = remove(ImageKind::Jpeg, &with_exif).unwrap();
        assert_eq!(extract(ImageKind::Jpeg, &removed).unwrap(), None);
        assert_eq!(removed, plain);
    }

    #[test]
    fn jpeg_insert_replaces_existing_blob() {
        let first = insert(ImageKind::Jpeg, &jpeg_fixture(), BLOB).unwrap();
        let other = b"II\x2a\0\x08\0\0\0\0\0\0\0\0\0";
        let second = insert(ImageKind::Jpeg, &first, other).unwrap();
        assert_eq!(extract(ImageKind::Jpeg, &second).unwrap().as_deref(), Some(&other[..]));
        let exif_segments = parse_jpeg(&second)
            .unwrap()
            .segments()
            .iter()
            .filter(|s| s.contents().starts_with(EXIF_PREFIX))
            .count();
        assert_eq!(exif_segments, 1);
    }

    #[test]
    fn png_exif_chunk() {
        let with_exif = insert(ImageKind::Png, &png_fixture(), BLOB).unwrap();
        assert_eq!(extract(ImageKind::Png, &with_exif).unwrap().as_deref(), Some(BLOB));
        let removed = remove(ImageKind::Png, &with_exif).unwrap();
        assert_eq!(extract(ImageKind::Png, &removed).unwrap(), None);
    }

    #[test]
    fn tiff_is_not_patchable() {
        assert!(matches!(
            insert(ImageKind::Tiff, b"II*\0", BLOB),
            Err(EngineError::Codec(_))
        ));
        assert_eq!(
            extract(ImageKind::Tiff, b"II*\0").unwrap().as_deref(),
            Some(&b"II*\0"[..])
        );
    }

    #[test]
    fn garbage_is_codec_error() {
        assert!(matches!(
            extract(ImageKind::Png, b"nope"),
            Err(EngineError::Codec(_))
        ));
    }
}
