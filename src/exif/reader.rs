use crate::metadata::{Group, MetadataTree};
use crate::pipeline::ImageKind;
use crate::{jpeg, png, xmp};

use super::ExifCodec;

/// Read every metadata group a container carries.
///
/// Decoding is tolerant: a part that cannot be parsed is left out of the tree
/// (with a debug log) instead of failing the whole read. Empty groups are
/// omitted.
pub fn read_metadata(codec: &dyn ExifCodec, bytes: &[u8]) -> MetadataTree {
    let mut tree = MetadataTree::new();
    let Some(kind) = ImageKind::sniff(bytes) else {
        log::debug!("Unrecognised container; no metadata read");
        return tree;
    };

    match codec.extract(kind, bytes) {
        Ok(Some(blob)) => match codec.decode(&blob) {
            Ok(exif) => tree.merge(exif),
            Err(e) => log::debug!("Undecodable EXIF in {kind}: {e}"),
        },
        Ok(None) => {}
        Err(e) => log::debug!("Could not locate EXIF in {kind}: {e}"),
    }

    let mut packet: Option<Vec<u8>> = None;
    match kind {
        ImageKind::Png => match png::text_chunks(bytes) {
            Ok(chunks) => {
                for chunk in chunks {
                    if chunk.is_xmp() {
                        packet = Some(chunk.text.into_bytes());
                    } else {
                        tree.insert(Group::PngInfo, chunk.keyword, chunk.text);
                    }
                }
            }
            Err(e) => log::debug!("Could not read PNG text chunks: {e}"),
        },
        ImageKind::Jpeg => match jpeg::xmp_packet(bytes) {
            Ok(found) => packet = found.map(<[u8]>::to_vec),
            Err(e) => log::debug!("Could not walk JPEG segments: {e}"),
        },
        _ => packet = xmp::find_packet(bytes).map(<[u8]>::to_vec),
    }
    if let Some(packet) = packet {
        tree.set_group(Group::Xmp, xmp::parse(&packet));
    }

    tree.prune();
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::TiffCodec;
    use crate::metadata::MetaValue;
    use crate::png::{graft, text_chunk};
    use crate::test_support::{jpeg_fixture, png_fixture, sample_exif, with_xmp};

    #[test]
    fn plain_image_has_no_metadata() {
        let codec = TiffCodec::new();
        assert!(read_metadata(&codec, &jpeg_fixture()).is_empty());
        assert!(read_metadata(&codec, &png_fixture()).is_empty());
        assert!(read_metadata(&codec, b"not an image").is_empty());
    }

    #[test]
    fn jpeg_exif_and_xmp() {
        let codec = TiffCodec::new();
        let with_exif = codec
            .insert(ImageKind::Jpeg, &jpeg_fixture(), &sample_exif())
            .unwrap();
        let bytes = with_xmp(&with_exif, "<x:xmpmeta><dc:creator>Jane</dc:creator></x:xmpmeta>");

        let tree = read_metadata(&codec, &bytes);
        assert_eq!(tree.get_text(Group::Zeroth, "Make"), Some("SONY"));
        assert_eq!(tree.get_text(Group::Exif, "UserComment"), Some("Steps: 20, Model: sdxl"));
        let xmp = tree.get(Group::Xmp, "x:xmpmeta").unwrap();
        let MetaValue::Tree(inner) = xmp else {
            panic!("expected a tree, got {xmp:?}");
        };
        assert_eq!(inner.get("dc:creator"), Some(&MetaValue::from("Jane")));
    }

    #[test]
    fn png_text_and_xmp_chunks() {
        let codec = TiffCodec::new();
        let bytes = graft(
            &png_fixture(),
            &[
                text_chunk("parameters", "Steps: 20, Model: sdxl"),
                text_chunk(xmp::PNG_XMP_KEYWORD, "<x:xmpmeta><a>b</a></x:xmpmeta>"),
            ],
        )
        .unwrap();

        let tree = read_metadata(&codec, &bytes);
        assert_eq!(
            tree.get_text(Group::PngInfo, "parameters"),
            Some("Steps: 20, Model: sdxl")
        );
        assert!(tree.get(Group::PngInfo, xmp::PNG_XMP_KEYWORD).is_none());
        assert!(tree.group(Group::Xmp).is_some());
        assert!(tree.group(Group::Zeroth).is_none());
    }
}
