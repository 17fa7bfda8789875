//! Fixtures shared by the unit tests. Images are generated, never checked in.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, RgbImage};
use img_parts::Bytes;
use img_parts::jpeg::{Jpeg, JpegSegment};

use crate::exif::{EncodedField, ExifCodec, TiffCodec, coerce, lookup};
use crate::jpeg::XMP_SIGNATURE;
use crate::metadata::{Group, MetaValue};

fn gradient() -> RgbImage {
    RgbImage::from_fn(16, 8, |x, y| image::Rgb([(x * 16) as u8, (y * 32) as u8, 128]))
}

pub fn jpeg_fixture() -> Vec<u8> {
    let img = gradient();
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, 90)
        .write_image(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgb8)
        .unwrap();
    out.into_inner()
}

pub fn png_fixture() -> Vec<u8> {
    let img = gradient();
    let mut out = Cursor::new(Vec::new());
    PngEncoder::new(&mut out)
        .write_image(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgb8)
        .unwrap();
    out.into_inner()
}

pub fn field(group: Group, name: &str, value: impl Into<MetaValue>) -> EncodedField {
    let tag = lookup(group, name).unwrap();
    EncodedField {
        group,
        tag,
        value: coerce::coerce(tag, &value.into()).unwrap(),
    }
}

/// A TIFF blob with a camera make, an AI-looking user comment and software tag.
pub fn sample_exif() -> Vec<u8> {
    TiffCodec::new()
        .encode(&[
            field(Group::Zeroth, "Make", "SONY"),
            field(Group::Zeroth, "Model", "ILCE-7M4"),
            field(Group::Zeroth, "Software", "ComfyUI"),
            field(Group::Exif, "UserComment", "Steps: 20, Model: sdxl"),
            field(Group::Exif, "ISOSpeedRatings", 100i64),
        ])
        .unwrap()
}

/// Add an XMP APP1 segment after APP0.
pub fn with_xmp(jpeg: &[u8], packet: &str) -> Vec<u8> {
    let mut parsed = Jpeg::from_bytes(Bytes::copy_from_slice(jpeg)).unwrap();
    let mut contents = XMP_SIGNATURE.to_vec();
    contents.extend_from_slice(packet.as_bytes());
    let segment = JpegSegment::new_with_contents(0xE1, Bytes::from(contents));
    let at = parsed.segments().len().min(1);
    parsed.segments_mut().insert(at, segment);
    parsed.encoder().bytes().to_vec()
}
