use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tiff::TiffEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageEncoder, ImageFormat, ImageReader};

use crate::error::{EngineError, Result};
use crate::pipeline::ImageKind;

/// Decoded pixels plus what they were decoded from.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub pixels: DynamicImage,
    pub format: ImageKind,
    pub width: u32,
    pub height: u32,
}

/// Pixel decode / encode. Encoders must not write any metadata of their own.
pub trait ImageCodec: Send + Sync {
    fn open(&self, bytes: &[u8]) -> Result<DecodedImage>;

    /// Encode `image` as `kind`. `quality` only applies to lossy JPEG output.
    fn save(&self, image: &DecodedImage, kind: ImageKind, quality: u8) -> Result<Vec<u8>>;
}

/// [`ImageCodec`] on top of the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterCodec;

impl ImageCodec for RasterCodec {
    fn open(&self, bytes: &[u8]) -> Result<DecodedImage> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| EngineError::codec(format!("failed to read image: {e}")))?;
        let format = reader
            .format()
            .and_then(ImageKind::from_format)
            .ok_or_else(|| EngineError::codec("unrecognised image format"))?;
        let pixels = reader
            .decode()
            .map_err(|e| EngineError::codec(format!("failed to decode image: {e}")))?;
        Ok(DecodedImage {
            width: pixels.width(),
            height: pixels.height(),
            pixels,
            format,
        })
    }

    fn save(&self, image: &DecodedImage, kind: ImageKind, quality: u8) -> Result<Vec<u8>> {
        let mut output = Cursor::new(Vec::new());
        let img = &image.pixels;
        let encoded = match kind {
            ImageKind::Jpeg => {
                // JPEG has no alpha channel.
                let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
                JpegEncoder::new_with_quality(&mut output, quality.clamp(1, 100)).write_image(
                    rgb.as_bytes(),
                    rgb.width(),
                    rgb.height(),
                    rgb.color().into(),
                )
            }
            ImageKind::Png => PngEncoder::new(&mut output).write_image(
                img.as_bytes(),
                img.width(),
                img.height(),
                img.color().into(),
            ),
            ImageKind::WebP => {
                let px = if img.color().has_alpha() {
                    DynamicImage::ImageRgba8(img.to_rgba8())
                } else {
                    DynamicImage::ImageRgb8(img.to_rgb8())
                };
                WebPEncoder::new_lossless(&mut output).write_image(
                    px.as_bytes(),
                    px.width(),
                    px.height(),
                    px.color().into(),
                )
            }
            ImageKind::Tiff => TiffEncoder::new(&mut output).write_image(
                img.as_bytes(),
                img.width(),
                img.height(),
                img.color().into(),
            ),
            ImageKind::Bmp => img.write_to(&mut output, ImageFormat::Bmp),
            ImageKind::Gif => {
                DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut output, ImageFormat::Gif)
            }
        };
        encoded.map_err(|e| EngineError::codec(format!("failed to encode {kind}: {e}")))?;
        Ok(output.into_inner())
    }
}
