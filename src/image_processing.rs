use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub const DEFAULT_QUALITY: u8 = 85;

/// Fixed small/medium/large geometries of the responsive variant.
pub const RESPONSIVE_SIZES: [(ResponsiveSize, u32, u32); 3] = [
    (ResponsiveSize::Small, 320, 180),
    (ResponsiveSize::Medium, 640, 360),
    (ResponsiveSize::Large, 1280, 720),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponsiveSize {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
        }
    }

    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        match mime_type.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(OutputFormat::Jpeg),
            "image/png" => Some(OutputFormat::Png),
            "image/webp" => Some(OutputFormat::Webp),
            _ => None,
        }
    }
}

/// Decodes `bytes`, scales it to cover `width`x`height` and crops the overflow
/// around the centre, then re-encodes. The output is never letterboxed.
///
/// CPU bound; async callers go through `spawn_blocking`.
pub fn transform(
    bytes: &[u8],
    width: u32,
    height: u32,
    quality: u8,
    format: OutputFormat,
) -> Result<Vec<u8>, PipelineError> {
    if width == 0 || height == 0 {
        return Err(PipelineError::Transform(format!(
            "target geometry {width}x{height} is empty"
        )));
    }
    let source = image::load_from_memory(bytes)
        .map_err(|err| PipelineError::Transform(format!("decode image failed: {err}")))?;
    let covered = source.resize_to_fill(width, height, FilterType::Lanczos3);
    encode(&covered, quality, format)
}

pub fn encode(image: &DynamicImage, quality: u8, format: OutputFormat) -> Result<Vec<u8>, PipelineError> {
    let mut output = Vec::new();
    let result = match format {
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut output, quality.clamp(1, 100));
            DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)
        }
        OutputFormat::Png => image.write_to(&mut Cursor::new(&mut output), ImageFormat::Png),
        // The bundled WebP encoder is lossless only, so quality does not apply.
        OutputFormat::Webp => DynamicImage::ImageRgba8(image.to_rgba8())
            .write_to(&mut Cursor::new(&mut output), ImageFormat::WebP),
    };
    result.map_err(|err| PipelineError::Transform(format!("encode {format:?} failed: {err}")))?;
    Ok(output)
}

/// Reads only the header; `None` for anything that is not a recognisable image.
pub fn header_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

pub fn get_dimensions(bytes: &[u8]) -> Result<(u32, u32), PipelineError> {
    let image = image::load_from_memory(bytes)
        .map_err(|err| PipelineError::Transform(format!("decode image failed: {err}")))?;
    Ok(image.dimensions())
}

pub fn detect_mime_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if bytes.starts_with(b"BM") {
        return Some("image/bmp");
    }
    None
}
