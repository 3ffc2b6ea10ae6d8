//! Payload preparation: decode, bound the edges, re-encode as JPEG
//!
//! The remote analyzer rejects images outside a size window, so every
//! submission is normalized before upload. The longer edge is bounded by
//! `max_edge`; the shorter edge is raised towards `min_edge` without ever
//! pushing the longer edge past `max_edge`.

use crate::config::ImageSection;
use crate::scoring::content_seed;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageError, ImageReader, Limits};
use std::io::Cursor;
use thiserror::Error;
use tracing::debug;

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";
pub const UPLOAD_FILE_NAME: &str = "photo.jpg";

/// Largest source edge the decoder accepts
pub const MAX_SOURCE_EDGE: u32 = 16_384;

/// Decoder allocation ceiling
pub const MAX_DECODE_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum NormalizeError {
    #[error("Empty image payload")]
    Empty,
    #[error("Image could not be decoded: {0}")]
    Undecodable(String),
    #[error("Image too large: {0}")]
    TooLarge(String),
    #[error("Image could not be encoded: {0}")]
    Encode(String),
}

/// Upload-ready JPEG
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
}

impl NormalizedImage {
    pub fn new(bytes: Bytes, width: u32, height: u32) -> Self {
        Self {
            bytes,
            width,
            height,
        }
    }

    pub fn content_type(&self) -> &'static str {
        JPEG_CONTENT_TYPE
    }

    pub fn file_name(&self) -> &'static str {
        UPLOAD_FILE_NAME
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Base seed for reproducible specialist calls
    pub fn content_seed(&self) -> u64 {
        content_seed(&self.bytes)
    }

    /// `data:` URL for inlining into a vision prompt
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", JPEG_CONTENT_TYPE, BASE64.encode(&self.bytes))
    }
}

/// Resize/re-encode collaborator
pub trait ImageNormalizer: Send + Sync {
    fn normalize(&self, raw: &[u8]) -> Result<NormalizedImage, NormalizeError>;

    /// Whether the normalizer can currently accept work
    fn is_ready(&self) -> bool {
        true
    }
}

/// Target size for an image of `width` x `height`.
///
/// Downscale first so the longer edge is at most `max_edge`, then upscale
/// towards a shorter edge of `min_edge`. The longer edge never exceeds
/// `max_edge`: when the aspect ratio cannot satisfy both bounds the shorter
/// edge stays below `min_edge`.
pub fn target_dimensions(width: u32, height: u32, max_edge: u32, min_edge: u32) -> (u32, u32) {
    let (mut w, mut h) = (f64::from(width.max(1)), f64::from(height.max(1)));
    let max = f64::from(max_edge.max(1));

    let long = w.max(h);
    if long > max {
        let scale = max / long;
        w *= scale;
        h *= scale;
    }

    let short = w.min(h);
    if short < f64::from(min_edge) {
        let scale = (f64::from(min_edge) / short).min(max / w.max(h));
        if scale > 1.0 {
            w *= scale;
            h *= scale;
        }
    }

    let snap = |v: f64| (v.round() as u32).clamp(1, max_edge.max(1));
    (snap(w), snap(h))
}

fn decode_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_SOURCE_EDGE);
    limits.max_image_height = Some(MAX_SOURCE_EDGE);
    limits.max_alloc = Some(MAX_DECODE_BYTES);
    limits
}

fn decode(raw: &[u8]) -> Result<image::DynamicImage, NormalizeError> {
    let mut reader = ImageReader::new(Cursor::new(raw))
        .with_guessed_format()
        .map_err(|e| NormalizeError::Undecodable(e.to_string()))?;
    reader.limits(decode_limits());
    reader.decode().map_err(|e| match e {
        ImageError::Limits(limit) => NormalizeError::TooLarge(limit.to_string()),
        other => NormalizeError::Undecodable(other.to_string()),
    })
}

/// `image`-crate backed normalizer using Lanczos resampling
#[derive(Debug, Clone)]
pub struct JpegNormalizer {
    max_edge: u32,
    min_edge: u32,
    quality: u8,
}

impl JpegNormalizer {
    pub fn new(max_edge: u32, min_edge: u32, quality: u8) -> Self {
        Self {
            max_edge,
            min_edge,
            quality: quality.clamp(1, 100),
        }
    }

    pub fn from_config(section: &ImageSection) -> Self {
        Self::new(section.max_edge, section.min_edge, section.quality)
    }
}

impl ImageNormalizer for JpegNormalizer {
    fn normalize(&self, raw: &[u8]) -> Result<NormalizedImage, NormalizeError> {
        if raw.is_empty() {
            return Err(NormalizeError::Empty);
        }

        let rgb = decode(raw)?.to_rgb8();
        let (src_w, src_h) = rgb.dimensions();
        let (dst_w, dst_h) = target_dimensions(src_w, src_h, self.max_edge, self.min_edge);

        let budget = u64::from(self.max_edge) * u64::from(self.max_edge);
        if u64::from(dst_w) * u64::from(dst_h) > budget {
            return Err(NormalizeError::TooLarge(format!(
                "{dst_w}x{dst_h} exceeds the {budget} pixel budget"
            )));
        }

        let resized = if (dst_w, dst_h) == (src_w, src_h) {
            rgb
        } else {
            imageops::resize(&rgb, dst_w, dst_h, FilterType::Lanczos3)
        };

        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, self.quality)
            .encode_image(&resized)
            .map_err(|e| NormalizeError::Encode(e.to_string()))?;

        debug!(
            src_w,
            src_h,
            dst_w,
            dst_h,
            bytes = encoded.len(),
            "Image normalized"
        );
        Ok(NormalizedImage::new(Bytes::from(encoded), dst_w, dst_h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 150, 120]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_target_dimensions_within_window_unchanged() {
        assert_eq!(target_dimensions(1280, 960, 1920, 480), (1280, 960));
    }

    #[test]
    fn test_target_dimensions_downscale_longer_edge() {
        assert_eq!(target_dimensions(4000, 3000, 1920, 480), (1920, 1440));
        assert_eq!(target_dimensions(3000, 4000, 1920, 480), (1440, 1920));
    }

    #[test]
    fn test_target_dimensions_upscale_shorter_edge() {
        assert_eq!(target_dimensions(320, 240, 1920, 480), (640, 480));
    }

    #[test]
    fn test_target_dimensions_never_exceed_max_edge() {
        assert_eq!(target_dimensions(4000, 500, 1920, 480), (1920, 240));
        assert_eq!(target_dimensions(20000, 2, 1920, 480), (1920, 1));
        assert_eq!(target_dimensions(2, 20000, 1920, 480), (1, 1920));
        // Upscaled only as far as the longer edge allows
        assert_eq!(target_dimensions(1000, 100, 1920, 480), (1920, 192));
    }

    #[test]
    fn test_normalize_thin_strip_stays_within_bounds() {
        let normalizer = JpegNormalizer::new(1920, 480, 90);
        let normalized = normalizer.normalize(&png_bytes(12000, 2)).unwrap();
        assert!(normalized.width <= 1920);
        assert!(normalized.height <= 1920);
    }

    #[test]
    fn test_oversized_source_is_rejected_before_decoding() {
        let normalizer = JpegNormalizer::new(1920, 480, 90);
        assert!(matches!(
            normalizer.normalize(&png_bytes(MAX_SOURCE_EDGE + 1, 1)),
            Err(NormalizeError::TooLarge(_))
        ));
    }

    #[test]
    fn test_normalize_png_to_jpeg() {
        let normalizer = JpegNormalizer::new(1920, 480, 90);
        let normalized = normalizer.normalize(&png_bytes(320, 240)).unwrap();

        assert_eq!((normalized.width, normalized.height), (640, 480));
        assert_eq!(&normalized.bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(normalized.content_type(), "image/jpeg");
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let normalizer = JpegNormalizer::new(1920, 480, 90);
        let raw = png_bytes(600, 500);
        let first = normalizer.normalize(&raw).unwrap();
        let second = normalizer.normalize(&raw).unwrap();
        assert_eq!(first.bytes, second.bytes);
        assert_eq!(first.content_seed(), second.content_seed());
    }

    #[test]
    fn test_undecodable_input() {
        let normalizer = JpegNormalizer::new(1920, 480, 90);
        assert!(matches!(
            normalizer.normalize(b"definitely not an image"),
            Err(NormalizeError::Undecodable(_))
        ));
        assert_eq!(normalizer.normalize(b""), Err(NormalizeError::Empty));
    }

    #[test]
    fn test_data_url_prefix() {
        let image = NormalizedImage::new(Bytes::from_static(&[0xFF, 0xD8, 0xFF]), 1, 1);
        assert_eq!(image.data_url(), "data:image/jpeg;base64,/9j/");
    }
}
