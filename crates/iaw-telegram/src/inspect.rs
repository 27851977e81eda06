//! Photo limit checks and downsizing
//!
//! Telegram rejects photos over 10 MB or whose width plus height exceeds
//! 10 000 pixels. [`ImageInspector`] measures and re-encodes; the relay
//! decides what to do with an oversized photo.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{GenericImageView, ImageReader};
use std::io::Cursor;
use tracing::debug;

/// Telegram's photo constraints and the downsize search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoLimits {
    pub max_bytes: usize,
    pub max_dimension_sum: u32,
    /// Re-encoded photos must fit under this
    pub target_bytes: usize,
    pub start_quality: u8,
    pub min_quality: u8,
    pub quality_step: u8,
}

impl Default for PhotoLimits {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_dimension_sum: 10_000,
            target_bytes: 9 * 1024 * 1024,
            start_quality: 95,
            min_quality: 50,
            quality_step: 5,
        }
    }
}

impl PhotoLimits {
    /// Why `data` would be refused as a photo, if it would be
    pub fn violation(&self, data: &[u8], inspector: &dyn ImageInspector) -> Option<String> {
        if data.len() > self.max_bytes {
            return Some(format!(
                "size {} bytes exceeds {} bytes limit",
                data.len(),
                self.max_bytes
            ));
        }
        let (width, height) = inspector.measure(data)?;
        let sum = width.saturating_add(height);
        (sum > self.max_dimension_sum).then(|| {
            format!(
                "dimensions {width}x{height} (sum={sum}) exceed {} limit",
                self.max_dimension_sum
            )
        })
    }
}

/// Image decoding capability
pub trait ImageInspector: Send + Sync {
    /// Width and height, when the bytes decode
    fn measure(&self, data: &[u8]) -> Option<(u32, u32)>;

    /// A JPEG within `limits`, or `None` if none could be produced
    fn reencode(&self, data: &[u8], limits: &PhotoLimits) -> Option<Vec<u8>>;
}

/// Decoding with the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateInspector;

impl ImageInspector for ImageCrateInspector {
    fn measure(&self, data: &[u8]) -> Option<(u32, u32)> {
        ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .map_err(|e| debug!("Failed to read photo dimensions: {}", e))
            .ok()
    }

    fn reencode(&self, data: &[u8], limits: &PhotoLimits) -> Option<Vec<u8>> {
        let mut img = image::load_from_memory(data)
            .map_err(|e| debug!("Failed to decode photo for downsizing: {}", e))
            .ok()?;

        let (width, height) = img.dimensions();
        let sum = width + height;
        if sum > limits.max_dimension_sum {
            let scale = f64::from(limits.max_dimension_sum) / f64::from(sum);
            let new_width = ((f64::from(width) * scale) as u32).max(1);
            let new_height = ((f64::from(height) * scale) as u32).max(1);
            img = img.resize_exact(new_width, new_height, FilterType::Lanczos3);
        }

        let rgb = img.to_rgb8();
        let mut quality = limits.start_quality;
        loop {
            let mut out = Vec::new();
            let encoded = JpegEncoder::new_with_quality(&mut out, quality).encode_image(&rgb);
            match encoded {
                Ok(()) if out.len() <= limits.target_bytes => {
                    debug!(quality, bytes = out.len(), "Downsized photo");
                    return Some(out);
                }
                Ok(()) => {}
                Err(e) => {
                    debug!("JPEG encode failed: {}", e);
                    return None;
                }
            }
            if quality < limits.min_quality + limits.quality_step {
                return None;
            }
            quality -= limits.quality_step;
        }
    }
}

/// Used when image decoding is unavailable: checks degrade to byte size
/// and downsizing always fails
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeOnlyInspector;

impl ImageInspector for SizeOnlyInspector {
    fn measure(&self, _data: &[u8]) -> Option<(u32, u32)> {
        None
    }

    fn reencode(&self, _data: &[u8], _limits: &PhotoLimits) -> Option<Vec<u8>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn small_limits() -> PhotoLimits {
        PhotoLimits {
            max_bytes: 1024 * 1024,
            max_dimension_sum: 100,
            target_bytes: 1024 * 1024,
            ..PhotoLimits::default()
        }
    }

    #[test]
    fn test_measure_png() {
        assert_eq!(ImageCrateInspector.measure(&png(40, 30)), Some((40, 30)));
        assert_eq!(ImageCrateInspector.measure(b"not an image"), None);
    }

    #[test]
    fn test_violation_by_size_and_dimensions() {
        let limits = small_limits();
        assert_eq!(limits.violation(&png(40, 30), &ImageCrateInspector), None);

        let reason = limits.violation(&png(80, 40), &ImageCrateInspector).unwrap();
        assert_eq!(reason, "dimensions 80x40 (sum=120) exceed 100 limit");

        let tiny = PhotoLimits {
            max_bytes: 10,
            ..limits
        };
        let reason = tiny.violation(&png(4, 4), &SizeOnlyInspector).unwrap();
        assert!(reason.starts_with("size "));
    }

    #[test]
    fn test_size_only_inspector_ignores_dimensions() {
        let limits = small_limits();
        assert_eq!(limits.violation(&png(80, 40), &SizeOnlyInspector), None);
        assert_eq!(SizeOnlyInspector.reencode(&png(80, 40), &limits), None);
    }

    #[test]
    fn test_reencode_scales_to_dimension_sum() {
        let limits = small_limits();
        let jpeg = ImageCrateInspector.reencode(&png(160, 40), &limits).unwrap();

        let (width, height) = ImageCrateInspector.measure(&jpeg).unwrap();
        assert!(width + height <= limits.max_dimension_sum);
        assert_eq!((width, height), (80, 20));
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_reencode_gives_up_below_min_quality() {
        let limits = PhotoLimits {
            target_bytes: 10,
            ..small_limits()
        };
        assert_eq!(ImageCrateInspector.reencode(&png(40, 30), &limits), None);
    }
}
