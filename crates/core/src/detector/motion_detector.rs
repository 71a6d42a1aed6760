use std::collections::BTreeMap;

use image::{GrayImage, RgbImage};
use serde::Serialize;
use thiserror::Error;

use super::image_ops;
use crate::region::BoundsPercent;

/// Default pixel-area threshold for classifying a region as "in motion".
pub const DEFAULT_REGION_AREA_THRESHOLD: u32 = 500;

/// Area threshold for the whole-frame fallback used when no regions exist.
pub const DEFAULT_GLOBAL_AREA_THRESHOLD: u32 = 2000;

/// Errors turning raw bytes into a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Failed to decode frame: {0}")]
    Decode(#[from] image::ImageError),
}

/// Decode an encoded image payload (PNG, JPEG, ...) into an RGB frame.
///
/// Decoding happens before any detector state is touched, so a malformed
/// payload fails this one call and leaves the reference frame intact.
pub fn decode_frame(bytes: &[u8]) -> Result<RgbImage, FrameError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Motion measurement for one region (or for the whole frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MotionSample {
    pub motion: bool,
    pub area: u32,
}

/// Result of one detection cycle.
#[derive(Debug, Clone, Default)]
pub struct DetectionOutcome {
    /// True when this frame only established the baseline; nothing was
    /// assessed and both result fields are empty.
    pub first_frame: bool,
    pub regions: BTreeMap<String, MotionSample>,
    /// Whole-frame sample, present only when no regions are configured.
    pub global: Option<MotionSample>,
}

/// Frame-differencing motion detector.
///
/// Holds the previous blurred grayscale frame between calls. Each call
/// grayscales and blurs the incoming frame, thresholds the delta against
/// the reference into a binary mask, dilates it, then counts mask pixels
/// per configured region.
pub struct MotionDetector {
    previous: Option<GrayImage>,
    region_area_threshold: u32,
    global_area_threshold: u32,
}

impl MotionDetector {
    pub fn new() -> Self {
        Self::with_thresholds(DEFAULT_REGION_AREA_THRESHOLD, DEFAULT_GLOBAL_AREA_THRESHOLD)
    }

    pub fn with_thresholds(region_area_threshold: u32, global_area_threshold: u32) -> Self {
        Self {
            previous: None,
            region_area_threshold,
            global_area_threshold,
        }
    }

    /// Drop the reference frame; the next call re-establishes the baseline.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn has_reference(&self) -> bool {
        self.previous.is_some()
    }

    /// Run one detection cycle against the held reference frame.
    pub fn process(
        &mut self,
        frame: &RgbImage,
        regions: &BTreeMap<String, BoundsPercent>,
    ) -> DetectionOutcome {
        let gray = image::imageops::grayscale(frame);
        let blurred = image_ops::gaussian_blur(&gray, image_ops::BLUR_KERNEL_SIZE);

        let previous = match self.previous.take() {
            Some(prev) if prev.dimensions() == blurred.dimensions() => prev,
            Some(prev) => {
                log::warn!(
                    "Frame size changed from {:?} to {:?}, re-establishing baseline",
                    prev.dimensions(),
                    blurred.dimensions()
                );
                self.previous = Some(blurred);
                return DetectionOutcome {
                    first_frame: true,
                    ..DetectionOutcome::default()
                };
            }
            None => {
                log::debug!("First frame received, establishing baseline");
                self.previous = Some(blurred);
                return DetectionOutcome {
                    first_frame: true,
                    ..DetectionOutcome::default()
                };
            }
        };

        let mask = image_ops::diff_mask(&previous, &blurred, image_ops::DELTA_THRESHOLD);
        let mask = image_ops::dilate(&mask, image_ops::DILATE_ITERATIONS);
        let (width, height) = mask.dimensions();

        let mut outcome = DetectionOutcome::default();
        if regions.is_empty() {
            let area = image_ops::count_nonzero(&mask);
            outcome.global = Some(MotionSample {
                motion: area > self.global_area_threshold,
                area,
            });
        } else {
            for (region_id, bounds) in regions {
                let rect = bounds.to_pixel_rect(width, height);
                let area = image_ops::count_nonzero_rect(&mask, rect);
                let sample = MotionSample {
                    motion: area > self.region_area_threshold,
                    area,
                };
                log::debug!(
                    "Region '{}': area={} motion={}",
                    region_id,
                    sample.area,
                    sample.motion
                );
                outcome.regions.insert(region_id.clone(), sample);
            }
        }

        self.previous = Some(blurred);
        outcome
    }
}

impl Default for MotionDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, Rgb};

    use super::*;
    use crate::region::BoundsPercent;

    fn black_frame(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([0, 0, 0]))
    }

    fn frame_with_square(width: u32, height: u32, x0: u32, y0: u32, size: u32) -> RgbImage {
        let mut frame = black_frame(width, height);
        for y in y0..(y0 + size).min(height) {
            for x in x0..(x0 + size).min(width) {
                frame.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        frame
    }

    fn one_region(id: &str, bounds: BoundsPercent) -> BTreeMap<String, BoundsPercent> {
        let mut regions = BTreeMap::new();
        regions.insert(id.to_string(), bounds);
        regions
    }

    #[test]
    fn test_first_frame_returns_empty_results() {
        let mut detector = MotionDetector::new();
        let regions = one_region("r1", BoundsPercent::new(0.0, 0.0, 100.0, 100.0));

        let outcome = detector.process(&black_frame(64, 64), &regions);
        assert!(outcome.first_frame);
        assert!(outcome.regions.is_empty());
        assert!(outcome.global.is_none());
        assert!(detector.has_reference());
    }

    #[test]
    fn test_identical_frames_produce_no_motion() {
        let mut detector = MotionDetector::new();
        let regions = one_region("r1", BoundsPercent::new(0.0, 0.0, 100.0, 100.0));

        detector.process(&black_frame(64, 64), &regions);
        let outcome = detector.process(&black_frame(64, 64), &regions);

        let sample = outcome.regions.get("r1").unwrap();
        assert_eq!(sample.area, 0);
        assert!(!sample.motion);
    }

    #[test]
    fn test_motion_classified_per_region() {
        let mut detector = MotionDetector::new();
        let mut regions = one_region("active", BoundsPercent::new(0.0, 0.0, 50.0, 50.0));
        regions.insert(
            "quiet".to_string(),
            BoundsPercent::new(75.0, 75.0, 100.0, 100.0),
        );

        detector.process(&black_frame(128, 128), &regions);
        // 40x40 white square well inside the "active" box
        let outcome = detector.process(&frame_with_square(128, 128, 10, 10, 40), &regions);

        let active = outcome.regions.get("active").unwrap();
        assert!(active.motion);
        assert!(active.area > 500);

        let quiet = outcome.regions.get("quiet").unwrap();
        assert!(!quiet.motion);
        assert_eq!(quiet.area, 0);
    }

    #[test]
    fn test_area_threshold_is_strict() {
        // With a zero threshold, zero area must still classify as no motion
        let mut detector = MotionDetector::with_thresholds(0, 0);
        let regions = one_region("r1", BoundsPercent::new(0.0, 0.0, 100.0, 100.0));

        detector.process(&black_frame(64, 64), &regions);
        let outcome = detector.process(&black_frame(64, 64), &regions);
        assert!(!outcome.regions.get("r1").unwrap().motion);
    }

    #[test]
    fn test_global_fallback_without_regions() {
        let mut detector = MotionDetector::new();
        let regions = BTreeMap::new();

        detector.process(&black_frame(128, 128), &regions);
        let outcome = detector.process(&frame_with_square(128, 128, 30, 30, 50), &regions);

        let global = outcome.global.expect("global sample expected");
        assert!(global.motion);
        assert!(global.area > 2000);
        assert!(outcome.regions.is_empty());

        let still = detector.process(&frame_with_square(128, 128, 30, 30, 50), &regions);
        let global = still.global.expect("global sample expected");
        assert_eq!(global.area, 0);
        assert!(!global.motion);
    }

    #[test]
    fn test_frame_size_change_rebaselines() {
        let mut detector = MotionDetector::new();
        let regions = one_region("r1", BoundsPercent::new(0.0, 0.0, 100.0, 100.0));

        detector.process(&black_frame(128, 128), &regions);
        let outcome = detector.process(&black_frame(64, 64), &regions);
        assert!(outcome.first_frame);
        assert!(outcome.regions.is_empty());
    }

    #[test]
    fn test_degenerate_region_counts_zero() {
        let mut detector = MotionDetector::new();
        let regions = one_region("line", BoundsPercent::new(40.0, 0.0, 40.0, 100.0));

        detector.process(&black_frame(64, 64), &regions);
        let outcome = detector.process(&frame_with_square(64, 64, 10, 10, 30), &regions);

        let sample = outcome.regions.get("line").unwrap();
        assert_eq!(sample.area, 0);
        assert!(!sample.motion);
    }

    #[test]
    fn test_reset_drops_reference() {
        let mut detector = MotionDetector::new();
        let regions = BTreeMap::new();

        detector.process(&black_frame(64, 64), &regions);
        detector.reset();
        assert!(!detector.has_reference());

        let outcome = detector.process(&black_frame(64, 64), &regions);
        assert!(outcome.first_frame);
    }

    #[test]
    fn test_decode_frame_roundtrip() {
        let frame = frame_with_square(16, 16, 4, 4, 8);
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(frame.clone())
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let decoded = decode_frame(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (16, 16));
        assert_eq!(decoded.get_pixel(8, 8), frame.get_pixel(8, 8));
    }

    #[test]
    fn test_decode_frame_rejects_garbage() {
        assert!(decode_frame(b"not an image").is_err());
    }
}
