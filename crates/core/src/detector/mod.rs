pub mod image_ops;
pub mod motion_detector;

// Re-export for convenience
pub use motion_detector::{
    decode_frame, DetectionOutcome, FrameError, MotionDetector, MotionSample,
    DEFAULT_GLOBAL_AREA_THRESHOLD, DEFAULT_REGION_AREA_THRESHOLD,
};
