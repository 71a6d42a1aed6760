use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Per-region retrigger policy.
///
/// `Restart` allows a new trigger as soon as the cooldown has elapsed,
/// even if the previous sound is conceptually still playing. `Finish`
/// suppresses new triggers until playback completion has been reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayMode {
    Restart,
    Finish,
}

impl Default for PlayMode {
    fn default() -> Self {
        PlayMode::Restart
    }
}

impl PlayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayMode::Restart => "restart",
            PlayMode::Finish => "finish",
        }
    }
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "restart" => Ok(PlayMode::Restart),
            "finish" => Ok(PlayMode::Finish),
            other => Err(format!(
                "Invalid play mode '{}' (expected 'restart' or 'finish')",
                other
            )),
        }
    }
}

/// Region bounding box in percentages of frame width/height (0-100).
///
/// Percent coordinates keep region definitions independent of the camera
/// resolution. Senders are not trusted to keep x1<x2 / y1<y2 or to stay
/// inside 0-100; conversion clamps and reorders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundsPercent {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundsPercent {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Convert to pixel coordinates against an actual frame size.
    ///
    /// Percentages are clamped to 0-100, scaled, truncated to whole
    /// pixels, and reordered so the result is a well-formed rect inside
    /// the frame.
    pub fn to_pixel_rect(&self, width: u32, height: u32) -> PixelRect {
        let to_px = |pct: f64, dim: u32| -> u32 {
            let pct = pct.clamp(0.0, 100.0);
            (pct * dim as f64 / 100.0) as u32
        };

        let ax = to_px(self.x1, width);
        let bx = to_px(self.x2, width);
        let ay = to_px(self.y1, height);
        let by = to_px(self.y2, height);

        PixelRect {
            x1: ax.min(bx),
            y1: ay.min(by),
            x2: ax.max(bx),
            y2: ay.max(by),
        }
    }
}

/// A clamped, ordered rectangle in pixel coordinates (x2/y2 exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    pub fn is_empty(&self) -> bool {
        self.x1 == self.x2 || self.y1 == self.y2
    }
}

/// Trigger configuration assigned to a region.
///
/// `midi_note: None` means "detect but do not emit": motion is still
/// classified and cooldown/playing state still advance, but no MIDI
/// message leaves the engine for this region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegionTriggerConfig {
    pub midi_note: Option<u8>,
    pub play_mode: PlayMode,
}

/// Mutable per-region bookkeeping consumed by the trigger arbiter.
///
/// `last_trigger: None` means the region has never triggered, so no
/// cooldown applies to its first qualifying motion event.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionState {
    pub last_trigger: Option<Instant>,
    pub is_playing: bool,
}
