use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::engine::Engine;
use crate::region::{BoundsPercent, PlayMode};

/// One region entry in a patch file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RegionPatch {
    pub id: String,
    pub bounds: BoundsPercent,
    #[serde(default)]
    pub midi_note: Option<u8>,
    #[serde(default)]
    pub play_mode: PlayMode,
    #[serde(default)]
    pub sound_file: Option<String>,
}

/// A saved scene: regions with their note assignments, sound mappings,
/// and the play policy.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Patch {
    pub name: String,
    pub created_at: SystemTime,
    pub modified_at: SystemTime,
    pub simultaneous_play: bool,
    pub regions: Vec<RegionPatch>,
    pub version: String, // Schema version for future compatibility
}

impl Patch {
    pub fn new(name: String) -> Self {
        let now = SystemTime::now();
        Self {
            name,
            created_at: now,
            modified_at: now,
            simultaneous_play: true,
            regions: Vec::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Capture the engine's current scene as a named patch.
    pub fn from_engine(engine: &Engine, name: String) -> Self {
        let mut patch = Self::new(name);
        patch.simultaneous_play = engine.simultaneous_play();
        patch.regions = engine
            .regions()
            .into_iter()
            .map(|(id, bounds)| {
                let config = engine.region_config(&id);
                let sound_file = engine.sound_file(&id);
                RegionPatch {
                    id,
                    bounds,
                    midi_note: config.midi_note,
                    play_mode: config.play_mode,
                    sound_file,
                }
            })
            .collect();
        patch
    }
}
