use anyhow::Result;
use serde_json::{from_reader, to_writer_pretty};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::engine::Engine;

use super::patch::Patch;

pub struct PatchManager {
    patches_directory: PathBuf,
    current_patch: Option<Patch>,
    current_path: Option<PathBuf>,
}

impl PatchManager {
    pub fn new() -> Result<Self> {
        // Patches live next to wherever the process was started
        let patches_dir = std::env::current_dir()?;
        Ok(Self::with_directory(patches_dir))
    }

    pub fn with_directory(patches_directory: PathBuf) -> Self {
        Self {
            patches_directory,
            current_patch: None,
            current_path: None,
        }
    }

    pub fn new_patch(&mut self, name: String) -> Patch {
        let patch = Patch::new(name);
        self.current_patch = Some(patch.clone());
        self.current_path = None;
        patch
    }

    pub fn save_patch(&mut self, engine: &Engine) -> Result<PathBuf> {
        let patch = if let Some(patch) = &mut self.current_patch {
            // Update with the latest engine state
            let refreshed = Patch::from_engine(engine, patch.name.clone());
            patch.regions = refreshed.regions;
            patch.simultaneous_play = refreshed.simultaneous_play;
            patch.modified_at = SystemTime::now();
            patch.clone()
        } else {
            Patch::from_engine(engine, "Untitled Patch".to_string())
        };

        let path = if let Some(path) = &self.current_path {
            path.clone()
        } else {
            // Derive a file path from the patch name
            let sanitized_name = patch.name.replace(" ", "_").to_lowercase();
            self.patches_directory
                .join(format!("{}.motif", sanitized_name))
        };

        let file = File::create(&path)?;
        to_writer_pretty(file, &patch)?;

        self.current_patch = Some(patch);
        self.current_path = Some(path.clone());

        Ok(path)
    }

    pub fn save_patch_as(
        &mut self,
        engine: &Engine,
        name: String,
        path: PathBuf,
    ) -> Result<PathBuf> {
        let mut patch = Patch::from_engine(engine, name);
        patch.modified_at = SystemTime::now();

        let file = File::create(&path)?;
        to_writer_pretty(file, &patch)?;

        self.current_patch = Some(patch);
        self.current_path = Some(path.clone());

        Ok(path)
    }

    pub fn load_patch(&mut self, path: &Path) -> Result<Patch> {
        let file = File::open(path)?;
        let patch: Patch = from_reader(file)?;

        self.current_patch = Some(patch.clone());
        self.current_path = Some(path.to_path_buf());

        Ok(patch)
    }

    pub fn apply_patch_to_engine(&self, engine: &Engine) -> Result<()> {
        if let Some(patch) = &self.current_patch {
            engine.apply_patch(patch);
            Ok(())
        } else {
            Err(anyhow::anyhow!("No patch is currently loaded"))
        }
    }

    pub fn list_patches(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.patches_directory)?;

        let mut patches = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();

            if path.is_file() && path.extension().map_or(false, |ext| ext == "motif") {
                patches.push(path);
            }
        }

        Ok(patches)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::config::Settings;
    use crate::midi::NullSink;
    use crate::region::BoundsPercent;
    use crate::region::PlayMode;

    fn engine(dir: &TempDir) -> Engine {
        let settings = Settings {
            sounds_dir: dir.path().join("sounds"),
            ..Settings::default()
        };
        Engine::with_sink(&settings, Box::new(NullSink)).unwrap()
    }

    #[tokio::test]
    async fn test_save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let source = engine(&dir);
        source.upsert_region("r1", BoundsPercent::new(10.0, 10.0, 50.0, 50.0));
        source.set_midi_note("r1", Some(60)).unwrap();
        source.set_play_mode("r1", PlayMode::Finish);
        source.upsert_region("r2", BoundsPercent::new(60.0, 60.0, 90.0, 90.0));
        source.set_simultaneous_play(false);
        source.attach_sound("r1", "clap.wav", b"RIFFdata").unwrap();

        let mut manager = PatchManager::with_directory(dir.path().to_path_buf());
        manager.new_patch("Live Set".to_string());
        let path = manager.save_patch(&source).unwrap();
        assert_eq!(path.file_name().unwrap(), "live_set.motif");

        // Fresh engine sharing the sounds directory
        let target = engine(&dir);
        let mut loader = PatchManager::with_directory(dir.path().to_path_buf());
        let patch = loader.load_patch(&path).unwrap();
        assert_eq!(patch.name, "Live Set");
        assert_eq!(patch.regions.len(), 2);

        loader.apply_patch_to_engine(&target).unwrap();
        assert_eq!(target.region_count(), 2);
        assert_eq!(target.region_config("r1").midi_note, Some(60));
        assert_eq!(target.region_config("r1").play_mode, PlayMode::Finish);
        assert_eq!(target.region_config("r2").midi_note, None);
        assert!(!target.simultaneous_play());
        assert_eq!(target.sound_file("r1"), Some("roi_r1_clap.wav".to_string()));
    }

    #[tokio::test]
    async fn test_apply_without_load_is_rejected() {
        let dir = TempDir::new().unwrap();
        let manager = PatchManager::with_directory(dir.path().to_path_buf());
        assert!(manager.apply_patch_to_engine(&engine(&dir)).is_err());
    }

    #[tokio::test]
    async fn test_list_patches_filters_by_extension() {
        let dir = TempDir::new().unwrap();
        let source = engine(&dir);
        source.upsert_region("r1", BoundsPercent::new(0.0, 0.0, 100.0, 100.0));

        let mut manager = PatchManager::with_directory(dir.path().to_path_buf());
        manager
            .save_patch_as(&source, "A".to_string(), dir.path().join("a.motif"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let patches = manager.list_patches().unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].file_name().unwrap(), "a.motif");
    }

    #[test]
    fn test_patch_json_defaults_for_absent_fields() {
        let json = r#"{
            "name": "minimal",
            "created_at": {"secs_since_epoch": 0, "nanos_since_epoch": 0},
            "modified_at": {"secs_since_epoch": 0, "nanos_since_epoch": 0},
            "simultaneous_play": true,
            "regions": [{"id": "r1", "bounds": {"x1": 0.0, "y1": 0.0, "x2": 50.0, "y2": 50.0}}],
            "version": "0.1.0"
        }"#;

        let patch: Patch = serde_json::from_str(json).unwrap();
        assert_eq!(patch.regions[0].midi_note, None);
        assert_eq!(patch.regions[0].play_mode, PlayMode::Restart);
        assert_eq!(patch.regions[0].sound_file, None);
    }
}
