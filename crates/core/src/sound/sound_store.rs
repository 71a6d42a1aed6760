use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors for sound-asset operations.
#[derive(Debug, Error)]
pub enum SoundStoreError {
    #[error("No sound assigned to region '{0}'")]
    NoSoundForRegion(String),

    #[error("Filename '{0}' is empty after sanitizing")]
    BadFilename(String),

    #[error("Failed to create sounds directory {0:?}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to write sound file {0:?}: {1}")]
    Write(PathBuf, std::io::Error),
}

/// Stores uploaded sound files on disk with a region-keyed mapping.
///
/// Files are named `roi_<region_id>_<original_filename>` under the sounds
/// directory, so stored names are deterministic. The mapping is updated
/// only after the bytes are on disk; on removal the mapping always goes,
/// with a file missing on disk logged rather than surfaced.
pub struct SoundStore {
    sounds_dir: PathBuf,
    mappings: BTreeMap<String, String>,
}

impl SoundStore {
    /// Open a store rooted at `sounds_dir`, creating the directory if
    /// needed.
    pub fn new(sounds_dir: PathBuf) -> Result<Self, SoundStoreError> {
        fs::create_dir_all(&sounds_dir)
            .map_err(|e| SoundStoreError::CreateDir(sounds_dir.clone(), e))?;
        Ok(Self {
            sounds_dir,
            mappings: BTreeMap::new(),
        })
    }

    /// Store `bytes` as the region's sound and return the stored
    /// filename. A previously attached sound for the region is replaced
    /// and its file removed (best effort).
    pub fn attach(
        &mut self,
        region_id: &str,
        original_filename: &str,
        bytes: &[u8],
    ) -> Result<String, SoundStoreError> {
        let filename = sanitize(original_filename);
        if filename.is_empty() {
            return Err(SoundStoreError::BadFilename(original_filename.to_string()));
        }

        let stored_name = format!("roi_{}_{}", sanitize(region_id), filename);
        let path = self.sounds_dir.join(&stored_name);
        fs::write(&path, bytes).map_err(|e| SoundStoreError::Write(path.clone(), e))?;

        if let Some(old_name) = self
            .mappings
            .insert(region_id.to_string(), stored_name.clone())
        {
            if old_name != stored_name {
                let old_path = self.sounds_dir.join(&old_name);
                if let Err(err) = fs::remove_file(&old_path) {
                    log::warn!("Failed to remove replaced sound {:?}: {}", old_path, err);
                }
            }
        }

        log::info!("Stored sound '{}' for region '{}'", stored_name, region_id);
        Ok(stored_name)
    }

    /// Remove the region's sound mapping and stored file, returning the
    /// stored filename. The mapping is removed unconditionally; a file
    /// already missing on disk is logged, not an error.
    pub fn detach(&mut self, region_id: &str) -> Result<String, SoundStoreError> {
        let stored_name = self
            .mappings
            .remove(region_id)
            .ok_or_else(|| SoundStoreError::NoSoundForRegion(region_id.to_string()))?;

        let path = self.sounds_dir.join(&stored_name);
        if let Err(err) = fs::remove_file(&path) {
            log::warn!("Failed to remove sound file {:?}: {}", path, err);
        }
        Ok(stored_name)
    }

    /// Re-register a mapping from a saved patch without rewriting any
    /// bytes. Returns false (and logs) when the stored file is no longer
    /// on disk.
    pub fn restore(&mut self, region_id: &str, stored_name: &str) -> bool {
        let path = self.sounds_dir.join(stored_name);
        if !path.is_file() {
            log::warn!(
                "Sound file '{}' for region '{}' is missing; skipping mapping",
                stored_name,
                region_id
            );
            return false;
        }
        self.mappings
            .insert(region_id.to_string(), stored_name.to_string());
        true
    }

    /// Forget every region mapping. Stored files stay on disk so saved
    /// patches can restore them later.
    pub fn clear_mappings(&mut self) {
        self.mappings.clear();
    }

    /// Stored filename for a region, if any.
    pub fn sound_file(&self, region_id: &str) -> Option<&str> {
        self.mappings.get(region_id).map(String::as_str)
    }

    /// Full path to a region's stored sound.
    pub fn sound_path(&self, region_id: &str) -> Option<PathBuf> {
        self.mappings
            .get(region_id)
            .map(|name| self.sounds_dir.join(name))
    }

    /// Snapshot of the region-to-filename mapping.
    pub fn sound_files(&self) -> BTreeMap<String, String> {
        self.mappings.clone()
    }

    pub fn sounds_dir(&self) -> &Path {
        &self.sounds_dir
    }
}

/// Reduce a client-supplied name to a safe final path component:
/// everything before the last separator is dropped, and characters
/// outside `[A-Za-z0-9._-]` become underscores.
fn sanitize(name: &str) -> String {
    let base = name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
