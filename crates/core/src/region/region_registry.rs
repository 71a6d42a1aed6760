use std::collections::BTreeMap;

use thiserror::Error;

use super::region::{BoundsPercent, PlayMode, RegionState, RegionTriggerConfig};

/// Errors for region configuration operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("MIDI note {0} is out of range (0-127)")]
    NoteOutOfRange(u8),
}

/// Runtime trigger state for all regions.
///
/// Entries are created explicitly with default state the first time a
/// region is referenced, so the default-state contract lives here rather
/// than in lookup fallbacks scattered across callers.
#[derive(Debug, Default)]
pub struct RegionStateStore {
    states: BTreeMap<String, RegionState>,
}

impl RegionStateStore {
    /// Get the state for a region, creating it with defaults if absent.
    pub fn ensure(&mut self, region_id: &str) -> &mut RegionState {
        self.states.entry(region_id.to_string()).or_default()
    }

    /// Read a region's state without creating an entry.
    pub fn get(&self, region_id: &str) -> RegionState {
        self.states.get(region_id).copied().unwrap_or_default()
    }

    pub fn contains(&self, region_id: &str) -> bool {
        self.states.contains_key(region_id)
    }

    /// Clear `is_playing` if the region has runtime state. No entry is
    /// created: a region that never triggered is already not playing.
    pub fn mark_finished(&mut self, region_id: &str) {
        if let Some(state) = self.states.get_mut(region_id) {
            state.is_playing = false;
        }
    }

    pub fn remove(&mut self, region_id: &str) {
        self.states.remove(region_id);
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut RegionState)> {
        self.states.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Single source of truth for regions, their trigger configuration, their
/// runtime state, and the global play policy.
///
/// The engine serializes access behind one lock; everything multi-field
/// (upsert, delete, arbitration) happens through this object so the
/// read-modify-write sequences stay atomic.
pub struct RegionRegistry {
    bounds: BTreeMap<String, BoundsPercent>,
    configs: BTreeMap<String, RegionTriggerConfig>,
    states: RegionStateStore,
    simultaneous_play: bool,
}

impl RegionRegistry {
    pub fn new() -> Self {
        Self {
            bounds: BTreeMap::new(),
            configs: BTreeMap::new(),
            states: RegionStateStore::default(),
            simultaneous_play: true,
        }
    }

    // Region management

    /// Add or replace a region's bounding box. Trigger config and runtime
    /// state entries are created with defaults if this is a new region.
    pub fn upsert_region(&mut self, region_id: &str, bounds: BoundsPercent) {
        self.bounds.insert(region_id.to_string(), bounds);
        self.configs.entry(region_id.to_string()).or_default();
        self.states.ensure(region_id);
    }

    /// Remove a region and purge its runtime state. Trigger config (note,
    /// play mode) survives so re-adding the region keeps its assignment.
    /// Returns false if the region was not present.
    pub fn remove_region(&mut self, region_id: &str) -> bool {
        let removed = self.bounds.remove(region_id).is_some();
        self.states.remove(region_id);
        removed
    }

    /// Remove all regions and purge all runtime state.
    pub fn clear_regions(&mut self) {
        self.bounds.clear();
        self.states.clear();
    }

    /// Drop regions, runtime state, and trigger configs alike. Unlike
    /// `remove_region`/`clear_regions`, nothing survives; patch
    /// application starts from a clean slate.
    pub fn reset(&mut self) {
        self.bounds.clear();
        self.configs.clear();
        self.states.clear();
    }

    pub fn bounds(&self) -> &BTreeMap<String, BoundsPercent> {
        &self.bounds
    }

    pub fn bounds_snapshot(&self) -> BTreeMap<String, BoundsPercent> {
        self.bounds.clone()
    }

    pub fn contains_region(&self, region_id: &str) -> bool {
        self.bounds.contains_key(region_id)
    }

    pub fn region_count(&self) -> usize {
        self.bounds.len()
    }

    // Trigger configuration

    /// Assign or clear the MIDI note for a region. The region does not
    /// have to exist yet; configuration set ahead of the box is kept.
    pub fn set_midi_note(
        &mut self,
        region_id: &str,
        midi_note: Option<u8>,
    ) -> Result<(), RegistryError> {
        if let Some(note) = midi_note {
            if note > 127 {
                return Err(RegistryError::NoteOutOfRange(note));
            }
        }

        self.configs
            .entry(region_id.to_string())
            .or_default()
            .midi_note = midi_note;
        Ok(())
    }

    pub fn set_play_mode(&mut self, region_id: &str, play_mode: PlayMode) {
        self.configs
            .entry(region_id.to_string())
            .or_default()
            .play_mode = play_mode;
    }

    /// Trigger config for a region (defaults if never configured).
    pub fn config(&self, region_id: &str) -> RegionTriggerConfig {
        self.configs.get(region_id).copied().unwrap_or_default()
    }

    /// Snapshot of assigned MIDI notes, omitting unassigned regions.
    pub fn midi_notes(&self) -> BTreeMap<String, u8> {
        self.configs
            .iter()
            .filter_map(|(id, cfg)| cfg.midi_note.map(|note| (id.clone(), note)))
            .collect()
    }

    pub fn play_modes(&self) -> BTreeMap<String, PlayMode> {
        self.configs
            .iter()
            .map(|(id, cfg)| (id.clone(), cfg.play_mode))
            .collect()
    }

    // Play policy

    pub fn set_simultaneous_play(&mut self, simultaneous: bool) {
        self.simultaneous_play = simultaneous;
    }

    pub fn simultaneous_play(&self) -> bool {
        self.simultaneous_play
    }

    // Runtime state

    pub fn state_store(&self) -> &RegionStateStore {
        &self.states
    }

    pub fn state_store_mut(&mut self) -> &mut RegionStateStore {
        &mut self.states
    }

    /// External playback-completion signal: the client finished playing
    /// this region's sound, so finish-mode regions may trigger again.
    pub fn report_sound_finished(&mut self, region_id: &str) {
        self.states.mark_finished(region_id);
    }
}

impl Default for RegionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_and_list() {
        let mut registry = RegionRegistry::new();
        registry.upsert_region("r1", BoundsPercent::new(0.0, 0.0, 50.0, 50.0));
        registry.upsert_region("r2", BoundsPercent::new(50.0, 50.0, 100.0, 100.0));

        assert_eq!(registry.region_count(), 2);
        assert!(registry.contains_region("r1"));

        // Replacing bounds must not reset runtime state
        registry.state_store_mut().ensure("r1").is_playing = true;
        registry.upsert_region("r1", BoundsPercent::new(10.0, 10.0, 60.0, 60.0));
        assert!(registry.state_store().get("r1").is_playing);
    }

    #[test]
    fn test_remove_purges_runtime_state_keeps_config() {
        let mut registry = RegionRegistry::new();
        registry.upsert_region("r1", BoundsPercent::new(0.0, 0.0, 50.0, 50.0));
        registry.set_midi_note("r1", Some(60)).unwrap();
        registry.state_store_mut().ensure("r1").is_playing = true;

        assert!(registry.remove_region("r1"));
        assert!(!registry.contains_region("r1"));
        assert!(!registry.state_store().contains("r1"));

        // Note assignment survives; re-added region starts with fresh state
        assert_eq!(registry.config("r1").midi_note, Some(60));
        registry.upsert_region("r1", BoundsPercent::new(0.0, 0.0, 50.0, 50.0));
        let state = registry.state_store().get("r1");
        assert!(!state.is_playing);
        assert!(state.last_trigger.is_none());
    }

    #[test]
    fn test_remove_unknown_region() {
        let mut registry = RegionRegistry::new();
        assert!(!registry.remove_region("nope"));
    }

    #[test]
    fn test_clear_regions() {
        let mut registry = RegionRegistry::new();
        registry.upsert_region("r1", BoundsPercent::new(0.0, 0.0, 50.0, 50.0));
        registry.upsert_region("r2", BoundsPercent::new(0.0, 0.0, 10.0, 10.0));
        registry.clear_regions();

        assert_eq!(registry.region_count(), 0);
        assert!(registry.state_store().is_empty());
    }

    #[test]
    fn test_reset_drops_configs_too() {
        let mut registry = RegionRegistry::new();
        registry.upsert_region("r1", BoundsPercent::new(0.0, 0.0, 50.0, 50.0));
        registry.set_midi_note("r1", Some(60)).unwrap();
        registry.set_play_mode("r1", PlayMode::Finish);

        registry.reset();
        assert_eq!(registry.region_count(), 0);
        assert_eq!(registry.config("r1").midi_note, None);
        assert_eq!(registry.config("r1").play_mode, PlayMode::default());
    }

    #[test]
    fn test_set_midi_note_validates_range() {
        let mut registry = RegionRegistry::new();
        assert!(registry.set_midi_note("r1", Some(127)).is_ok());
        assert!(registry.set_midi_note("r1", Some(128)).is_err());
        assert_eq!(registry.config("r1").midi_note, Some(127));

        registry.set_midi_note("r1", None).unwrap();
        assert_eq!(registry.config("r1").midi_note, None);
    }

    #[test]
    fn test_config_ahead_of_region() {
        let mut registry = RegionRegistry::new();
        registry.set_play_mode("later", PlayMode::Finish);
        assert_eq!(registry.config("later").play_mode, PlayMode::Finish);
        assert!(!registry.contains_region("later"));
    }

    #[test]
    fn test_report_sound_finished() {
        let mut registry = RegionRegistry::new();
        registry.upsert_region("r1", BoundsPercent::new(0.0, 0.0, 50.0, 50.0));
        registry.state_store_mut().ensure("r1").is_playing = true;

        registry.report_sound_finished("r1");
        assert!(!registry.state_store().get("r1").is_playing);

        // Unknown ids never grow runtime state entries
        registry.report_sound_finished("ghost");
        assert!(!registry.state_store().contains("ghost"));
    }

    #[test]
    fn test_midi_note_snapshot_omits_unassigned() {
        let mut registry = RegionRegistry::new();
        registry.upsert_region("r1", BoundsPercent::new(0.0, 0.0, 50.0, 50.0));
        registry.upsert_region("r2", BoundsPercent::new(0.0, 0.0, 50.0, 50.0));
        registry.set_midi_note("r2", Some(64)).unwrap();

        let notes = registry.midi_notes();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes.get("r2"), Some(&64));
    }

    #[test]
    fn test_simultaneous_play_default() {
        let registry = RegionRegistry::new();
        assert!(registry.simultaneous_play());
    }
}
