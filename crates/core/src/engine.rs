use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use image::RgbImage;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::Settings;
use crate::detector::{decode_frame, FrameError, MotionDetector, MotionSample};
use crate::midi::{open_midi_sink, MidiSink, NoteOffScheduler};
use crate::patch::Patch;
use crate::region::{BoundsPercent, PlayMode, RegionRegistry, RegionTriggerConfig, RegistryError};
use crate::sound::{SoundStore, SoundStoreError};
use crate::trigger::TriggerArbiter;

/// Per-region slice of a frame report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionReport {
    pub motion: bool,
    pub motion_area: u32,
    pub should_trigger: bool,
    /// Playing state as it was before this cycle's side effects.
    pub currently_playing: bool,
    /// True when this trigger ran under single-play and preempted
    /// whatever else was marked playing.
    pub stop_others: bool,
    pub midi_note: Option<u8>,
    pub play_mode: PlayMode,
    pub sound_file: Option<String>,
}

/// Everything one detection cycle produced. Serializable as-is so a web
/// collaborator can forward it to clients.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameReport {
    /// True when the frame only established the baseline.
    pub first_frame: bool,
    pub regions: BTreeMap<String, RegionReport>,
    /// Whole-frame result, present when no regions are configured.
    pub global: Option<MotionSample>,
}

impl FrameReport {
    /// Regions that fired a trigger this cycle.
    pub fn triggered(&self) -> impl Iterator<Item = (&String, &RegionReport)> {
        self.regions.iter().filter(|(_, report)| report.should_trigger)
    }
}

struct EngineInner {
    detector: MotionDetector,
    registry: RegionRegistry,
    sounds: SoundStore,
}

/// The motion-to-MIDI engine.
///
/// One coarse lock serializes detection cycles and every configuration
/// operation, so the read-decide-update sequence inside arbitration can
/// never interleave between concurrent callers. The MIDI sink lives
/// outside that lock, shared with the note-off scheduler's detached
/// tasks.
pub struct Engine {
    inner: Mutex<EngineInner>,
    sink: Arc<Mutex<Box<dyn MidiSink>>>,
    scheduler: NoteOffScheduler,
    arbiter: TriggerArbiter,
    velocity: u8,
}

impl Engine {
    /// Build an engine from settings, opening the configured MIDI
    /// output. Must be called within a tokio runtime; the note-off
    /// scheduler captures it.
    pub fn new(settings: &Settings) -> Result<Self> {
        let sink = open_midi_sink(&settings.midi_port, &settings.virtual_port_name);
        Self::with_sink(settings, sink)
    }

    /// Build an engine with a caller-supplied MIDI sink.
    pub fn with_sink(settings: &Settings, sink: Box<dyn MidiSink>) -> Result<Self> {
        let sounds = SoundStore::new(settings.sounds_dir.clone())?;
        let sink = Arc::new(Mutex::new(sink));
        let scheduler = NoteOffScheduler::new(Arc::clone(&sink), settings.note_off_delay());

        let mut registry = RegionRegistry::new();
        registry.set_simultaneous_play(settings.simultaneous_play);

        Ok(Self {
            inner: Mutex::new(EngineInner {
                detector: MotionDetector::with_thresholds(
                    settings.region_area_threshold,
                    settings.global_area_threshold,
                ),
                registry,
                sounds,
            }),
            sink,
            scheduler,
            arbiter: TriggerArbiter::with_cooldown(settings.cooldown()),
            velocity: settings.velocity,
        })
    }

    /// Run one detection/arbitration cycle at the current instant.
    pub fn process_frame(&self, frame: &RgbImage) -> FrameReport {
        self.process_frame_at(frame, Instant::now())
    }

    /// Decode an encoded image payload and run one cycle. A decode
    /// failure fails only this call; the reference frame is untouched.
    pub fn process_frame_bytes(&self, bytes: &[u8]) -> Result<FrameReport, FrameError> {
        let frame = decode_frame(bytes)?;
        Ok(self.process_frame(&frame))
    }

    /// Run one cycle with an explicit timestamp.
    pub fn process_frame_at(&self, frame: &RgbImage, now: Instant) -> FrameReport {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        let outcome = inner.detector.process(frame, inner.registry.bounds());
        if outcome.first_frame {
            return FrameReport {
                first_frame: true,
                ..FrameReport::default()
            };
        }

        let mut report = FrameReport {
            global: outcome.global,
            ..FrameReport::default()
        };

        for (region_id, sample) in &outcome.regions {
            let config = inner.registry.config(region_id);
            let currently_playing = inner.registry.state_store().get(region_id).is_playing;
            let simultaneous = inner.registry.simultaneous_play();

            let decision = self.arbiter.evaluate(
                region_id,
                sample.motion,
                now,
                config,
                inner.registry.state_store_mut(),
                simultaneous,
            );

            if decision.should_trigger {
                self.emit_trigger(region_id, config);
                if !decision.silence.is_empty() {
                    log::info!("Region '{}' preempted {:?}", region_id, decision.silence);
                }
            } else if sample.motion {
                log::debug!("Region '{}' motion suppressed", region_id);
            }

            report.regions.insert(
                region_id.clone(),
                RegionReport {
                    motion: sample.motion,
                    motion_area: sample.area,
                    should_trigger: decision.should_trigger,
                    currently_playing,
                    stop_others: decision.should_trigger && !simultaneous,
                    midi_note: config.midi_note,
                    play_mode: config.play_mode,
                    sound_file: inner.sounds.sound_file(region_id).map(String::from),
                },
            );
        }

        report
    }

    /// Send the note-on and queue its delayed note-off. A triggered
    /// region without a note assignment emits nothing but is still a
    /// valid trigger.
    fn emit_trigger(&self, region_id: &str, config: RegionTriggerConfig) {
        match config.midi_note {
            Some(note) => {
                log::info!("Region '{}' triggered note {}", region_id, note);
                if let Err(err) = self.sink.lock().note_on(note, self.velocity) {
                    log::warn!("Note-on for region '{}' failed: {}", region_id, err);
                }
                self.scheduler.schedule(note);
            }
            None => {
                log::debug!("Region '{}' triggered with no MIDI note assigned", region_id);
            }
        }
    }

    // Region management

    pub fn upsert_region(&self, region_id: &str, bounds: BoundsPercent) {
        log::debug!("Region '{}' set to {:?}", region_id, bounds);
        self.inner.lock().registry.upsert_region(region_id, bounds);
    }

    pub fn remove_region(&self, region_id: &str) -> bool {
        self.inner.lock().registry.remove_region(region_id)
    }

    pub fn clear_regions(&self) {
        self.inner.lock().registry.clear_regions();
    }

    pub fn regions(&self) -> BTreeMap<String, BoundsPercent> {
        self.inner.lock().registry.bounds_snapshot()
    }

    pub fn region_count(&self) -> usize {
        self.inner.lock().registry.region_count()
    }

    // Trigger configuration

    pub fn set_midi_note(&self, region_id: &str, note: Option<u8>) -> Result<(), RegistryError> {
        self.inner.lock().registry.set_midi_note(region_id, note)
    }

    pub fn set_play_mode(&self, region_id: &str, play_mode: PlayMode) {
        self.inner.lock().registry.set_play_mode(region_id, play_mode)
    }

    pub fn region_config(&self, region_id: &str) -> RegionTriggerConfig {
        self.inner.lock().registry.config(region_id)
    }

    pub fn midi_notes(&self) -> BTreeMap<String, u8> {
        self.inner.lock().registry.midi_notes()
    }

    pub fn play_modes(&self) -> BTreeMap<String, PlayMode> {
        self.inner.lock().registry.play_modes()
    }

    // Play policy

    pub fn set_simultaneous_play(&self, simultaneous: bool) {
        self.inner.lock().registry.set_simultaneous_play(simultaneous)
    }

    pub fn simultaneous_play(&self) -> bool {
        self.inner.lock().registry.simultaneous_play()
    }

    // Playback state

    /// Client-side playback for this region finished; finish-mode
    /// regions become triggerable again.
    pub fn report_sound_finished(&self, region_id: &str) {
        log::debug!("Sound finished for region '{}'", region_id);
        self.inner.lock().registry.report_sound_finished(region_id)
    }

    pub fn is_playing(&self, region_id: &str) -> bool {
        self.inner.lock().registry.state_store().get(region_id).is_playing
    }

    /// Drop the detector's reference frame (e.g. after the camera feed
    /// restarts).
    pub fn reset_detector(&self) {
        self.inner.lock().detector.reset()
    }

    // Sound assets

    pub fn attach_sound(
        &self,
        region_id: &str,
        original_filename: &str,
        bytes: &[u8],
    ) -> Result<String, SoundStoreError> {
        self.inner
            .lock()
            .sounds
            .attach(region_id, original_filename, bytes)
    }

    pub fn detach_sound(&self, region_id: &str) -> Result<String, SoundStoreError> {
        self.inner.lock().sounds.detach(region_id)
    }

    pub fn sound_file(&self, region_id: &str) -> Option<String> {
        self.inner
            .lock()
            .sounds
            .sound_file(region_id)
            .map(String::from)
    }

    pub fn sound_files(&self) -> BTreeMap<String, String> {
        self.inner.lock().sounds.sound_files()
    }

    // Patches

    /// Replace the current scene with a patch: regions, note and mode
    /// assignments, sound mappings, and the play policy. Configuration
    /// and sound mappings of regions the patch does not name are
    /// dropped; their stored files stay on disk for other patches.
    pub fn apply_patch(&self, patch: &Patch) {
        let mut inner = self.inner.lock();
        inner.registry.reset();
        inner.registry.set_simultaneous_play(patch.simultaneous_play);
        inner.sounds.clear_mappings();

        for region in &patch.regions {
            inner.registry.upsert_region(&region.id, region.bounds);
            if let Err(err) = inner.registry.set_midi_note(&region.id, region.midi_note) {
                log::warn!("Patch note for region '{}' rejected: {}", region.id, err);
            }
            inner.registry.set_play_mode(&region.id, region.play_mode);
            if let Some(stored_name) = &region.sound_file {
                inner.sounds.restore(&region.id, stored_name);
            }
        }

        log::info!(
            "Applied patch '{}' with {} regions",
            patch.name,
            patch.regions.len()
        );
    }

    // Introspection

    /// Note-offs scheduled but not yet delivered.
    pub fn pending_note_offs(&self) -> usize {
        self.scheduler.pending()
    }

    /// Abort pending note-offs. The engine stays usable; this only
    /// cancels in-flight timers.
    pub fn shutdown(&self) {
        self.scheduler.abort_all();
    }
}
