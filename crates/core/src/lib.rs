pub use config::{ConfigError, ConfigManager, ConfigSchema, Settings};
pub use detector::image_ops::{BLUR_KERNEL_SIZE, DELTA_THRESHOLD, DILATE_ITERATIONS};
pub use detector::motion_detector::{
    decode_frame, DetectionOutcome, FrameError, MotionDetector, MotionSample,
    DEFAULT_GLOBAL_AREA_THRESHOLD, DEFAULT_REGION_AREA_THRESHOLD,
};
pub use engine::{Engine, FrameReport, RegionReport};
pub use midi::midi::MidiMessage;
pub use midi::midi_sink::{
    list_output_ports, open_midi_sink, CapturingSink, MidiSink, MidirSink, NullSink,
};
pub use midi::note_scheduler::{NoteOffScheduler, DEFAULT_NOTE_OFF_DELAY};
pub use patch::patch::{Patch, RegionPatch};
pub use patch::patch_manager::PatchManager;
pub use region::region::{BoundsPercent, PixelRect, PlayMode, RegionState, RegionTriggerConfig};
pub use region::region_registry::{RegionRegistry, RegionStateStore, RegistryError};
pub use sound::sound_store::{SoundStore, SoundStoreError};
pub use trigger::trigger_arbiter::{TriggerArbiter, TriggerDecision, DEFAULT_COOLDOWN};

mod config;
mod detector;
mod engine;
mod midi;
mod patch;
mod region;
mod sound;
mod trigger;
