pub mod sound_store;

// Re-export for convenience
pub use sound_store::{SoundStore, SoundStoreError};
