pub mod patch;
pub mod patch_manager;

// Re-export for convenience
pub use patch::{Patch, RegionPatch};
pub use patch_manager::PatchManager;
