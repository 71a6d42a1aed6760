pub mod region;
pub mod region_registry;

// Re-export for convenience
pub use region::{BoundsPercent, PixelRect, PlayMode, RegionState, RegionTriggerConfig};
pub use region_registry::{RegionRegistry, RegionStateStore, RegistryError};
