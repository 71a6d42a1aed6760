pub mod trigger_arbiter;

// Re-export for convenience
pub use trigger_arbiter::{TriggerArbiter, TriggerDecision, DEFAULT_COOLDOWN};
