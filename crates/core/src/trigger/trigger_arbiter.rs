use std::time::Duration;

use tokio::time::Instant;

use crate::region::{PlayMode, RegionStateStore, RegionTriggerConfig};

/// Default minimum interval between consecutive triggers of one region.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(2);

/// Outcome of arbitrating one region's motion result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerDecision {
    pub should_trigger: bool,
    /// Regions whose playback exclusivity this trigger stole (single-play
    /// only). Preempted regions get their playing flag cleared but no
    /// note-off is sent for them.
    pub silence: Vec<String>,
}

/// Per-region trigger state machine plus cross-region arbitration.
///
/// `evaluate` is the atomic read-decide-update step: callers hold the
/// engine lock across it, so two concurrent frames can never both pass
/// the cooldown check for the same region.
pub struct TriggerArbiter {
    cooldown: Duration,
}

impl TriggerArbiter {
    pub fn new() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
        }
    }

    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Decide whether a region's motion result fires a trigger and apply
    /// the bookkeeping side effects.
    ///
    /// Restart mode retriggers whenever the cooldown has elapsed. Finish
    /// mode additionally requires that the region is not still playing;
    /// the flag is cleared by `report_sound_finished` or by preemption.
    /// On trigger: `last_trigger` is set to `now`, finish mode marks the
    /// region playing, and under single-play every other playing region
    /// is silenced.
    pub fn evaluate(
        &self,
        region_id: &str,
        motion: bool,
        now: Instant,
        config: RegionTriggerConfig,
        states: &mut RegionStateStore,
        simultaneous_play: bool,
    ) -> TriggerDecision {
        let state = *states.ensure(region_id);

        let mut should_trigger = false;
        if motion {
            let cooled_down = match state.last_trigger {
                None => true,
                Some(last) => now.duration_since(last) >= self.cooldown,
            };
            if cooled_down {
                should_trigger = match config.play_mode {
                    PlayMode::Restart => true,
                    PlayMode::Finish => !state.is_playing,
                };
            }
        }

        let mut silence = Vec::new();
        if should_trigger {
            if !simultaneous_play {
                for (other_id, other_state) in states.iter_mut() {
                    if other_id != region_id && other_state.is_playing {
                        other_state.is_playing = false;
                        silence.push(other_id.clone());
                    }
                }
            }

            let state = states.ensure(region_id);
            state.last_trigger = Some(now);
            if config.play_mode == PlayMode::Finish {
                state.is_playing = true;
            }
        }

        TriggerDecision {
            should_trigger,
            silence,
        }
    }
}

impl Default for TriggerArbiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn restart_config() -> RegionTriggerConfig {
        RegionTriggerConfig {
            midi_note: Some(60),
            play_mode: PlayMode::Restart,
        }
    }

    fn finish_config() -> RegionTriggerConfig {
        RegionTriggerConfig {
            midi_note: Some(60),
            play_mode: PlayMode::Finish,
        }
    }

    #[test]
    fn test_no_motion_never_triggers() {
        let arbiter = TriggerArbiter::new();
        let mut states = RegionStateStore::default();
        let now = Instant::now();

        let decision = arbiter.evaluate("r1", false, now, restart_config(), &mut states, true);
        assert!(!decision.should_trigger);
        assert!(decision.silence.is_empty());
        // Evaluation initializes runtime state with defaults
        assert!(states.contains("r1"));
        assert!(states.get("r1").last_trigger.is_none());
    }

    #[test]
    fn test_first_motion_triggers_without_cooldown_history() {
        let arbiter = TriggerArbiter::new();
        let mut states = RegionStateStore::default();
        let now = Instant::now();

        let decision = arbiter.evaluate("r1", true, now, restart_config(), &mut states, true);
        assert!(decision.should_trigger);
        assert_eq!(states.get("r1").last_trigger, Some(now));
    }

    #[test]
    fn test_restart_cooldown_boundary() {
        let arbiter = TriggerArbiter::new();
        let mut states = RegionStateStore::default();
        let t0 = Instant::now();

        assert!(
            arbiter
                .evaluate("r1", true, t0, restart_config(), &mut states, true)
                .should_trigger
        );

        // 1.0s later: suppressed
        let t1 = t0 + Duration::from_secs(1);
        assert!(
            !arbiter
                .evaluate("r1", true, t1, restart_config(), &mut states, true)
                .should_trigger
        );
        // Suppression must not reset the cooldown clock
        assert_eq!(states.get("r1").last_trigger, Some(t0));

        // Exactly 2.0s later: triggers again (inclusive boundary)
        let t2 = t0 + DEFAULT_COOLDOWN;
        assert!(
            arbiter
                .evaluate("r1", true, t2, restart_config(), &mut states, true)
                .should_trigger
        );
        assert_eq!(states.get("r1").last_trigger, Some(t2));
    }

    #[test]
    fn test_restart_does_not_mark_playing() {
        let arbiter = TriggerArbiter::new();
        let mut states = RegionStateStore::default();

        arbiter.evaluate("r1", true, Instant::now(), restart_config(), &mut states, true);
        assert!(!states.get("r1").is_playing);
    }

    #[test]
    fn test_finish_blocks_while_playing_regardless_of_elapsed() {
        let arbiter = TriggerArbiter::new();
        let mut states = RegionStateStore::default();
        let t0 = Instant::now();

        assert!(
            arbiter
                .evaluate("r1", true, t0, finish_config(), &mut states, true)
                .should_trigger
        );
        assert!(states.get("r1").is_playing);

        // Well past the cooldown, still suppressed while playing
        let t1 = t0 + Duration::from_secs(30);
        assert!(
            !arbiter
                .evaluate("r1", true, t1, finish_config(), &mut states, true)
                .should_trigger
        );

        // Completion signal re-arms the region
        states.mark_finished("r1");
        let t2 = t0 + Duration::from_secs(31);
        assert!(
            arbiter
                .evaluate("r1", true, t2, finish_config(), &mut states, true)
                .should_trigger
        );
        assert!(states.get("r1").is_playing);
    }

    #[test]
    fn test_finish_still_respects_cooldown_after_completion() {
        let arbiter = TriggerArbiter::new();
        let mut states = RegionStateStore::default();
        let t0 = Instant::now();

        arbiter.evaluate("r1", true, t0, finish_config(), &mut states, true);
        states.mark_finished("r1");

        // Sound finished quickly, but only 1s since the trigger
        let t1 = t0 + Duration::from_secs(1);
        assert!(
            !arbiter
                .evaluate("r1", true, t1, finish_config(), &mut states, true)
                .should_trigger
        );
    }

    #[test]
    fn test_single_play_preempts_playing_regions() {
        let arbiter = TriggerArbiter::new();
        let mut states = RegionStateStore::default();
        states.ensure("b1").is_playing = true;
        states.ensure("b2").is_playing = true;
        states.ensure("idle").is_playing = false;

        let decision = arbiter.evaluate(
            "a",
            true,
            Instant::now(),
            restart_config(),
            &mut states,
            false,
        );

        assert!(decision.should_trigger);
        assert_eq!(decision.silence, vec!["b1".to_string(), "b2".to_string()]);
        assert!(!states.get("b1").is_playing);
        assert!(!states.get("b2").is_playing);
    }

    #[test]
    fn test_simultaneous_play_never_silences() {
        let arbiter = TriggerArbiter::new();
        let mut states = RegionStateStore::default();
        states.ensure("b").is_playing = true;

        let decision = arbiter.evaluate(
            "a",
            true,
            Instant::now(),
            restart_config(),
            &mut states,
            true,
        );

        assert!(decision.should_trigger);
        assert!(decision.silence.is_empty());
        assert!(states.get("b").is_playing);
    }

    #[test]
    fn test_suppressed_trigger_never_silences() {
        let arbiter = TriggerArbiter::new();
        let mut states = RegionStateStore::default();
        states.ensure("b").is_playing = true;
        let t0 = Instant::now();

        arbiter.evaluate("a", true, t0, restart_config(), &mut states, false);
        states.ensure("b").is_playing = true;

        // Within cooldown: no trigger, so no preemption either
        let decision = arbiter.evaluate(
            "a",
            true,
            t0 + Duration::from_secs(1),
            restart_config(),
            &mut states,
            false,
        );
        assert!(!decision.should_trigger);
        assert!(decision.silence.is_empty());
        assert!(states.get("b").is_playing);
    }

    #[test]
    fn test_preemption_excludes_the_triggering_region() {
        let arbiter = TriggerArbiter::new();
        let mut states = RegionStateStore::default();
        let t0 = Instant::now();

        // Region triggers in finish mode, then finishes, then triggers again
        // under single-play; its own history must not land in the silence set.
        arbiter.evaluate("a", true, t0, finish_config(), &mut states, false);
        states.mark_finished("a");

        let decision = arbiter.evaluate(
            "a",
            true,
            t0 + Duration::from_secs(3),
            finish_config(),
            &mut states,
            false,
        );
        assert!(decision.should_trigger);
        assert!(decision.silence.is_empty());
        assert!(states.get("a").is_playing);
    }

    #[test]
    fn test_custom_cooldown() {
        let arbiter = TriggerArbiter::with_cooldown(Duration::from_millis(500));
        let mut states = RegionStateStore::default();
        let t0 = Instant::now();

        arbiter.evaluate("r1", true, t0, restart_config(), &mut states, true);
        let decision = arbiter.evaluate(
            "r1",
            true,
            t0 + Duration::from_millis(600),
            restart_config(),
            &mut states,
            true,
        );
        assert!(decision.should_trigger);
    }
}
