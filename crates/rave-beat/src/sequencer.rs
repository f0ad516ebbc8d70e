//! Turns a beat position into the command for that beat.

use std::sync::Arc;

use crate::catalog::AnimationCatalog;
use crate::command::AnimationCommand;
use crate::error::{Error, Result};
use crate::state::BeatState;
use crate::tempo::{CyclePolicy, TempoConfig};

/// Share of a beat each effect is told to occupy.
pub const DEFAULT_BEAT_PERCENTAGE: f64 = 1.5;

/// Maps clock state to animation commands. Keeps no time of its own.
pub struct AnimationSequencer {
    tempo: TempoConfig,
    policy: CyclePolicy,
    catalog: Arc<dyn AnimationCatalog>,
    beat_percentage: f64,
}

impl AnimationSequencer {
    pub fn new(tempo: TempoConfig, policy: CyclePolicy, catalog: Arc<dyn AnimationCatalog>) -> Self {
        Self {
            tempo,
            policy,
            catalog,
            beat_percentage: DEFAULT_BEAT_PERCENTAGE,
        }
    }

    pub fn with_beat_percentage(mut self, beat_percentage: f64) -> Self {
        self.beat_percentage = beat_percentage;
        self
    }

    pub fn tempo(&self) -> &TempoConfig {
        &self.tempo
    }

    pub fn policy(&self) -> &CyclePolicy {
        &self.policy
    }

    /// Build the command for `state`.
    ///
    /// Fails if no beat has been counted yet or if the catalog does not know
    /// the animation the policy selects.
    pub fn command(&self, state: &BeatState) -> Result<AnimationCommand> {
        let color_index = state.color_index.ok_or(Error::NotStarted)?;
        let color = self
            .policy
            .colors
            .get(color_index)
            .ok_or_else(|| Error::config(format!("color index {} out of range", color_index)))?;

        let animation = self.policy.animations.get(state.animation_index).ok_or_else(|| {
            Error::config(format!("animation index {} out of range", state.animation_index))
        })?;

        let template = self
            .catalog
            .template(animation)
            .ok_or_else(|| Error::CatalogLookup {
                animation: animation.clone(),
                beat: state.total_beats,
            })?;

        let rgb = color.rgb;
        Ok(AnimationCommand {
            name: format!("{}-{}", template.kind(), state.total_beats),
            params: template.params,
            r: rgb.0,
            g: rgb.1,
            b: rgb.2,
            bpm: self.tempo.rounded_bpm(),
            beat_percentage: self.beat_percentage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{StaticCatalog, DEFAULT_CHUNK_SIZE};
    use crate::command::{AnimationParams, AnimationType};
    use crate::tempo::Rgb;
    use std::collections::HashSet;

    fn sequencer(policy: CyclePolicy) -> AnimationSequencer {
        AnimationSequencer::new(
            TempoConfig::new(120.0).unwrap(),
            policy,
            Arc::new(StaticCatalog::builtin()),
        )
    }

    fn commands(seq: &AnimationSequencer, ticks: usize) -> Vec<AnimationCommand> {
        let mut state = BeatState::new();
        (0..ticks)
            .map(|_| {
                state.advance(seq.tempo(), seq.policy());
                seq.command(&state).unwrap()
            })
            .collect()
    }

    #[test]
    fn red_blue_blink_then_fuse_wave() {
        let seq = sequencer(CyclePolicy::default());
        let cmds = commands(&seq, 33);

        let tick1 = &cmds[0];
        assert_eq!(tick1.kind(), AnimationType::Blink);
        assert_eq!(tick1.rgb(), Rgb(255, 0, 0));
        assert_eq!(tick1.bpm, 120);

        let tick2 = &cmds[1];
        assert_eq!(tick2.kind(), AnimationType::Blink);
        assert_eq!(tick2.rgb(), Rgb(0, 0, 255));
        assert_eq!(tick2.bpm, 120);

        let tick33 = &cmds[32];
        assert_eq!(
            tick33.params,
            AnimationParams::FuseWave {
                chunk_size: DEFAULT_CHUNK_SIZE
            }
        );
        assert_eq!(tick33.rgb(), Rgb(255, 0, 0));
        assert_eq!(tick33.bpm, 120);
    }

    #[test]
    fn names_are_unique_per_beat() {
        let seq = sequencer(CyclePolicy::default());
        let cmds = commands(&seq, 40);
        assert_eq!(cmds[0].name, "Blink-1");
        assert_eq!(cmds[32].name, "FuseWave-33");
        let names: HashSet<_> = cmds.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names.len(), 40);
    }

    #[test]
    fn beat_percentage_is_configurable() {
        let seq = sequencer(CyclePolicy::default());
        assert_eq!(commands(&seq, 1)[0].beat_percentage, DEFAULT_BEAT_PERCENTAGE);

        let seq = sequencer(CyclePolicy::default()).with_beat_percentage(0.5);
        assert_eq!(commands(&seq, 1)[0].beat_percentage, 0.5);
    }

    #[test]
    fn missing_template_names_the_animation() {
        let mut policy = CyclePolicy::default();
        policy.animations = vec!["Strobe".to_string()];
        let seq = sequencer(policy);

        let mut state = BeatState::new();
        state.advance(seq.tempo(), seq.policy());
        match seq.command(&state) {
            Err(Error::CatalogLookup { animation, beat }) => {
                assert_eq!(animation, "Strobe");
                assert_eq!(beat, 1);
            }
            other => panic!("expected catalog lookup error, got {:?}", other),
        }
    }

    #[test]
    fn no_command_before_first_beat() {
        let seq = sequencer(CyclePolicy::default());
        assert!(matches!(seq.command(&BeatState::new()), Err(Error::NotStarted)));
    }
}
