//! Beat, bar and phrase counters.

use serde::{Deserialize, Serialize};

use crate::tempo::{CyclePolicy, TempoConfig};

/// Musical position of the clock.
///
/// Only the clock task mutates this. Everyone else sees `Copy` snapshots
/// carried on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatState {
    /// 1-based beat within the bar. Zero until the first tick.
    pub beat_in_bar: u32,
    /// 1-based bar within the phrase.
    pub bar_in_phrase: u32,
    /// Ticks since the clock started. Never rewound.
    pub total_beats: u64,
    /// Phrase rollovers since the clock started.
    pub total_phrases: u64,
    pub phrases_since_animation_change: u32,
    /// Index into [`CyclePolicy::animations`].
    pub animation_index: usize,
    /// Index into [`CyclePolicy::colors`]; `None` before the first tick.
    pub color_index: Option<usize>,
}

impl Default for BeatState {
    fn default() -> Self {
        Self {
            beat_in_bar: 0,
            bar_in_phrase: 1,
            total_beats: 0,
            total_phrases: 0,
            phrases_since_animation_change: 0,
            animation_index: 0,
            color_index: None,
        }
    }
}

impl BeatState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewind the bar position and color so the next tick is a downbeat
    /// again.
    ///
    /// The beat/phrase totals and the animation choice keep running; only
    /// the position inside the bar and phrase is realigned.
    pub fn realign(&mut self) {
        self.beat_in_bar = 0;
        self.bar_in_phrase = 1;
        self.color_index = None;
    }

    /// Count one beat.
    ///
    /// Bar and phrase rollover (and with it the animation change) resolves
    /// before the color and beat total move, so the downbeat that opens a new
    /// phrase already carries the new animation.
    pub fn advance(&mut self, tempo: &TempoConfig, policy: &CyclePolicy) {
        self.beat_in_bar += 1;
        if self.beat_in_bar > tempo.beats_per_bar {
            self.beat_in_bar = 1;
            self.bar_in_phrase += 1;
            if self.bar_in_phrase > tempo.bars_per_phrase {
                self.bar_in_phrase = 1;
                self.total_phrases += 1;
                self.roll_animation(policy);
            }
        }

        let colors = policy.colors.len().max(1);
        self.color_index = Some(match self.color_index {
            Some(i) => (i + 1) % colors,
            None => 0,
        });
        self.total_beats += 1;
    }

    fn roll_animation(&mut self, policy: &CyclePolicy) {
        if policy.phrases_per_animation == 0 {
            return;
        }
        self.phrases_since_animation_change += 1;
        if self.phrases_since_animation_change >= policy.phrases_per_animation {
            self.phrases_since_animation_change = 0;
            self.animation_index = (self.animation_index + 1) % policy.animations.len().max(1);
        }
    }

    /// True on the first beat of a bar.
    pub fn is_downbeat(&self) -> bool {
        self.beat_in_bar == 1
    }

    /// True on the first beat of a phrase.
    pub fn is_phrase_start(&self) -> bool {
        self.beat_in_bar == 1 && self.bar_in_phrase == 1
    }
}
