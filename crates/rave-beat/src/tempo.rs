//! Tempo and cycle configuration.
//!
//! [`TempoConfig`] fixes how long a beat lasts and how beats group into bars
//! and phrases. [`CyclePolicy`] decides which animation and color each beat
//! uses. Both are validated before a clock may start and are immutable while
//! it runs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tempo of the show.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoConfig {
    pub bpm: f64,
    #[serde(default = "default_beats_per_bar")]
    pub beats_per_bar: u32,
    #[serde(default = "default_bars_per_phrase")]
    pub bars_per_phrase: u32,
}

fn default_beats_per_bar() -> u32 {
    4
}

fn default_bars_per_phrase() -> u32 {
    8
}

impl TempoConfig {
    /// Tempo in 4/4 with eight-bar phrases.
    pub fn new(bpm: f64) -> Result<Self> {
        Self::with_grouping(bpm, default_beats_per_bar(), default_bars_per_phrase())
    }

    /// Tempo with explicit bar and phrase lengths.
    pub fn with_grouping(bpm: f64, beats_per_bar: u32, bars_per_phrase: u32) -> Result<Self> {
        let tempo = Self {
            bpm,
            beats_per_bar,
            bars_per_phrase,
        };
        tempo.validate()?;
        Ok(tempo)
    }

    /// Check the invariants. Needed for values that came in through serde.
    pub fn validate(&self) -> Result<()> {
        if !self.bpm.is_finite() || self.bpm <= 0.0 {
            return Err(Error::config(format!("bpm must be positive, got {}", self.bpm)));
        }
        if self.beats_per_bar == 0 {
            return Err(Error::config("beats_per_bar must be at least 1"));
        }
        if self.bars_per_phrase == 0 {
            return Err(Error::config("bars_per_phrase must be at least 1"));
        }
        Ok(())
    }

    /// Length of one beat, `60 / bpm` seconds.
    pub fn beat_duration(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.bpm)
    }

    /// Tempo as carried on the wire.
    pub fn rounded_bpm(&self) -> u32 {
        self.bpm.round() as u32
    }

    /// Beats in one full phrase.
    pub fn beats_per_phrase(&self) -> u64 {
        self.beats_per_bar as u64 * self.bars_per_phrase as u64
    }
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            beats_per_bar: default_beats_per_bar(),
            bars_per_phrase: default_bars_per_phrase(),
        }
    }
}

/// An 8-bit RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// A color the policy may pick, with the name shown in logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorChoice {
    pub name: String,
    pub rgb: Rgb,
}

impl ColorChoice {
    pub fn new(name: impl Into<String>, rgb: Rgb) -> Self {
        Self {
            name: name.into(),
            rgb,
        }
    }

    /// Look a color up in the built-in palette.
    pub fn named(name: &str) -> Result<Self> {
        palette_rgb(name)
            .map(|rgb| Self::new(name, rgb))
            .ok_or_else(|| Error::config(format!("unknown color '{}'", name)))
    }
}

/// Colors the controller knows by name.
pub const PALETTE: &[(&str, Rgb)] = &[
    ("white", Rgb(255, 255, 255)),
    ("red", Rgb(255, 0, 0)),
    ("green", Rgb(0, 255, 0)),
    ("blue", Rgb(0, 0, 255)),
    ("cyan", Rgb(0, 255, 255)),
    ("magenta", Rgb(255, 0, 255)),
    ("purple", Rgb(128, 0, 128)),
    ("orange", Rgb(255, 165, 0)),
    ("light_blue", Rgb(173, 216, 230)),
    ("light_green", Rgb(144, 238, 144)),
];

/// RGB value of a palette color.
pub fn palette_rgb(name: &str) -> Option<Rgb> {
    PALETTE
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, rgb)| *rgb)
}

/// Which animations and colors the clock cycles through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CyclePolicy {
    /// Catalog names, in play order.
    pub animations: Vec<String>,
    /// Colors, alternated every beat.
    pub colors: Vec<ColorChoice>,
    /// Phrases to hold each animation. Zero holds the first one forever.
    #[serde(default = "default_phrases_per_animation")]
    pub phrases_per_animation: u32,
}

fn default_phrases_per_animation() -> u32 {
    1
}

impl CyclePolicy {
    pub fn new(animations: Vec<String>, colors: Vec<ColorChoice>, phrases_per_animation: u32) -> Self {
        Self {
            animations,
            colors,
            phrases_per_animation,
        }
    }

    /// Fails when either list is empty.
    pub fn validate(&self) -> Result<()> {
        if self.animations.is_empty() {
            return Err(Error::config("cycle policy has no animations"));
        }
        if self.colors.is_empty() {
            return Err(Error::config("cycle policy has no colors"));
        }
        Ok(())
    }
}

impl Default for CyclePolicy {
    fn default() -> Self {
        Self {
            animations: vec!["Blink".to_string(), "FuseWave".to_string()],
            colors: vec![
                ColorChoice::new("red", Rgb(255, 0, 0)),
                ColorChoice::new("blue", Rgb(0, 0, 255)),
            ],
            phrases_per_animation: default_phrases_per_animation(),
        }
    }
}
