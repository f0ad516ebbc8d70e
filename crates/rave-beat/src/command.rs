//! Animation commands as they go out to fixtures.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tempo::Rgb;

/// Effects the fixtures know how to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnimationType {
    /// Whole strip flashes once per beat.
    Blink,
    /// Strip fills chunk by chunk across the beat.
    FuseWave,
}

impl AnimationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnimationType::Blink => "Blink",
            AnimationType::FuseWave => "FuseWave",
        }
    }
}

impl fmt::Display for AnimationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnimationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Blink" => Ok(AnimationType::Blink),
            "FuseWave" => Ok(AnimationType::FuseWave),
            other => Err(Error::config(format!("unknown animation type '{}'", other))),
        }
    }
}

/// Per-type parameters. Serializes as the `Animation` tag plus whatever
/// extra fields the type carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Animation")]
pub enum AnimationParams {
    Blink,
    FuseWave {
        /// LEDs lit per frame.
        #[serde(rename = "chunkSize")]
        chunk_size: u32,
    },
}

impl AnimationParams {
    pub fn kind(&self) -> AnimationType {
        match self {
            AnimationParams::Blink => AnimationType::Blink,
            AnimationParams::FuseWave { .. } => AnimationType::FuseWave,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            AnimationParams::FuseWave { chunk_size: 0 } => {
                Err(Error::config("FuseWave chunkSize must be at least 1"))
            }
            _ => Ok(()),
        }
    }
}

/// One fully built animation event.
///
/// Only [`AnimationSequencer`](crate::AnimationSequencer) builds these from
/// clock state, so every field is set by the time anyone else sees one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationCommand {
    pub name: String,
    #[serde(flatten)]
    pub params: AnimationParams,
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(rename = "BPM")]
    pub bpm: u32,
    /// Fraction of a beat the effect lasts. Values above 1 bleed into the
    /// next beat.
    #[serde(rename = "beatPercentage")]
    pub beat_percentage: f64,
}

impl AnimationCommand {
    pub fn kind(&self) -> AnimationType {
        self.params.kind()
    }

    pub fn rgb(&self) -> Rgb {
        Rgb(self.r, self.g, self.b)
    }
}
