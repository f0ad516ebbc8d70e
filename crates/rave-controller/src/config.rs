//! Controller configuration.
//!
//! Settings come from the command line (each flag also reads an environment
//! variable) plus an optional JSON show file describing the tempo, the
//! animation cycle and any extra animation presets.

use std::fs;
use std::path::Path;
use std::time::Duration;

use rave_beat::{
    AnimationCatalog, ColorChoice, CyclePolicy, StaticCatalog, TempoConfig,
    DEFAULT_BEAT_PERCENTAGE, DEFAULT_POLL_QUANTUM,
};
use rave_broadcast::{ServerConfig, DEFAULT_MAX_LINE_LEN};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cli::Args;
use crate::error::{Error, Result};

/// A color in the show file: a palette name or an explicit RGB choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorSpec {
    Named(String),
    Custom(ColorChoice),
}

impl ColorSpec {
    pub fn resolve(&self) -> Result<ColorChoice> {
        match self {
            ColorSpec::Named(name) => Ok(ColorChoice::named(name)?),
            ColorSpec::Custom(choice) => Ok(choice.clone()),
        }
    }
}

/// On-disk show description. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShowFile {
    pub tempo: Option<TempoConfig>,
    pub animations: Option<Vec<String>>,
    pub colors: Option<Vec<ColorSpec>>,
    pub phrases_per_animation: Option<u32>,
    pub beat_percentage: Option<f64>,
    /// Named presets added on top of the built-in ones.
    pub presets: StaticCatalog,
}

impl ShowFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Resolved show: what the clock and sequencer run with.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowConfig {
    pub tempo: TempoConfig,
    pub policy: CyclePolicy,
    pub catalog: StaticCatalog,
    pub beat_percentage: f64,
}

impl Default for ShowConfig {
    fn default() -> Self {
        Self {
            tempo: TempoConfig::default(),
            policy: CyclePolicy::default(),
            catalog: StaticCatalog::builtin(),
            beat_percentage: DEFAULT_BEAT_PERCENTAGE,
        }
    }
}

impl ShowConfig {
    /// Apply a show file over the defaults.
    pub fn from_show_file(file: ShowFile) -> Result<Self> {
        let mut show = Self::default();

        if let Some(tempo) = file.tempo {
            tempo.validate()?;
            show.tempo = tempo;
        }
        if let Some(animations) = file.animations {
            show.policy.animations = animations;
        }
        if let Some(colors) = file.colors {
            show.policy.colors = colors
                .iter()
                .map(ColorSpec::resolve)
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(phrases) = file.phrases_per_animation {
            show.policy.phrases_per_animation = phrases;
        }
        if let Some(beat_percentage) = file.beat_percentage {
            if !beat_percentage.is_finite() || beat_percentage <= 0.0 {
                return Err(Error::Config(format!(
                    "beat_percentage must be positive, got {}",
                    beat_percentage
                )));
            }
            show.beat_percentage = beat_percentage;
        }
        show.catalog.merge(file.presets)?;

        Ok(show)
    }

    /// Override the tempo, keeping bar and phrase lengths.
    pub fn set_bpm(&mut self, bpm: f64) -> Result<()> {
        self.tempo = TempoConfig::with_grouping(
            bpm,
            self.tempo.beats_per_bar,
            self.tempo.bars_per_phrase,
        )?;
        Ok(())
    }

    /// Animations in the cycle that the catalog cannot resolve.
    pub fn unknown_animations(&self) -> Vec<&str> {
        self.policy
            .animations
            .iter()
            .filter(|name| self.catalog.template(name).is_none())
            .map(String::as_str)
            .collect()
    }
}

/// Everything a [`Controller`](crate::Controller) needs.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub server: ServerConfig,
    pub show: ShowConfig,
    pub poll_quantum: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            show: ShowConfig::default(),
            poll_quantum: DEFAULT_POLL_QUANTUM,
        }
    }
}

impl ControllerConfig {
    /// Build from parsed command-line arguments, loading the show file if
    /// one is named.
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut show = match &args.show {
            Some(path) => ShowConfig::from_show_file(ShowFile::load(path)?)?,
            None => ShowConfig::default(),
        };
        if let Some(bpm) = args.bpm {
            show.set_bpm(bpm)?;
        }

        let unknown = show.unknown_animations();
        if !unknown.is_empty() {
            warn!("Animations without a preset will stop the show: {:?}", unknown);
        }

        if args.send_timeout_ms == 0 {
            return Err(Error::Config("send timeout must be at least 1 ms".into()));
        }

        Ok(Self {
            server: ServerConfig {
                listen_addr: args.listen,
                send_timeout: Duration::from_millis(args.send_timeout_ms),
                max_clients: args.max_clients,
                max_line_len: DEFAULT_MAX_LINE_LEN,
            },
            show,
            poll_quantum: Duration::from_millis(args.poll_quantum_ms.max(1)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rave_beat::{AnimationParams, Rgb};
    use std::io::Write;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["rave-controller"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_play_red_blue_blink_then_fuse_wave() {
        let config = ControllerConfig::from_args(&args(&[])).unwrap();
        assert_eq!(config.server.listen_addr.port(), 6000);
        assert_eq!(config.server.send_timeout, Duration::from_millis(250));
        assert_eq!(config.show.tempo.bpm, 120.0);
        assert_eq!(config.show.policy.animations, vec!["Blink", "FuseWave"]);
        assert_eq!(config.show.policy.colors[0].rgb, Rgb(255, 0, 0));
        assert_eq!(config.show.policy.colors[1].rgb, Rgb(0, 0, 255));
        assert_eq!(config.show.policy.phrases_per_animation, 1);
        assert_eq!(config.poll_quantum, DEFAULT_POLL_QUANTUM);
    }

    #[test]
    fn flags_override_defaults() {
        let config = ControllerConfig::from_args(&args(&[
            "--listen",
            "127.0.0.1:7000",
            "--bpm",
            "174",
            "--send-timeout-ms",
            "40",
            "--max-clients",
            "12",
        ]))
        .unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(config.show.tempo.bpm, 174.0);
        assert_eq!(config.server.send_timeout, Duration::from_millis(40));
        assert_eq!(config.server.max_clients, Some(12));
    }

    #[test]
    fn rejects_bad_bpm_and_timeout() {
        assert!(ControllerConfig::from_args(&args(&["--bpm", "0"])).is_err());
        assert!(ControllerConfig::from_args(&args(&["--send-timeout-ms", "0"])).is_err());
    }

    #[test]
    fn loads_a_show_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "tempo": {{"bpm": 140, "beats_per_bar": 3}},
                "animations": ["Flash", "SlowFuse"],
                "colors": ["magenta", {{"name": "amber", "rgb": [255, 191, 0]}}],
                "phrases_per_animation": 2,
                "beat_percentage": 0.8,
                "presets": {{
                    "Flash": {{"Animation": "Blink"}},
                    "SlowFuse": {{"Animation": "FuseWave", "chunkSize": 3}}
                }}
            }}"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = ControllerConfig::from_args(&args(&["--show", &path])).unwrap();
        let show = &config.show;
        assert_eq!(show.tempo.bpm, 140.0);
        assert_eq!(show.tempo.beats_per_bar, 3);
        assert_eq!(show.tempo.bars_per_phrase, 8);
        assert_eq!(show.policy.colors[0].rgb, Rgb(255, 0, 255));
        assert_eq!(show.policy.colors[1], ColorChoice::new("amber", Rgb(255, 191, 0)));
        assert_eq!(show.policy.phrases_per_animation, 2);
        assert_eq!(show.beat_percentage, 0.8);
        assert_eq!(
            show.catalog.template("SlowFuse").unwrap().params,
            AnimationParams::FuseWave { chunk_size: 3 }
        );
        assert!(show.catalog.template("Blink").is_some());
        assert!(show.unknown_animations().is_empty());
    }

    #[test]
    fn bpm_flag_beats_show_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"tempo": {{"bpm": 90, "bars_per_phrase": 4}}}}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config =
            ControllerConfig::from_args(&args(&["--show", &path, "--bpm", "100"])).unwrap();
        assert_eq!(config.show.tempo.bpm, 100.0);
        assert_eq!(config.show.tempo.bars_per_phrase, 4);
    }

    #[test]
    fn unknown_palette_color_fails() {
        let file = ShowFile {
            colors: Some(vec![ColorSpec::Named("ultraviolet".into())]),
            ..Default::default()
        };
        assert!(ShowConfig::from_show_file(file).is_err());
    }

    #[test]
    fn reports_animations_without_presets() {
        let file = ShowFile {
            animations: Some(vec!["Blink".into(), "Strobe".into()]),
            ..Default::default()
        };
        let show = ShowConfig::from_show_file(file).unwrap();
        assert_eq!(show.unknown_animations(), vec!["Strobe"]);
    }

    #[test]
    fn unknown_show_keys_are_rejected() {
        let parsed = serde_json::from_str::<ShowFile>(r#"{"bmp": 120}"#);
        assert!(parsed.is_err());
    }
}
