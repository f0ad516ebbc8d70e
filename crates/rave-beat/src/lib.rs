//! Rave Beat - tempo-locked animation sequencing
//!
//! Drives a cycle of lighting animations in step with an operator-declared
//! tempo. Nothing here listens to audio; the tempo is whatever the operator
//! says it is, and `Resync` realigns the downbeat to the room.
//!
//! # Architecture
//!
//! - **Tempo**: [`TempoConfig`] and [`CyclePolicy`], validated before start
//! - **State**: [`BeatState`] beat/bar/phrase counters
//! - **Sequencer**: [`AnimationSequencer`], beat position to [`AnimationCommand`]
//! - **Catalog**: [`AnimationCatalog`] presets the sequencer draws from
//! - **Clock**: [`BeatClock`], the drift-compensated tick loop
//! - **Control**: [`ControlHandle`] start/resync/stop signals
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rave_beat::{AnimationSequencer, BeatClock, CyclePolicy, StaticCatalog, TempoConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sequencer = AnimationSequencer::new(
//!         TempoConfig::new(128.0)?,
//!         CyclePolicy::default(),
//!         Arc::new(StaticCatalog::builtin()),
//!     );
//!     let (clock, control) = BeatClock::new(sequencer);
//!     let (tx, mut rx) = tokio::sync::mpsc::channel(1);
//!     let task = tokio::spawn(clock.run(tx));
//!
//!     control.start();
//!     while let Some(tick) = rx.recv().await {
//!         println!("{}", tick.command.name);
//!     }
//!     task.await??;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod clock;
pub mod command;
pub mod control;
pub mod error;
pub mod sequencer;
pub mod state;
pub mod tempo;

pub use catalog::{AnimationCatalog, AnimationTemplate, StaticCatalog, DEFAULT_CHUNK_SIZE};
pub use clock::{
    BeatClock, Clock, ClockPhase, ClockReport, JitterClock, Tick, TokioClock, DEFAULT_POLL_QUANTUM,
};
pub use command::{AnimationCommand, AnimationParams, AnimationType};
pub use control::{control_channel, ClockControlSignal, ControlHandle, ControlReceiver};
pub use error::{Error, Result};
pub use sequencer::{AnimationSequencer, DEFAULT_BEAT_PERCENTAGE};
pub use state::BeatState;
pub use tempo::{palette_rgb, ColorChoice, CyclePolicy, Rgb, TempoConfig, PALETTE};
