//! Rave Controller binary
//!
//! Waits for fixtures on the configured port and drives the light show from
//! the keyboard: `s` starts, Enter resyncs to the downbeat, `q` stops.

use clap::Parser;
use rave_controller::control::{spawn_ctrl_c, spawn_stdin};
use rave_controller::{Args, Controller, ControllerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rave_controller=info,rave_beat=info,rave_broadcast=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = ControllerConfig::from_args(&args)?;

    tracing::info!("Starting Rave Controller");
    tracing::info!("  Listen: {}", config.server.listen_addr);
    tracing::info!(
        "  Tempo: {} bpm, {}/{} (beats/bar, bars/phrase)",
        config.show.tempo.bpm,
        config.show.tempo.beats_per_bar,
        config.show.tempo.bars_per_phrase
    );
    tracing::info!("  Cycle: {:?}", config.show.policy.animations);

    let controller = Controller::new(config).await?;
    let control = controller.control_handle();
    spawn_ctrl_c(control.clone());
    spawn_stdin(control.clone());

    if args.autostart {
        control.start();
    } else {
        tracing::info!("Press s + Enter to start, Enter to resync, q + Enter to stop");
    }

    let summary = controller.run().await?;
    tracing::info!(
        "Played {} beats ({} phrases)",
        summary.ticks,
        summary.final_state.total_phrases
    );

    Ok(())
}
