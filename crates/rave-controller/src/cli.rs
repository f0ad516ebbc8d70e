use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Beat-synchronized light show controller")]
pub struct Args {
    /// Address fixtures connect to
    #[arg(long, env = "RAVE_LISTEN_ADDR", default_value = "0.0.0.0:6000")]
    pub listen: SocketAddr,

    /// Tempo in beats per minute (overrides the show file)
    #[arg(long, env = "RAVE_BPM")]
    pub bpm: Option<f64>,

    /// Show file (JSON) with tempo, cycle and animation presets
    #[arg(long, env = "RAVE_SHOW_FILE")]
    pub show: Option<PathBuf>,

    /// Per-fixture send timeout in milliseconds
    #[arg(long, env = "RAVE_SEND_TIMEOUT_MS", default_value_t = 250)]
    pub send_timeout_ms: u64,

    /// Refuse fixtures beyond this many
    #[arg(long, env = "RAVE_MAX_CLIENTS")]
    pub max_clients: Option<usize>,

    /// Longest clock sleep in milliseconds
    #[arg(long, default_value_t = 50)]
    pub poll_quantum_ms: u64,

    /// Start the clock right away instead of waiting for `s`
    #[arg(long, default_value_t = false)]
    pub autostart: bool,
}
