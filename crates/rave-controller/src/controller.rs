//! The controller process: one beat clock feeding one broadcast server.
//!
//! Architecture:
//! - Clock task owns the beat state and emits ticks
//! - Server task encodes each tick and fans it out
//! - Operator input reaches the clock only through a [`ControlHandle`]

use std::net::SocketAddr;
use std::sync::Arc;

use rave_beat::{AnimationSequencer, BeatClock, BeatState, ControlHandle};
use rave_broadcast::{BroadcastServer, ClientRegistry};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::ControllerConfig;
use crate::error::Result;

/// What a finished run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub final_state: BeatState,
    /// Fixtures dropped for failed or slow writes.
    pub dropped_clients: u64,
}

/// A bound, not yet running controller.
pub struct Controller {
    clock: BeatClock,
    control: ControlHandle,
    server: BroadcastServer,
}

impl Controller {
    /// Bind the fixture port and set up an idle clock.
    pub async fn new(config: ControllerConfig) -> Result<Self> {
        let show = config.show;
        let sequencer = AnimationSequencer::new(show.tempo, show.policy, Arc::new(show.catalog))
            .with_beat_percentage(show.beat_percentage);
        let (clock, control) = BeatClock::new(sequencer);
        let clock = clock.with_poll_quantum(config.poll_quantum);

        let server = BroadcastServer::bind(config.server).await?;

        Ok(Self {
            clock,
            control,
            server,
        })
    }

    /// Handle for raising start/resync/stop.
    pub fn control_handle(&self) -> ControlHandle {
        self.control.clone()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.local_addr()?)
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        self.server.registry()
    }

    /// Run until the clock stops.
    ///
    /// The clock task is joined before the server is, and the server only
    /// releases the listening socket once the clock's tick stream has closed.
    pub async fn run(self) -> Result<RunSummary> {
        info!("Controller running on {}", self.server.local_addr()?);

        let (tx, rx) = mpsc::channel(1);
        let clock_task = tokio::spawn(self.clock.run(tx));
        let server_task = tokio::spawn(self.server.serve(rx));

        let clock_result = clock_task.await?;
        let served = server_task.await??;
        drop(self.control);

        let report = match clock_result {
            Ok(report) => report,
            Err(e) => {
                error!("Show stopped: {}", e);
                return Err(e.into());
            }
        };
        info!(
            ticks = report.ticks,
            broadcast = served.ticks,
            dropped = served.dropped,
            "Controller finished"
        );
        Ok(RunSummary {
            ticks: report.ticks,
            final_state: report.final_state,
            dropped_clients: served.dropped,
        })
    }
}
