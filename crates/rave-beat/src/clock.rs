//! The beat clock task.
//!
//! The clock sits idle until a `Start` signal, then emits one [`Tick`] per
//! beat until `Stop`. Deadlines advance by adding one beat length to the
//! previous deadline, never by re-reading the time after a sleep, so
//! scheduling slop on one beat does not carry over into the next.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, Sleep};
use tracing::{debug, error, info, warn};

use crate::command::AnimationCommand;
use crate::control::{control_channel, ClockControlSignal, ControlHandle, ControlReceiver};
use crate::error::Result;
use crate::sequencer::AnimationSequencer;
use crate::state::BeatState;

/// Longest single sleep. Bounds how late a deadline can be noticed.
pub const DEFAULT_POLL_QUANTUM: Duration = Duration::from_millis(50);

/// Time source for the clock.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration) -> Sleep {
        tokio::time::sleep(duration)
    }
}

/// The tokio timer. Follows virtual time when paused in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that oversleeps by a rotating amount up to `max_jitter`.
///
/// Stands in for a loaded scheduler when checking that ticks stay on the
/// beat grid.
#[derive(Debug)]
pub struct JitterClock {
    max_jitter: Duration,
    calls: AtomicU64,
}

impl JitterClock {
    pub fn new(max_jitter: Duration) -> Self {
        Self {
            max_jitter,
            calls: AtomicU64::new(0),
        }
    }
}

impl Clock for JitterClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        let step = self.calls.fetch_add(1, Ordering::Relaxed) % 8;
        tokio::time::sleep(duration + self.max_jitter * step as u32 / 7)
    }
}

/// Lifecycle of a [`BeatClock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockPhase {
    /// Waiting for the first `Start`.
    Idle,
    Running,
    /// Terminal.
    Stopped,
}

/// One beat, as handed to the broadcast side.
#[derive(Debug, Clone)]
pub struct Tick {
    pub state: BeatState,
    pub command: AnimationCommand,
    /// Grid instant this beat belongs to.
    pub deadline: Instant,
    /// When the clock actually emitted it.
    pub fired_at: Instant,
}

/// Summary returned when the clock stops cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockReport {
    /// Ticks handed to the tick channel.
    pub ticks: u64,
    pub final_state: BeatState,
}

/// Drift-compensated beat scheduler.
pub struct BeatClock<C: Clock = TokioClock> {
    sequencer: AnimationSequencer,
    state: BeatState,
    phase: ClockPhase,
    poll_quantum: Duration,
    control: ControlReceiver,
    clock: C,
    emitted: u64,
}

impl BeatClock<TokioClock> {
    /// New idle clock and the handle that drives it.
    pub fn new(sequencer: AnimationSequencer) -> (Self, ControlHandle) {
        let (handle, control) = control_channel();
        let clock = Self {
            sequencer,
            state: BeatState::new(),
            phase: ClockPhase::Idle,
            poll_quantum: DEFAULT_POLL_QUANTUM,
            control,
            clock: TokioClock,
            emitted: 0,
        };
        (clock, handle)
    }
}

impl<C: Clock> BeatClock<C> {
    /// Swap the time source.
    pub fn with_clock<D: Clock>(self, clock: D) -> BeatClock<D> {
        BeatClock {
            sequencer: self.sequencer,
            state: self.state,
            phase: self.phase,
            poll_quantum: self.poll_quantum,
            control: self.control,
            clock,
            emitted: self.emitted,
        }
    }

    pub fn with_poll_quantum(mut self, poll_quantum: Duration) -> Self {
        self.poll_quantum = poll_quantum.max(Duration::from_millis(1));
        self
    }

    pub fn phase(&self) -> ClockPhase {
        self.phase
    }

    /// Run until stopped, sending every tick to `ticks`.
    ///
    /// Returns an error if the configuration is rejected at `Start` or the
    /// catalog cannot resolve an animation. Either way the clock ends in
    /// [`ClockPhase::Stopped`] and nothing partial is sent. A closed tick
    /// channel stops the clock without an error.
    ///
    /// Control signals are watched at every wait, including while the tick
    /// channel is full, so `Stop` lands within one poll quantum.
    pub async fn run(mut self, ticks: mpsc::Sender<Tick>) -> Result<ClockReport> {
        let mut next_deadline = match self.wait_for_start().await {
            Ok(Some(anchor)) => anchor,
            Ok(None) => return Ok(self.report()),
            Err(e) => {
                error!("Beat clock failed to start: {}", e);
                self.phase = ClockPhase::Stopped;
                return Err(e);
            }
        };
        let beat = self.sequencer.tempo().beat_duration();

        while self.phase == ClockPhase::Running {
            if let Some(signal) = self.control.take() {
                self.apply(signal, &mut next_deadline);
                continue;
            }

            let now = self.clock.now();
            if now < next_deadline {
                let nap = (next_deadline - now).min(self.poll_quantum);
                let woke = tokio::select! {
                    _ = self.clock.sleep(nap) => None,
                    signal = self.control.recv() => Some(signal),
                };
                if let Some(signal) = woke {
                    self.apply(signal, &mut next_deadline);
                }
                continue;
            }

            // Hold a slot in the tick channel before counting the beat, so a
            // signal that arrives while the broadcast side is busy leaves the
            // state untouched.
            let permit = tokio::select! {
                permit = ticks.reserve() => permit,
                signal = self.control.recv() => {
                    self.apply(signal, &mut next_deadline);
                    continue;
                }
            };
            let permit = match permit {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("Tick receiver closed, stopping beat clock");
                    self.phase = ClockPhase::Stopped;
                    break;
                }
            };

            self.state.advance(self.sequencer.tempo(), self.sequencer.policy());
            let command = match self.sequencer.command(&self.state) {
                Ok(command) => command,
                Err(e) => {
                    error!("Stopping beat clock: {}", e);
                    self.phase = ClockPhase::Stopped;
                    return Err(e);
                }
            };

            if self.state.is_phrase_start() {
                info!(
                    phrase = self.state.total_phrases,
                    animation = %command.kind(),
                    "Phrase start"
                );
            }
            debug!(
                beat = self.state.beat_in_bar,
                bar = self.state.bar_in_phrase,
                total = self.state.total_beats,
                name = %command.name,
                "Tick"
            );

            permit.send(Tick {
                state: self.state,
                command,
                deadline: next_deadline,
                fired_at: self.clock.now(),
            });
            self.emitted += 1;
            next_deadline += beat;
        }

        info!(ticks = self.emitted, "Beat clock stopped");
        Ok(self.report())
    }

    /// Act on a signal received while running.
    fn apply(&mut self, signal: ClockControlSignal, next_deadline: &mut Instant) {
        match signal {
            ClockControlSignal::Start => debug!("Start ignored, clock already running"),
            ClockControlSignal::Resync => {
                self.state.realign();
                *next_deadline = self.clock.now();
                info!(total_beats = self.state.total_beats, "Beat clock resynced");
            }
            ClockControlSignal::Stop => self.phase = ClockPhase::Stopped,
        }
    }

    /// Block in `Idle` until `Start` (returns the first deadline) or `Stop`.
    async fn wait_for_start(&mut self) -> Result<Option<Instant>> {
        loop {
            match self.control.recv().await {
                ClockControlSignal::Start => {
                    self.sequencer.tempo().validate()?;
                    self.sequencer.policy().validate()?;
                    self.state.realign();
                    self.phase = ClockPhase::Running;
                    info!(
                        bpm = self.sequencer.tempo().bpm,
                        beat_ms = self.sequencer.tempo().beat_duration().as_millis() as u64,
                        "Beat clock started"
                    );
                    return Ok(Some(self.clock.now()));
                }
                ClockControlSignal::Resync => debug!("Resync ignored, clock not started"),
                ClockControlSignal::Stop => {
                    self.phase = ClockPhase::Stopped;
                    info!("Beat clock stopped before start");
                    return Ok(None);
                }
            }
        }
    }

    fn report(&self) -> ClockReport {
        ClockReport {
            ticks: self.emitted,
            final_state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::command::AnimationType;
    use crate::error::Error;
    use crate::tempo::{CyclePolicy, TempoConfig};
    use std::sync::Arc;
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::task::JoinHandle;

    fn sequencer(bpm: f64, policy: CyclePolicy) -> AnimationSequencer {
        AnimationSequencer::new(
            TempoConfig::new(bpm).unwrap(),
            policy,
            Arc::new(StaticCatalog::builtin()),
        )
    }

    fn spawn<C: Clock>(
        clock: BeatClock<C>,
    ) -> (JoinHandle<Result<ClockReport>>, mpsc::Receiver<Tick>) {
        let (tx, rx) = mpsc::channel(1);
        (tokio::spawn(clock.run(tx)), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn idle_until_start() {
        let (clock, control) = BeatClock::new(sequencer(120.0, CyclePolicy::default()));
        assert_eq!(clock.phase(), ClockPhase::Idle);
        let (task, mut rx) = spawn(clock);

        control.resync();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        control.start();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.state.total_beats, 1);
        assert_eq!(first.command.kind(), AnimationType::Blink);

        control.stop();
        drop(rx);
        let report = task.await.unwrap().unwrap();
        assert!(report.ticks >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_start_emits_nothing() {
        let (clock, control) = BeatClock::new(sequencer(120.0, CyclePolicy::default()));
        let (task, mut rx) = spawn(clock);
        control.stop();
        let report = task.await.unwrap().unwrap();
        assert_eq!(report.ticks, 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_land_on_the_beat_grid() {
        let (clock, control) = BeatClock::new(sequencer(120.0, CyclePolicy::default()));
        let (task, mut rx) = spawn(clock);
        control.start();

        let first = rx.recv().await.unwrap();
        let start = first.deadline;
        assert_eq!(first.fired_at, start);

        let beat = Duration::from_millis(500);
        for k in 1..64u32 {
            let tick = rx.recv().await.unwrap();
            let expected = start + beat * k;
            assert_eq!(tick.deadline, expected);
            assert!(tick.fired_at >= expected);
            assert!(tick.fired_at - expected <= DEFAULT_POLL_QUANTUM, "tick {}", k + 1);
        }

        control.stop();
        drop(rx);
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn no_drift_under_jitter() {
        let quantum = DEFAULT_POLL_QUANTUM;
        let (clock, control) = BeatClock::new(sequencer(128.0, CyclePolicy::default()));
        let clock = clock.with_clock(JitterClock::new(quantum / 2));
        let (task, mut rx) = spawn(clock);
        control.start();

        let start = rx.recv().await.unwrap().deadline;
        let beat = TempoConfig::new(128.0).unwrap().beat_duration();
        for k in 1..300u32 {
            let tick = rx.recv().await.unwrap();
            let expected = start + beat * k;
            let late = tick.fired_at.saturating_duration_since(expected);
            assert!(late <= quantum, "tick {} late by {:?}", k + 1, late);
            assert!(tick.fired_at >= expected);
        }

        control.stop();
        drop(rx);
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_observed_within_a_quantum() {
        let (clock, control) = BeatClock::new(sequencer(60.0, CyclePolicy::default()));
        let (task, mut rx) = spawn(clock);
        control.start();
        rx.recv().await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        control.stop();
        let report = tokio::time::timeout(DEFAULT_POLL_QUANTUM, task)
            .await
            .expect("clock did not stop in time")
            .unwrap()
            .unwrap();
        assert_eq!(report.ticks, 1);
        assert_eq!(report.final_state.total_beats, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn resync_realigns_the_bar() {
        let (clock, control) = BeatClock::new(sequencer(120.0, CyclePolicy::default()));
        let (task, mut rx) = spawn(clock);
        control.start();

        let first = rx.recv().await.unwrap();
        let mut last = first.clone();
        for _ in 1..10 {
            last = rx.recv().await.unwrap();
        }
        assert_eq!(last.state.beat_in_bar, 2);
        assert_eq!(last.state.color_index, Some(1));

        tokio::time::sleep(Duration::from_millis(120)).await;
        let resync_at = tokio::time::Instant::now();
        control.resync();

        // A tick already queued before the resync still drains first.
        let mut after = rx.recv().await.unwrap();
        while after.deadline < resync_at {
            after = rx.recv().await.unwrap();
        }
        assert_eq!(after.state.beat_in_bar, first.state.beat_in_bar);
        assert_eq!(after.state.bar_in_phrase, first.state.bar_in_phrase);
        assert_eq!(after.state.color_index, first.state.color_index);
        assert!(after.state.total_beats > last.state.total_beats);
        assert!(after.deadline < last.deadline + Duration::from_millis(500));

        control.stop();
        drop(rx);
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn empty_policy_fails_start() {
        let policy = CyclePolicy::new(vec!["Blink".into()], vec![], 1);
        let (clock, control) = BeatClock::new(sequencer(120.0, policy));
        let (task, mut rx) = spawn(clock);
        control.start();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(Error::Configuration(_))));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_template_stops_the_run() {
        let mut policy = CyclePolicy::default();
        policy.animations = vec!["Strobe".into()];
        let (clock, control) = BeatClock::new(sequencer(120.0, policy));
        let (task, mut rx) = spawn(clock);
        control.start();

        match task.await.unwrap() {
            Err(Error::CatalogLookup { animation, .. }) => assert_eq!(animation, "Strobe"),
            other => panic!("expected catalog lookup error, got {:?}", other),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_receiver_stops_the_clock() {
        let (clock, control) = BeatClock::new(sequencer(240.0, CyclePolicy::default()));
        let (task, rx) = spawn(clock);
        drop(rx);
        control.start();
        let report = task.await.unwrap().unwrap();
        assert_eq!(report.ticks, 0);
        assert!(control.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_parked_between_beats() {
        let (clock, control) = BeatClock::new(sequencer(120.0, CyclePolicy::default()));
        let (task, mut rx) = spawn(clock);
        control.start();
        for _ in 0..3 {
            rx.recv().await.unwrap();
        }

        let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
        tokio::time::sleep(Duration::from_millis(210)).await;
        control.stop();

        let report = tokio::time::timeout(DEFAULT_POLL_QUANTUM, task)
            .await
            .expect("clock ignored stop")
            .unwrap()
            .unwrap();
        assert_eq!(report.ticks, 3);
        drain.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn idle_resync_then_stop_ends_the_run() {
        let (clock, control) = BeatClock::new(sequencer(120.0, CyclePolicy::default()));
        let (task, _rx) = spawn(clock);
        tokio::time::sleep(Duration::from_millis(10)).await;

        control.resync();
        tokio::time::sleep(Duration::from_millis(10)).await;
        control.stop();

        let report = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("idle clock ignored stop")
            .unwrap()
            .unwrap();
        assert_eq!(report.ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_tick_channel_is_full() {
        let (clock, control) = BeatClock::new(sequencer(240.0, CyclePolicy::default()));
        let (task, rx) = spawn(clock);
        control.start();

        // Nobody reads: the first tick fills the channel and the clock waits.
        tokio::time::sleep(Duration::from_millis(1200)).await;
        control.stop();

        let report = tokio::time::timeout(DEFAULT_POLL_QUANTUM, task)
            .await
            .expect("clock blocked on a full tick channel")
            .unwrap()
            .unwrap();
        assert_eq!(report.ticks, 1);
        assert_eq!(report.final_state.total_beats, 1);
        drop(rx);
    }
}
