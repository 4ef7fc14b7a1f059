//! Scheduler actor - drives rounds on a fixed cadence
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → spawn run_round → [guard] → probe → broadcast
//!     ↑
//!     └─── Commands (RunNow, UpdateInterval, Shutdown)
//! ```
//!
//! Rounds run as their own tasks. A round that overruns the cadence does not
//! delay the ticker; the next tick hits the orchestrator's in-flight guard and
//! is skipped.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Interval, MissedTickBehavior, interval};
use tracing::{debug, error, instrument, trace, warn};

use crate::orchestrator::{RoundOrchestrator, RoundStatus};

#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run a round now, outside the cadence
    RunNow {
        respond_to: oneshot::Sender<RoundStatus>,
    },

    /// Change the cadence; the next round runs immediately
    UpdateInterval { interval_ms: u64 },

    /// Stop ticking and wait for in-flight rounds
    Shutdown,
}

pub struct SchedulerActor {
    orchestrator: Arc<RoundOrchestrator>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
    interval_duration: Duration,
    rounds: JoinSet<RoundStatus>,
}

impl SchedulerActor {
    pub fn new(
        orchestrator: Arc<RoundOrchestrator>,
        command_rx: mpsc::Receiver<SchedulerCommand>,
        interval_duration: Duration,
    ) -> Self {
        Self {
            orchestrator,
            command_rx,
            interval_duration,
            rounds: JoinSet::new(),
        }
    }

    #[instrument(skip(self), fields(interval = ?self.interval_duration))]
    pub async fn run(mut self) {
        debug!("starting scheduler");

        let mut ticker = cadence(self.interval_duration);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.spawn_round(None);
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::RunNow { respond_to }) => {
                            debug!("received RunNow command");
                            self.spawn_round(Some(respond_to));
                        }

                        Some(SchedulerCommand::UpdateInterval { interval_ms }) => {
                            debug!("updating interval to {interval_ms}ms");
                            self.interval_duration = Duration::from_millis(interval_ms);
                            ticker = cadence(self.interval_duration);
                        }

                        Some(SchedulerCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        // every handle is gone
                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }

                Some(joined) = self.rounds.join_next() => {
                    reap(joined);
                }
            }
        }

        while let Some(joined) = self.rounds.join_next().await {
            reap(joined);
        }

        debug!("scheduler stopped");
    }

    fn spawn_round(&mut self, respond_to: Option<oneshot::Sender<RoundStatus>>) {
        let orchestrator = Arc::clone(&self.orchestrator);
        self.rounds.spawn(async move {
            let status = orchestrator.run_round().await;
            if let Some(respond_to) = respond_to {
                let _ = respond_to.send(status.clone());
            }
            status
        });
    }
}

fn cadence(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

fn reap(joined: Result<RoundStatus, tokio::task::JoinError>) {
    match joined {
        Ok(RoundStatus::Completed(update)) => {
            trace!("round {} completed with {} updates", update.timestamp, update.updates.len())
        }
        Ok(RoundStatus::Skipped) => trace!("round skipped"),
        Err(e) => error!("round task failed: {e}"),
    }
}

/// Handle for controlling a running [`SchedulerActor`]
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Spawn the scheduler; the first round starts right away
    pub fn spawn(orchestrator: Arc<RoundOrchestrator>, interval: Duration) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = SchedulerActor::new(orchestrator, cmd_rx, interval);
        let task = tokio::spawn(actor.run());

        (Self { sender: cmd_tx }, task)
    }

    /// Run a round immediately and wait for its status
    pub async fn run_now(&self) -> Result<RoundStatus> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::RunNow { respond_to: tx })
            .await
            .context("failed to send RunNow command")?;

        rx.await.context("failed to receive round status")
    }

    pub async fn update_interval(&self, interval_ms: u64) -> Result<()> {
        anyhow::ensure!(interval_ms > 0, "interval must be > 0");
        self.sender
            .send(SchedulerCommand::UpdateInterval { interval_ms })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SchedulerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
