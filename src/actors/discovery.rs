//! DiscoveryActor - Runs refresh cycles on a timer and hands snapshots to a consumer
//!
//! ## State Machine
//!
//! ```text
//! Idle → Running → Delivering ─┐
//!           ↑    ↘ Skipping ───┴→ Waiting ─(tick)─┐
//!           └─────────────────────────────────────┘
//!
//! cancellation (checked before every refresh and delivery) / consumer gone → Stopped
//! ```
//!
//! The first cycle runs immediately, later cycles on every tick of a fixed
//! interval. Cycles never overlap: the next tick is only awaited once the
//! previous cycle, including its delivery, is done.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::discovery::Refresher;
use crate::model::TargetGroup;

/// Where the delivery loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Spawned, first cycle not started yet
    Idle,

    /// A refresh cycle is in progress
    Running,

    /// Handing a snapshot to the consumer
    Delivering,

    /// The cycle failed, nothing is delivered
    Skipping,

    /// Waiting for the next tick
    Waiting,

    /// Terminal state
    Stopped,
}

/// Actor driving the refresh cycles
pub struct DiscoveryActor {
    refresher: Arc<Refresher>,

    /// Fixed period between ticks
    interval: Duration,

    /// Consumer of successful snapshots
    target_tx: mpsc::Sender<Vec<TargetGroup>>,

    cancel: CancellationToken,

    state_tx: watch::Sender<LoopState>,
}

impl DiscoveryActor {
    pub fn new(
        refresher: Arc<Refresher>,
        interval: Duration,
        target_tx: mpsc::Sender<Vec<TargetGroup>>,
        cancel: CancellationToken,
        state_tx: watch::Sender<LoopState>,
    ) -> Self {
        Self {
            refresher,
            interval,
            target_tx,
            cancel,
            state_tx,
        }
    }

    /// Run the actor's main loop
    ///
    /// This is the entry point for the actor. It runs until:
    /// - The cancellation token fires
    /// - The consumer side of the target channel is closed
    #[instrument(skip(self), fields(interval = ?self.interval))]
    pub async fn run(self) {
        debug!("starting discovery actor");

        if self.cycle().await.is_continue() {
            self.tick_loop().await;
        }

        self.set_state(LoopState::Stopped);
        debug!("discovery actor stopped");
    }

    /// Cycles on every tick until cancelled or the consumer is gone
    async fn tick_loop(&self) {
        let Some(first_tick) = Instant::now().checked_add(self.interval) else {
            error!("refresh interval {:?} is out of range", self.interval);
            return;
        };

        let mut ticker = interval_at(first_tick, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            self.set_state(LoopState::Waiting);

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("cancelled while waiting");
                    break;
                }

                _ = ticker.tick() => {}
            }

            // A tick may already be due when cancellation arrives
            if self.cancel.is_cancelled() {
                debug!("cancelled before refresh");
                break;
            }

            if self.cycle().await.is_break() {
                break;
            }
        }
    }

    /// One refresh followed by delivery or skip
    async fn cycle(&self) -> ControlFlow<()> {
        self.set_state(LoopState::Running);

        match self.refresher.refresh().await.into_result() {
            Ok(groups) => {
                self.set_state(LoopState::Delivering);
                self.deliver(groups).await
            }
            Err(e) => {
                self.set_state(LoopState::Skipping);
                error!("Refresh failed: {e}");
                ControlFlow::Continue(())
            }
        }
    }

    /// Hand the snapshot over unless cancellation fires first
    async fn deliver(&self, groups: Vec<TargetGroup>) -> ControlFlow<()> {
        let count = groups.len();

        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => {
                debug!("cancelled during delivery, dropping {count} target groups");
                ControlFlow::Break(())
            }

            result = self.target_tx.send(groups) => match result {
                Ok(()) => {
                    trace!("delivered {count} target groups");
                    ControlFlow::Continue(())
                }
                Err(_) => {
                    warn!("target consumer closed, shutting down");
                    ControlFlow::Break(())
                }
            },
        }
    }

    fn set_state(&self, state: LoopState) {
        trace!(?state, "loop state");
        self.state_tx.send_replace(state);
    }
}

/// Handle for controlling a DiscoveryActor
pub struct DiscoveryHandle {
    cancel: CancellationToken,
    state_rx: watch::Receiver<LoopState>,
    task: JoinHandle<()>,
}

impl DiscoveryHandle {
    /// Spawn a new discovery actor with its own cancellation token
    ///
    /// `interval` must be non-zero.
    pub fn spawn(
        refresher: Refresher,
        interval: Duration,
        target_tx: mpsc::Sender<Vec<TargetGroup>>,
    ) -> Self {
        Self::spawn_with_token(refresher, interval, target_tx, CancellationToken::new())
    }

    /// Spawn a new discovery actor stopped by `cancel`
    pub fn spawn_with_token(
        refresher: Refresher,
        interval: Duration,
        target_tx: mpsc::Sender<Vec<TargetGroup>>,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(LoopState::Idle);

        let actor = DiscoveryActor::new(
            Arc::new(refresher),
            interval,
            target_tx,
            cancel.clone(),
            state_tx,
        );

        let task = tokio::spawn(actor.run());

        Self {
            cancel,
            state_rx,
            task,
        }
    }

    /// Current state of the loop
    pub fn state(&self) -> LoopState {
        *self.state_rx.borrow()
    }

    /// Receiver following every state change
    pub fn subscribe_state(&self) -> watch::Receiver<LoopState> {
        self.state_rx.clone()
    }

    /// Ask the loop to stop; no refresh starts after this
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for the loop to finish
    pub async fn join(self) -> Result<()> {
        self.task.await.context("discovery actor panicked")
    }
}
