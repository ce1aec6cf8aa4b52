// Step-sequenced flow engine. Each swap party runs one flow instance: a
// fixed, named step list driven front to back, with state patches applied
// atomically with step advancement and persisted at every transition.

pub mod state;

use crate::onchain::ChainError;
use crate::persist::SwapStorage;
use crate::poller::StopSignal;
use state::{FlowState, StatePatch};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// Errors surfaced by flow operations. Step handlers that return one of
/// these stall the flow at the failing step; they never tear it down.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("invalid swap session: {0}")]
    Construction(String),
    #[error("secret was already submitted")]
    SecretAlreadySubmitted,
    #[error("peer has not signed yet")]
    PeerNotSigned,
    #[error("no script values in state at step '{0}'")]
    MissingScript(&'static str),
    #[error("no secret in state at step '{0}'")]
    MissingSecret(&'static str),
    #[error("funds already withdrawn from script {0}")]
    AlreadyWithdrawn(String),
    #[error("contract target wallet mismatch: needed {needed}, got {got}")]
    TargetWalletMismatch { needed: String, got: String },
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Out-of-band diagnostics a flow emits while it runs. Consumed by whoever
/// embeds the flow (UI, logs, alerting); dropping the receiver is fine.
#[derive(Clone, Debug)]
pub enum FlowEvent {
    SwapStopped,
    StepFailed {
        step: &'static str,
        error: String,
    },
    ScriptCheckFailed(String),
    ContractCheckFailed(String),
    TargetWalletMismatch {
        needed: String,
        got: String,
    },
    SecretHashMismatch {
        expected: String,
        supplied: String,
    },
}

/// One party's protocol logic: a named step list plus a handler per step.
/// The engine decides *when* each handler runs; the handler decides *what*
/// finishes the step (directly, via a poller, or via a peer message).
#[async_trait::async_trait]
pub trait FlowProtocol: Send + Sync {
    fn flow_name(&self) -> &'static str;
    fn steps(&self) -> &'static [&'static str];
    async fn run_step(&self, name: &'static str) -> Result<(), FlowError>;
}

/// Shared flow machinery: the state cell, step sequencing, persistence and
/// the stop latch. Both concrete flows embed one of these.
pub struct FlowEngine {
    flow_name: &'static str,
    swap_id: String,
    steps: &'static [&'static str],
    state: Mutex<FlowState>,
    storage: Option<Arc<dyn SwapStorage>>,
    step_tx: watch::Sender<usize>,
    event_tx: mpsc::UnboundedSender<FlowEvent>,
    stop: StopSignal,
}

impl FlowEngine {
    /// Build an engine, resuming from a persisted snapshot when the storage
    /// has one for this swap id.
    pub fn new(
        flow_name: &'static str,
        swap_id: &str,
        steps: &'static [&'static str],
        storage: Option<Arc<dyn SwapStorage>>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<FlowEvent>) {
        let state = storage
            .as_ref()
            .and_then(|s| s.load(swap_id))
            .unwrap_or_default();
        if state.step > 0 {
            log::info!("[{flow_name}] resuming swap {swap_id} at step {}", state.step);
        }

        let stop = StopSignal::new();
        if state.is_stopped_swap {
            stop.stop();
        }

        let (step_tx, _) = watch::channel(state.step);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let engine = Arc::new(FlowEngine {
            flow_name,
            swap_id: swap_id.to_string(),
            steps,
            state: Mutex::new(state),
            storage,
            step_tx,
            event_tx,
            stop,
        });
        (engine, event_rx)
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> FlowState {
        self.state.lock().unwrap().clone()
    }

    pub fn current_step(&self) -> usize {
        self.state.lock().unwrap().step
    }

    pub fn swap_id(&self) -> &str {
        &self.swap_id
    }

    /// Stop latch shared by every poller this flow spawns.
    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Apply a patch without moving the step index.
    pub fn set_state(&self, patch: StatePatch, persist: bool) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.apply(patch);
            persist.then(|| state.clone())
        };
        if let Some(snapshot) = snapshot {
            self.persist(&snapshot);
        }
    }

    /// Apply `patch` and advance past the named step, atomically. Idempotent
    /// and monotonic: if the flow is already at or past the target index the
    /// call is a no-op (logged at warn unless `silent`), so duplicated peer
    /// messages and poller/message races cannot move the flow backwards or
    /// double-apply a transition.
    pub fn finish_step(&self, patch: StatePatch, step: &'static str, silent: bool) -> bool {
        let Some(index) = self.steps.iter().position(|s| *s == step) else {
            log::error!("[{}] unknown step name '{step}'", self.flow_name);
            return false;
        };
        let target = index + 1;

        let snapshot = {
            let mut state = self.state.lock().unwrap();
            if state.step >= target {
                if !silent {
                    log::warn!(
                        "[{}] step '{step}' already finished (at {})",
                        self.flow_name,
                        state.step
                    );
                }
                return false;
            }
            state.apply(patch);
            state.step = target;
            state.clone()
        };

        self.persist(&snapshot);
        let _ = self.step_tx.send(snapshot.step);
        log::debug!("[{}] finished step '{step}', now at {}", self.flow_name, snapshot.step);
        true
    }

    /// Set the permanent stop latch: persists the flag, wakes the pollers
    /// and the driver. The flow stalls at its current step; side operations
    /// (refund, manual withdraw) still work.
    pub fn stop_swap(&self) {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            if state.is_stopped_swap {
                return;
            }
            state.is_stopped_swap = true;
            state.clone()
        };
        self.persist(&snapshot);
        self.stop.stop();
        log::warn!("[{}] swap {} was stopped", self.flow_name, self.swap_id);
        self.dispatch(FlowEvent::SwapStopped);
        // wake the driver so it observes the latch
        let _ = self.step_tx.send(snapshot.step);
    }

    pub fn dispatch(&self, event: FlowEvent) {
        let _ = self.event_tx.send(event);
    }

    fn persist(&self, state: &FlowState) {
        if let Some(storage) = &self.storage {
            storage.save(&self.swap_id, state);
        }
    }

    /// Drive the protocol from the current step to the end. Each handler is
    /// run once per visit; a handler error is logged and reported, never
    /// propagated, so a failing step stalls the flow instead of crashing the
    /// driver. Returns when the terminal step has run or the stop latch is
    /// set.
    pub async fn drive(&self, protocol: &dyn FlowProtocol) {
        let mut step_rx = self.step_tx.subscribe();

        loop {
            if self.stop.is_stopped() {
                log::debug!("[{}] stopped, driver exiting", self.flow_name);
                return;
            }

            let index = self.current_step();
            if index >= self.steps.len() {
                return;
            }
            let name = self.steps[index];
            log::debug!("[{}] running step {index} '{name}'", self.flow_name);

            if let Err(err) = protocol.run_step(name).await {
                log::error!("[{}] step '{name}' failed: {err}", self.flow_name);
                self.dispatch(FlowEvent::StepFailed {
                    step: name,
                    error: err.to_string(),
                });
            }

            if index == self.steps.len() - 1 {
                log::info!("[{}] swap {} flow complete", self.flow_name, self.swap_id);
                return;
            }

            // Park until a handler or side operation advances the step.
            while self.current_step() <= index && !self.stop.is_stopped() {
                if step_rx.changed().await.is_err() {
                    return;
                }
            }
        }
    }
}
