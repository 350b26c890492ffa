//! [`PollingCycle`] – one supervise-and-sample pass over the controller.
//!
//! Each [`tick`][PollingCycle::tick] evaluates, in order:
//!
//! 1. **Session connected** – read the device execution state through the
//!    session.
//!    * *running* – advance the runtime client one step
//!      ([`RuntimeController::ensure_running`]); when it reports running,
//!      refresh every variable and set the sampling flag.  A refresh cut
//!      short by cancellation leaves the flag clear.
//!    * *not running* – release the runtime client, then nudge the device
//!      through the session handle (start when stopped, reset otherwise).
//! 2. **Session not connected** – release the runtime client and apply the
//!    session reconnection policy.
//! 3. Wait the fixed cycle delay.
//!
//! Nothing in a tick fails.  Every fallible step degrades to a flag, a
//! sentinel value, or a stored command error, and is re-evaluated next tick.

use std::time::Duration;

use adscollect_hal::{RuntimeClient, Session};
use adscollect_types::{ConnectionState, DeviceError, ExecutionState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::control::Nudge;
use crate::runtime_controller::{RuntimeController, RuntimeStatus};
use crate::session_supervisor::{ReconnectAction, SessionSupervisor};
use crate::variable_registry::{RefreshReport, VariableRegistry};

/// Pause at the end of every tick.
pub const CYCLE_DELAY: Duration = Duration::from_secs(1);

/// Which branch a tick took and what it did there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Variables were refreshed.
    Sampled(RefreshReport),
    /// Cancellation cut the refresh short; the cycle does not count as sampling.
    Interrupted(RefreshReport),
    /// The device runs but the runtime client is not ready yet.
    RuntimeNotReady(RuntimeStatus),
    /// The device is not running; `nudge` is the command sent to it.
    DeviceNotRunning {
        observed: ExecutionState,
        nudge: Option<Nudge>,
    },
    /// The session is not connected; `action` is what the policy did.
    SessionDown {
        state: ConnectionState,
        action: ReconnectAction,
    },
}

/// Owns every piece of mutable collector state: both handles, the variable
/// table, the sampling flag, and the last command error.
pub struct PollingCycle<S: Session, R: RuntimeClient> {
    supervisor: SessionSupervisor<S>,
    runtime: RuntimeController<R>,
    registry: VariableRegistry,
    sampling: bool,
    last_command_error: Option<DeviceError>,
    delay: Duration,
}

impl<S: Session, R: RuntimeClient> PollingCycle<S, R> {
    pub fn new(
        supervisor: SessionSupervisor<S>,
        runtime: RuntimeController<R>,
        registry: VariableRegistry,
    ) -> Self {
        Self {
            supervisor,
            runtime,
            registry,
            sampling: false,
            last_command_error: None,
            delay: CYCLE_DELAY,
        }
    }

    /// Override the end-of-tick delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Perform the startup session connect.
    pub async fn start(&mut self) -> ConnectionState {
        self.supervisor.connect().await
    }

    /// Run one cycle.
    #[instrument(skip_all, fields(net_id = %self.supervisor.net_id()))]
    pub async fn tick(&mut self, cancel: &CancellationToken) -> CycleOutcome {
        self.sampling = false;

        let outcome = if self.supervisor.is_connected() {
            let observed = self.supervisor.read_execution_state().await;
            if observed.is_running() {
                self.sample(cancel).await
            } else {
                self.runtime.disconnect_if_connected().await;
                let nudge = self.supervisor.nudge(observed).await;
                self.last_command_error = nudge.as_ref().and_then(|n| n.error().cloned());
                CycleOutcome::DeviceNotRunning { observed, nudge }
            }
        } else {
            self.runtime.disconnect_if_connected().await;
            let state = self.supervisor.current_state();
            let action = self.supervisor.reconnect().await;
            debug!(%state, ?action, "session not connected");
            CycleOutcome::SessionDown { state, action }
        };

        pace(self.delay, cancel).await;
        outcome
    }

    async fn sample(&mut self, cancel: &CancellationToken) -> CycleOutcome {
        let status = self.runtime.ensure_running().await;
        self.last_command_error = status.nudge().and_then(|n| n.error().cloned());
        if !status.is_running() {
            return CycleOutcome::RuntimeNotReady(status);
        }

        let report = self.registry.refresh_all(&mut self.runtime, cancel).await;
        if report.cancelled {
            debug!(read = report.read, "refresh interrupted by shutdown");
            return CycleOutcome::Interrupted(report);
        }
        self.sampling = true;
        CycleOutcome::Sampled(report)
    }

    /// Tear everything down: unsubscribe, release the runtime client, close
    /// the session, drop both handles.
    pub async fn shutdown(mut self) {
        self.supervisor.unsubscribe();
        self.runtime.disconnect_if_connected().await;
        self.supervisor.disconnect().await;
        info!(net_id = %self.supervisor.net_id(), "collector connections closed");
    }

    /// `true` when the last tick produced live data.
    pub fn is_sampling(&self) -> bool {
        self.sampling
    }

    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    /// Error returned by the most recent control command, if it failed.
    pub fn last_command_error(&self) -> Option<&DeviceError> {
        self.last_command_error.as_ref()
    }

    pub fn supervisor(&self) -> &SessionSupervisor<S> {
        &self.supervisor
    }

    pub fn runtime(&self) -> &RuntimeController<R> {
        &self.runtime
    }
}

/// Sleep for `delay`, returning early when `cancel` fires.
pub(crate) async fn pace(delay: Duration, cancel: &CancellationToken) {
    if delay.is_zero() {
        return;
    }
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(delay) => {}
    }
}
