//! [`RuntimeController`] – keeps the PLC runtime client bound and running.
//!
//! The runtime client has its own lifecycle, independent of the session.
//! [`RuntimeController::ensure_running`] advances it by at most one step per
//! cycle: connect when unbound, otherwise observe and, when not running,
//! issue a single start/reset nudge.

use adscollect_hal::RuntimeClient;
use adscollect_types::{AmsAddress, DeviceError};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::control::{self, Nudge};
use crate::variable_registry::VariableReader;

/// Result of one [`RuntimeController::ensure_running`] step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeStatus {
    /// The runtime is connected and running; variables may be read.
    Running,
    /// The runtime was connected but not running; a command was issued.
    Nudged(Nudge),
    /// The client was unbound; a connect was attempted this cycle.
    Connecting(Result<(), DeviceError>),
}

impl RuntimeStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn nudge(&self) -> Option<&Nudge> {
        match self {
            Self::Nudged(nudge) => Some(nudge),
            _ => None,
        }
    }
}

/// Owns the runtime client and the address it binds to.
pub struct RuntimeController<R: RuntimeClient> {
    client: R,
    address: AmsAddress,
}

impl<R: RuntimeClient> RuntimeController<R> {
    pub fn new(client: R, address: AmsAddress) -> Self {
        Self { client, address }
    }

    pub fn address(&self) -> AmsAddress {
        self.address
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Advance the runtime one step towards running.
    ///
    /// Only [`RuntimeStatus::Running`] counts as success.  A connect or a
    /// nudge always reports failure for this cycle, whatever its outcome.
    pub async fn ensure_running(&mut self) -> RuntimeStatus {
        if !self.client.is_connected() {
            let result = self.client.connect(self.address).await;
            match &result {
                Ok(()) => debug!(address = %self.address, "runtime client connected"),
                Err(e) => warn!(address = %self.address, error = %e, "runtime connect failed"),
            }
            return RuntimeStatus::Connecting(result);
        }

        let observed = control::observe_state(&mut self.client).await;
        match control::nudge(&mut self.client, observed).await {
            None => RuntimeStatus::Running,
            Some(nudge) => RuntimeStatus::Nudged(nudge),
        }
    }

    /// Disconnect the client if it is currently bound.
    pub async fn disconnect_if_connected(&mut self) {
        if !self.client.is_connected() {
            return;
        }
        match self.client.disconnect().await {
            Ok(()) => debug!(address = %self.address, "runtime client disconnected"),
            Err(e) => warn!(address = %self.address, error = %e, "runtime disconnect failed"),
        }
    }

    pub fn client(&self) -> &R {
        &self.client
    }
}

#[async_trait]
impl<R: RuntimeClient> VariableReader for RuntimeController<R> {
    async fn read_variable(
        &mut self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<String, DeviceError> {
        self.client.read_value(name, cancel).await
    }
}
