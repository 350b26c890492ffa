//! In-process controller simulation for CI/CD testing without hardware.
//!
//! [`SimDevice`] is a clonable handle to one simulated controller.  It hands
//! out a [`SimSession`] and a [`SimRuntimeClient`] that implement the device
//! traits against shared state, records every control command and connect
//! call, and lets a test flip reachability, execution state, and per-symbol
//! failures between cycles.
//!
//! # Example
//!
//! ```rust
//! use adscollect_hal::sim::SimDevice;
//! use adscollect_types::ExecutionState;
//!
//! let device = SimDevice::new()
//!     .with_state(ExecutionState::Running)
//!     .with_value("MAIN.counter", "42");
//!
//! let _session = device.session();
//! let _client = device.runtime_client();
//! assert_eq!(device.execution_state(), ExecutionState::Running);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use adscollect_types::{
    AmsAddress, AmsNetId, ConnectionState, ControlCommand, DeviceError, ExecutionState,
    SessionSettings,
};

use crate::cell::ConnectionCell;
use crate::device::{RuntimeClient, Session, StateControl};

/// Result code for an unknown symbol.
pub const SYMBOL_NOT_FOUND: u32 = 0x710;
/// Result code for a rejected control write.
pub const INVALID_STATE: u32 = 0x712;
/// Result code for a state query that timed out on the device side.
pub const DEVICE_TIMEOUT: u32 = 0x745;

/// Which handle issued a control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSource {
    Session,
    Runtime,
}

/// Connect/disconnect call counts, for asserting on supervision behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimCounters {
    pub session_connects: u32,
    pub session_disconnects: u32,
    pub runtime_connects: u32,
    pub runtime_disconnects: u32,
}

#[derive(Default)]
struct SimState {
    reachable: bool,
    execution_state: Option<ExecutionState>,
    runtime_state: Option<ExecutionState>,
    state_query_fails: bool,
    control_fails: bool,
    apply_commands: bool,
    read_latency: Duration,
    values: HashMap<String, String>,
    failing: HashSet<String>,
    commands: Vec<(CommandSource, ControlCommand)>,
    reads: Vec<String>,
    counters: SimCounters,
    subscriber: Option<ConnectionCell>,
    session_open: bool,
    runtime_connected: bool,
}

impl SimState {
    fn device_state(&self) -> ExecutionState {
        self.execution_state.unwrap_or(ExecutionState::Stopped)
    }

    fn notify(&self, state: ConnectionState) {
        if let Some(cell) = &self.subscriber {
            cell.store(state);
        }
    }

    fn control(
        &mut self,
        source: CommandSource,
        command: ControlCommand,
    ) -> Result<(), DeviceError> {
        self.commands.push((source, command));
        if self.control_fails {
            return Err(DeviceError::Ads { code: INVALID_STATE });
        }
        if self.apply_commands {
            let next = match (command, self.device_state()) {
                (ControlCommand::Start, ExecutionState::Stopped) => ExecutionState::Running,
                (ControlCommand::Start, current) => current,
                (ControlCommand::Reset, _) => ExecutionState::Stopped,
            };
            self.execution_state = Some(next);
            self.runtime_state = None;
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimDevice
// ────────────────────────────────────────────────────────────────────────────

/// A simulated controller shared by its session and runtime handles.
///
/// Starts reachable, in [`ExecutionState::Stopped`], with no symbols.
#[derive(Clone)]
pub struct SimDevice {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDevice {
    pub fn new() -> Self {
        let state = SimState {
            reachable: true,
            ..SimState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the initial execution state.
    pub fn with_state(self, state: ExecutionState) -> Self {
        self.set_execution_state(state);
        self
    }

    /// Register `symbol` with a readable `value`.
    pub fn with_value(self, symbol: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_value(symbol, value);
        self
    }

    /// Make control writes take effect: `start` moves a stopped device to
    /// running, `reset` moves any device to stopped.
    pub fn applying_commands(self) -> Self {
        self.lock().apply_commands = true;
        self
    }

    /// Delay every variable read by `latency`.
    pub fn with_read_latency(self, latency: Duration) -> Self {
        self.lock().read_latency = latency;
        self
    }

    /// A new session handle for this device.
    pub fn session(&self) -> SimSession {
        SimSession {
            device: self.clone(),
        }
    }

    /// A new runtime client handle for this device.
    pub fn runtime_client(&self) -> SimRuntimeClient {
        SimRuntimeClient {
            device: self.clone(),
            address: None,
        }
    }

    // ── Fault injection ─────────────────────────────────────────────────

    pub fn set_execution_state(&self, state: ExecutionState) {
        self.lock().execution_state = Some(state);
    }

    /// Make the runtime report `state` independently of the device state.
    /// `None` makes it follow the device again.
    pub fn set_runtime_state(&self, state: Option<ExecutionState>) {
        self.lock().runtime_state = state;
    }

    pub fn set_value(&self, symbol: impl Into<String>, value: impl Into<String>) {
        self.lock().values.insert(symbol.into(), value.into());
    }

    /// Make reads of `symbol` fail with [`SYMBOL_NOT_FOUND`].
    pub fn fail_symbol(&self, symbol: impl Into<String>) {
        self.lock().failing.insert(symbol.into());
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    pub fn set_state_query_fails(&self, fails: bool) {
        self.lock().state_query_fails = fails;
    }

    pub fn set_control_fails(&self, fails: bool) {
        self.lock().control_fails = fails;
    }

    /// Simulate the transport link dropping: the device becomes unreachable
    /// and a subscribed session observes [`ConnectionState::Lost`].
    pub fn drop_link(&self) {
        let mut state = self.lock();
        state.reachable = false;
        if state.session_open {
            state.notify(ConnectionState::Lost);
        }
    }

    // ── Observation ─────────────────────────────────────────────────────

    pub fn execution_state(&self) -> ExecutionState {
        self.lock().device_state()
    }

    /// Every control command written so far, in order.
    pub fn commands(&self) -> Vec<(CommandSource, ControlCommand)> {
        self.lock().commands.clone()
    }

    /// Every symbol read so far, in order.
    pub fn reads(&self) -> Vec<String> {
        self.lock().reads.clone()
    }

    pub fn counters(&self) -> SimCounters {
        self.lock().counters
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock().subscriber.is_some()
    }

    pub fn clear_log(&self) {
        let mut state = self.lock();
        state.commands.clear();
        state.reads.clear();
        state.counters = SimCounters::default();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimSession
// ────────────────────────────────────────────────────────────────────────────

/// Session handle onto a [`SimDevice`].
pub struct SimSession {
    device: SimDevice,
}

#[async_trait]
impl StateControl for SimSession {
    async fn read_state(&mut self) -> Result<ExecutionState, DeviceError> {
        let state = self.device.lock();
        if !state.session_open {
            return Err(DeviceError::NotConnected);
        }
        if !state.reachable {
            return Err(DeviceError::Unreachable("link down".to_string()));
        }
        if state.state_query_fails {
            return Err(DeviceError::Ads { code: DEVICE_TIMEOUT });
        }
        Ok(state.device_state())
    }

    async fn write_control(&mut self, command: ControlCommand) -> Result<(), DeviceError> {
        let mut state = self.device.lock();
        if !state.session_open {
            return Err(DeviceError::NotConnected);
        }
        state.control(CommandSource::Session, command)
    }
}

#[async_trait]
impl Session for SimSession {
    async fn connect(
        &mut self,
        net_id: AmsNetId,
        settings: &SessionSettings,
    ) -> Result<ConnectionState, DeviceError> {
        let mut state = self.device.lock();
        state.counters.session_connects += 1;
        if !state.reachable {
            return Err(DeviceError::Timeout(settings.timeout));
        }
        debug!(%net_id, "sim session opened");
        state.session_open = true;
        state.notify(ConnectionState::Connected);
        Ok(ConnectionState::Connected)
    }

    async fn disconnect(&mut self) -> Result<(), DeviceError> {
        let mut state = self.device.lock();
        state.counters.session_disconnects += 1;
        state.session_open = false;
        state.notify(ConnectionState::Disconnected);
        Ok(())
    }

    fn has_connection(&self) -> bool {
        self.device.lock().session_open
    }

    fn subscribe(&mut self, cell: ConnectionCell) {
        self.device.lock().subscriber = Some(cell);
    }

    fn unsubscribe(&mut self) {
        self.device.lock().subscriber = None;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRuntimeClient
// ────────────────────────────────────────────────────────────────────────────

/// Runtime client handle onto a [`SimDevice`].
pub struct SimRuntimeClient {
    device: SimDevice,
    address: Option<AmsAddress>,
}

impl SimRuntimeClient {
    /// The address the client was last connected to.
    pub fn address(&self) -> Option<AmsAddress> {
        self.address
    }
}

#[async_trait]
impl StateControl for SimRuntimeClient {
    async fn read_state(&mut self) -> Result<ExecutionState, DeviceError> {
        let state = self.device.lock();
        if !state.runtime_connected {
            return Err(DeviceError::NotConnected);
        }
        if !state.reachable {
            return Err(DeviceError::Unreachable("link down".to_string()));
        }
        if state.state_query_fails {
            return Err(DeviceError::Ads { code: DEVICE_TIMEOUT });
        }
        Ok(state.runtime_state.unwrap_or_else(|| state.device_state()))
    }

    async fn write_control(&mut self, command: ControlCommand) -> Result<(), DeviceError> {
        let mut state = self.device.lock();
        if !state.runtime_connected {
            return Err(DeviceError::NotConnected);
        }
        state.control(CommandSource::Runtime, command)
    }
}

#[async_trait]
impl RuntimeClient for SimRuntimeClient {
    fn is_connected(&self) -> bool {
        self.device.lock().runtime_connected
    }

    async fn connect(&mut self, address: AmsAddress) -> Result<(), DeviceError> {
        let mut state = self.device.lock();
        state.counters.runtime_connects += 1;
        if !state.reachable {
            return Err(DeviceError::Unreachable(address.to_string()));
        }
        state.runtime_connected = true;
        self.address = Some(address);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), DeviceError> {
        let mut state = self.device.lock();
        state.counters.runtime_disconnects += 1;
        state.runtime_connected = false;
        Ok(())
    }

    async fn read_value(
        &mut self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<String, DeviceError> {
        let latency = self.device.lock().read_latency;
        if !latency.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(DeviceError::Cancelled),
                _ = tokio::time::sleep(latency) => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(DeviceError::Cancelled);
        }

        let mut state = self.device.lock();
        state.reads.push(symbol.to_string());
        if !state.runtime_connected {
            return Err(DeviceError::NotConnected);
        }
        if !state.reachable {
            return Err(DeviceError::Unreachable("link down".to_string()));
        }
        if state.failing.contains(symbol) {
            return Err(DeviceError::Ads { code: SYMBOL_NOT_FOUND });
        }
        state
            .values
            .get(symbol)
            .cloned()
            .ok_or(DeviceError::Ads { code: SYMBOL_NOT_FOUND })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
