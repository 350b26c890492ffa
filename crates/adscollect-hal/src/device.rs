//! Device handle traits.
//!
//! A controller is reached through two independent handles:
//!
//! * a [`Session`] – the transport-level connection to the device as a whole,
//!   which pushes connection changes into a [`ConnectionCell`];
//! * a [`RuntimeClient`] – a client bound to one execution context (the PLC
//!   runtime), which reads variables by symbol name.
//!
//! Both can read the execution state and write a control command, so that
//! surface is factored into [`StateControl`].  Connect/disconnect semantics
//! differ between the two and deliberately stay on the separate traits.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use adscollect_types::{
    AmsAddress, AmsNetId, ConnectionState, ControlCommand, DeviceError, ExecutionState,
    SessionSettings,
};

use crate::cell::ConnectionCell;

/// Execution-state read and control write, shared by both handle kinds.
#[async_trait]
pub trait StateControl: Send {
    /// Query the current execution state of the device or runtime.
    async fn read_state(&mut self) -> Result<ExecutionState, DeviceError>;

    /// Request a state transition.  Returns once the device has accepted the
    /// request, not once the transition has happened.
    async fn write_control(&mut self, command: ControlCommand) -> Result<(), DeviceError>;
}

/// Transport-level session to one device.
#[async_trait]
pub trait Session: StateControl {
    /// Open the session to `net_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Timeout`] when the handshake exceeds
    /// `settings.timeout`, or [`DeviceError::Unreachable`] when the route to
    /// the device cannot be established.
    async fn connect(
        &mut self,
        net_id: AmsNetId,
        settings: &SessionSettings,
    ) -> Result<ConnectionState, DeviceError>;

    /// Close the session.
    async fn disconnect(&mut self) -> Result<(), DeviceError>;

    /// `true` while the session holds an underlying connection object, even
    /// if that connection has since been lost.
    fn has_connection(&self) -> bool;

    /// Start pushing connection-state changes into `cell`.  Replaces any
    /// previous subscription.
    fn subscribe(&mut self, cell: ConnectionCell);

    /// Stop pushing connection-state changes.  No-op when not subscribed.
    fn unsubscribe(&mut self);
}

/// Client bound to one execution context on the device.
#[async_trait]
pub trait RuntimeClient: StateControl {
    fn is_connected(&self) -> bool;

    /// Bind the client to `address`.
    async fn connect(&mut self, address: AmsAddress) -> Result<(), DeviceError>;

    async fn disconnect(&mut self) -> Result<(), DeviceError>;

    /// Read `symbol` and render its value as a string.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Ads`] when the device answers with a
    /// non-succeeded result and [`DeviceError::Cancelled`] when `cancel`
    /// fires before the read completes.
    async fn read_value(
        &mut self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<String, DeviceError>;
}
