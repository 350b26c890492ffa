//! [`SessionSupervisor`] – owner of the transport-level session.
//!
//! The supervisor tracks the session's [`ConnectionState`] through a
//! [`ConnectionCell`] that the session pushes notifications into, and applies
//! the reconnection policy once per cycle:
//!
//! | Observed state | Action |
//! |---|---|
//! | `none`, `disconnected` | connect |
//! | `lost` | disconnect (a lost session is always torn down before any reconnect) |
//! | `connected` | nothing |
//!
//! Connect and disconnect failures never escape: they are logged and the
//! observed state simply stays non-`connected`.

use adscollect_hal::{ConnectionCell, Session};
use adscollect_types::{AmsNetId, ConnectionState, ExecutionState, SessionSettings};
use tracing::{debug, info, warn};

use crate::control::{self, Nudge};

/// What the reconnection policy did in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectAction {
    /// A connect was attempted; carries the state it left behind.
    Connect(ConnectionState),
    /// A lost session was torn down.
    TearDown,
    /// The session already reports `connected`.
    None,
}

/// Supervises one [`Session`] to the device at `net_id`.
///
/// Unsubscribes from connection notifications when dropped.
pub struct SessionSupervisor<S: Session> {
    session: S,
    net_id: AmsNetId,
    settings: SessionSettings,
    state: ConnectionCell,
    subscribed: bool,
}

impl<S: Session> SessionSupervisor<S> {
    pub fn new(session: S, net_id: AmsNetId) -> Self {
        Self::with_settings(session, net_id, SessionSettings::default())
    }

    pub fn with_settings(session: S, net_id: AmsNetId, settings: SessionSettings) -> Self {
        Self {
            session,
            net_id,
            settings,
            state: ConnectionCell::default(),
            subscribed: false,
        }
    }

    pub fn net_id(&self) -> AmsNetId {
        self.net_id
    }

    /// The most recently observed connection state.
    pub fn current_state(&self) -> ConnectionState {
        self.state.load()
    }

    /// `true` when the session holds a connection and reports `connected`.
    pub fn is_connected(&self) -> bool {
        self.session.has_connection() && self.current_state() == ConnectionState::Connected
    }

    /// Open the session and subscribe to its change notifications.
    ///
    /// On failure the observed state is left unchanged and returned.
    pub async fn connect(&mut self) -> ConnectionState {
        match self.session.connect(self.net_id, &self.settings).await {
            Ok(state) => {
                if !self.subscribed {
                    self.session.subscribe(self.state.clone());
                    self.subscribed = true;
                }
                self.state.store(state);
                info!(net_id = %self.net_id, %state, "session connected");
                state
            }
            Err(e) => {
                let state = self.current_state();
                warn!(net_id = %self.net_id, error = %e, %state, "session connect failed");
                state
            }
        }
    }

    /// Unsubscribe and close the session.
    ///
    /// The notification that would report the close is no longer delivered,
    /// so a successful close records `disconnected` directly.
    pub async fn disconnect(&mut self) {
        self.unsubscribe();
        match self.session.disconnect().await {
            Ok(()) => {
                self.state.store(ConnectionState::Disconnected);
                info!(net_id = %self.net_id, "session disconnected");
            }
            Err(e) => warn!(net_id = %self.net_id, error = %e, "session disconnect failed"),
        }
    }

    /// Stop receiving connection notifications.
    pub fn unsubscribe(&mut self) {
        if self.subscribed {
            self.session.unsubscribe();
            self.subscribed = false;
        }
    }

    /// Read the device execution state through the session.
    pub async fn read_execution_state(&mut self) -> ExecutionState {
        control::observe_state(&mut self.session).await
    }

    /// Issue the start/reset nudge directly against the session handle.
    pub async fn nudge(&mut self, observed: ExecutionState) -> Option<Nudge> {
        control::nudge(&mut self.session, observed).await
    }

    /// Apply the reconnection policy to the current state.
    pub async fn reconnect(&mut self) -> ReconnectAction {
        match self.current_state() {
            ConnectionState::None | ConnectionState::Disconnected => {
                ReconnectAction::Connect(self.connect().await)
            }
            ConnectionState::Lost => {
                debug!(net_id = %self.net_id, "tearing down lost session");
                self.disconnect().await;
                ReconnectAction::TearDown
            }
            ConnectionState::Connected => ReconnectAction::None,
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }
}

impl<S: Session> Drop for SessionSupervisor<S> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
