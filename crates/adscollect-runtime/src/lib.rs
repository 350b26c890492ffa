//! `adscollect-runtime` – controller supervision and variable polling
//!
//! Keeps a two-layer connection to a controller alive, keeps its PLC runtime
//! in the running state, and samples a list of variables once per cycle.
//!
//! # Modules
//!
//! - [`session_supervisor`] – [`SessionSupervisor`]: owns the transport
//!   session, tracks its [`ConnectionState`][adscollect_types::ConnectionState]
//!   through notifications, and applies the reconnection policy.
//! - [`runtime_controller`] – [`RuntimeController`]: binds the runtime client
//!   and drives the runtime towards running one step per cycle.
//! - [`control`] – the start/reset decision and nudge shared by both handles.
//! - [`variable_registry`] – [`VariableRegistry`]: seeds the ordered variable
//!   table and refreshes it through a [`VariableReader`].
//! - [`polling_cycle`] – [`PollingCycle`]: the per-tick state machine that
//!   composes the three components above.
//! - [`supervisory_loop`] – [`SupervisoryLoop`]: runs cycles until cancelled
//!   and publishes a [`Snapshot`] after each one.
//! - [`telemetry`] – [`init_tracing`]: `tracing-subscriber` setup with an
//!   optional OTLP exporter.

pub mod control;
pub mod polling_cycle;
pub mod runtime_controller;
pub mod session_supervisor;
pub mod supervisory_loop;
pub mod telemetry;
pub mod variable_registry;

pub use control::{Nudge, decide_command};
pub use polling_cycle::{CYCLE_DELAY, CycleOutcome, PollingCycle};
pub use runtime_controller::{RuntimeController, RuntimeStatus};
pub use session_supervisor::{ReconnectAction, SessionSupervisor};
pub use supervisory_loop::{LOOP_DELAY, Snapshot, SupervisoryLoop, VariableSample};
pub use telemetry::{LogFormat, OtlpSettings, TelemetryGuard, init_tracing};
pub use variable_registry::{
    FIXED_VARIABLES, RefreshReport, SENTINEL, VariableReader, VariableRegistry, VariableTable,
};
