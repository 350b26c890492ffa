//! `adscollect-hal` – Device collaborator seams
//!
//! The collector never speaks the controller's wire protocol itself.  It
//! talks to the traits in this crate, and a device-communication library (or
//! the in-process simulator) implements them.
//!
//! # Modules
//!
//! - [`device`] – [`StateControl`], [`Session`], and [`RuntimeClient`]:
//!   the two handle kinds the collector drives, sharing only the state
//!   read/write surface.
//! - [`cell`] – [`ConnectionCell`]: the single-slot target that connection
//!   state notifications are pushed into.
//! - [`sim`] – [`SimDevice`][sim::SimDevice]: a simulated controller for
//!   headless tests and for running the binary without hardware.

pub mod cell;
pub mod device;
pub mod sim;

pub use cell::ConnectionCell;
pub use device::{RuntimeClient, Session, StateControl};
pub use sim::{SimDevice, SimRuntimeClient, SimSession};
