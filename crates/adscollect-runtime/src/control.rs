//! Start/reset nudge shared by the session and runtime state machines.
//!
//! The decision is a pure function of the observed [`ExecutionState`]:
//!
//! | Observed | Command |
//! |---|---|
//! | `running` | none |
//! | `stopped` | `start` |
//! | anything else | `reset` |
//!
//! It is a one-shot request per cycle.  The caller never waits for the
//! transition; the next cycle re-observes the device.

use adscollect_hal::StateControl;
use adscollect_types::{ControlCommand, DeviceError, ExecutionState};
use tracing::{debug, info, warn};

/// A control command issued against a device handle, with its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nudge {
    pub observed: ExecutionState,
    pub command: ControlCommand,
    pub result: Result<(), DeviceError>,
}

impl Nudge {
    pub fn error(&self) -> Option<&DeviceError> {
        self.result.as_ref().err()
    }
}

/// Which command, if any, moves a device observed in `state` towards running.
pub fn decide_command(state: ExecutionState) -> Option<ControlCommand> {
    match state {
        ExecutionState::Running => None,
        ExecutionState::Stopped => Some(ControlCommand::Start),
        _ => Some(ControlCommand::Reset),
    }
}

/// Read the execution state of `target`.  A failed query reads as
/// [`ExecutionState::Error`].
pub async fn observe_state<T: StateControl + ?Sized>(target: &mut T) -> ExecutionState {
    match target.read_state().await {
        Ok(state) => state,
        Err(e) => {
            debug!(error = %e, "execution state query failed");
            ExecutionState::Error
        }
    }
}

/// Issue the command [`decide_command`] picks for `observed`.
///
/// Returns `None` without touching the device when `observed` is running.
pub async fn nudge<T: StateControl + ?Sized>(
    target: &mut T,
    observed: ExecutionState,
) -> Option<Nudge> {
    let command = decide_command(observed)?;
    let result = target.write_control(command).await;
    match &result {
        Ok(()) => info!(%observed, %command, "control command accepted"),
        Err(e) => warn!(%observed, %command, error = %e, "control command rejected"),
    }
    Some(Nudge {
        observed,
        command,
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Recorder {
        state: Result<ExecutionState, DeviceError>,
        written: Vec<ControlCommand>,
        reject: bool,
    }

    impl Recorder {
        fn new(state: Result<ExecutionState, DeviceError>) -> Self {
            Self {
                state,
                written: Vec::new(),
                reject: false,
            }
        }
    }

    #[async_trait]
    impl StateControl for Recorder {
        async fn read_state(&mut self) -> Result<ExecutionState, DeviceError> {
            self.state.clone()
        }

        async fn write_control(&mut self, command: ControlCommand) -> Result<(), DeviceError> {
            self.written.push(command);
            if self.reject {
                Err(DeviceError::Ads { code: 0x712 })
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn decision_table() {
        assert_eq!(decide_command(ExecutionState::Running), None);
        assert_eq!(
            decide_command(ExecutionState::Stopped),
            Some(ControlCommand::Start)
        );
        for state in [
            ExecutionState::Init,
            ExecutionState::Error,
            ExecutionState::Other(1),
            ExecutionState::Other(15),
        ] {
            assert_eq!(decide_command(state), Some(ControlCommand::Reset), "{state}");
        }
    }

    #[tokio::test]
    async fn failed_query_observes_error() {
        let mut target = Recorder::new(Err(DeviceError::NotConnected));
        assert_eq!(observe_state(&mut target).await, ExecutionState::Error);
    }

    #[tokio::test]
    async fn running_target_is_left_alone() {
        let mut target = Recorder::new(Ok(ExecutionState::Running));
        assert!(nudge(&mut target, ExecutionState::Running).await.is_none());
        assert!(target.written.is_empty());
    }

    #[tokio::test]
    async fn stopped_target_gets_one_start() {
        let mut target = Recorder::new(Ok(ExecutionState::Stopped));
        let issued = nudge(&mut target, ExecutionState::Stopped).await.unwrap();
        assert_eq!(issued.command, ControlCommand::Start);
        assert!(issued.error().is_none());
        assert_eq!(target.written, vec![ControlCommand::Start]);
    }

    #[tokio::test]
    async fn rejected_command_is_reported_not_retried() {
        let mut target = Recorder::new(Ok(ExecutionState::Error));
        target.reject = true;
        let issued = nudge(&mut target, ExecutionState::Error).await.unwrap();
        assert_eq!(issued.command, ControlCommand::Reset);
        assert_eq!(issued.error(), Some(&DeviceError::Ads { code: 0x712 }));
        assert_eq!(target.written.len(), 1);
    }
}
