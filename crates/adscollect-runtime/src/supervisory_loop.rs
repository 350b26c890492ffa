//! [`SupervisoryLoop`] – runs the [`PollingCycle`] until cancelled.
//!
//! After every cycle the loop logs the sampling flag, logs one record per
//! variable when sampling, publishes a [`Snapshot`] on a
//! [`tokio::sync::watch`] channel, and waits its own delay on top of the
//! cycle's internal one.  Cancellation is checked once per cycle and during
//! both delays; a read already in flight is allowed to finish.

use std::time::Duration;

use adscollect_hal::{RuntimeClient, Session};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::polling_cycle::{PollingCycle, pace};

/// Pause after every cycle, on top of [`CYCLE_DELAY`][crate::polling_cycle::CYCLE_DELAY].
pub const LOOP_DELAY: Duration = Duration::from_secs(1);

/// One variable in a [`Snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableSample {
    pub key: String,
    pub value: String,
    /// The read failed and `value` is the sentinel.
    pub failed: bool,
}

/// What a consumer sees after each cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Number of completed cycles, starting at 1.
    pub cycle: u64,
    pub taken_at: DateTime<Utc>,
    pub sampling: bool,
    /// The full table when `sampling`, empty otherwise.
    pub variables: Vec<VariableSample>,
}

impl Snapshot {
    fn idle() -> Self {
        Self {
            cycle: 0,
            taken_at: Utc::now(),
            sampling: false,
            variables: Vec::new(),
        }
    }
}

/// Outer scheduling harness around a [`PollingCycle`].
pub struct SupervisoryLoop<S: Session, R: RuntimeClient> {
    cycle: PollingCycle<S, R>,
    delay: Duration,
    snapshots: watch::Sender<Snapshot>,
    completed: u64,
}

impl<S: Session, R: RuntimeClient> SupervisoryLoop<S, R> {
    pub fn new(cycle: PollingCycle<S, R>) -> Self {
        let (snapshots, _) = watch::channel(Snapshot::idle());
        Self {
            cycle,
            delay: LOOP_DELAY,
            snapshots,
            completed: 0,
        }
    }

    /// Override the delay between cycles.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Receive a [`Snapshot`] after every cycle.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    pub fn cycle(&self) -> &PollingCycle<S, R> {
        &self.cycle
    }

    /// Run cycles until `cancel` fires.
    pub async fn run(&mut self, cancel: &CancellationToken) {
        info!(started_at = %Utc::now(), "collector running");
        while !cancel.is_cancelled() {
            self.run_once(cancel).await;
            pace(self.delay, cancel).await;
        }
        info!(cycles = self.completed, "collector stopping");
    }

    /// Run a single cycle and publish its snapshot.
    pub async fn run_once(&mut self, cancel: &CancellationToken) -> Snapshot {
        self.cycle.tick(cancel).await;
        self.completed += 1;

        let sampling = self.cycle.is_sampling();
        info!(sampling, "cycle complete");

        let snapshot = self.snapshot(sampling);
        for var in &snapshot.variables {
            info!(key = %var.key, value = %var.value, "variable");
        }
        self.snapshots.send_replace(snapshot.clone());
        snapshot
    }

    fn snapshot(&self, sampling: bool) -> Snapshot {
        let registry = self.cycle.registry();
        let variables = if sampling {
            registry
                .table()
                .iter()
                .map(|(key, value)| VariableSample {
                    key: key.to_string(),
                    value: value.to_string(),
                    failed: registry.failed().iter().any(|f| f == key),
                })
                .collect()
        } else {
            Vec::new()
        };
        Snapshot {
            cycle: self.completed,
            taken_at: Utc::now(),
            sampling,
            variables,
        }
    }

    /// Stop the loop's collaborators: see [`PollingCycle::shutdown`].
    pub async fn shutdown(self) {
        self.cycle.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adscollect_hal::sim::{SimDevice, SimRuntimeClient, SimSession};
    use adscollect_types::{AmsAddress, AmsNetId, ExecutionState};
    use std::collections::BTreeMap;

    use crate::runtime_controller::RuntimeController;
    use crate::session_supervisor::SessionSupervisor;
    use crate::variable_registry::{SENTINEL, VariableRegistry};

    async fn collector(device: &SimDevice) -> SupervisoryLoop<SimSession, SimRuntimeClient> {
        paced_collector(device, Duration::ZERO).await
    }

    async fn paced_collector(
        device: &SimDevice,
        delay: Duration,
    ) -> SupervisoryLoop<SimSession, SimRuntimeClient> {
        let config: BTreeMap<String, String> =
            [("Keys:0".to_string(), "MAIN.count".to_string())].into();
        let mut cycle = PollingCycle::new(
            SessionSupervisor::new(device.session(), AmsNetId::LOCAL),
            RuntimeController::new(
                device.runtime_client(),
                AmsAddress::plc_runtime(AmsNetId::LOCAL),
            ),
            VariableRegistry::seed(&["MAIN.flag"], &config),
        )
        .with_delay(Duration::ZERO);
        cycle.start().await;
        SupervisoryLoop::new(cycle).with_delay(delay)
    }

    #[tokio::test]
    async fn snapshot_is_empty_until_sampling() {
        let device = SimDevice::new()
            .with_state(ExecutionState::Running)
            .with_value("MAIN.flag", "true");
        let mut lp = collector(&device).await;
        let cancel = CancellationToken::new();

        let first = lp.run_once(&cancel).await;
        assert_eq!(first.cycle, 1);
        assert!(!first.sampling);
        assert!(first.variables.is_empty());

        let second = lp.run_once(&cancel).await;
        assert!(second.sampling);
        assert_eq!(
            second.variables,
            vec![
                VariableSample {
                    key: "MAIN.flag".to_string(),
                    value: "true".to_string(),
                    failed: false,
                },
                VariableSample {
                    key: "MAIN.count".to_string(),
                    value: SENTINEL.to_string(),
                    failed: true,
                },
            ]
        );
    }

    #[tokio::test]
    async fn subscribers_see_latest_snapshot() {
        let device = SimDevice::new().with_state(ExecutionState::Running);
        let mut lp = collector(&device).await;
        let mut rx = lp.subscribe();
        assert_eq!(rx.borrow().cycle, 0);

        let cancel = CancellationToken::new();
        lp.run_once(&cancel).await;
        lp.run_once(&cancel).await;
        assert!(rx.has_changed().unwrap());
        let latest = rx.borrow_and_update().clone();
        assert_eq!(latest.cycle, 2);
        assert!(latest.sampling);
    }

    #[tokio::test]
    async fn run_stops_when_cancelled() {
        let device = SimDevice::new()
            .with_state(ExecutionState::Running)
            .with_value("MAIN.flag", "1")
            .with_value("MAIN.count", "7");
        // A non-zero delay lets the watcher task run between cycles.
        let mut lp = paced_collector(&device, Duration::from_millis(1)).await;
        let mut rx = lp.subscribe();
        let cancel = CancellationToken::new();

        let stopper = cancel.clone();
        let watcher = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                if rx.borrow().sampling {
                    stopper.cancel();
                    break;
                }
            }
        });

        lp.run(&cancel).await;
        watcher.await.unwrap();
        assert!(lp.cycle().is_sampling());
        assert_eq!(lp.cycle().registry().table().get("MAIN.count"), Some("7"));

        lp.shutdown().await;
        assert!(!device.is_subscribed());
    }

    mod capture {
        use std::collections::BTreeMap;
        use std::fmt;
        use std::sync::{Arc, Mutex};

        use tracing::field::{Field, Visit};
        use tracing::{Event, Subscriber};
        use tracing_subscriber::layer::{Context, Layer};

        /// Records the fields of every event.
        #[derive(Clone, Default)]
        pub struct Records(Arc<Mutex<Vec<BTreeMap<String, String>>>>);

        impl Records {
            /// Events whose message is `message`.
            pub fn with_message(&self, message: &str) -> Vec<BTreeMap<String, String>> {
                self.0
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|r| r.get("message").map(String::as_str) == Some(message))
                    .cloned()
                    .collect()
            }
        }

        struct Fields<'a>(&'a mut BTreeMap<String, String>);

        impl Visit for Fields<'_> {
            fn record_str(&mut self, field: &Field, value: &str) {
                self.0.insert(field.name().to_string(), value.to_string());
            }

            fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
                self.0.insert(field.name().to_string(), format!("{value:?}"));
            }
        }

        impl<S: Subscriber> Layer<S> for Records {
            fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
                let mut fields = BTreeMap::new();
                event.record(&mut Fields(&mut fields));
                self.0.lock().unwrap().push(fields);
            }
        }
    }

    #[tokio::test]
    async fn one_record_per_variable_only_when_sampling() {
        use tracing_subscriber::layer::SubscriberExt;

        let records = capture::Records::default();
        let _default =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(records.clone()));

        let device = SimDevice::new()
            .with_state(ExecutionState::Running)
            .with_value("MAIN.flag", "true")
            .with_value("MAIN.count", "5");
        let mut lp = collector(&device).await;
        let cancel = CancellationToken::new();

        lp.run_once(&cancel).await;
        assert!(records.with_message("variable").is_empty());

        lp.run_once(&cancel).await;
        let vars = records.with_message("variable");
        let logged: Vec<(&str, &str)> = vars
            .iter()
            .map(|r| (r["key"].as_str(), r["value"].as_str()))
            .collect();
        assert_eq!(logged, [("MAIN.flag", "true"), ("MAIN.count", "5")]);

        let flags: Vec<String> = records
            .with_message("cycle complete")
            .iter()
            .map(|r| r["sampling"].clone())
            .collect();
        assert_eq!(flags, ["false", "true"]);
    }

    #[test]
    fn snapshot_serializes() {
        let snapshot = Snapshot {
            cycle: 3,
            taken_at: Utc::now(),
            sampling: true,
            variables: vec![VariableSample {
                key: "MAIN.x".to_string(),
                value: "1".to_string(),
                failed: false,
            }],
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["cycle"], 3);
        assert_eq!(json["variables"][0]["key"], "MAIN.x");
    }
}
