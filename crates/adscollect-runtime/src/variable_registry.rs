//! [`VariableRegistry`] – the ordered set of variables to poll and their
//! latest values.
//!
//! # Seeding
//!
//! The table starts with the [`FIXED_VARIABLES`] (value [`SENTINEL`]), then
//! the configured `Keys:0`, `Keys:1`, ... entries in index order (value
//! empty).  Enumeration stops at the first absent index, so a gap hides every
//! later entry.  Empty entries are skipped without ending enumeration.
//!
//! # Refresh
//!
//! [`VariableRegistry::refresh_all`] reads every key in table order, one at a
//! time, and overwrites its value.  A failed read stores [`SENTINEL`], which
//! is indistinguishable from a genuine `"0"` in the table;
//! [`VariableRegistry::failed`] lists the keys that failed in the last
//! refresh for consumers that need to tell the two apart.
//!
//! Cancellation is checked before each read.  Once it fires, or a read
//! reports [`DeviceError::Cancelled`], the refresh stops and the remaining
//! values keep what they held.

use std::collections::HashMap;

use adscollect_types::{ConfigSource, DeviceError};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Value stored for a variable whose read failed.
pub const SENTINEL: &str = "0";

/// Built-in variables polled on every controller.
pub const FIXED_VARIABLES: [&str; 9] = [
    "GVL.ST_Dat1.bVar1",
    "GVL.ST_Dat1.bVar2",
    "GVL.ST_Dat1.fVar3",
    "GVL.ST_Dat1.fVar4",
    "GVL.ST_Dat1.nVar5",
    "GVL.ST_Dat1.nVar6",
    "GVL.ST_Dat1.nVar7.fVar1",
    "GVL.ST_Dat1.nVar7.fVar2",
    "GVL.ST_Dat1.nVar7.nVar3",
];

/// Configuration prefix of the additional variable list.
const KEYS_SECTION: &str = "Keys";

/// Anything that can read one variable by name.
#[async_trait]
pub trait VariableReader: Send {
    async fn read_variable(
        &mut self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<String, DeviceError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// VariableTable
// ─────────────────────────────────────────────────────────────────────────────

/// Insertion-ordered map from variable name to its last-known value.
///
/// Keys are unique and never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableTable {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `key` with `value`.  Returns `false`, leaving the table
    /// unchanged, when `key` is already present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value.into()));
        true
    }

    /// Overwrite the value of an existing key.  Unknown keys are ignored.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        if let Some(&i) = self.index.get(key) {
            self.entries[i].1 = value.into();
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.index.get(key).map(|&i| self.entries[i].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// VariableRegistry
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of one [`VariableRegistry::refresh_all`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub read: usize,
    pub failed: Vec<String>,
    /// The refresh stopped early because cancellation fired.
    pub cancelled: bool,
}

/// The variables to poll and their latest sampled values.
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    table: VariableTable,
    failed: Vec<String>,
}

impl VariableRegistry {
    /// Seed from [`FIXED_VARIABLES`] and the `Keys:<n>` entries of `config`.
    pub fn from_config(config: &dyn ConfigSource) -> Self {
        Self::seed(&FIXED_VARIABLES, config)
    }

    /// Seed from `fixed` followed by the `Keys:<n>` entries of `config`.
    pub fn seed(fixed: &[&str], config: &dyn ConfigSource) -> Self {
        let mut table = VariableTable::new();
        for key in fixed {
            table.insert(*key, SENTINEL);
        }

        let mut n = 0usize;
        while let Some(key) = config.get(&format!("{KEYS_SECTION}:{n}")) {
            n += 1;
            if key.is_empty() {
                continue;
            }
            if !table.insert(key.as_str(), "") {
                warn!(key = %key, "duplicate variable in configuration ignored");
            }
        }
        debug!(variables = table.len(), configured = n, "variable table seeded");

        Self {
            table,
            failed: Vec::new(),
        }
    }

    /// Read every variable through `reader`, in table order.  `read` in the
    /// report counts completed reads, failed ones included.
    pub async fn refresh_all<R: VariableReader + ?Sized>(
        &mut self,
        reader: &mut R,
        cancel: &CancellationToken,
    ) -> RefreshReport {
        let mut report = RefreshReport::default();
        for (key, value) in self.table.entries.iter_mut() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let result = reader.read_variable(key, cancel).await;
            if matches!(result, Err(DeviceError::Cancelled)) {
                debug!(key = %key, "refresh cancelled");
                report.cancelled = true;
                break;
            }
            report.read += 1;
            match result {
                Ok(v) => *value = v,
                Err(e) => {
                    debug!(key = %key, error = %e, "variable read failed");
                    *value = SENTINEL.to_string();
                    report.failed.push(key.clone());
                }
            }
        }
        self.failed = report.failed.clone();
        report
    }

    pub fn table(&self) -> &VariableTable {
        &self.table
    }

    /// Keys whose read failed during the last refresh.
    pub fn failed(&self) -> &[String] {
        &self.failed
    }
}
