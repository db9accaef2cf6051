//! Named observable state cells.
//!
//! A [`Var`] is the simulator's process-variable primitive: a named, typed
//! cell holding the last written value, its timestamp, and an alarm
//! severity. Components own their vars and write through narrow methods;
//! collaborators hold cheap clones of the handle and always observe the
//! latest write. Subscribers are woken on every write, never batched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// EPICS-style alarm severity ladder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    #[default]
    NoAlarm,
    Minor,
    Major,
    Invalid,
}

/// One observed write: value plus metadata.
#[derive(Clone, Debug)]
pub struct Sample<T> {
    pub value: T,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
}

#[derive(Debug)]
struct VarInner<T> {
    name: String,
    cell: watch::Sender<Sample<T>>,
}

/// Cheap-clone handle to a named observable cell.
///
/// All clones share one underlying cell; reads see the latest write
/// regardless of which clone performed it.
#[derive(Debug)]
pub struct Var<T> {
    inner: Arc<VarInner<T>>,
}

impl<T> Clone for Var<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Var<T> {
    pub fn new(name: impl Into<String>, initial: T) -> Self {
        let sample = Sample {
            value: initial,
            timestamp: Utc::now(),
            severity: Severity::NoAlarm,
        };
        let (cell, _) = watch::channel(sample);
        Self {
            inner: Arc::new(VarInner {
                name: name.into(),
                cell,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Latest written value. No side effects.
    pub fn value(&self) -> T {
        self.inner.cell.borrow().value.clone()
    }

    /// Latest sample including timestamp and severity.
    pub fn sample(&self) -> Sample<T> {
        self.inner.cell.borrow().clone()
    }

    pub fn severity(&self) -> Severity {
        self.inner.cell.borrow().severity
    }

    /// Write a new value, refreshing the timestamp. Severity is kept.
    pub fn set(&self, value: T) {
        self.inner.cell.send_modify(|s| {
            s.value = value;
            s.timestamp = Utc::now();
        });
    }

    /// Write a new value and severity in one observable update.
    pub fn set_with_severity(&self, value: T, severity: Severity) {
        self.inner.cell.send_modify(|s| {
            s.value = value;
            s.timestamp = Utc::now();
            s.severity = severity;
        });
    }

    /// Change only the alarm severity.
    pub fn set_severity(&self, severity: Severity) {
        self.inner.cell.send_modify(|s| {
            s.timestamp = Utc::now();
            s.severity = severity;
        });
    }

    /// Read-modify-write in one observable update.
    ///
    /// Used for accumulator-style vars (step counters, piezo voltage).
    pub fn modify(&self, f: impl FnOnce(&mut T)) {
        self.inner.cell.send_modify(|s| {
            f(&mut s.value);
            s.timestamp = Utc::now();
        });
    }

    /// Subscribe to writes. The receiver is woken on every write and
    /// always reads the latest sample.
    pub fn subscribe(&self) -> watch::Receiver<Sample<T>> {
        self.inner.cell.subscribe()
    }
}
