//! Rolling history of failure records.
//!
//! Every caught failure appends an [`ErrorRecord`]; a later success for the
//! same `(resource, operation)` key marks the outstanding records as
//! resolved. Records older than the retention window are pruned on each
//! write, so the log is bounded without a background task.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::severity::Severity;

/// Default retention window for error records.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// A single recorded failure for a `(resource, operation)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// When the failure was observed.
    pub timestamp: DateTime<Utc>,
    /// Identifier of the resource the operation was acting on.
    pub resource_id: String,
    /// Name of the operation that failed.
    pub operation: String,
    /// Short name of the error type.
    pub error_type: String,
    /// Display message of the error.
    pub error_message: String,
    /// Classified severity bucket.
    pub severity: Severity,
    /// Zero-based attempt index at which this failure occurred.
    pub retry_count: u32,
    /// Whether a later attempt for the same key succeeded.
    pub resolved: bool,
    /// When the record was marked resolved.
    pub resolution_timestamp: Option<DateTime<Utc>>,
}

impl ErrorRecord {
    /// Create an unresolved record stamped with the current time.
    pub fn new(
        resource_id: impl Into<String>,
        operation: impl Into<String>,
        error_type: impl Into<String>,
        error_message: impl Into<String>,
        severity: Severity,
        retry_count: u32,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            resource_id: resource_id.into(),
            operation: operation.into(),
            error_type: error_type.into(),
            error_message: error_message.into(),
            severity,
            retry_count,
            resolved: false,
            resolution_timestamp: None,
        }
    }

    fn matches(&self, resource_id: &str, operation: &str) -> bool {
        self.resource_id == resource_id && self.operation == operation
    }
}

/// Shared, bounded log of error records.
///
/// The log is protected by a single mutex; construct one per process (or
/// per component) and share it via `Arc`. The only mutation applied to an
/// existing record is flipping `resolved` after a subsequent success for
/// the same key.
#[derive(Debug)]
pub struct ErrorLog {
    retention: Duration,
    records: Mutex<VecDeque<ErrorRecord>>,
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorLog {
    /// Create a log with the default 24-hour retention window.
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    /// Create a log with a custom retention window.
    pub fn with_retention(retention: Duration) -> Self {
        Self { retention, records: Mutex::new(VecDeque::new()) }
    }

    /// Append a record, pruning anything outside the retention window.
    pub fn record(&self, record: ErrorRecord) {
        let mut records = self.lock();
        prune(&mut records, Utc::now(), self.retention);
        records.push_back(record);
    }

    /// Mark every unresolved record for the key as resolved.
    ///
    /// Returns the number of records flipped.
    pub fn mark_resolved(&self, resource_id: &str, operation: &str) -> usize {
        let now = Utc::now();
        let mut records = self.lock();
        let mut flipped = 0;

        for record in records.iter_mut() {
            if !record.resolved && record.matches(resource_id, operation) {
                record.resolved = true;
                record.resolution_timestamp = Some(now);
                flipped += 1;
            }
        }

        flipped
    }

    /// Snapshot of all retained records, oldest first.
    pub fn snapshot(&self) -> Vec<ErrorRecord> {
        self.lock().iter().cloned().collect()
    }

    /// Retained records for a specific key, oldest first.
    pub fn records_for(&self, resource_id: &str, operation: &str) -> Vec<ErrorRecord> {
        self.lock().iter().filter(|r| r.matches(resource_id, operation)).cloned().collect()
    }

    /// Number of retained records that have not been resolved.
    pub fn unresolved_count(&self) -> usize {
        self.lock().iter().filter(|r| !r.resolved).count()
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the log holds no records.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ErrorRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("error log lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Drop records older than the retention window. Records are appended in
/// time order, so pruning only ever pops from the front.
fn prune(records: &mut VecDeque<ErrorRecord>, now: DateTime<Utc>, retention: Duration) {
    while let Some(front) = records.front() {
        let age = now.signed_duration_since(front.timestamp);
        let expired = age.to_std().map(|age| age > retention).unwrap_or(false);
        if expired {
            records.pop_front();
        } else {
            break;
        }
    }
}
