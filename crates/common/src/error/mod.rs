//! Error classification and history.
//!
//! Two pieces cooperate here:
//!
//! 1. **Severity classification** (`severity`): a pure keyword matcher that
//!    buckets an error into critical/high/medium/low based on its type name
//!    and message. The bucket decides whether the retry executor attempts
//!    the operation again.
//!
//! 2. **Error history** (`history`): a bounded rolling log of structured
//!    [`ErrorRecord`]s. Records are appended on every caught failure and
//!    flipped to `resolved` when a later attempt for the same
//!    `(resource, operation)` key succeeds.

pub mod history;
pub mod severity;

pub use history::{ErrorLog, ErrorRecord, DEFAULT_RETENTION};
pub use severity::{classify, classify_error, Severity};
