// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operator-facing error messages.
//
// Every technical error is mapped to a plain-language summary with a
// concrete next step. The severity taxonomy drives alerting: integrity
// violations are incidents, not errors to be retried away.

use crate::error::KettenwerkError;

/// Severity of an error from the operator's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Contention or a transient outage — retry is reasonable.
    Transient,
    /// The caller must fix its input before trying again.
    ActionRequired,
    /// Cannot be fixed by retrying — configuration or environment problem.
    Permanent,
    /// Evidence of tampering — page someone, preserve the database.
    SecurityIncident,
}

/// A plain-language error with an actionable suggestion.
#[derive(Debug, Clone)]
pub struct OperatorError {
    /// One-line summary (shown as a heading or alert title).
    pub message: String,
    /// What the operator or caller should do next.
    pub suggestion: String,
    /// Whether the system may auto-retry the same operation.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `KettenwerkError` into operator guidance.
pub fn explain(err: &KettenwerkError) -> OperatorError {
    match err {
        KettenwerkError::Serialization { path, reason } => OperatorError {
            message: "An event was rejected before it was written.".into(),
            suggestion: if path.is_empty() {
                format!("The event could not be serialized deterministically: {reason}. Fix the producing code and resubmit.")
            } else {
                format!("Field '{path}' cannot be audited: {reason}. Fix the producing code and resubmit — nothing was recorded.")
            },
            retriable: false,
            severity: Severity::ActionRequired,
        },

        KettenwerkError::InvalidScope(detail) => OperatorError {
            message: "The stream scope is not usable.".into(),
            suggestion: format!(
                "Pass an explicit, non-empty scope identifier ({detail}). There is no default scope."
            ),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        KettenwerkError::ConcurrencyConflict(detail) => OperatorError {
            message: "Two writers hit the same chain at once.".into(),
            suggestion: format!(
                "Retry the whole append — it either fully committed or did not happen. ({detail})"
            ),
            retriable: true,
            severity: Severity::Transient,
        },

        KettenwerkError::StoreUnavailable(detail) => OperatorError {
            message: "The audit database could not be reached.".into(),
            suggestion: format!(
                "The event was NOT recorded. Do not treat this as success — the underlying action \
                 may still have happened. Check the database path and disk, then retry. ({detail})"
            ),
            retriable: false,
            severity: Severity::Permanent,
        },

        KettenwerkError::IntegrityViolation {
            scope, sequence, kind,
        } => OperatorError {
            message: format!("The audit chain for '{scope}' fails verification at entry {sequence}."),
            suggestion: format!(
                "This is tamper evidence ({kind}), not a bug to retry. Preserve the database file \
                 as-is, raise a security incident, and decide per policy whether to halt further \
                 writes to this scope."
            ),
            retriable: false,
            severity: Severity::SecurityIncident,
        },

        KettenwerkError::Io(detail) => OperatorError {
            message: "A file operation failed.".into(),
            suggestion: format!("Check permissions and free space, then retry. ({detail})"),
            retriable: true,
            severity: Severity::Transient,
        },

        KettenwerkError::Config(detail) => OperatorError {
            message: "The trail configuration is invalid.".into(),
            suggestion: format!("Fix the configuration and restart. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },
    }
}
