// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Kettenwerk.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The two ways a stored chain can diverge from its recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityKind {
    /// The stored payload or hash disagrees with the recomputed hash.
    HashMismatch,
    /// Structural discontinuity: broken linkage or a missing sequence.
    ChainBreak,
}

impl std::fmt::Display for IntegrityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HashMismatch => write!(f, "hash_mismatch"),
            Self::ChainBreak => write!(f, "chain_break"),
        }
    }
}

/// Top-level error type for all Kettenwerk operations.
#[derive(Debug, Error)]
pub enum KettenwerkError {
    // -- Caller errors (rejected before any write) --
    #[error("cannot canonicalize field '{path}': {reason}")]
    Serialization { path: String, reason: String },

    #[error("invalid stream scope: {0}")]
    InvalidScope(String),

    // -- Append contention (safe to retry the whole operation) --
    #[error("append contention: {0}")]
    ConcurrencyConflict(String),

    // -- Durable store failures (hard failure, never silently dropped) --
    #[error("audit store unavailable: {0}")]
    StoreUnavailable(String),

    // -- Raised only by verification --
    #[error("integrity violation in scope '{scope}' at sequence {sequence}: {kind}")]
    IntegrityViolation {
        scope: String,
        sequence: u64,
        kind: IntegrityKind,
    },

    // -- Ambient --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl KettenwerkError {
    /// Whether retrying the same operation can reasonably succeed.
    ///
    /// Only append contention qualifies; everything else either needs a
    /// corrected input, an operator, or an incident response.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict(_))
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KettenwerkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_kind_display() {
        assert_eq!(IntegrityKind::HashMismatch.to_string(), "hash_mismatch");
        assert_eq!(IntegrityKind::ChainBreak.to_string(), "chain_break");
    }

    #[test]
    fn retriable_classification() {
        assert!(KettenwerkError::ConcurrencyConflict("busy".into()).is_retriable());
        assert!(!KettenwerkError::StoreUnavailable("gone".into()).is_retriable());
        assert!(
            !KettenwerkError::Serialization {
                path: "changes.amount".into(),
                reason: "float".into(),
            }
            .is_retriable()
        );
    }

    #[test]
    fn violation_message_names_scope_and_sequence() {
        let err = KettenwerkError::IntegrityViolation {
            scope: "billing".into(),
            sequence: 7,
            kind: IntegrityKind::ChainBreak,
        };
        let msg = err.to_string();
        assert!(msg.contains("billing"));
        assert!(msg.contains('7'));
        assert!(msg.contains("chain_break"));
    }
}
