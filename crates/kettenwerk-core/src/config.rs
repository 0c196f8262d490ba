// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Trail configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{KettenwerkError, Result};

/// Persistent settings for the audit trail subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailConfig {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// How long an append waits on a locked database before giving up
    /// with a retryable contention error.
    pub busy_timeout_ms: u64,
    /// Number of links read per batch during verification.
    pub verify_batch_size: usize,
    /// Interval between periodic checkpoint runs.
    pub checkpoint_interval_secs: u64,
    /// Identity recorded on checkpoints produced by this process.
    pub verifier_identity: String,
}

impl TrailConfig {
    /// Check invariants before a trail is opened over this configuration.
    pub fn validate(&self) -> Result<()> {
        if self.verify_batch_size == 0 {
            return Err(KettenwerkError::Config(
                "verify_batch_size must be at least 1".into(),
            ));
        }
        if self.verifier_identity.is_empty() {
            return Err(KettenwerkError::Config(
                "verifier_identity must not be empty".into(),
            ));
        }
        Ok(())
    }
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("kettenwerk.db"),
            busy_timeout_ms: 5_000,
            verify_batch_size: 256,
            checkpoint_interval_secs: 300,
            verifier_identity: "kettenwerk".to_string(),
        }
    }
}
