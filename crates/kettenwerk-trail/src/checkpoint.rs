// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Checkpoint management.
//
// A checkpoint records a verified chain position so routine verification
// only replays the suffix. Checkpoints are an optimization, never a trust
// boundary: deleting them all costs verification time, not detectability.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use kettenwerk_core::config::TrailConfig;
use kettenwerk_core::error::{KettenwerkError, Result};
use kettenwerk_core::types::{Checkpoint, StreamScope};
use kettenwerk_store::AuditStore;

use crate::verify::{VerifyOptions, verify_chain};

/// Verify from the last checkpoint to the tip and, on full success with
/// progress, persist a new checkpoint.
///
/// Returns the effective checkpoint: the freshly persisted one, the
/// existing one when the tip has not moved, or `None` for an empty chain.
/// A verification failure surfaces as `IntegrityViolation` and persists
/// nothing. Idempotent, and safe to run concurrently with appends since
/// it only reads committed links.
#[instrument(skip(store), fields(scope = %scope))]
pub fn run_checkpoint(
    store: &dyn AuditStore,
    scope: &StreamScope,
    verifier_identity: &str,
    batch_size: usize,
) -> Result<Option<Checkpoint>> {
    let report = verify_chain(
        store,
        scope,
        &VerifyOptions {
            batch_size,
            ..Default::default()
        },
    )?
    .into_result()?;

    if report.cancelled {
        return Ok(None);
    }

    let (Some(sequence), Some(hash)) =
        (report.last_verified_sequence, report.last_verified_hash)
    else {
        // Nothing newly verified: reuse the existing checkpoint if any.
        return store.latest_checkpoint(scope);
    };

    let checkpoint = Checkpoint {
        scope: scope.clone(),
        last_verified_sequence: sequence,
        last_verified_hash: hash,
        verified_at: Utc::now(),
        verifier_identity: verifier_identity.to_string(),
    };
    store.put_checkpoint(&checkpoint)?;

    info!(sequence, "checkpoint advanced");
    Ok(Some(checkpoint))
}

/// Periodic checkpoint job covering every known scope.
///
/// Runs on the tokio runtime; store work happens on blocking threads.
/// Shutdown is checked between scopes, so cancellation never interrupts a
/// checkpoint mid-write.
pub struct CheckpointScheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CheckpointScheduler {
    /// Spawn the periodic job. The first pass runs immediately.
    pub fn start(store: Arc<dyn AuditStore>, config: TrailConfig) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(store, config, rx));
        Self { shutdown, handle }
    }

    /// Request shutdown and wait for the job to finish its current step.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

async fn run_loop(store: Arc<dyn AuditStore>, config: TrailConfig, mut rx: watch::Receiver<bool>) {
    let period = Duration::from_secs(config.checkpoint_interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = rx.changed() => {
                if *rx.borrow() {
                    debug!("checkpoint scheduler stopping");
                    return;
                }
                continue;
            }
        }

        let scopes = {
            let store = Arc::clone(&store);
            match tokio::task::spawn_blocking(move || store.list_scopes()).await {
                Ok(Ok(scopes)) => scopes,
                Ok(Err(e)) => {
                    warn!(error = %e, "could not list scopes for checkpointing");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "checkpoint scope listing panicked");
                    continue;
                }
            }
        };

        for scope in scopes {
            if *rx.borrow() {
                debug!("checkpoint scheduler stopping between scopes");
                return;
            }

            let store = Arc::clone(&store);
            let identity = config.verifier_identity.clone();
            let batch = config.verify_batch_size;
            let task_scope = scope.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                run_checkpoint(store.as_ref(), &task_scope, &identity, batch)
            })
            .await;

            match outcome {
                Ok(Ok(_)) => {}
                Ok(Err(e @ KettenwerkError::IntegrityViolation { .. })) => {
                    // Tamper evidence: keep running (other scopes still
                    // deserve checkpoints) but make sure this is loud.
                    error!(scope = %scope, error = %e, "integrity violation during checkpointing");
                }
                Ok(Err(e)) => {
                    warn!(scope = %scope, error = %e, "checkpoint attempt failed");
                }
                Err(e) => {
                    warn!(scope = %scope, error = %e, "checkpoint task panicked");
                }
            }
        }
    }
}
