// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Chain verification — replay stored links, recompute every hash, report
// the first divergence.
//
// The verifier trusts nothing but the genesis constant and (optionally) a
// previously-verified checkpoint: payload bytes are re-derived from the
// stored canonical text, the chain hash is recomputed from the expected
// previous hash, and the walk stops at the first failure. It never heals
// a break or continues past one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use kettenwerk_canon::{GENESIS_HASH, canonicalize, link_hash};
use kettenwerk_core::error::{IntegrityKind, KettenwerkError, Result};
use kettenwerk_core::types::{Link, StreamScope};
use kettenwerk_store::AuditStore;

/// Cooperative cancellation for long verification runs.
///
/// Verification is read-only, so cancelling between links has no side
/// effects; the periodic checkpoint job uses this to shut down promptly.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Options controlling one verification run.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// First sequence to verify. `None` starts from a checkpoint when one
    /// exists, else from genesis.
    pub from_seq: Option<u64>,
    /// Last sequence to verify (inclusive). `None` runs to the tip.
    pub to_seq: Option<u64>,
    /// Links read per batch; 0 falls back to 256.
    pub batch_size: usize,
    pub cancel: Option<CancelToken>,
}

/// Outcome of a verification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub scope: StreamScope,
    /// True only when every link in the requested range verified clean.
    pub ok: bool,
    /// Sequence of the first failing link, when `ok` is false.
    pub first_break: Option<u64>,
    pub reason: Option<IntegrityKind>,
    pub links_checked: u64,
    /// First sequence actually examined.
    pub from_sequence: u64,
    /// Last sequence that verified clean, when any did.
    pub last_verified_sequence: Option<u64>,
    /// Chain hash of the last clean link.
    pub last_verified_hash: Option<String>,
    /// Whether the expected previous hash was seeded from a checkpoint.
    pub started_from_checkpoint: bool,
    /// True when the run was cancelled before reaching the end of the
    /// range; implies `ok == false` with no break recorded.
    pub cancelled: bool,
}

impl VerificationReport {
    fn clean(scope: StreamScope, from: u64, from_checkpoint: bool) -> Self {
        Self {
            scope,
            ok: true,
            first_break: None,
            reason: None,
            links_checked: 0,
            from_sequence: from,
            last_verified_sequence: None,
            last_verified_hash: None,
            started_from_checkpoint: from_checkpoint,
            cancelled: false,
        }
    }

    fn fail(mut self, sequence: u64, reason: IntegrityKind) -> Self {
        self.ok = false;
        self.first_break = Some(sequence);
        self.reason = Some(reason);
        self
    }

    /// Turn a failed report into the matching hard error; clean and
    /// cancelled reports pass through.
    pub fn into_result(self) -> Result<Self> {
        match (self.ok, self.cancelled, self.first_break, self.reason) {
            (false, false, Some(sequence), Some(kind)) => {
                Err(KettenwerkError::IntegrityViolation {
                    scope: self.scope.as_str().to_string(),
                    sequence,
                    kind,
                })
            }
            _ => Ok(self),
        }
    }
}

/// Where a verification walk starts.
enum Seed {
    /// Nothing to verify; the range is empty or past the tip.
    Empty,
    /// Start at `sequence` expecting `prev_hash` before it.
    At {
        sequence: u64,
        prev_hash: String,
        from_checkpoint: bool,
    },
    /// The requested start has no predecessor row — structural break.
    MissingPredecessor { sequence: u64 },
}

fn seed(store: &dyn AuditStore, scope: &StreamScope, opts: &VerifyOptions) -> Result<Seed> {
    if let Some(from) = opts.from_seq {
        if from <= 1 {
            return Ok(Seed::At {
                sequence: 1,
                prev_hash: GENESIS_HASH.to_string(),
                from_checkpoint: false,
            });
        }
        // An explicit mid-chain start trusts the stored hash of the
        // predecessor; only checkpoint seeds are previously *verified*.
        return match store.read_range(scope, from - 1, from - 1)?.pop() {
            Some(prev) => Ok(Seed::At {
                sequence: from,
                prev_hash: prev.chain_hash,
                from_checkpoint: false,
            }),
            None => match store.tip_sequence(scope)? {
                // Nothing at or after the requested start: empty run.
                Some(tip) if tip >= from => Ok(Seed::MissingPredecessor { sequence: from - 1 }),
                _ => Ok(Seed::Empty),
            },
        };
    }

    if let Some(cp) = store.latest_checkpoint(scope)? {
        return Ok(Seed::At {
            sequence: cp.last_verified_sequence + 1,
            prev_hash: cp.last_verified_hash,
            from_checkpoint: true,
        });
    }

    Ok(Seed::At {
        sequence: 1,
        prev_hash: GENESIS_HASH.to_string(),
        from_checkpoint: false,
    })
}

/// Recompute the canonical bytes of a stored payload.
///
/// A stored payload that no longer parses or canonicalizes cannot
/// reproduce its stored hash, so the caller reports it as a hash
/// mismatch rather than a store error.
fn recanonicalize(link: &Link) -> Result<Vec<u8>> {
    let value = serde_json::from_str(&link.payload).map_err(|e| {
        KettenwerkError::Serialization {
            path: String::new(),
            reason: e.to_string(),
        }
    })?;
    canonicalize(&value).map(String::into_bytes)
}

/// Verify a chain (or a sub-range of it) against recomputation.
///
/// Read-only and lock-free: it walks committed links in batches and may
/// be cancelled between links without side effects.
#[instrument(skip(store, opts), fields(scope = %scope))]
pub fn verify_chain(
    store: &dyn AuditStore,
    scope: &StreamScope,
    opts: &VerifyOptions,
) -> Result<VerificationReport> {
    let batch_size = if opts.batch_size == 0 { 256 } else { opts.batch_size };
    let end = opts.to_seq.unwrap_or(u64::MAX);

    let (mut expected_seq, mut expected_prev, from_checkpoint) =
        match seed(store, scope, opts)? {
            Seed::Empty => {
                return Ok(VerificationReport::clean(
                    scope.clone(),
                    opts.from_seq.unwrap_or(1),
                    false,
                ));
            }
            Seed::MissingPredecessor { sequence } => {
                warn!(sequence, "verification start has no predecessor");
                return Ok(VerificationReport::clean(scope.clone(), sequence, false)
                    .fail(sequence, IntegrityKind::ChainBreak));
            }
            Seed::At {
                sequence,
                prev_hash,
                from_checkpoint,
            } => (sequence, prev_hash, from_checkpoint),
        };

    let mut report = VerificationReport::clean(scope.clone(), expected_seq, from_checkpoint);

    while expected_seq <= end {
        let batch_end = expected_seq.saturating_add(batch_size as u64 - 1).min(end);
        let batch = store.read_range(scope, expected_seq, batch_end)?;
        if batch.is_empty() {
            break; // reached the committed tip
        }

        for link in batch {
            if let Some(cancel) = &opts.cancel {
                if cancel.is_cancelled() {
                    debug!(sequence = expected_seq, "verification cancelled");
                    report.ok = false;
                    report.cancelled = true;
                    return Ok(report);
                }
            }

            // A missing sequence number is a structural discontinuity at
            // the position that should have held it.
            if link.sequence != expected_seq {
                warn!(expected = expected_seq, found = link.sequence, "sequence gap");
                return Ok(report.fail(expected_seq, IntegrityKind::ChainBreak));
            }

            // Recompute the hash from the expected previous hash and the
            // re-derived canonical bytes; any divergence (including a
            // payload that no longer canonicalizes) is a hash mismatch.
            match recanonicalize(&link) {
                Ok(bytes) => {
                    let recomputed = link_hash(&expected_prev, &bytes);
                    if recomputed != link.chain_hash {
                        warn!(sequence = link.sequence, "stored hash diverges from recomputation");
                        return Ok(report.fail(link.sequence, IntegrityKind::HashMismatch));
                    }
                }
                Err(_) => {
                    warn!(sequence = link.sequence, "stored payload no longer canonicalizes");
                    return Ok(report.fail(link.sequence, IntegrityKind::HashMismatch));
                }
            }

            // Stored linkage must agree with what we actually chained on.
            if link.prev_chain_hash != expected_prev {
                warn!(sequence = link.sequence, "stored previous hash diverges");
                return Ok(report.fail(link.sequence, IntegrityKind::ChainBreak));
            }

            expected_prev = link.chain_hash;
            report.links_checked += 1;
            report.last_verified_sequence = Some(link.sequence);
            report.last_verified_hash = Some(expected_prev.clone());
            expected_seq += 1;
        }
    }

    info!(
        links = report.links_checked,
        from_checkpoint, "chain verified clean"
    );
    Ok(report)
}
