// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Kettenwerk — Durable, ordered, append-only persistence of chain links.

use kettenwerk_core::error::Result;
use kettenwerk_core::types::{AuditRecord, Checkpoint, Link, StreamScope};

pub mod sqlite;

pub use sqlite::SqliteAuditStore;

/// Storage backend for audit chains.
///
/// Implementations must be thread-safe and must make `append` a single
/// linearizable unit per scope: read the last committed link for that
/// scope, compute the next link, write it — with no window for a second
/// writer on the same scope to interleave. Reads always come from
/// committed state, never from a cache that can lag an append.
pub trait AuditStore: Send + Sync {
    /// Append a record to the scope's chain, returning the committed link.
    ///
    /// Canonicalization failures are caller errors raised before any
    /// write; contention surfaces as `ConcurrencyConflict` (the whole
    /// operation is safe to retry); there is no partial-success state.
    fn append(&self, scope: &StreamScope, record: &AuditRecord) -> Result<Link>;

    /// Read committed links with `from_seq <= sequence <= to_seq`,
    /// ordered by sequence ascending.
    fn read_range(&self, scope: &StreamScope, from_seq: u64, to_seq: u64) -> Result<Vec<Link>>;

    /// The most recently committed link of the scope, if any.
    fn last_link(&self, scope: &StreamScope) -> Result<Option<Link>>;

    /// Highest committed sequence number for the scope.
    fn tip_sequence(&self, scope: &StreamScope) -> Result<Option<u64>>;

    /// Number of committed links in the scope.
    fn link_count(&self, scope: &StreamScope) -> Result<u64>;

    /// Every scope that has at least one link, sorted.
    fn list_scopes(&self) -> Result<Vec<StreamScope>>;

    /// The checkpoint with the highest verified sequence for the scope.
    fn latest_checkpoint(&self, scope: &StreamScope) -> Result<Option<Checkpoint>>;

    /// Persist a checkpoint. Checkpoints are insert-only: re-recording an
    /// existing position is a no-op, and nothing ever updates one in
    /// place.
    fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()>;
}
