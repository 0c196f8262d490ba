// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The audit trail facade — the surface collaborators call.
//
// Writes go canonicalize → hash → append as one durable unit; reads and
// verification never see uncommitted state. Everything takes the stream
// scope explicitly.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use kettenwerk_core::config::TrailConfig;
use kettenwerk_core::error::Result;
use kettenwerk_core::types::{Checkpoint, EventInput, Link, StreamScope};
use kettenwerk_store::{AuditStore, SqliteAuditStore};

use crate::checkpoint::{CheckpointScheduler, run_checkpoint};
use crate::report::{TrailReport, export_report};
use crate::verify::{VerificationReport, VerifyOptions, verify_chain};

/// Tamper-evident audit trail over a durable store.
pub struct AuditTrail {
    store: Arc<dyn AuditStore>,
    config: TrailConfig,
}

impl AuditTrail {
    /// Open the trail over the SQLite database named in `config`.
    pub fn open(config: TrailConfig) -> Result<Self> {
        config.validate()?;
        let store = SqliteAuditStore::open_with_timeout(
            &config.db_path,
            Duration::from_millis(config.busy_timeout_ms),
        )?;
        Ok(Self {
            store: Arc::new(store),
            config,
        })
    }

    /// In-memory trail (useful for tests).
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            store: Arc::new(SqliteAuditStore::open_in_memory()?),
            config: TrailConfig::default(),
        })
    }

    /// Build a trail over an existing store.
    pub fn with_store(store: Arc<dyn AuditStore>, config: TrailConfig) -> Self {
        Self { store, config }
    }

    /// Shared handle to the underlying store.
    pub fn store(&self) -> Arc<dyn AuditStore> {
        Arc::clone(&self.store)
    }

    /// Record one audited event, returning its committed link.
    ///
    /// Returns only once the link is durably appended; a serialization
    /// failure rejects the event before anything is written, and a store
    /// failure must never be read as "the event was recorded".
    #[instrument(skip(self, event), fields(scope = %scope, action = %event.action))]
    pub fn record_event(&self, scope: &StreamScope, event: EventInput) -> Result<Link> {
        // into_record() materializes the snapshot; whatever the caller
        // does with its own structures afterwards cannot reach the hash.
        let record = event.into_record();
        let link = self.store.append(scope, &record)?;
        debug!(sequence = link.sequence, link_id = %link.link_id, "event recorded");
        Ok(link)
    }

    /// Read committed links `from_seq..=to_seq` of a scope.
    pub fn get_chain(&self, scope: &StreamScope, from_seq: u64, to_seq: u64) -> Result<Vec<Link>> {
        self.store.read_range(scope, from_seq, to_seq)
    }

    /// Verify a chain range (the whole chain by default).
    pub fn verify_chain(
        &self,
        scope: &StreamScope,
        from_seq: Option<u64>,
        to_seq: Option<u64>,
    ) -> Result<VerificationReport> {
        verify_chain(
            self.store.as_ref(),
            scope,
            &VerifyOptions {
                from_seq,
                to_seq,
                batch_size: self.config.verify_batch_size,
                cancel: None,
            },
        )
    }

    /// Verify up to the tip and persist a checkpoint on success.
    pub fn checkpoint(&self, scope: &StreamScope) -> Result<Option<Checkpoint>> {
        run_checkpoint(
            self.store.as_ref(),
            scope,
            &self.config.verifier_identity,
            self.config.verify_batch_size,
        )
    }

    /// The most recent checkpoint for a scope, if any.
    pub fn last_checkpoint(&self, scope: &StreamScope) -> Result<Option<Checkpoint>> {
        self.store.latest_checkpoint(scope)
    }

    /// The most recently committed link of a scope, if any.
    pub fn last_link(&self, scope: &StreamScope) -> Result<Option<Link>> {
        self.store.last_link(scope)
    }

    /// Every scope with at least one link.
    pub fn scopes(&self) -> Result<Vec<StreamScope>> {
        self.store.list_scopes()
    }

    /// Export a compliance summary for a range of a scope.
    pub fn export_report(
        &self,
        scope: &StreamScope,
        from_seq: u64,
        to_seq: u64,
    ) -> Result<TrailReport> {
        export_report(self.store.as_ref(), scope, from_seq, to_seq)
    }

    /// Spawn the periodic checkpoint job for this trail's store.
    pub fn start_checkpoint_scheduler(&self) -> CheckpointScheduler {
        CheckpointScheduler::start(Arc::clone(&self.store), self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kettenwerk_canon::{GENESIS_HASH, link_hash};
    use kettenwerk_core::error::IntegrityKind;
    use kettenwerk_core::types::RecordContext;
    use serde_json::json;

    fn scope(name: &str) -> StreamScope {
        StreamScope::new(name).unwrap()
    }

    fn billing_event(i: u64) -> EventInput {
        EventInput::new("invoice_create", "invoice")
            .entity_id(format!("INV-{i}"))
            .actor("billing-service")
            .changes(json!({"total": "19.99", "currency": "EUR", "seq": i}))
            .context(RecordContext {
                ip: Some("10.0.0.7".into()),
                user_agent: None,
                correlation_id: Some("550e8400-e29b-41d4-a716-446655440000".into()),
            })
            .occurred_at("2025-01-15T10:30:00Z".parse().unwrap())
    }

    /// Tamper with one stored column via direct SQL, bypassing the API.
    fn tamper(db: &std::path::Path, scope: &str, seq: u64, sql_set: &str) {
        let conn = rusqlite::Connection::open(db).unwrap();
        let changed = conn
            .execute(
                &format!("UPDATE links SET {sql_set} WHERE scope = ?1 AND sequence = ?2"),
                rusqlite::params![scope, seq as i64],
            )
            .unwrap();
        assert_eq!(changed, 1, "tamper statement must hit exactly one row");
    }

    #[test]
    fn worked_example_from_a_fresh_scope() {
        let trail = AuditTrail::in_memory().unwrap();
        let s = scope("billing");

        let first = trail.record_event(&s, billing_event(1)).unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(first.prev_chain_hash, GENESIS_HASH);
        assert_eq!(
            first.chain_hash,
            link_hash(GENESIS_HASH, first.payload.as_bytes())
        );

        let second = trail.record_event(&s, billing_event(2)).unwrap();
        assert_eq!(second.prev_chain_hash, first.chain_hash);

        let report = trail.verify_chain(&s, None, None).unwrap();
        assert!(report.ok);
        assert_eq!(report.links_checked, 2);
    }

    #[test]
    fn payload_tamper_is_caught_at_the_exact_link() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrailConfig {
            db_path: dir.path().join("audit.db"),
            ..Default::default()
        };
        let s = scope("billing");

        {
            let trail = AuditTrail::open(config.clone()).unwrap();
            for i in 1..=5 {
                trail.record_event(&s, billing_event(i)).unwrap();
            }
            assert!(trail.verify_chain(&s, None, None).unwrap().ok);
        }

        // Flip one character inside link 3's stored payload.
        tamper(
            &config.db_path,
            "billing",
            3,
            "payload = replace(payload, 'INV-3', 'INV-9')",
        );

        let trail = AuditTrail::open(config).unwrap();
        let report = trail.verify_chain(&s, None, None).unwrap();
        assert!(!report.ok);
        assert_eq!(report.first_break, Some(3));
        assert_eq!(report.reason, Some(IntegrityKind::HashMismatch));
    }

    #[test]
    fn chain_hash_tamper_is_caught_at_the_exact_link() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrailConfig {
            db_path: dir.path().join("audit.db"),
            ..Default::default()
        };
        let s = scope("billing");

        {
            let trail = AuditTrail::open(config.clone()).unwrap();
            for i in 1..=4 {
                trail.record_event(&s, billing_event(i)).unwrap();
            }
        }

        tamper(
            &config.db_path,
            "billing",
            2,
            "chain_hash = '1111111111111111111111111111111111111111111111111111111111111111'",
        );

        let trail = AuditTrail::open(config).unwrap();
        let report = trail.verify_chain(&s, None, None).unwrap();
        assert_eq!(report.first_break, Some(2));
        assert_eq!(report.reason, Some(IntegrityKind::HashMismatch));
    }

    #[test]
    fn prev_hash_tamper_is_a_chain_break() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrailConfig {
            db_path: dir.path().join("audit.db"),
            ..Default::default()
        };
        let s = scope("billing");

        {
            let trail = AuditTrail::open(config.clone()).unwrap();
            for i in 1..=4 {
                trail.record_event(&s, billing_event(i)).unwrap();
            }
        }

        tamper(
            &config.db_path,
            "billing",
            3,
            "prev_chain_hash = '2222222222222222222222222222222222222222222222222222222222222222'",
        );

        let trail = AuditTrail::open(config).unwrap();
        let report = trail.verify_chain(&s, None, None).unwrap();
        assert_eq!(report.first_break, Some(3));
        assert_eq!(report.reason, Some(IntegrityKind::ChainBreak));
    }

    #[test]
    fn deleted_link_is_a_chain_break_at_the_gap() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrailConfig {
            db_path: dir.path().join("audit.db"),
            ..Default::default()
        };
        let s = scope("billing");

        {
            let trail = AuditTrail::open(config.clone()).unwrap();
            for i in 1..=5 {
                trail.record_event(&s, billing_event(i)).unwrap();
            }
        }

        {
            let conn = rusqlite::Connection::open(&config.db_path).unwrap();
            conn.execute(
                "DELETE FROM links WHERE scope = 'billing' AND sequence = 3",
                [],
            )
            .unwrap();
        }

        let trail = AuditTrail::open(config).unwrap();
        let report = trail.verify_chain(&s, None, None).unwrap();
        assert_eq!(report.first_break, Some(3));
        assert_eq!(report.reason, Some(IntegrityKind::ChainBreak));
    }

    #[test]
    fn scopes_stay_isolated_under_interleaving() {
        let trail = AuditTrail::in_memory().unwrap();
        let billing = scope("billing");
        let orders = scope("orders");

        for i in 1..=3 {
            trail.record_event(&billing, billing_event(i)).unwrap();
            trail
                .record_event(&orders, EventInput::new("ship", "order").entity_id(format!("O-{i}")))
                .unwrap();
        }

        assert!(trail.verify_chain(&billing, None, None).unwrap().ok);
        assert!(trail.verify_chain(&orders, None, None).unwrap().ok);

        let billing_links = trail.get_chain(&billing, 1, u64::MAX).unwrap();
        let order_hashes: Vec<String> = trail
            .get_chain(&orders, 1, u64::MAX)
            .unwrap()
            .into_iter()
            .map(|l| l.chain_hash)
            .collect();
        assert!(
            billing_links
                .iter()
                .all(|l| !order_hashes.contains(&l.prev_chain_hash)),
            "billing links must never reference order hashes"
        );

        assert_eq!(
            trail
                .scopes()
                .unwrap()
                .iter()
                .map(StreamScope::as_str)
                .collect::<Vec<_>>(),
            vec!["billing", "orders"]
        );
    }

    #[test]
    fn checkpoint_round_trip_through_the_facade() {
        let trail = AuditTrail::in_memory().unwrap();
        let s = scope("billing");

        for i in 1..=4 {
            trail.record_event(&s, billing_event(i)).unwrap();
        }

        assert!(trail.last_checkpoint(&s).unwrap().is_none());
        let cp = trail.checkpoint(&s).unwrap().unwrap();
        assert_eq!(cp.last_verified_sequence, 4);
        assert_eq!(
            trail.last_checkpoint(&s).unwrap().unwrap().last_verified_hash,
            cp.last_verified_hash
        );

        // Checkpoint-seeded and genesis-seeded verification agree.
        let seeded = trail.verify_chain(&s, None, None).unwrap();
        let full = trail.verify_chain(&s, Some(1), None).unwrap();
        assert!(seeded.started_from_checkpoint);
        assert_eq!(seeded.ok, full.ok);
        assert_eq!(seeded.last_verified_hash, full.last_verified_hash);
    }

    #[test]
    fn secret_material_never_reaches_the_chain() {
        let trail = AuditTrail::in_memory().unwrap();
        let s = scope("billing");

        let err = trail
            .record_event(
                &s,
                EventInput::new("login", "user").changes(json!({"password": "hunter2"})),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            kettenwerk_core::error::KettenwerkError::Serialization { .. }
        ));
        assert!(trail.get_chain(&s, 1, u64::MAX).unwrap().is_empty());
    }

    #[test]
    fn report_includes_verification_outcome() {
        let trail = AuditTrail::in_memory().unwrap();
        let s = scope("billing");
        for i in 1..=3 {
            trail.record_event(&s, billing_event(i)).unwrap();
        }

        let report = trail.export_report(&s, 1, u64::MAX).unwrap();
        assert_eq!(report.entry_count, 3);
        assert_eq!(report.actions["invoice_create"], 3);
        assert_eq!(report.actors["billing-service"], 3);
        assert!(report.verification.ok);
    }
}
