// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SQLite-backed audit store.
//
// Two append-only tables: `links` (the chains themselves) and
// `checkpoints` (verified positions). The append path runs as one
// IMMEDIATE transaction so that "read last link for this scope → hash →
// insert" is a single linearizable unit; every query that touches a chain
// carries the scope in its WHERE clause.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use kettenwerk_canon::{GENESIS_HASH, canonicalize_record, is_chain_digest, link_hash};
use kettenwerk_core::error::{KettenwerkError, Result};
use kettenwerk_core::types::{AuditRecord, Checkpoint, Link, LinkId, StreamScope};

use crate::AuditStore;

/// SQLite schema for the chain tables.
const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS links (
        scope           TEXT    NOT NULL,
        sequence        INTEGER NOT NULL,
        link_id         TEXT    NOT NULL,
        payload         TEXT    NOT NULL,
        chain_hash      TEXT    NOT NULL,
        prev_chain_hash TEXT    NOT NULL,
        recorded_at     TEXT    NOT NULL,
        PRIMARY KEY (scope, sequence),
        UNIQUE (scope, chain_hash)
    );
    CREATE TABLE IF NOT EXISTS checkpoints (
        scope       TEXT    NOT NULL,
        sequence    INTEGER NOT NULL,
        chain_hash  TEXT    NOT NULL,
        verified_at TEXT    NOT NULL,
        verifier    TEXT    NOT NULL,
        PRIMARY KEY (scope, sequence)
    );
"#;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Convert a `rusqlite::Error` into the matching taxonomy variant.
///
/// Lock contention is retryable; everything else means the durable store
/// failed and the caller must not pretend the event was recorded.
fn db_err(e: rusqlite::Error) -> KettenwerkError {
    use rusqlite::ErrorCode::{DatabaseBusy, DatabaseLocked};
    match &e {
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == DatabaseBusy || inner.code == DatabaseLocked =>
        {
            KettenwerkError::ConcurrencyConflict(e.to_string())
        }
        _ => KettenwerkError::StoreUnavailable(e.to_string()),
    }
}

/// Append-only audit store backed by a SQLite database.
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    /// Open (or create) the audit database at `path`.
    ///
    /// WAL mode is enabled so verification and report reads never block
    /// behind an in-flight append.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open with an explicit busy timeout for append contention.
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(db_err)?;
        conn.busy_timeout(busy_timeout).map_err(db_err)?;
        conn.execute_batch(CREATE_TABLES_SQL).map_err(db_err)?;

        info!("audit store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLES_SQL).map_err(db_err)?;

        debug!("in-memory audit store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| KettenwerkError::StoreUnavailable("connection mutex poisoned".into()))
    }
}

/// Map one `links` row (selected in schema column order) to a `Link`.
fn row_to_link(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawLink> {
    Ok(RawLink {
        scope: row.get(0)?,
        sequence: row.get::<_, i64>(1)?,
        link_id: row.get(2)?,
        payload: row.get(3)?,
        chain_hash: row.get(4)?,
        prev_chain_hash: row.get(5)?,
        recorded_at: row.get(6)?,
    })
}

/// Row image before field-level parsing.
struct RawLink {
    scope: String,
    sequence: i64,
    link_id: String,
    payload: String,
    chain_hash: String,
    prev_chain_hash: String,
    recorded_at: String,
}

impl RawLink {
    fn into_link(self) -> Result<Link> {
        let corrupt = |what: &str| {
            KettenwerkError::StoreUnavailable(format!(
                "corrupt link row (scope '{}', sequence {}): bad {what}",
                self.scope, self.sequence
            ))
        };

        let link_id = Uuid::parse_str(&self.link_id).map_err(|_| corrupt("link_id"))?;
        let recorded_at = DateTime::parse_from_rfc3339(&self.recorded_at)
            .map_err(|_| corrupt("recorded_at"))?
            .with_timezone(&Utc);
        let sequence = u64::try_from(self.sequence).map_err(|_| corrupt("sequence"))?;
        let scope = StreamScope::new(&self.scope)?;

        Ok(Link {
            link_id: LinkId(link_id),
            scope,
            sequence,
            payload: self.payload,
            chain_hash: self.chain_hash,
            prev_chain_hash: self.prev_chain_hash,
            recorded_at,
        })
    }
}

fn seq_param(seq: u64) -> i64 {
    i64::try_from(seq).unwrap_or(i64::MAX)
}

impl AuditStore for SqliteAuditStore {
    #[instrument(skip(self, record), fields(scope = %scope, action = %record.action))]
    fn append(&self, scope: &StreamScope, record: &AuditRecord) -> Result<Link> {
        // Canonicalization rejects bad input before anything touches the
        // database; the payload string below is exactly what gets hashed.
        let payload = canonicalize_record(record)?;

        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        // The previous link MUST be scoped — an unfiltered "latest row"
        // read here would attach this record to whichever chain happened
        // to commit last.
        let prev: Option<(i64, String)> = tx
            .query_row(
                "SELECT sequence, chain_hash FROM links
                 WHERE scope = ?1
                 ORDER BY sequence DESC
                 LIMIT 1",
                params![scope.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;

        let (sequence, prev_chain_hash) = match prev {
            Some((seq, hash)) => (seq + 1, hash),
            None => (1, GENESIS_HASH.to_string()),
        };

        let chain_hash = link_hash(&prev_chain_hash, payload.as_bytes());
        let link_id = LinkId::new();
        let recorded_at = Utc::now();

        tx.execute(
            "INSERT INTO links
                 (scope, sequence, link_id, payload, chain_hash, prev_chain_hash, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                scope.as_str(),
                sequence,
                link_id.to_string(),
                payload,
                chain_hash,
                prev_chain_hash,
                recorded_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;

        debug!(sequence, "link appended");
        Ok(Link {
            link_id,
            scope: scope.clone(),
            sequence: sequence as u64,
            payload,
            chain_hash,
            prev_chain_hash,
            recorded_at,
        })
    }

    fn read_range(&self, scope: &StreamScope, from_seq: u64, to_seq: u64) -> Result<Vec<Link>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT scope, sequence, link_id, payload, chain_hash, prev_chain_hash, recorded_at
                 FROM links
                 WHERE scope = ?1 AND sequence BETWEEN ?2 AND ?3
                 ORDER BY sequence ASC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(
                params![scope.as_str(), seq_param(from_seq), seq_param(to_seq)],
                row_to_link,
            )
            .map_err(db_err)?;

        let mut links = Vec::new();
        for raw in rows {
            links.push(raw.map_err(db_err)?.into_link()?);
        }
        Ok(links)
    }

    fn last_link(&self, scope: &StreamScope) -> Result<Option<Link>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT scope, sequence, link_id, payload, chain_hash, prev_chain_hash, recorded_at
                 FROM links
                 WHERE scope = ?1
                 ORDER BY sequence DESC
                 LIMIT 1",
                params![scope.as_str()],
                row_to_link,
            )
            .optional()
            .map_err(db_err)?;

        raw.map(RawLink::into_link).transpose()
    }

    fn tip_sequence(&self, scope: &StreamScope) -> Result<Option<u64>> {
        let conn = self.lock()?;
        let tip: Option<i64> = conn
            .query_row(
                "SELECT MAX(sequence) FROM links WHERE scope = ?1",
                params![scope.as_str()],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(tip.map(|t| t as u64))
    }

    fn link_count(&self, scope: &StreamScope) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM links WHERE scope = ?1",
                params![scope.as_str()],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count as u64)
    }

    fn list_scopes(&self) -> Result<Vec<StreamScope>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT scope FROM links ORDER BY scope ASC")
            .map_err(db_err)?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?;

        let mut scopes = Vec::new();
        for name in rows {
            scopes.push(StreamScope::new(name.map_err(db_err)?)?);
        }
        Ok(scopes)
    }

    fn latest_checkpoint(&self, scope: &StreamScope) -> Result<Option<Checkpoint>> {
        let conn = self.lock()?;
        let row: Option<(i64, String, String, String)> = conn
            .query_row(
                "SELECT sequence, chain_hash, verified_at, verifier
                 FROM checkpoints
                 WHERE scope = ?1
                 ORDER BY sequence DESC
                 LIMIT 1",
                params![scope.as_str()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err)?;

        match row {
            None => Ok(None),
            Some((sequence, chain_hash, verified_at, verifier)) => {
                let verified_at = DateTime::parse_from_rfc3339(&verified_at)
                    .map_err(|_| {
                        KettenwerkError::StoreUnavailable(format!(
                            "corrupt checkpoint row (scope '{scope}', sequence {sequence})"
                        ))
                    })?
                    .with_timezone(&Utc);
                Ok(Some(Checkpoint {
                    scope: scope.clone(),
                    last_verified_sequence: sequence as u64,
                    last_verified_hash: chain_hash,
                    verified_at,
                    verifier_identity: verifier,
                }))
            }
        }
    }

    fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        // The checkpoints table is insert-only; a malformed hash would sit
        // there forever and poison every seeded verification after it.
        if !is_chain_digest(&checkpoint.last_verified_hash) {
            return Err(KettenwerkError::StoreUnavailable(format!(
                "refusing checkpoint with malformed hash for scope '{}'",
                checkpoint.scope
            )));
        }

        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO checkpoints
                 (scope, sequence, chain_hash, verified_at, verifier)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                checkpoint.scope.as_str(),
                seq_param(checkpoint.last_verified_sequence),
                checkpoint.last_verified_hash,
                checkpoint.verified_at.to_rfc3339(),
                checkpoint.verifier_identity,
            ],
        )
        .map_err(db_err)?;

        debug!(
            scope = %checkpoint.scope,
            sequence = checkpoint.last_verified_sequence,
            "checkpoint recorded"
        );
        Ok(())
    }
}
