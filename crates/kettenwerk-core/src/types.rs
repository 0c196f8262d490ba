// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Kettenwerk audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{KettenwerkError, Result};

/// Maximum accepted length for a stream scope identifier.
const MAX_SCOPE_LEN: usize = 128;

/// The logical partition over which one hash chain is computed.
///
/// Every chain-touching operation takes the scope as an explicit parameter.
/// There is deliberately no "default" or "global" scope — an append that
/// does not name its chain cannot silently attach to the wrong one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamScope(String);

impl StreamScope {
    /// Validate and wrap a scope identifier.
    ///
    /// Scopes must be non-empty, at most 128 bytes, and free of whitespace
    /// and control characters, so they survive round trips through SQL,
    /// JSON, and log lines unaltered.
    pub fn new(scope: impl Into<String>) -> Result<Self> {
        let scope = scope.into();
        if scope.is_empty() {
            return Err(KettenwerkError::InvalidScope("scope is empty".into()));
        }
        if scope.len() > MAX_SCOPE_LEN {
            return Err(KettenwerkError::InvalidScope(format!(
                "scope exceeds {MAX_SCOPE_LEN} bytes"
            )));
        }
        if scope.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(KettenwerkError::InvalidScope(
                "scope contains whitespace or control characters".into(),
            ));
        }
        Ok(Self(scope))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a persisted link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkId(pub Uuid);

impl LinkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request context captured alongside an audited event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// The logical input to the trail: one immutable audited event.
///
/// Omitted optional fields are skipped entirely during serialization so the
/// canonical payload never carries explicit nulls for absent data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Short verb describing the operation (e.g. `"invoice_create"`).
    pub action: String,
    /// Kind of entity acted upon (e.g. `"invoice"`).
    pub entity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Fully-materialized snapshot of the changed data. Callers must pass
    /// an owned value — never a view into a structure that keeps mutating
    /// after the hash is taken.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RecordContext>,
    /// When the audited event happened (UTC).
    pub occurred_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Convert to a JSON tree for canonicalization.
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| KettenwerkError::Serialization {
            path: String::new(),
            reason: e.to_string(),
        })
    }
}

/// One persisted element of a hash chain.
///
/// `payload` holds the canonical serialization of the [`AuditRecord`]
/// exactly as it was hashed; verification re-derives the bytes from this
/// column rather than trusting any cached form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub link_id: LinkId,
    pub scope: StreamScope,
    /// Monotonic, gapless position within the scope, starting at 1.
    pub sequence: u64,
    /// Canonical record bytes (valid UTF-8 JSON).
    pub payload: String,
    /// `SHA256(prev_chain_hash ∥ payload)`, lowercase hex.
    pub chain_hash: String,
    /// The previous link's `chain_hash`, or the genesis constant at
    /// sequence 1.
    pub prev_chain_hash: String,
    /// Server-side commit timestamp.
    pub recorded_at: DateTime<Utc>,
}

impl Link {
    /// Parse the stored payload back into the logical record.
    pub fn record(&self) -> Result<AuditRecord> {
        serde_json::from_str(&self.payload).map_err(|e| KettenwerkError::Serialization {
            path: String::new(),
            reason: format!("stored payload is not a valid record: {e}"),
        })
    }
}

/// A verified chain position; bounds re-verification cost.
///
/// Checkpoints are a performance optimization, not a trust boundary:
/// deleting every checkpoint loses nothing but verification time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub scope: StreamScope,
    pub last_verified_sequence: u64,
    pub last_verified_hash: String,
    pub verified_at: DateTime<Utc>,
    pub verifier_identity: String,
}

/// Caller-facing event description accepted by `record_event`.
#[derive(Debug, Clone)]
pub struct EventInput {
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub changes: Option<Value>,
    pub actor_id: Option<String>,
    pub context: Option<RecordContext>,
    /// Defaults to the current instant when not supplied.
    pub occurred_at: Option<DateTime<Utc>>,
}

impl EventInput {
    pub fn new(action: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: None,
            changes: None,
            actor_id: None,
            context: None,
            occurred_at: None,
        }
    }

    pub fn entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    pub fn changes(mut self, changes: Value) -> Self {
        self.changes = Some(changes);
        self
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn context(mut self, context: RecordContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }

    /// Materialize into an immutable record, stamping `occurred_at` if the
    /// caller did not supply one.
    pub fn into_record(self) -> AuditRecord {
        AuditRecord {
            action: self.action,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            changes: self.changes,
            actor_id: self.actor_id,
            context: self.context,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_accepts_reasonable_identifiers() {
        for s in ["billing", "tenant-42", "orders.eu", "a:b/c"] {
            assert!(StreamScope::new(s).is_ok(), "rejected {s}");
        }
    }

    #[test]
    fn scope_rejects_empty_and_whitespace() {
        assert!(StreamScope::new("").is_err());
        assert!(StreamScope::new("two words").is_err());
        assert!(StreamScope::new("tab\there").is_err());
        assert!(StreamScope::new("x".repeat(129)).is_err());
    }

    #[test]
    fn record_serialization_skips_absent_fields() {
        let record = EventInput::new("invoice_create", "invoice").into_record();
        let value = record.to_value().unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("action"));
        assert!(!obj.contains_key("entity_id"));
        assert!(!obj.contains_key("changes"));
        assert!(!obj.contains_key("actor_id"));
        assert!(!obj.contains_key("context"));
    }

    #[test]
    fn event_input_builder_round_trip() {
        let record = EventInput::new("update", "order")
            .entity_id("ORD-7")
            .actor("user-1")
            .changes(serde_json::json!({"status": "shipped"}))
            .into_record();

        assert_eq!(record.action, "update");
        assert_eq!(record.entity_id.as_deref(), Some("ORD-7"));
        assert_eq!(record.actor_id.as_deref(), Some("user-1"));
        assert!(record.changes.is_some());
    }

    #[test]
    fn link_payload_parses_back_to_record() {
        let record = EventInput::new("create", "invoice")
            .entity_id("INV-1")
            .into_record();
        let payload = serde_json::to_string(&record).unwrap();

        let link = Link {
            link_id: LinkId::new(),
            scope: StreamScope::new("billing").unwrap(),
            sequence: 1,
            payload,
            chain_hash: "0".repeat(64),
            prev_chain_hash: "0".repeat(64),
            recorded_at: Utc::now(),
        };

        let parsed = link.record().unwrap();
        assert_eq!(parsed.action, "create");
        assert_eq!(parsed.entity_id.as_deref(), Some("INV-1"));
    }
}
