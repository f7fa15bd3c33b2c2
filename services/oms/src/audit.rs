//! Append-only audit trail for order lifecycle events
//!
//! Every state machine action leaves one record. Records are never mutated
//! or deleted; replayed fills land here too, as a correctness signal.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use services_common::OrderId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Kind of audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditKind {
    /// Order created in `new`
    OrderCreated,
    /// Status transition applied
    StatusChanged,
    /// Fill applied and execution emitted
    FillApplied,
    /// Fill replay rejected as a duplicate
    DuplicateFillRejected,
    /// Amendment applied
    AmendApplied,
    /// Cancel requested (cancel-pending set)
    CancelRequested,
}

/// One immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Monotonic sequence across the whole trail
    pub sequence: u64,
    /// Order the action concerned
    pub order_id: OrderId,
    /// What happened
    pub kind: AuditKind,
    /// Structured action detail
    pub detail: Value,
    /// When the record was written
    pub recorded_at: DateTime<Utc>,
}

/// Append-only in-memory audit trail
#[derive(Default)]
pub struct AuditTrail {
    records: RwLock<Vec<AuditRecord>>,
    sequence: AtomicU64,
}

impl AuditTrail {
    /// Create an empty trail
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record
    pub fn record(&self, order_id: OrderId, kind: AuditKind, detail: Value) {
        let record = AuditRecord {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            order_id,
            kind,
            detail,
            recorded_at: Utc::now(),
        };
        self.records.write().push(record);
    }

    /// All records for one order, in sequence order
    #[must_use]
    pub fn for_order(&self, order_id: OrderId) -> Vec<AuditRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect()
    }

    /// All records of one kind, in sequence order
    #[must_use]
    pub fn of_kind(&self, kind: AuditKind) -> Vec<AuditRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    /// Records written inside `[after, before)`
    #[must_use]
    pub fn in_range(&self, after: DateTime<Utc>, before: DateTime<Utc>) -> Vec<AuditRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.recorded_at >= after && r.recorded_at < before)
            .cloned()
            .collect()
    }

    /// Number of records in the trail
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the trail is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
