//! Settlement attempt tracking
//!
//! Advances confirmed allocations to settled or documented failure on a
//! timeline of days, decoupled from trading. Attempt records are append-only:
//! a failed attempt keeps its record and a retry adds a fresh one with the
//! next attempt number, so the full history of every attempt stays
//! queryable.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use services_common::{AccountId, AllocationId, SettlementId};
use std::fmt;
use tracing::{info, warn};

use crate::allocation::{Allocation, AllocationStatus};
use crate::error::{PostTradeError, PostTradeResult};

/// Settlement tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Calendar days between confirmation and expected settlement (T+n)
    pub settlement_offset_days: i64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            settlement_offset_days: 2,
        }
    }
}

/// Settlement status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettlementStatus {
    /// Awaiting settlement on its expected date
    Pending,
    /// Cash and securities transferred (terminal)
    Settled,
    /// This attempt failed; a retry appends the next attempt (terminal)
    Failed,
}

impl SettlementStatus {
    /// Terminal states admit no further transitions
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Failed)
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Settled => "settled",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Custodian confirmation recorded when an attempt settles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementDetails {
    /// Settling custodian
    pub custodian: String,
    /// Custodian's settlement reference
    pub reference: String,
}

impl SettlementDetails {
    /// Create settlement details
    pub fn new(custodian: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            custodian: custodian.into(),
            reference: reference.into(),
        }
    }
}

/// One settlement attempt for one allocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRecord {
    /// Unique settlement ID
    pub id: SettlementId,
    /// Allocation being settled
    pub allocation_id: AllocationId,
    /// Destination account, denormalized for queries
    pub account_id: AccountId,
    /// Attempt number, 1-based; retries increment it
    pub attempt: u32,
    /// Settlement status
    pub status: SettlementStatus,
    /// Date the attempt is expected to settle
    pub settlement_date: DateTime<Utc>,
    /// Custodian confirmation once settled
    pub details: Option<SettlementDetails>,
    /// Why the attempt failed, if it did
    pub failure_reason: Option<String>,
    /// Operator notes attached on failure
    pub notes: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Filter for settlement queries; `None` fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementFilter {
    /// Match attempts for this allocation
    pub allocation_id: Option<AllocationId>,
    /// Match attempts for this account
    pub account_id: Option<AccountId>,
    /// Match attempts in this status
    pub status: Option<SettlementStatus>,
    /// Match attempts expected at or after this instant
    pub due_after: Option<DateTime<Utc>>,
    /// Match attempts expected before this instant
    pub due_before: Option<DateTime<Utc>>,
}

impl SettlementFilter {
    /// Whether `record` satisfies every set field
    #[must_use]
    pub fn matches(&self, record: &SettlementRecord) -> bool {
        if let Some(allocation_id) = self.allocation_id
            && record.allocation_id != allocation_id
        {
            return false;
        }
        if let Some(account_id) = &self.account_id
            && &record.account_id != account_id
        {
            return false;
        }
        if let Some(status) = self.status
            && record.status != status
        {
            return false;
        }
        if let Some(after) = self.due_after
            && record.settlement_date < after
        {
            return false;
        }
        if let Some(before) = self.due_before
            && record.settlement_date >= before
        {
            return false;
        }
        true
    }
}

#[derive(Default)]
struct SettlementStoreInner {
    records: Vec<SettlementRecord>,
    by_id: FxHashMap<SettlementId, usize>,
    by_allocation: FxHashMap<AllocationId, Vec<usize>>,
}

/// Settlement tracker over append-only attempt records
///
/// Driven entirely by explicit calls (external date triggers); nothing here
/// is invoked from the trading path.
pub struct SettlementTracker {
    config: SettlementConfig,
    inner: RwLock<SettlementStoreInner>,
}

impl Default for SettlementTracker {
    fn default() -> Self {
        Self::new(SettlementConfig::default())
    }
}

impl SettlementTracker {
    /// Create a tracker
    #[must_use]
    pub fn new(config: SettlementConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(SettlementStoreInner::default()),
        }
    }

    /// First settlement attempt for a confirmed allocation.
    ///
    /// The expected date is the confirmation instant plus the configured
    /// T+n offset. An allocation gets exactly one first attempt; further
    /// attempts come from [`retry`](Self::retry).
    pub fn create(&self, allocation: &Allocation) -> PostTradeResult<SettlementRecord> {
        let confirmed_at = match (allocation.status, allocation.confirmed_at) {
            (AllocationStatus::Confirmed, Some(at)) => at,
            _ => {
                return Err(PostTradeError::NotConfirmed {
                    allocation_id: allocation.id,
                    current_status: allocation.status,
                });
            }
        };

        let now = Utc::now();
        let record = SettlementRecord {
            id: SettlementId::new(),
            allocation_id: allocation.id,
            account_id: allocation.account_id.clone(),
            attempt: 1,
            status: SettlementStatus::Pending,
            settlement_date: confirmed_at + Duration::days(self.config.settlement_offset_days),
            details: None,
            failure_reason: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };

        let mut inner = self.inner.write();
        if inner.by_allocation.contains_key(&allocation.id) {
            return Err(PostTradeError::Validation {
                reason: format!(
                    "allocation {} already has settlement history, retry the latest attempt",
                    allocation.id
                ),
            });
        }
        Self::append(&mut inner, record.clone());
        drop(inner);

        info!(
            settlement_id = %record.id,
            allocation_id = %allocation.id,
            settlement_date = %record.settlement_date,
            "settlement attempt created"
        );
        Ok(record)
    }

    /// Pending to settled with the custodian's confirmation
    pub fn mark_settled(
        &self,
        settlement_id: SettlementId,
        details: SettlementDetails,
    ) -> PostTradeResult<SettlementRecord> {
        let mut inner = self.inner.write();
        let index = Self::index_of(&inner, settlement_id)?;
        let record = &mut inner.records[index];
        if record.status != SettlementStatus::Pending {
            return Err(PostTradeError::InvalidSettlementTransition {
                settlement_id,
                operation: "settled".to_string(),
                current_status: record.status,
            });
        }

        record.status = SettlementStatus::Settled;
        record.details = Some(details);
        record.updated_at = Utc::now();
        let snapshot = record.clone();
        drop(inner);

        info!(
            %settlement_id,
            allocation_id = %snapshot.allocation_id,
            attempt = snapshot.attempt,
            "settlement completed"
        );
        Ok(snapshot)
    }

    /// Pending to failed, terminal for this attempt only.
    ///
    /// The allocation itself stays settled-nowhere; surface the record and
    /// retry it when the blocking condition clears.
    pub fn mark_failed(
        &self,
        settlement_id: SettlementId,
        reason: impl Into<String>,
        notes: Option<String>,
    ) -> PostTradeResult<SettlementRecord> {
        let reason = reason.into();
        let mut inner = self.inner.write();
        let index = Self::index_of(&inner, settlement_id)?;
        let record = &mut inner.records[index];
        if record.status != SettlementStatus::Pending {
            return Err(PostTradeError::InvalidSettlementTransition {
                settlement_id,
                operation: "failed".to_string(),
                current_status: record.status,
            });
        }

        record.status = SettlementStatus::Failed;
        record.failure_reason = Some(reason.clone());
        record.notes = notes;
        record.updated_at = Utc::now();
        let snapshot = record.clone();
        drop(inner);

        warn!(
            %settlement_id,
            allocation_id = %snapshot.allocation_id,
            attempt = snapshot.attempt,
            reason,
            "settlement attempt failed"
        );
        Ok(snapshot)
    }

    /// Append a fresh attempt behind a failed one.
    ///
    /// Only the allocation's latest attempt can be retried, which keeps
    /// attempt numbers dense. The failed record is never mutated; the new
    /// attempt gets the next number and a new expected date.
    pub fn retry(&self, settlement_id: SettlementId) -> PostTradeResult<SettlementRecord> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let index = Self::index_of(&inner, settlement_id)?;
        let failed = inner.records[index].clone();
        if failed.status != SettlementStatus::Failed {
            return Err(PostTradeError::InvalidSettlementTransition {
                settlement_id,
                operation: "retried".to_string(),
                current_status: failed.status,
            });
        }
        let latest = inner
            .by_allocation
            .get(&failed.allocation_id)
            .and_then(|indices| indices.last().copied());
        if latest != Some(index) {
            return Err(PostTradeError::Validation {
                reason: format!(
                    "settlement {settlement_id} is not the latest attempt for allocation {}",
                    failed.allocation_id
                ),
            });
        }

        let record = SettlementRecord {
            id: SettlementId::new(),
            allocation_id: failed.allocation_id,
            account_id: failed.account_id.clone(),
            attempt: failed.attempt + 1,
            status: SettlementStatus::Pending,
            settlement_date: now + Duration::days(self.config.settlement_offset_days),
            details: None,
            failure_reason: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        Self::append(&mut inner, record.clone());
        drop(inner);

        info!(
            settlement_id = %record.id,
            allocation_id = %record.allocation_id,
            attempt = record.attempt,
            "settlement retry scheduled"
        );
        Ok(record)
    }

    /// Look up one attempt by id
    #[must_use]
    pub fn get(&self, settlement_id: SettlementId) -> Option<SettlementRecord> {
        let inner = self.inner.read();
        inner
            .by_id
            .get(&settlement_id)
            .map(|&i| inner.records[i].clone())
    }

    /// Every attempt for the allocation, oldest first
    #[must_use]
    pub fn history(&self, allocation_id: AllocationId) -> Vec<SettlementRecord> {
        let inner = self.inner.read();
        inner
            .by_allocation
            .get(&allocation_id)
            .map(|indices| indices.iter().map(|&i| inner.records[i].clone()).collect())
            .unwrap_or_default()
    }

    /// All records matching `filter`, in creation order
    #[must_use]
    pub fn query(&self, filter: &SettlementFilter) -> Vec<SettlementRecord> {
        let inner = self.inner.read();
        inner
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    /// Pending attempts whose expected date is at or before `as_of`
    #[must_use]
    pub fn due(&self, as_of: DateTime<Utc>) -> Vec<SettlementRecord> {
        let inner = self.inner.read();
        inner
            .records
            .iter()
            .filter(|r| r.status == SettlementStatus::Pending && r.settlement_date <= as_of)
            .cloned()
            .collect()
    }

    /// Number of stored attempts
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn index_of(
        inner: &SettlementStoreInner,
        settlement_id: SettlementId,
    ) -> PostTradeResult<usize> {
        inner
            .by_id
            .get(&settlement_id)
            .copied()
            .ok_or(PostTradeError::SettlementNotFound { settlement_id })
    }

    fn append(inner: &mut SettlementStoreInner, record: SettlementRecord) {
        let index = inner.records.len();
        inner.by_id.insert(record.id, index);
        inner
            .by_allocation
            .entry(record.allocation_id)
            .or_default()
            .push(index);
        inner.records.push(record);
    }
}
