//! Execution allocation splitting
//!
//! Divides one immutable execution across destination accounts, either from
//! an explicit account/quantity request or pro-rata against the portfolio's
//! registered sub-account weights. A split is all-or-nothing: allocation
//! quantities sum to the execution quantity exactly or nothing is created.
//! Fees follow quantity share, with both component remainders assigned to
//! the first allocation.

use account_registry::AccountRegistry;
use chrono::{DateTime, Utc};
use oms::execution::{Execution, Fees};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use services_common::constants::fixed_point::BASIS_POINTS;
use services_common::{
    AccountId, AllocationId, ExecutionId, OrderId, OrderSide, PortfolioId, Px, Qty, Symbol,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{PostTradeError, PostTradeResult};

/// Allocation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AllocationStatus {
    /// Created by a split, awaiting review
    Pending,
    /// Accepted; may proceed to settlement (terminal)
    Confirmed,
    /// Declined; the execution can be re-split once every allocation of
    /// its split is rejected (terminal)
    Rejected,
}

impl AllocationStatus {
    /// Terminal states admit no further transitions
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Rejected)
    }
}

impl fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
        };
        write!(f, "{name}")
    }
}

/// One line of an explicit split request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequest {
    /// Destination account
    pub account_id: AccountId,
    /// Quantity assigned to the account
    pub quantity: Qty,
}

impl AllocationRequest {
    /// Create a request line
    pub fn new(account_id: impl Into<String>, quantity: Qty) -> Self {
        Self {
            account_id: AccountId::new(account_id),
            quantity,
        }
    }
}

/// A split of one execution across one destination account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    /// Unique allocation ID
    pub id: AllocationId,
    /// Execution this allocation divides
    pub execution_id: ExecutionId,
    /// Parent order of the execution
    pub order_id: OrderId,
    /// Portfolio of the parent order
    pub portfolio_id: PortfolioId,
    /// Symbol
    pub symbol: Symbol,
    /// Side of the parent order
    pub side: OrderSide,
    /// Destination account
    pub account_id: AccountId,
    /// Quantity assigned to the account
    pub quantity: Qty,
    /// Price inherited from the execution
    pub price: Px,
    /// This allocation's share of the execution fees
    pub fees: Fees,
    /// Allocation status
    pub status: AllocationStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
    /// When the allocation was confirmed; settlement dates anchor here
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Allocation {
    /// Notional value in ticks
    #[must_use]
    pub fn notional(&self) -> i64 {
        self.price.mul_qty(self.quantity)
    }
}

/// Filter for allocation queries; `None` fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocationFilter {
    /// Match allocations of this execution
    pub execution_id: Option<ExecutionId>,
    /// Match allocations of this order
    pub order_id: Option<OrderId>,
    /// Match allocations of this portfolio
    pub portfolio_id: Option<PortfolioId>,
    /// Match allocations to this account
    pub account_id: Option<AccountId>,
    /// Match allocations in this status
    pub status: Option<AllocationStatus>,
    /// Match allocations created at or after this instant
    pub created_after: Option<DateTime<Utc>>,
    /// Match allocations created before this instant
    pub created_before: Option<DateTime<Utc>>,
}

impl AllocationFilter {
    /// Whether `allocation` satisfies every set field
    #[must_use]
    pub fn matches(&self, allocation: &Allocation) -> bool {
        if let Some(execution_id) = self.execution_id
            && allocation.execution_id != execution_id
        {
            return false;
        }
        if let Some(order_id) = self.order_id
            && allocation.order_id != order_id
        {
            return false;
        }
        if let Some(portfolio_id) = &self.portfolio_id
            && &allocation.portfolio_id != portfolio_id
        {
            return false;
        }
        if let Some(account_id) = &self.account_id
            && &allocation.account_id != account_id
        {
            return false;
        }
        if let Some(status) = self.status
            && allocation.status != status
        {
            return false;
        }
        if let Some(after) = self.created_after
            && allocation.created_at < after
        {
            return false;
        }
        if let Some(before) = self.created_before
            && allocation.created_at >= before
        {
            return false;
        }
        true
    }
}

#[derive(Default)]
struct AllocationStoreInner {
    records: Vec<Allocation>,
    by_id: FxHashMap<AllocationId, usize>,
    by_execution: FxHashMap<ExecutionId, Vec<usize>>,
}

/// Allocation splitter and store
///
/// Splits are computed without the lock held and inserted atomically, so a
/// failed split leaves no partial state. Status transitions mutate in place
/// under the write lock and hand out snapshots.
pub struct AllocationManager {
    registry: Arc<dyn AccountRegistry>,
    inner: RwLock<AllocationStoreInner>,
}

impl AllocationManager {
    /// Create a manager backed by `registry` for pro-rata weights
    #[must_use]
    pub fn new(registry: Arc<dyn AccountRegistry>) -> Self {
        Self {
            registry,
            inner: RwLock::new(AllocationStoreInner::default()),
        }
    }

    /// Split `execution` exactly as requested, all-or-nothing.
    ///
    /// The request lines must sum to the execution quantity; otherwise
    /// `AllocationMismatch` is returned and no allocations exist afterwards.
    /// Fee remainders go to the first allocation in request order.
    pub fn split_explicit(
        &self,
        execution: &Execution,
        requests: &[AllocationRequest],
    ) -> PostTradeResult<Vec<Allocation>> {
        validate_execution(execution)?;
        for request in requests {
            if request.quantity.as_i64() <= 0 {
                return Err(PostTradeError::Validation {
                    reason: format!(
                        "allocation to account {} must have positive quantity",
                        request.account_id
                    ),
                });
            }
        }

        let allocated: i128 = requests
            .iter()
            .map(|r| i128::from(r.quantity.as_i64()))
            .sum();
        if allocated != i128::from(execution.quantity.as_i64()) {
            return Err(PostTradeError::AllocationMismatch {
                execution_id: execution.id,
                expected: execution.quantity,
                allocated: Qty::from_i64(i64::try_from(allocated).unwrap_or(i64::MAX)),
            });
        }

        let shares: Vec<(AccountId, Qty)> = requests
            .iter()
            .map(|r| (r.account_id.clone(), r.quantity))
            .collect();
        self.insert_split(execution, shares, "explicit")
    }

    /// Split `execution` pro-rata against the portfolio's registered
    /// sub-account weights.
    ///
    /// Per-account quantities are floored; the quantity remainder and both
    /// fee remainders go to the first account in registry order.
    pub fn split_pro_rata(&self, execution: &Execution) -> PostTradeResult<Vec<Allocation>> {
        validate_execution(execution)?;
        let weights = self
            .registry
            .sub_accounts(&execution.portfolio_id)
            .map_err(|source| PostTradeError::WeightsUnavailable {
                portfolio_id: execution.portfolio_id.clone(),
                source,
            })?;

        // The registry contract requires a full non-negative allocation;
        // re-check here because a short sum would silently dump the gap on
        // the first account.
        let sum_bps: i64 = weights.iter().map(|w| i64::from(w.weight_bps)).sum();
        if sum_bps != BASIS_POINTS || weights.iter().any(|w| w.weight_bps < 0) {
            return Err(PostTradeError::Validation {
                reason: format!(
                    "weights for portfolio {} do not form a full non-negative allocation (sum {sum_bps} bps)",
                    execution.portfolio_id
                ),
            });
        }

        let total = i128::from(execution.quantity.as_i64());
        let mut shares: Vec<(AccountId, Qty)> = weights
            .iter()
            .map(|w| {
                let share = total * i128::from(w.weight_bps) / i128::from(BASIS_POINTS);
                (
                    w.account_id.clone(),
                    Qty::from_i64(i64::try_from(share).unwrap_or(i64::MAX)),
                )
            })
            .collect();

        let assigned: i64 = shares.iter().map(|(_, q)| q.as_i64()).sum();
        let remainder = execution.quantity.as_i64() - assigned;
        if let Some((_, quantity)) = shares.first_mut() {
            *quantity = Qty::from_i64(quantity.as_i64() + remainder);
        }

        self.insert_split(execution, shares, "pro_rata")
    }

    /// Pending to confirmed; the allocation may now settle
    pub fn confirm(&self, allocation_id: AllocationId) -> PostTradeResult<Allocation> {
        let allocation = self.transition(allocation_id, AllocationStatus::Confirmed, "confirmed")?;
        info!(%allocation_id, account_id = %allocation.account_id, "allocation confirmed");
        Ok(allocation)
    }

    /// Pending to rejected; once every allocation of the split is rejected
    /// the execution becomes splittable again
    pub fn reject(&self, allocation_id: AllocationId, reason: &str) -> PostTradeResult<Allocation> {
        let allocation = self.transition(allocation_id, AllocationStatus::Rejected, "rejected")?;
        info!(%allocation_id, account_id = %allocation.account_id, reason, "allocation rejected");
        Ok(allocation)
    }

    /// Look up one allocation by id
    #[must_use]
    pub fn get(&self, allocation_id: AllocationId) -> Option<Allocation> {
        let inner = self.inner.read();
        inner
            .by_id
            .get(&allocation_id)
            .map(|&i| inner.records[i].clone())
    }

    /// All allocations of one execution, in split order
    #[must_use]
    pub fn for_execution(&self, execution_id: ExecutionId) -> Vec<Allocation> {
        let inner = self.inner.read();
        inner
            .by_execution
            .get(&execution_id)
            .map(|indices| indices.iter().map(|&i| inner.records[i].clone()).collect())
            .unwrap_or_default()
    }

    /// All allocations matching `filter`, in creation order
    #[must_use]
    pub fn query(&self, filter: &AllocationFilter) -> Vec<Allocation> {
        let inner = self.inner.read();
        inner
            .records
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect()
    }

    /// Number of stored allocations
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn transition(
        &self,
        allocation_id: AllocationId,
        next: AllocationStatus,
        operation: &str,
    ) -> PostTradeResult<Allocation> {
        let mut inner = self.inner.write();
        let index = *inner
            .by_id
            .get(&allocation_id)
            .ok_or(PostTradeError::AllocationNotFound { allocation_id })?;
        let record = &mut inner.records[index];
        if record.status != AllocationStatus::Pending {
            return Err(PostTradeError::InvalidAllocationTransition {
                allocation_id,
                operation: operation.to_string(),
                current_status: record.status,
            });
        }

        let now = Utc::now();
        record.status = next;
        record.updated_at = now;
        if next == AllocationStatus::Confirmed {
            record.confirmed_at = Some(now);
        }
        debug!(%allocation_id, status = %next, "allocation transition");
        Ok(record.clone())
    }

    fn insert_split(
        &self,
        execution: &Execution,
        shares: Vec<(AccountId, Qty)>,
        kind: &str,
    ) -> PostTradeResult<Vec<Allocation>> {
        let now = Utc::now();
        let fee_shares = split_fees(execution.fees, &shares, execution.quantity);
        let allocations: Vec<Allocation> = shares
            .into_iter()
            .zip(fee_shares)
            .map(|((account_id, quantity), fees)| Allocation {
                id: AllocationId::new(),
                execution_id: execution.id,
                order_id: execution.order_id,
                portfolio_id: execution.portfolio_id.clone(),
                symbol: execution.symbol.clone(),
                side: execution.side,
                account_id,
                quantity,
                price: execution.price,
                fees,
                status: AllocationStatus::Pending,
                created_at: now,
                updated_at: now,
                confirmed_at: None,
            })
            .collect();

        let mut inner = self.inner.write();
        let live_split = inner.by_execution.get(&execution.id).is_some_and(|indices| {
            indices
                .iter()
                .any(|&i| inner.records[i].status != AllocationStatus::Rejected)
        });
        if live_split {
            return Err(PostTradeError::AlreadyAllocated {
                execution_id: execution.id,
            });
        }
        for allocation in &allocations {
            let index = inner.records.len();
            inner.by_id.insert(allocation.id, index);
            inner
                .by_execution
                .entry(allocation.execution_id)
                .or_default()
                .push(index);
            inner.records.push(allocation.clone());
        }
        drop(inner);

        info!(
            execution_id = %execution.id,
            kind,
            accounts = allocations.len(),
            quantity = %execution.quantity,
            "execution allocated"
        );
        Ok(allocations)
    }
}

fn validate_execution(execution: &Execution) -> PostTradeResult<()> {
    if execution.quantity.as_i64() <= 0 {
        return Err(PostTradeError::Validation {
            reason: format!("execution {} has no quantity to allocate", execution.id),
        });
    }
    Ok(())
}

/// Distribute `fees` across `shares` proportional to quantity with i128
/// intermediates, flooring each share and assigning both component
/// remainders to the first entry so totals are conserved exactly.
fn split_fees(fees: Fees, shares: &[(AccountId, Qty)], total: Qty) -> Vec<Fees> {
    let total = i128::from(total.as_i64());
    let mut commissions: Vec<i64> = Vec::with_capacity(shares.len());
    let mut venue_fees: Vec<i64> = Vec::with_capacity(shares.len());
    for (_, quantity) in shares {
        let qty = i128::from(quantity.as_i64());
        let commission = i128::from(fees.commission) * qty / total;
        let venue_fee = i128::from(fees.venue_fee) * qty / total;
        commissions.push(i64::try_from(commission).unwrap_or(i64::MAX));
        venue_fees.push(i64::try_from(venue_fee).unwrap_or(i64::MAX));
    }

    let assigned: i64 = commissions.iter().sum();
    if let Some(first) = commissions.first_mut() {
        *first += fees.commission - assigned;
    }
    let assigned: i64 = venue_fees.iter().sum();
    if let Some(first) = venue_fees.first_mut() {
        *first += fees.venue_fee - assigned;
    }

    commissions
        .into_iter()
        .zip(venue_fees)
        .map(|(commission, venue_fee)| Fees::new(commission, venue_fee))
        .collect()
}
