//! In-memory record stores and query filters
//!
//! The reportable state surface: orders and executions queryable by id and
//! by the common filters (portfolio, symbol, status, date range). Executions
//! are append-only; orders are snapshots cloned out of the live map.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use services_common::{ExecutionId, OrderId, PortfolioId, Symbol};
use std::sync::Arc;

use crate::execution::Execution;
use crate::order::{Order, OrderStatus};

/// Filter for order queries; `None` fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderFilter {
    /// Match orders of this portfolio
    pub portfolio_id: Option<PortfolioId>,
    /// Match orders for this symbol
    pub symbol: Option<Symbol>,
    /// Match orders in this status
    pub status: Option<OrderStatus>,
    /// Match orders created at or after this instant
    pub created_after: Option<DateTime<Utc>>,
    /// Match orders created before this instant
    pub created_before: Option<DateTime<Utc>>,
}

impl OrderFilter {
    /// Whether `order` satisfies every set field
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(portfolio_id) = &self.portfolio_id
            && &order.portfolio_id != portfolio_id
        {
            return false;
        }
        if let Some(symbol) = &self.symbol
            && &order.symbol != symbol
        {
            return false;
        }
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        if let Some(after) = self.created_after
            && order.created_at < after
        {
            return false;
        }
        if let Some(before) = self.created_before
            && order.created_at >= before
        {
            return false;
        }
        true
    }
}

/// Filter for execution queries; `None` fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionFilter {
    /// Match executions of this order
    pub order_id: Option<OrderId>,
    /// Match executions of this portfolio
    pub portfolio_id: Option<PortfolioId>,
    /// Match executions for this symbol
    pub symbol: Option<Symbol>,
    /// Match executions reported by this venue
    pub venue: Option<String>,
    /// Match executions at or after this instant
    pub executed_after: Option<DateTime<Utc>>,
    /// Match executions before this instant
    pub executed_before: Option<DateTime<Utc>>,
}

impl ExecutionFilter {
    /// Whether `execution` satisfies every set field
    #[must_use]
    pub fn matches(&self, execution: &Execution) -> bool {
        if let Some(order_id) = self.order_id
            && execution.order_id != order_id
        {
            return false;
        }
        if let Some(portfolio_id) = &self.portfolio_id
            && &execution.portfolio_id != portfolio_id
        {
            return false;
        }
        if let Some(symbol) = &self.symbol
            && &execution.symbol != symbol
        {
            return false;
        }
        if let Some(venue) = &self.venue
            && &execution.venue != venue
        {
            return false;
        }
        if let Some(after) = self.executed_after
            && execution.executed_at < after
        {
            return false;
        }
        if let Some(before) = self.executed_before
            && execution.executed_at >= before
        {
            return false;
        }
        true
    }
}

#[derive(Default)]
struct ExecutionStoreInner {
    records: Vec<Arc<Execution>>,
    by_id: FxHashMap<ExecutionId, usize>,
    by_order: FxHashMap<OrderId, Vec<usize>>,
}

/// Append-only execution record store
#[derive(Default)]
pub struct ExecutionStore {
    inner: RwLock<ExecutionStoreInner>,
}

impl ExecutionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record. Records are immutable once stored.
    pub fn append(&self, execution: Arc<Execution>) {
        let mut inner = self.inner.write();
        let index = inner.records.len();
        inner.by_id.insert(execution.id, index);
        inner
            .by_order
            .entry(execution.order_id)
            .or_default()
            .push(index);
        inner.records.push(execution);
    }

    /// Look up one record by id
    #[must_use]
    pub fn get(&self, id: ExecutionId) -> Option<Arc<Execution>> {
        let inner = self.inner.read();
        inner.by_id.get(&id).map(|&i| Arc::clone(&inner.records[i]))
    }

    /// All executions of one order, in application order
    #[must_use]
    pub fn for_order(&self, order_id: OrderId) -> Vec<Arc<Execution>> {
        let inner = self.inner.read();
        inner
            .by_order
            .get(&order_id)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&i| Arc::clone(&inner.records[i]))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All records matching `filter`, in append order
    #[must_use]
    pub fn query(&self, filter: &ExecutionFilter) -> Vec<Arc<Execution>> {
        let inner = self.inner.read();
        inner
            .records
            .iter()
            .filter(|e| filter.matches(e))
            .map(Arc::clone)
            .collect()
    }

    /// Number of stored records
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
