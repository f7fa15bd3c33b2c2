//! Basket coordination
//!
//! A basket groups related orders under one execution policy. Basket
//! status is never stored: it is derived from constituent order
//! statuses plus the explicit-cancel flag, so partial updates cannot
//! leave it inconsistent. The coordinator holds no lock over
//! constituent state; it creates orders, starts their workers per the
//! basket mode, and observes terminal transitions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use oms::order::{OrderRequest, OrderStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use services_common::constants::fixed_point::BASIS_POINTS;
use services_common::{BasketId, OrderId, PortfolioId, Px};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::ExecutionEngine;
use crate::error::{ExecutionError, ExecutionResult};

/// How a basket's constituents are worked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BasketMode {
    /// One constituent at a time, in request order
    Sequential,
    /// All constituents at once, subject to the aggregate caps
    Parallel,
}

impl std::fmt::Display for BasketMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}

/// Derived basket status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BasketStatus {
    /// At least one constituent is still non-terminal
    Processing,
    /// Every constituent is terminal and the basket was not canceled
    Completed,
    /// Basket was explicitly canceled and every constituent has resolved
    Canceled,
}

impl std::fmt::Display for BasketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// One constituent of a basket request
#[derive(Debug, Clone)]
pub struct BasketConstituent {
    /// The order to create
    pub request: OrderRequest,
    /// Price basis for the notional projection when the order itself
    /// carries no limit price (market orders)
    pub benchmark_price: Option<Px>,
}

/// Aggregate exposure caps checked when the basket starts
#[derive(Debug, Clone, Copy, Default)]
pub struct BasketCaps {
    /// Hard ceiling on summed projected notional, in price ticks
    pub max_gross_notional: Option<i64>,
    /// Ceiling as a fraction of portfolio equity, in basis points
    pub max_portfolio_fraction_bps: Option<i64>,
    /// Portfolio equity in price ticks, the basis for the fractional cap
    pub portfolio_equity: Option<i64>,
}

impl BasketCaps {
    /// Effective notional ceiling, the tightest of the configured caps
    fn effective_limit(&self) -> ExecutionResult<Option<i128>> {
        let mut limit: Option<i128> = self.max_gross_notional.map(i128::from);
        if let Some(fraction_bps) = self.max_portfolio_fraction_bps {
            let Some(equity) = self.portfolio_equity else {
                return Err(ExecutionError::BasketRejected {
                    reason: "portfolio equity is required for a fractional cap".to_string(),
                });
            };
            let fractional = i128::from(equity) * i128::from(fraction_bps) / i128::from(BASIS_POINTS);
            limit = Some(limit.map_or(fractional, |l| l.min(fractional)));
        }
        Ok(limit)
    }
}

/// Request to create and run a basket
#[derive(Debug, Clone)]
pub struct BasketRequest {
    /// Human-readable basket label
    pub label: String,
    /// Portfolio all constituents trade for
    pub portfolio_id: PortfolioId,
    /// Execution policy
    pub mode: BasketMode,
    /// Constituent orders, in the order they will be worked
    pub constituents: Vec<BasketConstituent>,
    /// Aggregate exposure caps
    pub caps: BasketCaps,
}

/// Immutable basket snapshot
#[derive(Debug, Clone)]
pub struct Basket {
    /// Basket id
    pub id: BasketId,
    /// Label from the request
    pub label: String,
    /// Owning portfolio
    pub portfolio_id: PortfolioId,
    /// Execution policy
    pub mode: BasketMode,
    /// Constituent order ids, in request order
    pub order_ids: Vec<OrderId>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

struct BasketRecord {
    basket: Basket,
    cancel_requested: AtomicBool,
    runner: Mutex<Option<JoinHandle<()>>>,
}

/// Derive a basket status from constituent statuses and the cancel flag.
///
/// Pure so every transition recomputes from scratch; an all-filled
/// basket reads `Completed` even after a cancel, mirroring the
/// late-fill-wins rule at the order level.
#[must_use]
pub fn derive_status(statuses: &[OrderStatus], cancel_requested: bool) -> BasketStatus {
    if statuses.iter().any(|status| !status.is_terminal()) {
        return BasketStatus::Processing;
    }
    if statuses
        .iter()
        .all(|status| *status == OrderStatus::Filled)
    {
        return BasketStatus::Completed;
    }
    if cancel_requested {
        BasketStatus::Canceled
    } else {
        BasketStatus::Completed
    }
}

/// Creates baskets, runs their constituents per the basket mode, and
/// derives basket status on demand
pub struct BasketCoordinator {
    engine: Arc<ExecutionEngine>,
    baskets: DashMap<BasketId, Arc<BasketRecord>>,
}

impl BasketCoordinator {
    /// Create a coordinator over an execution engine
    #[must_use]
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        Self {
            engine,
            baskets: DashMap::new(),
        }
    }

    /// Create all constituent orders, enforce the aggregate caps, and
    /// start working the basket.
    ///
    /// Creation is all-or-nothing: if any constituent fails validation
    /// or risk, orders already created are canceled and the error is
    /// returned. Cap enforcement is per constituent in request order: a
    /// constituent whose projected notional breaches the remaining cap
    /// is rejected, never queued, and the rest of the basket proceeds.
    pub async fn submit_basket(&self, request: BasketRequest) -> ExecutionResult<Basket> {
        if request.constituents.is_empty() {
            return Err(ExecutionError::BasketRejected {
                reason: "basket has no constituents".to_string(),
            });
        }
        for (position, constituent) in request.constituents.iter().enumerate() {
            if constituent.request.portfolio_id != request.portfolio_id {
                return Err(ExecutionError::BasketRejected {
                    reason: format!(
                        "constituent {position} trades for a different portfolio than the basket"
                    ),
                });
            }
        }
        let cap = request.caps.effective_limit()?;
        if cap.is_some() {
            // Every constituent needs a price basis before anything is
            // created, so a capped basket never half-starts.
            for (position, constituent) in request.constituents.iter().enumerate() {
                if constituent.request.price.is_none() && constituent.benchmark_price.is_none() {
                    return Err(ExecutionError::BasketRejected {
                        reason: format!(
                            "constituent {position} has no price basis for the notional cap"
                        ),
                    });
                }
            }
        }

        let mut order_ids = Vec::with_capacity(request.constituents.len());
        for constituent in &request.constituents {
            match self.engine.create_order(constituent.request.clone()).await {
                Ok(order) => order_ids.push(order.id),
                Err(error) => {
                    self.rollback_created(&order_ids);
                    return Err(ExecutionError::BasketRejected {
                        reason: format!("constituent creation failed: {error}"),
                    });
                }
            }
        }

        if let Some(limit) = cap {
            self.enforce_cap(&request, &order_ids, limit);
        }

        let basket = Basket {
            id: BasketId::new(),
            label: request.label.clone(),
            portfolio_id: request.portfolio_id.clone(),
            mode: request.mode,
            order_ids: order_ids.clone(),
            created_at: Utc::now(),
        };
        info!(
            basket_id = %basket.id,
            label = %basket.label,
            mode = %basket.mode,
            constituents = basket.order_ids.len(),
            "basket created"
        );

        let record = Arc::new(BasketRecord {
            basket: basket.clone(),
            cancel_requested: AtomicBool::new(false),
            runner: Mutex::new(None),
        });
        self.baskets.insert(basket.id, Arc::clone(&record));

        let engine = Arc::clone(&self.engine);
        let basket_id = basket.id;
        let mode = basket.mode;
        let runner = tokio::spawn(async move {
            match mode {
                BasketMode::Sequential => run_sequential(&engine, basket_id, &order_ids).await,
                BasketMode::Parallel => run_parallel(&engine, basket_id, &order_ids).await,
            }
        });
        *record.runner.lock() = Some(runner);

        Ok(basket)
    }

    /// Cascade cancel to every non-terminal constituent.
    ///
    /// The basket reads `Canceled` only once all constituents have
    /// confirmed cancellation or finished filling.
    pub async fn cancel_basket(&self, basket_id: BasketId) -> ExecutionResult<()> {
        let record = self.record(basket_id)?;
        record.cancel_requested.store(true, Ordering::SeqCst);
        info!(%basket_id, "basket cancel requested");

        for order_id in &record.basket.order_ids {
            let terminal = self
                .engine
                .oms()
                .get_order(*order_id)
                .is_none_or(|order| order.is_terminal());
            if terminal {
                continue;
            }
            if let Err(error) = self.engine.cancel_order(*order_id).await {
                // A constituent can reach terminal between the check and
                // the cancel; anything else is worth surfacing.
                warn!(%basket_id, %order_id, %error, "constituent cancel failed");
            }
        }
        Ok(())
    }

    /// Wait for the basket runner to finish and report the final status
    pub async fn wait_for_basket(&self, basket_id: BasketId) -> ExecutionResult<BasketStatus> {
        let record = self.record(basket_id)?;
        let runner = record.runner.lock().take();
        if let Some(handle) = runner
            && let Err(error) = handle.await
        {
            warn!(%basket_id, %error, "basket runner panicked");
        }
        self.basket_status(basket_id)
    }

    /// Derive the basket's current status
    pub fn basket_status(&self, basket_id: BasketId) -> ExecutionResult<BasketStatus> {
        let record = self.record(basket_id)?;
        let statuses: Vec<OrderStatus> = record
            .basket
            .order_ids
            .iter()
            .filter_map(|order_id| self.engine.oms().get_order(*order_id))
            .map(|order| order.status)
            .collect();
        Ok(derive_status(
            &statuses,
            record.cancel_requested.load(Ordering::SeqCst),
        ))
    }

    /// Snapshot of a basket
    #[must_use]
    pub fn get_basket(&self, basket_id: BasketId) -> Option<Basket> {
        self.baskets
            .get(&basket_id)
            .map(|record| record.basket.clone())
    }

    /// All baskets for a portfolio, oldest first
    #[must_use]
    pub fn baskets_for_portfolio(&self, portfolio_id: &PortfolioId) -> Vec<Basket> {
        let mut baskets: Vec<Basket> = self
            .baskets
            .iter()
            .filter(|entry| entry.basket.portfolio_id == *portfolio_id)
            .map(|entry| entry.basket.clone())
            .collect();
        baskets.sort_by_key(|basket| basket.created_at);
        baskets
    }

    fn record(&self, basket_id: BasketId) -> ExecutionResult<Arc<BasketRecord>> {
        self.baskets
            .get(&basket_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ExecutionError::BasketNotFound { basket_id })
    }

    /// Walk constituents in request order, rejecting any whose projected
    /// notional would push the running total over the cap
    fn enforce_cap(&self, request: &BasketRequest, order_ids: &[OrderId], limit: i128) {
        let mut running: i128 = 0;
        for (constituent, order_id) in request.constituents.iter().zip(order_ids) {
            let basis = constituent
                .request
                .price
                .or(constituent.benchmark_price)
                .unwrap_or(Px::ZERO);
            let projected = i128::from(basis.mul_qty(constituent.request.quantity));
            if running + projected > limit {
                warn!(
                    %order_id,
                    projected,
                    running,
                    limit,
                    "constituent rejected: projected notional breaches the basket cap"
                );
                if let Err(error) = self
                    .engine
                    .oms()
                    .reject_order(*order_id, "projected notional breaches the basket cap")
                {
                    warn!(%order_id, %error, "cap rejection did not apply");
                }
            } else {
                running += projected;
            }
        }
    }

    /// Cancel orders created before a mid-basket failure. They are all
    /// still `new` with no worker, so cancellation confirms immediately.
    fn rollback_created(&self, order_ids: &[OrderId]) {
        for order_id in order_ids {
            let oms = self.engine.oms();
            if let Err(error) = oms
                .request_cancel(*order_id)
                .and_then(|()| oms.confirm_cancel(*order_id).map(|_| ()))
            {
                warn!(%order_id, %error, "basket rollback cancel failed");
            }
        }
    }
}

/// Work constituents one at a time; a canceled or rejected constituent
/// does not stop the ones after it
async fn run_sequential(engine: &ExecutionEngine, basket_id: BasketId, order_ids: &[OrderId]) {
    for order_id in order_ids {
        let terminal = engine
            .oms()
            .get_order(*order_id)
            .is_none_or(|order| order.is_terminal());
        if terminal {
            continue;
        }
        if let Err(error) = engine.start_order(*order_id) {
            warn!(%basket_id, %order_id, %error, "constituent did not start");
            continue;
        }
        if let Err(error) = engine.wait_for_completion(*order_id).await {
            warn!(%basket_id, %order_id, %error, "constituent wait failed");
        }
    }
    info!(%basket_id, "sequential basket runner finished");
}

/// Start every constituent at once, then wait for all of them
async fn run_parallel(engine: &ExecutionEngine, basket_id: BasketId, order_ids: &[OrderId]) {
    let mut started = Vec::with_capacity(order_ids.len());
    for order_id in order_ids {
        let terminal = engine
            .oms()
            .get_order(*order_id)
            .is_none_or(|order| order.is_terminal());
        if terminal {
            continue;
        }
        match engine.start_order(*order_id) {
            Ok(()) => started.push(*order_id),
            Err(error) => warn!(%basket_id, %order_id, %error, "constituent did not start"),
        }
    }
    for order_id in started {
        if let Err(error) = engine.wait_for_completion(order_id).await {
            warn!(%basket_id, %order_id, %error, "constituent wait failed");
        }
    }
    info!(%basket_id, "parallel basket runner finished");
}
