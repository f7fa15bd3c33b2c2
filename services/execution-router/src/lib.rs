//! Execution strategy engine
//!
//! Converts orders into time-ordered slice schedules and works them
//! against venues:
//! - Market and limit orders as single persistent slices with
//!   replacement after partial fills
//! - TWAP and VWAP schedules with carry-forward of unfilled quantity
//!   and optional aggressive completion at market
//! - Venue routing with health-aware failover and bounded retry
//! - Acknowledgement-based cancel: exposure is quiesced at the venue
//!   before the state machine confirms
//! - Basket coordination with sequential/parallel policies and
//!   aggregate notional caps

pub mod basket;
pub mod config;
pub mod error;
pub mod mock_venue;
pub mod schedule;
pub mod venue;
pub mod venue_manager;
pub mod volume;
mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use oms::OrderManager;
use oms::error::OmsError;
use oms::order::{Order, OrderRequest};
use parking_lot::Mutex;
use services_common::OrderId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use config::ExecutionConfig;
use error::{ExecutionError, ExecutionResult};
use schedule::SlicePlan;
use venue_manager::VenueManager;
use volume::{UShapedCurve, VolumeCurve};
use worker::{WorkerCommand, WorkerContext};

/// Engine counters, updated by workers as slices move
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Order workers spawned
    pub orders_started: AtomicU64,
    /// Slices acknowledged by a venue
    pub slices_submitted: AtomicU64,
    /// Slices that failed submission or were rejected
    pub slices_failed: AtomicU64,
    /// Submission retry attempts
    pub submit_retries: AtomicU64,
}

/// Point-in-time engine metrics snapshot
#[derive(Debug, Clone)]
pub struct EngineMetricsSnapshot {
    /// Order workers spawned
    pub orders_started: u64,
    /// Slices acknowledged by a venue
    pub slices_submitted: u64,
    /// Slices that failed submission or were rejected
    pub slices_failed: u64,
    /// Submission retry attempts
    pub submit_retries: u64,
    /// Workers currently running
    pub active_workers: usize,
}

struct WorkerHandle {
    commands: mpsc::Sender<WorkerCommand>,
    join: Mutex<Option<JoinHandle<()>>>,
}

/// Drives order execution: one worker task per started order, routed
/// through the venue manager, with all order state owned by the state
/// machine
pub struct ExecutionEngine {
    oms: Arc<OrderManager>,
    venues: Arc<VenueManager>,
    config: Arc<ExecutionConfig>,
    curve: Arc<dyn VolumeCurve>,
    workers: DashMap<OrderId, Arc<WorkerHandle>>,
    metrics: Arc<EngineMetrics>,
}

impl ExecutionEngine {
    /// Create an engine over an order manager and a venue manager
    #[must_use]
    pub fn new(oms: Arc<OrderManager>, venues: Arc<VenueManager>, config: ExecutionConfig) -> Self {
        Self {
            oms,
            venues,
            config: Arc::new(config),
            curve: Arc::new(UShapedCurve::default()),
            workers: DashMap::new(),
            metrics: Arc::new(EngineMetrics::default()),
        }
    }

    /// Replace the VWAP volume curve
    #[must_use]
    pub fn with_volume_curve(mut self, curve: Arc<dyn VolumeCurve>) -> Self {
        self.curve = curve;
        self
    }

    /// Create an order without starting execution.
    ///
    /// Strategy parameters are validated here by building the slice
    /// plan, so a bad schedule fails before any order state exists.
    pub async fn create_order(&self, request: OrderRequest) -> ExecutionResult<Order> {
        SlicePlan::for_strategy(
            &request.strategy,
            &request.symbol,
            request.quantity,
            self.curve.as_ref(),
        )?;
        let order = self.oms.create_order(request).await?;
        Ok(order)
    }

    /// Spawn the worker that executes an already-created order
    pub fn start_order(&self, order_id: OrderId) -> ExecutionResult<()> {
        let order = self
            .oms
            .get_order(order_id)
            .ok_or(ExecutionError::Oms(OmsError::OrderNotFound { order_id }))?;
        if order.is_terminal() {
            return Err(ExecutionError::Oms(OmsError::InvalidStateTransition {
                order_id,
                operation: "started".to_string(),
                current_state: order.status,
            }));
        }

        match self.workers.entry(order_id) {
            Entry::Occupied(_) => Err(ExecutionError::AlreadyStarted { order_id }),
            Entry::Vacant(slot) => {
                let (commands, inbox) = mpsc::channel(8);
                let ctx = WorkerContext {
                    oms: Arc::clone(&self.oms),
                    venues: Arc::clone(&self.venues),
                    config: Arc::clone(&self.config),
                    curve: Arc::clone(&self.curve),
                    metrics: Arc::clone(&self.metrics),
                };
                let join = tokio::spawn(worker::run_order(ctx, order, inbox));
                slot.insert(Arc::new(WorkerHandle {
                    commands,
                    join: Mutex::new(Some(join)),
                }));
                self.metrics.orders_started.fetch_add(1, Ordering::Relaxed);
                info!(%order_id, "order worker started");
                Ok(())
            }
        }
    }

    /// Create an order and immediately start working it
    pub async fn submit_order(&self, request: OrderRequest) -> ExecutionResult<Order> {
        let order = self.create_order(request).await?;
        self.start_order(order.id)?;
        Ok(order)
    }

    /// Request cancellation of an order.
    ///
    /// The state machine tags the order cancel-pending; the worker then
    /// quiesces venue exposure and confirms. When no worker is running
    /// there is no exposure, so the cancel confirms immediately.
    pub async fn cancel_order(&self, order_id: OrderId) -> ExecutionResult<()> {
        self.oms.request_cancel(order_id)?;

        let commands = self
            .workers
            .get(&order_id)
            .map(|handle| handle.commands.clone());
        let delivered = match commands {
            Some(commands) => commands.send(WorkerCommand::Cancel).await.is_ok(),
            None => false,
        };
        if !delivered {
            let status = self.oms.confirm_cancel(order_id)?;
            info!(%order_id, %status, "cancel confirmed without an active worker");
        }
        Ok(())
    }

    /// Wait for an order's worker to finish and return the final order
    pub async fn wait_for_completion(&self, order_id: OrderId) -> ExecutionResult<Order> {
        let handle = self
            .workers
            .get(&order_id)
            .map(|entry| Arc::clone(entry.value()));
        if let Some(handle) = handle {
            let join = handle.join.lock().take();
            if let Some(join) = join
                && let Err(error) = join.await
            {
                warn!(%order_id, %error, "order worker panicked");
            }
            self.workers.remove(&order_id);
        }
        self.oms
            .get_order(order_id)
            .ok_or(ExecutionError::Oms(OmsError::OrderNotFound { order_id }))
    }

    /// The order state machine this engine drives
    #[must_use]
    pub fn oms(&self) -> &Arc<OrderManager> {
        &self.oms
    }

    /// The venue manager this engine routes through
    #[must_use]
    pub fn venues(&self) -> &Arc<VenueManager> {
        &self.venues
    }

    /// Engine configuration
    #[must_use]
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Point-in-time metrics snapshot
    #[must_use]
    pub fn metrics(&self) -> EngineMetricsSnapshot {
        EngineMetricsSnapshot {
            orders_started: self.metrics.orders_started.load(Ordering::Relaxed),
            slices_submitted: self.metrics.slices_submitted.load(Ordering::Relaxed),
            slices_failed: self.metrics.slices_failed.load(Ordering::Relaxed),
            submit_retries: self.metrics.submit_retries.load(Ordering::Relaxed),
            active_workers: self.workers.len(),
        }
    }
}
