//! Order state machine service
//!
//! Owns every order's lifecycle, quantity bookkeeping, and status:
//! `new -> open -> {partially_filled <-> open} -> filled | canceled | rejected`.
//!
//! Features:
//! - Exactly-once fills keyed by slice id, each emitting one immutable
//!   execution record
//! - Cancel-pending semantics: cancels are acknowledgement-based, fills
//!   arriving before quiescence still apply, and a completing fill wins
//! - Per-order serialized mutation (one lock per order id); different
//!   orders never contend
//! - Amendments with version history, append-only audit trail, order event
//!   broadcast, queryable order/execution stores

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use risk_manager::{RiskCheckRequest, RiskService};
use serde_json::json;
use services_common::{ExecutionId, OrderId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod audit;
pub mod error;
pub mod events;
pub mod execution;
pub mod lifecycle;
pub mod order;
pub mod store;

use audit::{AuditKind, AuditTrail};
use error::{OmsError, OmsResult};
use events::OrderEvent;
use execution::{Execution, FillReport};
use lifecycle::OrderLifecycleManager;
use order::{AmendRequest, Amendment, Fill, Order, OrderRequest, OrderStatus, OrderType};
use store::{ExecutionFilter, ExecutionStore, OrderFilter};

/// Order manager configuration
#[derive(Debug, Clone)]
pub struct OmsConfig {
    /// Broadcast capacity for order events
    pub event_channel_capacity: usize,
    /// Enable audit trail
    pub enable_audit: bool,
}

impl Default for OmsConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: 8192,
            enable_audit: true,
        }
    }
}

/// Order manager metrics
#[derive(Debug, Default)]
pub struct OmsMetrics {
    /// Total orders created
    pub orders_created: AtomicU64,
    /// Orders fully filled
    pub orders_filled: AtomicU64,
    /// Orders canceled
    pub orders_canceled: AtomicU64,
    /// Orders rejected
    pub orders_rejected: AtomicU64,
    /// Requests denied by the risk service
    pub risk_rejections: AtomicU64,
    /// Fills applied
    pub fills_applied: AtomicU64,
    /// Duplicate fills rejected
    pub duplicate_fills: AtomicU64,
    /// Cancel requests accepted
    pub cancels_requested: AtomicU64,
    /// Amendments applied
    pub amendments: AtomicU64,
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct OmsMetricsSnapshot {
    /// Total orders created
    pub orders_created: u64,
    /// Orders fully filled
    pub orders_filled: u64,
    /// Orders canceled
    pub orders_canceled: u64,
    /// Orders rejected
    pub orders_rejected: u64,
    /// Requests denied by the risk service
    pub risk_rejections: u64,
    /// Fills applied
    pub fills_applied: u64,
    /// Duplicate fills rejected
    pub duplicate_fills: u64,
    /// Cancel requests accepted
    pub cancels_requested: u64,
    /// Amendments applied
    pub amendments: u64,
    /// Orders currently non-terminal
    pub active_orders: usize,
}

/// Order state machine facade
///
/// One `Mutex<Order>` per order id serializes all mutation of that order;
/// fills for different orders proceed in parallel with no shared state
/// beyond the append-only stores.
pub struct OrderManager {
    config: OmsConfig,
    orders: DashMap<OrderId, Arc<Mutex<Order>>>,
    lifecycle: OrderLifecycleManager,
    executions: ExecutionStore,
    audit_trail: AuditTrail,
    event_bus: broadcast::Sender<OrderEvent>,
    risk_service: Option<Arc<dyn RiskService>>,
    order_sequence: AtomicU64,
    metrics: OmsMetrics,
}

impl OrderManager {
    /// Create an order manager with no risk gate
    #[must_use]
    pub fn new(config: OmsConfig) -> Self {
        let (event_bus, _) = broadcast::channel(config.event_channel_capacity);
        Self {
            config,
            orders: DashMap::new(),
            lifecycle: OrderLifecycleManager::new(),
            executions: ExecutionStore::new(),
            audit_trail: AuditTrail::new(),
            event_bus,
            risk_service: None,
            order_sequence: AtomicU64::new(1),
            metrics: OmsMetrics::default(),
        }
    }

    /// Attach a risk service consulted on every create
    #[must_use]
    pub fn with_risk_service(mut self, risk_service: Arc<dyn RiskService>) -> Self {
        self.risk_service = Some(risk_service);
        self
    }

    /// Create a new order in `new`
    ///
    /// Validates the request, consults the risk service, and only then
    /// creates state. A requested quantity above the risk approval rejects
    /// the order outright; quantities are never silently capped.
    pub async fn create_order(&self, request: OrderRequest) -> OmsResult<Order> {
        self.lifecycle.validate_request(&request)?;

        if let Some(risk_service) = &self.risk_service {
            let check = RiskCheckRequest {
                portfolio_id: request.portfolio_id.clone(),
                symbol: request.symbol.clone(),
                side: request.side,
                quantity: request.quantity,
                price: request.price,
            };
            let decision = risk_service.approve(&check).await;
            if !decision.approved || request.quantity > decision.max_quantity {
                self.metrics.risk_rejections.fetch_add(1, Ordering::Relaxed);
                warn!(
                    portfolio = %request.portfolio_id,
                    symbol = %request.symbol,
                    requested = %request.quantity,
                    approved_max = %decision.max_quantity,
                    "order rejected by risk"
                );
                return Err(OmsError::RiskRejected {
                    reason: decision.reason,
                    max_quantity: decision.max_quantity,
                });
            }
        }

        let sequence = self.order_sequence.fetch_add(1, Ordering::SeqCst);
        let order = Order::from_request(request, sequence);
        let order_id = order.id;

        self.orders
            .insert(order_id, Arc::new(Mutex::new(order.clone())));

        if self.config.enable_audit {
            self.audit_trail.record(
                order_id,
                AuditKind::OrderCreated,
                json!({
                    "symbol": order.symbol.as_str(),
                    "side": order.side.to_string(),
                    "quantity": order.quantity.as_i64(),
                    "strategy": order.strategy.name(),
                }),
            );
        }

        self.metrics.orders_created.fetch_add(1, Ordering::Relaxed);
        let _ = self.event_bus.send(OrderEvent::Created(order.clone()));

        info!(
            %order_id,
            symbol = %order.symbol,
            side = %order.side,
            quantity = %order.quantity,
            strategy = %order.strategy,
            "order created"
        );
        Ok(order)
    }

    /// Transition `new -> open` when the execution engine starts working
    /// the order
    pub fn mark_open(&self, order_id: OrderId) -> OmsResult<()> {
        let handle = self.order_handle(order_id)?;
        let mut order = handle.lock();

        self.lifecycle
            .validate_transition(&order, OrderStatus::Open, "opened")?;
        let old_status = order.status;
        order.status = OrderStatus::Open;
        order.updated_at = Utc::now();
        let timestamp = order.updated_at;

        if self.config.enable_audit {
            self.audit_trail.record(
                order_id,
                AuditKind::StatusChanged,
                json!({ "from": old_status.to_string(), "to": "open" }),
            );
        }
        drop(order);

        let _ = self.event_bus.send(OrderEvent::StatusChanged {
            order_id,
            old_status,
            new_status: OrderStatus::Open,
            timestamp,
        });
        debug!(%order_id, "order open");
        Ok(())
    }

    /// Apply one fill, exactly once per slice id
    ///
    /// Emits one immutable execution record, updates filled quantity and
    /// the quantity-weighted average price, and transitions status. A
    /// replayed slice id is rejected with no side effect and logged as a
    /// correctness signal. Fills are accepted while a cancel is pending.
    pub fn apply_fill(&self, order_id: OrderId, report: FillReport) -> OmsResult<Execution> {
        if report.quantity.as_i64() <= 0 {
            return Err(OmsError::Validation {
                reason: "fill quantity must be positive".to_string(),
            });
        }

        let handle = self.order_handle(order_id)?;
        let mut order = handle.lock();

        // Replay detection runs before the terminal check so a redelivered
        // final fill reads as a benign duplicate, not a bad transition.
        if order.has_fill_for_slice(report.slice_id) {
            self.metrics.duplicate_fills.fetch_add(1, Ordering::Relaxed);
            if self.config.enable_audit {
                self.audit_trail.record(
                    order_id,
                    AuditKind::DuplicateFillRejected,
                    json!({ "slice_id": report.slice_id.to_string() }),
                );
            }
            warn!(%order_id, slice_id = %report.slice_id, "duplicate fill rejected");
            return Err(OmsError::DuplicateFill {
                order_id,
                slice_id: report.slice_id,
            });
        }

        if order.is_terminal() {
            return Err(OmsError::InvalidStateTransition {
                order_id,
                operation: "filled".to_string(),
                current_state: order.status,
            });
        }

        if report.quantity > order.remaining_quantity {
            return Err(OmsError::Validation {
                reason: format!(
                    "fill quantity {} exceeds remaining {}",
                    report.quantity, order.remaining_quantity
                ),
            });
        }

        // Determine the prospective transition before touching anything so
        // a rejected transition leaves the order untouched.
        let old_status = order.status;
        let prospective_filled = order.filled_quantity.add(report.quantity);
        let new_status = if prospective_filled == order.quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        if new_status != old_status {
            self.lifecycle
                .validate_transition(&order, new_status, "filled")?;
        }

        let execution = Execution {
            id: ExecutionId::new(),
            order_id,
            slice_id: report.slice_id,
            portfolio_id: order.portfolio_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: report.quantity,
            price: report.price,
            venue: report.venue.clone(),
            fees: report.fees,
            executed_at: report.executed_at,
        };

        order.fills.push(Fill {
            slice_id: report.slice_id,
            execution_id: execution.id,
            quantity: report.quantity,
            price: report.price,
            venue: report.venue,
            fees: report.fees,
            timestamp: report.executed_at,
        });
        order.filled_quantity = prospective_filled;
        order.remaining_quantity = order.quantity.sub(order.filled_quantity);
        order.average_fill_price = order.compute_average_fill_price();
        order.status = new_status;
        order.updated_at = Utc::now();
        let timestamp = order.updated_at;

        self.executions.append(Arc::new(execution.clone()));
        if self.config.enable_audit {
            self.audit_trail.record(
                order_id,
                AuditKind::FillApplied,
                json!({
                    "slice_id": execution.slice_id.to_string(),
                    "execution_id": execution.id.to_string(),
                    "quantity": execution.quantity.as_i64(),
                    "price": execution.price.as_i64(),
                    "venue": execution.venue,
                }),
            );
        }
        drop(order);

        self.metrics.fills_applied.fetch_add(1, Ordering::Relaxed);
        if new_status == OrderStatus::Filled {
            self.metrics.orders_filled.fetch_add(1, Ordering::Relaxed);
        }

        let _ = self.event_bus.send(OrderEvent::Filled {
            order_id,
            execution: execution.clone(),
        });
        if new_status != old_status {
            let _ = self.event_bus.send(OrderEvent::StatusChanged {
                order_id,
                old_status,
                new_status,
                timestamp,
            });
        }

        info!(
            %order_id,
            slice_id = %execution.slice_id,
            quantity = %execution.quantity,
            price = %execution.price,
            status = %new_status,
            "fill applied"
        );
        Ok(execution)
    }

    /// Tag the order cancel-pending
    ///
    /// The order keeps its current status and keeps accepting fills until
    /// the execution engine confirms zero outstanding exposure via
    /// [`Self::confirm_cancel`]. Repeated requests are no-ops.
    pub fn request_cancel(&self, order_id: OrderId) -> OmsResult<()> {
        let handle = self.order_handle(order_id)?;
        let mut order = handle.lock();

        if order.is_terminal() {
            return Err(OmsError::InvalidStateTransition {
                order_id,
                operation: "canceled".to_string(),
                current_state: order.status,
            });
        }
        if order.cancel_pending {
            debug!(%order_id, "cancel already pending");
            return Ok(());
        }

        order.cancel_pending = true;
        order.updated_at = Utc::now();
        let timestamp = order.updated_at;
        if self.config.enable_audit {
            self.audit_trail.record(
                order_id,
                AuditKind::CancelRequested,
                json!({ "status": order.status.to_string() }),
            );
        }
        drop(order);

        self.metrics.cancels_requested.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .event_bus
            .send(OrderEvent::CancelRequested {
                order_id,
                timestamp,
            });
        info!(%order_id, "cancel requested");
        Ok(())
    }

    /// Complete a pending cancel after the engine confirmed quiescence
    ///
    /// Returns the resulting terminal status. If late fills completed the
    /// order while the cancel was pending, the fill wins and the order
    /// stays `filled`. Confirming an already-terminal order is a no-op
    /// returning its status.
    pub fn confirm_cancel(&self, order_id: OrderId) -> OmsResult<OrderStatus> {
        let handle = self.order_handle(order_id)?;
        let mut order = handle.lock();

        if order.status == OrderStatus::Filled {
            order.cancel_pending = false;
            info!(%order_id, "cancel confirmed after full fill; order stays filled");
            return Ok(OrderStatus::Filled);
        }
        if order.is_terminal() {
            return Ok(order.status);
        }
        if !order.cancel_pending {
            return Err(OmsError::InvalidStateTransition {
                order_id,
                operation: "cancel-confirmed".to_string(),
                current_state: order.status,
            });
        }

        self.lifecycle
            .validate_transition(&order, OrderStatus::Canceled, "canceled")?;
        let old_status = order.status;
        order.status = OrderStatus::Canceled;
        order.cancel_pending = false;
        order.updated_at = Utc::now();
        let timestamp = order.updated_at;
        let filled_quantity = order.filled_quantity;

        if self.config.enable_audit {
            self.audit_trail.record(
                order_id,
                AuditKind::StatusChanged,
                json!({ "from": old_status.to_string(), "to": "canceled" }),
            );
        }
        drop(order);

        self.metrics.orders_canceled.fetch_add(1, Ordering::Relaxed);
        let _ = self.event_bus.send(OrderEvent::StatusChanged {
            order_id,
            old_status,
            new_status: OrderStatus::Canceled,
            timestamp,
        });
        let _ = self.event_bus.send(OrderEvent::Canceled {
            order_id,
            timestamp,
        });
        info!(%order_id, filled = %filled_quantity, "order canceled");
        Ok(OrderStatus::Canceled)
    }

    /// Reject an order before any fill, e.g. when the venue refuses it
    pub fn reject_order(&self, order_id: OrderId, reason: &str) -> OmsResult<()> {
        let handle = self.order_handle(order_id)?;
        let mut order = handle.lock();

        self.lifecycle
            .validate_transition(&order, OrderStatus::Rejected, "rejected")?;
        let old_status = order.status;
        order.status = OrderStatus::Rejected;
        order.cancel_pending = false;
        order.updated_at = Utc::now();
        let timestamp = order.updated_at;

        if self.config.enable_audit {
            self.audit_trail.record(
                order_id,
                AuditKind::StatusChanged,
                json!({
                    "from": old_status.to_string(),
                    "to": "rejected",
                    "reason": reason,
                }),
            );
        }
        drop(order);

        self.metrics.orders_rejected.fetch_add(1, Ordering::Relaxed);
        let _ = self.event_bus.send(OrderEvent::StatusChanged {
            order_id,
            old_status,
            new_status: OrderStatus::Rejected,
            timestamp,
        });
        warn!(%order_id, reason, "order rejected");
        Ok(())
    }

    /// Amend quantity and/or price
    ///
    /// Permitted only from `new` or `open` with zero fills. Re-validates
    /// the amended attributes as on create and bumps the order version.
    pub fn amend_order(&self, order_id: OrderId, request: AmendRequest) -> OmsResult<Order> {
        let handle = self.order_handle(order_id)?;
        let mut order = handle.lock();

        if !self.lifecycle.can_amend(&order) {
            return Err(OmsError::InvalidStateTransition {
                order_id,
                operation: "amended".to_string(),
                current_state: order.status,
            });
        }

        let new_quantity = request.new_quantity.unwrap_or(order.quantity);
        if new_quantity.as_i64() <= 0 {
            return Err(OmsError::AmendRejected {
                order_id,
                reason: "amended quantity must be positive".to_string(),
            });
        }
        if order.order_type == OrderType::Limit && request.new_price.or(order.price).is_none() {
            return Err(OmsError::AmendRejected {
                order_id,
                reason: "limit order requires a price".to_string(),
            });
        }

        order.quantity = new_quantity;
        order.remaining_quantity = new_quantity.sub(order.filled_quantity);
        if let Some(price) = request.new_price {
            order.price = Some(price);
        }
        order.version += 1;

        let amendment = Amendment {
            id: Uuid::new_v4(),
            order_id,
            new_quantity: request.new_quantity,
            new_price: request.new_price,
            reason: request.reason,
            timestamp: Utc::now(),
        };
        order.amendments.push(amendment.clone());
        order.updated_at = amendment.timestamp;
        let snapshot = order.clone();

        if self.config.enable_audit {
            self.audit_trail.record(
                order_id,
                AuditKind::AmendApplied,
                json!({
                    "new_quantity": amendment.new_quantity.map(|q| q.as_i64()),
                    "new_price": amendment.new_price.map(|p| p.as_i64()),
                    "version": snapshot.version,
                }),
            );
        }
        drop(order);

        self.metrics.amendments.fetch_add(1, Ordering::Relaxed);
        let _ = self.event_bus.send(OrderEvent::Amended {
            order_id,
            amendment,
        });
        info!(%order_id, version = snapshot.version, "order amended");
        Ok(snapshot)
    }

    /// Get an order snapshot by id
    #[must_use]
    pub fn get_order(&self, order_id: OrderId) -> Option<Order> {
        self.orders
            .get(&order_id)
            .map(|entry| entry.value().lock().clone())
    }

    /// Get an order snapshot by client order id
    #[must_use]
    pub fn get_order_by_client_id(&self, client_order_id: &str) -> Option<Order> {
        self.orders.iter().find_map(|entry| {
            let order = entry.value().lock();
            (order.client_order_id.as_deref() == Some(client_order_id)).then(|| order.clone())
        })
    }

    /// All orders matching `filter`, in creation order
    #[must_use]
    pub fn query_orders(&self, filter: &OrderFilter) -> Vec<Order> {
        let mut hits: Vec<Order> = self
            .orders
            .iter()
            .filter_map(|entry| {
                let order = entry.value().lock();
                filter.matches(&order).then(|| order.clone())
            })
            .collect();
        hits.sort_by_key(|o| o.sequence_number);
        hits
    }

    /// All non-terminal orders, in creation order
    #[must_use]
    pub fn active_orders(&self) -> Vec<Order> {
        let mut hits: Vec<Order> = self
            .orders
            .iter()
            .filter_map(|entry| {
                let order = entry.value().lock();
                order.is_active().then(|| order.clone())
            })
            .collect();
        hits.sort_by_key(|o| o.sequence_number);
        hits
    }

    /// Number of orders ever created and still held
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Look up one execution record
    #[must_use]
    pub fn get_execution(&self, id: ExecutionId) -> Option<Arc<Execution>> {
        self.executions.get(id)
    }

    /// All executions of one order
    #[must_use]
    pub fn executions_for_order(&self, order_id: OrderId) -> Vec<Arc<Execution>> {
        self.executions.for_order(order_id)
    }

    /// All executions matching `filter`
    #[must_use]
    pub fn query_executions(&self, filter: &ExecutionFilter) -> Vec<Arc<Execution>> {
        self.executions.query(filter)
    }

    /// Subscribe to order events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.event_bus.subscribe()
    }

    /// The append-only audit trail
    #[must_use]
    pub fn audit_trail(&self) -> &AuditTrail {
        &self.audit_trail
    }

    /// Point-in-time metrics snapshot
    #[must_use]
    pub fn metrics(&self) -> OmsMetricsSnapshot {
        let active_orders = self
            .orders
            .iter()
            .filter(|entry| entry.value().lock().is_active())
            .count();
        OmsMetricsSnapshot {
            orders_created: self.metrics.orders_created.load(Ordering::Relaxed),
            orders_filled: self.metrics.orders_filled.load(Ordering::Relaxed),
            orders_canceled: self.metrics.orders_canceled.load(Ordering::Relaxed),
            orders_rejected: self.metrics.orders_rejected.load(Ordering::Relaxed),
            risk_rejections: self.metrics.risk_rejections.load(Ordering::Relaxed),
            fills_applied: self.metrics.fills_applied.load(Ordering::Relaxed),
            duplicate_fills: self.metrics.duplicate_fills.load(Ordering::Relaxed),
            cancels_requested: self.metrics.cancels_requested.load(Ordering::Relaxed),
            amendments: self.metrics.amendments.load(Ordering::Relaxed),
            active_orders,
        }
    }

    fn order_handle(&self, order_id: OrderId) -> OmsResult<Arc<Mutex<Order>>> {
        self.orders
            .get(&order_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(OmsError::OrderNotFound { order_id })
    }
}
