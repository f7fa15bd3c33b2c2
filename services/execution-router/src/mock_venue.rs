//! Deterministic in-process venue for demos and tests
//!
//! Fills every acknowledged slice after a configurable latency, at the
//! posted market price (or the slice's limit price), charging commission
//! in basis points of notional. Tests can script partial fills, exact
//! fill sequences, transient submit failures, outages, and fills that
//! race a cancel.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use oms::execution::{Fees, FillReport};
use parking_lot::Mutex;
use services_common::constants::fixed_point::BASIS_POINTS;
use services_common::{OrderId, OrderSide, Px, Qty, Symbol};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{ExecutionError, ExecutionResult};
use crate::venue::{Slice, SubmitAck, VenueAdapter, VenueEvent};

/// Mock venue behavior
#[derive(Debug, Clone)]
pub struct MockVenueConfig {
    /// Venue name reported in execution records
    pub name: String,
    /// Delay between acknowledgement and the fill report
    pub fill_latency: Duration,
    /// Delay between a cancel request and its confirmation
    pub cancel_latency: Duration,
    /// Commission charged, in basis points of notional
    pub commission_bps: i32,
    /// Adverse price movement applied to market slices, in basis points
    pub slippage_bps: i32,
    /// How much of each slice gets filled
    pub fill_mode: FillMode,
}

/// Fill behavior per slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    /// Fill the whole slice
    Full,
    /// Fill this share of each slice, in basis points
    PartialBps(i32),
}

impl Default for MockVenueConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            fill_latency: Duration::from_millis(5),
            cancel_latency: Duration::from_millis(25),
            commission_bps: 5,
            slippage_bps: 0,
            fill_mode: FillMode::Full,
        }
    }
}

struct VenueState {
    config: MockVenueConfig,
    prices: DashMap<Symbol, Px>,
    scripted: Mutex<VecDeque<(Qty, Px)>>,
    events: broadcast::Sender<VenueEvent>,
    canceled: DashMap<OrderId, ()>,
    healthy: AtomicBool,
    fail_submits: AtomicU32,
    reject_slices: AtomicU32,
    fills_survive_cancel: AtomicBool,
    next_venue_order: AtomicU64,
}

/// In-process venue adapter with scriptable behavior
pub struct MockVenue {
    state: Arc<VenueState>,
}

impl MockVenue {
    /// Create a mock venue
    #[must_use]
    pub fn new(config: MockVenueConfig) -> Self {
        let (events, _) = broadcast::channel(2048);
        Self {
            state: Arc::new(VenueState {
                config,
                prices: DashMap::new(),
                scripted: Mutex::new(VecDeque::new()),
                events,
                canceled: DashMap::new(),
                healthy: AtomicBool::new(true),
                fail_submits: AtomicU32::new(0),
                reject_slices: AtomicU32::new(0),
                fills_survive_cancel: AtomicBool::new(false),
                next_venue_order: AtomicU64::new(1),
            }),
        }
    }

    /// Post the market price for a symbol
    pub fn set_price(&self, symbol: Symbol, price: Px) {
        self.state.prices.insert(symbol, price);
    }

    /// Take the venue up or down
    pub fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::Release);
    }

    /// Fail the next `count` submissions with a transient error
    pub fn fail_next_submits(&self, count: u32) {
        self.state.fail_submits.store(count, Ordering::Release);
    }

    /// Reject the next `count` slices after acknowledging them
    pub fn reject_next_slices(&self, count: u32) {
        self.state.reject_slices.store(count, Ordering::Release);
    }

    /// Queue an exact fill for the next submitted slice
    ///
    /// Scripted fills are consumed in submission order and capped at the
    /// slice quantity; when the queue is empty the configured fill mode
    /// applies.
    pub fn script_fill(&self, quantity: Qty, price: Px) {
        self.state.scripted.lock().push_back((quantity, price));
    }

    /// Let fills already in flight land even after a cancel arrives
    pub fn set_fills_survive_cancel(&self, survive: bool) {
        self.state
            .fills_survive_cancel
            .store(survive, Ordering::Release);
    }
}

impl VenueState {
    fn fees_for(&self, price: Px, quantity: Qty) -> Fees {
        let notional = i128::from(price.mul_qty(quantity));
        let commission = notional * i128::from(self.config.commission_bps) / i128::from(BASIS_POINTS);
        Fees::new(i64::try_from(commission).unwrap_or(i64::MAX), 0)
    }

    fn execution_price(&self, slice: &Slice) -> ExecutionResult<Px> {
        if let Some(limit) = slice.limit_price {
            return Ok(limit);
        }
        let market = self
            .prices
            .get(&slice.symbol)
            .map(|entry| *entry.value())
            .ok_or_else(|| ExecutionError::NoMarketPrice {
                venue: self.config.name.clone(),
                symbol: slice.symbol.clone(),
            })?;

        // Market slices pay the spread: buys a touch above, sells below.
        let drift = i128::from(market.as_i64()) * i128::from(self.config.slippage_bps)
            / i128::from(BASIS_POINTS);
        let drift = i64::try_from(drift).unwrap_or(0);
        Ok(match slice.side {
            OrderSide::Buy => Px::from_i64(market.as_i64() + drift),
            OrderSide::Sell => Px::from_i64(market.as_i64() - drift),
        })
    }
}

#[async_trait]
impl VenueAdapter for MockVenue {
    fn name(&self) -> &str {
        &self.state.config.name
    }

    async fn submit_slice(&self, slice: Slice) -> ExecutionResult<SubmitAck> {
        let state = &self.state;
        if !state.healthy.load(Ordering::Acquire) {
            return Err(ExecutionError::VenueUnavailable {
                venue: state.config.name.clone(),
                reason: "venue offline".to_string(),
            });
        }
        if state
            .fail_submits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ExecutionError::VenueUnavailable {
                venue: state.config.name.clone(),
                reason: "transient submit failure".to_string(),
            });
        }

        let reject = state
            .reject_slices
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();

        // Scripted fills carry their own price and are not consumed by
        // slices that are about to be rejected.
        let (fill_quantity, fill_price) = if reject {
            (Qty::ZERO, Px::ZERO)
        } else {
            match state.scripted.lock().pop_front() {
                Some((quantity, scripted_price)) => (quantity.min(slice.quantity), scripted_price),
                None => {
                    let price = state.execution_price(&slice)?;
                    match state.config.fill_mode {
                        FillMode::Full => (slice.quantity, price),
                        FillMode::PartialBps(bps) => {
                            let part = i128::from(slice.quantity.as_i64()) * i128::from(bps)
                                / i128::from(BASIS_POINTS);
                            (Qty::from_i64(i64::try_from(part).unwrap_or(0)), price)
                        }
                    }
                }
            }
        };

        let venue_order_id = format!(
            "{}-{}",
            state.config.name.to_uppercase(),
            state.next_venue_order.fetch_add(1, Ordering::Relaxed)
        );
        debug!(
            slice_id = %slice.id,
            order_id = %slice.order_id,
            quantity = %slice.quantity,
            %venue_order_id,
            "slice accepted"
        );

        let state = Arc::clone(state);
        tokio::spawn(async move {
            tokio::time::sleep(state.config.fill_latency).await;

            if reject {
                let _ = state.events.send(VenueEvent::SliceRejected {
                    slice_id: slice.id,
                    order_id: slice.order_id,
                    reason: "rejected by venue".to_string(),
                });
                return;
            }

            let canceled = state.canceled.contains_key(&slice.order_id);
            if canceled && !state.fills_survive_cancel.load(Ordering::Acquire) {
                // The cancel beat the fill; the slice dies quietly.
                return;
            }

            if fill_quantity > Qty::ZERO {
                let report = FillReport {
                    slice_id: slice.id,
                    quantity: fill_quantity,
                    price: fill_price,
                    venue: state.config.name.clone(),
                    fees: state.fees_for(fill_price, fill_quantity),
                    executed_at: Utc::now(),
                };
                let _ = state.events.send(VenueEvent::Fill {
                    order_id: slice.order_id,
                    report,
                });
            }
            let _ = state.events.send(VenueEvent::SliceDone {
                slice_id: slice.id,
                order_id: slice.order_id,
                filled: fill_quantity,
            });
        });

        Ok(SubmitAck {
            slice_id: slice.id,
            venue_order_id,
        })
    }

    async fn cancel_slices(&self, order_id: OrderId) -> ExecutionResult<()> {
        self.state.canceled.insert(order_id, ());
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            tokio::time::sleep(state.config.cancel_latency).await;
            let _ = state.events.send(VenueEvent::CancelConfirmed { order_id });
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<VenueEvent> {
        self.state.events.subscribe()
    }

    async fn is_healthy(&self) -> bool {
        self.state.healthy.load(Ordering::Acquire)
    }
}
