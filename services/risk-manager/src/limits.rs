//! Static limit based risk service

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use services_common::constants::fixed_point::SCALE_4;
use services_common::{PortfolioId, Qty, Symbol};
use tracing::debug;

use crate::{RiskCheckRequest, RiskDecision, RiskService};

/// Per-portfolio risk limits
#[derive(Debug, Clone)]
pub struct RiskLimits {
    /// Maximum quantity per order
    pub max_order_quantity: Qty,
    /// Maximum notional per order, in ticks
    pub max_order_notional: i64,
    /// Symbols this portfolio may not trade
    pub restricted_symbols: Vec<Symbol>,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_order_quantity: Qty::from_units(100_000), // 100K units
            max_order_notional: 10_000_000 * SCALE_4,     // 10M in value
            restricted_symbols: Vec::new(),
        }
    }
}

/// Risk service backed by static per-portfolio limits
///
/// Unknown portfolios fall back to the default limits. Restricted symbols
/// are denied outright; size and notional breaches come back approved with
/// a `max_quantity` below the request, which the engine turns into a
/// rejection.
#[derive(Debug, Default)]
pub struct LimitsRiskService {
    limits: FxHashMap<PortfolioId, RiskLimits>,
    default_limits: RiskLimits,
}

impl LimitsRiskService {
    /// Create with default limits for every portfolio
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override limits for one portfolio
    #[must_use]
    pub fn with_limits(mut self, portfolio: PortfolioId, limits: RiskLimits) -> Self {
        self.limits.insert(portfolio, limits);
        self
    }

    fn limits_for(&self, portfolio: &PortfolioId) -> &RiskLimits {
        self.limits.get(portfolio).unwrap_or(&self.default_limits)
    }
}

#[async_trait]
impl RiskService for LimitsRiskService {
    async fn approve(&self, request: &RiskCheckRequest) -> RiskDecision {
        let limits = self.limits_for(&request.portfolio_id);

        if limits.restricted_symbols.contains(&request.symbol) {
            debug!(
                portfolio = %request.portfolio_id,
                symbol = %request.symbol,
                "risk denial: restricted symbol"
            );
            return RiskDecision::denied(format!("symbol {} is restricted", request.symbol));
        }

        let mut max_quantity = limits.max_order_quantity;

        // A limit price bounds the order's notional; cap the approvable
        // quantity so notional stays within the limit.
        if let Some(price) = request.price
            && price.as_i64() > 0
        {
            let by_notional = (limits.max_order_notional as i128 * SCALE_4 as i128
                / price.as_i64() as i128) as i64;
            max_quantity = max_quantity.min(Qty::from_i64(by_notional));
        }

        if request.quantity > max_quantity {
            debug!(
                portfolio = %request.portfolio_id,
                requested = %request.quantity,
                approved = %max_quantity,
                "risk approval below requested quantity"
            );
        }

        let mut decision = RiskDecision::approved(max_quantity);
        decision.reason = format!("approved up to {max_quantity}");
        decision
    }
}

/// Risk service that approves everything, for tests and demos
#[derive(Debug, Default)]
pub struct UnlimitedRiskService;

#[async_trait]
impl RiskService for UnlimitedRiskService {
    async fn approve(&self, request: &RiskCheckRequest) -> RiskDecision {
        RiskDecision::approved(request.quantity)
    }
}
