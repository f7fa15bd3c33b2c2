//! Risk approval boundary for order creation
//!
//! The execution engine consults a `RiskService` before creating any order
//! and rejects requests the service does not approve. The engine never caps
//! a quantity silently; if the approved maximum is below the request, the
//! order is rejected at creation.

pub mod limits;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use services_common::{OrderSide, PortfolioId, Px, Qty, Symbol};

pub use limits::{LimitsRiskService, RiskLimits, UnlimitedRiskService};

/// Order attributes submitted for risk approval
#[derive(Debug, Clone)]
pub struct RiskCheckRequest {
    /// Portfolio placing the order
    pub portfolio_id: PortfolioId,
    /// Instrument
    pub symbol: Symbol,
    /// Buy or sell
    pub side: OrderSide,
    /// Requested quantity
    pub quantity: Qty,
    /// Limit price, when the order carries one
    pub price: Option<Px>,
}

/// Outcome of a risk check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDecision {
    /// Whether the request is approved at all
    pub approved: bool,
    /// Largest quantity the service would approve for this request
    pub max_quantity: Qty,
    /// Human-readable grounds for the decision
    pub reason: String,
}

impl RiskDecision {
    /// Approval for up to `max_quantity`
    #[must_use]
    pub fn approved(max_quantity: Qty) -> Self {
        Self {
            approved: true,
            max_quantity,
            reason: "approved".to_string(),
        }
    }

    /// Outright denial
    #[must_use]
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            max_quantity: Qty::ZERO,
            reason: reason.into(),
        }
    }
}

/// Risk approval service consulted before order creation
#[async_trait]
pub trait RiskService: Send + Sync {
    /// Evaluate one order request. Never mutates engine state.
    async fn approve(&self, request: &RiskCheckRequest) -> RiskDecision;
}
