//! Portfolio sub-account registry
//!
//! Supplies the sub-account weights behind each portfolio. The allocation
//! splitter uses these weights for pro-rata splits; nothing here knows about
//! orders or executions.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use services_common::constants::fixed_point::BASIS_POINTS;
use services_common::{AccountId, PortfolioId};
use thiserror::Error;

/// Registry error types
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No sub-account weights registered for the portfolio
    #[error("unknown portfolio: {portfolio_id}")]
    UnknownPortfolio {
        /// The portfolio that has no registered weights
        portfolio_id: PortfolioId,
    },

    /// Weights do not form a full allocation
    #[error("weights for portfolio {portfolio_id} sum to {sum_bps} bps, expected {expected} bps")]
    InvalidWeights {
        /// The portfolio whose weights are inconsistent
        portfolio_id: PortfolioId,
        /// Actual sum of the registered weights
        sum_bps: i64,
        /// Required sum (10_000 bps)
        expected: i64,
    },
}

/// Type alias for registry results
pub type RegistryResult<T> = Result<T, RegistryError>;

/// One sub-account's share of a portfolio, in basis points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountWeight {
    /// Destination account
    pub account_id: AccountId,
    /// Share of the portfolio (10_000 bps = 100%)
    pub weight_bps: i32,
}

impl AccountWeight {
    /// Create a weight entry
    pub fn new(account_id: impl Into<String>, weight_bps: i32) -> Self {
        Self {
            account_id: AccountId::new(account_id),
            weight_bps,
        }
    }
}

/// Source of per-portfolio sub-account weights
pub trait AccountRegistry: Send + Sync {
    /// Sub-accounts of `portfolio_id`, in registration order. The order is
    /// load-bearing: pro-rata rounding remainders go to the first account.
    fn sub_accounts(&self, portfolio_id: &PortfolioId) -> RegistryResult<Vec<AccountWeight>>;
}

/// In-memory registry with statically configured weights
#[derive(Debug, Default)]
pub struct StaticAccountRegistry {
    weights: FxHashMap<PortfolioId, Vec<AccountWeight>>,
}

impl StaticAccountRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a portfolio's sub-account weights. Weights must sum to
    /// exactly 10_000 bps.
    pub fn register(
        &mut self,
        portfolio_id: PortfolioId,
        weights: Vec<AccountWeight>,
    ) -> RegistryResult<()> {
        let sum_bps: i64 = weights.iter().map(|w| i64::from(w.weight_bps)).sum();
        if sum_bps != BASIS_POINTS {
            return Err(RegistryError::InvalidWeights {
                portfolio_id,
                sum_bps,
                expected: BASIS_POINTS,
            });
        }
        self.weights.insert(portfolio_id, weights);
        Ok(())
    }
}

impl AccountRegistry for StaticAccountRegistry {
    fn sub_accounts(&self, portfolio_id: &PortfolioId) -> RegistryResult<Vec<AccountWeight>> {
        self.weights
            .get(portfolio_id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownPortfolio {
                portfolio_id: portfolio_id.clone(),
            })
    }
}
