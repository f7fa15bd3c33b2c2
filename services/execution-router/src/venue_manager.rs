//! Venue registry, routing, and per-venue statistics

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::error::{ExecutionError, ExecutionResult};
use crate::venue::VenueAdapter;

/// Routing view of a venue's health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VenueStatus {
    /// Healthy and taking orders
    Available,
    /// Registered but refusing orders
    Unavailable,
}

/// Per-venue counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VenueStats {
    /// Slices acknowledged
    pub slices_sent: u64,
    /// Fills received
    pub fills_received: u64,
    /// Submissions that failed
    pub submit_failures: u64,
    /// Most recent failure reason
    pub last_error: Option<String>,
}

/// Registry of venue adapters with hint-then-default routing
pub struct VenueManager {
    venues: RwLock<FxHashMap<String, Arc<dyn VenueAdapter>>>,
    stats: RwLock<FxHashMap<String, VenueStats>>,
    default_venue: String,
}

impl VenueManager {
    /// Create a manager routing to `default_venue` absent a hint
    #[must_use]
    pub fn new(default_venue: impl Into<String>) -> Self {
        Self {
            venues: RwLock::new(FxHashMap::default()),
            stats: RwLock::new(FxHashMap::default()),
            default_venue: default_venue.into(),
        }
    }

    /// Register a venue adapter under its own name
    pub fn register(&self, adapter: Arc<dyn VenueAdapter>) {
        let name = adapter.name().to_string();
        self.stats
            .write()
            .entry(name.clone())
            .or_insert_with(VenueStats::default);
        self.venues.write().insert(name, adapter);
    }

    /// Pick a venue: the hint if healthy, then the default, then any
    /// healthy venue
    pub async fn select(&self, hint: Option<&str>) -> ExecutionResult<Arc<dyn VenueAdapter>> {
        let candidates: Vec<Arc<dyn VenueAdapter>> = {
            let venues = self.venues.read();
            let mut ordered = Vec::with_capacity(venues.len());
            if let Some(hint) = hint
                && let Some(adapter) = venues.get(hint)
            {
                ordered.push(Arc::clone(adapter));
            }
            if let Some(adapter) = venues.get(&self.default_venue) {
                ordered.push(Arc::clone(adapter));
            }
            for adapter in venues.values() {
                ordered.push(Arc::clone(adapter));
            }
            ordered
        };

        let mut seen = Vec::new();
        for adapter in candidates {
            if seen.iter().any(|name: &String| name == adapter.name()) {
                continue;
            }
            seen.push(adapter.name().to_string());
            if adapter.is_healthy().await {
                return Ok(adapter);
            }
        }
        warn!(?hint, "no healthy venue");
        Err(ExecutionError::NoVenuesAvailable)
    }

    /// Health of one venue, if registered
    pub async fn status(&self, name: &str) -> Option<VenueStatus> {
        let adapter = self.venues.read().get(name).map(Arc::clone)?;
        Some(if adapter.is_healthy().await {
            VenueStatus::Available
        } else {
            VenueStatus::Unavailable
        })
    }

    /// Health of every registered venue
    pub async fn statuses(&self) -> FxHashMap<String, VenueStatus> {
        let adapters: Vec<Arc<dyn VenueAdapter>> =
            self.venues.read().values().map(Arc::clone).collect();
        let mut statuses = FxHashMap::default();
        for adapter in adapters {
            let status = if adapter.is_healthy().await {
                VenueStatus::Available
            } else {
                VenueStatus::Unavailable
            };
            statuses.insert(adapter.name().to_string(), status);
        }
        statuses
    }

    /// Record an acknowledged slice
    pub fn record_slice_sent(&self, venue: &str) {
        let mut stats = self.stats.write();
        stats.entry(venue.to_string()).or_default().slices_sent += 1;
    }

    /// Record a received fill
    pub fn record_fill(&self, venue: &str) {
        let mut stats = self.stats.write();
        stats.entry(venue.to_string()).or_default().fills_received += 1;
    }

    /// Record a failed submission
    pub fn record_failure(&self, venue: &str, error: &str) {
        let mut stats = self.stats.write();
        let entry = stats.entry(venue.to_string()).or_default();
        entry.submit_failures += 1;
        entry.last_error = Some(error.to_string());
    }

    /// Counters for one venue
    #[must_use]
    pub fn stats(&self, venue: &str) -> Option<VenueStats> {
        self.stats.read().get(venue).cloned()
    }

    /// The configured default venue name
    #[must_use]
    pub fn default_venue(&self) -> &str {
        &self.default_venue
    }
}
