//! In-memory cost tracking for completed generations

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::provider::model::MediaType;

/// Bound on retained records; oldest are dropped beyond this
const MAX_RECORDS: usize = 10_000;

#[derive(Debug, Clone, Serialize)]
pub struct CostRecord {
    pub provider: String,
    pub model: String,
    pub media_type: MediaType,
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate view for the admin surface
#[derive(Debug, Clone, Serialize)]
pub struct CostSummary {
    pub total: f64,
    pub record_count: usize,
    pub by_provider: HashMap<String, f64>,
    pub by_media_type: HashMap<String, f64>,
}

/// Tracks the spend of winning generation attempts
#[derive(Default)]
pub struct CostTracker {
    records: Mutex<Vec<CostRecord>>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, provider: &str, model: &str, media_type: MediaType, cost: f64) {
        if cost <= 0.0 {
            return;
        }
        debug!(provider = %provider, model = %model, cost, "Recorded generation cost");
        let mut records = self.records.lock();
        records.push(CostRecord {
            provider: provider.to_string(),
            model: model.to_string(),
            media_type,
            cost,
            timestamp: Utc::now(),
        });
        if records.len() > MAX_RECORDS {
            let excess = records.len() - MAX_RECORDS;
            records.drain(..excess);
        }
    }

    pub fn total(&self) -> f64 {
        self.records.lock().iter().map(|r| r.cost).sum()
    }

    pub fn total_for_provider(&self, provider: &str) -> f64 {
        self.records
            .lock()
            .iter()
            .filter(|r| r.provider == provider)
            .map(|r| r.cost)
            .sum()
    }

    pub fn summary(&self) -> CostSummary {
        let records = self.records.lock();
        let mut by_provider: HashMap<String, f64> = HashMap::new();
        let mut by_media_type: HashMap<String, f64> = HashMap::new();
        let mut total = 0.0;
        for r in records.iter() {
            total += r.cost;
            *by_provider.entry(r.provider.clone()).or_default() += r.cost;
            *by_media_type
                .entry(r.media_type.as_str().to_string())
                .or_default() += r.cost;
        }
        CostSummary {
            total,
            record_count: records.len(),
            by_provider,
            by_media_type,
        }
    }

    /// Whether spend stays under a budget; a budget of zero disables the check
    pub fn within_budget(&self, budget: f64) -> bool {
        budget <= 0.0 || self.total() < budget
    }
}
