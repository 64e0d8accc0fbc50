//! Adaptive provider scoring from observed outcomes
//!
//! Keeps an exponential moving average of success plus a sliding latency
//! window per provider, and blends success, speed, and cost into a single
//! routing score.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// EMA smoothing factor
const ALPHA: f64 = 0.1;
/// Score a provider starts with before any observations
const INITIAL_SUCCESS_RATE: f64 = 0.8;
/// Sliding window of latency samples per provider
const LATENCY_WINDOW: usize = 100;

/// Blend weights for the routing score; must sum to 1.0 for scores in [0, 1]
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    pub success: f64,
    pub speed: f64,
    pub cost: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            success: 0.5,
            speed: 0.3,
            cost: 0.2,
        }
    }
}

#[derive(Debug)]
struct ProviderStats {
    success_rate: f64,
    latencies: Vec<f64>,
    last_cost: f64,
    total_requests: u64,
    total_successes: u64,
}

impl ProviderStats {
    fn new() -> Self {
        Self {
            success_rate: INITIAL_SUCCESS_RATE,
            latencies: Vec::new(),
            last_cost: 0.0,
            total_requests: 0,
            total_successes: 0,
        }
    }

    fn avg_latency(&self) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        self.latencies.iter().sum::<f64>() / self.latencies.len() as f64
    }
}

/// Serializable stats snapshot for the admin surface
#[derive(Debug, Clone, Serialize)]
pub struct ProviderScore {
    pub name: String,
    pub score: f64,
    pub success_rate: f64,
    pub avg_latency_secs: f64,
    pub last_cost: f64,
    pub total_requests: u64,
    pub total_successes: u64,
}

/// Learns per-provider performance and ranks providers by a blended score
#[derive(Default)]
pub struct AdaptiveRouter {
    stats: DashMap<String, Mutex<ProviderStats>>,
    weights: ScoreWeights,
}

impl AdaptiveRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: ScoreWeights) -> Self {
        Self {
            stats: DashMap::new(),
            weights,
        }
    }

    /// Record one completed attempt
    pub fn record(&self, provider: &str, success: bool, latency: Duration, cost: f64) {
        let entry = self
            .stats
            .entry(provider.to_string())
            .or_insert_with(|| Mutex::new(ProviderStats::new()));
        let mut stats = entry.lock();

        let outcome = if success { 1.0 } else { 0.0 };
        stats.success_rate = ALPHA * outcome + (1.0 - ALPHA) * stats.success_rate;

        stats.latencies.push(latency.as_secs_f64());
        if stats.latencies.len() > LATENCY_WINDOW {
            stats.latencies.remove(0);
        }

        if cost > 0.0 {
            stats.last_cost = cost;
        }

        stats.total_requests += 1;
        if success {
            stats.total_successes += 1;
        }
        debug!(
            provider = %provider,
            success,
            success_rate = stats.success_rate,
            "Recorded attempt outcome"
        );
    }

    /// Blended routing score in [0, 1], higher is better
    pub fn score(&self, provider: &str) -> f64 {
        match self.stats.get(provider) {
            Some(entry) => {
                let stats = entry.lock();
                let speed = 1.0 / (1.0 + stats.avg_latency() / 10.0);
                let cost = 1.0 / (1.0 + stats.last_cost * 10.0);
                self.weights.success * stats.success_rate
                    + self.weights.speed * speed
                    + self.weights.cost * cost
            }
            None => {
                // Unobserved providers get the neutral starting score
                self.weights.success * INITIAL_SUCCESS_RATE + self.weights.speed + self.weights.cost
            }
        }
    }

    /// Best-scoring provider from a candidate list
    pub fn best_provider<'a>(&self, candidates: &[&'a str]) -> Option<&'a str> {
        candidates
            .iter()
            .map(|name| (*name, self.score(name)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(name, _)| name)
    }

    /// Candidates sorted best first
    pub fn rank<'a>(&self, candidates: &[&'a str]) -> Vec<&'a str> {
        let mut scored: Vec<(&str, f64)> = candidates
            .iter()
            .map(|name| (*name, self.score(name)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(name, _)| name).collect()
    }

    /// P90 of the latency window, if any samples exist
    pub fn p90_latency(&self, provider: &str) -> Option<Duration> {
        let entry = self.stats.get(provider)?;
        let stats = entry.lock();
        if stats.latencies.is_empty() {
            return None;
        }
        let mut sorted = stats.latencies.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let idx = ((sorted.len() as f64 * 0.9).ceil() as usize).saturating_sub(1);
        Some(Duration::from_secs_f64(sorted[idx]))
    }

    /// Number of latency samples collected for a provider
    pub fn sample_count(&self, provider: &str) -> usize {
        self.stats
            .get(provider)
            .map(|e| e.lock().latencies.len())
            .unwrap_or(0)
    }

    pub fn provider_score(&self, provider: &str) -> Option<ProviderScore> {
        let entry = self.stats.get(provider)?;
        let score = self.score(provider);
        let stats = entry.lock();
        Some(ProviderScore {
            name: provider.to_string(),
            score,
            success_rate: stats.success_rate,
            avg_latency_secs: stats.avg_latency(),
            last_cost: stats.last_cost,
            total_requests: stats.total_requests,
            total_successes: stats.total_successes,
        })
    }

    /// Stats for every observed provider, best score first
    pub fn all_scores(&self) -> Vec<ProviderScore> {
        let mut scores: Vec<ProviderScore> = self
            .stats
            .iter()
            .filter_map(|e| self.provider_score(e.key()))
            .collect();
        scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scores
    }
}
