//! Per-dependency circuit breakers.

use std::sync::Arc;

use dashmap::DashMap;

use crate::resilience::circuit_breaker::{BreakerSettings, BreakerStats, CircuitBreaker, CircuitState};

/// Lazily creates one breaker per name, all sharing the same settings.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    defaults: BreakerSettings,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(defaults: BreakerSettings) -> Self {
        Self {
            defaults,
            breakers: DashMap::new(),
        }
    }

    /// The breaker for `name`, created on first use.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(name) {
            return Arc::clone(breaker.value());
        }
        let breaker = self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.defaults.clone())));
        Arc::clone(breaker.value())
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Snapshot of every breaker, sorted by name.
    pub fn stats(&self) -> Vec<(String, BreakerStats)> {
        let mut stats: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    /// Force every breaker back to Closed.
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            if entry.value().state() != CircuitState::Closed {
                entry.value().force_state(CircuitState::Closed);
            }
        }
    }
}
