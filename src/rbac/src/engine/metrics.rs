//! Query metrics collection

use crate::config::QueryKind;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of the query counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryMetricsSnapshot {
    /// Total number of answered queries
    pub total_queries: u64,

    /// Queries answered `true`
    pub allowed: u64,

    /// Queries answered `false`
    pub denied: u64,

    /// Queries answered by simulation mode
    pub simulated: u64,

    /// Role membership queries
    pub role_queries: u64,

    /// Permission membership queries
    pub permission_queries: u64,

    /// Entity-level queries
    pub entity_queries: u64,

    /// Effective role set resolutions
    pub resolutions: u64,

    /// Queries that failed with an error
    pub errors: u64,
}

impl QueryMetricsSnapshot {
    /// Calculate allow rate
    pub fn allow_rate(&self) -> f64 {
        let total = self.allowed + self.denied;
        if total == 0 {
            0.0
        } else {
            self.allowed as f64 / total as f64
        }
    }
}

/// Lock-free query counters, shareable across authorizers
#[derive(Debug, Default)]
pub struct QueryMetrics {
    total_queries: AtomicU64,
    allowed: AtomicU64,
    denied: AtomicU64,
    simulated: AtomicU64,
    role_queries: AtomicU64,
    permission_queries: AtomicU64,
    entity_queries: AtomicU64,
    resolutions: AtomicU64,
    errors: AtomicU64,
}

impl QueryMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an answered query
    pub fn record_query(&self, kind: QueryKind, allowed: bool, simulated: bool) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);

        let counter = match kind {
            QueryKind::RoleIs => &self.role_queries,
            QueryKind::May => &self.permission_queries,
            QueryKind::Allowed => &self.entity_queries,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if allowed {
            self.allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.denied.fetch_add(1, Ordering::Relaxed);
        }

        if simulated {
            self.simulated.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an effective-set resolution
    pub fn record_resolution(&self) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an error
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> QueryMetricsSnapshot {
        QueryMetricsSnapshot {
            total_queries: self.total_queries.load(Ordering::Relaxed),
            allowed: self.allowed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            simulated: self.simulated.load(Ordering::Relaxed),
            role_queries: self.role_queries.load(Ordering::Relaxed),
            permission_queries: self.permission_queries.load(Ordering::Relaxed),
            entity_queries: self.entity_queries.load(Ordering::Relaxed),
            resolutions: self.resolutions.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in [
            &self.total_queries,
            &self.allowed,
            &self.denied,
            &self.simulated,
            &self.role_queries,
            &self.permission_queries,
            &self.entity_queries,
            &self.resolutions,
            &self.errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
