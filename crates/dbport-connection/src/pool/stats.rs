//! Pool statistics

use serde::{Deserialize, Serialize};

/// Point-in-time counters for one pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Idle plus active connections
    pub total: usize,
    pub idle: usize,
    /// Connections currently leased
    pub active: usize,
    /// Acquires waiting for a lease slot or a new connection
    pub waiting: usize,
}

impl PoolStats {
    pub fn new(total: usize, idle: usize, active: usize, waiting: usize) -> Self {
        Self {
            total,
            idle,
            active,
            waiting,
        }
    }

    /// Share of open connections that are leased, between 0.0 and 1.0
    pub fn utilization(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.active as f64 / self.total as f64
        }
    }

    /// True when every open connection is leased
    pub fn is_saturated(&self) -> bool {
        self.idle == 0 && self.total > 0
    }
}
