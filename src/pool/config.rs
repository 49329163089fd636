//! Pool sizing and timeout policy.
use std::time::Duration;

/// Pool sizing and timeout policy. Cheaply cloneable; [`Pool::set_config`]
/// swaps it under the pool's lock and bumps a change counter so in-flight
/// scheduled ticks referencing a stale configuration drop themselves.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub max_connections: usize,
    pub max_pending_requests: Option<usize>,
    pub pending_request_timeout: Option<Duration>,
    pub allocated_connection_timeout: Option<Duration>,
    pub metrics_log_interval: Option<Duration>,
}

impl PoolConfig {
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            max_pending_requests: None,
            pending_request_timeout: None,
            allocated_connection_timeout: None,
            metrics_log_interval: None,
        }
    }

    pub fn max_pending_requests(mut self, n: usize) -> Self {
        self.max_pending_requests = Some(n);
        self
    }

    pub fn pending_request_timeout(mut self, timeout: Duration) -> Self {
        self.pending_request_timeout = Some(timeout);
        self
    }

    pub fn allocated_connection_timeout(mut self, timeout: Duration) -> Self {
        self.allocated_connection_timeout = Some(timeout);
        self
    }

    pub fn metrics_log_interval(mut self, interval: Duration) -> Self {
        self.metrics_log_interval = Some(interval);
        self
    }
}
