//! Pool performance metrics accumulation and snapshotting.
use std::time::{Duration, Instant};

/// Running accumulators for the current metrics window. Reset by
/// [`Pool::compute_metrics`][super::Pool::compute_metrics] when called with
/// `reset = true`.
#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    window_start: Instant,
    successful_requests: u64,
    unsuccessful_requests_too_busy: u64,
    unsuccessful_requests_timed_out: u64,
    unsuccessful_requests_error: u64,
    time_to_acquire_sum: Duration,
    time_to_acquire_count: u64,
    pending_queue_min: usize,
    pending_queue_max: usize,
    connections_created: u64,
    allocated_connections_timed_out: u64,
    allocated_connections_closed_by_requestor: u64,
}

impl MetricsAccumulator {
    pub(crate) fn new() -> Self {
        Self {
            window_start: Instant::now(),
            successful_requests: 0,
            unsuccessful_requests_too_busy: 0,
            unsuccessful_requests_timed_out: 0,
            unsuccessful_requests_error: 0,
            time_to_acquire_sum: Duration::ZERO,
            time_to_acquire_count: 0,
            pending_queue_min: 0,
            pending_queue_max: 0,
            connections_created: 0,
            allocated_connections_timed_out: 0,
            allocated_connections_closed_by_requestor: 0,
        }
    }

    pub(crate) fn record_success(&mut self, time_to_acquire: Duration) {
        self.successful_requests += 1;
        self.time_to_acquire_sum += time_to_acquire;
        self.time_to_acquire_count += 1;
    }

    pub(crate) fn record_too_busy(&mut self) {
        self.unsuccessful_requests_too_busy += 1;
    }

    pub(crate) fn record_timed_out(&mut self) {
        self.unsuccessful_requests_timed_out += 1;
    }

    pub(crate) fn record_error(&mut self) {
        self.unsuccessful_requests_error += 1;
    }

    pub(crate) fn record_connection_created(&mut self) {
        self.connections_created += 1;
    }

    pub(crate) fn record_allocated_timed_out(&mut self) {
        self.allocated_connections_timed_out += 1;
    }

    pub(crate) fn record_allocated_closed_by_requestor(&mut self) {
        self.allocated_connections_closed_by_requestor += 1;
    }

    pub(crate) fn observe_pending_queue_len(&mut self, len: usize) {
        if self.time_to_acquire_count == 0
            && self.successful_requests == 0
            && self.unsuccessful_requests_too_busy == 0
            && self.unsuccessful_requests_timed_out == 0
        {
            self.pending_queue_min = len;
            self.pending_queue_max = len;
        } else {
            self.pending_queue_min = self.pending_queue_min.min(len);
            self.pending_queue_max = self.pending_queue_max.max(len);
        }
    }

    pub(crate) fn snapshot(&self, connections_at_start: usize, connections_at_end: usize) -> PoolMetrics {
        let average_time_to_acquire = if self.time_to_acquire_count > 0 {
            self.time_to_acquire_sum / self.time_to_acquire_count as u32
        } else {
            Duration::ZERO
        };
        PoolMetrics {
            window_start: self.window_start,
            window_end: Instant::now(),
            successful_requests: self.successful_requests,
            unsuccessful_requests_too_busy: self.unsuccessful_requests_too_busy,
            unsuccessful_requests_timed_out: self.unsuccessful_requests_timed_out,
            unsuccessful_requests_error: self.unsuccessful_requests_error,
            average_time_to_acquire,
            pending_queue_min: self.pending_queue_min,
            pending_queue_max: self.pending_queue_max,
            connections_at_start,
            connections_at_end,
            connections_created: self.connections_created,
            allocated_connections_timed_out: self.allocated_connections_timed_out,
            allocated_connections_closed_by_requestor: self.allocated_connections_closed_by_requestor,
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }
}

/// A point-in-time snapshot of pool performance metrics over a window.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub window_start: Instant,
    pub window_end: Instant,
    pub successful_requests: u64,
    pub unsuccessful_requests_too_busy: u64,
    pub unsuccessful_requests_timed_out: u64,
    pub unsuccessful_requests_error: u64,
    pub average_time_to_acquire: Duration,
    pub pending_queue_min: usize,
    pub pending_queue_max: usize,
    pub connections_at_start: usize,
    pub connections_at_end: usize,
    pub connections_created: u64,
    pub allocated_connections_timed_out: u64,
    pub allocated_connections_closed_by_requestor: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_time_to_acquire_across_successes() {
        let mut acc = MetricsAccumulator::new();
        acc.record_success(Duration::from_millis(10));
        acc.record_success(Duration::from_millis(30));
        let snapshot = acc.snapshot(1, 1);
        assert_eq!(snapshot.successful_requests, 2);
        assert_eq!(snapshot.average_time_to_acquire, Duration::from_millis(20));
    }

    #[test]
    fn zero_successes_yields_zero_average_not_a_divide_by_zero() {
        let acc = MetricsAccumulator::new();
        let snapshot = acc.snapshot(0, 0);
        assert_eq!(snapshot.average_time_to_acquire, Duration::ZERO);
    }

    #[test]
    fn failure_classes_are_tracked_independently() {
        let mut acc = MetricsAccumulator::new();
        acc.record_too_busy();
        acc.record_timed_out();
        acc.record_timed_out();
        acc.record_error();
        let snapshot = acc.snapshot(1, 1);
        assert_eq!(snapshot.unsuccessful_requests_too_busy, 1);
        assert_eq!(snapshot.unsuccessful_requests_timed_out, 2);
        assert_eq!(snapshot.unsuccessful_requests_error, 1);
    }

    #[test]
    fn pending_queue_min_max_track_the_observed_range() {
        let mut acc = MetricsAccumulator::new();
        acc.observe_pending_queue_len(3);
        acc.observe_pending_queue_len(1);
        acc.observe_pending_queue_len(5);
        let snapshot = acc.snapshot(1, 1);
        assert_eq!(snapshot.pending_queue_min, 1);
        assert_eq!(snapshot.pending_queue_max, 5);
    }

    #[test]
    fn reset_clears_all_counters() {
        let mut acc = MetricsAccumulator::new();
        acc.record_success(Duration::from_millis(5));
        acc.record_connection_created();
        acc.reset();
        let snapshot = acc.snapshot(0, 0);
        assert_eq!(snapshot.successful_requests, 0);
        assert_eq!(snapshot.connections_created, 0);
    }
}
