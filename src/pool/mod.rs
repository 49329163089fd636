//! Thread-safe pool of interchangeable connections (§4.8).
//!
//! The Connection is strictly single-threaded; the Pool is not: any number
//! of threads may concurrently call [`Pool::acquire`]/[`Pool::release`]. A
//! single mutex guards entries, the pending-request queue, and the metrics
//! accumulators; socket operations (connection creation, close) and
//! completion/timeout dispatch always happen off that lock.
pub mod config;
mod metrics;

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

pub use config::PoolConfig;
pub use metrics::PoolMetrics;

use metrics::MetricsAccumulator;

use crate::{
    connection::{Config, Connection},
    error::ErrorKind,
    message::backend::TransactionStatus,
    Result,
};

#[derive(PartialEq, Eq, Clone, Copy)]
enum EntryState {
    Unallocated,
    Allocated,
}

struct Entry {
    connection: Connection,
    state: EntryState,
    state_changed: Instant,
}

enum WaiterState {
    Waiting,
    Fulfilled(Connection),
    Failed(crate::Error),
}

/// A single pending `acquire` request, parked on its own condition variable
/// so a blocked caller never holds the pool's lock.
struct Waiter {
    state: Mutex<WaiterState>,
    condvar: Condvar,
}

struct Inner {
    entries: Vec<Entry>,
    pending: VecDeque<Arc<Waiter>>,
    closed: bool,
    metrics: MetricsAccumulator,
}

impl Inner {
    fn idle_entry(&mut self) -> Option<usize> {
        self.entries.iter().position(|e| e.state == EntryState::Unallocated)
    }
}

/// A thread-safe pool of interchangeable [`Connection`]s.
pub struct Pool {
    inner: Arc<Mutex<Inner>>,
    connect_config: Config,
    pool_config: Arc<Mutex<PoolConfig>>,
    dispatch: threadpool::ThreadPool,
}

impl Pool {
    pub fn new(connect_config: Config, pool_config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: Vec::new(),
                pending: VecDeque::new(),
                closed: false,
                metrics: MetricsAccumulator::new(),
            })),
            connect_config,
            pool_config: Arc::new(Mutex::new(pool_config)),
            dispatch: threadpool::ThreadPool::new(2),
        }
    }

    fn max_connections(&self) -> usize {
        self.pool_config.lock().unwrap().max_connections
    }

    fn max_pending_requests(&self) -> Option<usize> {
        self.pool_config.lock().unwrap().max_pending_requests
    }

    fn pending_request_timeout(&self) -> Option<Duration> {
        self.pool_config.lock().unwrap().pending_request_timeout
    }

    fn allocated_connection_timeout(&self) -> Option<Duration> {
        self.pool_config.lock().unwrap().allocated_connection_timeout
    }

    pub fn set_config(&self, config: PoolConfig) {
        *self.pool_config.lock().unwrap() = config;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Allocate a connection: an idle one if available, otherwise a newly
    /// created one (room permitting), otherwise block in FIFO order until
    /// one of those becomes possible or `pending_request_timeout` elapses.
    pub fn acquire(&self) -> Result<Connection> {
        let submitted = Instant::now();

        enum Step {
            Ready(Connection),
            CreateNew,
            Wait(Arc<Waiter>),
        }

        let step = {
            let mut inner = self.inner.lock().unwrap();
            if inner.closed {
                return Err(ErrorKind::ConnectionPoolClosed.into());
            }
            if let Some(idx) = inner.idle_entry() {
                inner.entries[idx].state = EntryState::Allocated;
                inner.entries[idx].state_changed = Instant::now();
                let connection = inner.entries[idx].connection.clone();
                inner.metrics.record_success(submitted.elapsed());
                self.schedule_allocated_timeout(connection.id());
                Step::Ready(connection)
            } else if inner.entries.len() < self.max_connections() {
                Step::CreateNew
            } else if inner.pending.len() >= self.max_pending_requests().unwrap_or(usize::MAX) {
                inner.metrics.record_too_busy();
                return Err(ErrorKind::TooManyRequestsForConnections.into());
            } else {
                let waiter = Arc::new(Waiter { state: Mutex::new(WaiterState::Waiting), condvar: Condvar::new() });
                inner.pending.push_back(waiter.clone());
                let pending_len = inner.pending.len();
                inner.metrics.observe_pending_queue_len(pending_len);
                Step::Wait(waiter)
            }
        };

        match step {
            Step::Ready(connection) => Ok(connection),
            Step::CreateNew => self.create_and_allocate(submitted),
            Step::Wait(waiter) => self.wait_for_connection(waiter),
        }
    }

    fn create_and_allocate(&self, submitted: Instant) -> Result<Connection> {
        match Connection::connect(&self.connect_config) {
            Ok(connection) => {
                let mut inner = self.inner.lock().unwrap();
                inner.entries.push(Entry {
                    connection: connection.clone(),
                    state: EntryState::Allocated,
                    state_changed: Instant::now(),
                });
                inner.metrics.record_connection_created();
                inner.metrics.record_success(submitted.elapsed());
                self.schedule_allocated_timeout(connection.id());
                Ok(connection)
            }
            Err(e) => {
                let mut inner = self.inner.lock().unwrap();
                inner.metrics.record_error();
                // A slot is free again; let a queued waiter have a shot at it.
                self.wake_oldest_waiter(&mut inner);
                Err(e)
            }
        }
    }

    fn wait_for_connection(&self, waiter: Arc<Waiter>) -> Result<Connection> {
        let timeout = self.pending_request_timeout();
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = waiter.state.lock().unwrap();
        loop {
            match &*guard {
                WaiterState::Waiting => {}
                _ => break,
            }
            match deadline {
                None => guard = waiter.condvar.wait(guard).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        // Never hold the waiter's own lock while taking the
                        // pool lock (release_internal/wake_oldest_waiter
                        // take them in the opposite order).
                        drop(guard);
                        if self.remove_waiter(&waiter) {
                            self.inner.lock().unwrap().metrics.record_timed_out();
                            return Err(ErrorKind::TimedOutAcquiringConnection.into());
                        }
                        // Already popped by a concurrent release/allocate;
                        // wait for that write to land instead of racing it.
                        guard = waiter.state.lock().unwrap();
                        while let WaiterState::Waiting = &*guard {
                            guard = waiter.condvar.wait(guard).unwrap();
                        }
                        break;
                    }
                    let (g, _timed_out) = waiter.condvar.wait_timeout(guard, deadline - now).unwrap();
                    guard = g;
                }
            }
        }
        match std::mem::replace(&mut *guard, WaiterState::Waiting) {
            WaiterState::Fulfilled(connection) => Ok(connection),
            WaiterState::Failed(e) => Err(e),
            WaiterState::Waiting => unreachable!("loop only exits once the waiter is resolved"),
        }
    }

    /// Remove `waiter` from the pending queue if it's still there. Returns
    /// `false` if it was already popped by a concurrent allocation.
    fn remove_waiter(&self, waiter: &Arc<Waiter>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.pending.len();
        inner.pending.retain(|w| !Arc::ptr_eq(w, waiter));
        inner.pending.len() != before
    }

    /// Hand the oldest pending request an idle/new connection, if any is
    /// available. Called after `release` and after a failed creation.
    fn wake_oldest_waiter(&self, inner: &mut Inner) {
        let Some(idx) = inner.idle_entry() else { return };
        let Some(waiter) = inner.pending.pop_front() else { return };
        inner.entries[idx].state = EntryState::Allocated;
        inner.entries[idx].state_changed = Instant::now();
        let connection = inner.entries[idx].connection.clone();
        inner.metrics.record_success(Duration::ZERO);
        self.schedule_allocated_timeout(connection.id());
        *waiter.state.lock().unwrap() = WaiterState::Fulfilled(connection);
        waiter.condvar.notify_one();
    }

    /// Release a connection obtained from [`Pool::acquire`] back to the
    /// pool, applying the release rule table (§4.8).
    pub fn release(&self, connection: Connection) {
        self.release_internal(connection, false);
    }

    fn release_internal(&self, connection: Connection, timed_out: bool) {
        let mut inner = self.inner.lock().unwrap();
        let id = connection.id();
        let Some(idx) = inner.entries.iter().position(|e| e.connection.id() == id) else {
            return;
        };

        if inner.closed {
            inner.entries.remove(idx);
            drop(inner);
            connection.close();
            return;
        }
        if timed_out {
            inner.metrics.record_allocated_timed_out();
            inner.entries.remove(idx);
            drop(inner);
            connection.close();
            return;
        }
        if inner.entries[idx].state == EntryState::Unallocated {
            log::warn!("connection {id} released twice");
            inner.entries.remove(idx);
            drop(inner);
            connection.close();
            return;
        }
        if connection.is_closed() {
            inner.metrics.record_allocated_closed_by_requestor();
            inner.entries.remove(idx);
            return;
        }
        if connection.transaction_status() != TransactionStatus::Idle {
            log::warn!("connection {id} released with a transaction in progress");
            inner.entries.remove(idx);
            drop(inner);
            connection.close();
            return;
        }

        inner.entries[idx].state = EntryState::Unallocated;
        inner.entries[idx].state_changed = Instant::now();
        self.wake_oldest_waiter(&mut inner);
    }

    /// Acquire a connection, run `f` with it, and release it exactly once
    /// regardless of whether `f` succeeds.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let connection = self.acquire()?;
        let result = f(&connection);
        self.release(connection);
        result
    }

    fn schedule_allocated_timeout(&self, connection_id: u64) {
        let Some(timeout) = self.allocated_connection_timeout() else { return };
        let handle = PoolTimeoutHandle { inner: self.inner.clone() };
        self.dispatch.execute(move || {
            std::thread::sleep(timeout);
            handle.fire(connection_id, timeout);
        });
    }

    /// Snapshot (and, if `reset`, clear) the pool's performance metrics.
    pub fn compute_metrics(&self, reset: bool) -> PoolMetrics {
        let mut inner = self.inner.lock().unwrap();
        let connections_at_start = inner.entries.len();
        let snapshot = inner.metrics.snapshot(connections_at_start, inner.entries.len());
        if reset {
            inner.metrics.reset();
        }
        snapshot
    }

    /// Cancel all pending requests with `connection-pool-closed`, close all
    /// idle entries immediately, and (unless `force`) defer closing
    /// allocated entries until their release.
    pub fn close(&self, force: bool) {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return;
        }
        inner.closed = true;

        for waiter in inner.pending.drain(..) {
            *waiter.state.lock().unwrap() = WaiterState::Failed(ErrorKind::ConnectionPoolClosed.into());
            waiter.condvar.notify_one();
        }

        let mut to_close = Vec::new();
        inner.entries.retain(|entry| match entry.state {
            EntryState::Unallocated => {
                to_close.push(entry.connection.clone());
                false
            }
            EntryState::Allocated if force => {
                to_close.push(entry.connection.clone());
                false
            }
            EntryState::Allocated => true,
        });
        drop(inner);

        for connection in to_close {
            connection.close();
        }
    }
}

/// Carries just the `Inner` handle into the dispatch thread, so the timeout
/// check runs without keeping the whole [`Pool`] (and its config) alive.
struct PoolTimeoutHandle {
    inner: Arc<Mutex<Inner>>,
}

impl PoolTimeoutHandle {
    fn fire(&self, connection_id: u64, timeout: Duration) {
        let (connection, should_close) = {
            let mut inner = self.inner.lock().unwrap();
            let Some(idx) = inner.entries.iter().position(|e| e.connection.id() == connection_id) else {
                return;
            };
            let entry = &inner.entries[idx];
            if entry.state != EntryState::Allocated || entry.state_changed.elapsed() < timeout {
                return;
            }
            let connection = entry.connection.clone();
            inner.metrics.record_allocated_timed_out();
            inner.entries.remove(idx);
            (connection, true)
        };
        if should_close {
            connection.close();
        }
    }
}
