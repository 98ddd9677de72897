use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

/// Process-wide execution counters reported by the health endpoint.
///
/// This is the only mutable state shared across requests besides the
/// filesystem sandbox root.
pub struct ServiceStats {
    started_at: Instant,
    counters: Mutex<Counters>,
}

#[derive(Default)]
struct Counters {
    executions_total: u64,
    executions_running: u64,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub uptime_seconds: u64,
    pub executions_total: u64,
    pub executions_running: u64,
}

impl ServiceStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Records the start of an execution; the returned guard records its end.
    pub fn begin_execution(&self) -> ExecutionGuard<'_> {
        let mut counters = self.counters.lock();
        counters.executions_total += 1;
        counters.executions_running += 1;
        ExecutionGuard { stats: self }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let counters = self.counters.lock();
        StatsSnapshot {
            uptime_seconds: self.started_at.elapsed().as_secs(),
            executions_total: counters.executions_total,
            executions_running: counters.executions_running,
        }
    }
}

impl Default for ServiceStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight count when dropped, whatever the outcome.
pub struct ExecutionGuard<'a> {
    stats: &'a ServiceStats,
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.stats.counters.lock().executions_running -= 1;
    }
}
