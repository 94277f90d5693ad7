//! Named accumulating timers.
//!
//! The stats commands report where tick time goes; scenarios and the
//! render path wrap their hot sections in a [`ScopeTimer`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
struct TimerEntry {
    calls: u64,
    total: Duration,
}

/// Shared timer table. Clones share the underlying accumulators.
#[derive(Debug, Clone, Default)]
pub struct Timers {
    entries: Arc<Mutex<BTreeMap<&'static str, TimerEntry>>>,
}

/// One timer's totals in a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerReport {
    pub name: &'static str,
    pub calls: u64,
    pub total_ms: u128,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a scope; elapsed time is added when the guard drops.
    pub fn scope(&self, name: &'static str) -> ScopeTimer {
        ScopeTimer {
            timers: self.clone(),
            name,
            started: Instant::now(),
        }
    }

    pub fn add(&self, name: &'static str, elapsed: Duration) {
        let mut entries = self.entries.lock().expect("timers lock");
        let entry = entries.entry(name).or_default();
        entry.calls += 1;
        entry.total += elapsed;
    }

    pub fn report(&self) -> Vec<TimerReport> {
        let entries = self.entries.lock().expect("timers lock");
        entries
            .iter()
            .map(|(name, entry)| TimerReport {
                name,
                calls: entry.calls,
                total_ms: entry.total.as_millis(),
            })
            .collect()
    }

    pub fn reset(&self) {
        self.entries.lock().expect("timers lock").clear();
    }
}

/// RAII guard: adds its elapsed time to the owning table on drop.
pub struct ScopeTimer {
    timers: Timers,
    name: &'static str,
    started: Instant,
}

impl Drop for ScopeTimer {
    fn drop(&mut self) {
        self.timers.add(self.name, self.started.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_accumulates_calls() {
        let timers = Timers::new();
        for _ in 0..3 {
            let _scope = timers.scope("tick");
        }
        let report = timers.report();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].name, "tick");
        assert_eq!(report[0].calls, 3);
    }

    #[test]
    fn clones_share_accumulators() {
        let timers = Timers::new();
        let clone = timers.clone();
        clone.add("pack", Duration::from_millis(5));
        assert_eq!(timers.report()[0].calls, 1);
    }

    #[test]
    fn reset_clears_everything() {
        let timers = Timers::new();
        timers.add("x", Duration::from_millis(1));
        timers.reset();
        assert!(timers.report().is_empty());
    }
}
