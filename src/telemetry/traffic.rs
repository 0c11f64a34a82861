//! Per-second request counts.
//!
//! Error ratios need a denominator. Every call that reaches a protected
//! operation is counted here, bucketed by service and wall-clock second.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Request counts bucketed by second, per service.
#[derive(Debug, Default)]
pub struct TrafficLog {
    services: DashMap<String, Mutex<BTreeMap<i64, u64>>>,
}

impl TrafficLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one request to `service` at `at`.
    pub fn record(&self, service: &str, at: DateTime<Utc>) {
        let second = at.timestamp();
        if let Some(buckets) = self.services.get(service) {
            *buckets.lock().entry(second).or_insert(0) += 1;
            return;
        }
        let entry = self.services.entry(service.to_string()).or_default();
        *entry.lock().entry(second).or_insert(0) += 1;
    }

    /// Returns the number of requests in `[start, end]`, for one service or
    /// for all of them.
    pub fn count(&self, service: Option<&str>, start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
        let (from, to) = (start.timestamp(), end.timestamp());
        if from > to {
            return 0;
        }
        let sum = |buckets: &Mutex<BTreeMap<i64, u64>>| -> u64 {
            buckets.lock().range(from..=to).map(|(_, n)| *n).sum()
        };
        match service {
            Some(service) => self.services.get(service).map_or(0, |b| sum(b.value())),
            None => self.services.iter().map(|b| sum(b.value())).sum(),
        }
    }

    /// Drops buckets older than `cutoff` and forgets idle services.
    ///
    /// Returns the number of buckets removed.
    pub fn prune(&self, cutoff: DateTime<Utc>) -> usize {
        let cutoff = cutoff.timestamp();
        let mut removed = 0;
        for entry in self.services.iter() {
            let mut buckets = entry.value().lock();
            let kept = buckets.split_off(&cutoff);
            removed += buckets.len();
            *buckets = kept;
        }
        self.services.retain(|_, buckets| !buckets.get_mut().is_empty());
        removed
    }

    /// Returns the services that have recorded traffic.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<_> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
