//! Cooldown table suppressing repeat reports of the same symbol.

use std::collections::HashMap;

use tokio::time::{Duration, Instant};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Per-session cooldown table.
///
/// `accept` depends only on its arguments and the table itself, so a session
/// can drive it with the clock of its choice.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    cooldown: Duration,
    retention: Duration,
    table_limit: usize,
    last_seen: HashMap<String, Instant>,
}

impl Deduplicator {
    pub fn new(cooldown: Duration, retention: Duration, table_limit: usize) -> Self {
        Self {
            cooldown,
            // An entry must outlive its own cooldown or pruning would re-admit it early.
            retention: retention.max(cooldown),
            table_limit,
            last_seen: HashMap::new(),
        }
    }

    /// `true` if `value` should be surfaced; `false` if it is still cooling down.
    ///
    /// Suppressed values do not refresh their entry, so a code held in front
    /// of the camera is re-reported once per cooldown window.
    pub fn accept(&mut self, value: &str, now: Instant) -> bool {
        if let Some(&seen) = self.last_seen.get(value) {
            if now.saturating_duration_since(seen) < self.cooldown {
                log_debug!("suppressing {value} (cooldown)");
                return false;
            }
        }

        self.last_seen.insert(value.to_string(), now);
        if self.last_seen.len() > self.table_limit {
            self.prune(now);
        }
        true
    }

    /// Evict entries older than the retention horizon. Returns how many went.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.last_seen.len();
        let retention = self.retention;
        self.last_seen
            .retain(|_, seen| now.saturating_duration_since(*seen) < retention);
        before - self.last_seen.len()
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.last_seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dedup(cooldown_ms: u64) -> Deduplicator {
        Deduplicator::new(
            Duration::from_millis(cooldown_ms),
            Duration::from_secs(60),
            1000,
        )
    }

    #[test]
    fn repeat_within_cooldown_is_suppressed_then_readmitted() {
        let mut dedup = dedup(5000);
        let t0 = Instant::now();

        assert!(dedup.accept("7791234567890", t0));
        assert!(!dedup.accept("7791234567890", t0 + Duration::from_millis(2000)));
        assert!(dedup.accept("7791234567890", t0 + Duration::from_millis(6000)));
    }

    #[test]
    fn exactly_cooldown_apart_is_accepted() {
        let mut dedup = dedup(4500);
        let t0 = Instant::now();
        assert!(dedup.accept("96385074", t0));
        assert!(dedup.accept("96385074", t0 + Duration::from_millis(4500)));
    }

    #[test]
    fn suppressed_hits_do_not_extend_the_window() {
        let mut dedup = dedup(5000);
        let t0 = Instant::now();
        assert!(dedup.accept("a", t0));
        assert!(!dedup.accept("a", t0 + Duration::from_millis(4000)));
        assert!(dedup.accept("a", t0 + Duration::from_millis(5000)));
    }

    #[test]
    fn distinct_values_are_independent() {
        let mut dedup = dedup(5000);
        let t0 = Instant::now();
        assert!(dedup.accept("a", t0));
        assert!(dedup.accept("b", t0));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn table_is_pruned_past_its_size_bound() {
        let mut dedup = Deduplicator::new(Duration::from_secs(1), Duration::from_secs(60), 3);
        let t0 = Instant::now();
        for value in ["a", "b", "c"] {
            assert!(dedup.accept(value, t0));
        }
        let later = t0 + Duration::from_secs(61);
        assert!(dedup.accept("d", later));
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn fresh_entries_survive_pruning() {
        let mut dedup = dedup(5000);
        let t0 = Instant::now();
        dedup.accept("old", t0);
        dedup.accept("new", t0 + Duration::from_secs(50));
        assert_eq!(dedup.prune(t0 + Duration::from_secs(70)), 1);
        assert!(!dedup.accept("new", t0 + Duration::from_secs(52)));
    }
}
