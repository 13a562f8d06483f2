//! Per-bot traffic counters.
//!
//! Each adapter receives its [`BotCounters`] from a shared [`StatsRegistry`]
//! at construction time. Counters keep one bucket per second and drop stale
//! buckets lazily when read or written, so there is no background ticker.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::Serialize;

/// Length of the trailing window in seconds.
pub const WINDOW_SECS: u64 = 60;

/// Sliding one-minute counter.
#[derive(Debug, Default)]
pub struct TickCounter {
    buckets: Mutex<VecDeque<(u64, u64)>>,
}

impl TickCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, value: u64) {
        self.add_at(now_secs(), value);
    }

    /// Sum over the trailing [`WINDOW_SECS`].
    pub fn total(&self) -> u64 {
        self.total_at(now_secs())
    }

    pub fn add_at(&self, now: u64, value: u64) {
        let mut buckets = match self.buckets.lock() {
            Ok(b) => b,
            Err(poisoned) => poisoned.into_inner(),
        };
        prune(&mut buckets, now);
        match buckets.back_mut() {
            Some((sec, count)) if *sec == now => *count += value,
            _ => buckets.push_back((now, value)),
        }
    }

    pub fn total_at(&self, now: u64) -> u64 {
        let mut buckets = match self.buckets.lock() {
            Ok(b) => b,
            Err(poisoned) => poisoned.into_inner(),
        };
        prune(&mut buckets, now);
        buckets.iter().map(|(_, count)| count).sum()
    }
}

fn prune(buckets: &mut VecDeque<(u64, u64)>, now: u64) {
    while let Some((sec, _)) = buckets.front() {
        if sec + WINDOW_SECS <= now {
            buckets.pop_front();
        } else {
            break;
        }
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Sent/received counters for one bot.
#[derive(Debug, Default)]
pub struct BotCounters {
    pub sent: TickCounter,
    pub received: TickCounter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotSnapshot {
    pub bot: String,
    pub platform: String,
    pub message_sent: u64,
    pub message_received: u64,
}

/// Registry of every bot's counters, passed explicitly to each adapter.
/// Keyed by `(platform, bot)`.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    bots: DashMap<(String, String), Arc<BotCounters>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for `bot` on `platform`, created on first use.
    pub fn register(&self, platform: &str, bot: &str) -> Arc<BotCounters> {
        self.bots
            .entry((platform.to_string(), bot.to_string()))
            .or_default()
            .clone()
    }

    pub fn remove(&self, platform: &str, bot: &str) {
        self.bots.remove(&(platform.to_string(), bot.to_string()));
    }

    /// Snapshot sorted by platform, then bot.
    pub fn snapshot(&self) -> Vec<BotSnapshot> {
        let mut out: Vec<BotSnapshot> = self
            .bots
            .iter()
            .map(|entry| BotSnapshot {
                bot: entry.key().1.clone(),
                platform: entry.key().0.clone(),
                message_sent: entry.value().sent.total(),
                message_received: entry.value().received.total(),
            })
            .collect();
        out.sort_by(|a, b| (&a.platform, &a.bot).cmp(&(&b.platform, &b.bot)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_sums_within_window() {
        let c = TickCounter::new();
        c.add_at(100, 2);
        c.add_at(100, 1);
        c.add_at(130, 4);
        assert_eq!(c.total_at(130), 7);
        assert_eq!(c.total_at(159), 7);
    }

    #[test]
    fn stale_buckets_expire_on_read() {
        let c = TickCounter::new();
        c.add_at(100, 5);
        c.add_at(150, 1);
        assert_eq!(c.total_at(160), 1);
        assert_eq!(c.total_at(300), 0);
    }

    #[test]
    fn registry_returns_shared_counters() {
        let registry = StatsRegistry::new();
        let a = registry.register("discord", "bot-a");
        let again = registry.register("discord", "bot-a");
        a.sent.add(3);
        again.received.add(1);
        registry.register("feishu", "bot-b");

        let snap = registry.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].bot, "bot-a");
        assert_eq!(snap[0].message_sent, 3);
        assert_eq!(snap[0].message_received, 1);
        assert_eq!(snap[1].platform, "feishu");

        registry.remove("feishu", "bot-b");
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn same_id_on_two_platforms_is_two_bots() {
        let registry = StatsRegistry::new();
        registry.register("discord", "1").sent.add(1);
        registry.register("feishu", "1").received.add(2);

        let snap = registry.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!((snap[0].platform.as_str(), snap[0].message_sent), ("discord", 1));
        assert_eq!((snap[1].platform.as_str(), snap[1].message_received), ("feishu", 2));
    }
}
