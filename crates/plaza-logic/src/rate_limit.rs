//! Sliding-window throttling per entity and action category.
//!
//! Every `(entity, category)` pair keeps the timestamps of its accepted
//! actions. A call first drops timestamps that are a full window old, then
//! accepts only while fewer than `max_actions` remain.
//!
//! Time is an explicit millisecond value supplied by the caller, so the
//! limiter is deterministic and never reads a clock.
//!
//! ```
//! use plaza_logic::rate_limit::{ActionCategory, RateLimitConfig, RateLimiter};
//!
//! let mut limiter: RateLimiter<u32> = RateLimiter::new(RateLimitConfig::default());
//! assert!(limiter.allow(7, ActionCategory::Emote, 0));
//! ```

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Independently throttled kinds of client action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Movement,
    Spawn,
    Update,
    Delete,
    Emote,
    /// Anything without its own bucket (customize, footprint changes).
    Action,
    /// Sit, stand up, lie down, get up.
    Interaction,
}

impl ActionCategory {
    pub fn all() -> &'static [ActionCategory] {
        &[
            ActionCategory::Movement,
            ActionCategory::Spawn,
            ActionCategory::Update,
            ActionCategory::Delete,
            ActionCategory::Emote,
            ActionCategory::Action,
            ActionCategory::Interaction,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionCategory::Movement => "movement",
            ActionCategory::Spawn => "spawn",
            ActionCategory::Update => "update",
            ActionCategory::Delete => "delete",
            ActionCategory::Emote => "emote",
            ActionCategory::Action => "action",
            ActionCategory::Interaction => "interaction",
        }
    }
}

/// At most `max_actions` within any `window_ms` span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub max_actions: u32,
    pub window_ms: u64,
}

impl RateLimitPolicy {
    pub const fn new(max_actions: u32, window_ms: u64) -> Self {
        Self {
            max_actions,
            window_ms,
        }
    }
}

/// One policy per category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub movement: RateLimitPolicy,
    pub spawn: RateLimitPolicy,
    pub update: RateLimitPolicy,
    pub delete: RateLimitPolicy,
    pub emote: RateLimitPolicy,
    pub action: RateLimitPolicy,
    pub interaction: RateLimitPolicy,
}

impl RateLimitConfig {
    pub fn policy(&self, category: ActionCategory) -> RateLimitPolicy {
        match category {
            ActionCategory::Movement => self.movement,
            ActionCategory::Spawn => self.spawn,
            ActionCategory::Update => self.update,
            ActionCategory::Delete => self.delete,
            ActionCategory::Emote => self.emote,
            ActionCategory::Action => self.action,
            ActionCategory::Interaction => self.interaction,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            movement: RateLimitPolicy::new(30, 1_000),
            spawn: RateLimitPolicy::new(10, 10_000),
            update: RateLimitPolicy::new(20, 1_000),
            delete: RateLimitPolicy::new(10, 1_000),
            emote: RateLimitPolicy::new(5, 2_000),
            action: RateLimitPolicy::new(10, 1_000),
            interaction: RateLimitPolicy::new(4, 1_000),
        }
    }
}

/// Per-entity, per-category sliding windows.
#[derive(Debug, Clone)]
pub struct RateLimiter<K> {
    config: RateLimitConfig,
    windows: HashMap<(K, ActionCategory), VecDeque<u64>>,
}

impl<K: Copy + Eq + Hash> RateLimiter<K> {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Accept and record the action if the window has room.
    pub fn allow(&mut self, key: K, category: ActionCategory, now_ms: u64) -> bool {
        let policy = self.config.policy(category);
        let window = self.windows.entry((key, category)).or_default();
        prune(window, now_ms, policy.window_ms);
        if (window.len() as u64) < u64::from(policy.max_actions) {
            window.push_back(now_ms);
            true
        } else {
            false
        }
    }

    /// Actions still counted against `key` in `category` at `now_ms`.
    pub fn in_window(&self, key: K, category: ActionCategory, now_ms: u64) -> usize {
        let window_ms = self.config.policy(category).window_ms;
        self.windows
            .get(&(key, category))
            .map(|w| {
                w.iter()
                    .filter(|&&t| now_ms.saturating_sub(t) < window_ms)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Prune every window and drop the ones left empty. Returns how many were dropped.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        let before = self.windows.len();
        let config = &self.config;
        self.windows.retain(|(_, category), window| {
            prune(window, now_ms, config.policy(*category).window_ms);
            !window.is_empty()
        });
        before - self.windows.len()
    }

    /// Forget all history for `key` (disconnect).
    pub fn purge(&mut self, key: K) {
        self.windows.retain(|(k, _), _| *k != key);
    }

    /// Number of live `(entity, category)` windows.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

fn prune(window: &mut VecDeque<u64>, now_ms: u64, window_ms: u64) {
    while let Some(&oldest) = window.front() {
        if now_ms.saturating_sub(oldest) >= window_ms {
            window.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, window_ms: u64) -> RateLimiter<u32> {
        let policy = RateLimitPolicy::new(max, window_ms);
        RateLimiter::new(RateLimitConfig {
            movement: policy,
            ..RateLimitConfig::default()
        })
    }

    #[test]
    fn rejects_call_past_max_within_window() {
        let mut rl = limiter(30, 1_000);
        for i in 0..30 {
            assert!(rl.allow(1, ActionCategory::Movement, i * 10), "call {i}");
        }
        assert!(!rl.allow(1, ActionCategory::Movement, 300));
    }

    #[test]
    fn accepts_again_after_full_window() {
        let mut rl = limiter(2, 1_000);
        assert!(rl.allow(1, ActionCategory::Movement, 0));
        assert!(rl.allow(1, ActionCategory::Movement, 0));
        assert!(!rl.allow(1, ActionCategory::Movement, 999));
        assert!(rl.allow(1, ActionCategory::Movement, 1_000));
    }

    #[test]
    fn rejected_calls_are_not_recorded() {
        let mut rl = limiter(1, 1_000);
        assert!(rl.allow(1, ActionCategory::Movement, 0));
        for t in [100, 200, 900] {
            assert!(!rl.allow(1, ActionCategory::Movement, t));
        }
        assert_eq!(rl.in_window(1, ActionCategory::Movement, 900), 1);
        assert!(rl.allow(1, ActionCategory::Movement, 1_000));
    }

    #[test]
    fn categories_and_entities_are_independent() {
        let mut rl = limiter(1, 1_000);
        assert!(rl.allow(1, ActionCategory::Movement, 0));
        assert!(!rl.allow(1, ActionCategory::Movement, 1));
        assert!(rl.allow(2, ActionCategory::Movement, 1));
        assert!(rl.allow(1, ActionCategory::Emote, 1));
    }

    #[test]
    fn window_never_holds_stale_timestamps() {
        let mut rl = limiter(100, 500);
        for t in (0..5_000).step_by(37) {
            rl.allow(9, ActionCategory::Movement, t);
            let window = &rl.windows[&(9, ActionCategory::Movement)];
            assert!(window.iter().all(|&s| t - s < 500));
        }
    }

    #[test]
    fn sweep_drops_empty_windows() {
        let mut rl = limiter(5, 1_000);
        rl.allow(1, ActionCategory::Movement, 0);
        rl.allow(2, ActionCategory::Movement, 800);
        assert_eq!(rl.tracked(), 2);
        assert_eq!(rl.sweep(1_200), 1);
        assert_eq!(rl.tracked(), 1);
    }

    #[test]
    fn purge_forgets_entity() {
        let mut rl = limiter(1, 1_000);
        rl.allow(1, ActionCategory::Movement, 0);
        rl.allow(1, ActionCategory::Spawn, 0);
        rl.allow(2, ActionCategory::Movement, 0);
        rl.purge(1);
        assert_eq!(rl.tracked(), 1);
        assert!(rl.allow(1, ActionCategory::Movement, 1));
    }
}
