//! Per-agent sliding-window rate limiting.
//!
//! Each agent keeps one ordered list of invocation timestamps covering the last 24 hours.
//! The minute, hour and day budgets are all evaluated against that single list, in that
//! order, and the first window that is full decides the outcome.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::RateLimits;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateWindow {
    Minute,
    Hour,
    Day,
}

impl RateWindow {
    pub fn length(&self) -> Duration {
        match self {
            Self::Minute => Duration::seconds(60),
            Self::Hour => Duration::seconds(3_600),
            Self::Day => Duration::seconds(86_400),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }

    fn budget(&self, limits: &RateLimits) -> u32 {
        match self {
            Self::Minute => limits.per_minute,
            Self::Hour => limits.per_hour,
            Self::Day => limits.daily,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after_ms: u64,
    pub exceeded: Option<RateWindow>,
}

impl RateLimitDecision {
    pub fn allow() -> Self {
        Self { allowed: true, retry_after_ms: 0, exceeded: None }
    }

    pub fn exceeded(window: RateWindow, retry_after_ms: u64) -> Self {
        Self { allowed: false, retry_after_ms, exceeded: Some(window) }
    }
}

/// Admission control consulted by the gateway before a tool is executed.
pub trait RateGate: Send + Sync {
    fn configure(&self, agent_id: &str, limits: RateLimits);
    fn check(&self, agent_id: &str) -> RateLimitDecision;
    fn record(&self, agent_id: &str);
    /// `check` followed by `record` when allowed, as one step for the agent.
    fn try_acquire(&self, agent_id: &str) -> RateLimitDecision;
    fn reset(&self, agent_id: &str);
}

#[derive(Debug, Default)]
struct AgentWindow {
    limits: Option<RateLimits>,
    invocations: VecDeque<DateTime<Utc>>,
}

impl AgentWindow {
    /// Drops timestamps older than the day window, configured or not.
    fn prune(&mut self, now: DateTime<Utc>) {
        let horizon = now - RateWindow::Day.length();
        self.invocations.retain(|at| *at > horizon);
    }

    fn record(&mut self, now: DateTime<Utc>) {
        self.prune(now);
        self.invocations.push_back(now);
    }

    fn evaluate(&mut self, now: DateTime<Utc>) -> RateLimitDecision {
        self.prune(now);
        let Some(limits) = self.limits else {
            return RateLimitDecision::allow();
        };

        for window in [RateWindow::Minute, RateWindow::Hour, RateWindow::Day] {
            let cutoff = now - window.length();
            let count = self.invocations.iter().filter(|at| **at > cutoff).count();

            if count >= window.budget(&limits) as usize {
                let oldest = self.invocations.iter().filter(|at| **at > cutoff).min();
                let retry_after =
                    oldest.map_or(window.length(), |oldest| *oldest + window.length() - now);
                let retry_after_ms = u64::try_from(retry_after.num_milliseconds()).unwrap_or(0);
                return RateLimitDecision::exceeded(window, retry_after_ms);
            }
        }

        RateLimitDecision::allow()
    }
}

/// In-memory [`RateGate`] with one lock per agent id, so check-then-record for one agent is
/// atomic without serializing unrelated agents.
#[derive(Default)]
pub struct RateLimiter {
    windows: RwLock<HashMap<String, Arc<Mutex<AgentWindow>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limits(&self, agent_id: &str) -> Option<RateLimits> {
        let window = self.existing(agent_id)?;
        let limits = lock(&window).limits;
        limits
    }

    /// Number of timestamps currently held for `agent_id`.
    pub fn window_len(&self, agent_id: &str) -> usize {
        let Some(window) = self.existing(agent_id) else {
            return 0;
        };
        let len = lock(&window).invocations.len();
        len
    }

    pub fn check_at(&self, agent_id: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let Some(window) = self.existing(agent_id) else {
            return RateLimitDecision::allow();
        };
        let decision = lock(&window).evaluate(now);
        decision
    }

    pub fn record_at(&self, agent_id: &str, now: DateTime<Utc>) {
        let window = self.window(agent_id);
        lock(&window).record(now);
    }

    pub fn try_acquire_at(&self, agent_id: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let window = self.window(agent_id);
        let mut window = lock(&window);
        let decision = window.evaluate(now);
        if decision.allowed {
            window.record(now);
        } else {
            tracing::debug!(
                event_name = "rate_limit.exceeded",
                agent_id,
                window = decision.exceeded.map(|window| window.as_str()).unwrap_or("unknown"),
                retry_after_ms = decision.retry_after_ms,
                "invocation budget exhausted"
            );
        }
        decision
    }

    fn existing(&self, agent_id: &str) -> Option<Arc<Mutex<AgentWindow>>> {
        let windows = match self.windows.read() {
            Ok(windows) => windows,
            Err(poisoned) => poisoned.into_inner(),
        };
        windows.get(agent_id).cloned()
    }

    fn window(&self, agent_id: &str) -> Arc<Mutex<AgentWindow>> {
        if let Some(window) = self.existing(agent_id) {
            return window;
        }

        let mut windows = match self.windows.write() {
            Ok(windows) => windows,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(windows.entry(agent_id.to_string()).or_default())
    }
}

impl RateGate for RateLimiter {
    fn configure(&self, agent_id: &str, limits: RateLimits) {
        let window = self.window(agent_id);
        lock(&window).limits = Some(limits);
    }

    fn check(&self, agent_id: &str) -> RateLimitDecision {
        self.check_at(agent_id, Utc::now())
    }

    fn record(&self, agent_id: &str) {
        self.record_at(agent_id, Utc::now());
    }

    fn try_acquire(&self, agent_id: &str) -> RateLimitDecision {
        self.try_acquire_at(agent_id, Utc::now())
    }

    fn reset(&self, agent_id: &str) {
        if let Some(window) = self.existing(agent_id) {
            lock(&window).invocations.clear();
        }
    }
}

fn lock(window: &Mutex<AgentWindow>) -> MutexGuard<'_, AgentWindow> {
    match window.lock() {
        Ok(window) => window,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use crate::domain::agent::RateLimits;
    use crate::rate_limit::{RateGate, RateLimitDecision, RateLimiter, RateWindow};

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().unwrap_or_else(Utc::now)
    }

    fn limiter(per_minute: u32, per_hour: u32, daily: u32) -> RateLimiter {
        let limiter = RateLimiter::new();
        limiter.configure("a-1", RateLimits { per_minute, per_hour, daily });
        limiter
    }

    #[test]
    fn unconfigured_agents_are_always_allowed() {
        let limiter = RateLimiter::new();
        for _ in 0..100 {
            limiter.record("ghost");
        }

        assert_eq!(limiter.check("ghost"), RateLimitDecision::allow());
        assert_eq!(limiter.check("never-seen"), RateLimitDecision::allow());
    }

    #[test]
    fn third_call_in_a_minute_is_rejected_with_retry_hint() {
        let limiter = limiter(2, 50, 200);
        let now = start();

        assert!(limiter.try_acquire_at("a-1", now).allowed);
        assert!(limiter.try_acquire_at("a-1", now + Duration::milliseconds(300)).allowed);
        let third = limiter.try_acquire_at("a-1", now + Duration::milliseconds(600));

        assert!(!third.allowed);
        assert_eq!(third.exceeded, Some(RateWindow::Minute));
        assert_eq!(third.retry_after_ms, 59_400);
        assert_eq!(limiter.window_len("a-1"), 2);
    }

    #[test]
    fn minute_window_slides() {
        let limiter = limiter(1, 50, 200);
        let now = start();
        limiter.record_at("a-1", now);

        assert!(!limiter.check_at("a-1", now + Duration::seconds(59)).allowed);
        assert!(limiter.check_at("a-1", now + Duration::seconds(61)).allowed);
    }

    #[test]
    fn hour_budget_is_checked_after_minute_budget() {
        let limiter = limiter(10, 3, 200);
        let now = start();
        for offset in [0, 120, 240] {
            limiter.record_at("a-1", now + Duration::seconds(offset));
        }

        let decision = limiter.check_at("a-1", now + Duration::seconds(600));

        assert_eq!(decision.exceeded, Some(RateWindow::Hour));
        assert_eq!(decision.retry_after_ms, 3_000_000);
    }

    #[test]
    fn daily_budget_and_pruning() {
        let limiter = limiter(10, 10, 2);
        let now = start();
        limiter.record_at("a-1", now);
        limiter.record_at("a-1", now + Duration::hours(2));

        let decision = limiter.check_at("a-1", now + Duration::hours(3));
        assert_eq!(decision.exceeded, Some(RateWindow::Day));
        assert_eq!(decision.retry_after_ms, Duration::hours(21).num_milliseconds() as u64);

        assert!(limiter.check_at("a-1", now + Duration::hours(25)).allowed);
        assert_eq!(limiter.window_len("a-1"), 1);
    }

    #[test]
    fn reset_clears_the_window_but_keeps_limits() {
        let limiter = limiter(1, 1, 1);
        limiter.record("a-1");
        assert!(!limiter.check("a-1").allowed);

        limiter.reset("a-1");

        assert!(limiter.check("a-1").allowed);
        assert_eq!(limiter.limits("a-1"), Some(RateLimits { per_minute: 1, per_hour: 1, daily: 1 }));
    }

    #[test]
    fn concurrent_acquires_never_exceed_budget() {
        let limiter = Arc::new(limiter(5, 100, 100));

        let admitted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let limiter = Arc::clone(&limiter);
                    scope.spawn(move || {
                        (0..10).filter(|_| limiter.try_acquire("a-1").allowed).count()
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap_or(0)).sum()
        });

        assert_eq!(admitted, 5);
        assert_eq!(limiter.window_len("a-1"), 5);
    }

    #[test]
    fn unconfigured_windows_only_hold_the_last_day() {
        let limiter = RateLimiter::new();
        let now = start();
        for day in 0..5 {
            assert!(limiter.try_acquire_at("ghost", now + Duration::days(day)).allowed);
        }
        assert_eq!(limiter.window_len("ghost"), 1);

        assert!(limiter.check_at("ghost", now + Duration::days(10)).allowed);
        assert_eq!(limiter.window_len("ghost"), 0);
    }

    #[test]
    fn recording_alone_prunes_stale_timestamps() {
        let limiter = limiter(10, 10, 10);
        let now = start();
        for day in 0..5 {
            limiter.record_at("a-1", now + Duration::days(day));
        }

        assert_eq!(limiter.window_len("a-1"), 1);

        limiter.record_at("never-configured", now);
        limiter.record_at("never-configured", now + Duration::hours(30));
        assert_eq!(limiter.window_len("never-configured"), 1);
    }
}
