//! In-process fixed-window rate limiting.
//!
//! Counters are keyed by action plus client IP or email. State lives in
//! memory, restarting the process resets all windows.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    SignIn,
    ResendVerification,
    ForgotPassword,
    VerifyEmail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, action: RateLimitAction, ip: &str) -> RateLimitDecision;
    fn check_email(&self, action: RateLimitAction, email: &str) -> RateLimitDecision;
}

/// Never limits. Used in tests.
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _action: RateLimitAction, _ip: &str) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn check_email(&self, _action: RateLimitAction, _email: &str) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

struct Window {
    started: Instant,
    count: u32,
}

pub struct FixedWindowLimiter {
    limits: HashMap<RateLimitAction, (u32, Duration)>,
    windows: Mutex<HashMap<(RateLimitAction, String), Window>>,
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new() -> Self {
        let mut limits = HashMap::new();
        limits.insert(RateLimitAction::SignIn, (10, Duration::from_secs(60)));
        limits.insert(
            RateLimitAction::ResendVerification,
            (1, Duration::from_secs(60)),
        );
        limits.insert(
            RateLimitAction::ForgotPassword,
            (5, Duration::from_secs(900)),
        );
        limits.insert(RateLimitAction::VerifyEmail, (10, Duration::from_secs(60)));

        Self {
            limits,
            windows: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_limit(mut self, action: RateLimitAction, max: u32, window: Duration) -> Self {
        self.limits.insert(action, (max, window));
        self
    }

    fn check(&self, action: RateLimitAction, key: &str) -> RateLimitDecision {
        let Some(&(max, window)) = self.limits.get(&action) else {
            return RateLimitDecision::Allowed;
        };

        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        // Bounded memory, drop stale windows once the map grows
        if windows.len() > 10_000 {
            let max_window = self
                .limits
                .values()
                .map(|&(_, duration)| duration)
                .max()
                .unwrap_or(window);
            windows.retain(|_, entry| now.duration_since(entry.started) < max_window);
        }

        let entry = windows
            .entry((action, key.to_string()))
            .or_insert(Window { started: now, count: 0 });

        if now.duration_since(entry.started) >= window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= max {
            return RateLimitDecision::Limited;
        }

        entry.count += 1;
        RateLimitDecision::Allowed
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check_ip(&self, action: RateLimitAction, ip: &str) -> RateLimitDecision {
        self.check(action, ip)
    }

    fn check_email(&self, action: RateLimitAction, email: &str) -> RateLimitDecision {
        self.check(action, email)
    }
}
