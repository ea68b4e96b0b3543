//! Per-customer fixed-window counters.
//!
//! Each `(customer, route class)` pair gets a counter that resets once its
//! window has elapsed. The read-increment-check sequence runs under a single
//! lock so concurrent requests can never both slip past the ceiling.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A named group of endpoints sharing one limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteClass {
    /// Read-only endpoints
    Read,
    /// Endpoints that change customer data or credentials
    Write,
}

impl RouteClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Read => "read",
            RouteClass::Write => "write",
        }
    }
}

/// Ceiling and window for one route class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRule {
    pub ceiling: u32,
    pub window: Duration,
}

impl WindowRule {
    pub const fn new(ceiling: u32, window: Duration) -> Self {
        Self { ceiling, window }
    }
}

/// Per-class rules for the customer limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomerLimits {
    pub read: WindowRule,
    pub write: WindowRule,
}

impl Default for CustomerLimits {
    fn default() -> Self {
        Self {
            // 100 requests per 15 minutes
            read: WindowRule::new(100, Duration::from_secs(15 * 60)),
            // 30 requests per 15 minutes
            write: WindowRule::new(30, Duration::from_secs(15 * 60)),
        }
    }
}

impl CustomerLimits {
    pub fn rule(&self, class: RouteClass) -> WindowRule {
        match class {
            RouteClass::Read => self.read,
            RouteClass::Write => self.write,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u32,
    window_start: Instant,
}

/// Request admitted within the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admitted {
    pub ceiling: u32,
    pub remaining: u32,
}

/// Request over the ceiling for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitExceeded {
    pub class: RouteClass,
    pub ceiling: u32,
    /// Time until the window resets. Always positive.
    pub retry_after: Duration,
}

/// In-process store of fixed-window counters keyed by customer and route class.
///
/// Counts are only accurate within a single process.
#[derive(Debug)]
pub struct CustomerLimiter {
    limits: CustomerLimits,
    windows: Mutex<HashMap<(String, RouteClass), WindowCounter>>,
}

impl CustomerLimiter {
    pub fn new(limits: CustomerLimits) -> Self {
        Self {
            limits,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn limits(&self) -> &CustomerLimits {
        &self.limits
    }

    /// Count a request for this customer and class against the current window.
    pub fn check(
        &self,
        customer_id: &str,
        class: RouteClass,
    ) -> Result<Admitted, RateLimitExceeded> {
        self.check_at(customer_id, class, Instant::now())
    }

    pub fn check_at(
        &self,
        customer_id: &str,
        class: RouteClass,
        now: Instant,
    ) -> Result<Admitted, RateLimitExceeded> {
        let rule = self.limits.rule(class);
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        let counter = windows
            .entry((customer_id.to_string(), class))
            .or_insert(WindowCounter {
                count: 0,
                window_start: now,
            });

        // Reset at or past the boundary so retry_after is never zero.
        if now.saturating_duration_since(counter.window_start) >= rule.window {
            counter.count = 0;
            counter.window_start = now;
        }

        counter.count = counter.count.saturating_add(1);

        if counter.count > rule.ceiling {
            let reset_at = counter.window_start + rule.window;
            return Err(RateLimitExceeded {
                class,
                ceiling: rule.ceiling,
                retry_after: reset_at.saturating_duration_since(now),
            });
        }

        Ok(Admitted {
            ceiling: rule.ceiling,
            remaining: rule.ceiling - counter.count,
        })
    }

    /// Drop counters whose window has elapsed. Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        self.prune_expired_at(Instant::now())
    }

    pub fn prune_expired_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let before = windows.len();
        windows.retain(|(_, class), counter| {
            now.saturating_duration_since(counter.window_start) < self.limits.rule(*class).window
        });
        before - windows.len()
    }

    /// Number of live counters.
    pub fn len(&self) -> usize {
        self.windows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
