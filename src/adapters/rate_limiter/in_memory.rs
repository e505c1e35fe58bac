//! In-memory rate limiter.
//!
//! Keeps a sliding log of admission instants per key, so the window is a
//! true rolling interval rather than a fixed bucket that resets on a
//! boundary. Quotas are per process.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::ports::{RateDecision, RateLimitKey, RateLimitStatus, RateLimiter, RateRule};

use super::config::EvictionConfig;

/// In-memory sliding-window rate limiter.
///
/// The bucket table sits behind a `std::sync::Mutex`; it is never held
/// across an await.
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    state: Mutex<LimiterState>,
    eviction: EvictionConfig,
}

#[derive(Debug, Default)]
struct LimiterState {
    buckets: HashMap<String, Bucket>,
    checks_since_sweep: u64,
}

/// History for a single key.
#[derive(Debug)]
struct Bucket {
    /// Admission instants inside the current window, oldest first.
    admissions: VecDeque<Instant>,
    /// Most recent attempt, admitted or not.
    last_request_at: Option<Instant>,
    /// Window of the rule last applied; drives idle eviction.
    window: Duration,
}

impl Bucket {
    fn new(window: Duration) -> Self {
        Self {
            admissions: VecDeque::new(),
            last_request_at: None,
            window,
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.admissions.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.admissions.pop_front();
            } else {
                break;
            }
        }
    }

    /// Milliseconds left before `min_interval` has passed since the last
    /// attempt, if any.
    fn spacing_wait(&self, now: Instant, min_interval: Duration) -> Option<u64> {
        let last = self.last_request_at?;
        if min_interval.is_zero() {
            return None;
        }
        let elapsed = now.saturating_duration_since(last);
        (elapsed < min_interval).then(|| ceil_millis(min_interval - elapsed))
    }

    /// Milliseconds until the oldest admission leaves the window, if full.
    fn window_wait(&self, now: Instant, window: Duration, max: u32) -> Option<u64> {
        if self.admissions.len() < max as usize {
            return None;
        }
        let oldest = *self.admissions.front()?;
        let frees_at = oldest + window;
        Some(ceil_millis(frees_at.saturating_duration_since(now)).max(1))
    }

    fn is_idle(&self, now: Instant, idle_multiplier: u32) -> bool {
        let idle_for = self.window.saturating_mul(idle_multiplier.max(1));
        self.last_request_at
            .map_or(true, |last| now.saturating_duration_since(last) > idle_for)
    }
}

fn ceil_millis(duration: Duration) -> u64 {
    let millis = duration.as_millis() as u64;
    if duration.subsec_nanos() % 1_000_000 == 0 {
        millis
    } else {
        millis + 1
    }
}

impl InMemoryRateLimiter {
    pub fn new(eviction: EvictionConfig) -> Self {
        Self {
            state: Mutex::new(LimiterState::default()),
            eviction,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(EvictionConfig::default())
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// [`RateLimiter::check`] against an explicit clock reading.
    pub fn check_at(&self, key: &RateLimitKey, rule: &RateRule, now: Instant) -> RateDecision {
        let window = Duration::from_millis(rule.window_ms());
        let min_interval = Duration::from_millis(rule.min_interval_ms());

        let mut state = self.lock();
        state.checks_since_sweep += 1;
        if self.eviction.sweep_every > 0 && state.checks_since_sweep >= self.eviction.sweep_every {
            state.checks_since_sweep = 0;
            let removed = sweep_locked(&mut state, now, self.eviction.idle_multiplier);
            if removed > 0 {
                tracing::debug!(removed, "evicted idle rate limit buckets");
            }
        }

        let bucket = state
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(window));

        bucket.window = window;
        bucket.prune(now, window);

        let wait = bucket
            .spacing_wait(now, min_interval)
            .or_else(|| bucket.window_wait(now, window, rule.max()));

        bucket.last_request_at = Some(now);
        match wait {
            Some(retry_after_ms) => RateDecision::deny(retry_after_ms),
            None => {
                bucket.admissions.push_back(now);
                RateDecision::allow()
            }
        }
    }

    /// [`RateLimiter::status`] against an explicit clock reading.
    pub fn status_at(&self, key: &RateLimitKey, rule: &RateRule, now: Instant) -> RateLimitStatus {
        let window = Duration::from_millis(rule.window_ms());
        let min_interval = Duration::from_millis(rule.min_interval_ms());

        let mut state = self.lock();
        let Some(bucket) = state.buckets.get_mut(&key.to_string()) else {
            return RateLimitStatus {
                limit: rule.max(),
                remaining: rule.max(),
                retry_after_ms: 0,
            };
        };

        bucket.prune(now, window);
        let used = bucket.admissions.len() as u32;
        let retry_after_ms = bucket
            .spacing_wait(now, min_interval)
            .into_iter()
            .chain(bucket.window_wait(now, window, rule.max()))
            .max()
            .unwrap_or(0);

        RateLimitStatus {
            limit: rule.max(),
            remaining: rule.max().saturating_sub(used),
            retry_after_ms,
        }
    }

    /// Removes buckets idle for longer than `idle_multiplier` windows.
    ///
    /// Returns the number of buckets removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut state = self.lock();
        sweep_locked(&mut state, now, self.eviction.idle_multiplier)
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.lock().buckets.len()
    }

    /// Spawns a task that sweeps every `interval` until `shutdown` flips.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            tracing::info!(interval_secs = interval.as_secs(), "rate limit sweeper started");
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::info!("rate limit sweeper shutting down");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let removed = self.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = self.tracked_keys(), "swept idle rate limit buckets");
                        }
                    }
                }
            }
        })
    }
}

fn sweep_locked(state: &mut LimiterState, now: Instant, idle_multiplier: u32) -> usize {
    let before = state.buckets.len();
    state
        .buckets
        .retain(|_, bucket| !bucket.is_idle(now, idle_multiplier));
    before - state.buckets.len()
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl RateLimiter for InMemoryRateLimiter {
    fn check(&self, key: &RateLimitKey, rule: &RateRule) -> RateDecision {
        self.check_at(key, rule, Instant::now())
    }

    fn status(&self, key: &RateLimitKey, rule: &RateRule) -> RateLimitStatus {
        self.status_at(key, rule, Instant::now())
    }

    fn reset(&self, key: &RateLimitKey) {
        self.lock().buckets.remove(&key.to_string());
    }
}
