//! Repeat-until-terminal polling with fixed or exponential backoff.
//!
//! The poller never fails on its own: transient errors consume an attempt and
//! exhaustion yields `None`, leaving the caller to decide what is fatal.
use std::fmt::Display;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BackoffMode {
    Fixed,
    Exponential,
}

/// Longest exponential suspension unless a policy sets its own cap.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub mode: BackoffMode,
}

impl PollPolicy {
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            initial_interval: interval,
            max_interval: DEFAULT_MAX_INTERVAL.max(interval),
            mode: BackoffMode::Fixed,
        }
    }

    pub fn with_mode(mut self, mode: BackoffMode) -> Self {
        self.mode = mode;
        self
    }

    /// Upper bound for a single exponential suspension.
    pub fn capped_at(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    /// Attempts needed so `attempts * interval` covers `budget`.
    pub fn bounded_by(budget: Duration, interval: Duration) -> Self {
        let interval_ms = interval.as_millis().max(1);
        let attempts = budget.as_millis().div_ceil(interval_ms);
        Self::fixed(u32::try_from(attempts).unwrap_or(u32::MAX), interval)
    }

    /// Suspension that follows the given 1-based attempt.
    pub fn interval_after(&self, attempt: u32) -> Duration {
        match self.mode {
            BackoffMode::Fixed => self.initial_interval,
            BackoffMode::Exponential => self
                .initial_interval
                .saturating_mul(2u32.saturating_pow(attempt))
                .min(self.max_interval),
        }
    }

    /// Longest total suspension a run of this policy can add up to.
    pub fn worst_case_wait(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.interval_after(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Suspension point between poll attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Invoke `action` until `is_terminal` accepts its value or attempts run out.
pub fn poll<R, E, A, T>(
    policy: &PollPolicy,
    sleeper: &dyn Sleeper,
    mut action: A,
    is_terminal: T,
) -> Option<R>
where
    E: Display,
    A: FnMut() -> Result<R, E>,
    T: Fn(&R) -> bool,
{
    for attempt in 1..=policy.max_attempts {
        match action() {
            Ok(value) if is_terminal(&value) => {
                tracing::debug!(attempt, "polling condition met");
                return Some(value);
            }
            Ok(_) => tracing::debug!(attempt, "polling condition not met yet"),
            Err(err) => tracing::warn!(attempt, error = %err, "polling attempt failed"),
        }

        if attempt < policy.max_attempts {
            let interval = policy.interval_after(attempt);
            tracing::debug!(next_in_ms = interval.as_millis() as u64, "waiting before next attempt");
            sleeper.sleep(interval);
        }
    }
    tracing::info!(
        max_attempts = policy.max_attempts,
        "maximum polling attempts reached"
    );
    None
}
