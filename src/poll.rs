//! Poll-until-terminal loop shared by the export driver and CV sync.
//!
//! The loop waits one interval before every attempt, issues at most
//! `max_attempts` checks and stops early once `max_elapsed` has passed.
//! Cancellation wins every race: once the token fires, no further check is
//! started and any in-flight check is dropped.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
    pub max_elapsed: Option<Duration>,
}

impl PollConfig {
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            max_elapsed: None,
        }
    }

    pub const fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }
}

/// Progress of one poll loop. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollAttempt {
    pub attempt_number: u32,
    pub elapsed: Duration,
    pub last_status: Option<String>,
}

/// What a single status check concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep<T> {
    /// Not finished; carries the status observed, for logging and timeouts.
    Continue(String),
    Done(T),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Done(T),
    /// The attempt cap or time budget ran out. Carries the last attempt.
    TimedOut(PollAttempt),
    Cancelled,
}

/// Repeatedly runs `check` until it reports [`PollStep::Done`], the budget in
/// `config` is spent, or `cancel` fires.
pub async fn poll_until_terminal<T, F, Fut>(
    config: PollConfig,
    cancel: &CancellationToken,
    mut check: F,
) -> PollOutcome<T>
where
    F: FnMut(PollAttempt) -> Fut,
    Fut: Future<Output = PollStep<T>>,
{
    let started = Instant::now();
    let mut attempt = PollAttempt {
        attempt_number: 0,
        elapsed: Duration::ZERO,
        last_status: None,
    };

    while attempt.attempt_number < config.max_attempts {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            _ = tokio::time::sleep(config.interval) => {}
        }
        if cancel.is_cancelled() {
            return PollOutcome::Cancelled;
        }

        attempt.attempt_number += 1;
        attempt.elapsed = started.elapsed();

        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            step = check(attempt.clone()) => step,
        };

        match step {
            PollStep::Done(value) => return PollOutcome::Done(value),
            PollStep::Continue(status) => {
                debug!(
                    attempt = attempt.attempt_number,
                    status = %status,
                    "Still waiting for terminal status"
                );
                attempt.last_status = Some(status);
            }
        }

        attempt.elapsed = started.elapsed();
        if let Some(budget) = config.max_elapsed {
            // the next attempt could only start after another interval
            if attempt.elapsed + config.interval > budget {
                break;
            }
        }
    }

    PollOutcome::TimedOut(attempt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_first_done() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome = poll_until_terminal(
            PollConfig::new(Duration::from_secs(2), 10),
            &CancellationToken::new(),
            move |attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt.attempt_number == 3 {
                        PollStep::Done("ready")
                    } else {
                        PollStep::Continue("processing".to_string())
                    }
                }
            },
        )
        .await;

        assert_eq!(outcome, PollOutcome::Done("ready"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_exactly_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let started = Instant::now();

        let outcome: PollOutcome<()> = poll_until_terminal(
            PollConfig::new(Duration::from_millis(2500), 20),
            &CancellationToken::new(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { PollStep::Continue("pending".to_string()) }
            },
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 20);
        assert_eq!(started.elapsed(), Duration::from_secs(50));
        match outcome {
            PollOutcome::TimedOut(last) => {
                assert_eq!(last.attempt_number, 20);
                assert_eq!(last.last_status.as_deref(), Some("pending"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_budget_caps_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let outcome: PollOutcome<()> = poll_until_terminal(
            PollConfig::new(Duration::from_secs(2), 100).with_max_elapsed(Duration::from_secs(10)),
            &CancellationToken::new(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { PollStep::Continue("processing".to_string()) }
            },
        )
        .await;

        assert!(matches!(outcome, PollOutcome::TimedOut(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_checks_after_cancellation() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let outcome: PollOutcome<()> = poll_until_terminal(
            PollConfig::new(Duration::from_secs(2), 100),
            &cancel,
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { PollStep::Continue("processing".to_string()) }
            },
        )
        .await;

        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_never_checks() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome: PollOutcome<()> = poll_until_terminal(
            PollConfig::new(Duration::from_secs(2), 5),
            &cancel,
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { PollStep::Continue("pending".to_string()) }
            },
        )
        .await;

        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
