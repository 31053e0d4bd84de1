//! Reconnection Controller (C5): exponential backoff with a cap and a single in-flight attempt.
//!
//! Kept as its own object rather than inlined in the transport event loop, so the backoff math is
//! independently testable.

use std::time::Duration;

/// Backoff policy: doubling delay from `initial_backoff` up to `max_backoff`, giving up after
/// `max_retries` consecutive failures.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Tracks reconnect attempts against a [`ReconnectPolicy`] for a single connection.
///
/// Not `Clone`/`Send`-shared: owned by the transport task, which is the only place attempts are
/// ever driven from — the single-task concurrency model precludes two reconnects racing on
/// the same connection.
pub struct ReconnectController {
    policy: ReconnectPolicy,
    attempt: u32,
}

/// What the controller says to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait `delay`, then attempt reconnect number `attempt`.
    Retry { attempt: u32, delay: Duration },
    /// `max_retries` consecutive failures have been reached; give up.
    GiveUp,
}

impl ReconnectController {
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
        }
    }

    /// Records a failed attempt and decides whether to retry.
    pub fn next(&mut self) -> ReconnectDecision {
        if self.attempt >= self.policy.max_retries {
            tracing::warn!(max_retries = self.policy.max_retries, "reconnect: giving up");
            return ReconnectDecision::GiveUp;
        }
        self.attempt += 1;
        let delay = backoff_delay(self.policy, self.attempt);
        tracing::warn!(attempt = self.attempt, ?delay, "reconnect: scheduling retry");
        ReconnectDecision::Retry {
            attempt: self.attempt,
            delay,
        }
    }

    /// Resets the attempt counter after a successful reconnect (`resetAttempts`).
    pub fn reset(&mut self) {
        if self.attempt > 0 {
            tracing::info!(attempts = self.attempt, "reconnect: succeeded, resetting backoff");
        }
        self.attempt = 0;
    }

    /// The number of consecutive failed attempts recorded so far.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Delay before attempt number `attempt` (1-indexed): `initial * 2^(attempt - 1)`, capped at
/// `max_backoff`.
fn backoff_delay(policy: ReconnectPolicy, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let scaled = policy.initial_backoff.saturating_mul(1u32 << shift);
    scaled.min(policy.max_backoff)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
        }
    }

    #[test]
    fn backoff_doubles_each_attempt() {
        let mut controller = ReconnectController::new(policy());
        assert_eq!(
            controller.next(),
            ReconnectDecision::Retry {
                attempt: 1,
                delay: Duration::from_millis(100)
            }
        );
        assert_eq!(
            controller.next(),
            ReconnectDecision::Retry {
                attempt: 2,
                delay: Duration::from_millis(200)
            }
        );
        assert_eq!(
            controller.next(),
            ReconnectDecision::Retry {
                attempt: 3,
                delay: Duration::from_millis(400)
            }
        );
    }

    #[test]
    fn gives_up_after_max_retries() {
        let mut controller = ReconnectController::new(policy());
        controller.next();
        controller.next();
        controller.next();
        assert_eq!(controller.next(), ReconnectDecision::GiveUp);
    }

    #[test]
    fn delay_is_capped_at_max_backoff() {
        let mut controller = ReconnectController::new(ReconnectPolicy {
            max_retries: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(300),
        });
        for _ in 0..3 {
            controller.next();
        }
        assert_eq!(
            controller.next(),
            ReconnectDecision::Retry {
                attempt: 4,
                delay: Duration::from_millis(300)
            }
        );
    }

    #[test]
    fn reset_clears_attempt_counter() {
        let mut controller = ReconnectController::new(policy());
        controller.next();
        controller.next();
        controller.reset();
        assert_eq!(controller.attempt(), 0);
        assert_eq!(
            controller.next(),
            ReconnectDecision::Retry {
                attempt: 1,
                delay: Duration::from_millis(100)
            }
        );
    }
}
