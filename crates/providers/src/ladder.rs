//! Model ladder: retry and fallback as an explicit state machine.
//!
//! The ladder is an ordered list of model ids. Each completion attempt is an
//! [`Attempt`]. A successful completion ends the ladder at the caller; when
//! an attempt fails, [`ModelLadder::transition`] maps `(attempt, outcome)` to
//! what happens next. No I/O happens here, so every path is unit-testable;
//! the orchestrator performs the calls and sleeps.
//!
//! Per model:
//! - a client error (4xx) ends the ladder, no other model is tried
//! - a server/network error retries the same model with exponential backoff;
//!   once retries run out, a request that declared tools is sent once more
//!   without them, and only then does the ladder move to the next model
//! - a malformed response moves to the next model immediately

use std::time::Duration;
use wardops_core::error::ProviderError;

/// Retry parameters shared by every model in the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries of the same model after its first failure
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before the n-th retry (1-based): `base * 2^(n-1)`, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(1u32 << exp)
            .min(self.backoff_max)
    }
}

/// One completion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// Index into the ladder
    pub model: usize,
    pub retries_left: u32,
    /// Whether this attempt sends tool declarations
    pub with_tools: bool,
    /// Whether the turn declared tools at all
    pub tools_declared: bool,
}

/// How an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    ClientError,
    /// 5xx, network failure or timeout
    Transient,
    Malformed,
}

impl Outcome {
    pub fn classify(error: &ProviderError) -> Self {
        if error.is_client_error() {
            Outcome::ClientError
        } else if error.is_retryable() {
            Outcome::Transient
        } else {
            Outcome::Malformed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Same model, same payload, after a delay.
    Retry { next: Attempt, delay: Duration },
    /// Same model, last try without tool declarations.
    StripTools { next: Attempt },
    /// Next model in the ladder.
    Fallback { next: Attempt },
    Done(Verdict),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// A client error; the ladder was abandoned.
    Rejected,
    /// Every model failed.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct ModelLadder {
    models: Vec<String>,
    policy: RetryPolicy,
}

impl ModelLadder {
    pub fn new(models: Vec<String>, policy: RetryPolicy) -> Self {
        let models = models
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        Self { models, policy }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn model(&self, attempt: &Attempt) -> &str {
        &self.models[attempt.model]
    }

    /// First attempt on the model at `index`.
    pub fn start(&self, index: usize, tools_declared: bool) -> Option<Attempt> {
        (index < self.models.len()).then_some(Attempt {
            model: index,
            retries_left: self.policy.max_retries,
            with_tools: tools_declared,
            tools_declared,
        })
    }

    /// The pure transition function, applied after a failed attempt.
    pub fn transition(&self, state: Attempt, outcome: Outcome) -> Transition {
        match outcome {
            Outcome::ClientError => Transition::Done(Verdict::Rejected),
            Outcome::Malformed => self.fall_back(state),
            Outcome::Transient => {
                if state.retries_left > 0 {
                    let retry = self.policy.max_retries - state.retries_left + 1;
                    Transition::Retry {
                        next: Attempt {
                            retries_left: state.retries_left - 1,
                            ..state
                        },
                        delay: self.policy.backoff(retry),
                    }
                } else if state.with_tools {
                    Transition::StripTools {
                        next: Attempt {
                            with_tools: false,
                            ..state
                        },
                    }
                } else {
                    self.fall_back(state)
                }
            }
        }
    }

    fn fall_back(&self, state: Attempt) -> Transition {
        match self.start(state.model + 1, state.tools_declared) {
            Some(next) => Transition::Fallback { next },
            None => Transition::Done(Verdict::Exhausted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder(retries: u32) -> ModelLadder {
        ModelLadder::new(
            vec!["a".into(), "b".into(), "c".into()],
            RetryPolicy {
                max_retries: retries,
                backoff_base: Duration::from_millis(100),
                backoff_max: Duration::from_millis(350),
            },
        )
    }

    /// Drive the machine until an attempt succeeds (`None` from
    /// `failure_for`) or the ladder gives up.
    fn run(
        ladder: &ModelLadder,
        mut failure_for: impl FnMut(&Attempt) -> Option<Outcome>,
    ) -> (Result<Attempt, Verdict>, Vec<Attempt>) {
        let mut state = ladder.start(0, true).unwrap();
        let mut seen = vec![state];
        loop {
            let Some(outcome) = failure_for(&state) else {
                return (Ok(state), seen);
            };
            match ladder.transition(state, outcome) {
                Transition::Retry { next, .. }
                | Transition::StripTools { next }
                | Transition::Fallback { next } => {
                    state = next;
                    seen.push(state);
                }
                Transition::Done(verdict) => return (Err(verdict), seen),
            }
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = ladder(3).policy;
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn success_stops_immediately() {
        let ladder = ladder(2);
        let (result, seen) = run(&ladder, |_| None);
        assert_eq!(seen.len(), 1);
        assert!(matches!(result, Ok(a) if a.model == 0));
    }

    #[test]
    fn client_error_abandons_the_ladder() {
        let ladder = ladder(2);
        let (result, seen) = run(&ladder, |_| Some(Outcome::ClientError));
        assert_eq!(result, Err(Verdict::Rejected));
        assert_eq!(seen.len(), 1);
        assert!(seen.iter().all(|a| a.model == 0));
    }

    #[test]
    fn transient_retries_then_strips_tools_then_falls_back() {
        let ladder = ladder(2);
        let (result, seen) = run(&ladder, |a| (a.model != 1).then_some(Outcome::Transient));

        // a: first try + 2 retries with tools, 1 without, then b.
        let on_a: Vec<_> = seen.iter().filter(|a| a.model == 0).collect();
        assert_eq!(on_a.len(), 4);
        assert_eq!(on_a.iter().filter(|a| a.with_tools).count(), 3);
        assert!(!on_a[3].with_tools);

        match result {
            Ok(a) => {
                assert_eq!(a.model, 1);
                assert!(a.with_tools, "next model starts with tools again");
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn retry_carries_backoff_delay() {
        let ladder = ladder(2);
        let start = ladder.start(0, false).unwrap();
        match ladder.transition(start, Outcome::Transient) {
            Transition::Retry { next, delay } => {
                assert_eq!(next.retries_left, 1);
                assert_eq!(delay, Duration::from_millis(100));
            }
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[test]
    fn no_tools_declared_skips_strip_step() {
        let ladder = ladder(0);
        let start = ladder.start(0, false).unwrap();
        assert!(matches!(
            ladder.transition(start, Outcome::Transient),
            Transition::Fallback { next } if next.model == 1
        ));
    }

    #[test]
    fn malformed_falls_back_without_retry() {
        let ladder = ladder(3);
        let start = ladder.start(0, true).unwrap();
        assert!(matches!(
            ladder.transition(start, Outcome::Malformed),
            Transition::Fallback { next } if next.model == 1 && next.retries_left == 3
        ));
    }

    #[test]
    fn everything_failing_exhausts() {
        let ladder = ladder(1);
        let (result, seen) = run(&ladder, |_| Some(Outcome::Transient));
        assert_eq!(result, Err(Verdict::Exhausted));
        // 3 models x (1 + 1 retry + 1 without tools)
        assert_eq!(seen.len(), 9);
    }

    #[test]
    fn start_beyond_ladder_is_none() {
        assert!(ladder(1).start(3, true).is_none());
    }

    #[test]
    fn blank_models_are_dropped() {
        let ladder = ModelLadder::new(vec![" ".into(), "x".into()], RetryPolicy::default());
        assert_eq!(ladder.models(), &["x".to_string()]);
    }

    #[test]
    fn classify_provider_errors() {
        assert_eq!(
            Outcome::classify(&ProviderError::from_status(400, "bad")),
            Outcome::ClientError
        );
        assert_eq!(
            Outcome::classify(&ProviderError::from_status(500, "boom")),
            Outcome::Transient
        );
        assert_eq!(
            Outcome::classify(&ProviderError::Network("reset".into())),
            Outcome::Transient
        );
        assert_eq!(
            Outcome::classify(&ProviderError::MalformedResponse("no choices".into())),
            Outcome::Malformed
        );
    }
}
