//! Subscription state machine for one member.
//!
//! Pure bookkeeping, no I/O: the member actor asks the machine which request
//! to issue next and feeds completions back in. Keeping it synchronous lets
//! the retry and generation rules be tested without a runtime.
//!
//! ```text
//! NotSubscribed --begin--> Pending --success--> Subscribed
//!                          Pending --failure, candidates left--> Pending (next request)
//!                          Pending --failure, none left--> NotSubscribed
//! Pending | Subscribed --reset--> NotSubscribed (generation bumped)
//! ```
//!
//! Every request carries the [`Generation`] it was issued under. `reset`
//! bumps the generation, so completions of requests issued before a
//! stream-list change or teardown come back as `Stale`.

use crate::errors::SubscriberError;
use crate::transport::{MediaMode, StreamCandidate};

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

/// Subscription lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// No subscription and no request in flight.
    NotSubscribed,
    /// A subscribe request is in flight.
    Pending,
    /// A renderer is bound.
    Subscribed,
}

impl SubscriptionState {
    /// Returns the state as a string for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::NotSubscribed => "not_subscribed",
            SubscriptionState::Pending => "pending",
            SubscriptionState::Subscribed => "subscribed",
        }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when a video request for a candidate fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeFallback {
    /// Move on to the next candidate at the requested mode.
    #[default]
    NextCandidate,
    /// Retry the same candidate audio-only, then move on.
    AudioThenNext,
}

/// Stream-list generation a request was issued under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    /// Raw counter value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One subscribe request to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub generation: Generation,
    pub candidate: StreamCandidate,
    pub mode: MediaMode,
}

/// Result of feeding a failed completion into the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureStep {
    /// Issue this request next.
    Retry(Attempt),
    /// Every candidate failed; back to `NotSubscribed`.
    Exhausted { attempts: u32 },
    /// Completion belongs to an invalidated generation.
    Stale,
}

/// Result of feeding a successful completion into the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuccessStep {
    /// Subscription established for this attempt.
    Accepted(Attempt),
    /// Completion belongs to an invalidated generation; release its handles.
    Stale,
}

/// Per-member subscription bookkeeping.
#[derive(Debug)]
pub struct SubscriptionMachine {
    state: SubscriptionState,
    generation: Generation,
    fallback: ModeFallback,
    requested_mode: MediaMode,
    /// Working copy of the candidate list for the current retry sequence.
    remaining: VecDeque<StreamCandidate>,
    /// In-flight attempt while `Pending`, accepted attempt while `Subscribed`.
    current: Option<Attempt>,
    attempts: u32,
}

impl SubscriptionMachine {
    /// Create a machine in `NotSubscribed`.
    #[must_use]
    pub fn new(fallback: ModeFallback) -> Self {
        Self {
            state: SubscriptionState::NotSubscribed,
            generation: Generation::default(),
            fallback,
            requested_mode: MediaMode::Video,
            remaining: VecDeque::new(),
            current: None,
            attempts: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The in-flight or accepted attempt.
    #[must_use]
    pub fn current(&self) -> Option<&Attempt> {
        self.current.as_ref()
    }

    /// Requests issued in the current retry sequence.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Start a retry sequence over `candidates`.
    ///
    /// Only legal in `NotSubscribed`; any other state is a caller bug and
    /// is rejected without touching the machine.
    pub fn begin(
        &mut self,
        candidates: &[StreamCandidate],
        mode: MediaMode,
    ) -> Result<Attempt, SubscriberError> {
        if self.state != SubscriptionState::NotSubscribed {
            return Err(SubscriberError::InvalidState(self.state));
        }

        let mut remaining: VecDeque<StreamCandidate> = candidates.iter().cloned().collect();
        let Some(first) = remaining.pop_front() else {
            return Err(SubscriberError::NoCandidates);
        };

        let attempt = Attempt {
            generation: self.generation,
            candidate: first,
            mode,
        };

        self.remaining = remaining;
        self.requested_mode = mode;
        self.state = SubscriptionState::Pending;
        self.current = Some(attempt.clone());
        self.attempts = 1;

        Ok(attempt)
    }

    /// Feed a successful completion.
    pub fn complete_success(&mut self, generation: Generation) -> SuccessStep {
        if !self.is_live(generation) {
            return SuccessStep::Stale;
        }

        match self.current.clone() {
            Some(attempt) => {
                self.state = SubscriptionState::Subscribed;
                self.remaining.clear();
                SuccessStep::Accepted(attempt)
            }
            None => SuccessStep::Stale,
        }
    }

    /// Feed a failed completion and pick the next request, if any.
    pub fn complete_failure(&mut self, generation: Generation) -> FailureStep {
        if !self.is_live(generation) {
            return FailureStep::Stale;
        }

        let failed = self.current.take();

        if let Some(failed) = failed {
            if self.fallback == ModeFallback::AudioThenNext && failed.mode == MediaMode::Video {
                let retry = Attempt {
                    mode: MediaMode::Audio,
                    ..failed
                };
                return self.issue(retry);
            }
        }

        match self.remaining.pop_front() {
            Some(candidate) => {
                let next = Attempt {
                    generation: self.generation,
                    candidate,
                    mode: self.requested_mode,
                };
                self.issue(next)
            }
            None => {
                self.state = SubscriptionState::NotSubscribed;
                FailureStep::Exhausted {
                    attempts: self.attempts,
                }
            }
        }
    }

    /// Invalidate in-flight requests and return to `NotSubscribed`.
    ///
    /// Returns the state before the reset.
    pub fn reset(&mut self) -> SubscriptionState {
        let previous = self.state;
        self.generation = self.generation.next();
        self.state = SubscriptionState::NotSubscribed;
        self.remaining.clear();
        self.current = None;
        self.attempts = 0;
        previous
    }

    fn issue(&mut self, attempt: Attempt) -> FailureStep {
        self.current = Some(attempt.clone());
        self.attempts += 1;
        FailureStep::Retry(attempt)
    }

    fn is_live(&self, generation: Generation) -> bool {
        generation == self.generation && self.state == SubscriptionState::Pending
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;

    fn candidates(ids: &[&str]) -> Vec<StreamCandidate> {
        ids.iter().map(|id| StreamCandidate::new(*id)).collect()
    }

    /// Drive the machine, failing the first `fail_first` requests.
    fn drive(
        machine: &mut SubscriptionMachine,
        list: &[StreamCandidate],
        fail_first: usize,
    ) -> (Vec<Attempt>, Option<SuccessStep>) {
        let mut issued = vec![machine.begin(list, MediaMode::Video).unwrap()];
        loop {
            let current = issued.last().unwrap().clone();
            if issued.len() > fail_first {
                return (issued, Some(machine.complete_success(current.generation)));
            }
            match machine.complete_failure(current.generation) {
                FailureStep::Retry(next) => issued.push(next),
                FailureStep::Exhausted { .. } => return (issued, None),
                FailureStep::Stale => unreachable!("no reset happened"),
            }
        }
    }

    #[test]
    fn test_retry_in_list_order_until_success() {
        let list = candidates(&["a", "b", "c", "d", "e"]);

        for k in 0..list.len() {
            let mut machine = SubscriptionMachine::new(ModeFallback::NextCandidate);
            let (issued, success) = drive(&mut machine, &list, k);

            assert_eq!(issued.len(), k + 1);
            for (i, attempt) in issued.iter().enumerate() {
                assert_eq!(attempt.candidate, list[i]);
                assert_eq!(attempt.mode, MediaMode::Video);
            }
            assert_eq!(success, Some(SuccessStep::Accepted(issued[k].clone())));
            assert_eq!(machine.state(), SubscriptionState::Subscribed);
            assert_eq!(machine.current().unwrap().candidate, list[k]);
        }
    }

    #[test]
    fn test_exhaustion_returns_to_not_subscribed() {
        for len in 1..5 {
            let names: Vec<String> = (0..len).map(|i| format!("s{i}")).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            let list = candidates(&refs);

            let mut machine = SubscriptionMachine::new(ModeFallback::NextCandidate);
            let mut attempt = machine.begin(&list, MediaMode::Audio).unwrap();
            let mut issued = 1;
            let exhausted = loop {
                match machine.complete_failure(attempt.generation) {
                    FailureStep::Retry(next) => {
                        issued += 1;
                        attempt = next;
                    }
                    FailureStep::Exhausted { attempts } => break attempts,
                    FailureStep::Stale => unreachable!(),
                }
            };

            assert_eq!(issued, len);
            assert_eq!(exhausted as usize, len);
            assert_eq!(machine.state(), SubscriptionState::NotSubscribed);
        }
    }

    #[test]
    fn test_begin_rejected_unless_not_subscribed() {
        let list = candidates(&["a"]);
        let mut machine = SubscriptionMachine::new(ModeFallback::NextCandidate);

        let attempt = machine.begin(&list, MediaMode::Video).unwrap();
        let err = machine.begin(&list, MediaMode::Video).unwrap_err();
        assert!(matches!(
            err,
            SubscriberError::InvalidState(SubscriptionState::Pending)
        ));

        machine.complete_success(attempt.generation);
        let err = machine.begin(&list, MediaMode::Video).unwrap_err();
        assert!(matches!(
            err,
            SubscriberError::InvalidState(SubscriptionState::Subscribed)
        ));
        // Rejection leaves the subscription alone.
        assert_eq!(machine.state(), SubscriptionState::Subscribed);
    }

    #[test]
    fn test_begin_with_empty_list() {
        let mut machine = SubscriptionMachine::new(ModeFallback::NextCandidate);
        let err = machine.begin(&[], MediaMode::Video).unwrap_err();
        assert!(matches!(err, SubscriberError::NoCandidates));
        assert_eq!(machine.state(), SubscriptionState::NotSubscribed);
    }

    #[test]
    fn test_reset_makes_pending_completion_stale() {
        let mut machine = SubscriptionMachine::new(ModeFallback::NextCandidate);
        let old = machine.begin(&candidates(&["a", "b"]), MediaMode::Video).unwrap();

        assert_eq!(machine.reset(), SubscriptionState::Pending);
        assert!(machine.generation() > old.generation);

        let new = machine.begin(&candidates(&["c"]), MediaMode::Video).unwrap();

        assert_eq!(machine.complete_success(old.generation), SuccessStep::Stale);
        assert_eq!(machine.complete_failure(old.generation), FailureStep::Stale);
        assert_eq!(machine.state(), SubscriptionState::Pending);

        assert!(matches!(
            machine.complete_success(new.generation),
            SuccessStep::Accepted(a) if a.candidate == StreamCandidate::new("c")
        ));
    }

    #[test]
    fn test_completion_after_subscribed_is_stale() {
        let mut machine = SubscriptionMachine::new(ModeFallback::NextCandidate);
        let attempt = machine.begin(&candidates(&["a"]), MediaMode::Video).unwrap();
        machine.complete_success(attempt.generation);

        assert_eq!(machine.complete_success(attempt.generation), SuccessStep::Stale);
        assert_eq!(machine.state(), SubscriptionState::Subscribed);
    }

    #[test]
    fn test_reset_twice_is_harmless() {
        let mut machine = SubscriptionMachine::new(ModeFallback::NextCandidate);
        let attempt = machine.begin(&candidates(&["a"]), MediaMode::Video).unwrap();
        machine.complete_success(attempt.generation);

        assert_eq!(machine.reset(), SubscriptionState::Subscribed);
        assert_eq!(machine.reset(), SubscriptionState::NotSubscribed);
        assert!(machine.current().is_none());
        assert_eq!(machine.generation().value(), 2);
    }

    #[test]
    fn test_audio_fallback_retries_same_candidate() {
        let mut machine = SubscriptionMachine::new(ModeFallback::AudioThenNext);
        let list = candidates(&["a", "b"]);

        let first = machine.begin(&list, MediaMode::Video).unwrap();
        let FailureStep::Retry(second) = machine.complete_failure(first.generation) else {
            panic!("expected audio retry");
        };
        assert_eq!(second.candidate, list[0]);
        assert_eq!(second.mode, MediaMode::Audio);

        let FailureStep::Retry(third) = machine.complete_failure(second.generation) else {
            panic!("expected next candidate");
        };
        assert_eq!(third.candidate, list[1]);
        assert_eq!(third.mode, MediaMode::Video);
        assert_eq!(machine.attempts(), 3);
    }

    #[test]
    fn test_audio_fallback_not_applied_to_audio_requests() {
        let mut machine = SubscriptionMachine::new(ModeFallback::AudioThenNext);
        let first = machine.begin(&candidates(&["a"]), MediaMode::Audio).unwrap();
        assert_eq!(
            machine.complete_failure(first.generation),
            FailureStep::Exhausted { attempts: 1 }
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SubscriptionState::NotSubscribed.to_string(), "not_subscribed");
        assert_eq!(SubscriptionState::Pending.to_string(), "pending");
        assert_eq!(SubscriptionState::Subscribed.to_string(), "subscribed");
    }
}
