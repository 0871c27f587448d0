//! Retrieval-practice follow-up for a triggered node.
//!
//! A short quiz (usually three questions) either confirms the learner has
//! recovered, decaying the node score, or keeps the node active.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::statistics::round_to;
use crate::weakspot::{NodeSnapshot, NodeState, NodeThresholds, Transition};

/// Correct answers needed to pass a retrieval quiz.
pub const DEFAULT_PASS_MARK: u32 = 2;
/// Multiplier applied to the node score on a pass.
pub const DEFAULT_DECAY_FACTOR: f64 = 0.5;

/// Retrieval rules, from [`crate::config::RetrievalConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalPolicy {
    pub pass_mark: u32,
    pub decay_factor: f64,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self {
            pass_mark: DEFAULT_PASS_MARK,
            decay_factor: DEFAULT_DECAY_FACTOR,
        }
    }
}

/// Outcome of a retrieval quiz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub passed: bool,
    pub correct: u32,
    pub total: u32,
    pub previous: NodeSnapshot,
    pub transition: Transition,
    /// Score and state to persist.
    pub next: NodeSnapshot,
}

/// Apply a retrieval quiz result to a node.
///
/// Pass: score × decay, rounded to two decimals; stable at or below the
/// stability threshold, improving above it. Fail: score unchanged, node
/// back to active.
///
/// Rejects `correct > total` with [`EngineError::InvalidRetrievalCount`].
pub fn evaluate_retrieval(
    previous: NodeSnapshot,
    correct: u32,
    total: u32,
    thresholds: &NodeThresholds,
    policy: &RetrievalPolicy,
) -> Result<RetrievalResult, EngineError> {
    if correct > total {
        return Err(EngineError::InvalidRetrievalCount { correct, total });
    }
    let prior_score = if previous.score.is_finite() {
        previous.score.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let passed = correct >= policy.pass_mark;

    let (score, transition) = if passed {
        let score = round_to((prior_score * policy.decay_factor).clamp(0.0, 1.0), 2);
        let transition = if score <= thresholds.stability() {
            Transition::Stabilize
        } else {
            Transition::Improve
        };
        (score, transition)
    } else {
        (round_to(prior_score, 2), Transition::Trigger)
    };

    let state = transition.apply(previous.state);
    tracing::debug!(
        correct,
        total,
        passed,
        score_before = prior_score,
        score_after = score,
        state = %state,
        "retrieval evaluated"
    );

    Ok(RetrievalResult {
        passed,
        correct,
        total,
        previous,
        transition,
        next: NodeSnapshot { score, state },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(score: f64) -> NodeSnapshot {
        NodeSnapshot {
            score,
            state: NodeState::Active,
        }
    }

    fn thresholds() -> NodeThresholds {
        NodeThresholds::new(0.6, 0.4).unwrap()
    }

    #[test]
    fn pass_halves_score_to_stable() {
        let result = evaluate_retrieval(active(0.8), 2, 3, &thresholds(), &RetrievalPolicy::default()).unwrap();
        assert!(result.passed);
        assert_eq!(result.next.score, 0.40);
        assert_eq!(result.next.state, NodeState::Stable);
        assert_eq!(result.transition, Transition::Stabilize);
    }

    #[test]
    fn pass_above_stability_is_improving() {
        let result = evaluate_retrieval(active(0.95), 3, 3, &thresholds(), &RetrievalPolicy::default()).unwrap();
        assert_eq!(result.next.score, 0.48);
        assert_eq!(result.next.state, NodeState::Improving);
    }

    #[test]
    fn fail_keeps_score_and_reactivates() {
        let previous = NodeSnapshot {
            score: 0.55,
            state: NodeState::Improving,
        };
        let result = evaluate_retrieval(previous, 1, 3, &thresholds(), &RetrievalPolicy::default()).unwrap();
        assert!(!result.passed);
        assert_eq!(result.next.score, 0.55);
        assert_eq!(result.next.state, NodeState::Active);
    }

    #[test]
    fn custom_policy_applies() {
        let policy = RetrievalPolicy {
            pass_mark: 3,
            decay_factor: 0.25,
        };
        let fail = evaluate_retrieval(active(0.8), 2, 3, &thresholds(), &policy).unwrap();
        assert!(!fail.passed);
        let pass = evaluate_retrieval(active(0.8), 3, 3, &thresholds(), &policy).unwrap();
        assert_eq!(pass.next.score, 0.2);
    }

    #[test]
    fn more_correct_than_asked_is_rejected() {
        let err = evaluate_retrieval(active(0.8), 5, 3, &thresholds(), &RetrievalPolicy::default())
            .unwrap_err();
        assert_eq!(err, EngineError::InvalidRetrievalCount { correct: 5, total: 3 });
        assert!(err.to_string().contains("cannot exceed total"));
    }
}
