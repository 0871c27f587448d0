//! Ability (theta) estimation.
//!
//! A chapter's ability moves by a surprise-weighted gradient step: a correct
//! answer on an item the learner was expected to miss moves theta a lot, one
//! they were expected to get right barely moves it. Standard error shrinks with
//! every response by the information that response carried.
//!
//! Chapter estimates roll up into subject and overall abilities by
//! curriculum-weighted means.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::irt::EffectiveParams;
use crate::model::{
    AbilityMap, ChapterAbility, ChapterKey, QuestionItem, ResponseRecord, SubjectKey, SE_MAX,
    SE_MIN, THETA_MAX, THETA_MIN,
};
use crate::statistics::{theta_percentile, weighted_mean};

/// Step size applied to the mean response gradient.
pub const DEFAULT_LEARNING_RATE: f64 = 0.3;

/// Every answered item counts as at least this much information, so standard
/// error shrinks even on items far from the learner's ability.
pub const MIN_RESPONSE_INFORMATION: f64 = 0.05;

/// A response joined with the parameters of the question it answered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredResponse {
    pub params: EffectiveParams,
    pub is_correct: bool,
}

/// Join responses with their questions. Responses to unknown questions are
/// dropped.
pub fn score_responses(
    responses: &[ResponseRecord],
    questions: &HashMap<String, QuestionItem>,
) -> Vec<ScoredResponse> {
    responses
        .iter()
        .filter_map(|r| match questions.get(&r.question_id) {
            Some(q) => Some(ScoredResponse {
                params: q.effective_params(),
                is_correct: r.is_correct,
            }),
            None => {
                tracing::warn!(
                    question_id = %r.question_id,
                    "response references unknown question, skipping"
                );
                None
            }
        })
        .collect()
}

/// Result of applying one response batch to a chapter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChapterThetaUpdate {
    /// The new state to persist.
    pub ability: ChapterAbility,
    pub theta_delta: f64,
    pub se_delta: f64,
    /// Population percentile of the new theta, 0-100.
    pub percentile: f64,
    /// Responses in this batch.
    pub responses: u32,
    /// Correct responses in this batch.
    pub correct: u32,
}

fn sanitize(current: &ChapterAbility) -> ChapterAbility {
    let theta = if current.theta.is_finite() {
        current.theta.clamp(THETA_MIN, THETA_MAX)
    } else {
        0.0
    };
    let standard_error = if current.standard_error.is_finite() && current.standard_error > 0.0 {
        current.standard_error.clamp(SE_MIN, SE_MAX)
    } else {
        SE_MAX
    };
    ChapterAbility {
        theta,
        standard_error,
        attempts: current.attempts,
        accuracy: current.accuracy_percent(),
    }
}

/// Apply a response batch to a chapter's ability.
///
/// The gradient is evaluated at the prior theta for every response, so the
/// result does not depend on response order. An empty batch returns the
/// current state with zero deltas.
pub fn calculate_chapter_theta_update(
    current: &ChapterAbility,
    responses: &[ScoredResponse],
    learning_rate: f64,
) -> ChapterThetaUpdate {
    let prior = sanitize(current);

    if responses.is_empty() {
        return ChapterThetaUpdate {
            ability: prior,
            theta_delta: 0.0,
            se_delta: 0.0,
            percentile: theta_percentile(prior.theta),
            responses: 0,
            correct: 0,
        };
    }

    let n = responses.len() as f64;
    let gradient: f64 = responses
        .iter()
        .map(|r| {
            let p = r.params.probability(prior.theta);
            if r.is_correct {
                1.0 - p
            } else {
                -p
            }
        })
        .sum::<f64>()
        / n;

    let theta = (prior.theta + learning_rate * gradient).clamp(THETA_MIN, THETA_MAX);

    let information: f64 = responses
        .iter()
        .map(|r| r.params.information(theta).max(MIN_RESPONSE_INFORMATION))
        .sum();
    let precision = 1.0 / (prior.standard_error * prior.standard_error) + information;
    let standard_error = (1.0 / precision)
        .sqrt()
        .clamp(SE_MIN, SE_MAX)
        .min(prior.standard_error);

    let batch = responses.len() as u32;
    let correct = responses.iter().filter(|r| r.is_correct).count() as u32;
    let attempts = prior.attempts.saturating_add(batch);
    let accuracy = ((prior.correct_estimate() + correct as f64) / attempts as f64 * 100.0)
        .round()
        .clamp(0.0, 100.0);

    let ability = ChapterAbility {
        theta,
        standard_error,
        attempts,
        accuracy,
    };

    tracing::debug!(
        batch,
        correct,
        theta_before = prior.theta,
        theta_after = theta,
        se_before = prior.standard_error,
        se_after = standard_error,
        "chapter theta updated"
    );

    ChapterThetaUpdate {
        ability,
        theta_delta: theta - prior.theta,
        se_delta: standard_error - prior.standard_error,
        percentile: theta_percentile(theta),
        responses: batch,
        correct,
    }
}

/// Curriculum importance weights per chapter. Chapters not listed weigh 1.0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<ChapterKey, f64>", into = "BTreeMap<ChapterKey, f64>")]
pub struct ChapterWeights {
    weights: BTreeMap<ChapterKey, f64>,
}

impl ChapterWeights {
    pub const DEFAULT_WEIGHT: f64 = 1.0;

    pub fn new(weights: BTreeMap<ChapterKey, f64>) -> Result<Self, EngineError> {
        for (chapter, value) in &weights {
            if !value.is_finite() || *value <= 0.0 {
                return Err(EngineError::InvalidChapterWeight {
                    chapter: chapter.to_string(),
                    value: *value,
                });
            }
        }
        Ok(Self { weights })
    }

    pub fn weight_of(&self, chapter: &ChapterKey) -> f64 {
        self.weights
            .get(chapter)
            .copied()
            .unwrap_or(Self::DEFAULT_WEIGHT)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

impl TryFrom<BTreeMap<ChapterKey, f64>> for ChapterWeights {
    type Error = EngineError;

    fn try_from(value: BTreeMap<ChapterKey, f64>) -> Result<Self, Self::Error> {
        ChapterWeights::new(value)
    }
}

impl From<ChapterWeights> for BTreeMap<ChapterKey, f64> {
    fn from(value: ChapterWeights) -> Self {
        value.weights
    }
}

/// Rolled-up ability for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectAbility {
    pub subject: SubjectKey,
    pub theta: f64,
    pub standard_error: f64,
    pub percentile: f64,
    /// Chapters contributing to this subject.
    pub chapters: usize,
    /// Sum of the contributing chapters' curriculum weights.
    pub weight: f64,
    pub total_attempts: u32,
    pub total_correct: u32,
    /// Σcorrect / Σattempts as a percentage.
    pub accuracy: f64,
}

impl SubjectAbility {
    fn empty(subject: SubjectKey) -> Self {
        Self {
            subject,
            theta: 0.0,
            standard_error: SE_MAX,
            percentile: theta_percentile(0.0),
            chapters: 0,
            weight: 0.0,
            total_attempts: 0,
            total_correct: 0,
            accuracy: 0.0,
        }
    }
}

/// Ability across every subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallAbility {
    pub theta: f64,
    pub standard_error: f64,
    pub percentile: f64,
    pub total_attempts: u32,
    pub total_correct: u32,
    pub accuracy: f64,
}

/// Subject and overall rollup of a learner's chapter abilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityRollup {
    /// Always holds all three subjects, even with no chapters.
    pub subjects: BTreeMap<SubjectKey, SubjectAbility>,
    pub overall: OverallAbility,
}

fn accuracy_of(correct: u32, attempts: u32) -> f64 {
    if attempts == 0 {
        0.0
    } else {
        correct as f64 / attempts as f64 * 100.0
    }
}

/// Standard error of a weighted mean of independent estimates.
fn pooled_standard_error(pairs: &[(f64, f64)]) -> f64 {
    let total: f64 = pairs.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return SE_MAX;
    }
    let variance: f64 = pairs.iter().map(|(se, w)| (w * se).powi(2)).sum();
    (variance.sqrt() / total).clamp(SE_MIN, SE_MAX)
}

/// Recompute subject and overall ability from every chapter.
///
/// Subject theta is the weighted mean of its chapters' thetas; overall theta
/// weights each subject by the total weight of its chapters, so a heavy
/// chapter dominates both. Never fails; empty input yields zeros.
pub fn calculate_subject_and_overall_theta_update(
    abilities: &AbilityMap,
    weights: &ChapterWeights,
) -> AbilityRollup {
    let mut grouped: BTreeMap<SubjectKey, Vec<(&ChapterKey, &ChapterAbility)>> = BTreeMap::new();
    for (chapter, ability) in abilities {
        grouped.entry(chapter.subject()).or_default().push((chapter, ability));
    }

    let mut subjects = BTreeMap::new();
    let mut all_se = Vec::new();
    for subject in SubjectKey::ALL {
        let Some(chapters) = grouped.get(&subject) else {
            subjects.insert(subject, SubjectAbility::empty(subject));
            continue;
        };

        let mut theta_pairs = Vec::with_capacity(chapters.len());
        let mut se_pairs = Vec::with_capacity(chapters.len());
        let mut total_attempts = 0u32;
        let mut total_correct = 0u32;
        for (chapter, ability) in chapters {
            let ability = sanitize(ability);
            let w = weights.weight_of(chapter);
            theta_pairs.push((ability.theta, w));
            se_pairs.push((ability.standard_error, w));
            total_attempts = total_attempts.saturating_add(ability.attempts);
            total_correct = total_correct.saturating_add(ability.correct_estimate().round() as u32);
        }
        all_se.extend(se_pairs.iter().copied());

        let weight: f64 = theta_pairs.iter().map(|(_, w)| w).sum();
        let theta = weighted_mean(theta_pairs)
            .unwrap_or(0.0)
            .clamp(THETA_MIN, THETA_MAX);

        subjects.insert(
            subject,
            SubjectAbility {
                subject,
                theta,
                standard_error: pooled_standard_error(&se_pairs),
                percentile: theta_percentile(theta),
                chapters: chapters.len(),
                weight,
                total_attempts,
                total_correct,
                accuracy: accuracy_of(total_correct, total_attempts),
            },
        );
    }

    let overall_theta = weighted_mean(
        subjects
            .values()
            .filter(|s| s.chapters > 0)
            .map(|s| (s.theta, s.weight)),
    )
    .unwrap_or(0.0)
    .clamp(THETA_MIN, THETA_MAX);
    let total_attempts = subjects.values().map(|s| s.total_attempts).sum();
    let total_correct = subjects.values().map(|s| s.total_correct).sum();

    AbilityRollup {
        overall: OverallAbility {
            theta: overall_theta,
            standard_error: pooled_standard_error(&all_se),
            percentile: theta_percentile(overall_theta),
            total_attempts,
            total_correct,
            accuracy: accuracy_of(total_correct, total_attempts),
        },
        subjects,
    }
}
