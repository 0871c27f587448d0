//! Three-parameter logistic (3PL) item response model.
//!
//! P(correct | θ) = c + (1 - c) / (1 + e^(-a(θ - b)))
//!
//! Where a = discrimination, b = difficulty, c = guessing floor.

use serde::{Deserialize, Serialize};

use crate::model::{QuestionItem, QuestionType};

/// Discrimination assumed when a question carries none.
pub const DEFAULT_DISCRIMINATION: f64 = 1.0;
/// Difficulty assumed when a question carries neither `b` nor a legacy difficulty.
pub const DEFAULT_DIFFICULTY: f64 = 0.0;
/// Guessing floor for single-answer multiple choice (one of four options).
pub const GUESSING_SINGLE_CHOICE: f64 = 0.25;
/// Guessing floor for select-all-that-apply questions.
pub const GUESSING_MULTIPLE_CHOICE: f64 = 0.10;
/// Free-response numerical answers cannot be guessed.
pub const GUESSING_NUMERICAL: f64 = 0.0;
/// Upper bound for `c`; at 1.0 the item carries no information.
pub const MAX_GUESSING: f64 = 0.99;

/// Fully-resolved 3PL parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectiveParams {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl EffectiveParams {
    pub fn probability(&self, theta: f64) -> f64 {
        probability(theta, self.a, self.b, self.c)
    }

    pub fn information(&self, theta: f64) -> f64 {
        fisher_information(theta, self.a, self.b, self.c)
    }
}

/// Default guessing floor per question type.
pub fn default_guessing(question_type: QuestionType) -> f64 {
    match question_type {
        QuestionType::SingleChoice => GUESSING_SINGLE_CHOICE,
        QuestionType::MultipleChoice => GUESSING_MULTIPLE_CHOICE,
        QuestionType::Numerical => GUESSING_NUMERICAL,
    }
}

/// Resolve a question's 3PL parameters, applying every default in one place.
///
/// - `a`: authored value if finite and positive, else [`DEFAULT_DISCRIMINATION`].
/// - `b`: authored `irt.b`, else the legacy scalar `difficulty`, else
///   [`DEFAULT_DIFFICULTY`].
/// - `c`: authored value if finite, clamped to `[0, MAX_GUESSING]`, else the
///   question type's default.
pub fn effective_params(question: &QuestionItem) -> EffectiveParams {
    let a = question
        .irt
        .a
        .filter(|a| a.is_finite() && *a > 0.0)
        .unwrap_or(DEFAULT_DISCRIMINATION);
    let b = effective_difficulty(question);
    let c = question
        .irt
        .c
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, MAX_GUESSING))
        .unwrap_or_else(|| default_guessing(question.question_type));

    EffectiveParams { a, b, c }
}

/// The difficulty used for both the 3PL model and banding.
pub fn effective_difficulty(question: &QuestionItem) -> f64 {
    question
        .irt
        .b
        .filter(|b| b.is_finite())
        .or(question.difficulty.filter(|d| d.is_finite()))
        .unwrap_or(DEFAULT_DIFFICULTY)
}

/// Probability of a correct response under the 3PL model, clamped to [0, 1].
///
/// Never below the guessing floor `c`.
pub fn probability(theta: f64, a: f64, b: f64, c: f64) -> f64 {
    let logistic = 1.0 / (1.0 + (-a * (theta - b)).exp());
    (c + (1.0 - c) * logistic).clamp(0.0, 1.0)
}

/// Fisher information of a 3PL item at `theta`.
///
/// I(θ) = a² · (p - c)² / (1 - c)² · (1 - p) / p
///
/// Returns 0 at the degenerate edges (p at a bound, c ≥ 1) instead of NaN.
pub fn fisher_information(theta: f64, a: f64, b: f64, c: f64) -> f64 {
    if c >= 1.0 {
        return 0.0;
    }
    let p = probability(theta, a, b, c);
    if p <= 0.0 || p >= 1.0 {
        return 0.0;
    }

    let info = a * a * ((p - c).powi(2) / (1.0 - c).powi(2)) * ((1.0 - p) / p);
    if info.is_finite() {
        info.max(0.0)
    } else {
        0.0
    }
}

/// Order questions by information at `theta`, most informative first.
///
/// Ties keep their input order.
pub fn rank_by_information<'a>(
    theta: f64,
    questions: &'a [QuestionItem],
) -> Vec<(&'a QuestionItem, f64)> {
    let mut ranked: Vec<(&QuestionItem, f64)> = questions
        .iter()
        .map(|q| (q, q.effective_params().information(theta)))
        .collect();

    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChapterKey, IrtParams};

    fn question(irt: IrtParams, difficulty: Option<f64>, question_type: QuestionType) -> QuestionItem {
        QuestionItem {
            id: "q".into(),
            chapter: ChapterKey::new("physics_kinematics").unwrap(),
            question_type,
            irt,
            difficulty,
        }
    }

    #[test]
    fn probability_at_difficulty_is_midpoint_above_floor() {
        let p = probability(0.5, 1.3, 0.5, 0.2);
        assert!((p - 0.6).abs() < 1e-12, "got {p}");
    }

    #[test]
    fn probability_respects_guessing_floor() {
        let p = probability(-50.0, 2.0, 1.0, 0.25);
        assert!(p >= 0.25);
        assert!((p - 0.25).abs() < 1e-9);
    }

    #[test]
    fn probability_approaches_one() {
        assert!(probability(40.0, 1.0, 0.0, 0.0) > 0.999_999);
    }

    #[test]
    fn information_is_zero_at_extremes() {
        assert_eq!(fisher_information(1000.0, 1.0, 0.0, 0.0), 0.0);
        assert_eq!(fisher_information(0.0, 1.0, 0.0, 1.0), 0.0);
        let far = fisher_information(-1000.0, 1.0, 0.0, 0.2);
        assert!(far.is_finite() && far >= 0.0);
    }

    #[test]
    fn information_grows_with_discrimination() {
        let low = fisher_information(0.3, 0.8, 0.3, 0.2);
        let high = fisher_information(0.3, 1.6, 0.3, 0.2);
        assert!(high > low);
    }

    #[test]
    fn information_peaks_near_difficulty() {
        let at_b = fisher_information(0.0, 1.5, 0.0, 0.0);
        assert!(at_b > fisher_information(1.5, 1.5, 0.0, 0.0));
        assert!(at_b > fisher_information(-1.5, 1.5, 0.0, 0.0));
        // 2PL information at θ = b is a²/4.
        assert!((at_b - 1.5 * 1.5 / 4.0).abs() < 1e-12);
    }

    #[test]
    fn effective_params_apply_defaults() {
        let q = question(IrtParams::default(), None, QuestionType::SingleChoice);
        let params = q.effective_params();
        assert_eq!(params.a, DEFAULT_DISCRIMINATION);
        assert_eq!(params.b, DEFAULT_DIFFICULTY);
        assert_eq!(params.c, GUESSING_SINGLE_CHOICE);

        let q = question(IrtParams::default(), Some(0.9), QuestionType::Numerical);
        let params = q.effective_params();
        assert_eq!(params.b, 0.9);
        assert_eq!(params.c, 0.0);
    }

    #[test]
    fn effective_params_reject_garbage() {
        let q = question(
            IrtParams {
                a: Some(-1.0),
                b: Some(f64::NAN),
                c: Some(1.4),
            },
            Some(0.4),
            QuestionType::SingleChoice,
        );
        let params = q.effective_params();
        assert_eq!(params.a, DEFAULT_DISCRIMINATION);
        assert_eq!(params.b, 0.4);
        assert_eq!(params.c, MAX_GUESSING);
    }

    #[test]
    fn rank_prefers_items_near_theta() {
        let near = QuestionItem {
            id: "near".into(),
            ..question(
                IrtParams {
                    a: Some(1.0),
                    b: Some(0.0),
                    c: Some(0.0),
                },
                None,
                QuestionType::Numerical,
            )
        };
        let far = QuestionItem {
            id: "far".into(),
            ..question(
                IrtParams {
                    a: Some(1.0),
                    b: Some(2.5),
                    c: Some(0.0),
                },
                None,
                QuestionType::Numerical,
            )
        };
        let pool = vec![far, near];
        let ranked = rank_by_information(0.0, &pool);
        assert_eq!(ranked[0].0.id, "near");
        assert_eq!(ranked[1].0.id, "far");
    }
}
