use std::collections::HashSet;

use proptest::prelude::*;

use skillatlas_core::irt::{fisher_information, probability, EffectiveParams};
use skillatlas_core::model::{
    AbilityMap, ChapterAbility, ChapterKey, IrtParams, QuestionItem, QuestionType, SubjectKey,
    SE_MAX, SE_MIN, THETA_MAX, THETA_MIN,
};
use skillatlas_core::retrieval::{evaluate_retrieval, RetrievalPolicy};
use skillatlas_core::selector::{select_session, AnswerHistory, SelectionRequest};
use skillatlas_core::theta::{
    calculate_chapter_theta_update, calculate_subject_and_overall_theta_update, ChapterWeights,
    ScoredResponse, DEFAULT_LEARNING_RATE,
};
use skillatlas_core::weakspot::{
    compute_node_score, ComponentScores, NodeSnapshot, NodeState, NodeThresholds, ScoringWeights,
};

fn params() -> impl Strategy<Value = EffectiveParams> {
    (0.2f64..3.0, -3.0f64..3.0, 0.0f64..0.5).prop_map(|(a, b, c)| EffectiveParams { a, b, c })
}

fn batch(correct: Option<bool>) -> impl Strategy<Value = Vec<ScoredResponse>> {
    prop::collection::vec((params(), any::<bool>()), 1..30).prop_map(move |items| {
        items
            .into_iter()
            .map(|(params, is_correct)| ScoredResponse {
                params,
                is_correct: correct.unwrap_or(is_correct),
            })
            .collect()
    })
}

fn ability() -> impl Strategy<Value = ChapterAbility> {
    (-10.0f64..10.0, -1.0f64..2.0, 0u32..500, 0.0f64..100.0).prop_map(
        |(theta, standard_error, attempts, accuracy)| ChapterAbility {
            theta,
            standard_error,
            attempts,
            accuracy,
        },
    )
}

proptest! {
    #[test]
    fn probability_between_guessing_and_one(theta in -6.0f64..6.0, p in params()) {
        let prob = probability(theta, p.a, p.b, p.c);
        prop_assert!(prob >= p.c - 1e-12 && prob <= 1.0, "p = {}", prob);
    }

    #[test]
    fn information_is_finite_and_non_negative(theta in -6.0f64..6.0, p in params()) {
        let info = fisher_information(theta, p.a, p.b, p.c);
        prop_assert!(info.is_finite());
        prop_assert!(info >= 0.0);
    }

    #[test]
    fn chapter_update_stays_in_bounds(prior in ability(), responses in batch(None)) {
        let update = calculate_chapter_theta_update(&prior, &responses, DEFAULT_LEARNING_RATE);
        prop_assert!((THETA_MIN..=THETA_MAX).contains(&update.ability.theta));
        prop_assert!((SE_MIN..=SE_MAX).contains(&update.ability.standard_error));
        prop_assert!((0.0..=100.0).contains(&update.ability.accuracy));
        prop_assert_eq!(update.ability.attempts, prior.attempts + responses.len() as u32);
    }

    #[test]
    fn all_correct_raises_theta_and_shrinks_se(
        theta in -2.5f64..2.5,
        se in 0.2f64..0.6,
        responses in batch(Some(true)),
    ) {
        let prior = ChapterAbility { theta, standard_error: se, attempts: 0, accuracy: 0.0 };
        let update = calculate_chapter_theta_update(&prior, &responses, DEFAULT_LEARNING_RATE);
        prop_assert!(update.theta_delta > 0.0);
        prop_assert!(update.se_delta < 0.0);
    }

    #[test]
    fn all_incorrect_lowers_theta(theta in -2.5f64..2.5, responses in batch(Some(false))) {
        let prior = ChapterAbility { theta, ..Default::default() };
        let update = calculate_chapter_theta_update(&prior, &responses, DEFAULT_LEARNING_RATE);
        prop_assert!(update.theta_delta < 0.0);
    }

    #[test]
    fn node_score_is_a_unit_interval(
        deficit in -1.0f64..2.0,
        signature in -1.0f64..2.0,
        recurrence in -1.0f64..2.0,
    ) {
        let components = ComponentScores { skill_deficit: deficit, signature, recurrence };
        let score = compute_node_score(&ScoringWeights::default(), &components);
        prop_assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn retrieval_pass_never_raises_score(score in 0.0f64..1.0, correct in 2u32..=3) {
        let thresholds = NodeThresholds::new(0.6, 0.4).unwrap();
        let previous = NodeSnapshot { score, state: NodeState::Active };
        let result = evaluate_retrieval(previous, correct, 3, &thresholds, &RetrievalPolicy::default()).unwrap();
        prop_assert!(result.passed);
        prop_assert!(result.next.score <= score + 0.005);
        prop_assert!(matches!(result.next.state, NodeState::Stable | NodeState::Improving));
    }

    #[test]
    fn selection_is_bounded_and_unique(
        difficulties in prop::collection::vec(-2.0f64..3.0, 0..60),
        count in 0usize..40,
    ) {
        let chapter = ChapterKey::new("chemistry_bonding").unwrap();
        let pool: Vec<QuestionItem> = difficulties
            .iter()
            .enumerate()
            .map(|(i, b)| QuestionItem {
                id: format!("q{i}"),
                chapter: chapter.clone(),
                question_type: QuestionType::SingleChoice,
                irt: IrtParams { a: None, b: Some(*b), c: None },
                difficulty: None,
            })
            .collect();

        let selected = select_session(
            &pool,
            &AnswerHistory::default(),
            SelectionRequest { count, theta: Some(0.0) },
        );
        prop_assert_eq!(selected.len(), count.min(pool.len()));
        let ids: HashSet<_> = selected.iter().map(|s| s.question.id.as_str()).collect();
        prop_assert_eq!(ids.len(), selected.len());
    }

    #[test]
    fn rollup_overall_between_chapter_extremes(
        thetas in prop::collection::vec(-3.0f64..3.0, 1..6),
    ) {
        let chapters = [
            "physics_kinematics",
            "physics_optics",
            "chemistry_bonding",
            "chemistry_equilibrium",
            "mathematics_calculus",
            "mathematics_vectors",
        ];
        let mut abilities = AbilityMap::new();
        for (key, theta) in chapters.iter().zip(&thetas) {
            abilities.insert(
                ChapterKey::new(*key).unwrap(),
                ChapterAbility { theta: *theta, ..Default::default() },
            );
        }

        let rollup = calculate_subject_and_overall_theta_update(&abilities, &ChapterWeights::default());
        prop_assert_eq!(rollup.subjects.len(), SubjectKey::ALL.len());
        let min = thetas.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = thetas.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(rollup.overall.theta >= min - 1e-9 && rollup.overall.theta <= max + 1e-9);
    }
}
