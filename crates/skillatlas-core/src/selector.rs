//! Difficulty banding and session question selection.
//!
//! A session is emitted as an easy block, then a medium block, then a hard
//! block. Inside each block, questions the learner has never seen come first,
//! then ones they last got wrong, then ones they last got right.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::irt::{effective_difficulty, rank_by_information};
use crate::model::{QuestionItem, ResponseRecord};

/// Upper bound (inclusive) of the easy band.
pub const EASY_MAX: f64 = 0.7;
/// Upper bound (inclusive) of the medium band.
pub const MEDIUM_MAX: f64 = 1.2;

/// Default session length.
pub const DEFAULT_SESSION_SIZE: usize = 15;

/// Difficulty band of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyBand {
    Easy,
    Medium,
    Hard,
}

impl DifficultyBand {
    pub const ALL: [DifficultyBand; 3] = [
        DifficultyBand::Easy,
        DifficultyBand::Medium,
        DifficultyBand::Hard,
    ];

    fn index(self) -> usize {
        match self {
            DifficultyBand::Easy => 0,
            DifficultyBand::Medium => 1,
            DifficultyBand::Hard => 2,
        }
    }

    /// Bands that absorb this band's shortfall, nearest first.
    fn donors(self) -> [DifficultyBand; 2] {
        match self {
            DifficultyBand::Easy => [DifficultyBand::Medium, DifficultyBand::Hard],
            DifficultyBand::Medium => [DifficultyBand::Easy, DifficultyBand::Hard],
            DifficultyBand::Hard => [DifficultyBand::Medium, DifficultyBand::Easy],
        }
    }
}

impl fmt::Display for DifficultyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DifficultyBand::Easy => write!(f, "easy"),
            DifficultyBand::Medium => write!(f, "medium"),
            DifficultyBand::Hard => write!(f, "hard"),
        }
    }
}

/// Band for a raw difficulty value. Boundaries are inclusive on the lower band.
pub fn classify_difficulty(difficulty: f64) -> DifficultyBand {
    if difficulty <= EASY_MAX {
        DifficultyBand::Easy
    } else if difficulty <= MEDIUM_MAX {
        DifficultyBand::Medium
    } else {
        DifficultyBand::Hard
    }
}

/// Band for a question, using its effective difficulty.
pub fn classify(question: &QuestionItem) -> DifficultyBand {
    classify_difficulty(effective_difficulty(question))
}

/// What the learner did the last time they saw a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Unseen,
    LastIncorrect,
    LastCorrect,
}

impl HistoryStatus {
    pub fn priority(self) -> u8 {
        match self {
            HistoryStatus::Unseen => 3,
            HistoryStatus::LastIncorrect => 2,
            HistoryStatus::LastCorrect => 1,
        }
    }
}

/// Latest outcome per question id.
#[derive(Debug, Clone, Default)]
pub struct AnswerHistory {
    latest: HashMap<String, (chrono::DateTime<chrono::Utc>, bool)>,
}

impl AnswerHistory {
    /// Build from past responses. When two responses share a timestamp the
    /// later one in the slice wins.
    pub fn from_responses(responses: &[ResponseRecord]) -> Self {
        let mut latest: HashMap<String, (chrono::DateTime<chrono::Utc>, bool)> = HashMap::new();
        for r in responses {
            match latest.get(&r.question_id) {
                Some((at, _)) if *at > r.answered_at => {}
                _ => {
                    latest.insert(r.question_id.clone(), (r.answered_at, r.is_correct));
                }
            }
        }
        Self { latest }
    }

    pub fn status(&self, question_id: &str) -> HistoryStatus {
        match self.latest.get(question_id) {
            None => HistoryStatus::Unseen,
            Some((_, true)) => HistoryStatus::LastCorrect,
            Some((_, false)) => HistoryStatus::LastIncorrect,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

/// A question chosen for a session, with why it landed where it did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedQuestion {
    pub question: QuestionItem,
    pub band: DifficultyBand,
    pub status: HistoryStatus,
    pub priority: u8,
    /// Fisher information at the learner's theta, when one was supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub information: Option<f64>,
}

/// Parameters for building one practice session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionRequest {
    /// Number of questions wanted.
    pub count: usize,
    /// Learner's current theta; breaks priority ties by information.
    pub theta: Option<f64>,
}

impl Default for SelectionRequest {
    fn default() -> Self {
        Self {
            count: DEFAULT_SESSION_SIZE,
            theta: None,
        }
    }
}

/// Split `total` into per-band targets, roughly a third each.
///
/// The remainder goes to easy first, then medium.
pub fn band_targets(total: usize) -> [usize; 3] {
    let base = total / 3;
    let mut targets = [base; 3];
    for slot in targets.iter_mut().take(total % 3) {
        *slot += 1;
    }
    targets
}

/// Fill per-band targets from what is available, moving any band's shortfall
/// to its neighbours.
pub fn allocate(total: usize, available: [usize; 3]) -> [usize; 3] {
    let targets = band_targets(total);
    let mut alloc = [0usize; 3];
    for band in DifficultyBand::ALL {
        let i = band.index();
        alloc[i] = targets[i].min(available[i]);
    }

    for band in DifficultyBand::ALL {
        let i = band.index();
        // A band may already hold more than its target after absorbing a
        // neighbour's shortfall.
        let mut deficit = targets[i].saturating_sub(alloc[i]);
        for donor in band.donors() {
            if deficit == 0 {
                break;
            }
            let j = donor.index();
            let spare = available[j] - alloc[j];
            let moved = spare.min(deficit);
            alloc[j] += moved;
            deficit -= moved;
        }
    }

    alloc
}

/// Build an ordered practice session from a pool.
///
/// Never fails: an empty pool gives an empty session and a pool smaller than
/// `request.count` is returned whole, still ordered.
pub fn select_session(
    pool: &[QuestionItem],
    history: &AnswerHistory,
    request: SelectionRequest,
) -> Vec<SelectedQuestion> {
    if pool.is_empty() || request.count == 0 {
        return Vec::new();
    }

    // Most informative first when an ability is known, else pool order.
    let ordered: Vec<(&QuestionItem, Option<f64>)> = match request.theta {
        Some(theta) => rank_by_information(theta, pool)
            .into_iter()
            .map(|(q, info)| (q, Some(info)))
            .collect(),
        None => pool.iter().map(|q| (q, None)).collect(),
    };

    let mut bands: [Vec<SelectedQuestion>; 3] = Default::default();
    for (question, information) in ordered {
        let band = classify(question);
        let status = history.status(&question.id);
        bands[band.index()].push(SelectedQuestion {
            question: question.clone(),
            band,
            status,
            priority: status.priority(),
            information,
        });
    }

    // Stable, so information order survives within a priority.
    for block in bands.iter_mut() {
        block.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    let available = [bands[0].len(), bands[1].len(), bands[2].len()];
    let alloc = allocate(request.count, available);

    tracing::debug!(
        pool = pool.len(),
        requested = request.count,
        ?available,
        ?alloc,
        "allocated session bands"
    );

    bands
        .into_iter()
        .zip(alloc)
        .flat_map(|(block, take)| block.into_iter().take(take))
        .collect()
}

/// Match window (in theta units) around the learner's ability.
///
/// Scarce pools get a wider window so a session is never starved.
pub fn adaptive_tolerance(candidates: usize) -> f64 {
    match candidates {
        0..=9 => 1.5,
        10..=29 => 1.0,
        _ => 0.5,
    }
}

/// Keep the questions whose difficulty lies within the adaptive window of `theta`.
pub fn filter_near_ability(pool: &[QuestionItem], theta: f64) -> Vec<QuestionItem> {
    let tolerance = adaptive_tolerance(pool.len());
    pool.iter()
        .filter(|q| (effective_difficulty(q) - theta).abs() <= tolerance)
        .cloned()
        .collect()
}
