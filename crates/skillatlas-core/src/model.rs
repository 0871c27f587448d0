//! Core data model types for skillatlas.
//!
//! Typed subject and chapter keys, question items with their IRT parameters,
//! learner responses, and per-chapter ability records.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::irt::{self, EffectiveParams};

/// Lower bound of the ability scale.
pub const THETA_MIN: f64 = -3.0;
/// Upper bound of the ability scale.
pub const THETA_MAX: f64 = 3.0;
/// Standard error never drops below this; some uncertainty always remains.
pub const SE_MIN: f64 = 0.15;
/// Standard error of a learner with no evidence.
pub const SE_MAX: f64 = 0.6;

/// The three subjects of the curriculum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKey {
    Physics,
    Chemistry,
    Mathematics,
}

impl SubjectKey {
    /// All subjects, in report order.
    pub const ALL: [SubjectKey; 3] = [
        SubjectKey::Physics,
        SubjectKey::Chemistry,
        SubjectKey::Mathematics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKey::Physics => "physics",
            SubjectKey::Chemistry => "chemistry",
            SubjectKey::Mathematics => "mathematics",
        }
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectKey {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "physics" => Ok(SubjectKey::Physics),
            "chemistry" => Ok(SubjectKey::Chemistry),
            "mathematics" | "maths" | "math" => Ok(SubjectKey::Mathematics),
            other => Err(EngineError::UnknownSubject(other.to_string())),
        }
    }
}

/// A chapter identifier of the form `<subject>_<slug>`, e.g. `physics_kinematics`.
///
/// The subject prefix is resolved once at construction, so grouping by
/// subject never re-parses strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChapterKey {
    key: String,
    subject: SubjectKey,
}

impl ChapterKey {
    pub fn new(key: impl Into<String>) -> Result<Self, EngineError> {
        let key = key.into();
        let invalid = |reason: &str| EngineError::InvalidChapterKey {
            key: key.clone(),
            reason: reason.to_string(),
        };

        let (prefix, slug) = key
            .split_once('_')
            .ok_or_else(|| invalid("expected <subject>_<chapter>"))?;
        let subject: SubjectKey = match prefix {
            "physics" => SubjectKey::Physics,
            "chemistry" => SubjectKey::Chemistry,
            "mathematics" => SubjectKey::Mathematics,
            _ => return Err(invalid("unknown subject prefix")),
        };
        if slug.is_empty() {
            return Err(invalid("empty chapter name"));
        }
        if !slug
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
        {
            return Err(invalid("chapter name must be lowercase [a-z0-9_]"));
        }

        Ok(Self { key, subject })
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn subject(&self) -> SubjectKey {
        self.subject
    }
}

impl fmt::Display for ChapterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl FromStr for ChapterKey {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChapterKey::new(s)
    }
}

impl TryFrom<String> for ChapterKey {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ChapterKey::new(value)
    }
}

impl From<ChapterKey> for String {
    fn from(value: ChapterKey) -> Self {
        value.key
    }
}

/// Question format; decides the default guessing floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    #[default]
    SingleChoice,
    MultipleChoice,
    Numerical,
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionType::SingleChoice => write!(f, "single_choice"),
            QuestionType::MultipleChoice => write!(f, "multiple_choice"),
            QuestionType::Numerical => write!(f, "numerical"),
        }
    }
}

/// Authored 3PL parameters. Any of them may be missing on input.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IrtParams {
    /// Discrimination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<f64>,
    /// Difficulty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<f64>,
    /// Guessing floor in [0, 1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c: Option<f64>,
}

/// A question in the pool. Never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionItem {
    /// Unique question identifier.
    pub id: String,
    /// Chapter this question belongs to; also determines the subject.
    pub chapter: ChapterKey,
    #[serde(default)]
    pub question_type: QuestionType,
    #[serde(default)]
    pub irt: IrtParams,
    /// Legacy scalar difficulty, used when `irt.b` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<f64>,
}

impl QuestionItem {
    pub fn subject(&self) -> SubjectKey {
        self.chapter.subject()
    }

    /// Parameters with every default applied. See [`irt::effective_params`].
    pub fn effective_params(&self) -> EffectiveParams {
        irt::effective_params(self)
    }
}

/// One learner answer, produced by the session controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub question_id: String,
    pub chapter: ChapterKey,
    pub is_correct: bool,
    #[serde(default)]
    pub student_answer: String,
    /// Option → explanation of the misconception that option represents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distractor_analysis: Option<BTreeMap<String, String>>,
    pub answered_at: DateTime<Utc>,
}

impl ResponseRecord {
    /// The explanation attached to the option the learner actually chose.
    pub fn chosen_explanation(&self) -> Option<&str> {
        self.distractor_analysis
            .as_ref()
            .and_then(|analysis| analysis.get(&self.student_answer))
            .map(String::as_str)
    }
}

/// Fewest attempts for which a rounded accuracy of 1% is reachable.
const MIN_ATTEMPTS_FOR_ONE_PERCENT: u32 = 67;

/// Ability estimate for one (learner, chapter).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChapterAbility {
    pub theta: f64,
    pub standard_error: f64,
    /// Cumulative responses seen in this chapter.
    pub attempts: u32,
    /// Percentage correct, 0-100.
    pub accuracy: f64,
}

impl Default for ChapterAbility {
    fn default() -> Self {
        Self {
            theta: 0.0,
            standard_error: SE_MAX,
            attempts: 0,
            accuracy: 0.0,
        }
    }
}

impl ChapterAbility {
    /// Accuracy as a percentage.
    ///
    /// Older records stored a fraction. Rounded percentages are whole numbers,
    /// so a value strictly between 0 and 1 can only be a fraction.
    ///
    /// Exactly `1.0` is ambiguous: a legacy all-correct record or 1%. A
    /// rounded 1% needs at least 67 attempts (`round(100 / 67) == 1`), so
    /// below that it is read as a fraction.
    pub fn accuracy_percent(&self) -> f64 {
        let acc = if self.accuracy.is_finite() {
            self.accuracy
        } else {
            0.0
        };
        if acc > 0.0 && acc < 1.0 {
            acc * 100.0
        } else if acc == 1.0 && self.attempts > 0 && self.attempts < MIN_ATTEMPTS_FOR_ONE_PERCENT {
            100.0
        } else {
            acc.clamp(0.0, 100.0)
        }
    }

    /// Correct answers implied by accuracy and attempts (unrounded).
    pub fn correct_estimate(&self) -> f64 {
        self.accuracy_percent() / 100.0 * self.attempts as f64
    }
}

/// A learner's chapter abilities, ordered by key for deterministic rollups.
pub type AbilityMap = BTreeMap<ChapterKey, ChapterAbility>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_key_resolves_subject() {
        let key = ChapterKey::new("chemistry_environmental_chem").unwrap();
        assert_eq!(key.subject(), SubjectKey::Chemistry);
        assert_eq!(key.as_str(), "chemistry_environmental_chem");
        assert_eq!(key.to_string(), "chemistry_environmental_chem");
    }

    #[test]
    fn chapter_key_rejects_bad_input() {
        assert!(ChapterKey::new("kinematics").is_err());
        assert!(ChapterKey::new("biology_cells").is_err());
        assert!(ChapterKey::new("physics_").is_err());
        assert!(ChapterKey::new("physics_Kinematics").is_err());
        assert!(ChapterKey::new("mathematics_limits-2").is_err());
        assert!(ChapterKey::new("mathematics_limits_2").is_ok());
    }

    #[test]
    fn subject_display_and_parse() {
        assert_eq!(SubjectKey::Physics.to_string(), "physics");
        assert_eq!("Maths".parse::<SubjectKey>().unwrap(), SubjectKey::Mathematics);
        assert!("biology".parse::<SubjectKey>().is_err());
    }

    #[test]
    fn chapter_key_serde_as_string() {
        let key = ChapterKey::new("physics_optics").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"physics_optics\"");
        let back: ChapterKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<ChapterKey>("\"optics\"").is_err());
    }

    #[test]
    fn legacy_fraction_accuracy_is_read_as_percent() {
        let legacy = ChapterAbility {
            accuracy: 0.70,
            attempts: 10,
            ..Default::default()
        };
        assert!((legacy.accuracy_percent() - 70.0).abs() < 1e-9);

        let modern = ChapterAbility {
            accuracy: 70.0,
            attempts: 10,
            ..Default::default()
        };
        assert!((modern.correct_estimate() - 7.0).abs() < 1e-9);
    }

    #[test]
    fn accuracy_of_one_depends_on_attempts() {
        let all_correct = ChapterAbility {
            accuracy: 1.0,
            attempts: 12,
            ..Default::default()
        };
        assert_eq!(all_correct.accuracy_percent(), 100.0);
        assert!((all_correct.correct_estimate() - 12.0).abs() < 1e-9);

        // 1 of 67 rounds to 1%, so a large record means one percent
        let one_percent = ChapterAbility {
            accuracy: 1.0,
            attempts: 67,
            ..Default::default()
        };
        assert_eq!(one_percent.accuracy_percent(), 1.0);

        let untouched = ChapterAbility {
            accuracy: 1.0,
            attempts: 0,
            ..Default::default()
        };
        assert_eq!(untouched.accuracy_percent(), 1.0);
    }

    #[test]
    fn chosen_explanation_follows_student_answer() {
        let mut analysis = BTreeMap::new();
        analysis.insert("B".to_string(), "Confused velocity with speed".to_string());
        let response = ResponseRecord {
            question_id: "q1".into(),
            chapter: ChapterKey::new("physics_kinematics").unwrap(),
            is_correct: false,
            student_answer: "B".into(),
            distractor_analysis: Some(analysis),
            answered_at: Utc::now(),
        };
        assert_eq!(
            response.chosen_explanation(),
            Some("Confused velocity with speed")
        );
    }
}
