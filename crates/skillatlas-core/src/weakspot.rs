//! Weak-spot ("atlas node") scoring and lifecycle.
//!
//! A node groups related micro-skills. Its score blends three components:
//!
//! - skill deficit: share of wrong answers per covered skill, averaged
//! - signature: share of wrong answers whose chosen-option explanation names
//!   one of the node's known misconceptions
//! - recurrence: how often the pattern has come back across sessions
//!   (computed elsewhere, passed in)
//!
//! The node state follows a hysteresis band between the stability and trigger
//! thresholds: inside the band the previous state is kept.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::{ChapterKey, ResponseRecord};
use crate::statistics::mean;

/// Allowed distance of a weight triple's sum from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-3;

/// How serious a weak spot is when it fires. Authored, not computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeverityLevel::Low => write!(f, "low"),
            SeverityLevel::Medium => write!(f, "medium"),
            SeverityLevel::High => write!(f, "high"),
        }
    }
}

/// Lifecycle state of a node for one learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// Never triggered.
    #[default]
    Inactive,
    Active,
    /// Passed retrieval practice but not yet below the stability threshold.
    Improving,
    Stable,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Inactive => write!(f, "inactive"),
            NodeState::Active => write!(f, "active"),
            NodeState::Improving => write!(f, "improving"),
            NodeState::Stable => write!(f, "stable"),
        }
    }
}

/// A named move through the node state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    /// Score reached the trigger threshold.
    Trigger,
    /// Score fell to the stability threshold.
    Stabilize,
    /// Retrieval passed but the score is still above stability.
    Improve,
    /// Keep the previous state.
    Hold,
}

impl Transition {
    pub fn apply(self, previous: NodeState) -> NodeState {
        match self {
            Transition::Trigger => NodeState::Active,
            Transition::Stabilize => NodeState::Stable,
            Transition::Improve => NodeState::Improving,
            Transition::Hold => previous,
        }
    }
}

/// Validated weight triple. Built once when a node is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawScoringWeights", into = "RawScoringWeights")]
pub struct ScoringWeights {
    skill_deficit: f64,
    signature: f64,
    recurrence: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawScoringWeights {
    skill_deficit: f64,
    signature: f64,
    recurrence: f64,
}

impl ScoringWeights {
    pub fn new(skill_deficit: f64, signature: f64, recurrence: f64) -> Result<Self, EngineError> {
        for (field, value) in [
            ("skill_deficit", skill_deficit),
            ("signature", signature),
            ("recurrence", recurrence),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(EngineError::InvalidWeight { field, value });
            }
        }
        let sum = skill_deficit + signature + recurrence;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(EngineError::WeightsDoNotSumToOne { sum });
        }
        Ok(Self {
            skill_deficit,
            signature,
            recurrence,
        })
    }

    pub fn skill_deficit(&self) -> f64 {
        self.skill_deficit
    }

    pub fn signature(&self) -> f64 {
        self.signature
    }

    pub fn recurrence(&self) -> f64 {
        self.recurrence
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            skill_deficit: 0.60,
            signature: 0.25,
            recurrence: 0.15,
        }
    }
}

impl TryFrom<RawScoringWeights> for ScoringWeights {
    type Error = EngineError;

    fn try_from(raw: RawScoringWeights) -> Result<Self, Self::Error> {
        ScoringWeights::new(raw.skill_deficit, raw.signature, raw.recurrence)
    }
}

impl From<ScoringWeights> for RawScoringWeights {
    fn from(w: ScoringWeights) -> Self {
        RawScoringWeights {
            skill_deficit: w.skill_deficit,
            signature: w.signature,
            recurrence: w.recurrence,
        }
    }
}

/// Trigger and stability thresholds, `0 <= stability <= trigger <= 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeThresholds {
    trigger: f64,
    stability: f64,
}

impl NodeThresholds {
    pub fn new(trigger: f64, stability: f64) -> Result<Self, EngineError> {
        for (field, value) in [
            ("trigger_threshold", trigger),
            ("stability_threshold", stability),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(EngineError::InvalidThreshold {
                    field,
                    value,
                    reason: "must be within [0, 1]",
                });
            }
        }
        if stability > trigger {
            return Err(EngineError::InvalidThreshold {
                field: "stability_threshold",
                value: stability,
                reason: "must not exceed trigger_threshold",
            });
        }
        Ok(Self { trigger, stability })
    }

    pub fn trigger(&self) -> f64 {
        self.trigger
    }

    pub fn stability(&self) -> f64 {
        self.stability
    }
}

impl Default for NodeThresholds {
    fn default() -> Self {
        Self {
            trigger: 0.6,
            stability: 0.4,
        }
    }
}

/// Decide the scoring transition for a node.
///
/// An inactive node only leaves `inactive` by triggering.
pub fn decide_transition(previous: NodeState, score: f64, thresholds: &NodeThresholds) -> Transition {
    if score >= thresholds.trigger {
        Transition::Trigger
    } else if score <= thresholds.stability && previous != NodeState::Inactive {
        Transition::Stabilize
    } else {
        Transition::Hold
    }
}

/// Next state after scoring.
pub fn next_state(previous: NodeState, score: f64, thresholds: &NodeThresholds) -> NodeState {
    decide_transition(previous, score, thresholds).apply(previous)
}

/// An authored atlas node definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAtlasNode", into = "RawAtlasNode")]
pub struct AtlasNode {
    pub id: String,
    pub name: String,
    pub micro_skills: BTreeSet<String>,
    pub severity: SeverityLevel,
    pub thresholds: NodeThresholds,
    pub min_signal_count: u32,
    pub weights: ScoringWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawAtlasNode {
    id: String,
    #[serde(default)]
    name: String,
    micro_skills: BTreeSet<String>,
    #[serde(default)]
    severity: SeverityLevel,
    #[serde(default = "default_trigger")]
    trigger_threshold: f64,
    #[serde(default = "default_stability")]
    stability_threshold: f64,
    #[serde(default = "default_min_signals")]
    min_signal_count: u32,
    #[serde(default)]
    weights: ScoringWeights,
}

fn default_trigger() -> f64 {
    0.6
}

fn default_stability() -> f64 {
    0.4
}

fn default_min_signals() -> u32 {
    2
}

impl TryFrom<RawAtlasNode> for AtlasNode {
    type Error = EngineError;

    fn try_from(raw: RawAtlasNode) -> Result<Self, Self::Error> {
        Ok(AtlasNode {
            thresholds: NodeThresholds::new(raw.trigger_threshold, raw.stability_threshold)?,
            id: raw.id,
            name: raw.name,
            micro_skills: raw.micro_skills,
            severity: raw.severity,
            min_signal_count: raw.min_signal_count,
            weights: raw.weights,
        })
    }
}

impl From<AtlasNode> for RawAtlasNode {
    fn from(node: AtlasNode) -> Self {
        RawAtlasNode {
            id: node.id,
            name: node.name,
            micro_skills: node.micro_skills,
            severity: node.severity,
            trigger_threshold: node.thresholds.trigger,
            stability_threshold: node.thresholds.stability,
            min_signal_count: node.min_signal_count,
            weights: node.weights,
        }
    }
}

/// The mutable part of a node, per learner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Always within [0, 1].
    pub score: f64,
    pub state: NodeState,
}

/// Reference data for one micro-skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicroSkill {
    pub id: String,
    pub chapter: ChapterKey,
    /// Misconception keywords looked for in wrong-answer explanations.
    #[serde(default)]
    pub diagnostic_focus: Vec<String>,
}

/// Skill id → skill reference data.
pub type MicroSkillMap = BTreeMap<String, MicroSkill>;

/// Question id → micro-skills the question tests.
pub type QuestionSkillMap = HashMap<String, BTreeSet<String>>;

/// Per-skill contribution to the deficit component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDeficit {
    pub skill: String,
    pub wrong: u32,
    pub right: u32,
    pub deficit: f64,
}

/// The three component scores, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentScores {
    pub skill_deficit: f64,
    pub signature: f64,
    pub recurrence: f64,
}

/// Weighted node score from its components, clamped to [0, 1].
pub fn compute_node_score(weights: &ScoringWeights, components: &ComponentScores) -> f64 {
    let score = weights.skill_deficit * components.skill_deficit
        + weights.signature * components.signature
        + weights.recurrence * components.recurrence;
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn node_relevant<'r>(
    node: &AtlasNode,
    responses: &'r [ResponseRecord],
    question_skills: &QuestionSkillMap,
) -> Vec<&'r ResponseRecord> {
    responses
        .iter()
        .filter(|r| {
            question_skills
                .get(&r.question_id)
                .is_some_and(|skills| !skills.is_disjoint(&node.micro_skills))
        })
        .collect()
}

/// Per-skill wrong/(wrong + right), averaged over the node's skills that have
/// at least one tagged response. No evidence at all scores 0.
pub fn skill_deficit(
    node: &AtlasNode,
    responses: &[ResponseRecord],
    question_skills: &QuestionSkillMap,
) -> (f64, Vec<SkillDeficit>) {
    let mut per_skill = Vec::new();
    for skill in &node.micro_skills {
        let (mut wrong, mut right) = (0u32, 0u32);
        for r in responses {
            let tagged = question_skills
                .get(&r.question_id)
                .is_some_and(|skills| skills.contains(skill));
            if !tagged {
                continue;
            }
            if r.is_correct {
                right += 1;
            } else {
                wrong += 1;
            }
        }
        if wrong + right == 0 {
            continue;
        }
        per_skill.push(SkillDeficit {
            skill: skill.clone(),
            wrong,
            right,
            deficit: wrong as f64 / (wrong + right) as f64,
        });
    }

    let deficits: Vec<f64> = per_skill.iter().map(|s| s.deficit).collect();
    (mean(&deficits).unwrap_or(0.0), per_skill)
}

/// Lowercased diagnostic keywords of every skill the node covers.
pub fn node_keywords(node: &AtlasNode, skills: &MicroSkillMap) -> Vec<String> {
    let mut keywords: Vec<String> = node
        .micro_skills
        .iter()
        .filter_map(|id| skills.get(id))
        .flat_map(|skill| skill.diagnostic_focus.iter())
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    keywords.sort();
    keywords.dedup();
    keywords
}

/// Fraction of wrong answers whose chosen-option explanation contains a
/// node keyword. Returns `(score, matched, wrong)`.
pub fn signature_score(
    wrong_responses: &[&ResponseRecord],
    keywords: &[String],
) -> (f64, u32, u32) {
    let wrong = wrong_responses.len() as u32;
    if wrong == 0 || keywords.is_empty() {
        return (0.0, 0, wrong);
    }
    let matched = wrong_responses
        .iter()
        .filter(|r| {
            r.chosen_explanation().is_some_and(|text| {
                let text = text.to_lowercase();
                keywords.iter().any(|k| text.contains(k.as_str()))
            })
        })
        .count() as u32;
    (matched as f64 / wrong as f64, matched, wrong)
}

/// Full evaluation of one node against a response batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEvaluation {
    pub node_id: String,
    pub severity: SeverityLevel,
    pub components: ComponentScores,
    pub per_skill: Vec<SkillDeficit>,
    /// Wrong answers whose explanation matched a keyword.
    pub signature_matches: u32,
    /// Wrong answers on questions tagged with one of the node's skills.
    pub signals: u32,
    pub score: f64,
    /// Score and signal count both cleared their thresholds.
    pub triggered: bool,
    pub previous: NodeSnapshot,
    pub transition: Transition,
    pub state: NodeState,
}

impl NodeEvaluation {
    /// The snapshot to persist.
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            score: self.score,
            state: self.state,
        }
    }
}

/// Score a node against a session's responses and move its state.
///
/// With fewer signals than `min_signal_count` the node cannot trigger; a
/// trigger-level score is held instead. Stabilizing needs no signals, so an
/// all-correct session can settle an active node.
pub fn evaluate_node(
    node: &AtlasNode,
    previous: NodeSnapshot,
    responses: &[ResponseRecord],
    question_skills: &QuestionSkillMap,
    skills: &MicroSkillMap,
    recurrence: f64,
) -> NodeEvaluation {
    let relevant = node_relevant(node, responses, question_skills);
    let wrong: Vec<&ResponseRecord> = relevant.into_iter().filter(|r| !r.is_correct).collect();

    let (deficit, per_skill) = skill_deficit(node, responses, question_skills);
    let keywords = node_keywords(node, skills);
    let (signature, signature_matches, signals) = signature_score(&wrong, &keywords);
    let recurrence = if recurrence.is_finite() {
        recurrence.clamp(0.0, 1.0)
    } else {
        0.0
    };

    let components = ComponentScores {
        skill_deficit: deficit,
        signature,
        recurrence,
    };
    let score = compute_node_score(&node.weights, &components);
    let enough_signals = signals >= node.min_signal_count;
    let triggered = enough_signals && score >= node.thresholds.trigger;

    let transition = match decide_transition(previous.state, score, &node.thresholds) {
        Transition::Trigger if !enough_signals => Transition::Hold,
        other => other,
    };
    let state = transition.apply(previous.state);

    tracing::debug!(
        node = %node.id,
        score,
        signals,
        triggered,
        from = %previous.state,
        to = %state,
        "node evaluated"
    );

    NodeEvaluation {
        node_id: node.id.clone(),
        severity: node.severity,
        components,
        per_skill,
        signature_matches,
        signals,
        score,
        triggered,
        previous,
        transition,
        state,
    }
}
