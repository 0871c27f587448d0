//! Content loading.
//!
//! Question banks, micro-skills, atlas nodes and curriculum weights are
//! authored as TOML; response batches and ability maps arrive as JSON.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{AbilityMap, ChapterKey, IrtParams, QuestionItem, QuestionType, ResponseRecord};
use crate::theta::ChapterWeights;
use crate::weakspot::{AtlasNode, MicroSkill, MicroSkillMap, QuestionSkillMap};

/// Intermediate TOML structure for content bank files.
#[derive(Debug, Deserialize)]
struct TomlContentFile {
    bank: TomlBankHeader,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
    #[serde(default)]
    skills: Vec<MicroSkill>,
    #[serde(default)]
    nodes: Vec<AtlasNode>,
    #[serde(default)]
    chapter_weights: ChapterWeights,
}

#[derive(Debug, Deserialize)]
struct TomlBankHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    id: String,
    chapter: ChapterKey,
    #[serde(default)]
    question_type: QuestionType,
    #[serde(default)]
    irt: Option<IrtParams>,
    #[serde(default)]
    difficulty: Option<f64>,
    #[serde(default)]
    skills: Vec<String>,
}

/// A loaded content bank: everything the engine reads but never writes.
#[derive(Debug, Clone)]
pub struct ContentBank {
    pub id: String,
    pub name: String,
    pub description: String,
    pub questions: Vec<QuestionItem>,
    pub skills: MicroSkillMap,
    pub question_skills: QuestionSkillMap,
    pub nodes: Vec<AtlasNode>,
    pub chapter_weights: ChapterWeights,
}

impl ContentBank {
    /// Questions keyed by id. Later duplicates win.
    pub fn question_index(&self) -> HashMap<String, QuestionItem> {
        self.questions
            .iter()
            .map(|q| (q.id.clone(), q.clone()))
            .collect()
    }

    pub fn questions_in(&self, chapter: &ChapterKey) -> Vec<QuestionItem> {
        self.questions
            .iter()
            .filter(|q| &q.chapter == chapter)
            .cloned()
            .collect()
    }

    pub fn node(&self, id: &str) -> Option<&AtlasNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Parse a single TOML file into a `ContentBank`.
pub fn parse_content(path: &Path) -> Result<ContentBank> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read content file: {}", path.display()))?;

    parse_content_str(&content, path)
}

/// Parse a TOML string into a `ContentBank` (useful for testing).
pub fn parse_content_str(content: &str, source_path: &Path) -> Result<ContentBank> {
    let parsed: TomlContentFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let mut question_skills = QuestionSkillMap::new();
    let questions = parsed
        .questions
        .into_iter()
        .map(|q| {
            if !q.skills.is_empty() {
                question_skills
                    .entry(q.id.clone())
                    .or_default()
                    .extend(q.skills);
            }
            QuestionItem {
                id: q.id,
                chapter: q.chapter,
                question_type: q.question_type,
                irt: q.irt.unwrap_or_default(),
                difficulty: q.difficulty,
            }
        })
        .collect();

    let skills = parsed
        .skills
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();

    Ok(ContentBank {
        id: parsed.bank.id,
        name: parsed.bank.name,
        description: parsed.bank.description,
        questions,
        skills,
        question_skills,
        nodes: parsed.nodes,
        chapter_weights: parsed.chapter_weights,
    })
}

/// Recursively load all `.toml` content files from a directory.
pub fn load_content_directory(dir: &Path) -> Result<Vec<ContentBank>> {
    let mut banks = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            banks.extend(load_content_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_content(&path) {
                Ok(bank) => banks.push(bank),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(banks)
}

/// Load a file or a directory of content banks.
pub fn load_content(path: &Path) -> Result<Vec<ContentBank>> {
    if path.is_dir() {
        load_content_directory(path)
    } else {
        Ok(vec![parse_content(path)?])
    }
}

/// Combine banks into one. Later banks win on duplicate skills and chapter
/// weights; questions and nodes are appended.
pub fn merge_banks(banks: Vec<ContentBank>) -> Result<ContentBank> {
    let mut banks = banks.into_iter();
    let Some(mut merged) = banks.next() else {
        anyhow::bail!("no content banks found");
    };

    let mut weights: BTreeMap<ChapterKey, f64> = merged.chapter_weights.clone().into();
    for bank in banks {
        merged.id = format!("{}+{}", merged.id, bank.id);
        merged.name = format!("{}, {}", merged.name, bank.name);
        merged.questions.extend(bank.questions);
        merged.skills.extend(bank.skills);
        for (question, skills) in bank.question_skills {
            merged.question_skills.entry(question).or_default().extend(skills);
        }
        merged.nodes.extend(bank.nodes);
        weights.extend(BTreeMap::from(bank.chapter_weights));
    }
    merged.chapter_weights = ChapterWeights::new(weights)?;

    Ok(merged)
}

/// Load a JSON array of responses.
pub fn load_responses(path: &Path) -> Result<Vec<ResponseRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read responses from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse responses JSON: {}", path.display()))
}

/// Load a JSON object of chapter key → ability.
pub fn load_abilities(path: &Path) -> Result<AbilityMap> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read abilities from {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse abilities JSON: {}", path.display()))
}

/// A warning from content validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question, skill or node id (if applicable).
    pub item_id: Option<String>,
    /// Warning message.
    pub message: String,
}

impl ValidationWarning {
    fn new(item_id: &str, message: impl Into<String>) -> Self {
        Self {
            item_id: Some(item_id.to_string()),
            message: message.into(),
        }
    }
}

/// Validate a content bank for common authoring mistakes.
pub fn validate_content(bank: &ContentBank) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    // Duplicate question IDs
    let mut seen_ids = HashSet::new();
    for q in &bank.questions {
        if !seen_ids.insert(&q.id) {
            warnings.push(ValidationWarning::new(&q.id, format!("duplicate question ID: {}", q.id)));
        }
    }

    // Missing IRT parameters fall back to defaults
    for q in &bank.questions {
        if q.irt.b.is_none() && q.difficulty.is_none() {
            warnings.push(ValidationWarning::new(
                &q.id,
                "no difficulty (irt.b or difficulty); defaulting to 0.0",
            ));
        }
        if let Some(c) = q.irt.c {
            if !(0.0..1.0).contains(&c) {
                warnings.push(ValidationWarning::new(
                    &q.id,
                    format!("guessing parameter c = {c} outside [0, 1); it will be clamped"),
                ));
            }
        }
        if let Some(a) = q.irt.a {
            if a <= 0.0 {
                warnings.push(ValidationWarning::new(
                    &q.id,
                    format!("discrimination a = {a} is not positive; defaulting to 1.0"),
                ));
            }
        }
    }

    // Question → skill references
    for (qid, skills) in &bank.question_skills {
        let chapter = bank.questions.iter().find(|q| &q.id == qid).map(|q| &q.chapter);
        for skill in skills {
            match bank.skills.get(skill) {
                None => warnings.push(ValidationWarning::new(
                    qid,
                    format!("references unknown micro-skill: {skill}"),
                )),
                Some(s) if Some(&s.chapter) != chapter => warnings.push(ValidationWarning::new(
                    qid,
                    format!("micro-skill {skill} belongs to chapter {}", s.chapter),
                )),
                Some(_) => {}
            }
        }
    }

    // Skills that can never produce a signature match
    for skill in bank.skills.values() {
        if skill.diagnostic_focus.iter().all(|k| k.trim().is_empty()) {
            warnings.push(ValidationWarning::new(
                &skill.id,
                "no diagnostic_focus keywords; signature component will be 0",
            ));
        }
    }

    // Nodes
    let mut seen_nodes = HashSet::new();
    for node in &bank.nodes {
        if !seen_nodes.insert(&node.id) {
            warnings.push(ValidationWarning::new(&node.id, format!("duplicate node ID: {}", node.id)));
        }
        if node.micro_skills.is_empty() {
            warnings.push(ValidationWarning::new(&node.id, "node covers no micro-skills"));
        }
        let unknown: BTreeSet<_> = node
            .micro_skills
            .iter()
            .filter(|s| !bank.skills.contains_key(*s))
            .collect();
        for skill in unknown {
            warnings.push(ValidationWarning::new(
                &node.id,
                format!("references unknown micro-skill: {skill}"),
            ));
        }
        let tagged = bank
            .question_skills
            .values()
            .any(|skills| !skills.is_disjoint(&node.micro_skills));
        if !node.micro_skills.is_empty() && !tagged {
            warnings.push(ValidationWarning::new(
                &node.id,
                "no question is tagged with any of this node's skills",
            ));
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[bank]
id = "physics-mechanics"
name = "Physics: Mechanics"
description = "Kinematics and laws of motion"

[[questions]]
id = "kin-001"
chapter = "physics_kinematics"
skills = ["kin_sign"]
[questions.irt]
a = 1.2
b = 0.4
c = 0.25

[[questions]]
id = "kin-002"
chapter = "physics_kinematics"
question_type = "numerical"
difficulty = 1.1
skills = ["kin_sign", "kin_graphs"]

[[skills]]
id = "kin_sign"
chapter = "physics_kinematics"
diagnostic_focus = ["sign convention", "direction"]

[[skills]]
id = "kin_graphs"
chapter = "physics_kinematics"
diagnostic_focus = ["slope", "area under"]

[[nodes]]
id = "kinematics-sign-errors"
name = "Sign errors in kinematics"
micro_skills = ["kin_sign", "kin_graphs"]
severity = "high"
trigger_threshold = 0.6
stability_threshold = 0.4
min_signal_count = 2

[nodes.weights]
skill_deficit = 0.6
signature = 0.25
recurrence = 0.15

[chapter_weights]
physics_kinematics = 1.0
physics_laws_of_motion = 0.8
"#;

    #[test]
    fn parse_valid_toml() {
        let bank = parse_content_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(bank.id, "physics-mechanics");
        assert_eq!(bank.questions.len(), 2);
        assert_eq!(bank.questions[1].question_type, QuestionType::Numerical);
        assert_eq!(bank.questions[1].difficulty, Some(1.1));
        assert_eq!(bank.question_skills["kin-002"].len(), 2);
        assert_eq!(bank.skills.len(), 2);
        assert_eq!(bank.nodes.len(), 1);
        assert_eq!(bank.chapter_weights.len(), 2);
        assert!(validate_content(&bank).is_empty());
    }

    #[test]
    fn parse_rejects_invalid_chapter_key() {
        let toml = r#"
[bank]
id = "bad"
name = "Bad"

[[questions]]
id = "q1"
chapter = "kinematics"
"#;
        let err = parse_content_str(toml, &PathBuf::from("bad.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("invalid chapter key"));
    }

    #[test]
    fn parse_rejects_weights_not_summing_to_one() {
        let toml = r#"
[bank]
id = "bad"
name = "Bad"

[[nodes]]
id = "n1"
micro_skills = ["s1"]

[nodes.weights]
skill_deficit = 0.5
signature = 0.5
recurrence = 0.5
"#;
        let err = parse_content_str(toml, &PathBuf::from("bad.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("sum to 1.0"));
    }

    #[test]
    fn validate_flags_unknown_skills_and_duplicates() {
        let toml = r#"
[bank]
id = "dupes"
name = "Dupes"

[[questions]]
id = "q1"
chapter = "chemistry_bonding"
skills = ["ghost"]

[[questions]]
id = "q1"
chapter = "chemistry_bonding"
difficulty = 0.2

[[nodes]]
id = "n1"
micro_skills = ["ghost"]
"#;
        let bank = parse_content_str(toml, &PathBuf::from("test.toml")).unwrap();
        let warnings = validate_content(&bank);
        assert!(warnings.iter().any(|w| w.message.contains("duplicate question ID")));
        assert!(warnings.iter().any(|w| w.message.contains("unknown micro-skill: ghost")));
        assert!(warnings.iter().any(|w| w.message.contains("defaulting to 0.0")));
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        assert!(parse_content_str(bad, &PathBuf::from("bad.toml")).is_err());
    }

    #[test]
    fn load_directory_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "nope = [").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let banks = load_content_directory(dir.path()).unwrap();
        assert_eq!(banks.len(), 1);
        assert_eq!(banks[0].id, "physics-mechanics");
    }

    #[test]
    fn merge_combines_banks() {
        let first = parse_content_str(VALID_TOML, &PathBuf::from("a.toml")).unwrap();
        let second = parse_content_str(
            r#"
[bank]
id = "chemistry"
name = "Chemistry"

[[questions]]
id = "bond-001"
chapter = "chemistry_bonding"
skills = ["bond_polarity"]

[chapter_weights]
physics_kinematics = 0.5
chemistry_bonding = 0.9
"#,
            &PathBuf::from("b.toml"),
        )
        .unwrap();

        let merged = merge_banks(vec![first, second]).unwrap();
        assert_eq!(merged.id, "physics-mechanics+chemistry");
        assert_eq!(merged.questions.len(), 3);
        assert_eq!(merged.question_skills.len(), 3);
        let kinematics = ChapterKey::new("physics_kinematics").unwrap();
        assert_eq!(merged.chapter_weights.weight_of(&kinematics), 0.5);
        assert_eq!(merged.chapter_weights.len(), 3);

        assert!(merge_banks(Vec::new()).is_err());
    }

    #[test]
    fn load_json_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let responses = dir.path().join("responses.json");
        std::fs::write(
            &responses,
            r#"[{"question_id":"kin-001","chapter":"physics_kinematics","is_correct":true,
                "student_answer":"A","answered_at":"2026-03-01T10:00:00Z"}]"#,
        )
        .unwrap();
        let abilities = dir.path().join("abilities.json");
        std::fs::write(
            &abilities,
            r#"{"physics_kinematics":{"theta":0.4,"standard_error":0.5,"attempts":10,"accuracy":70}}"#,
        )
        .unwrap();

        let loaded = load_responses(&responses).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].is_correct);

        let map = load_abilities(&abilities).unwrap();
        let key = ChapterKey::new("physics_kinematics").unwrap();
        assert_eq!(map[&key].attempts, 10);
    }
}
