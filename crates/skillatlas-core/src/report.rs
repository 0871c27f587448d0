//! Session report types with JSON persistence and a markdown summary.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::ChapterKey;
use crate::theta::{AbilityRollup, ChapterThetaUpdate};
use crate::weakspot::NodeEvaluation;

/// Everything one processed practice session changed for a learner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Unique report identifier.
    pub id: Uuid,
    pub learner_id: String,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Responses in the batch.
    pub responses: usize,
    /// Responses dropped because their question is not in the bank.
    pub skipped_responses: usize,
    /// Per-chapter ability updates, in chapter order.
    pub chapter_updates: BTreeMap<ChapterKey, ChapterThetaUpdate>,
    /// Subject and overall ability after the session.
    pub rollup: AbilityRollup,
    /// Every node evaluated against the batch.
    pub weak_spots: Vec<NodeEvaluation>,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl SessionReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: SessionReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Nodes that fired in this session, highest score first.
    pub fn triggered(&self) -> Vec<&NodeEvaluation> {
        let mut fired: Vec<_> = self.weak_spots.iter().filter(|e| e.triggered).collect();
        fired.sort_by(|a, b| b.score.total_cmp(&a.score));
        fired
    }

    /// Render a markdown summary.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Session:** {} responses ({} skipped), {} chapters updated, {} weak spots triggered\n\n",
            self.responses,
            self.skipped_responses,
            self.chapter_updates.len(),
            self.triggered().len()
        ));

        if !self.chapter_updates.is_empty() {
            md.push_str("### Chapters\n\n");
            md.push_str("| Chapter | Theta | Δθ | SE | Percentile | Correct |\n");
            md.push_str("|---------|-------|----|----|------------|---------|\n");
            for (chapter, update) in &self.chapter_updates {
                md.push_str(&format!(
                    "| {} | {:.3} | {:+.3} | {:.3} | {:.1} | {}/{} |\n",
                    chapter,
                    update.ability.theta,
                    update.theta_delta,
                    update.ability.standard_error,
                    update.percentile,
                    update.correct,
                    update.responses
                ));
            }
            md.push('\n');
        }

        md.push_str("### Subjects\n\n");
        md.push_str("| Subject | Theta | SE | Accuracy |\n");
        md.push_str("|---------|-------|----|----------|\n");
        for (subject, ability) in &self.rollup.subjects {
            md.push_str(&format!(
                "| {} | {:.3} | {:.3} | {:.1}% |\n",
                subject, ability.theta, ability.standard_error, ability.accuracy
            ));
        }
        md.push_str(&format!(
            "| **overall** | {:.3} | {:.3} | {:.1}% |\n\n",
            self.rollup.overall.theta,
            self.rollup.overall.standard_error,
            self.rollup.overall.accuracy
        ));

        let fired = self.triggered();
        if !fired.is_empty() {
            md.push_str("### Weak spots\n\n");
            md.push_str("| Node | Severity | Score | Deficit | Signature | Recurrence | State |\n");
            md.push_str("|------|----------|-------|---------|-----------|------------|-------|\n");
            for e in fired {
                md.push_str(&format!(
                    "| {} | {} | {:.3} | {:.3} | {:.3} | {:.3} | {} → {} |\n",
                    e.node_id,
                    e.severity,
                    e.score,
                    e.components.skill_deficit,
                    e.components.signature,
                    e.components.recurrence,
                    e.previous.state,
                    e.state
                ));
            }
            md.push('\n');
        }

        md
    }
}
