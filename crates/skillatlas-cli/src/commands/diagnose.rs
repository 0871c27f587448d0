//! The `skillatlas diagnose` command.
//!
//! Scores weak-spot nodes against a response batch without persisting
//! anything, and shows why each node scored the way it did.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Table};

use skillatlas_core::parser::load_responses;
use skillatlas_core::weakspot::{evaluate_node, NodeEvaluation, NodeSnapshot};

#[derive(Debug, Args)]
pub struct DiagnoseArgs {
    /// Content bank .toml file or directory
    #[arg(long)]
    pub content: PathBuf,

    /// JSON list of responses to score
    #[arg(long)]
    pub responses: PathBuf,

    /// Only this node
    #[arg(long)]
    pub node: Option<String>,

    /// Recurrence per node as node=value (repeatable)
    #[arg(long)]
    pub recurrence: Vec<String>,

    /// JSON object of node id to {score, state} before this batch
    #[arg(long)]
    pub snapshots: Option<PathBuf>,

    /// Output format: text, json
    #[arg(long, default_value = "text")]
    pub format: String,
}

pub fn execute(args: DiagnoseArgs) -> Result<()> {
    let bank = super::load_bank(&args.content)?;
    let responses = load_responses(&args.responses)?;
    let recurrence = super::parse_recurrence(&args.recurrence)?;
    let snapshots: BTreeMap<String, NodeSnapshot> = match &args.snapshots {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read snapshots from {}", path.display()))?;
            serde_json::from_str(&content).context("failed to parse snapshots JSON")?
        }
        None => BTreeMap::new(),
    };

    if let Some(id) = &args.node {
        if bank.node(id).is_none() {
            anyhow::bail!("unknown node: {id}");
        }
    }

    let evaluations: Vec<NodeEvaluation> = bank
        .nodes
        .iter()
        .filter(|node| args.node.as_ref().map_or(true, |id| &node.id == id))
        .map(|node| {
            evaluate_node(
                node,
                snapshots.get(&node.id).copied().unwrap_or_default(),
                &responses,
                &bank.question_skills,
                &bank.skills,
                recurrence.get(&node.id).copied().unwrap_or(0.0),
            )
        })
        .collect();

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&evaluations)?),
        _ => print_evaluations(&evaluations),
    }

    Ok(())
}

fn print_evaluations(evaluations: &[NodeEvaluation]) {
    let mut table = Table::new();
    table.set_header(vec![
        "Node",
        "Severity",
        "Deficit",
        "Signature",
        "Recurrence",
        "Score",
        "Signals",
        "Triggered",
        "Transition",
    ]);
    for e in evaluations {
        table.add_row(vec![
            Cell::new(&e.node_id),
            Cell::new(e.severity),
            Cell::new(format!("{:.3}", e.components.skill_deficit)),
            Cell::new(format!("{:.3}", e.components.signature)),
            Cell::new(format!("{:.3}", e.components.recurrence)),
            Cell::new(format!("{:.3}", e.score)),
            Cell::new(e.signals),
            Cell::new(if e.triggered { "yes" } else { "no" }),
            Cell::new(format!("{} -> {}", e.previous.state, e.state)),
        ]);
    }
    println!("{table}");

    for e in evaluations.iter().filter(|e| !e.per_skill.is_empty()) {
        println!("\n{}:", e.node_id);
        for skill in &e.per_skill {
            println!(
                "  {} wrong {}/{} (deficit {:.3})",
                skill.skill,
                skill.wrong,
                skill.wrong + skill.right,
                skill.deficit
            );
        }
        if e.signature_matches > 0 {
            println!(
                "  {} of {} wrong answers matched a misconception keyword",
                e.signature_matches, e.signals
            );
        }
    }
}
