//! The `skillatlas estimate` command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Table};

use skillatlas_core::config::load_config_from;
use skillatlas_core::engine::{AssessmentEngine, SessionInput};
use skillatlas_core::parser::load_responses;
use skillatlas_core::report::SessionReport;

#[derive(Debug, Args)]
pub struct EstimateArgs {
    /// Content bank .toml file or directory
    #[arg(long)]
    pub content: PathBuf,

    /// JSON list of responses to apply
    #[arg(long)]
    pub responses: PathBuf,

    /// Learner id
    #[arg(long, default_value = "learner")]
    pub learner: String,

    /// JSON ability map before the session
    #[arg(long)]
    pub abilities: Option<PathBuf>,

    /// Recurrence per node as node=value (repeatable)
    #[arg(long)]
    pub recurrence: Vec<String>,

    /// Write the session report JSON here
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Output format: text, json, markdown
    #[arg(long, default_value = "text")]
    pub format: String,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub async fn execute(args: EstimateArgs) -> Result<()> {
    let config = load_config_from(args.config.as_deref())?;
    let bank = super::load_bank(&args.content)?;
    let store = super::seeded_store(&args.learner, args.abilities.as_deref()).await?;

    let input = SessionInput {
        learner_id: args.learner.clone(),
        responses: load_responses(&args.responses)?,
        recurrence: super::parse_recurrence(&args.recurrence)?,
    };

    let engine = AssessmentEngine::with_store(bank, store, config);
    let report = engine.record_session(&input).await?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "markdown" | "md" => println!("{}", report.to_markdown()),
        _ => print_summary(&report),
    }

    if let Some(path) = &args.output {
        report.save_json(path)?;
        eprintln!("Report saved to: {}", path.display());
    }

    Ok(())
}

fn print_summary(report: &SessionReport) {
    println!(
        "Learner {}: {} responses, {} skipped",
        report.learner_id, report.responses, report.skipped_responses
    );

    let mut chapters = Table::new();
    chapters.set_header(vec!["Chapter", "Theta", "Δθ", "SE", "Percentile", "Attempts", "Accuracy"]);
    for (chapter, update) in &report.chapter_updates {
        chapters.add_row(vec![
            Cell::new(chapter),
            Cell::new(format!("{:.3}", update.ability.theta)),
            Cell::new(format!("{:+.3}", update.theta_delta)),
            Cell::new(format!("{:.3}", update.ability.standard_error)),
            Cell::new(format!("{:.1}", update.percentile)),
            Cell::new(update.ability.attempts),
            Cell::new(format!("{:.0}%", update.ability.accuracy)),
        ]);
    }
    println!("\n{chapters}");

    let mut subjects = Table::new();
    subjects.set_header(vec!["Subject", "Theta", "SE", "Percentile", "Accuracy"]);
    for (subject, ability) in &report.rollup.subjects {
        subjects.add_row(vec![
            Cell::new(subject),
            Cell::new(format!("{:.3}", ability.theta)),
            Cell::new(format!("{:.3}", ability.standard_error)),
            Cell::new(format!("{:.1}", ability.percentile)),
            Cell::new(format!("{:.1}%", ability.accuracy)),
        ]);
    }
    let overall = &report.rollup.overall;
    subjects.add_row(vec![
        Cell::new("overall"),
        Cell::new(format!("{:.3}", overall.theta)),
        Cell::new(format!("{:.3}", overall.standard_error)),
        Cell::new(format!("{:.1}", overall.percentile)),
        Cell::new(format!("{:.1}%", overall.accuracy)),
    ]);
    println!("\n{subjects}");

    if report.weak_spots.is_empty() {
        println!("\nNo weak-spot nodes touched by this session.");
        return;
    }

    let mut nodes = Table::new();
    nodes.set_header(vec!["Node", "Score", "Signals", "Triggered", "State"]);
    for evaluation in &report.weak_spots {
        nodes.add_row(vec![
            Cell::new(&evaluation.node_id),
            Cell::new(format!("{:.3}", evaluation.score)),
            Cell::new(evaluation.signals),
            Cell::new(if evaluation.triggered { "yes" } else { "no" }),
            Cell::new(format!("{} -> {}", evaluation.previous.state, evaluation.state)),
        ]);
    }
    println!("\n{nodes}");
}
