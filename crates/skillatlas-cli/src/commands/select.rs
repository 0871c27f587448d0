//! The `skillatlas select` command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Table};

use skillatlas_core::config::load_config_from;
use skillatlas_core::engine::{AssessmentEngine, SessionPlan};
use skillatlas_core::irt::effective_difficulty;
use skillatlas_core::model::ChapterKey;
use skillatlas_core::parser::load_responses;

#[derive(Debug, Args)]
pub struct SelectArgs {
    /// Content bank .toml file or directory
    #[arg(long)]
    pub content: PathBuf,

    /// Chapter key, e.g. physics_kinematics
    #[arg(long)]
    pub chapter: ChapterKey,

    /// Learner id
    #[arg(long, default_value = "learner")]
    pub learner: String,

    /// JSON ability map for the learner
    #[arg(long)]
    pub abilities: Option<PathBuf>,

    /// JSON list of the learner's past responses
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Questions in the session (overrides config)
    #[arg(long)]
    pub count: Option<usize>,

    /// Output format: text, json
    #[arg(long, default_value = "text")]
    pub format: String,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub async fn execute(args: SelectArgs) -> Result<()> {
    let mut config = load_config_from(args.config.as_deref())?;
    if let Some(count) = args.count {
        config.session_size = count;
        config.validate()?;
    }

    let bank = super::load_bank(&args.content)?;
    let store = super::seeded_store(&args.learner, args.abilities.as_deref()).await?;
    let history = match &args.history {
        Some(path) => load_responses(path)?,
        None => Vec::new(),
    };

    let engine = AssessmentEngine::with_store(bank, store, config);
    let plan = engine.plan_session(&args.learner, &args.chapter, &history).await?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&plan.questions)?),
        _ => print_plan(&plan),
    }

    Ok(())
}

fn print_plan(plan: &SessionPlan) {
    println!(
        "Chapter {} | theta {:.3} | {} candidates, tolerance ±{:.1}{}",
        plan.chapter,
        plan.theta,
        plan.candidates,
        plan.tolerance,
        if plan.widened {
            " (no questions near ability, using whole chapter)"
        } else {
            ""
        }
    );

    if plan.questions.is_empty() {
        println!("No questions available for this chapter.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Question", "Band", "Difficulty", "History", "Information"]);
    for (i, selected) in plan.questions.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&selected.question.id),
            Cell::new(selected.band),
            Cell::new(format!("{:.2}", effective_difficulty(&selected.question))),
            Cell::new(format!("{:?}", selected.status)),
            Cell::new(
                selected
                    .information
                    .map(|info| format!("{info:.3}"))
                    .unwrap_or_default(),
            ),
        ]);
    }

    println!("{table}");
}
