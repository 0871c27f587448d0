//! The `skillatlas retrieval` command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use skillatlas_core::config::load_config_from;
use skillatlas_core::engine::AssessmentEngine;
use skillatlas_core::store::InMemoryStore;
use skillatlas_core::weakspot::{NodeSnapshot, NodeState};

#[derive(Debug, Args)]
pub struct RetrievalArgs {
    /// Content bank .toml file or directory
    #[arg(long)]
    pub content: PathBuf,

    /// Node the quiz followed up on
    #[arg(long)]
    pub node: String,

    /// Node score before the quiz
    #[arg(long)]
    pub score: f64,

    /// Correct answers in the quiz
    #[arg(long)]
    pub correct: u32,

    /// Questions in the quiz
    #[arg(long, default_value = "3")]
    pub total: u32,

    /// Output format: text, json
    #[arg(long, default_value = "text")]
    pub format: String,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub async fn execute(args: RetrievalArgs) -> Result<()> {
    let config = load_config_from(args.config.as_deref())?;
    let bank = super::load_bank(&args.content)?;

    // Retrieval only follows a node that has fired
    let learner = "learner";
    let previous = NodeSnapshot {
        score: args.score,
        state: NodeState::Active,
    };
    let store = InMemoryStore::new().with_node(learner, &args.node, previous).await;

    let engine = AssessmentEngine::with_store(bank, std::sync::Arc::new(store), config);
    let result = engine
        .record_retrieval(learner, &args.node, args.correct, args.total)
        .await?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => {
            println!(
                "{}: {}/{} correct, {}",
                args.node,
                result.correct,
                result.total,
                if result.passed { "passed" } else { "not passed" }
            );
            println!(
                "  score {:.2} -> {:.2}, state {} -> {}",
                result.previous.score, result.next.score, result.previous.state, result.next.state
            );
        }
    }

    Ok(())
}
