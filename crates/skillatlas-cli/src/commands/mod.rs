pub mod diagnose;
pub mod estimate;
pub mod init;
pub mod retrieval;
pub mod select;
pub mod validate;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use skillatlas_core::parser::{self, ContentBank};
use skillatlas_core::store::InMemoryStore;

/// Load a content file or directory as a single bank.
pub fn load_bank(path: &Path) -> Result<Arc<ContentBank>> {
    let banks = parser::load_content(path)?;
    let bank = parser::merge_banks(banks)
        .with_context(|| format!("no usable content in {}", path.display()))?;
    tracing::info!(
        bank = %bank.id,
        questions = bank.questions.len(),
        nodes = bank.nodes.len(),
        "content loaded"
    );
    Ok(Arc::new(bank))
}

/// A store holding the learner's abilities from an optional JSON file.
pub async fn seeded_store(learner: &str, abilities: Option<&Path>) -> Result<Arc<InMemoryStore>> {
    let store = InMemoryStore::new();
    let store = match abilities {
        Some(path) => {
            let map = parser::load_abilities(path)?;
            store.with_abilities(learner, &map).await
        }
        None => store,
    };
    Ok(Arc::new(store))
}

/// Parse `node=value` pairs.
pub fn parse_recurrence(pairs: &[String]) -> Result<BTreeMap<String, f64>> {
    pairs
        .iter()
        .map(|pair| {
            let (node, value) = pair
                .split_once('=')
                .with_context(|| format!("expected node=value, got '{pair}'"))?;
            let value: f64 = value
                .trim()
                .parse()
                .with_context(|| format!("recurrence for {node} is not a number: {value}"))?;
            Ok((node.trim().to_string(), value))
        })
        .collect()
}
