//! The `skillatlas validate` command.

use std::path::PathBuf;

use anyhow::Result;

pub fn execute(content_path: PathBuf) -> Result<()> {
    let banks = skillatlas_core::parser::load_content(&content_path)?;
    if banks.is_empty() {
        anyhow::bail!("no content banks found in {}", content_path.display());
    }

    let mut total_warnings = 0;

    for bank in &banks {
        println!(
            "Content bank: {} ({} questions, {} skills, {} nodes)",
            bank.name,
            bank.questions.len(),
            bank.skills.len(),
            bank.nodes.len()
        );

        let warnings = skillatlas_core::parser::validate_content(bank);
        for w in &warnings {
            let prefix = w
                .item_id
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All content banks valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
