//! The `skillatlas init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    // Create skillatlas.toml
    if std::path::Path::new("skillatlas.toml").exists() {
        println!("skillatlas.toml already exists, skipping.");
    } else {
        std::fs::write("skillatlas.toml", SAMPLE_CONFIG)?;
        println!("Created skillatlas.toml");
    }

    // Create example content bank
    std::fs::create_dir_all("content")?;
    let example_path = std::path::Path::new("content/example.toml");
    if example_path.exists() {
        println!("content/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_CONTENT)?;
        println!("Created content/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Run: skillatlas validate --content content/example.toml");
    println!("  2. Run: skillatlas select --content content --chapter physics_kinematics");
    println!("  3. Run: skillatlas estimate --content content --responses responses.json");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# skillatlas configuration

learning_rate = 0.3
session_size = 15
max_conflict_retries = 5
retry_delay_ms = 10

[retrieval]
pass_mark = 2
decay_factor = 0.5
"#;

const EXAMPLE_CONTENT: &str = r#"[bank]
id = "example"
name = "Example Content Bank"
description = "A small kinematics bank to get started"

[[questions]]
id = "kin-001"
chapter = "physics_kinematics"
skills = ["kin_sign_convention"]
[questions.irt]
a = 1.0
b = 0.2

[[questions]]
id = "kin-002"
chapter = "physics_kinematics"
question_type = "numerical"
difficulty = 1.0
skills = ["kin_sign_convention"]

[[skills]]
id = "kin_sign_convention"
chapter = "physics_kinematics"
diagnostic_focus = ["sign convention", "direction"]

[[nodes]]
id = "kinematics-sign-errors"
name = "Sign errors in one-dimensional motion"
micro_skills = ["kin_sign_convention"]
severity = "high"

[chapter_weights]
physics_kinematics = 1.0
"#;
