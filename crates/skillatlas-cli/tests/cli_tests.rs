//! CLI integration tests using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CONTENT: &str = "../../content";
const RESPONSES: &str = "tests/fixtures/responses.json";
const ABILITIES: &str = "tests/fixtures/abilities.json";

fn skillatlas() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("skillatlas").unwrap();
    cmd.env_remove("SKILLATLAS_LEARNING_RATE")
        .env_remove("SKILLATLAS_SESSION_SIZE");
    cmd
}

#[test]
fn validate_physics_bank() {
    skillatlas()
        .arg("validate")
        .arg("--content")
        .arg("../../content/physics.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("9 questions"))
        .stdout(predicate::str::contains("All content banks valid"));
}

#[test]
fn validate_directory() {
    skillatlas()
        .arg("validate")
        .arg("--content")
        .arg(CONTENT)
        .assert()
        .success()
        .stdout(predicate::str::contains("Physics: Mechanics"))
        .stdout(predicate::str::contains("Chemistry: Bonding and Equilibrium"))
        .stdout(predicate::str::contains("Mathematics: Calculus"));
}

#[test]
fn validate_reports_warnings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(
        &path,
        r#"
[bank]
id = "broken"
name = "Broken"

[[questions]]
id = "q1"
chapter = "physics_optics"
skills = ["ghost"]
"#,
    )
    .unwrap();

    skillatlas()
        .arg("validate")
        .arg("--content")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("[q1] WARNING"))
        .stdout(predicate::str::contains("unknown micro-skill: ghost"));
}

#[test]
fn validate_nonexistent_file() {
    skillatlas()
        .arg("validate")
        .arg("--content")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn select_prints_session() {
    skillatlas()
        .arg("select")
        .arg("--content")
        .arg(CONTENT)
        .arg("--chapter")
        .arg("physics_kinematics")
        .arg("--abilities")
        .arg(ABILITIES)
        .assert()
        .success()
        .stdout(predicate::str::contains("theta 0.400"))
        .stdout(predicate::str::contains("kin-001"));
}

#[test]
fn select_json_respects_count() {
    let output = skillatlas()
        .arg("select")
        .arg("--content")
        .arg(CONTENT)
        .arg("--chapter")
        .arg("physics_kinematics")
        .arg("--count")
        .arg("3")
        .arg("--format")
        .arg("json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let selected: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(selected.as_array().unwrap().len(), 3);
}

#[test]
fn select_reads_config_from_working_directory() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("skillatlas.toml"), "session_size = 2\n").unwrap();
    let content = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../content");

    let output = skillatlas()
        .current_dir(dir.path())
        .arg("select")
        .arg("--content")
        .arg(&content)
        .arg("--chapter")
        .arg("physics_kinematics")
        .arg("--format")
        .arg("json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let selected: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(selected.as_array().unwrap().len(), 2);
}

#[test]
fn select_rejects_bad_chapter_key() {
    skillatlas()
        .arg("select")
        .arg("--content")
        .arg(CONTENT)
        .arg("--chapter")
        .arg("biology_cells")
        .assert()
        .failure();
}

#[test]
fn estimate_updates_abilities_and_flags_weak_spots() {
    skillatlas()
        .arg("estimate")
        .arg("--content")
        .arg(CONTENT)
        .arg("--responses")
        .arg(RESPONSES)
        .arg("--abilities")
        .arg(ABILITIES)
        .assert()
        .success()
        .stdout(predicate::str::contains("6 responses, 1 skipped"))
        .stdout(predicate::str::contains("physics_kinematics"))
        .stdout(predicate::str::contains("kinematics-sign-errors"))
        .stdout(predicate::str::contains("inactive -> active"));
}

#[test]
fn estimate_writes_report() {
    let dir = TempDir::new().unwrap();
    let report = dir.path().join("report.json");

    skillatlas()
        .arg("estimate")
        .arg("--content")
        .arg(CONTENT)
        .arg("--responses")
        .arg(RESPONSES)
        .arg("--abilities")
        .arg(ABILITIES)
        .arg("--recurrence")
        .arg("kinematics-sign-errors=0.5")
        .arg("--output")
        .arg(&report)
        .assert()
        .success();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    let kinematics = &json["chapter_updates"]["physics_kinematics"]["ability"];
    assert_eq!(kinematics["attempts"], 13);
    assert_eq!(kinematics["accuracy"], 62.0);
    assert_eq!(json["rollup"]["subjects"].as_object().unwrap().len(), 3);
}

#[test]
fn estimate_markdown() {
    skillatlas()
        .arg("estimate")
        .arg("--content")
        .arg(CONTENT)
        .arg("--responses")
        .arg(RESPONSES)
        .arg("--format")
        .arg("markdown")
        .assert()
        .success()
        .stdout(predicate::str::contains("### Weak spots"))
        .stdout(predicate::str::contains("free-body-diagrams"));
}

#[test]
fn diagnose_single_node() {
    skillatlas()
        .arg("diagnose")
        .arg("--content")
        .arg(CONTENT)
        .arg("--responses")
        .arg(RESPONSES)
        .arg("--node")
        .arg("kinematics-sign-errors")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.700"))
        .stdout(predicate::str::contains("kin_equations wrong 1/1"))
        .stdout(predicate::str::contains("2 of 2 wrong answers matched"));
}

#[test]
fn diagnose_unknown_node() {
    skillatlas()
        .arg("diagnose")
        .arg("--content")
        .arg(CONTENT)
        .arg("--responses")
        .arg(RESPONSES)
        .arg("--node")
        .arg("no-such-node")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown node"));
}

#[test]
fn retrieval_pass_stabilizes() {
    skillatlas()
        .arg("retrieval")
        .arg("--content")
        .arg(CONTENT)
        .arg("--node")
        .arg("kinematics-sign-errors")
        .arg("--score")
        .arg("0.8")
        .arg("--correct")
        .arg("2")
        .assert()
        .success()
        .stdout(predicate::str::contains("passed"))
        .stdout(predicate::str::contains("score 0.80 -> 0.40, state active -> stable"));
}

#[test]
fn retrieval_fail_stays_active() {
    skillatlas()
        .arg("retrieval")
        .arg("--content")
        .arg(CONTENT)
        .arg("--node")
        .arg("kinematics-sign-errors")
        .arg("--score")
        .arg("0.7")
        .arg("--correct")
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("not passed"))
        .stdout(predicate::str::contains("state active -> active"));
}

#[test]
fn retrieval_rejects_impossible_score() {
    skillatlas()
        .arg("retrieval")
        .arg("--content")
        .arg(CONTENT)
        .arg("--node")
        .arg("kinematics-sign-errors")
        .arg("--score")
        .arg("0.7")
        .arg("--correct")
        .arg("4")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot exceed total"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    skillatlas()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created skillatlas.toml"))
        .stdout(predicate::str::contains("Created content/example.toml"));

    assert!(dir.path().join("skillatlas.toml").exists());
    assert!(dir.path().join("content/example.toml").exists());

    // The generated bank passes validation
    skillatlas()
        .current_dir(dir.path())
        .arg("validate")
        .arg("--content")
        .arg("content/example.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("All content banks valid"));
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    // First init
    skillatlas()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();

    // Second init should skip
    skillatlas()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn help_output() {
    skillatlas()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("weak-spot diagnosis"));
}

#[test]
fn version_output() {
    skillatlas()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("skillatlas"));
}
