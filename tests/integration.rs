use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn rag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rag");
    path
}

const NOTES: &str = "Intro line before any header.
# Rust
Ownership and borrowing. #lang
## Cargo
Build tool, see https://doc.rust-lang.org/cargo and [[Crates]].
### Features
Optional dependencies.
#### Detail
Deep note.
# Python
Dynamic typing.
";

fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let notes_dir = root.join("notes");
    fs::create_dir_all(&notes_dir).unwrap();
    fs::write(notes_dir.join("languages.md"), NOTES).unwrap();
    fs::write(
        notes_dir.join("ops.md"),
        "# Deploy\nKubernetes and Docker.\n# Monitor\nDashboards.\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/rag.sqlite"

[dataset]
path = "{root}/notes"

[embedding]
url = "http://127.0.0.1:9"
timeout_secs = 2
{extra}
"#,
        root = root.display(),
        extra = extra
    );

    let config_path = config_dir.join("rag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_rag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = rag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RAG_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_chunk_prints_sections() {
    let (tmp, _) = setup_test_env("");
    let file = tmp.path().join("notes/languages.md");
    let missing_config = tmp.path().join("nope.toml");

    let (stdout, stderr, success) = run_rag(&missing_config, &["chunk", file.to_str().unwrap()]);
    assert!(success, "chunk failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("4 chunks"));
    assert!(stdout.contains("Headers: Rust > Cargo > Features"));
    assert!(stdout.contains("Tags: lang"));
    assert!(stdout.contains("Intro line before any header.\n# Rust"));
}

#[test]
fn test_chunk_json_respects_depths() {
    let (tmp, _) = setup_test_env("");
    let file = tmp.path().join("notes/languages.md");
    let missing_config = tmp.path().join("nope.toml");

    let (stdout, stderr, success) = run_rag(
        &missing_config,
        &["chunk", file.to_str().unwrap(), "--depths", "1", "--json"],
    );
    assert!(success, "chunk failed: stderr={}", stderr);

    let chunks: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let chunks = chunks.as_array().unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0]["headers"], serde_json::json!({ "h1": "Rust" }));
    assert_eq!(chunks[0]["boundary_depth"], 1);
    assert!(chunks[0]["content"]
        .as_str()
        .unwrap()
        .contains("#### Detail\nDeep note."));
    assert_eq!(chunks[1]["headers"], serde_json::json!({ "h1": "Python" }));
    let links = chunks[0]["metadata"]["internal_links"].as_array().unwrap();
    assert_eq!(links, &vec![serde_json::json!("Crates")]);
}

#[test]
fn test_chunk_rejects_bad_depths() {
    let (tmp, _) = setup_test_env("");
    let file = tmp.path().join("notes/languages.md");
    let (_, stderr, success) = run_rag(
        &tmp.path().join("nope.toml"),
        &["chunk", file.to_str().unwrap(), "--depths", "0,9"],
    );
    assert!(!success);
    assert!(stderr.contains("out of range"));
}

#[test]
fn test_ingest_dry_run_counts() {
    let (_tmp, config_path) = setup_test_env("");
    let (stdout, stderr, success) = run_rag(&config_path, &["ingest", "--dry-run"]);
    assert!(success, "dry run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents found: 2"));
    assert!(stdout.contains("chunks: 6"));
}

#[test]
fn test_ingest_dry_run_lines_strategy() {
    let (_tmp, config_path) = setup_test_env("\n[chunking]\nstrategy = \"lines\"\n");
    let (stdout, _, success) = run_rag(&config_path, &["ingest", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("chunks: 15"));
}

#[test]
fn test_ingest_missing_dataset() {
    let (tmp, config_path) = setup_test_env("");
    fs::remove_dir_all(tmp.path().join("notes")).unwrap();

    let (_, stderr, success) = run_rag(&config_path, &["ingest"]);
    assert!(!success);
    assert!(stderr.contains("Dataset file not found at"));
}

#[test]
fn test_ingest_empty_dataset() {
    let (tmp, config_path) = setup_test_env("");
    let notes = tmp.path().join("notes");
    fs::write(notes.join("languages.md"), "\n   \n").unwrap();
    fs::write(notes.join("ops.md"), "").unwrap();

    let (_, stderr, success) = run_rag(&config_path, &["ingest"]);
    assert!(!success);
    assert!(stderr.contains("No valid documents found"));
}

#[test]
fn test_ask_without_collection_fails_fast() {
    let (_tmp, config_path) = setup_test_env("");
    let (stdout, stderr, success) = run_rag(&config_path, &["ask", "what is cargo?"]);
    assert!(!success, "ask unexpectedly succeeded: {}", stdout);
    assert!(stderr.contains("Collection 'my_presentation_docs' not found"));
    assert!(stderr.contains("rag ingest"));
}

#[test]
fn test_search_without_collection_fails_fast() {
    let (_tmp, config_path) = setup_test_env("\n[collection]\nname = \"vault\"\n");
    let (_, stderr, success) = run_rag(&config_path, &["search", "docker"]);
    assert!(!success);
    assert!(stderr.contains("Collection 'vault' not found"));
}

#[test]
fn test_stats_without_collection() {
    let (_tmp, config_path) = setup_test_env("");
    let (_, stderr, success) = run_rag(&config_path, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_invalid_retrieval_config() {
    let (_tmp, config_path) =
        setup_test_env("\n[retrieval]\ncandidate_pool_size = 2\ntop_n = 5\n");
    let (_, stderr, success) = run_rag(&config_path, &["ingest", "--dry-run"]);
    assert!(!success);
    assert!(stderr.contains("candidate_pool_size"));
}

#[test]
fn test_missing_config_file() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_rag(&tmp.path().join("absent.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
