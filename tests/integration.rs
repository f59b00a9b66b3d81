use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ctxdb_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ctxdb"))
}

/// Temp workspace with a config using disabled providers, so no network is
/// touched: every pipeline run fails fast and permanently.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("guide")).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.md"),
        "# Beta Document\n\nThis document discusses Python and machine learning.",
    )
    .unwrap();
    fs::write(
        files_dir.join("guide/setup.txt"),
        "Setup notes about deployment and infrastructure.",
    )
    .unwrap();
    fs::write(
        files_dir.join("guide/install.md"),
        "Install notes for the command line tool.",
    )
    .unwrap();
    fs::write(files_dir.join("logo.png"), [0x89u8, 0x50, 0x4e, 0x47, 0xff, 0xfe]).unwrap();
    fs::create_dir_all(root.join("other")).unwrap();
    fs::write(root.join("other/alpha.md"), "A different alpha.").unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/ctxdb.sqlite"

[embedding]
provider = "disabled"
max_retries = 0

[summarization]
provider = "disabled"
max_retries = 0
"#,
        root.display()
    );

    let config_path = config_dir.join("ctxdb.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ctxdb(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ctxdb_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("CTXDB_CONFIG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ctxdb binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn file_arg(config_path: &Path, rel: &str) -> String {
    let root = config_path.parent().unwrap().parent().unwrap();
    root.join(rel).to_string_lossy().to_string()
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ctxdb(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_ctxdb(&config_path, &["init"]);
    assert!(success1, "First init failed");
    let (_, _, success2) = run_ctxdb(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_ctxdb(&tmp.path().join("nope.toml"), &["info"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_add_waits_and_reports_pipeline_failures() {
    let (_tmp, config_path) = setup_test_env();
    let alpha = file_arg(&config_path, "files/alpha.md");

    let (stdout, stderr, success) = run_ctxdb(&config_path, &["add", &alpha]);
    assert!(success, "add failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("added      ctx://resources/alpha.md"));
    assert!(stdout.contains("processed  1 resources: 0 embedded, 0 summarized"));
    assert!(stdout.contains("failures   1 embedding, 1 summarization"));

    let (stdout, _, success) = run_ctxdb(&config_path, &["status", "ctx://resources/alpha.md"]);
    assert!(success);
    assert!(stdout.contains("embed:          failed"));
    assert!(stdout.contains("summarize:      failed"));
    assert!(stdout.contains("disabled"));
}

#[test]
fn test_read_survives_failed_summarization() {
    let (_tmp, config_path) = setup_test_env();
    let alpha = file_arg(&config_path, "files/alpha.md");
    run_ctxdb(&config_path, &["add", &alpha]);

    let (stdout, _, success) = run_ctxdb(&config_path, &["read", "ctx://resources/alpha.md"]);
    assert!(success);
    assert!(stdout.contains("This is the alpha document about Rust programming."));

    let (_, stderr, success) = run_ctxdb(&config_path, &["abstract", "ctx://resources/alpha.md"]);
    assert!(!success);
    assert!(stderr.contains("not found"));

    let (_, stderr, success) = run_ctxdb(&config_path, &["overview", "ctx://resources/alpha.md"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_add_collision_exits_nonzero() {
    let (_tmp, config_path) = setup_test_env();
    let alpha = file_arg(&config_path, "files/alpha.md");
    let other = file_arg(&config_path, "other/alpha.md");

    let (_, _, success) = run_ctxdb(&config_path, &["add", "--no-wait", &alpha]);
    assert!(success);
    let (stdout, stderr, success) = run_ctxdb(&config_path, &["add", "--no-wait", &other]);
    assert!(!success);
    assert!(stdout.contains("collision"));
    assert!(stderr.contains("could not be added"));

    // Re-adding the same origin is fine.
    let (stdout, _, success) = run_ctxdb(&config_path, &["add", "--no-wait", &alpha]);
    assert!(success);
    assert!(stdout.contains("added      ctx://resources/alpha.md"));
}

#[test]
fn test_add_rejects_directories_and_unknown_schemes() {
    let (_tmp, config_path) = setup_test_env();
    let dir = file_arg(&config_path, "files");

    let (stdout, _, success) = run_ctxdb(&config_path, &["add", "--no-wait", &dir]);
    assert!(!success);
    assert!(stdout.contains("failed"));
    assert!(stdout.contains("directory"));

    let (stdout, _, success) =
        run_ctxdb(&config_path, &["add", "--no-wait", "ftp://example.com/a.md"]);
    assert!(!success);
    assert!(stdout.contains("unsupported"));
}

#[test]
fn test_add_dir_mirrors_layout_and_ls() {
    let (_tmp, config_path) = setup_test_env();
    let files = file_arg(&config_path, "files");

    // Markdown only by default: the text file and the binary image are skipped.
    let (stdout, stderr, success) = run_ctxdb(&config_path, &["add-dir", &files]);
    assert!(success, "add-dir failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ctx://resources/files/alpha.md"));
    assert!(stdout.contains("ctx://resources/files/guide/install.md"));
    assert!(!stdout.contains("setup.txt"));
    assert!(!stdout.contains("logo.png"));
    assert!(stdout.contains("processed  3 resources"));

    let (stdout, _, success) = run_ctxdb(&config_path, &["ls"]);
    assert!(success);
    assert!(stdout.contains("files/"));

    let (stdout, _, success) = run_ctxdb(&config_path, &["ls", "ctx://resources/files"]);
    assert!(success);
    let names: Vec<&str> = stdout
        .lines()
        .filter(|l| !l.contains("://"))
        .map(|l| l.split_whitespace().last().unwrap_or(""))
        .collect();
    assert_eq!(names, vec!["alpha.md", "beta.md", "guide/"]);
    let uris: Vec<&str> = stdout
        .lines()
        .filter(|l| l.contains("://"))
        .map(str::trim)
        .collect();
    assert_eq!(
        uris,
        vec![
            "ctx://resources/files/alpha.md",
            "ctx://resources/files/beta.md",
            "ctx://resources/files/guide",
        ]
    );

    let (_, stderr, success) = run_ctxdb(&config_path, &["ls", "ctx://resources/missing"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_add_dir_pattern_filters() {
    let (_tmp, config_path) = setup_test_env();
    let files = file_arg(&config_path, "files");

    let (stdout, _, success) = run_ctxdb(
        &config_path,
        &["add-dir", &files, "--pattern", "**/*.txt", "--no-wait"],
    );
    assert!(success);
    assert!(stdout.contains("ctx://resources/files/guide/setup.txt"));
    assert!(!stdout.contains("alpha.md"));
}

#[test]
fn test_search_requires_embedding_provider() {
    let (_tmp, config_path) = setup_test_env();
    run_ctxdb(&config_path, &["init"]);

    let (_, stderr, success) = run_ctxdb(&config_path, &["search", "rust"]);
    assert!(!success);
    assert!(stderr.contains("disabled"));
}

#[test]
fn test_info_and_retry() {
    let (_tmp, config_path) = setup_test_env();
    let alpha = file_arg(&config_path, "files/alpha.md");
    let beta = file_arg(&config_path, "files/beta.md");
    run_ctxdb(&config_path, &["add", &alpha, &beta]);

    let (stdout, _, success) = run_ctxdb(&config_path, &["info"]);
    assert!(success);
    assert!(stdout.contains("Resources:   2"));
    assert!(stdout.contains("Searchable:  0 / 2"));
    assert!(stdout.contains("In flight:   0 queued, 0 running"));

    let (stdout, _, success) = run_ctxdb(&config_path, &["retry"]);
    assert!(success);
    assert!(stdout.contains("re-enqueued 4 work items"));
    assert!(stdout.contains("remaining failures: 2 embedding, 2 summarization"));
}

#[test]
fn test_invalid_uri_rejected() {
    let (_tmp, config_path) = setup_test_env();
    run_ctxdb(&config_path, &["init"]);

    let (_, stderr, success) = run_ctxdb(&config_path, &["read", "http://example.com/x"]);
    assert!(!success);
    assert!(stderr.contains("invalid uri"));

    let (_, stderr, success) = run_ctxdb(&config_path, &["read", "other://resources/x"]);
    assert!(!success);
    assert!(stderr.contains("outside"));
}
