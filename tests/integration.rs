use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn logmine_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("logmine");
    path
}

struct TestEnv {
    _tmp: TempDir,
    root: PathBuf,
    config_path: PathBuf,
    log_path: PathBuf,
}

impl TestEnv {
    fn memory_path(&self) -> PathBuf {
        self.root.join("memory").join("patterns.json")
    }

    fn log_arg(&self) -> String {
        self.log_path.display().to_string()
    }

    /// Seed pattern memory for the log file's source key.
    fn remember(&self, patterns: &[&str]) {
        let mut doc = serde_json::Map::new();
        doc.insert(
            self.log_arg(),
            serde_json::json!({
                "patterns": { "kind": "patterns", "value": patterns }
            }),
        );
        fs::create_dir_all(self.memory_path().parent().unwrap()).unwrap();
        fs::write(self.memory_path(), serde_json::to_string(&doc).unwrap()).unwrap();
    }
}

const LOG: &str = "user alice logged in\n\
user bob logged in\n\
disk error on sda1\n\
user carol logged in\n\
request 42 took 17ms\n";

fn setup_test_env() -> TestEnv {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("logs")).unwrap();

    let log_path = root.join("logs").join("app.log");
    fs::write(&log_path, LOG).unwrap();

    // No network: matching-only runs.
    let config_content = format!(
        r#"[db]
path = "{root}/data/logmine.sqlite"

[memory]
path = "{root}/memory/patterns.json"

[embedding]
provider = "disabled"

[inference]
provider = "disabled"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("logmine.toml");
    fs::write(&config_path, config_content).unwrap();

    TestEnv {
        _tmp: tmp,
        root,
        config_path,
        log_path,
    }
}

fn run_logmine(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = logmine_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run logmine binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn run_json(env: &TestEnv, extra: &[&str]) -> serde_json::Value {
    let log = env.log_arg();
    let mut args = vec!["run", log.as_str(), "--json", "--progress", "off"];
    args.extend_from_slice(extra);
    let (stdout, stderr, success) = run_logmine(&env.config_path, &args);
    assert!(success, "run failed: stdout={}, stderr={}", stdout, stderr);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("summary is not JSON ({}): {}", e, stdout))
}

#[test]
fn test_init_creates_database() {
    let env = setup_test_env();

    let (stdout, stderr, success) = run_logmine(&env.config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(env.root.join("data").join("logmine.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let env = setup_test_env();

    let (_, _, success1) = run_logmine(&env.config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_logmine(&env.config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_run_with_remembered_patterns() {
    let env = setup_test_env();
    env.remember(&[r"^user (\w+) logged in$", r"^request (\d+) took (\d+)ms$"]);

    run_logmine(&env.config_path, &["init"]);
    let summary = run_json(&env, &[]);

    assert_eq!(summary["lines_read"], 5);
    assert_eq!(summary["matched"], 4);
    assert_eq!(summary["unmatched"], 1);
    assert_eq!(summary["stored"], 4);
    assert_eq!(summary["unexplained"], 1);
    assert_eq!(summary["learned"], 0);
    assert_eq!(summary["templates_total"], 2);

    let (stdout, stderr, success) = run_logmine(&env.config_path, &["tables"]);
    assert!(success, "tables failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains(r"^user (\w+) logged in$"));
    assert!(stdout.contains(r"^request (\d+) took (\d+)ms$"));
    assert!(stdout.contains("2 tables"));
}

#[test]
fn test_run_without_memory_stores_nothing() {
    let env = setup_test_env();

    let summary = run_json(&env, &[]);
    assert_eq!(summary["lines_read"], 5);
    assert_eq!(summary["stored"], 0);
    assert_eq!(summary["unexplained"], 5);

    // The (empty) template list is remembered for the source.
    assert!(env.memory_path().exists());
}

#[test]
fn test_max_lines_limits_records() {
    let env = setup_test_env();
    env.remember(&[r"^user (\w+) logged in$"]);

    let summary = run_json(&env, &["--max-lines", "2"]);
    assert_eq!(summary["stored"], 2);
}

#[test]
fn test_run_summary_human_readable() {
    let env = setup_test_env();
    env.remember(&[r"^user (\w+) logged in$"]);

    let log = env.log_arg();
    let (stdout, stderr, success) =
        run_logmine(&env.config_path, &["run", log.as_str(), "--progress", "off"]);
    assert!(success, "run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Run complete"));
    assert!(stdout.contains("records stored:      3"));
    assert!(stdout.contains("lines unmatched:     2"));
}

#[test]
fn test_patterns_and_clean() {
    let env = setup_test_env();
    env.remember(&[r"^user (\w+) logged in$"]);

    let (stdout, _, success) = run_logmine(&env.config_path, &["patterns"]);
    assert!(success);
    assert!(stdout.contains(&env.log_arg()));
    assert!(stdout.contains(r"^user (\w+) logged in$  [1 groups]"));

    let (stdout, _, success) =
        run_logmine(&env.config_path, &["patterns", "--source", "nope.log"]);
    assert!(success);
    assert!(stdout.contains("No remembered patterns for 'nope.log'"));

    let (stdout, _, success) = run_logmine(&env.config_path, &["clean"]);
    assert!(success);
    assert!(stdout.contains("Removed"));
    assert!(!env.memory_path().exists());

    let (stdout, _, success) = run_logmine(&env.config_path, &["clean"]);
    assert!(success);
    assert!(stdout.contains("Nothing to clean"));
}

#[test]
fn test_tables_requires_init() {
    let env = setup_test_env();
    let (_, stderr, success) = run_logmine(&env.config_path, &["tables"]);
    assert!(!success);
    assert!(stderr.contains("not initialized"));
}

#[test]
fn test_missing_input_fails() {
    let env = setup_test_env();
    let (_, stderr, success) =
        run_logmine(&env.config_path, &["run", "/no/such/file.log", "--progress", "off"]);
    assert!(!success);
    assert!(stderr.contains("Input not found"));
}

#[test]
fn test_missing_config_fails() {
    let env = setup_test_env();
    let missing = env.root.join("nope.toml");
    let (_, stderr, success) = run_logmine(&missing, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_invalid_config_fails() {
    let env = setup_test_env();
    let bad = env.root.join("config").join("bad.toml");
    fs::write(
        &bad,
        "[db]\npath = \"x.sqlite\"\n[cluster]\nbuffer_size = \"lots\"\n",
    )
    .unwrap();
    let (_, stderr, success) = run_logmine(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("buffer_size"));
}

#[test]
fn test_invalid_threshold_override_fails() {
    let env = setup_test_env();
    let log = env.log_arg();
    let (_, stderr, success) = run_logmine(
        &env.config_path,
        &["run", log.as_str(), "--threshold", "2.0"],
    );
    assert!(!success);
    assert!(stderr.contains("threshold"));
}
