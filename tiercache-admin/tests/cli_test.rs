//! End-to-end tests for the admin binary

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;
use tiercache_core::HybridCache;

fn run_admin(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tiercache-admin"))
        .arg("--dir")
        .arg(dir)
        .args(args)
        .env_remove("TIERCACHE_CONFIG")
        // Verbose logging must not leak into command output
        .env("RUST_LOG", "debug")
        .output()
        .unwrap()
}

fn seed(dir: &Path) {
    let cache = HybridCache::<String>::open("seed", dir).unwrap();
    cache.set("alpha", "first".to_string()).unwrap();
    cache.set("beta", "second".to_string()).unwrap();
}

#[test]
fn test_stats_json_is_clean_stdout() {
    let temp_dir = TempDir::new().unwrap();
    seed(temp_dir.path());

    let output = run_admin(temp_dir.path(), &["--name", "seed", "--verbose", "stats", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["name"], "seed");
    assert_eq!(report["stats"]["entries"], 2);

    // Logs still go somewhere
    assert!(!output.stderr.is_empty());
}

#[test]
fn test_keys_lists_only_keys() {
    let temp_dir = TempDir::new().unwrap();
    seed(temp_dir.path());

    let output = run_admin(temp_dir.path(), &["--name", "seed", "keys"]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(&lines[..2], &["alpha", "beta"]);
}

#[test]
fn test_missing_cache_fails() {
    let temp_dir = TempDir::new().unwrap();

    let output = run_admin(temp_dir.path(), &["--name", "absent", "stats"]);
    assert!(!output.status.success());
    assert!(!temp_dir.path().join("absent.sqlite").exists());
}
