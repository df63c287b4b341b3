//! End-to-end engine tests: whole files in, whole files out.

use cachepack::{Engine, EngineConfig, Ruleset};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const APT_PRE_COMMAND: &str = "rm -f /etc/apt/apt.conf.d/docker-clean; echo 'Binary::apt::APT::Keep-Downloaded-Packages \"true\";' > /etc/apt/apt.conf.d/keep-cache";

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

fn run_engine(input: &Path, output: &Path, fail_file: &Path) -> Engine {
    let config = EngineConfig {
        input: input.to_path_buf(),
        output: Some(output.to_path_buf()),
        fail_file: fail_file.to_path_buf(),
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(config, Ruleset::builtin().unwrap());
    engine.run().unwrap();
    engine
}

#[test]
fn test_apt_dockerfile_gains_mounts_and_directive() {
    let dir = TempDir::new().unwrap();
    let input = write_file(
        dir.path(),
        "Dockerfile",
        "FROM debian:12\nRUN apt-get update && apt-get install -y gcc\n",
    );
    let output = dir.path().join("Dockerfile.out");
    let engine = run_engine(&input, &output, &dir.path().join("failures.txt"));

    let result = fs::read_to_string(&output).unwrap();
    assert_eq!(
        result,
        format!(
            "# syntax=docker/dockerfile:1.3\nFROM debian:12\nRUN {}\nRUN --mount=type=cache,target=/var/lib/apt --mount=type=cache,target=/var/cache/apt apt-get update && apt-get install -y gcc\n",
            APT_PRE_COMMAND
        )
    );
    assert!(engine.failures().is_empty());
    assert_eq!(engine.stats().total_add_cache, 1);
    assert_eq!(engine.stats().total_insert_before, 1);
    assert_eq!(engine.stats().total_syntax_change, 1);
}

#[test]
fn test_optimizer_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let input = write_file(
        dir.path(),
        "Dockerfile",
        "FROM debian:12\nRUN apt-get update\nRUN npm install\n",
    );
    let once = dir.path().join("once");
    let twice = dir.path().join("twice");
    run_engine(&input, &once, &dir.path().join("f1.txt"));
    run_engine(&once, &twice, &dir.path().join("f2.txt"));

    let first = fs::read_to_string(&once).unwrap();
    let second = fs::read_to_string(&twice).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_nothing_to_optimize_copies_verbatim() {
    let dir = TempDir::new().unwrap();
    let text = "FROM scratch\nCOPY hello /hello\n\nCMD [\"/hello\"]\n";
    let input = write_file(dir.path(), "Dockerfile", text);
    let output = dir.path().join("Dockerfile.out");
    let engine = run_engine(&input, &output, &dir.path().join("failures.txt"));

    assert_eq!(fs::read_to_string(&output).unwrap(), text);
    assert!(engine.failures().is_empty());
    assert_eq!(engine.stats().total_syntax_change, 0);
}

#[test]
fn test_foreign_frontend_falls_back_to_copy() {
    let dir = TempDir::new().unwrap();
    let text = "# syntax=myvendor/custom:1\nFROM debian\nRUN apt-get update\n";
    let input = write_file(dir.path(), "Dockerfile", text);
    let output = dir.path().join("Dockerfile.out");
    let fail_file = dir.path().join("failures.txt");
    let engine = run_engine(&input, &output, &fail_file);

    // the original is copied unmodified and the file is recorded as failed
    assert_eq!(fs::read_to_string(&output).unwrap(), text);
    assert_eq!(engine.failures(), &[input.clone()]);
    let failures = fs::read_to_string(&fail_file).unwrap();
    assert_eq!(failures.trim(), input.display().to_string());
}

#[test]
fn test_tokenize_error_falls_back_to_copy() {
    let dir = TempDir::new().unwrap();
    let text = "FROM debian\nRUN echo 'unterminated && apt-get update\n";
    let input = write_file(dir.path(), "Dockerfile", text);
    let output = dir.path().join("Dockerfile.out");
    let engine = run_engine(&input, &output, &dir.path().join("failures.txt"));

    assert_eq!(fs::read_to_string(&output).unwrap(), text);
    assert_eq!(engine.failures().len(), 1);
    // nothing from the abandoned file leaks into the totals
    assert_eq!(engine.stats().total_add_cache, 0);
}

#[test]
fn test_directory_mode_mirrors_tree() {
    let dir = TempDir::new().unwrap();
    let input_dir = dir.path().join("in");
    write_file(&input_dir, "a/Dockerfile", "FROM debian\nRUN apt-get update\n");
    write_file(&input_dir, "b/Dockerfile", "FROM scratch\nCOPY x /x\n");
    let output_dir = dir.path().join("out");
    run_engine(&input_dir, &output_dir, &dir.path().join("failures.txt"));

    let optimized = fs::read_to_string(output_dir.join("a/Dockerfile")).unwrap();
    assert!(optimized.contains("--mount=type=cache,target=/var/lib/apt"));
    assert!(optimized.starts_with("# syntax=docker/dockerfile:1.3\n"));

    let untouched = fs::read_to_string(output_dir.join("b/Dockerfile")).unwrap();
    assert_eq!(untouched, "FROM scratch\nCOPY x /x\n");
}

#[test]
fn test_suffix_output_without_explicit_path() {
    let dir = TempDir::new().unwrap();
    let input = write_file(dir.path(), "Dockerfile", "FROM debian\nRUN apt-get update\n");
    let config = EngineConfig {
        input: input.clone(),
        output: None,
        suffix: ".cached".to_string(),
        fail_file: dir.path().join("failures.txt"),
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(config, Ruleset::builtin().unwrap());
    engine.run().unwrap();

    let sibling = dir.path().join("Dockerfile.cached");
    assert!(sibling.exists());
    assert!(fs::read_to_string(sibling)
        .unwrap()
        .contains("--mount=type=cache"));
}

#[test]
fn test_multistage_stages_are_independent() {
    let dir = TempDir::new().unwrap();
    let input = write_file(
        dir.path(),
        "Dockerfile",
        "FROM golang:1.22 AS build\nRUN go build ./...\nFROM debian:12\nRUN apt-get update\n",
    );
    let output = dir.path().join("Dockerfile.out");
    run_engine(&input, &output, &dir.path().join("failures.txt"));

    let result = fs::read_to_string(&output).unwrap();
    // the go stage caches go's directory, the debian stage apt's; the apt
    // pre-command is inserted in the second stage only
    assert!(result.contains("--mount=type=cache,target=/root/.cache/go-build go build ./..."));
    assert!(result.contains("--mount=type=cache,target=/var/lib/apt"));
    let pre_count = result.matches("keep-cache").count();
    assert_eq!(pre_count, 1);
}

#[test]
fn test_custom_rules_file() {
    let dir = TempDir::new().unwrap();
    let rules_path = write_file(
        dir.path(),
        "rules.yaml",
        r#"
packageManagers:
  mytool:
    commands-regex-run: ['fetch\b.*']
    default-cache-dirs: ['/opt/mytool-cache']
"#,
    );
    let input = write_file(dir.path(), "Dockerfile", "FROM debian\nRUN mytool fetch\n");
    let output = dir.path().join("Dockerfile.out");
    let config = EngineConfig {
        input,
        output: Some(output.clone()),
        fail_file: dir.path().join("failures.txt"),
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(config, Ruleset::load(&rules_path).unwrap());
    engine.run().unwrap();

    assert!(fs::read_to_string(&output)
        .unwrap()
        .contains("--mount=type=cache,target=/opt/mytool-cache mytool fetch"));
}
