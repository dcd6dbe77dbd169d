use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

struct Fixture {
    _tmp: TempDir,
    dir: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_path_buf();
        fs::write(
            dir.join("tokens.json"),
            r##"{
              "color": {
                "$type": "color",
                "text": { "$value": "#767676" },
                "muted": { "$value": "{color.text}" },
                "bg": { "$value": "#ffffff" }
              },
              "size": {
                "h1": { "$value": "1rem" },
                "h2": { "$value": "1.5rem" },
                "touch": { "$value": "44px" }
              }
            }"##,
        )
        .unwrap();
        fs::write(
            dir.join("rules.json"),
            r#"{
              "contrast": [{ "fg": "color.muted", "bg": "color.bg", "min": 4.5 }],
              "thresholds": [{ "id": "size.touch", "op": ">=", "valuePx": 44 }],
              "orders": [{ "axis": "size", "order": [["size.h1", ">=", "size.h2"]] }]
            }"#,
        )
        .unwrap();
        Self { _tmp: tmp, dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("tokenguard-cli").unwrap();
        cmd.arg("--tokens")
            .arg(self.path("tokens.json"))
            .arg("--config")
            .arg(self.path("rules.json"));
        cmd
    }
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).unwrap()
}

#[test]
fn validate_reports_order_violation() {
    let fx = Fixture::new();
    let out = fx.cmd().arg("validate").assert().code(2).get_output().stdout.clone();
    let report = stdout_json(&out);
    assert_eq!(report["valid"], false);
    assert_eq!(report["tokenCount"], 6);
    let issues = report["issues"].as_array().unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0]["id"], "size.h1|size.h2");
}

#[test]
fn validate_text_format() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["validate", "--format", "text"])
        .assert()
        .code(2)
        .stdout(contains("size.h1 >= size.h2 violated").and(contains("invalid: 6 tokens, 1 errors")));
}

#[test]
fn commit_writes_overrides_and_fixes() {
    let fx = Fixture::new();
    let overrides = fx.path("overrides.json");
    fx.cmd()
        .arg("--overrides")
        .arg(&overrides)
        .args(["commit", "--id", "size.h1", "--value", "2rem", "--write-overrides"])
        .assert()
        .success()
        .stdout(contains("\"patch\""));

    let written: Value = serde_json::from_str(&fs::read_to_string(&overrides).unwrap()).unwrap();
    assert_eq!(written["size.h1"], "2rem");

    fx.cmd()
        .arg("--overrides")
        .arg(&overrides)
        .arg("validate")
        .assert()
        .success();
}

#[test]
fn commit_reports_affected_aliases() {
    let fx = Fixture::new();
    let out = fx
        .cmd()
        .args(["commit", "--id", "color.text", "--value", "#999999"])
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let report = stdout_json(&out);
    assert_eq!(report["affected"], serde_json::json!(["color.muted"]));
    assert_eq!(report["issues"][0]["rule"], "contrast");
}

#[test]
fn commit_unknown_token_fails() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["commit", "--id", "size.h9", "--value", "1px"])
        .assert()
        .failure()
        .stdout(contains("Unknown token: size.h9"));
}

#[test]
fn graph_mermaid_and_dot() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["graph", "--axis", "size", "--title", "Sizes"])
        .assert()
        .success()
        .stdout(contains("flowchart TD").and(contains("title: Sizes")).and(contains("violation")));
    fx.cmd()
        .args(["graph", "--axis", "size", "--format", "dot"])
        .assert()
        .success()
        .stdout(contains("\"size.h1\" -> \"size.h2\""));
}

#[test]
fn eval_with_trace_and_guard() {
    let fx = Fixture::new();
    let out = fx
        .cmd()
        .args(["eval", "--expr", r#"{"mul":[{"ref":"size.h2"},2]}"#, "--trace"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report = stdout_json(&out);
    assert_eq!(report["value"], 48.0);
    assert!(report["trace"].as_array().is_some_and(|t| !t.is_empty()));

    fx.cmd()
        .args(["eval", "--expr", r#"{"div":[1,0]}"#])
        .assert()
        .failure()
        .stdout(contains("division_by_zero"));
}

#[test]
fn emit_css() {
    let fx = Fixture::new();
    fx.cmd()
        .args(["emit", "--format", "css"])
        .assert()
        .success()
        .stdout(contains(":root {").and(contains("--color-muted: #767676;")));
}

#[test]
fn missing_tokens_file_fails() {
    let mut cmd = Command::cargo_bin("tokenguard-cli").unwrap();
    cmd.arg("--tokens")
        .arg(Path::new("/definitely/not/here.json"))
        .arg("validate")
        .assert()
        .failure()
        .stdout(contains("error"));
}

#[test]
fn cyclic_aliases_fail_with_cycle() {
    let fx = Fixture::new();
    fs::write(
        fx.path("tokens.json"),
        r#"{ "a": { "$value": "{b}" }, "b": { "$value": "{a}" } }"#,
    )
    .unwrap();
    fx.cmd()
        .arg("validate")
        .assert()
        .failure()
        .stdout(contains("Circular reference"));
}
