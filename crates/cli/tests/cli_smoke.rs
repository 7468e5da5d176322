//! CLI smoke tests for bkctl.
//!
//! These drive the binary end to end against the built-in dry-run engine.

use assert_cmd::Command;
use bkctl_llb::op::{ExecMeta, ExecOp, Input, Op, SourceOp};
use bkctl_llb::{Definition, Digest};
use predicates::prelude::*;
use std::collections::BTreeMap;
use tempfile::TempDir;

/// Get a Command for the bkctl binary.
fn bkctl_cmd() -> Command {
    Command::cargo_bin("bkctl").unwrap()
}

/// Two-step graph: pull an image, then run a command on it.
fn definition() -> Vec<u8> {
    let source = Op {
        source: Some(SourceOp {
            identifier: "docker-image://docker.io/library/alpine:latest".to_string(),
            attrs: BTreeMap::new(),
        }),
        ..Op::default()
    };
    let source_digest = Digest::from_bytes(&source.encode().unwrap());
    let exec = Op {
        inputs: vec![Input {
            digest: source_digest.to_string(),
            index: 0,
        }],
        exec: Some(ExecOp {
            meta: ExecMeta {
                args: vec!["echo".to_string(), "hi".to_string()],
                ..ExecMeta::default()
            },
            ..ExecOp::default()
        }),
        ..Op::default()
    };

    let mut encoded = Vec::new();
    Definition::from_ops(&[source, exec])
        .unwrap()
        .write_to(&mut encoded)
        .unwrap();
    encoded
}

#[test]
fn help_flag_works() {
    bkctl_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn build_help_lists_flags() {
    bkctl_cmd()
        .args(["build", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--metadata-file"))
        .stdout(predicate::str::contains("--no-cache"));
}

#[test]
fn piped_definition_is_built_with_plain_progress() {
    bkctl_cmd()
        .args(["build", "--progress", "plain"])
        .write_stdin(definition())
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains(
            "#1 docker-image://docker.io/library/alpine:latest",
        ))
        .stderr(predicate::str::contains("#2 echo hi"))
        .stderr(predicate::str::contains("#2 DONE"));
}

#[test]
fn empty_definition_is_rejected() {
    bkctl_cmd()
        .args(["build", "--progress", "quiet"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("empty definition sent to build"));
}

#[test]
fn malformed_definition_is_rejected() {
    bkctl_cmd()
        .arg("build")
        .write_stdin("not a definition")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse input"));
}

#[test]
fn unknown_entitlement_is_rejected() {
    bkctl_cmd()
        .args(["build", "--frontend", "dockerfile.v0", "--allow", "device"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("device"));
}

#[test]
fn sub_request_result_is_printed() {
    bkctl_cmd()
        .args([
            "build",
            "--progress",
            "quiet",
            "--frontend",
            "dockerfile.v0",
            "--opt",
            "requestid=frontend.outline",
        ])
        .assert()
        .success()
        .stdout("dry run: frontend dockerfile.v0 would answer frontend.outline\n");
}

#[test]
fn metadata_file_and_trace_are_written() {
    let temp = TempDir::new().unwrap();
    let metadata = temp.path().join("metadata.json");
    let trace = temp.path().join("trace.log");

    bkctl_cmd()
        .args(["build", "--progress", "quiet", "--no-cache", "--output", "type=local,dest=out"])
        .arg("--metadata-file")
        .arg(&metadata)
        .arg("--trace")
        .arg(&trace)
        .write_stdin(definition())
        .assert()
        .success();

    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&metadata).unwrap()).unwrap();
    assert_eq!(json["dryrun.summary"]["exporters"][0], "local");
    assert!(json["dryrun.definition.digest"]
        .as_str()
        .unwrap()
        .starts_with("sha256:"));

    let records = std::fs::read_to_string(&trace).unwrap();
    assert_eq!(records.lines().count(), 4);
}
