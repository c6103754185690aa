//! CLI binary integration tests using assert_cmd + predicates.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[allow(deprecated)]
fn cmd() -> Command {
    Command::cargo_bin("cti").expect("binary should exist")
}

// ── Parse ───────────────────────────────────────────────────────────────────

#[test]
fn test_parse_identifier_round_trip() {
    cmd()
        .args(["parse", "cti.a.p.e.v1.0", "--mode", "identifier"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cti.a.p.e.v1.0"));
}

#[test]
fn test_parse_rejects_wildcard_in_identifier_mode() {
    cmd()
        .args(["parse", "cti.a.p.*", "--mode", "identifier"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Parse failed"));
}

#[test]
fn test_parse_reference_allows_wildcard() {
    cmd()
        .args(["parse", "cti.a.p.e.*", "--mode", "reference"])
        .assert()
        .success();
}

#[test]
fn test_parse_compact_format_has_no_indentation() {
    cmd()
        .args([
            "parse",
            "cti.a.p.e.v1.0",
            "--mode",
            "identifier",
            "--format",
            "compact",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\n  ").not());
}

// ── Match ───────────────────────────────────────────────────────────────────

#[test]
fn test_match_wildcard_pattern_succeeds() {
    cmd()
        .args(["match", "cti.a.p.gr.*", "cti.a.p.gr.namespace.v1.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("true"));
}

#[test]
fn test_match_mismatch_exits_nonzero() {
    cmd()
        .args(["match", "cti.a.p.other.v1.0", "cti.a.p.e.v1.0"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("false"));
}

#[test]
fn test_match_rejects_wildcard_on_concrete_side() {
    cmd()
        .args(["match", "cti.a.p.e.v1.0", "cti.a.p.e.*"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Parsing concrete CTI failed"));
}

// ── Interpolate ──────────────────────────────────────────────────────────────

#[test]
fn test_interpolate_substitutes_dynamic_parameter() {
    cmd()
        .args([
            "interpolate",
            "cti.a.p.gr.namespace.v1.0~${k}",
            "--set",
            "k=a.p.integrations.datacenters.v1.0",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "cti.a.p.gr.namespace.v1.0~a.p.integrations.datacenters.v1.0",
        ));
}

#[test]
fn test_interpolate_missing_value_fails() {
    cmd()
        .args(["interpolate", "cti.a.p.gr.namespace.v1.0~${k}"])
        .assert()
        .failure();
}

// ── MergeSchema ──────────────────────────────────────────────────────────────

fn cached_records() -> String {
    serde_json::json!([
        {
            "final": false,
            "cti": "cti.a.p.parent.v1.0",
            "access": "public",
            "schema": {
                "$ref": "#/definitions/Parent",
                "definitions": {
                    "Parent": {
                        "type": "object",
                        "properties": { "name": { "type": "string" } }
                    }
                }
            }
        },
        {
            "final": true,
            "cti": "cti.a.p.parent.v1.0~a.p.child.v1.0",
            "access": "public",
            "schema": {
                "$ref": "#/definitions/Child",
                "definitions": {
                    "Child": {
                        "type": "object",
                        "properties": { "age": { "type": "integer" } }
                    }
                }
            }
        }
    ])
    .to_string()
}

#[test]
fn test_merge_schema_folds_ancestor_properties() {
    let dir = TempDir::new().unwrap();
    let records = dir.path().join("records.json");
    fs::write(&records, cached_records()).unwrap();

    cmd()
        .args([
            "merge-schema",
            records.to_str().unwrap(),
            "cti.a.p.parent.v1.0~a.p.child.v1.0",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"age\""))
        .stdout(predicate::str::contains("\"name\""))
        .stderr(predicate::str::contains("cti.a.p.parent.v1.0"));
}

#[test]
fn test_merge_schema_unknown_type_fails() {
    let dir = TempDir::new().unwrap();
    let records = dir.path().join("records.json");
    fs::write(&records, cached_records()).unwrap();

    cmd()
        .args(["merge-schema", records.to_str().unwrap(), "cti.a.p.nope.v1.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Merging schema failed"));
}

// ── CheckAccess ──────────────────────────────────────────────────────────────

fn access_records() -> String {
    serde_json::json!([
        {
            "final": false,
            "cti": "cti.vendor_a.p.e.v1.0",
            "access": "private",
            "schema": { "$ref": "#/definitions/E", "definitions": { "E": {} } }
        },
        {
            "final": true,
            "cti": "cti.vendor_a.other_pkg.f.v1.0",
            "access": "public",
            "values": { "x": 1 }
        },
        {
            "final": true,
            "cti": "cti.vendor_b.q.g.v1.0",
            "access": "public",
            "values": { "x": 1 }
        }
    ])
    .to_string()
}

#[test]
fn test_check_access_denied_across_packages() {
    let dir = TempDir::new().unwrap();
    let records = dir.path().join("records.json");
    fs::write(&records, access_records()).unwrap();

    cmd()
        .args([
            "check-access",
            records.to_str().unwrap(),
            "cti.vendor_a.p.e.v1.0",
            "cti.vendor_b.q.g.v1.0",
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("denied"));
}

#[test]
fn test_check_access_denied_different_package_same_vendor() {
    let dir = TempDir::new().unwrap();
    let records = dir.path().join("records.json");
    fs::write(&records, access_records()).unwrap();

    cmd()
        .args([
            "check-access",
            records.to_str().unwrap(),
            "cti.vendor_a.p.e.v1.0",
            "cti.vendor_a.other_pkg.f.v1.0",
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("denied"));
}

// ── Help Output ──────────────────────────────────────────────────────────────

#[test]
fn test_help_output() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("parse"))
        .stdout(predicate::str::contains("match"))
        .stdout(predicate::str::contains("interpolate"))
        .stdout(predicate::str::contains("merge-schema"))
        .stdout(predicate::str::contains("check-access"));
}
