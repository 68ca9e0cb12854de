use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn keygen_prints_ed25519_material() {
    Command::cargo_bin("bridge-ctl")
        .unwrap()
        .args(["keygen", "--scope", "direct", "--algorithm", "ed25519"])
        .assert()
        .success()
        .stdout(predicate::str::contains("signingKey"));
}

#[test]
fn keygen_rejects_unknown_scope() {
    Command::cargo_bin("bridge-ctl")
        .unwrap()
        .args(["keygen", "--scope", "nonsense"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn redact_test_blocks_known_secret() {
    Command::cargo_bin("bridge-ctl")
        .unwrap()
        .args(["redact-test", "sk-ant-REDACTED"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"blocked\": true"));
}

#[test]
fn redact_test_allows_clean_text() {
    Command::cargo_bin("bridge-ctl")
        .unwrap()
        .args(["redact-test", "hello world"])
        .assert()
        .code(0);
}

#[test]
fn mint_token_prints_token_for_scope() {
    Command::cargo_bin("bridge-ctl")
        .unwrap()
        .args(["mint-token", "public", "--ttl-secs", "60"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"scope\":\"public\""));
}

#[test]
fn audit_verify_reports_missing_file_as_general_failure() {
    Command::cargo_bin("bridge-ctl")
        .unwrap()
        .args(["audit", "verify", "/nonexistent/path/audit.jsonl"])
        .assert()
        .code(1);
}
