//! bridge-ctl
//!
//! Operator CLI for the bridge (spec §4.N): key generation, audit-log
//! verification, store inspection, manual session-token minting, and an
//! offline secret-filter test harness. Grounded on the teacher's
//! `pie-control` binary — clap derive subcommands, dotenvy env loading,
//! typed errors mapped to process exit codes.

use bridge_envelope::Scope;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
enum CliError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("crypto error: {0}")]
    Crypto(#[from] bridge_crypto::CryptoError),
    #[error("audit error: {0}")]
    Audit(#[from] bridge_audit_log::AuditLogError),
    #[error("store error: {0}")]
    Store(#[from] bridge_store::StoreError),
    #[error("unknown scope: {0}")]
    UnknownScope(String),
}

#[derive(Parser)]
#[command(name = "bridge-ctl", version, about = "bridge operator control-plane utilities")]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an Ed25519 or HMAC keypair for a scope.
    Keygen {
        #[arg(long, default_value = "direct")]
        scope: String,

        #[arg(long, default_value = "ed25519")]
        algorithm: String,
    },

    /// Verify a hash-chained audit log and print its final hash.
    Audit {
        #[command(subcommand)]
        cmd: AuditCommand,
    },

    /// Inspect row counts across the persistent store's tables.
    Store {
        #[command(subcommand)]
        cmd: StoreCommand,
    },

    /// Issue a session token for a scope, for manual testing.
    MintToken {
        scope: String,

        #[arg(long, default_value_t = 3600)]
        ttl_secs: u64,
    },

    /// Run the secret filter over a text argument for operator debugging.
    RedactTest {
        text: String,

        #[arg(long, default_value = "outbound")]
        direction: String,
    },
}

#[derive(Subcommand)]
enum AuditCommand {
    Verify { path: PathBuf },
}

#[derive(Subcommand)]
enum StoreCommand {
    Inspect {
        #[arg(long, default_value = "./data/bridge.db")]
        data_dir: PathBuf,
    },
}

fn main() {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("ERROR: {e}");
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<i32, CliError> {
    match args.cmd {
        Command::Keygen { scope, algorithm } => keygen(&scope, &algorithm),
        Command::Audit { cmd: AuditCommand::Verify { path } } => audit_verify(&path),
        Command::Store { cmd: StoreCommand::Inspect { data_dir } } => store_inspect(&data_dir),
        Command::MintToken { scope, ttl_secs } => mint_token(&scope, ttl_secs),
        Command::RedactTest { text, direction } => redact_test(&text, &direction),
    }
}

fn parse_scope(s: &str) -> Result<Scope, CliError> {
    Scope::parse(s).ok_or_else(|| CliError::UnknownScope(s.to_string()))
}

fn keygen(scope: &str, algorithm: &str) -> Result<i32, CliError> {
    let scope = parse_scope(scope)?;

    let (signing_b64, verifying_b64, alg) = match algorithm {
        "ed25519" => {
            let (signing, verifying) = bridge_crypto::generate_ed25519_keypair();
            (
                bridge_common::b64url_encode(&signing.to_bytes()),
                bridge_common::b64url_encode(&verifying.to_bytes()),
                "ed25519",
            )
        }
        "hmac" => {
            let secret = bridge_crypto::random_bytes(32);
            let encoded = bridge_common::b64url_encode(&secret);
            (encoded.clone(), encoded, "hmac-sha256")
        }
        other => return Err(CliError::UnknownScope(format!("unknown algorithm: {other}"))),
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "scope": scope.as_str(),
            "algorithm": alg,
            "signingKey": signing_b64,
            "verifyingKey": verifying_b64,
        }))?
    );
    Ok(0)
}

fn audit_verify(path: &PathBuf) -> Result<i32, CliError> {
    match bridge_audit_log::verify_log(path) {
        Ok(last_hash) => {
            println!("{}", serde_json::to_string(&json!({ "ok": true, "lastHash": last_hash }))?);
            Ok(0)
        }
        Err(bridge_audit_log::AuditLogError::HashMismatch { line, expected, got }) => {
            println!(
                "{}",
                serde_json::to_string(&json!({ "ok": false, "line": line, "expected": expected, "got": got }))?
            );
            Ok(2)
        }
        Err(e) => Err(CliError::Audit(e)),
    }
}

fn store_inspect(data_dir: &PathBuf) -> Result<i32, CliError> {
    let store = bridge_store::Store::open(data_dir)?;
    const TABLES: &[&str] = &[
        "approvals",
        "rate_limits",
        "identity_links",
        "pending_link_codes",
        "sessions",
        "circuit_breaker",
        "attachment_refs",
        "memory_entries",
    ];

    let mut counts = serde_json::Map::new();
    for table in TABLES {
        let count: i64 = store.with_conn(|conn| conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0)))?;
        counts.insert(table.to_string(), json!(count));
    }

    println!("{}", serde_json::to_string_pretty(&serde_json::Value::Object(counts))?);
    Ok(0)
}

fn mint_token(scope: &str, ttl_secs: u64) -> Result<i32, CliError> {
    let scope = parse_scope(scope)?;
    let issuer = bridge_session::SessionTokenIssuer::new(Duration::from_secs(ttl_secs));
    let (token, expires_at) = issuer.issue(scope);
    let expires_unix = expires_at.duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs();
    println!("{}", serde_json::to_string(&json!({ "token": token, "scope": scope.as_str(), "expiresAt": expires_unix }))?);
    Ok(0)
}

fn redact_test(text: &str, direction: &str) -> Result<i32, CliError> {
    let filter = match direction {
        "inbound" => bridge_secret_filter::SecretFilter::inbound(),
        _ => bridge_secret_filter::SecretFilter::outbound(),
    };
    let outcome = filter.scan(text);
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "blocked": outcome.blocked,
            "redactedText": outcome.redacted_text,
            "matches": outcome.matches.iter().map(|m| json!({
                "patternId": m.pattern_id,
                "severity": format!("{:?}", m.severity),
            })).collect::<Vec<_>>(),
        }))?
    );
    Ok(if outcome.blocked { 2 } else { 0 })
}
