// crates/kvstore-tools-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Tests
// Description: Unit tests for argument parsing, output, and command flow.
// Purpose: Exercise kvst commands against a scripted KV store transport.
// Dependencies: kvstore-tools-cli internals, kvstore-tools-core, tempfile
// ============================================================================

//! ## Overview
//! Commands run against [`StubStore`], which answers the REST endpoints by
//! path and records every request so tests can check what was sent.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::Mutex;

use clap::Parser;
use kvstore_tools_config::KvToolsConfig;
use kvstore_tools_config::LogLevel;
use kvstore_tools_core::HttpMethod;
use kvstore_tools_core::SessionToken;
use kvstore_tools_core::Transport;
use kvstore_tools_core::TransportError;
use kvstore_tools_core::TransportRequest;
use kvstore_tools_core::TransportResponse;
use serde_json::Value;

use super::BackupCommand;
use super::Cli;
use super::Commands;
use super::DeleteKeyCommand;
use super::RestoreCommand;
use super::RetentionCommand;
use super::ScopeArgs;
use super::commands;
use super::commands::ResultWriter;
use super::logging::resolve_filter;
use super::session::Session;
use super::session::remote_uri;

// ============================================================================
// SECTION: Stub Store
// ============================================================================

/// Scripted KV store with one app, one collection, and one record.
struct StubStore {
    /// Capabilities reported by the current context.
    capabilities: Vec<&'static str>,
    /// Requests as `METHOD url`.
    requests: Mutex<Vec<String>>,
}

impl StubStore {
    fn new(capabilities: Vec<&'static str>) -> Self {
        Self {
            capabilities,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for StubStore {
    fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(format!("{} {}", request.method, request.url));
        let url = request.url.as_str();
        let body = if url.contains("/authentication/current-context") {
            serde_json::json!({
                "entry": [{"content": {"username": "bob", "capabilities": self.capabilities}}]
            })
            .to_string()
        } else if url.contains("/apps/local") {
            r#"{"entry":[{"name":"search","content":{"disabled":false}}]}"#.to_string()
        } else if url.contains("/storage/collections/config") {
            r#"{"entry":[{"name":"lookups","acl":{"app":"search","sharing":"app"}}]}"#.to_string()
        } else if url.contains("/admin/roles") {
            r#"{"entry":[{"name":"kv_admin","content":{"imported_roles":[]}}]}"#.to_string()
        } else if url.contains("/admin/users") {
            r#"{"entry":[{"name":"alice","content":{"roles":["kv_admin"]}}]}"#.to_string()
        } else if request.method == HttpMethod::Get && url.contains("/storage/collections/data/") {
            r#"[{"_key":"k1","value":1}]"#.to_string()
        } else {
            String::new()
        };
        Ok(TransportResponse {
            status: 200,
            body: body.into_bytes(),
        })
    }
}

fn session_for(store: &Arc<StubStore>, config: KvToolsConfig) -> Session {
    let transport: Arc<dyn Transport> = store.clone();
    Session::with_transport(config, transport, Some(SessionToken::new("local-token")))
}

fn output_lines(writer: ResultWriter<Vec<u8>>) -> Vec<Value> {
    let bytes = writer.into_inner();
    String::from_utf8(bytes)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

// ============================================================================
// SECTION: Argument Parsing
// ============================================================================

#[test]
fn push_requires_a_target() {
    assert!(Cli::try_parse_from(["kvst", "push"]).is_err());
    let cli = Cli::try_parse_from(["kvst", "push", "--target", "sh1", "sh2", "--append"]).unwrap();
    let Commands::Push(push) = cli.command else {
        panic!("expected push command");
    };
    assert_eq!(push.targets, vec!["sh1".to_string(), "sh2".to_string()]);
    assert!(push.append);
    assert_eq!(push.port, None);
}

#[test]
fn privileged_ports_are_rejected() {
    assert!(Cli::try_parse_from(["kvst", "pull", "--source", "sh1", "--port", "80"]).is_err());
    let cli = Cli::try_parse_from(["kvst", "pull", "--source", "sh1", "--port", "8089"]).unwrap();
    let Commands::Pull(pull) = cli.command else {
        panic!("expected pull command");
    };
    assert_eq!(pull.port, Some(8089));
}

#[test]
fn scope_flags_build_the_filter() {
    let cli = Cli::try_parse_from([
        "kvst",
        "backup",
        "--app",
        "search",
        "--global-scope",
        "--config",
        "kv.toml",
    ])
    .unwrap();
    assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("kv.toml")));
    let Commands::Backup(backup) = cli.command else {
        panic!("expected backup command");
    };
    let filter = backup.scope.filter();
    assert_eq!(filter.app.as_deref(), Some("search"));
    assert_eq!(filter.collection, None);
    assert!(filter.global_scope);
}

#[test]
fn remote_uri_uses_https_and_port() {
    assert_eq!(remote_uri(" sh1.example.com ", 8089), "https://sh1.example.com:8089");
}

// ============================================================================
// SECTION: Logging
// ============================================================================

#[test]
fn log_filter_prefers_environment_directives() {
    let filter = resolve_filter(Some("kvstore_tools_core=debug"), LogLevel::Warn).unwrap();
    assert_eq!(filter.to_string(), "kvstore_tools_core=debug");
    let fallback = resolve_filter(Some("  "), LogLevel::Warn).unwrap();
    assert_eq!(fallback.to_string(), "warn");
}

#[test]
fn log_filter_rejects_bad_directives() {
    let err = resolve_filter(Some("kvstore_tools_core=loud"), LogLevel::Info).unwrap_err();
    assert!(err.to_string().contains("invalid KVST_LOG directives"));
}

// ============================================================================
// SECTION: Output
// ============================================================================

#[test]
fn result_writer_counts_failures() {
    let mut writer = ResultWriter::new(Vec::new());
    writer.emit(&serde_json::json!({"result": "success"}), false).unwrap();
    assert_eq!(writer.exit_code(), ExitCode::SUCCESS);
    writer.emit(&serde_json::json!({"result": "error"}), true).unwrap();
    assert_eq!(writer.errors(), 1);
    assert_eq!(writer.exit_code(), ExitCode::FAILURE);
    let lines = output_lines(writer);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["result"], "error");
}

#[test]
fn key_input_drops_blank_lines() {
    let text = commands::read_limited("k1\n\n  k2  \r\n\t\nk3".as_bytes(), "stdin").unwrap();
    assert_eq!(commands::parse_keys(&text), vec!["k1", "k2", "k3"]);
    assert!(commands::parse_keys("\n \n").is_empty());
}

// ============================================================================
// SECTION: Commands
// ============================================================================

#[test]
fn backup_then_restore_listing() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = KvToolsConfig::default();
    config.settings.default_path = dir.path().to_path_buf();
    let store = Arc::new(StubStore::new(vec!["run_kvst_all"]));
    let session = session_for(&store, config);

    let mut writer = ResultWriter::new(Vec::new());
    let args = BackupCommand {
        scope: ScopeArgs::default(),
        path: None,
        compress: false,
    };
    commands::backup(&session, &args, &mut writer).unwrap();
    assert_eq!(writer.exit_code(), ExitCode::SUCCESS);
    let lines = output_lines(writer);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["app"], "search");
    assert_eq!(lines[0]["collection"], "lookups");
    assert_eq!(lines[0]["result"], "success");
    assert_eq!(lines[0]["records"], 1);

    let files: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.is_file())
        .collect();
    assert_eq!(files.len(), 1);
    let saved: Value = serde_json::from_str(&fs::read_to_string(&files[0]).unwrap()).unwrap();
    assert_eq!(saved[0]["_key"], "k1");

    let mut writer = ResultWriter::new(Vec::new());
    let args = RestoreCommand {
        filename: None,
        append: false,
    };
    commands::restore(&session, &args, &mut writer).unwrap();
    let listing = output_lines(writer);
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0]["app"], "search");
    assert_eq!(listing[0]["collection"], "lookups");
    assert_eq!(listing[0]["compressed"], false);
}

#[test]
fn restore_reports_unmatched_pattern() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = KvToolsConfig::default();
    config.settings.default_path = dir.path().to_path_buf();
    let store = Arc::new(StubStore::new(vec!["run_kvstore_restore"]));
    let session = session_for(&store, config);

    let mut writer = ResultWriter::new(Vec::new());
    let args = RestoreCommand {
        filename: Some("nothing_here*.json".to_string()),
        append: false,
    };
    let err = commands::restore(&session, &args, &mut writer).unwrap_err();
    assert_eq!(err.to_string(), "No backup files matched nothing_here*.json");
}

#[test]
fn missing_capability_stops_before_enumeration() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = KvToolsConfig::default();
    config.settings.default_path = dir.path().to_path_buf();
    let store = Arc::new(StubStore::new(vec!["run_kvstore_restore"]));
    let session = session_for(&store, config);

    let mut writer = ResultWriter::new(Vec::new());
    let args = BackupCommand {
        scope: ScopeArgs::default(),
        path: None,
        compress: false,
    };
    assert!(commands::backup(&session, &args, &mut writer).is_err());
    let requests = store.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].contains("current-context"));
}

#[test]
fn disabled_enforcement_skips_capability_checks() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = KvToolsConfig::default();
    config.settings.default_path = dir.path().to_path_buf();
    config.authorization.enforce = false;
    let store = Arc::new(StubStore::new(Vec::new()));
    let session = session_for(&store, config);

    let mut writer = ResultWriter::new(Vec::new());
    let args = BackupCommand {
        scope: ScopeArgs::default(),
        path: None,
        compress: true,
    };
    commands::backup(&session, &args, &mut writer).unwrap();
    assert!(store.requests().iter().all(|request| !request.contains("current-context")));
    let lines = output_lines(writer);
    assert_eq!(lines[0]["result"], "success");
    let artifact = lines[0]["artifact"].as_str().unwrap();
    assert!(artifact.ends_with(".json.gz"));
}

#[test]
fn delete_key_requires_the_delete_role() {
    let mut config = KvToolsConfig::default();
    config.authorization.delete_role = Some("kv_admin".to_string());
    let store = Arc::new(StubStore::new(vec!["run_kvst_all"]));
    let session = session_for(&store, config);

    let mut writer = ResultWriter::new(Vec::new());
    let args = DeleteKeyCommand {
        collection: "lookups".to_string(),
        app: Some("search".to_string()),
        key: "k1".to_string(),
    };
    let err = commands::delete_key(&session, &args, &mut writer).unwrap_err();
    assert_eq!(err.to_string(), "User bob is unauthorized. Has the kv_admin role been granted?");
    assert!(store.requests().iter().all(|request| !request.starts_with("DELETE")));
}

#[test]
fn delete_key_without_role_requirement() {
    let store = Arc::new(StubStore::new(vec!["run_kvstore_deletekey"]));
    let session = session_for(&store, KvToolsConfig::default());

    let mut writer = ResultWriter::new(Vec::new());
    let args = DeleteKeyCommand {
        collection: "lookups".to_string(),
        app: Some("search".to_string()),
        key: "k1".to_string(),
    };
    commands::delete_key(&session, &args, &mut writer).unwrap();
    let lines = output_lines(writer);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["key"], "k1");
    assert!(store.requests().iter().any(|request| {
        request.starts_with("DELETE") && request.contains("/storage/collections/data/lookups/k1")
    }));
}

#[test]
fn disabled_retention_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StubStore::new(Vec::new()));
    let session = session_for(&store, KvToolsConfig::default());

    let mut writer = ResultWriter::new(Vec::new());
    let args = RetentionCommand {
        path: Some(dir.path().to_path_buf()),
    };
    commands::retention(&session, &args, &mut writer).unwrap();
    assert_eq!(writer.exit_code(), ExitCode::SUCCESS);
    assert!(output_lines(writer).is_empty());
    assert!(store.requests().is_empty());
}
