use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use chokepoint_cli::commands::{config, doctor, export, import};
use chokepoint_core::store::{PersistedState, StateFile};
use chokepoint_core::{Bottleneck, BottleneckId, BusinessProfile, DialogState};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn config_reports_sources_and_redacts_the_api_key() {
    with_env(
        &[
            ("CHOKEPOINT_LLM_PROVIDER", "openai"),
            ("CHOKEPOINT_LLM_API_KEY", "sk-live-secret"),
            ("CHOKEPOINT_LLM_MODEL", "gpt-4o-mini"),
        ],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);

            assert!(result.output.contains(
                "- llm.provider = openai (source: env (CHOKEPOINT_LLM_PROVIDER))"
            ));
            assert!(result.output.contains("- llm.api_key = <redacted>"));
            assert!(result.output.contains("- dialog.reply_char_limit = 400 (source: default)"));
            assert!(!result.output.contains("sk-live-secret"));
        },
    );
}

#[test]
fn config_returns_validation_failure_for_hosted_provider_without_key() {
    with_env(&[("CHOKEPOINT_LLM_PROVIDER", "anthropic")], || {
        let result = config::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "config");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_passes_with_defaults_and_skips_state_check() {
    with_env(&[], || {
        let result = doctor::run(true, None);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        assert_eq!(check(&payload, "config_validation")["status"], "pass");
        assert_eq!(check(&payload, "llm_client")["status"], "pass");
        assert_eq!(check(&payload, "prompt_library")["status"], "pass");
        assert_eq!(check(&payload, "state_file")["status"], "skipped");
    });
}

#[test]
fn doctor_fails_on_invalid_config_and_unreadable_state() {
    let dir = TempDir::new().expect("tempdir");
    let state_path = dir.path().join("session.json");
    fs::write(&state_path, "{not json").expect("write");

    with_env(&[("CHOKEPOINT_LLM_PROVIDER", "openai")], || {
        let result = doctor::run(true, Some(&state_path));
        assert_eq!(result.exit_code, 3);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(check(&payload, "config_validation")["status"], "fail");
        assert_eq!(check(&payload, "llm_client")["status"], "skipped");
        assert_eq!(check(&payload, "state_file")["status"], "fail");
    });
}

#[test]
fn doctor_human_output_lists_every_check() {
    with_env(&[], || {
        let result = doctor::run(false, None);

        assert!(result.output.starts_with("doctor: all readiness checks passed"));
        assert!(result.output.contains("- [ok] prompt_library: prompt templates parsed"));
        assert!(result.output.contains("- [skip] state_file"));
    });
}

#[test]
fn export_single_bottleneck_then_import_into_fresh_session() {
    let dir = TempDir::new().expect("tempdir");
    let source = dir.path().join("source.json");
    let target = dir.path().join("target.json");
    let export_path = dir.path().join("improvement.json");
    StateFile::new(&source).save(&session()).expect("seed state");

    let exported = export::run(&source, Some("b-1"), Some(&export_path));
    assert_eq!(exported.exit_code, 0, "export failed: {}", exported.output);
    let payload = parse_payload(&exported.output);
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["path"], export_path.display().to_string());

    let file: Value =
        serde_json::from_str(&fs::read_to_string(&export_path).expect("read export")).expect("json");
    assert_eq!(file["type"], "single_bottleneck");
    assert_eq!(file["bottleneck"]["title"], "Manual invoicing");
    assert_eq!(file["dialogState"]["bottleneckId"], "b-1");

    let imported = import::run(&target, &export_path);
    assert_eq!(imported.exit_code, 0, "import failed: {}", imported.output);

    let merged = StateFile::new(&target).load().expect("load target");
    assert_eq!(merged.bottlenecks.len(), 1);
    assert!(merged.dialog_states.contains_key(&BottleneckId("b-1".to_owned())));
    assert!(merged.business_data.is_none());
}

#[test]
fn full_export_round_trips_the_session() {
    let dir = TempDir::new().expect("tempdir");
    let source = dir.path().join("source.json");
    let target = dir.path().join("target.json");
    let export_path = dir.path().join("analysis.json");
    StateFile::new(&source).save(&session()).expect("seed state");

    let exported = export::run(&source, None, Some(&export_path));
    assert_eq!(exported.exit_code, 0, "export failed: {}", exported.output);
    let imported = import::run(&target, &export_path);
    assert_eq!(imported.exit_code, 0, "import failed: {}", imported.output);

    let merged = StateFile::new(&target).load().expect("load target");
    assert_eq!(merged.bottlenecks.len(), 2);
    assert_eq!(
        merged.business_data.map(|business| business.product_description),
        Some("Accounting outsourcing".to_owned())
    );
}

#[test]
fn export_of_unknown_bottleneck_fails() {
    let dir = TempDir::new().expect("tempdir");
    let source = dir.path().join("source.json");
    StateFile::new(&source).save(&session()).expect("seed state");

    let result = export::run(&source, Some("missing"), Some(&dir.path().join("out.json")));

    assert_eq!(result.exit_code, 5);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["error_class"], "unknown_bottleneck");
    assert!(!dir.path().join("out.json").exists());
}

#[test]
fn invalid_import_leaves_state_untouched() {
    let dir = TempDir::new().expect("tempdir");
    let target = dir.path().join("target.json");
    let export_path = dir.path().join("bad.json");
    StateFile::new(&target).save(&session()).expect("seed state");
    let before = fs::read_to_string(&target).expect("read state");
    fs::write(
        &export_path,
        r#"{"type":"single_bottleneck","version":"2.0","exportedAt":"2026-01-01T00:00:00Z"}"#,
    )
    .expect("write export");

    let result = import::run(&target, &export_path);

    assert_eq!(result.exit_code, 6);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["error_class"], "invalid_export");
    assert!(payload["message"].as_str().unwrap_or_default().contains("2.0"));
    assert_eq!(fs::read_to_string(&target).expect("read state"), before);
}

#[test]
fn import_refuses_dialog_filed_under_another_bottleneck() {
    let dir = TempDir::new().expect("tempdir");
    let target = dir.path().join("target.json");
    let export_path = dir.path().join("misfiled.json");
    StateFile::new(&target).save(&session()).expect("seed state");
    let before = fs::read_to_string(&target).expect("read state");
    fs::write(
        &export_path,
        r#"{"type":"single_bottleneck","version":"1.0","exportedAt":"2026-01-01T00:00:00Z",
            "bottleneck":{"id":"b-1","title":"Manual invoicing"},
            "dialogState":{"bottleneckId":"b-OTHER","phase":"clarifying","isComplete":false}}"#,
    )
    .expect("write export");

    let result = import::run(&target, &export_path);

    assert_eq!(result.exit_code, 6);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["error_class"], "invalid_export");
    assert!(payload["message"].as_str().unwrap_or_default().contains("b-OTHER"));
    assert_eq!(fs::read_to_string(&target).expect("read state"), before);
}

fn session() -> PersistedState {
    let mut state = PersistedState::default();
    state.set_business_data(BusinessProfile {
        product_description: "Accounting outsourcing".to_owned(),
        team_size: 15,
        workflows: "monthly closing".to_owned(),
        kpis: "closing time".to_owned(),
    });
    state.replace_bottlenecks(vec![
        Bottleneck {
            title: "Manual invoicing".to_owned(),
            ..Bottleneck::blank(BottleneckId("b-1".to_owned()))
        },
        Bottleneck {
            title: "Document collection".to_owned(),
            ..Bottleneck::blank(BottleneckId("b-2".to_owned()))
        },
    ]);
    state
        .upsert_dialog_state(DialogState::new(BottleneckId("b-1".to_owned())))
        .expect("dialog state");
    state
}

fn check<'a>(payload: &'a Value, name: &str) -> &'a Value {
    payload["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .expect("check should be reported")
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CHOKEPOINT_LLM_PROVIDER",
        "CHOKEPOINT_LLM_API_KEY",
        "CHOKEPOINT_LLM_BASE_URL",
        "CHOKEPOINT_LLM_MODEL",
        "CHOKEPOINT_LLM_TIMEOUT_SECS",
        "CHOKEPOINT_LLM_MAX_TOKENS",
        "CHOKEPOINT_LLM_TEMPERATURE",
        "CHOKEPOINT_SERVER_BIND_ADDRESS",
        "CHOKEPOINT_SERVER_PORT",
        "CHOKEPOINT_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "CHOKEPOINT_DIALOG_REPLY_CHAR_LIMIT",
        "CHOKEPOINT_DIALOG_INIT_TIMEOUT_SECS",
        "CHOKEPOINT_DIALOG_MIN_QUESTION_TURNS",
        "CHOKEPOINT_DIALOG_AUTO_APPLY_SUGGESTIONS",
        "CHOKEPOINT_DIALOG_REPLY_LANGUAGE",
        "CHOKEPOINT_LOGGING_LEVEL",
        "CHOKEPOINT_LOGGING_FORMAT",
        "CHOKEPOINT_LOG_LEVEL",
        "CHOKEPOINT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
