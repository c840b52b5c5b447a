use std::env;
use std::sync::{Mutex, OnceLock};

use priceye_cli::commands::{apply, doctor, migrate, seed, tick};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("PRICEYE_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_reports_connectivity_failure_with_distinct_exit_code() {
    with_env(
        &[
            ("PRICEYE_DATABASE_URL", "sqlite:///definitely/not/a/real/dir/priceye.db"),
            ("PRICEYE_DATABASE_TIMEOUT_SECS", "1"),
        ],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 4, "expected db connectivity failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "db_connectivity");
        },
    );
}

#[test]
fn seed_populates_the_demo_tenant() {
    with_env(
        &[
            ("PRICEYE_DATABASE_URL", "sqlite::memory:"),
            ("PRICEYE_DATABASE_MAX_CONNECTIONS", "1"),
        ],
        || {
            let result = seed::run();
            assert_eq!(result.exit_code, 0, "expected successful seed run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "seed");
            assert_eq!(payload["status"], "ok");
            assert_eq!(payload["details"]["tenant_id"], "T-DEMO");
            assert!(payload["details"]["properties"].as_u64().unwrap_or(0) > 0);
        },
    );
}

#[test]
fn doctor_json_passes_with_memory_database_and_ollama() {
    with_env(
        &[
            ("PRICEYE_DATABASE_URL", "sqlite::memory:"),
            ("PRICEYE_LLM_PROVIDER", "ollama"),
        ],
        || {
            let output = doctor::run(true);
            let payload = parse_payload(&output);
            assert_eq!(payload["overall_status"], "pass");

            let checks = payload["checks"].as_array().expect("checks array");
            assert!(checks.iter().any(|check| check["name"] == "database_connectivity"
                && check["status"] == "pass"));
        },
    );
}

#[test]
fn apply_rejects_malformed_entity_syntax() {
    with_env(&[("PRICEYE_DATABASE_URL", "sqlite::memory:")], || {
        let result = apply::run("T-1", "P-1", false);
        assert_eq!(result.exit_code, 6, "expected input validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "input_invalid");
    });
}

#[test]
fn apply_on_an_unknown_property_is_an_input_error() {
    with_env(
        &[
            ("PRICEYE_DATABASE_URL", "sqlite::memory:"),
            ("PRICEYE_DATABASE_MAX_CONNECTIONS", "1"),
        ],
        || {
            let result = apply::run("T-1", "property:P-404", false);
            assert_eq!(result.exit_code, 6, "expected input validation failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "apply");
            assert_eq!(payload["error_class"], "input_invalid");
        },
    );
}

#[test]
fn tick_with_no_tenants_is_an_empty_success() {
    with_env(
        &[
            ("PRICEYE_DATABASE_URL", "sqlite::memory:"),
            ("PRICEYE_DATABASE_MAX_CONNECTIONS", "1"),
        ],
        || {
            let result = tick::run(None, false);
            assert_eq!(result.exit_code, 0, "expected empty tick success");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "tick");
            assert_eq!(payload["status"], "ok");
            assert_eq!(payload["details"].as_array().map(Vec::len), Some(0));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "PRICEYE_DATABASE_URL",
        "PRICEYE_DATABASE_MAX_CONNECTIONS",
        "PRICEYE_DATABASE_TIMEOUT_SECS",
        "PRICEYE_LLM_PROVIDER",
        "PRICEYE_LLM_API_KEY",
        "PRICEYE_LLM_BASE_URL",
        "PRICEYE_LLM_MODEL",
        "PRICEYE_LLM_TIMEOUT_SECS",
        "PRICEYE_ENGINE_HORIZON_DAYS",
        "PRICEYE_ENGINE_TICK_HOUR",
        "PRICEYE_ARTIFACT_STORE_DIR",
        "PRICEYE_SERVER_BIND_ADDRESS",
        "PRICEYE_SERVER_PORT",
        "PRICEYE_LOGGING_LEVEL",
        "PRICEYE_LOGGING_FORMAT",
        "PRICEYE_LOG_LEVEL",
        "PRICEYE_LOG_FORMAT",
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
