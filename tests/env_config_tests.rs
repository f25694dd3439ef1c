//! Tests for loading configuration from environment variables.

use rust_benchrunner::config::{Config, ConfigError, LogFormat, OutputFormat};
use rust_benchrunner::errors::ErrorNormalizer;
use rust_benchrunner::task::BenchmarkType;
use serial_test::serial;
use std::env;
use std::time::Duration;

/// Clear all env vars that could affect config parsing.
/// Must be called at the start of every test to prevent leakage
/// from other tests (execution order is not guaranteed).
fn clean_env() {
    for var in [
        "TARGET_URL",
        "TARGET_RPS",
        "TEST_DURATION",
        "BENCHMARK_TYPE",
        "NUM_CONCURRENT_TASKS",
        "VERBOSE",
        "PRODUCT_ID",
        "REQUEST_TIMEOUT",
        "SKIP_TLS_VERIFY",
        "RESOLVE_TARGET_ADDR",
        "CUSTOM_HEADERS",
        "ERROR_NORMALIZATION",
        "OUTPUT_FORMAT",
        "LOG_FORMAT",
        "METRICS_PORT",
    ] {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_defaults_with_only_target_url() {
    clean_env();
    env::set_var("TARGET_URL", "http://api.local:8080/");

    let config = Config::from_env().unwrap();

    assert_eq!(config.spec.target_url, "http://api.local:8080");
    assert_eq!(config.spec.rate, 100);
    assert_eq!(config.spec.duration, Duration::from_secs(30));
    assert_eq!(config.spec.benchmark_type, BenchmarkType::GetProducts);
    assert_eq!(config.spec.concurrency, 10);
    assert!(!config.spec.verbose);
    assert_eq!(config.product_id, 1);
    assert_eq!(config.request_timeout, Duration::from_secs(30));
    assert_eq!(config.error_normalizer, ErrorNormalizer::Passthrough);
    assert_eq!(config.output_format, OutputFormat::Both);
    assert_eq!(config.log_format, LogFormat::Text);
    assert_eq!(config.metrics_port, None);

    clean_env();
}

#[test]
#[serial]
fn test_missing_target_url() {
    clean_env();

    assert_eq!(
        Config::from_env().unwrap_err(),
        ConfigError::Missing("TARGET_URL")
    );
}

#[test]
#[serial]
fn test_all_overrides() {
    clean_env();
    env::set_var("TARGET_URL", "https://bench.example.com");
    env::set_var("TARGET_RPS", "400");
    env::set_var("TEST_DURATION", "1m30s");
    env::set_var("BENCHMARK_TYPE", "mixed-crud");
    env::set_var("NUM_CONCURRENT_TASKS", "25");
    env::set_var("VERBOSE", "true");
    env::set_var("PRODUCT_ID", "77");
    env::set_var("REQUEST_TIMEOUT", "500ms");
    env::set_var("ERROR_NORMALIZATION", "dynamic");
    env::set_var("OUTPUT_FORMAT", "json");
    env::set_var("LOG_FORMAT", "JSON");
    env::set_var("METRICS_PORT", "9100");

    let config = Config::from_env().unwrap();

    assert_eq!(config.spec.rate, 400);
    assert_eq!(config.spec.duration, Duration::from_secs(90));
    assert_eq!(config.spec.benchmark_type, BenchmarkType::MixedOperations);
    assert_eq!(config.spec.dispatch_rate(), 100);
    assert_eq!(config.spec.concurrency, 25);
    assert_eq!(config.spec.queue_capacity(), 50);
    assert!(config.spec.verbose);
    assert_eq!(config.product_id, 77);
    assert_eq!(config.request_timeout, Duration::from_millis(500));
    assert_eq!(config.error_normalizer, ErrorNormalizer::StripDynamic);
    assert_eq!(config.output_format, OutputFormat::Json);
    assert_eq!(config.log_format, LogFormat::Json);
    assert_eq!(config.metrics_port, Some(9100));

    let client_config = config.to_client_config();
    assert_eq!(client_config.request_timeout, Duration::from_millis(500));
    assert_eq!(client_config.pool_max_idle_per_host, 25);

    clean_env();
}

#[test]
#[serial]
fn test_zero_rate_rejected() {
    clean_env();
    env::set_var("TARGET_URL", "http://localhost");
    env::set_var("TARGET_RPS", "0");

    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::NotPositive {
            field: "TARGET_RPS",
            ..
        })
    ));

    clean_env();
}

#[test]
#[serial]
fn test_rate_beyond_timer_resolution_rejected() {
    clean_env();
    env::set_var("TARGET_URL", "http://localhost");
    env::set_var("TARGET_RPS", "2000000000");

    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::InvalidFormat {
            field: "TARGET_RPS",
            ..
        })
    ));

    clean_env();
}

#[test]
#[serial]
fn test_random_mix_selected() {
    clean_env();
    env::set_var("TARGET_URL", "http://localhost");
    env::set_var("TARGET_RPS", "80");
    env::set_var("BENCHMARK_TYPE", "random-mix");

    let config = Config::from_env().unwrap();
    assert_eq!(config.spec.benchmark_type, BenchmarkType::RandomMix);
    assert_eq!(config.spec.dispatch_rate(), 80);

    clean_env();
}

#[test]
#[serial]
fn test_negative_concurrency_rejected() {
    clean_env();
    env::set_var("TARGET_URL", "http://localhost");
    env::set_var("NUM_CONCURRENT_TASKS", "-3");

    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::InvalidFormat {
            field: "NUM_CONCURRENT_TASKS",
            ..
        })
    ));

    clean_env();
}

#[test]
#[serial]
fn test_unknown_benchmark_type_lists_choices() {
    clean_env();
    env::set_var("TARGET_URL", "http://localhost");
    env::set_var("BENCHMARK_TYPE", "random");

    let err = Config::from_env().unwrap_err();
    let message = err.to_string();
    assert!(message.contains("BENCHMARK_TYPE"));
    assert!(message.contains("mixed-operations"));

    clean_env();
}

#[test]
#[serial]
fn test_bad_duration_rejected() {
    clean_env();
    env::set_var("TARGET_URL", "http://localhost");
    env::set_var("TEST_DURATION", "10 parsecs");

    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::InvalidFormat {
            field: "TEST_DURATION",
            ..
        })
    ));

    clean_env();
}

#[test]
#[serial]
fn test_url_scheme_required() {
    clean_env();
    env::set_var("TARGET_URL", "ftp://localhost");

    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::InvalidFormat {
            field: "TARGET_URL",
            ..
        })
    ));

    clean_env();
}

#[test]
#[serial]
fn test_invalid_metrics_port() {
    clean_env();
    env::set_var("TARGET_URL", "http://localhost");
    env::set_var("METRICS_PORT", "70000");

    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::InvalidFormat {
            field: "METRICS_PORT",
            ..
        })
    ));

    clean_env();
}
