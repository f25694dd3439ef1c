use std::sync::{Arc, Mutex};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rust_benchrunner::client::build_client;
use rust_benchrunner::config::{Config, LogFormat, OutputFormat};
use rust_benchrunner::metrics::{gather_metrics_string, register_metrics, start_metrics_server};
use rust_benchrunner::operations::HttpExecutor;
use rust_benchrunner::report::{format_text_report, JsonReport};
use rust_benchrunner::runner::run_benchmark;
use rust_benchrunner::task::TaskExecutor;

/// Prints helpful configuration documentation.
fn print_config_help() {
    eprintln!("Required environment variables:");
    eprintln!(
        "  TARGET_URL              - Base URL of the API (must start with http:// or https://)"
    );
    eprintln!();
    eprintln!("Optional environment variables:");
    eprintln!("  TARGET_RPS              - Requests per second, positive (default: 100)");
    eprintln!("  TEST_DURATION           - Run length: 500ms, 30s, 10m, 1m30s (default: 30s)");
    eprintln!("  BENCHMARK_TYPE          - get-products, create-product, get-product-by-id,");
    eprintln!("                            update-product, delete-product, mixed-operations,");
    eprintln!("                            random-mix");
    eprintln!("                            (default: get-products)");
    eprintln!(
        "  NUM_CONCURRENT_TASKS    - Number of concurrent workers (default: 10, must be > 0)"
    );
    eprintln!("  VERBOSE                 - Detailed error samples and debug logging (default: false)");
    eprintln!("  PRODUCT_ID              - Product id used by the by-id operations (default: 1)");
    eprintln!("  REQUEST_TIMEOUT         - Per-request timeout (default: 30s)");
    eprintln!();
    eprintln!("Output configuration:");
    eprintln!("  OUTPUT_FORMAT           - text, json or both (default: both)");
    eprintln!("  LOG_FORMAT              - text or json (default: text)");
    eprintln!("  ERROR_NORMALIZATION     - none or dynamic (default: none)");
    eprintln!("  METRICS_PORT            - Serve Prometheus metrics on this port (default: off)");
    eprintln!("  METRIC_NAMESPACE        - Prometheus metric namespace (default: rust_benchrunner)");
    eprintln!();
    eprintln!("Advanced configuration:");
    eprintln!("  SKIP_TLS_VERIFY         - Skip TLS certificate verification (default: false)");
    eprintln!("  RESOLVE_TARGET_ADDR     - DNS override: hostname:ip:port");
    eprintln!("  CUSTOM_HEADERS          - Comma-separated headers (use \\, for literal commas)");
}

fn init_tracing(config: &Config) {
    let default_level = if config.spec.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration from environment variables
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}\n", e);
            print_config_help();
            std::process::exit(1);
        }
    };

    init_tracing(&config);

    // Register Prometheus metrics
    register_metrics()?;
    let registry_arc = Arc::new(Mutex::new(prometheus::default_registry().clone()));

    if let Some(metrics_port) = config.metrics_port {
        let registry = registry_arc.clone();
        tokio::spawn(async move {
            start_metrics_server(metrics_port, registry).await;
        });
    }

    config.print_summary();

    let client = build_client(&config.to_client_config())?;
    let http_executor = HttpExecutor::new(client, config.spec.target_url.clone(), config.product_id);
    info!(
        base_url = http_executor.base_url(),
        product_id = config.product_id,
        "HTTP executor ready"
    );
    let executor: Arc<dyn TaskExecutor> = Arc::new(http_executor);

    let result = run_benchmark(&config.spec, executor, config.error_normalizer).await;

    if matches!(config.output_format, OutputFormat::Text | OutputFormat::Both) {
        print!("{}", format_text_report(&result, config.spec.verbose));
    }
    if matches!(config.output_format, OutputFormat::Json | OutputFormat::Both) {
        match JsonReport::from_result(&result).to_json_string() {
            Ok(json) => {
                println!();
                println!("JSON Results:");
                println!("{}", json);
            }
            Err(e) => error!(error = %e, "Failed to serialize JSON report"),
        }
    }

    if config.spec.verbose {
        info!(
            metrics = %gather_metrics_string(&registry_arc),
            "Final metrics"
        );
    }

    Ok(())
}
