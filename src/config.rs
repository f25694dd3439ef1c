use std::env;
use std::str::FromStr;

use thiserror::Error;
use tokio::time::Duration;

use crate::client::ClientConfig;
use crate::errors::ErrorNormalizer;
use crate::task::BenchmarkType;
use crate::utils::parse_duration_string;

/// Configuration errors. Any of these aborts start-up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable must be set")]
    Missing(&'static str),

    #[error("{field}: invalid format - {message}")]
    InvalidFormat { field: &'static str, message: String },

    #[error("{field}: value {value} must be greater than zero")]
    NotPositive { field: &'static str, value: String },

    #[error("{field}: invalid value '{value}'. Expected one of: {expected}")]
    InvalidEnum {
        field: &'static str,
        value: String,
        expected: String,
    },
}

/// Highest dispatch rate the tick timer can resolve: one task per nanosecond.
pub const MAX_DISPATCH_RATE: u32 = 1_000_000_000;

/// Immutable description of one run, shared read-only by all workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkSpec {
    pub target_url: String,
    /// Requests per second. For the CRUD cycle this counts underlying calls.
    pub rate: u32,
    pub duration: Duration,
    pub benchmark_type: BenchmarkType,
    pub concurrency: usize,
    pub verbose: bool,
}

impl BenchmarkSpec {
    /// Units of work dispatched per second.
    ///
    /// One cycle issues several calls, so the cycle rate is the configured
    /// rate divided by the calls per cycle, never below one per second.
    pub fn dispatch_rate(&self) -> u32 {
        (self.rate / self.benchmark_type.calls_per_task()).max(1)
    }

    /// Interval between two dispatched tasks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.dispatch_rate()
    }

    /// Capacity of the bounded task queue.
    pub fn queue_capacity(&self) -> usize {
        self.concurrency.max(1) * 2
    }

    /// Rejects specs the core cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url(&self.target_url)?;
        if self.rate == 0 {
            return Err(ConfigError::NotPositive {
                field: "TARGET_RPS",
                value: "0".to_string(),
            });
        }
        if self.dispatch_rate() > MAX_DISPATCH_RATE {
            return Err(ConfigError::InvalidFormat {
                field: "TARGET_RPS",
                message: format!(
                    "{} tasks per second exceeds the maximum of {}",
                    self.dispatch_rate(),
                    MAX_DISPATCH_RATE
                ),
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::NotPositive {
                field: "NUM_CONCURRENT_TASKS",
                value: "0".to_string(),
            });
        }
        if self.duration.is_zero() {
            return Err(ConfigError::NotPositive {
                field: "TEST_DURATION",
                value: format!("{:?}", self.duration),
            });
        }
        Ok(())
    }
}

/// Which report renderings the binary prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Both,
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "both" => Ok(OutputFormat::Both),
            _ => Err(ConfigError::InvalidEnum {
                field: "OUTPUT_FORMAT",
                value: s.to_string(),
                expected: "text, json, both".to_string(),
            }),
        }
    }
}

/// Log line formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::InvalidEnum {
                field: "LOG_FORMAT",
                value: s.to_string(),
                expected: "text, json".to_string(),
            }),
        }
    }
}

/// Main configuration for the benchmark binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub spec: BenchmarkSpec,
    pub product_id: i64,
    pub request_timeout: Duration,
    pub skip_tls_verify: bool,
    pub resolve_target_addr: Option<String>,
    pub custom_headers: Option<String>,
    pub error_normalizer: ErrorNormalizer,
    pub output_format: OutputFormat,
    pub log_format: LogFormat,
    pub metrics_port: Option<u16>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let target_url = env::var("TARGET_URL")
            .map_err(|_| ConfigError::Missing("TARGET_URL"))?
            .trim()
            .trim_end_matches('/')
            .to_string();

        let rate: u32 = parse_env("TARGET_RPS", "100")?;
        let duration = parse_duration_env("TEST_DURATION", "30s")?;

        let type_str = env_or("BENCHMARK_TYPE", "get-products");
        let benchmark_type =
            BenchmarkType::from_str(&type_str).map_err(|_| ConfigError::InvalidEnum {
                field: "BENCHMARK_TYPE",
                value: type_str.clone(),
                expected: BenchmarkType::all()
                    .iter()
                    .map(|t| t.label())
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;

        let concurrency: usize = parse_env("NUM_CONCURRENT_TASKS", "10")?;
        let verbose = parse_bool_env("VERBOSE");

        let spec = BenchmarkSpec {
            target_url,
            rate,
            duration,
            benchmark_type,
            concurrency,
            verbose,
        };
        spec.validate()?;

        let product_id: i64 = parse_env("PRODUCT_ID", "1")?;
        let request_timeout = parse_duration_env("REQUEST_TIMEOUT", "30s")?;

        let error_normalizer = match env_or("ERROR_NORMALIZATION", "none").to_lowercase().as_str() {
            "none" => ErrorNormalizer::Passthrough,
            "dynamic" => ErrorNormalizer::StripDynamic,
            other => {
                return Err(ConfigError::InvalidEnum {
                    field: "ERROR_NORMALIZATION",
                    value: other.to_string(),
                    expected: "none, dynamic".to_string(),
                })
            }
        };

        let output_format = OutputFormat::from_str(&env_or("OUTPUT_FORMAT", "both"))?;
        let log_format = LogFormat::from_str(&env_or("LOG_FORMAT", "text"))?;

        let metrics_port = match env::var("METRICS_PORT") {
            Ok(port) if !port.trim().is_empty() => Some(port.trim().parse::<u16>().map_err(|e| {
                ConfigError::InvalidFormat {
                    field: "METRICS_PORT",
                    message: format!("'{}': {}", port, e),
                }
            })?),
            _ => None,
        };

        Ok(Config {
            spec,
            product_id,
            request_timeout,
            skip_tls_verify: parse_bool_env("SKIP_TLS_VERIFY"),
            resolve_target_addr: env::var("RESOLVE_TARGET_ADDR").ok(),
            custom_headers: env::var("CUSTOM_HEADERS").ok(),
            error_normalizer,
            output_format,
            log_format,
            metrics_port,
        })
    }

    /// Creates a ClientConfig from this Config.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            request_timeout: self.request_timeout,
            pool_max_idle_per_host: self.spec.concurrency,
            skip_tls_verify: self.skip_tls_verify,
            resolve_target_addr: self.resolve_target_addr.clone(),
            custom_headers: self.custom_headers.clone(),
        }
    }

    /// Prints the configuration summary.
    pub fn print_summary(&self) {
        println!("Starting benchmark:");
        println!("  URL:         {}", self.spec.target_url);
        println!("  Type:        {}", self.spec.benchmark_type);
        println!("  RPS:         {}", self.spec.rate);
        if self.spec.benchmark_type.is_cycle() {
            println!(
                "  Cycles/sec:  {} ({} calls per cycle)",
                self.spec.dispatch_rate(),
                self.spec.benchmark_type.calls_per_task()
            );
        }
        println!("  Duration:    {:?}", self.spec.duration);
        println!("  Concurrency: {}", self.spec.concurrency);
        println!("  Timeout:     {:?}", self.request_timeout);
        if self.skip_tls_verify {
            println!("  Skip TLS Verify: true");
        }
        if let Some(port) = self.metrics_port {
            println!("  Metrics:     http://0.0.0.0:{}/", port);
        }
        println!();
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_bool_env(name: &str) -> bool {
    matches!(
        env_or(name, "false").trim().to_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

fn parse_env<T>(name: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env_or(name, default);
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidFormat {
        field: name,
        message: format!("'{}': {}", raw, e),
    })
}

fn parse_duration_env(name: &'static str, default: &str) -> Result<Duration, ConfigError> {
    let raw = env_or(name, default);
    parse_duration_string(&raw).map_err(|message| ConfigError::InvalidFormat {
        field: name,
        message,
    })
}

fn validate_url(url: &str) -> Result<(), ConfigError> {
    if url.is_empty() {
        return Err(ConfigError::Missing("TARGET_URL"));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::InvalidFormat {
            field: "TARGET_URL",
            message: format!("URL must start with http:// or https://, got: {}", url),
        });
    }
    if url.contains(' ') {
        return Err(ConfigError::InvalidFormat {
            field: "TARGET_URL",
            message: "URL cannot contain spaces".to_string(),
        });
    }
    Ok(())
}
