use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use prometheus::{
    Encoder, Gauge, Histogram, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::env;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info};

lazy_static::lazy_static! {
    pub static ref METRIC_NAMESPACE: String =
        env::var("METRIC_NAMESPACE").unwrap_or_else(|_| "rust_benchrunner".to_string());

    // === Dispatch Metrics ===

    pub static ref TASKS_DISPATCHED_TOTAL: IntCounter =
        IntCounter::with_opts(
            Opts::new("tasks_dispatched_total", "Total number of tasks placed on the queue")
                .namespace(METRIC_NAMESPACE.as_str())
        ).expect("valid tasks_dispatched_total metric");

    // === Task Metrics ===

    pub static ref TASKS_TOTAL: IntCounter =
        IntCounter::with_opts(
            Opts::new("tasks_total", "Total number of tasks taken by workers")
                .namespace(METRIC_NAMESPACE.as_str())
        ).expect("valid tasks_total metric");

    pub static ref TASKS_COMPLETED_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("tasks_completed_total", "Number of finished tasks by outcome")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["status"]  // status: success, failed
        ).expect("valid tasks_completed_total metric");

    pub static ref TASK_DURATION_SECONDS: Histogram =
        Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "task_duration_seconds",
                "Task latencies in seconds (whole cycle for cycle benchmarks)."
            ).namespace(METRIC_NAMESPACE.as_str())
        ).expect("valid task_duration_seconds metric");

    pub static ref TASKS_IN_FLIGHT: Gauge =
        Gauge::with_opts(
            Opts::new("tasks_in_flight", "Number of tasks currently executing")
                .namespace(METRIC_NAMESPACE.as_str())
        ).expect("valid tasks_in_flight metric");

    // === Error Metrics ===

    pub static ref ERRORS_BY_CATEGORY: IntCounterVec =
        IntCounterVec::new(
            Opts::new("errors_by_category_total", "Number of failed tasks by error category")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["category"]
        ).expect("valid errors_by_category_total metric");

    pub static ref HTTP_STATUS_CODES: IntCounterVec =
        IntCounterVec::new(
            Opts::new("http_status_codes_total", "Number of HTTP responses by status code")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["status_code"]
        ).expect("valid http_status_codes_total metric");
}

/// Registers all metrics with the default Prometheus registry.
pub fn register_metrics() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = prometheus::default_registry();

    registry.register(Box::new(TASKS_DISPATCHED_TOTAL.clone()))?;

    registry.register(Box::new(TASKS_TOTAL.clone()))?;
    registry.register(Box::new(TASKS_COMPLETED_TOTAL.clone()))?;
    registry.register(Box::new(TASK_DURATION_SECONDS.clone()))?;
    registry.register(Box::new(TASKS_IN_FLIGHT.clone()))?;

    registry.register(Box::new(ERRORS_BY_CATEGORY.clone()))?;
    registry.register(Box::new(HTTP_STATUS_CODES.clone()))?;

    Ok(())
}

/// Label value for a response status, or `error` when no response arrived.
pub fn status_code_label(status: Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "error".to_string(),
    }
}

fn encode(registry: &Mutex<Registry>) -> Result<Vec<u8>, prometheus::Error> {
    let metric_families = registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}

/// HTTP handler for the Prometheus metrics endpoint.
pub async fn metrics_handler(
    _req: Request<Body>,
    registry: Arc<Mutex<Registry>>,
) -> Result<Response<Body>, hyper::Error> {
    let response = match encode(&registry) {
        Ok(buffer) => {
            let mut response = Response::new(Body::from(buffer));
            if let Ok(content_type) = TextEncoder::new().format_type().parse() {
                response
                    .headers_mut()
                    .insert(hyper::header::CONTENT_TYPE, content_type);
            }
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            let mut response = Response::new(Body::from("failed to encode metrics"));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    };

    Ok(response)
}

/// Starts the Prometheus metrics HTTP server.
pub async fn start_metrics_server(port: u16, registry: Arc<Mutex<Registry>>) {
    let addr = ([0, 0, 0, 0], port).into();

    let make_svc = make_service_fn(move |_conn| {
        let registry_clone = registry.clone();
        async move {
            Ok::<_, hyper::Error>(service_fn(move |req| {
                let registry_clone_inner = registry_clone.clone();
                async move { metrics_handler(req, registry_clone_inner).await }
            }))
        }
    });

    let server = match Server::try_bind(&addr) {
        Ok(builder) => builder.serve(make_svc),
        Err(e) => {
            error!(port = port, error = %e, "Failed to bind metrics server");
            return;
        }
    };
    info!(
        port = port,
        addr = %addr,
        "Metrics server listening"
    );

    if let Err(e) = server.await {
        error!(error = %e, "Metrics server error");
    }
}

/// Gathers and encodes metrics as a string for final output.
pub fn gather_metrics_string(registry: &Arc<Mutex<Registry>>) -> String {
    match encode(registry) {
        Ok(buffer) => String::from_utf8(buffer).unwrap_or_else(|e| {
            error!(error = %e, "Metrics output is not valid UTF-8");
            String::from("# ERROR ENCODING METRICS TO UTF-8")
        }),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            String::from("# ERROR ENCODING METRICS")
        }
    }
}
