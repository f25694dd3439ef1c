//! HTTP task executor for the products API.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::cycle::run_cycle;
use crate::errors::ErrorKind;
use crate::metrics::{status_code_label, HTTP_STATUS_CODES};
use crate::task::{
    BenchmarkType, CycleOperations, ExecutionOutcome, TaskDescriptor, TaskExecutor, TaskFailure,
};

const PRODUCTS_PATH: &str = "/api/products";

/// Product payload sent on create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub quantity: i32,
}

impl Product {
    /// Payload for `POST /api/products`.
    pub fn for_create() -> Self {
        Self {
            id: None,
            name: "Benchmark Product".to_string(),
            description: "Created by benchmark tool".to_string(),
            price: 99.99,
            quantity: 100,
        }
    }

    /// Payload for `PUT /api/products/{id}`.
    pub fn for_update(id: i64) -> Self {
        Self {
            id: Some(id),
            name: "Updated Product".to_string(),
            description: "Updated by benchmark tool".to_string(),
            price: 149.99,
            quantity: 200,
        }
    }
}

/// Only the identifier is needed from a create response.
#[derive(Debug, Deserialize)]
struct CreatedProduct {
    #[serde(alias = "ID")]
    id: i64,
}

struct CallResponse {
    status: u16,
    body: String,
}

/// Which statuses count as a passing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusRule {
    /// The API answered without a server error (below 500).
    Reached,
    /// The call did what it asked for (2xx).
    Succeeded,
}

impl StatusRule {
    fn passes(self, status: u16) -> bool {
        match self {
            StatusRule::Reached => status < 500,
            StatusRule::Succeeded => (200..300).contains(&status),
        }
    }
}

/// Executes benchmark tasks as HTTP calls against `base_url`.
///
/// Simple operations on a single product use the fixed `product_id` and pass
/// on any status below 500. The CRUD cycle works on the id returned by its
/// own create call and requires 2xx from every step.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
    base_url: String,
    product_id: i64,
}

impl HttpExecutor {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, product_id: i64) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            product_id,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Label for `kind` with the path id kept as a template.
    pub fn operation_label(kind: BenchmarkType) -> &'static str {
        match kind {
            BenchmarkType::GetProducts => "GET /api/products",
            BenchmarkType::CreateProduct => "POST /api/products",
            BenchmarkType::GetProductById => "GET /api/products/{id}",
            BenchmarkType::UpdateProduct => "PUT /api/products/{id}",
            BenchmarkType::DeleteProduct => "DELETE /api/products/{id}",
            BenchmarkType::MixedOperations => crate::cycle::CYCLE_OPERATION,
            BenchmarkType::RandomMix => "random mix",
        }
    }

    /// Sends one request and reads the full body.
    ///
    /// Transport failures become a classified [`TaskFailure`]; any HTTP
    /// status is returned to the caller to judge.
    async fn send(
        &self,
        method: Method,
        path: &str,
        operation: &str,
        payload: Option<&Product>,
    ) -> Result<CallResponse, TaskFailure> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, &url);
        if let Some(product) = payload {
            request = request.json(product);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                HTTP_STATUS_CODES
                    .with_label_values(&[&status_code_label(None)])
                    .inc();
                let kind = ErrorKind::from_reqwest_error(&e);
                // Dynamic ids in the URL would otherwise split error classes.
                return Err(TaskFailure::new(
                    operation,
                    kind,
                    e.without_url().to_string(),
                ));
            }
        };

        let status = response.status().as_u16();
        HTTP_STATUS_CODES
            .with_label_values(&[&status_code_label(Some(status))])
            .inc();

        let body = response.text().await.map_err(|e| {
            TaskFailure::new(
                operation,
                ErrorKind::from_reqwest_error(&e),
                e.without_url().to_string(),
            )
            .with_status(status)
        })?;

        trace!(operation, status, body_len = body.len(), "Response received");
        Ok(CallResponse { status, body })
    }

    /// One call judged by `rule`. A failing status is classified from the
    /// status code and keeps the response body as a sample.
    async fn call(
        &self,
        kind: BenchmarkType,
        method: Method,
        path: &str,
        payload: Option<&Product>,
        rule: StatusRule,
    ) -> Result<CallResponse, TaskFailure> {
        let operation = Self::operation_label(kind);
        let response = self.send(method, path, operation, payload).await?;

        if !rule.passes(response.status) {
            let status = response.status;
            let error_kind = ErrorKind::from_status_code(status).unwrap_or(ErrorKind::OtherError);
            let message = if error_kind == ErrorKind::ServerError {
                format!("server error: {}", status)
            } else {
                format!("unexpected status: {}", status)
            };
            return Err(TaskFailure::new(operation, error_kind, message)
                .with_status(status)
                .with_body(response.body));
        }
        Ok(response)
    }

    async fn reach(
        &self,
        kind: BenchmarkType,
        method: Method,
        path: &str,
        payload: Option<&Product>,
    ) -> Result<(), TaskFailure> {
        self.call(kind, method, path, payload, StatusRule::Reached)
            .await
            .map(|_| ())
    }

    async fn succeed(
        &self,
        kind: BenchmarkType,
        method: Method,
        path: &str,
        payload: Option<&Product>,
    ) -> Result<(), TaskFailure> {
        self.call(kind, method, path, payload, StatusRule::Succeeded)
            .await
            .map(|_| ())
    }

    fn product_path(id: i64) -> String {
        format!("{}/{}", PRODUCTS_PATH, id)
    }

    pub async fn get_products(&self) -> Result<(), TaskFailure> {
        self.reach(BenchmarkType::GetProducts, Method::GET, PRODUCTS_PATH, None)
            .await
    }

    pub async fn create_product(&self) -> Result<(), TaskFailure> {
        let product = Product::for_create();
        self.reach(
            BenchmarkType::CreateProduct,
            Method::POST,
            PRODUCTS_PATH,
            Some(&product),
        )
        .await
    }

    pub async fn get_product_by_id(&self, id: i64) -> Result<(), TaskFailure> {
        self.reach(
            BenchmarkType::GetProductById,
            Method::GET,
            &Self::product_path(id),
            None,
        )
        .await
    }

    pub async fn update_product(&self, id: i64) -> Result<(), TaskFailure> {
        let product = Product::for_update(id);
        self.reach(
            BenchmarkType::UpdateProduct,
            Method::PUT,
            &Self::product_path(id),
            Some(&product),
        )
        .await
    }

    pub async fn delete_product(&self, id: i64) -> Result<(), TaskFailure> {
        self.reach(
            BenchmarkType::DeleteProduct,
            Method::DELETE,
            &Self::product_path(id),
            None,
        )
        .await
    }
}

#[async_trait]
impl TaskExecutor for HttpExecutor {
    async fn execute(&self, task: &TaskDescriptor) -> ExecutionOutcome {
        let start = Instant::now();
        let result = match task.kind {
            BenchmarkType::MixedOperations => return run_cycle(self).await,
            BenchmarkType::GetProducts => self.get_products().await,
            BenchmarkType::CreateProduct => self.create_product().await,
            BenchmarkType::GetProductById => self.get_product_by_id(self.product_id).await,
            BenchmarkType::UpdateProduct => self.update_product(self.product_id).await,
            BenchmarkType::DeleteProduct => self.delete_product(self.product_id).await,
            BenchmarkType::RandomMix => Err(TaskFailure::new(
                Self::operation_label(task.kind),
                ErrorKind::OtherError,
                "random-mix task was not resolved to an operation at dispatch",
            )),
        };
        ExecutionOutcome {
            elapsed: start.elapsed(),
            result,
        }
    }
}

#[async_trait]
impl CycleOperations for HttpExecutor {
    async fn create_and_get_id(&self) -> Result<i64, TaskFailure> {
        let operation = Self::operation_label(BenchmarkType::CreateProduct);
        let product = Product::for_create();
        let response = self
            .call(
                BenchmarkType::CreateProduct,
                Method::POST,
                PRODUCTS_PATH,
                Some(&product),
                StatusRule::Succeeded,
            )
            .await?;

        match serde_json::from_str::<CreatedProduct>(&response.body) {
            Ok(created) => Ok(created.id),
            Err(e) => Err(TaskFailure::new(
                operation,
                ErrorKind::DecodeError,
                format!("failed to parse created product: {}", e),
            )
            .with_status(response.status)
            .with_body(response.body)),
        }
    }

    async fn read_by_id(&self, id: i64) -> Result<(), TaskFailure> {
        self.succeed(
            BenchmarkType::GetProductById,
            Method::GET,
            &Self::product_path(id),
            None,
        )
        .await
    }

    async fn update_by_id(&self, id: i64) -> Result<(), TaskFailure> {
        let product = Product::for_update(id);
        self.succeed(
            BenchmarkType::UpdateProduct,
            Method::PUT,
            &Self::product_path(id),
            Some(&product),
        )
        .await
    }

    async fn delete_by_id(&self, id: i64) -> Result<(), TaskFailure> {
        self.succeed(
            BenchmarkType::DeleteProduct,
            Method::DELETE,
            &Self::product_path(id),
            None,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_payload_omits_id() {
        let json = serde_json::to_value(Product::for_create()).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["name"], "Benchmark Product");
        assert_eq!(json["quantity"], 100);
    }

    #[test]
    fn test_update_payload_carries_id() {
        let json = serde_json::to_value(Product::for_update(42)).unwrap();
        assert_eq!(json["id"], 42);
        assert_eq!(json["price"], 149.99);
    }

    #[test]
    fn test_created_product_accepts_either_id_casing() {
        let lower: CreatedProduct = serde_json::from_str(r#"{"id": 5, "name": "x"}"#).unwrap();
        let upper: CreatedProduct = serde_json::from_str(r#"{"ID": 6, "Name": "x"}"#).unwrap();
        assert_eq!(lower.id, 5);
        assert_eq!(upper.id, 6);
        assert!(serde_json::from_str::<CreatedProduct>(r#"{"name": "x"}"#).is_err());
    }

    #[test]
    fn test_operation_labels_use_path_templates() {
        assert_eq!(
            HttpExecutor::operation_label(BenchmarkType::UpdateProduct),
            "PUT /api/products/{id}"
        );
        assert_eq!(
            HttpExecutor::operation_label(BenchmarkType::MixedOperations),
            "CRUD cycle"
        );
    }

    #[test]
    fn test_status_rules() {
        assert!(StatusRule::Reached.passes(404));
        assert!(!StatusRule::Reached.passes(503));
        assert!(StatusRule::Succeeded.passes(204));
        assert!(!StatusRule::Succeeded.passes(404));
        assert!(!StatusRule::Succeeded.passes(301));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let executor = HttpExecutor::new(reqwest::Client::new(), "http://localhost:8080/", 1);
        assert_eq!(executor.base_url(), "http://localhost:8080");
    }
}
