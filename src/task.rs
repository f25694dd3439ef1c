//! Units of work and the executor seam.
//!
//! The dispatcher produces [`TaskDescriptor`]s, workers hand them to a
//! [`TaskExecutor`] and record the returned [`ExecutionOutcome`]. Multi-step
//! CRUD cycles are sequenced by [`crate::cycle`] over the four
//! [`CycleOperations`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;

use crate::errors::ErrorKind;

/// Number of underlying calls one CRUD cycle performs.
pub const CYCLE_STEPS: u32 = 4;

/// Operations a random-mix run draws from, one per task.
pub const RANDOM_MIX_KINDS: [BenchmarkType; 4] = [
    BenchmarkType::CreateProduct,
    BenchmarkType::GetProductById,
    BenchmarkType::UpdateProduct,
    BenchmarkType::DeleteProduct,
];

/// The closed set of operations a run can exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BenchmarkType {
    /// `GET /api/products`
    GetProducts,
    /// `POST /api/products`
    CreateProduct,
    /// `GET /api/products/{id}`
    GetProductById,
    /// `PUT /api/products/{id}`
    UpdateProduct,
    /// `DELETE /api/products/{id}`
    DeleteProduct,
    /// Create, read, update and delete one product as a single unit.
    MixedOperations,
    /// Each task is one of [`RANDOM_MIX_KINDS`], chosen at dispatch.
    RandomMix,
}

impl BenchmarkType {
    pub fn label(&self) -> &'static str {
        match self {
            BenchmarkType::GetProducts => "get-products",
            BenchmarkType::CreateProduct => "create-product",
            BenchmarkType::GetProductById => "get-product-by-id",
            BenchmarkType::UpdateProduct => "update-product",
            BenchmarkType::DeleteProduct => "delete-product",
            BenchmarkType::MixedOperations => "mixed-operations",
            BenchmarkType::RandomMix => "random-mix",
        }
    }

    pub fn all() -> Vec<BenchmarkType> {
        vec![
            BenchmarkType::GetProducts,
            BenchmarkType::CreateProduct,
            BenchmarkType::GetProductById,
            BenchmarkType::UpdateProduct,
            BenchmarkType::DeleteProduct,
            BenchmarkType::MixedOperations,
            BenchmarkType::RandomMix,
        ]
    }

    /// True for the multi-step CRUD cycle.
    pub fn is_cycle(&self) -> bool {
        matches!(self, BenchmarkType::MixedOperations)
    }

    /// The concrete kind a dispatched task carries.
    ///
    /// Random mix draws uniformly from [`RANDOM_MIX_KINDS`]; every other
    /// kind resolves to itself.
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> BenchmarkType {
        match self {
            BenchmarkType::RandomMix => {
                RANDOM_MIX_KINDS[rng.gen_range(0..RANDOM_MIX_KINDS.len())]
            }
            kind => *kind,
        }
    }

    /// Underlying calls issued per unit of work.
    pub fn calls_per_task(&self) -> u32 {
        if self.is_cycle() {
            CYCLE_STEPS
        } else {
            1
        }
    }
}

impl fmt::Display for BenchmarkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Returned when a string names no known benchmark type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown benchmark type '{0}'")]
pub struct UnknownBenchmarkType(pub String);

impl FromStr for BenchmarkType {
    type Err = UnknownBenchmarkType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "get-products" => Ok(BenchmarkType::GetProducts),
            "create-product" => Ok(BenchmarkType::CreateProduct),
            "get-product-by-id" => Ok(BenchmarkType::GetProductById),
            "update-product" => Ok(BenchmarkType::UpdateProduct),
            "delete-product" => Ok(BenchmarkType::DeleteProduct),
            "mixed-operations" | "mixed-crud" => Ok(BenchmarkType::MixedOperations),
            "random-mix" | "mixed-random" => Ok(BenchmarkType::RandomMix),
            _ => Err(UnknownBenchmarkType(s.to_string())),
        }
    }
}

/// One unit of offered work. Created by the dispatcher and consumed by
/// exactly one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDescriptor {
    /// Position in dispatch order, starting at zero.
    pub seq: u64,
    /// Never [`BenchmarkType::RandomMix`]; the dispatcher resolves it.
    pub kind: BenchmarkType,
}

impl TaskDescriptor {
    pub fn new(seq: u64, kind: BenchmarkType) -> Self {
        Self { seq, kind }
    }
}

/// A classified failure of one task (or one step of a cycle).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} [{}]: {message}", .kind.label())]
pub struct TaskFailure {
    /// Operation label such as `GET /api/products/{id}`.
    pub operation: String,
    pub kind: ErrorKind,
    pub message: String,
    pub status_code: Option<u16>,
    pub body_sample: Option<String>,
}

impl TaskFailure {
    pub fn new(operation: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            kind,
            message: message.into(),
            status_code: None,
            body_sample: None,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        if !body.trim().is_empty() {
            self.body_sample = Some(body);
        }
        self
    }
}

/// What running one [`TaskDescriptor`] produced.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub elapsed: Duration,
    pub result: Result<(), TaskFailure>,
}

impl ExecutionOutcome {
    pub fn success(elapsed: Duration) -> Self {
        Self {
            elapsed,
            result: Ok(()),
        }
    }

    pub fn failure(elapsed: Duration, failure: TaskFailure) -> Self {
        Self {
            elapsed,
            result: Err(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn failure_details(&self) -> Option<&TaskFailure> {
        self.result.as_ref().err()
    }
}

/// Performs one logical operation (simple or multi-step).
///
/// Implementations are shared by every worker and must be safe for
/// concurrent use.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &TaskDescriptor) -> ExecutionOutcome;
}

/// The four dependent calls a CRUD cycle is made of.
#[async_trait]
pub trait CycleOperations: Send + Sync {
    /// Creates an entity and returns the identifier parsed from the response.
    async fn create_and_get_id(&self) -> Result<i64, TaskFailure>;

    async fn read_by_id(&self, id: i64) -> Result<(), TaskFailure>;

    async fn update_by_id(&self, id: i64) -> Result<(), TaskFailure>;

    async fn delete_by_id(&self, id: i64) -> Result<(), TaskFailure>;
}
