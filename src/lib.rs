pub mod client;
pub mod config;
pub mod cycle;
pub mod dispatcher;
pub mod errors;
pub mod metrics;
pub mod operations;
pub mod percentiles;
pub mod report;
pub mod result;
pub mod runner;
pub mod task;
pub mod utils;
pub mod worker;
