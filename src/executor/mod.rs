mod client;
mod runner;

pub use client::BqClient;
pub use runner::{expand_patterns, QueryExecutor, QueryRunner, RowSource, RunFailure, RunReport};
