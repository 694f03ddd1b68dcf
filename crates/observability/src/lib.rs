//! Tracing/logging setup shared by FlowForge binaries.

/// Tracing configuration (filters, formatting).
pub mod tracing;

pub use crate::tracing::{LogConfig, init};
