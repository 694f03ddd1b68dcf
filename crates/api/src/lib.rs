//! HTTP API: edge verifier, context propagator and identity routes.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod edge;
pub mod propagation;
