//! Shared service plumbing for otpgate: env config, tracing, health checks,
//! request ids, readiness mapping and serde helpers.

pub mod config;
pub mod health;
pub mod middleware;
pub mod serde;
pub mod tracing;
