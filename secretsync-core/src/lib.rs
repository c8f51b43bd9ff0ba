// secretsync-core/src/lib.rs

#![allow(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::perf)]

// --- HEXAGONAL MODULES ---

/// Ports (interfaces/traits): what the engine needs from the outside world.
pub mod ports;

/// Domain: the core business rules. Depends on nothing else.
pub mod domain;

/// Infrastructure (adapters): Vault/AWS/S3 implementations of the ports.
/// Depends on domain and ports.
pub mod infrastructure;

/// Application (use cases): the Merge/Sync pipeline orchestrator.
/// Depends on domain, infra and ports.
pub mod application;

/// Request-scoped context and structured error formatting, threaded through
/// every public operation.
pub mod context;

/// Pure in-memory metrics model (counters/histograms/gauges).
pub mod metrics;

// --- TOP-LEVEL ERROR ---
pub mod error;

pub use error::EngineError;
