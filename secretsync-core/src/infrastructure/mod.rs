// secretsync-core/src/infrastructure/mod.rs

/// Vault KV v2 adapters: `SourceReader` (recursive listing), `TargetStore`,
/// and `MergeStore`.
pub mod vault;

/// AWS adapters: Secrets Manager `TargetStore`, Organizations/Identity
/// Center discovery, S3-backed `MergeStore`.
pub mod aws;

/// Circuit breaker and retry-with-backoff, shared by every adapter.
pub mod resilience;

/// `VersionStore` layered over any `MergeStore` implementation.
pub mod version_store;

/// Pipeline configuration loading (sources, targets, dynamic generators).
pub mod config;

/// The production `TargetStoreFactory` wiring credentials, breakers, and
/// metrics into concrete AWS/Vault `TargetStore`s.
pub mod target_store_factory;

pub mod error;
pub mod fs;

pub use target_store_factory::DefaultTargetStoreFactory;
pub use version_store::LayeredVersionStore;
