// secretsync-core/src/domain/source/mod.rs

pub mod spec;

pub use spec::SourceSpec;
