// secretsync-core/src/infrastructure/config/mod.rs

pub mod pipeline;

pub use pipeline::{load_pipeline_config, MergeStoreBackend, MergeStoreConfig, PipelineConfig, RetentionConfig, SourceConfig};
