// secretsync-core/src/application/mod.rs
//
// Use-case orchestration: Phase M, Phase S, and the top-level pipeline
// that drives both across the target dependency graph. Depends only on
// `ports` traits and `domain` types, never on a concrete infrastructure
// adapter.

pub mod merge_phase;
pub mod pipeline;
pub mod sync_phase;

pub use merge_phase::{flatten_stream, run_merge_phase, StreamTable};
pub use pipeline::{run_pipeline, PipelineContext, PipelineOutcome, TargetFailure};
pub use sync_phase::{rollback_one_path, sync_one_target};
