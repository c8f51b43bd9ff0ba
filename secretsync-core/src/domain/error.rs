// secretsync-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised by pure domain logic: path validation, the dependency
/// graph, the source reader's cap enforcement, and internal invariant
/// checks.
///
/// `MergeConflict` does not appear here by design: DeepMerge (§4.7)
/// resolves every type conflict deterministically rather than erroring.
#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error("Invalid secret path: {0}")]
    #[diagnostic(
        code(secretsync::domain::path_invalid),
        help("Paths must not contain '..', NUL bytes, or empty segments.")
    )]
    PathInvalid(String),

    #[error("Source exceeded its configured cap of {max} secrets")]
    #[diagnostic(
        code(secretsync::domain::cap_exceeded),
        help("Raise SourceSpec.max_secrets or narrow the mount root.")
    )]
    CapExceeded { max: usize },

    #[error("Circular dependency detected among targets: {}", .0.join(" -> "))]
    #[diagnostic(
        code(secretsync::domain::cyclic_dependency),
        help("Break the `inherits`/`imports` cycle named above.")
    )]
    CyclicDependency(Vec<String>),

    #[error("Internal consistency violation: {0}")]
    #[diagnostic(code(secretsync::domain::consistency))]
    ConsistencyError(String),

    #[error("Target '{0}' not found")]
    #[diagnostic(code(secretsync::domain::target_not_found))]
    TargetNotFound(String),

    #[error("MergeStream '{0}' not found")]
    #[diagnostic(code(secretsync::domain::stream_not_found))]
    StreamNotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cyclic_dependency_names_every_node() {
        let err = DomainError::CyclicDependency(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(
            err.to_string(),
            "Circular dependency detected among targets: a -> b -> a"
        );
    }
}
