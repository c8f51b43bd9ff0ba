// secretsync-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use thiserror::Error;

/// The crate's top-level error. Every public operation returns
/// `Result<_, EngineError>` (or a narrower error that `?`-converts into
/// it at the boundary where it's handed to a caller outside this crate).
///
/// There is intentionally no `MergeConflict` variant anywhere in this
/// taxonomy: DeepMerge (§4.7) always resolves type conflicts by letting
/// the overlay win, it never errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    #[error("Fatal engine error: {0}")]
    Fatal(String),
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Infrastructure(InfrastructureError::Io(err))
    }
}

impl EngineError {
    /// Whether the retry layer should attempt this error again. Only
    /// `Transient` infrastructure errors are retryable; `AuthFailed` is
    /// never retried, and `CircuitOpen` fails fast by definition.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Infrastructure(InfrastructureError::Transient(_))
        )
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(
            self,
            EngineError::Infrastructure(InfrastructureError::CircuitOpen { .. })
        )
    }

    pub fn is_auth_failed(&self) -> bool {
        matches!(
            self,
            EngineError::Infrastructure(InfrastructureError::AuthFailed(_))
                | EngineError::Infrastructure(InfrastructureError::Unauthorized(_))
        )
    }

    /// The worst-of ordering used to derive the process exit code: a
    /// `Fatal`/infra error always outranks a successful-with-diffs run.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        let transient = EngineError::Infrastructure(InfrastructureError::Transient("timeout".into()));
        let auth = EngineError::Infrastructure(InfrastructureError::AuthFailed("bad token".into()));
        assert!(transient.is_retryable());
        assert!(!auth.is_retryable());
        assert!(auth.is_auth_failed());
    }
}
