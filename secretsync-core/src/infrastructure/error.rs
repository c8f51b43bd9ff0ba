// secretsync-core/src/infrastructure/error.rs

use crate::error::EngineError;
use miette::Diagnostic;
use std::time::Duration;
use thiserror::Error;

/// Errors from the adapters: Vault/AWS transport, credential problems,
/// config loading, and the breaker short-circuit.
#[derive(Error, Debug, Diagnostic)]
pub enum InfrastructureError {
    #[error("File System Error: {0}")]
    #[diagnostic(
        code(secretsync::infra::io),
        help("Check file permissions or path validity.")
    )]
    Io(#[from] std::io::Error),

    #[error("YAML Parsing Error: {0}")]
    #[diagnostic(code(secretsync::infra::yaml), help("Check your YAML syntax."))]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON Error: {0}")]
    #[diagnostic(code(secretsync::infra::json))]
    Json(#[from] serde_json::Error),

    #[error("Pipeline configuration is invalid: {0}")]
    #[diagnostic(
        code(secretsync::infra::config_invalid),
        help("Run `secretsync validate` for a detailed report.")
    )]
    ConfigInvalid(String),

    #[error("Pipeline configuration not found at '{0}'")]
    #[diagnostic(code(secretsync::infra::config_missing))]
    ConfigNotFound(String),

    #[error("Authentication failed: {0}")]
    #[diagnostic(
        code(secretsync::infra::auth_failed),
        help("Check the CredentialProvider's Vault token / AWS role configuration.")
    )]
    AuthFailed(String),

    #[error("Unauthorized (401/403): {0}")]
    #[diagnostic(code(secretsync::infra::unauthorized))]
    Unauthorized(String),

    #[error("Transient error (retryable): {0}")]
    #[diagnostic(code(secretsync::infra::transient))]
    Transient(String),

    #[error("Circuit breaker '{endpoint}' is open")]
    #[diagnostic(
        code(secretsync::infra::circuit_open),
        help("The endpoint has failed repeatedly; it will retry after its cooldown.")
    )]
    CircuitOpen { endpoint: String },

    #[error("Vault error: {0}")]
    #[diagnostic(code(secretsync::infra::vault))]
    Vault(String),

    #[error("AWS error: {0}")]
    #[diagnostic(code(secretsync::infra::aws))]
    Aws(String),
}

impl InfrastructureError {
    /// Classifies a stringified SDK/transport error: `Transient` when it
    /// looks like a retryable condition (5xx, 429/throttling, timeout,
    /// connection reset), otherwise built via `fallback` (§4.4: "retry on
    /// transport/5xx errors; do not retry on 4xx other than 429").
    pub fn classify_remote(message: impl Into<String>, fallback: impl FnOnce(String) -> InfrastructureError) -> InfrastructureError {
        let message = message.into();
        if is_transient_message(&message) {
            InfrastructureError::Transient(message)
        } else {
            fallback(message)
        }
    }
}

/// Best-effort transient classification of a stringified remote error.
/// Every AWS SDK service error and vaultrs `ClientError` carry the status
/// line in their `Display` even though the typed error variants differ
/// per service, so matching on message markers covers all of them without
/// depending on each crate's per-operation error enum.
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    const MARKERS: &[&str] = &[
        "429",
        "500",
        "502",
        "503",
        "504",
        "throttl",
        "too many requests",
        "rate exceeded",
        "rate limit",
        "timed out",
        "timeout",
        "connection reset",
        "connection refused",
        "broken pipe",
        "service unavailable",
        "internal server error",
        "temporarily unavailable",
        "slowdown",
    ];
    MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Pulls a server-provided retry-after wait hint (seconds) out of a
/// `Transient` error's message, when the underlying SDK embedded one
/// (e.g. "Retry-After: 2" or "retry after 5 seconds"). Neither the AWS
/// SDK nor vaultrs expose the raw header through their typed error
/// surface, so this works on the already-stringified message; absence of
/// a recognizable hint just falls back to the retry layer's own backoff.
pub fn retry_after_hint(err: &EngineError) -> Option<Duration> {
    let EngineError::Infrastructure(InfrastructureError::Transient(message)) = err else {
        return None;
    };
    let lower = message.to_ascii_lowercase();
    let idx = lower.find("retry-after").or_else(|| lower.find("retry after"))?;
    let digits: String = lower[idx..].chars().skip_while(|c| !c.is_ascii_digit()).take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<u64>().ok().map(Duration::from_secs)
}
