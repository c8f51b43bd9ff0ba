// secretsync-core/src/context.rs
//
// RequestContext replaces thread-local storage: every public operation
// accepts (or synthesizes) one and threads it through explicitly. No
// global mutable context exists anywhere in this crate.

use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Carries a request id and start time through a logical operation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub start_time: Instant,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            start_time: Instant::now(),
        }
    }

    /// Returns a fresh context if `ctx` is `None`, otherwise clones `ctx`.
    pub fn or_new(ctx: Option<&RequestContext>) -> Self {
        match ctx {
            Some(c) => c.clone(),
            None => Self::new(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Collects the fields needed to render a structured, greppable error
/// message and emits it with the chain preserved (the wrapped error keeps
/// its own `source()` so `is`/`downcast` style checks on the inner error
/// still work).
#[derive(Debug, Clone)]
pub struct ErrorBuilder {
    request_id: Uuid,
    operation: String,
    path: Option<String>,
    secret_name: Option<String>,
    retry_count: u32,
    duration_since_start: Duration,
}

impl ErrorBuilder {
    pub fn new(ctx: &RequestContext, operation: impl Into<String>) -> Self {
        Self {
            request_id: ctx.request_id,
            operation: operation.into(),
            path: None,
            secret_name: None,
            retry_count: 0,
            duration_since_start: ctx.elapsed(),
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn secret_name(mut self, name: impl Into<String>) -> Self {
        self.secret_name = Some(name.into());
        self
    }

    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n;
        self
    }

    /// Builds the final structured message, wrapping `cause`'s Display so
    /// the chain of context is preserved in the text, while the returned
    /// `ContextualizedError` keeps `cause` itself as `source()`.
    pub fn build<E: std::error::Error + Send + Sync + 'static>(
        self,
        message: impl Into<String>,
        cause: E,
    ) -> ContextualizedError {
        ContextualizedError {
            text: self.render(&message.into(), &cause.to_string()),
            source: Box::new(cause),
        }
    }

    /// Builds a structured message without an inner cause (e.g. for
    /// sentinel conditions synthesized by the engine itself).
    pub fn build_message(self, message: impl Into<String>) -> String {
        let message = message.into();
        self.render(&message, "")
    }

    fn render(&self, message: &str, wrapped: &str) -> String {
        let mut out = format!(
            "[req={}] operation={} ",
            self.request_id, self.operation
        );
        if let Some(p) = &self.path {
            out.push_str(&format!("path=\"{}\" ", p));
        }
        if let Some(s) = &self.secret_name {
            out.push_str(&format!("secret=\"{}\" ", s));
        }
        if self.retry_count > 0 {
            out.push_str(&format!("retries={} ", self.retry_count));
        }
        out.push_str(&format!("duration={}", format_duration(self.duration_since_start)));
        out.push_str(": ");
        out.push_str(message);
        if !wrapped.is_empty() {
            out.push_str(": ");
            out.push_str(wrapped);
        }
        out
    }
}

/// Renders a magnitude-appropriate duration: ns, µs, ms, or s.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos < 1_000 {
        format!("{}ns", nanos)
    } else if nanos < 1_000_000 {
        format!("{:.2}µs", nanos as f64 / 1_000.0)
    } else if nanos < 1_000_000_000 {
        format!("{:.2}ms", nanos as f64 / 1_000_000.0)
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}

/// An error carrying a fully-rendered structured message plus the original
/// cause as `source()`, so `matches!`/`downcast_ref` against sentinel
/// errors further down the chain keeps working.
#[derive(Debug)]
pub struct ContextualizedError {
    text: String,
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl fmt::Display for ContextualizedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl std::error::Error for ContextualizedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn format_duration_picks_units_by_magnitude() {
        assert_eq!(format_duration(Duration::from_nanos(5)), "5ns");
        assert_eq!(format_duration(Duration::from_micros(5)), "5.00µs");
        assert_eq!(format_duration(Duration::from_millis(5)), "5.00ms");
        assert_eq!(format_duration(Duration::from_secs(5)), "5.00s");
    }

    #[test]
    fn error_builder_renders_all_fields() {
        let ctx = RequestContext::new();
        let builder = ErrorBuilder::new(&ctx, "vault.list")
            .path("secret/app/a")
            .secret_name("api_key")
            .retry_count(2);
        let msg = builder.build_message("transient failure");
        assert!(msg.contains(&format!("req={}", ctx.request_id)));
        assert!(msg.contains("operation=vault.list"));
        assert!(msg.contains("path=\"secret/app/a\""));
        assert!(msg.contains("secret=\"api_key\""));
        assert!(msg.contains("retries=2"));
        assert!(msg.contains("transient failure"));
    }

    #[test]
    fn error_builder_preserves_source_chain() {
        #[derive(Debug, thiserror::Error)]
        #[error("sentinel")]
        struct Sentinel;

        let ctx = RequestContext::new();
        let err = ErrorBuilder::new(&ctx, "vault.read").build("wrapped", Sentinel);
        assert!(err.source().unwrap().downcast_ref::<Sentinel>().is_some());
    }
}
