//! Per-call context threaded through every service operation.

use std::fmt;
use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Ordered key/value pairs attached to every log record emitted while serving a call.
///
/// Values are cheap to extend: [`LogFields::with_field`] returns a new set and leaves the
/// original untouched, so a batch can derive one set per item from a shared parent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFields {
    fields: Vec<(&'static str, String)>,
}

impl LogFields {
    /// Creates an empty field set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of these fields with `key=value` appended.
    ///
    /// A later value for the same key shadows the earlier one when rendered.
    #[must_use]
    pub fn with_field(&self, key: &'static str, value: impl fmt::Display) -> Self {
        let mut fields: Vec<_> = self
            .fields
            .iter()
            .filter(|(k, _)| *k != key)
            .cloned()
            .collect();
        fields.push((key, value.to_string()));
        Self { fields }
    }

    /// Returns the value recorded for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for LogFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

/// Context of a single service call.
///
/// Carries the caller's log fields and a cancellation token. Cancelling the token aborts
/// in-flight data store and publisher calls and stops batch processing.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    log: LogFields,
    cancel: CancellationToken,
}

impl CallContext {
    /// Creates a context with no log fields and a fresh cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context that is cancelled together with `token`.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            log: LogFields::new(),
            cancel: token,
        }
    }

    /// Returns a copy of this context with an extra log field.
    #[must_use]
    pub fn with_field(&self, key: &'static str, value: impl fmt::Display) -> Self {
        Self {
            log: self.log.with_field(key, value),
            cancel: self.cancel.clone(),
        }
    }

    /// Returns the log fields of this call.
    pub fn log(&self) -> &LogFields {
        &self.log
    }

    /// Returns the cancellation token of this call.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns `true` once the call has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drives `fut` to completion unless the call is cancelled first.
    ///
    /// Returns `None` when cancellation won; `fut` is dropped in that case.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_render_in_insertion_order() {
        let fields = LogFields::new()
            .with_field("method", "GetBundle")
            .with_field("trust_domain_id", "example.org");
        assert_eq!(
            fields.to_string(),
            "method=GetBundle trust_domain_id=example.org"
        );
    }

    #[test]
    fn test_with_field_shadows_previous_value() {
        let parent = LogFields::new().with_field("trust_domain_id", "a.test");
        let child = parent.with_field("trust_domain_id", "b.test");

        assert_eq!(parent.get("trust_domain_id"), Some("a.test"));
        assert_eq!(child.get("trust_domain_id"), Some("b.test"));
        assert_eq!(child.to_string(), "trust_domain_id=b.test");
    }

    #[tokio::test]
    async fn test_run_completes_when_not_cancelled() {
        let ctx = CallContext::new();
        assert_eq!(ctx.run(async { 7 }).await, Some(7));
    }

    #[tokio::test]
    async fn test_run_returns_none_when_cancelled() {
        let token = CancellationToken::new();
        let ctx = CallContext::with_cancellation(token.clone());
        token.cancel();

        let out = ctx.run(std::future::pending::<()>()).await;
        assert!(out.is_none());
        assert!(ctx.is_cancelled());
    }
}
