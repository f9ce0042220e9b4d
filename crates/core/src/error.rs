//! Error taxonomy shared by the translators, the coordinator and collaborators.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The remote object is absent.
    #[error("not_found: {kind} {namespace}/{name}")]
    NotFound { kind: String, namespace: String, name: String },
    /// A stored identifier could not be split into namespace and name.
    #[error("malformed identifier {0:?}: expected <namespace>/<name>")]
    MalformedIdentifier(String),
    /// Target phase not reached before the deadline. `events` is the formatted
    /// diagnostics block, already folded into the display text.
    #[error("{message}{events}")]
    ConvergenceTimeout { message: String, events: String },
    /// The refresh reported an error phase or failed outright.
    #[error("{message}{events}")]
    ConvergenceObserved { message: String, events: String },
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
    #[error("payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("schema: {0}")]
    Schema(String),
}

impl ProviderError {
    pub fn not_found(kind: &str, namespace: &str, name: &str) -> Self {
        Self::NotFound { kind: kind.to_string(), namespace: namespace.to_string(), name: name.to_string() }
    }

    pub fn is_not_found(&self) -> bool { matches!(self, Self::NotFound { .. }) }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_message_is_passed_through() {
        let e: ProviderError = anyhow::anyhow!("connection refused").into();
        assert_eq!(e.to_string(), "connection refused");
        assert!(!e.is_not_found());
    }

    #[test]
    fn convergence_display_folds_events() {
        let e = ProviderError::ConvergenceTimeout {
            message: "timeout".into(),
            events: "\n\nRecent warnings:\n- FailedScheduling: no capacity".into(),
        };
        let s = e.to_string();
        assert!(s.starts_with("timeout"));
        assert!(s.contains("no capacity"));
        assert!(!e.is_not_found());
    }
}
