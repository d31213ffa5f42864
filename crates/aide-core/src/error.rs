use thiserror::Error;

#[derive(Debug, Error)]
pub enum AideError {
    #[error("vault not initialized at {0}: run 'aide init'")]
    NotInitialized(String),

    #[error("plan not found: {0}")]
    PlanNotFound(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("malformed header in {file}: {reason}")]
    MalformedHeader { file: String, reason: String },

    #[error("unknown {what} '{value}'")]
    UnknownVariant { what: &'static str, value: String },

    #[error("plan generation failed: {0}")]
    Generation(String),

    #[error("plan execution failed: {0}")]
    Execution(String),

    #[error("timed out after {secs}s: {what}")]
    Timeout { what: String, secs: u64 },

    /// A channel error worth retrying on the next cycle.
    #[error("transient channel error: {0}")]
    Transient(String),

    /// A channel error the process cannot recover from on its own.
    #[error("fatal watcher error: {0}")]
    Fatal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl AideError {
    /// Whether a watcher or generator should retry on its next cycle instead
    /// of treating this as fatal.
    pub fn is_transient(&self) -> bool {
        match self {
            AideError::Transient(_) | AideError::Timeout { .. } | AideError::Io(_) => true,
            AideError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AideError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(AideError::Transient("rate limited".into()).is_transient());
        assert!(AideError::Timeout {
            what: "imap".into(),
            secs: 5
        }
        .is_transient());
        assert!(!AideError::Fatal("bad credentials".into()).is_transient());
        assert!(!AideError::Generation("empty".into()).is_transient());
    }
}
