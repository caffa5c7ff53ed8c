use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown {kind} backend '{label}'")]
    UnknownBackend { kind: &'static str, label: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Artifact '{name}' not found in container '{container}'")]
    ArtifactMissing { container: String, name: String },

    #[error("Failed to load ontology: {0}")]
    OntologyLoad(String),

    #[error("Property graph modelling failed: {0}")]
    Model(String),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Message bus error: {0}")]
    Bus(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Ontology {0} not found")]
    OntologyNotFound(i64),

    #[error("Git webhook {0} not found")]
    GitWebhookNotFound(i64),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Coarse classification used by the acknowledgement layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad configuration. The process must not start.
    Configuration,
    /// Infrastructure hiccup. Redeliver with backoff.
    Transient,
    /// Redelivery cannot help. Dead-letter.
    Fatal,
    /// A lookup target does not exist.
    NotFound,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Transient => "transient",
            ErrorKind::Fatal => "fatal",
            ErrorKind::NotFound => "not_found",
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Config(_)
            | PipelineError::UnknownBackend { .. }
            | PipelineError::Toml(_) => ErrorKind::Configuration,
            PipelineError::Http(_)
            | PipelineError::Io(_)
            | PipelineError::Sqlite(_)
            | PipelineError::Storage(_)
            | PipelineError::ArtifactMissing { .. }
            | PipelineError::Backend(_)
            | PipelineError::Bus(_) => ErrorKind::Transient,
            PipelineError::Json(_)
            | PipelineError::OntologyLoad(_)
            | PipelineError::Model(_)
            | PipelineError::Timeout { .. }
            | PipelineError::InvalidMessage(_)
            | PipelineError::InvalidRequest(_) => ErrorKind::Fatal,
            PipelineError::OntologyNotFound(_) | PipelineError::GitWebhookNotFound(_) => {
                ErrorKind::NotFound
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub(crate) fn lock_poisoned(what: &str) -> Self {
        PipelineError::Backend(format!("{} lock poisoned", what))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_artifact_is_retryable() {
        let err = PipelineError::ArtifactMissing {
            container: "validated".into(),
            name: "1_2.owl".into(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn malformed_ontology_is_fatal() {
        let err = PipelineError::OntologyLoad("unexpected end of file".into());
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(!err.is_retryable());
    }

    #[test]
    fn unknown_backend_is_configuration() {
        let err = PipelineError::UnknownBackend {
            kind: "storage",
            label: "ftp".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.to_string(), "Unknown storage backend 'ftp'");
    }

    #[test]
    fn lookups_are_not_found() {
        assert_eq!(PipelineError::OntologyNotFound(3).kind(), ErrorKind::NotFound);
        assert_eq!(PipelineError::GitWebhookNotFound(9).kind(), ErrorKind::NotFound);
    }
}
