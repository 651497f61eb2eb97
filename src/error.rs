//! Error types for git-commitx modules using thiserror.

use thiserror::Error;

/// Errors from the HTTP transport that carries backend requests.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to send request to {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Backend rejected the API key (HTTP 401). Set it with: git config --global commit-message-generator.llm.api-key <KEY>")]
    Unauthorized,

    #[error("Backend returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Response stream failed: {0}")]
    Stream(#[source] reqwest::Error),

    #[error("Transport failed: {0}")]
    Other(String),
}

/// Errors from one remote commit message synthesis attempt.
///
/// Every variant sends the orchestrator to the heuristic fallback.
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("Invalid API URL '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("No backend matches host '{0}'. Set commit-message-generator.llm.protocol to ollama, openai or anthropic")]
    UnknownBackend(String),

    #[error("Failed to build request payload: {0}")]
    PayloadBuild(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Backend stream failed: {0}")]
    Decoder(String),

    #[error("Backend stream ended without a commit message")]
    EmptyResponse,

    #[error("Generation was cancelled")]
    Cancelled,
}

impl SynthesisError {
    /// Short one-line description for the failure notice.
    pub fn summary(&self) -> String {
        match self {
            SynthesisError::InvalidEndpoint { url, .. } => format!("Invalid API URL '{}'", url),
            SynthesisError::UnknownBackend(host) => format!("Unknown backend '{}'", host),
            SynthesisError::PayloadBuild(_) => "Invalid generation parameters".to_string(),
            SynthesisError::Transport(TransportError::Unauthorized) => {
                "Backend rejected the API key".to_string()
            }
            SynthesisError::Transport(TransportError::Status { code, .. }) => {
                format!("Backend returned HTTP {}", code)
            }
            SynthesisError::Transport(_) => "Could not reach the backend".to_string(),
            SynthesisError::Decoder(_) => "Backend stream failed".to_string(),
            SynthesisError::EmptyResponse => "Backend returned no message".to_string(),
            SynthesisError::Cancelled => "Cancelled".to_string(),
        }
    }
}

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to open git config: {0}")]
    Open(#[source] git2::Error),

    #[error("Failed to read {key} from git config: {source}")]
    Read {
        key: String,
        #[source]
        source: git2::Error,
    },

    #[error("Invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("Failed to save {key} to git config: {source}")]
    Save {
        key: String,
        #[source]
        source: git2::Error,
    },
}

/// Errors from collecting staged changes and committing.
#[derive(Error, Debug)]
pub enum CommitError {
    #[error("No staged changes (use git add first)")]
    NoChanges,

    #[error("Failed to collect diff: {0}")]
    DiffFailed(#[source] git2::Error),

    #[error("Failed to create commit: {0}")]
    CommitFailed(#[source] git2::Error),

    #[error("Git config error (missing user.name or user.email): {0}")]
    ConfigError(#[source] git2::Error),
}
