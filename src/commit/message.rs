//! Commit message synthesis and committing the index.

use futures_util::StreamExt;
use git2::{ErrorCode, Oid, Repository};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commit::diff::ChangeSet;
use crate::commit::fallback::classify;
use crate::commit::prompt::render_prompt;
use crate::config::LlmConfig;
use crate::error::{CommitError, SynthesisError};
use crate::llm::decoder::StreamDecoder;
use crate::llm::payload::{BackendRequest, Endpoint, build_payload};
use crate::llm::registry::ServiceRegistry;
use crate::llm::sink::LiveSink;
use crate::llm::transport::Transport;

/// Where a message came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSource {
    /// Generated by the named backend.
    Backend(String),
    /// Produced by the offline heuristic after the backend attempt failed.
    Fallback { reason: String },
}

/// Result of one synthesis session. Always carries a usable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub message: String,
    pub source: MessageSource,
}

impl Synthesis {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, MessageSource::Fallback { .. })
    }
}

/// Runs one backend attempt per call, falling back to [`classify`] on failure.
pub struct Synthesizer<T: Transport> {
    registry: ServiceRegistry,
    transport: T,
}

impl<T: Transport> Synthesizer<T> {
    pub fn new(transport: T) -> Self {
        Self::with_registry(transport, ServiceRegistry::global().clone())
    }

    pub fn with_registry(transport: T, registry: ServiceRegistry) -> Self {
        Self {
            registry,
            transport,
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Produce a commit message for `changes`.
    ///
    /// Any failure is reported once through `sink` and then replaced by the
    /// heuristic message; this never returns an error.
    pub async fn synthesize(
        &self,
        changes: &ChangeSet,
        config: &LlmConfig,
        sink: &dyn LiveSink,
        cancel: &CancellationToken,
    ) -> Synthesis {
        match self.attempt(changes, config, sink, cancel).await {
            Ok((message, backend)) => {
                info!("Commit message generated by {}", backend);
                Synthesis {
                    message,
                    source: MessageSource::Backend(backend),
                }
            }
            Err(err) => {
                warn!("Commit message generation failed: {}", err);
                sink.failure(&err);
                Synthesis {
                    message: classify(changes, config.locale),
                    source: MessageSource::Fallback {
                        reason: err.summary(),
                    },
                }
            }
        }
    }

    /// The backend attempt alone. Returns the message and the backend name.
    pub async fn attempt(
        &self,
        changes: &ChangeSet,
        config: &LlmConfig,
        sink: &dyn LiveSink,
        cancel: &CancellationToken,
    ) -> Result<(String, String), SynthesisError> {
        let endpoint = Endpoint::parse(&config.api_url)?;
        let descriptor = self
            .registry
            .resolve(endpoint.hostname(), config.protocol())?;

        let prompt = render_prompt(&config.prompt_template, changes);
        debug!("Prompt length: {} chars", prompt.len());
        let body = build_payload(descriptor, &config.params(), &prompt)?;
        let request = BackendRequest::new(&endpoint, descriptor, body, config.api_key());

        let mut decoder = StreamDecoder::new(descriptor.wire_family);
        let decode = async {
            let mut stream = self.transport.open(request).await?;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| SynthesisError::Decoder(e.to_string()))?;
                decoder.feed(&chunk, sink)?;
            }
            Ok::<(), SynthesisError>(())
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SynthesisError::Cancelled),
            result = decode => result?,
        }

        let message = decoder.finish(sink)?;
        Ok((message, descriptor.name.clone()))
    }
}

/// Commit the current index on HEAD with `message`.
///
/// Works on an unborn branch by creating a root commit.
pub fn commit_staged(repo: &Repository, message: &str) -> Result<Oid, CommitError> {
    let mut index = repo.index().map_err(CommitError::CommitFailed)?;
    let tree_id = index.write_tree().map_err(CommitError::CommitFailed)?;
    let tree = repo.find_tree(tree_id).map_err(CommitError::CommitFailed)?;

    let sig = repo.signature().map_err(CommitError::ConfigError)?;

    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit().map_err(CommitError::CommitFailed)?),
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => None,
        Err(e) => return Err(CommitError::CommitFailed(e)),
    };
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .map_err(CommitError::CommitFailed)
}
