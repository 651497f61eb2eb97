//! git-commitx - A git subcommand that writes commit messages for staged changes.
//!
//! # Overview
//!
//! git-commitx sends the staged diff to a streaming LLM backend (Ollama,
//! OpenAI-compatible chat APIs or Anthropic), shows reasoning and the message
//! as they arrive, and falls back to a local heuristic whenever the backend
//! cannot produce a message.

pub mod commit;
pub mod config;
pub mod error;
pub mod llm;

// Re-export commonly used types
pub use commit::{ChangeSet, ChangedFile, FileStatus, MessageSource, Synthesis, Synthesizer};
pub use config::{ConfigOverrides, LlmConfig, Locale};
pub use error::{CommitError, ConfigError, SynthesisError, TransportError};
pub use llm::{LiveSink, ServiceDescriptor, ServiceRegistry, UpdateKind, WireFamily};
