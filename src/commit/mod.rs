//! Staged changes, prompts, fallback messages and committing.

pub mod diff;
pub mod fallback;
pub mod message;
pub mod prompt;

pub use diff::{ChangeSet, ChangedFile, FileStatus, collect_staged};
pub use fallback::classify;
pub use message::{MessageSource, Synthesis, Synthesizer, commit_staged};
pub use prompt::render_prompt;
