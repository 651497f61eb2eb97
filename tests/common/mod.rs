//! Shared test utilities for integration tests.
//!
//! Not all functions are used by every test file, but they're shared across tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;
use git2::{Oid, Repository, Signature};

use git_commitx::error::TransportError;
use git_commitx::llm::{BackendRequest, ChunkStream, NullSink, StreamDecoder, Transport, WireFamily};
use git_commitx::SynthesisError;

/// Get the path to test fixtures directory.
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Read a recorded response body.
pub fn stream_fixture(name: &str) -> Vec<u8> {
    let path = fixtures_dir().join("streams").join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("Failed to read fixture {:?}: {}", path, e))
}

/// Split `body` into pieces of `size` bytes (the last may be shorter).
pub fn split_every(body: &[u8], size: usize) -> Vec<Vec<u8>> {
    body.chunks(size.max(1)).map(<[u8]>::to_vec).collect()
}

/// Split `body` at the given byte offsets.
pub fn split_at(body: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for &cut in cuts {
        let cut = cut.clamp(start, body.len());
        pieces.push(body[start..cut].to_vec());
        start = cut;
    }
    pieces.push(body[start..].to_vec());
    pieces
}

/// Run a whole body through a fresh decoder, chunk by chunk.
pub fn decode_chunks(family: WireFamily, chunks: &[Vec<u8>]) -> Result<String, SynthesisError> {
    let mut decoder = StreamDecoder::new(family);
    for chunk in chunks {
        decoder.feed(chunk, &NullSink)?;
    }
    decoder.finish(&NullSink)
}

/// One scripted step of a response body.
#[derive(Debug, Clone)]
pub enum Step {
    Chunk(Vec<u8>),
    Fail(String),
}

/// Transport that replays a fixed script and records every request.
pub struct ScriptedTransport {
    open_error: Mutex<Option<TransportError>>,
    steps: Vec<Step>,
    requests: Mutex<Vec<BackendRequest>>,
}

impl ScriptedTransport {
    pub fn chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self::steps(chunks.into_iter().map(Step::Chunk).collect())
    }

    pub fn steps(steps: Vec<Step>) -> Self {
        Self {
            open_error: Mutex::new(None),
            steps,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail when the request is opened.
    pub fn failing(error: TransportError) -> Self {
        Self {
            open_error: Mutex::new(Some(error)),
            steps: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Lets a test keep the transport and inspect its requests afterwards.
#[async_trait]
impl Transport for &ScriptedTransport {
    async fn open(&self, request: BackendRequest) -> Result<ChunkStream, TransportError> {
        (**self).open(request).await
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, request: BackendRequest) -> Result<ChunkStream, TransportError> {
        self.requests.lock().unwrap().push(request);
        if let Some(error) = self.open_error.lock().unwrap().take() {
            return Err(error);
        }

        let items: Vec<Result<Bytes, TransportError>> = self
            .steps
            .iter()
            .map(|step| match step {
                Step::Chunk(bytes) => Ok(Bytes::from(bytes.clone())),
                Step::Fail(message) => Err(TransportError::Other(message.clone())),
            })
            .collect();
        Ok(stream::iter(items).boxed())
    }
}

/// A test git repository builder for integration tests.
pub struct TestRepo {
    pub dir: tempfile::TempDir,
    pub repo: Repository,
}

impl TestRepo {
    /// Create a new empty git repository with a committer identity.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let repo = Repository::init(dir.path()).expect("Failed to init git repo");
        {
            let mut config = repo.config().expect("Failed to open repo config");
            config.set_str("user.name", "Test User").expect("Failed to set user.name");
            config
                .set_str("user.email", "test@example.com")
                .expect("Failed to set user.email");
        }
        Self { dir, repo }
    }

    fn signature(&self) -> Signature<'_> {
        Signature::now("Test User", "test@example.com").expect("Failed to create signature")
    }

    /// Write `content` to `name` and stage it.
    pub fn stage_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        let mut index = self.repo.index().expect("Failed to get index");
        index.add_path(Path::new(name)).expect("Failed to add file");
        index.write().expect("Failed to write index");
    }

    /// Delete `name` from the working tree and the index.
    pub fn stage_removal(&self, name: &str) {
        std::fs::remove_file(self.dir.path().join(name)).expect("Failed to delete file");
        let mut index = self.repo.index().expect("Failed to get index");
        index.remove_path(Path::new(name)).expect("Failed to remove file");
        index.write().expect("Failed to write index");
    }

    /// Commit whatever is staged. Returns the commit OID.
    pub fn commit(&self, message: &str) -> Oid {
        let sig = self.signature();
        let mut index = self.repo.index().expect("Failed to get index");
        let tree_id = index.write_tree().expect("Failed to write tree");
        let tree = self.repo.find_tree(tree_id).expect("Failed to find tree");

        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .expect("Failed to create commit")
    }
}
