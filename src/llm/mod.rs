//! Backend registry, request construction, transport and stream decoding.

pub mod decoder;
pub mod payload;
pub mod registry;
pub mod segment;
pub mod sink;
pub mod transport;

pub use decoder::StreamDecoder;
pub use payload::{BackendRequest, Endpoint, GenerationParams, build_payload};
pub use registry::{ServiceDescriptor, ServiceRegistry, WireFamily};
pub use segment::{Mode, Segmenter};
pub use sink::{LiveEvent, LiveSink, LiveUpdate, NullSink, RecordingSink, UpdateKind, WatchSink};
pub use transport::{ChunkStream, HttpTransport, Transport};
