//! Incremental decoder for streamed backend responses.
//!
//! Chunks arrive with arbitrary boundaries. Each chunk is appended to the
//! bytes held over from the previous one and split into newline-delimited
//! fragments. Every fragment is scanned for its first `{` so that SSE
//! `data: ` prefixes and NDJSON lines go through the same path.

use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::SynthesisError;
use crate::llm::registry::WireFamily;
use crate::llm::segment::Segmenter;
use crate::llm::sink::LiveSink;

type Object = Map<String, Value>;

/// Held bytes beyond this are dropped; no single event gets near it.
pub const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Text extracted from one parsed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    /// Ordinary text channel; may contain inline `<think>` markup.
    Inline(String),
    /// Dedicated reasoning field.
    Reasoning(String),
}

enum Fragment {
    Object(Object),
    /// No `{` at all, e.g. `data: [DONE]` or `event: ping`.
    NoObject,
    Invalid(serde_json::Error),
}

fn parse_fragment(bytes: &[u8]) -> Fragment {
    let Some(start) = bytes.iter().position(|b| *b == b'{') else {
        return Fragment::NoObject;
    };
    match serde_json::from_slice::<Value>(&bytes[start..]) {
        Ok(Value::Object(map)) => Fragment::Object(map),
        Ok(_) => Fragment::NoObject,
        Err(e) => Fragment::Invalid(e),
    }
}

/// Pull the deltas for `family` out of one event.
///
/// Events that carry an error report become [`SynthesisError::Decoder`].
pub fn extract_deltas(family: WireFamily, event: &Object) -> Result<Vec<Delta>, SynthesisError> {
    if let Some(message) = error_message(event) {
        return Err(SynthesisError::Decoder(message));
    }

    let mut deltas = Vec::new();
    match family {
        WireFamily::Generate => {
            if let Some(text) = event.get("response").and_then(Value::as_str) {
                deltas.push(Delta::Inline(text.to_string()));
            }
        }
        WireFamily::ChatDelta => {
            let choice = event
                .get("choices")
                .and_then(Value::as_array)
                .and_then(|choices| choices.first());
            if let Some(choice) = choice {
                let delta = choice.get("delta");
                if let Some(text) = delta
                    .and_then(|d| d.get("reasoning_content"))
                    .and_then(Value::as_str)
                {
                    deltas.push(Delta::Reasoning(text.to_string()));
                }
                let content = delta
                    .and_then(|d| d.get("content"))
                    .or_else(|| choice.get("message").and_then(|m| m.get("content")))
                    .and_then(Value::as_str);
                if let Some(text) = content {
                    deltas.push(Delta::Inline(text.to_string()));
                }
            }
        }
        WireFamily::ContentBlock => {
            if event.get("type").and_then(Value::as_str) == Some("content_block_delta")
                && let Some(delta) = event.get("delta")
            {
                if let Some(text) = delta.get("thinking").and_then(Value::as_str) {
                    deltas.push(Delta::Reasoning(text.to_string()));
                }
                if let Some(text) = delta.get("text").and_then(Value::as_str) {
                    deltas.push(Delta::Inline(text.to_string()));
                }
            }
        }
    }
    Ok(deltas)
}

fn error_message(event: &Object) -> Option<String> {
    let is_error_event = event.get("type").and_then(Value::as_str) == Some("error");
    let error = event.get("error").filter(|e| !e.is_null());
    if error.is_none() && !is_error_event {
        return None;
    }

    let message = match error {
        Some(Value::String(s)) => s.clone(),
        Some(e) => e
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| e.to_string()),
        None => "backend reported an error".to_string(),
    };
    Some(message)
}

/// Boundaries strictly inside `start..end`, shifted to start at zero.
fn relative_boundaries(boundaries: &[usize], start: usize, end: usize) -> Vec<usize> {
    boundaries
        .iter()
        .filter(|&&b| b > start && b < end)
        .map(|&b| b - start)
        .collect()
}

/// Decode state for one synthesis session.
pub struct StreamDecoder {
    family: WireFamily,
    tail: Vec<u8>,
    /// Offsets in `tail` where a later chunk started.
    boundaries: Vec<usize>,
    segmenter: Segmenter,
}

impl StreamDecoder {
    pub fn new(family: WireFamily) -> Self {
        Self {
            family,
            tail: Vec::new(),
            boundaries: Vec::new(),
            segmenter: Segmenter::new(),
        }
    }

    pub fn family(&self) -> WireFamily {
        self.family
    }

    pub fn segmenter(&self) -> &Segmenter {
        &self.segmenter
    }

    /// Bytes held back waiting for the rest of their object.
    pub fn pending(&self) -> &[u8] {
        &self.tail
    }

    /// Process one network chunk.
    pub fn feed(&mut self, chunk: &[u8], sink: &dyn LiveSink) -> Result<(), SynthesisError> {
        let mut boundaries = std::mem::take(&mut self.boundaries);
        let mut buffer = std::mem::take(&mut self.tail);
        if !buffer.is_empty() {
            boundaries.push(buffer.len());
        }
        buffer.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let inner = relative_boundaries(&boundaries, start, end);
            self.decode_line(&buffer[start..end], &inner, sink)?;
            start = end + 1;
        }

        let rest = &buffer[start..];
        if rest.is_empty() {
            return Ok(());
        }

        // An unterminated fragment is consumed only once it is a whole object.
        // No chunk-boundary retry here: the suffix of a partial event may be a
        // nested object on its own.
        if let Fragment::Object(event) = parse_fragment(rest) {
            return self.apply(&event, sink);
        }
        if rest.len() > MAX_PENDING_BYTES {
            debug!(
                "Dropping {} held bytes without a line break or complete object",
                rest.len()
            );
            return Ok(());
        }
        self.boundaries = relative_boundaries(&boundaries, start, buffer.len());
        self.tail = rest.to_vec();
        Ok(())
    }

    /// Decode a complete line. `boundaries` are offsets in `line` where a
    /// later chunk began; an undecodable line is retried from each of them.
    fn decode_line(
        &mut self,
        line: &[u8],
        boundaries: &[usize],
        sink: &dyn LiveSink,
    ) -> Result<(), SynthesisError> {
        match parse_fragment(line) {
            Fragment::Object(event) => self.apply(&event, sink),
            Fragment::NoObject => {
                trace!("Skipping non-JSON line ({} bytes)", line.len());
                Ok(())
            }
            Fragment::Invalid(err) => {
                for &offset in boundaries {
                    if let Fragment::Object(event) = parse_fragment(&line[offset..]) {
                        debug!("Dropping {} undecodable bytes held from earlier chunks", offset);
                        return self.apply(&event, sink);
                    }
                }
                debug!("Dropping undecodable fragment ({} bytes): {}", line.len(), err);
                Ok(())
            }
        }
    }

    fn apply(&mut self, event: &Object, sink: &dyn LiveSink) -> Result<(), SynthesisError> {
        for delta in extract_deltas(self.family, event)? {
            let update = match delta {
                Delta::Inline(text) => self.segmenter.push_inline(&text),
                Delta::Reasoning(text) => self.segmenter.push_reasoning(&text),
            };
            if let Some(update) = update {
                sink.publish(&update.text, update.kind);
            }
        }
        Ok(())
    }

    /// End of stream: flush held bytes and produce the final message.
    pub fn finish(mut self, sink: &dyn LiveSink) -> Result<String, SynthesisError> {
        let tail = std::mem::take(&mut self.tail);
        let boundaries = std::mem::take(&mut self.boundaries);
        if !tail.is_empty() {
            self.decode_line(&tail, &boundaries, sink)?;
        }
        self.segmenter.finish()
    }
}
