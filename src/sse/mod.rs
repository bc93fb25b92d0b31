//! The SSE pipeline: upstream stream in, OpenAI stream (or one body) out.
//!
//! [`SseReader`] frames `data:` payloads out of the raw byte stream,
//! [`Translator`] turns upstream chunks into OpenAI chunks,
//! [`ToolAssembler`] reconstructs tool calls from positional edits, and
//! [`aggregate_stream`] folds everything into a single response for
//! non-streaming clients.

pub mod aggregate;
pub mod error;
pub mod tags;
pub mod tools;
pub mod translate;

#[cfg(test)]
mod tests;

pub use aggregate::{ResponseBuilder, aggregate_stream};
pub use error::AggregateError;
pub use tools::{ActiveToolCall, ToolAssembler, ToolEvent};
pub use translate::{StreamEvent, Translator};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::protocol::UpstreamChunk;

/// Frames `data:` payloads out of an upstream event stream.
///
/// Only `data:` lines are meaningful; comments and event names are
/// dropped. The raw byte count includes everything read, which is what the
/// aggregation cap is measured against.
pub struct SseReader {
    response: reqwest::Response,
    buffer: Vec<u8>,
    raw_bytes: usize,
    eof: bool,
}

impl SseReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: Vec::new(),
            raw_bytes: 0,
            eof: false,
        }
    }

    /// Total bytes consumed from the wire so far.
    pub fn raw_bytes(&self) -> usize {
        self.raw_bytes
    }

    /// Next `data:` payload, or `None` once the stream ends.
    pub async fn next_payload(&mut self) -> Result<Option<String>, reqwest::Error> {
        loop {
            while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                if let Some(payload) = data_payload(&line) {
                    return Ok(Some(payload));
                }
            }

            if self.eof {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let line = std::mem::take(&mut self.buffer);
                if let Some(payload) = data_payload(&line) {
                    return Ok(Some(payload));
                }
                return Ok(None);
            }

            match self.response.chunk().await? {
                Some(bytes) => {
                    self.raw_bytes += bytes.len();
                    self.buffer.extend_from_slice(&bytes);
                }
                None => self.eof = true,
            }
        }
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(line);
    let payload = text.trim().strip_prefix("data:")?.trim_start();
    if payload.is_empty() {
        None
    } else {
        Some(payload.to_string())
    }
}

/// Drives an upstream response through a translator, forwarding events
/// into `tx` until the stream ends or the receiver goes away.
///
/// A dropped receiver means the client disconnected: reading stops and
/// dropping the response tears the upstream connection down.
pub async fn pump(
    response: reqwest::Response,
    mut translator: Translator,
    tx: mpsc::Sender<StreamEvent>,
) {
    let mut reader = SseReader::new(response);

    loop {
        match reader.next_payload().await {
            Ok(Some(payload)) => {
                if payload == "[DONE]" {
                    for event in translator.finish() {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    return;
                }

                let chunk: UpstreamChunk = match serde_json::from_str(&payload) {
                    Ok(chunk) => chunk,
                    Err(error) => {
                        debug!(error = %error, "skipping undecodable SSE payload");
                        continue;
                    }
                };

                for event in translator.ingest(&chunk) {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                if translator.is_finished() {
                    return;
                }
            }
            Ok(None) => {
                for event in translator.finish() {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                return;
            }
            Err(error) => {
                warn!(error = %error, "upstream stream failed mid-flight");
                for event in translator.abort() {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                return;
            }
        }
    }
}
