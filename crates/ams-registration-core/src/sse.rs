//! Incremental `text/event-stream` decoder.
//!
//! Bytes arrive in arbitrary chunks; [`SseDecoder::feed`] buffers partial
//! lines (including UTF-8 sequences split across chunks) and yields a
//! frame at each blank line. Comment lines (`: ping`) and frames without
//! data are dropped, so keep-alives never reach the consumer.

use serde_json::Value;
use thiserror::Error;

use crate::progress::{ProgressEvent, Stage};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid event payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event payload is not a JSON object")]
    NotObject,
}

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseFrame {
    /// Decodes the frame data as a progress event.
    ///
    /// A payload without `stage` takes it from the `event:` name or, for
    /// the handshake `{"status":"connected"}`, becomes `connected`.
    pub fn progress_event(&self) -> Result<ProgressEvent, DecodeError> {
        let mut value: Value = serde_json::from_str(&self.data)?;
        let obj = value.as_object_mut().ok_or(DecodeError::NotObject)?;

        if !obj.contains_key("stage") {
            let named = self
                .event
                .as_deref()
                .filter(|e| !e.eq_ignore_ascii_case("message"));
            let stage = match named {
                Some(name) => Stage::parse(name),
                None if obj.get("status").and_then(Value::as_str) == Some("connected") => {
                    Stage::Connected
                }
                None => Stage::Other("message".to_string()),
            };
            obj.insert("stage".into(), Value::String(stage.as_str().to_string()));
        }

        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a trailing frame when the stream ends without a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            if let Some(frame) = self.process_line(&line) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data).join("\n");
        let id = self.id.take();
        if data.is_empty() {
            return None;
        }
        Some(SseFrame { event, data, id })
    }
}
