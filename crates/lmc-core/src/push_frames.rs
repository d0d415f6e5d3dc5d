use crate::events::PushEvent;
use thiserror::Error;

pub const DEFAULT_MAX_EVENT_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("line {line}: event exceeds max size: {size} > {max}")]
    Oversized { line: usize, size: usize, max: usize },
    #[error("line {line}: event decode failed: {message}")]
    Decode { line: usize, message: String },
    #[error("event encode failed: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Default)]
pub struct DecodedBatch {
    pub events: Vec<PushEvent>,
    pub errors: Vec<FrameError>,
}

pub fn encode_event(event: &PushEvent) -> Result<String, FrameError> {
    let mut line = serde_json::to_string(event).map_err(|err| FrameError::Encode(err.to_string()))?;
    line.push('\n');
    Ok(line)
}

/// Incremental decoder for a newline-delimited stream of push events.
///
/// A bad line is reported and skipped; decoding carries on with the next one.
/// Partial lines are held until their newline arrives or `finish` is called.
/// Once a partial line outgrows the limit it is reported, and everything up
/// to its newline is dropped.
pub struct PushFrameDecoder {
    max_event_bytes: usize,
    pending: Vec<u8>,
    line: usize,
    discarding: bool,
}

impl PushFrameDecoder {
    pub fn new(max_event_bytes: usize) -> Self {
        Self {
            max_event_bytes,
            pending: Vec::new(),
            line: 0,
            discarding: false,
        }
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) -> DecodedBatch {
        let mut batch = DecodedBatch::default();
        self.pending.extend_from_slice(chunk);

        while let Some(newline_idx) = self.pending.iter().position(|byte| *byte == b'\n') {
            let frame = self.pending.drain(..=newline_idx).collect::<Vec<u8>>();
            self.line += 1;
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            self.decode_line(trim_line_end(&frame), &mut batch);
        }

        if self.discarding {
            self.pending.clear();
        } else if self.pending.len() > self.max_event_bytes {
            batch.errors.push(FrameError::Oversized {
                line: self.line + 1,
                size: self.pending.len(),
                max: self.max_event_bytes,
            });
            self.pending.clear();
            self.discarding = true;
        }

        batch
    }

    pub fn finish(&mut self) -> DecodedBatch {
        let mut batch = DecodedBatch::default();
        if std::mem::take(&mut self.discarding) {
            self.pending.clear();
            return batch;
        }
        if self.pending.is_empty() {
            return batch;
        }
        let rest = std::mem::take(&mut self.pending);
        self.line += 1;
        self.decode_line(trim_line_end(&rest), &mut batch);
        batch
    }

    fn decode_line(&self, raw: &[u8], batch: &mut DecodedBatch) {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return;
        }
        if raw.len() > self.max_event_bytes {
            batch.errors.push(FrameError::Oversized {
                line: self.line,
                size: raw.len(),
                max: self.max_event_bytes,
            });
            return;
        }
        match serde_json::from_slice(raw) {
            Ok(event) => batch.events.push(event),
            Err(err) => batch.errors.push(FrameError::Decode {
                line: self.line,
                message: err.to_string(),
            }),
        }
    }
}

impl Default for PushFrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENT_BYTES)
    }
}

fn trim_line_end(mut raw: &[u8]) -> &[u8] {
    while let [rest @ .., b'\n' | b'\r'] = raw {
        raw = rest;
    }
    raw
}
