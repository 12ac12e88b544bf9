//! Incremental decoder for `data:`-prefixed completion streams.
//!
//! Bytes arrive in arbitrary chunks. Output is the same no matter where the
//! chunk boundaries fall, including in the middle of a UTF-8 sequence.

use smallvec::SmallVec;

use super::types::ChatCompletionChunk;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    Delta(String),
    Done,
}

pub type DecodeEvents = SmallVec<[DecodeEvent; 4]>;

#[derive(Debug, Default)]
pub struct StreamDecoder {
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending_bytes: Vec<u8>,
    /// Text after the last line terminator.
    carry: String,
    finished: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> DecodeEvents {
        let mut events = DecodeEvents::new();
        if self.finished {
            return events;
        }

        let text = self.decode_utf8(chunk);
        self.carry.push_str(&text);

        let mut start = 0usize;
        while let Some(rel) = self.carry[start..].find('\n') {
            let end = start + rel;
            let line = self.carry[start..end].to_string();
            start = end + 1;
            self.classify_line(&line, &mut events);
            if self.finished {
                self.carry.clear();
                self.pending_bytes.clear();
                return events;
            }
        }
        self.carry.drain(..start);
        events
    }

    /// Flush the carry-over and emit the terminal marker.
    pub fn close(&mut self) -> DecodeEvents {
        let mut events = DecodeEvents::new();
        if self.finished {
            return events;
        }

        if !self.pending_bytes.is_empty() {
            let tail = std::mem::take(&mut self.pending_bytes);
            self.carry.push_str(&String::from_utf8_lossy(&tail));
        }
        let rest = std::mem::take(&mut self.carry);
        for line in rest.split('\n') {
            self.classify_line(line, &mut events);
            if self.finished {
                return events;
            }
        }

        self.finished = true;
        events.push(DecodeEvent::Done);
        events
    }

    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        self.pending_bytes.extend_from_slice(chunk);
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending_bytes.clear();
                    return text;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending_bytes[..valid]));
                    match err.error_len() {
                        // Incomplete sequence at the end: keep it for the next chunk.
                        None => {
                            self.pending_bytes.drain(..valid);
                            return text;
                        }
                        Some(invalid) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending_bytes.drain(..valid + invalid);
                        }
                    }
                }
            }
        }
    }

    fn classify_line(&mut self, line: &str, events: &mut DecodeEvents) {
        let line = line.trim();
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };
        let payload = payload.trim();
        if payload.is_empty() {
            return;
        }
        if payload == DONE_SENTINEL {
            self.finished = true;
            events.push(DecodeEvent::Done);
            return;
        }

        match serde_json::from_str::<ChatCompletionChunk>(payload) {
            Ok(chunk) => {
                if let Some(delta) = chunk.into_delta().filter(|d| !d.is_empty()) {
                    events.push(DecodeEvent::Delta(delta));
                }
            }
            Err(err) => {
                log::debug!("Skipping malformed stream frame: {}", err);
            }
        }
    }
}
