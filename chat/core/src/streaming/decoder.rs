//! Stream Decoder
//!
//! Incremental consumer for a chat response body. Bytes arrive in arbitrary
//! chunks; the decoder turns them into [`DecodeEvent`]s that the reassembler
//! applies to a conversation.
//!
//! # Layers
//!
//! ```text
//! bytes ──▶ Utf8Accumulator ──▶ (raw)    Append(text)
//!                          └──▶ LineBuffer ──▶ "data: {json}" ──▶ Replace{accumulated, thread}
//! ```
//!
//! - [`Utf8Accumulator`] holds back an incomplete multi-byte sequence at the
//!   end of a chunk until the rest arrives.
//! - [`LineBuffer`] splits on `\n` and keeps the trailing partial line.
//! - Framed payloads that fail to parse are logged and skipped.

use serde_json::Value;

use super::encoder::WireFormat;
use crate::error::ChatError;
use crate::messages::{FrameType, StreamFrame, ThreadId};

/// Prefix of an actionable framed line
pub const DATA_PREFIX: &str = "data: ";

/// Incremental UTF-8 decoder
///
/// Invalid sequences become U+FFFD; an incomplete sequence at the end of a
/// chunk is carried into the next one.
#[derive(Debug, Default)]
pub struct Utf8Accumulator {
    pending: Vec<u8>,
}

impl Utf8Accumulator {
    /// Create an empty accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `bytes` (plus any carried prefix) as is complete
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut out = String::new();
        let consumed = {
            let mut input: &[u8] = &self.pending;
            loop {
                match std::str::from_utf8(input) {
                    Ok(valid) => {
                        out.push_str(valid);
                        input = &[];
                        break;
                    }
                    Err(e) => {
                        let (valid, rest) = input.split_at(e.valid_up_to());
                        out.push_str(&String::from_utf8_lossy(valid));
                        match e.error_len() {
                            Some(bad) => {
                                out.push(char::REPLACEMENT_CHARACTER);
                                input = &rest[bad..];
                            }
                            None => {
                                input = rest;
                                break;
                            }
                        }
                    }
                }
            }
            self.pending.len() - input.len()
        };
        self.pending.drain(..consumed);
        out
    }

    /// Flush a dangling partial sequence as U+FFFD
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }

    /// Bytes waiting for the rest of a character
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Newline splitter that retains the trailing partial line
#[derive(Debug, Default)]
pub struct LineBuffer {
    partial: String,
}

impl LineBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text and return every line completed by it (without terminators)
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.partial.push_str(text);
        let Some(last_newline) = self.partial.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);
        complete
            .split_terminator('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect()
    }

    /// Take the unterminated remainder, if any
    pub fn take_remainder(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.partial);
        (!rest.is_empty()).then_some(rest)
    }

    /// Length of the unterminated remainder in bytes
    #[must_use]
    pub fn remainder_len(&self) -> usize {
        self.partial.len()
    }
}

/// A change the reassembler applies to the trailing assistant message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeEvent {
    /// Raw format: append this text
    Append(String),
    /// Framed format: set the content to the running accumulator
    Replace {
        /// Everything received so far
        content: String,
        /// Thread token from the latest frame that carried one
        thread_id: Option<ThreadId>,
    },
    /// The server sent an error record
    Error(String),
}

/// Incremental decoder for one response body
#[derive(Debug)]
pub struct StreamDecoder {
    format: WireFormat,
    utf8: Utf8Accumulator,
    lines: LineBuffer,
    accumulated: String,
    thread_id: Option<ThreadId>,
    skipped_frames: usize,
}

impl StreamDecoder {
    /// Create a decoder for the given wire format
    #[must_use]
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            utf8: Utf8Accumulator::new(),
            lines: LineBuffer::new(),
            accumulated: String::new(),
            thread_id: None,
            skipped_frames: 0,
        }
    }

    /// Wire format being decoded
    #[must_use]
    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Content decoded so far
    #[must_use]
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Latest thread token seen
    #[must_use]
    pub fn thread_id(&self) -> Option<&ThreadId> {
        self.thread_id.as_ref()
    }

    /// Frames dropped as malformed
    #[must_use]
    pub fn skipped_frames(&self) -> usize {
        self.skipped_frames
    }

    /// Consume one chunk of the body
    pub fn push(&mut self, chunk: &[u8]) -> Vec<DecodeEvent> {
        let text = self.utf8.push(chunk);
        self.decode_text(&text)
    }

    /// End of body: flush partial characters and the unterminated line
    pub fn finish(&mut self) -> Vec<DecodeEvent> {
        let tail = self.utf8.finish();
        let mut events = self.decode_text(&tail);

        if self.format == WireFormat::Framed {
            if let Some(rest) = self.lines.take_remainder() {
                events.extend(self.recover_trailing_line(&rest));
            }
        }
        events
    }

    fn decode_text(&mut self, text: &str) -> Vec<DecodeEvent> {
        if text.is_empty() {
            return Vec::new();
        }
        match self.format {
            WireFormat::RawText => {
                self.accumulated.push_str(text);
                vec![DecodeEvent::Append(text.to_string())]
            }
            WireFormat::Framed => self
                .lines
                .push(text)
                .iter()
                .filter_map(|line| self.decode_line(line))
                .collect(),
        }
    }

    fn recover_trailing_line(&mut self, line: &str) -> Option<DecodeEvent> {
        let event = line
            .starts_with(DATA_PREFIX)
            .then(|| parse_frame(line))
            .and_then(Result::ok)
            .and_then(|frame| self.apply_frame(frame));

        match event {
            Some(event) => {
                tracing::warn!(
                    bytes = line.len(),
                    "Recovered unterminated trailing frame at end of stream"
                );
                Some(event)
            }
            None => {
                tracing::warn!(
                    bytes = line.len(),
                    "Discarding unterminated trailing data at end of stream"
                );
                None
            }
        }
    }

    fn decode_line(&mut self, line: &str) -> Option<DecodeEvent> {
        if !line.starts_with(DATA_PREFIX) {
            return None;
        }
        match parse_frame(line) {
            Ok(frame) => self.apply_frame(frame),
            Err(e) => {
                self.skipped_frames += 1;
                tracing::warn!(error = %e, "Skipping malformed frame");
                None
            }
        }
    }

    fn apply_frame(&mut self, frame: StreamFrame) -> Option<DecodeEvent> {
        match frame.kind {
            FrameType::Error => Some(DecodeEvent::Error(frame.content)),
            FrameType::Message => {
                if frame.content.is_empty() {
                    return None;
                }
                if frame.thread_id.is_some() {
                    self.thread_id = frame.thread_id;
                }
                self.accumulated.push_str(&frame.content);
                Some(DecodeEvent::Replace {
                    content: self.accumulated.clone(),
                    thread_id: self.thread_id.clone(),
                })
            }
        }
    }
}

/// Parse a `data: {json}` line into a frame
///
/// # Errors
///
/// Returns `ChatError::Parse` when the payload is not a frame object.
pub fn parse_frame(line: &str) -> Result<StreamFrame, ChatError> {
    let payload = line
        .strip_prefix(DATA_PREFIX)
        .ok_or_else(|| ChatError::Parse("missing data prefix".to_string()))?;

    let value: Value =
        serde_json::from_str(payload).map_err(|e| ChatError::Parse(e.to_string()))?;
    if !value.is_object() {
        return Err(ChatError::Parse(format!("expected object, got {value}")));
    }
    serde_json::from_value(value).map_err(|e| ChatError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_utf8_split_inside_multibyte_char() {
        let bytes = "naïve €".as_bytes();
        let euro_start = bytes.len() - 3;
        let mut acc = Utf8Accumulator::new();

        let mut out = acc.push(&bytes[..euro_start + 1]);
        assert_eq!(acc.pending_len(), 1);
        out.push_str(&acc.push(&bytes[euro_start + 1..]));
        assert_eq!(out, "naïve €");
        assert_eq!(acc.pending_len(), 0);
    }

    #[test]
    fn test_utf8_invalid_bytes_become_replacement() {
        let mut acc = Utf8Accumulator::new();
        assert_eq!(acc.push(b"a\xFFb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_utf8_dangling_tail_flushed_on_finish() {
        let mut acc = Utf8Accumulator::new();
        assert_eq!(acc.push(&[b'x', 0xE2, 0x82]), "x");
        assert_eq!(acc.finish(), "\u{FFFD}");
    }

    #[test]
    fn test_line_buffer_keeps_partial_line() {
        let mut lines = LineBuffer::new();
        assert_eq!(lines.push("data: a\ndata: "), vec!["data: a".to_string()]);
        assert_eq!(lines.remainder_len(), "data: ".len());
        assert_eq!(
            lines.push("b\r\n\n"),
            vec!["data: b".to_string(), String::new()]
        );
        assert_eq!(lines.take_remainder(), None);
    }

    #[test]
    fn test_framed_replace_carries_accumulator_and_thread() {
        let mut decoder = StreamDecoder::new(WireFormat::Framed);
        let events = decoder.push(
            b"data: {\"type\":\"message\",\"content\":\"He\",\"threadId\":\"t1\"}\n\n\
              data: {\"type\":\"message\",\"content\":\"llo\",\"threadId\":\"t1\"}\n\n",
        );
        assert_eq!(
            events,
            vec![
                DecodeEvent::Replace {
                    content: "He".into(),
                    thread_id: Some(ThreadId::new("t1")),
                },
                DecodeEvent::Replace {
                    content: "Hello".into(),
                    thread_id: Some(ThreadId::new("t1")),
                },
            ]
        );
    }

    #[test]
    fn test_malformed_frame_is_skipped() {
        let mut decoder = StreamDecoder::new(WireFormat::Framed);
        let events = decoder.push(
            b"data: {\"type\":\"message\",\"content\":\"A\"}\n\n\
              data: {not json\n\n\
              : keepalive comment\n\
              data: {\"type\":\"message\",\"content\":\"B\"}\n\n",
        );
        assert_eq!(events.len(), 2);
        assert_eq!(decoder.accumulated(), "AB");
        assert_eq!(decoder.skipped_frames(), 1);
    }

    #[test]
    fn test_empty_and_unknown_frames_are_ignored() {
        let mut decoder = StreamDecoder::new(WireFormat::Framed);
        let events = decoder.push(
            b"data: {\"type\":\"message\",\"content\":\"\"}\n\
              data: {\"type\":\"progress\",\"content\":\"x\"}\n\
              data: [1,2]\n",
        );
        assert!(events.is_empty());
        assert_eq!(decoder.skipped_frames(), 2);
    }

    #[test]
    fn test_error_frame_surfaces() {
        let mut decoder = StreamDecoder::new(WireFormat::Framed);
        let events = decoder.push(b"data: {\"type\":\"error\",\"content\":\"try later\"}\n\n");
        assert_eq!(events, vec![DecodeEvent::Error("try later".into())]);
    }

    #[test]
    fn test_trailing_valid_frame_is_recovered() {
        let mut decoder = StreamDecoder::new(WireFormat::Framed);
        assert!(decoder
            .push(b"data: {\"type\":\"message\",\"content\":\"end\"}")
            .is_empty());
        assert_eq!(
            decoder.finish(),
            vec![DecodeEvent::Replace {
                content: "end".into(),
                thread_id: None,
            }]
        );
    }

    #[test]
    fn test_trailing_garbage_is_discarded() {
        let mut decoder = StreamDecoder::new(WireFormat::Framed);
        decoder.push(b"data: {\"type\":\"mess");
        assert!(decoder.finish().is_empty());
        assert_eq!(decoder.accumulated(), "");
    }

    #[test]
    fn test_raw_appends_each_chunk() {
        let mut decoder = StreamDecoder::new(WireFormat::RawText);
        assert_eq!(decoder.push(b"The "), vec![DecodeEvent::Append("The ".into())]);
        assert_eq!(decoder.push(b"answer"), vec![DecodeEvent::Append("answer".into())]);
        assert_eq!(decoder.accumulated(), "The answer");
        assert!(decoder.finish().is_empty());
    }
}
