//! Reassembles `data: ` lines from an HTTP body that arrives in arbitrary
//! byte chunks, and decodes each complete line into a [`RawFrame`].

use serde_json::Value;

use crate::model::raw_frame::RawFrame;

const DATA_PREFIX: &str = "data: ";
const OPENAI_DONE: &str = "[DONE]";

/// Which event shapes the producer speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireDialect {
    /// Game backend: `{"type":"content","text":...}`, `{"type":"error",...}`.
    #[default]
    Backend,
    /// Direct chat-completions stream: `choices[0].delta.content`, `[DONE]`.
    OpenAiCompatible,
}

/// Incremental frame decoder owned by one stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    dialect: WireDialect,
    /// Bytes of a multi-byte character whose tail has not arrived yet.
    pending_bytes: Vec<u8>,
    /// Decoded text after the last newline.
    line_buffer: String,
}

impl FrameDecoder {
    pub fn new(dialect: WireDialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    pub fn dialect(&self) -> WireDialect {
        self.dialect
    }

    /// Feed one chunk and return the frames of every line it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RawFrame> {
        let text = self.decode_utf8(chunk);
        self.line_buffer.push_str(&text);

        let Some(last_newline) = self.line_buffer.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.line_buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.line_buffer, rest);

        complete
            .split('\n')
            .filter_map(|line| self.decode_line(line))
            .collect()
    }

    /// End of body. Residual bytes without a trailing newline are dropped.
    pub fn finish(self) -> usize {
        let residual = self.line_buffer.len() + self.pending_bytes.len();
        if residual > 0 {
            tracing::debug!(
                target: "survival_narrator",
                "discarding {} bytes of unterminated stream data",
                residual
            );
        }
        residual
    }

    /// Decode as much of `pending_bytes + chunk` as forms complete characters.
    ///
    /// Invalid sequences become U+FFFD; a truncated sequence at the end is
    /// kept for the next chunk.
    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        self.pending_bytes.extend_from_slice(chunk);
        let bytes = std::mem::take(&mut self.pending_bytes);

        let mut out = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // `valid_up_to` marks the end of well-formed UTF-8.
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            self.pending_bytes = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    fn decode_line(&self, line: &str) -> Option<RawFrame> {
        match self.dialect {
            WireDialect::Backend => {
                let line = line.strip_suffix('\r').unwrap_or(line);
                let payload = line.strip_prefix(DATA_PREFIX)?;
                decode_backend_payload(payload)
            }
            WireDialect::OpenAiCompatible => {
                let payload = line.trim().strip_prefix(DATA_PREFIX)?;
                if payload == OPENAI_DONE {
                    return Some(RawFrame::Done);
                }
                decode_openai_payload(payload)
            }
        }
    }
}

fn parse_payload(payload: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(target: "survival_narrator", "skipping malformed stream frame: {}", e);
            None
        }
    }
}

fn decode_backend_payload(payload: &str) -> Option<RawFrame> {
    let value = parse_payload(payload)?;
    match value.get("type").and_then(Value::as_str) {
        Some("content") => value
            .get("text")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(|t| RawFrame::Content(t.to_string())),
        Some("error") => {
            let message = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("stream reported an error without a message");
            Some(RawFrame::Error(message.to_string()))
        }
        Some("done") => Some(RawFrame::Done),
        _ => Some(RawFrame::Unknown),
    }
}

fn decode_openai_payload(payload: &str) -> Option<RawFrame> {
    let value = parse_payload(payload)?;

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
            .unwrap_or("stream reported an error without a message");
        return Some(RawFrame::Error(message.to_string()));
    }

    let content = value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty());
    Some(match content {
        Some(text) => RawFrame::Content(text.to_string()),
        None => RawFrame::Unknown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn content(text: &str) -> RawFrame {
        RawFrame::Content(text.to_string())
    }

    #[test]
    fn decodes_backend_events() {
        let mut decoder = FrameDecoder::new(WireDialect::Backend);
        let frames = decoder.feed(
            b"data: {\"type\":\"content\",\"text\":\"Snow\"}\n\n\
              data: {\"type\":\"done\"}\n\n",
        );
        assert_eq!(frames, vec![content("Snow"), RawFrame::Done]);
        assert_eq!(decoder.finish(), 0);
    }

    #[test]
    fn reassembles_lines_split_across_chunks() {
        let mut decoder = FrameDecoder::new(WireDialect::Backend);
        assert!(decoder.feed(b"data: {\"type\":\"con").is_empty());
        assert!(decoder.feed(b"tent\",\"text\":\"he").is_empty());
        assert_eq!(decoder.feed(b"llo\"}\n"), vec![content("hello")]);
    }

    #[test]
    fn holds_back_split_multibyte_characters() {
        let line = "data: {\"type\":\"content\",\"text\":\"狼来了\"}\n".as_bytes();
        // Split inside the three-byte encoding of the first character.
        let split = line.iter().position(|&b| b >= 0x80).unwrap() + 1;
        let mut decoder = FrameDecoder::new(WireDialect::Backend);
        assert!(decoder.feed(&line[..split]).is_empty());
        assert_eq!(decoder.feed(&line[split..]), vec![content("狼来了")]);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let mut decoder = FrameDecoder::new(WireDialect::Backend);
        let mut bytes = b"data: {\"type\":\"content\",\"text\":\"a".to_vec();
        bytes.push(0xFF);
        bytes.extend_from_slice(b"b\"}\n");
        assert_eq!(decoder.feed(&bytes), vec![content("a\u{FFFD}b")]);
    }

    #[test]
    fn malformed_json_and_other_lines_are_skipped() {
        let mut decoder = FrameDecoder::new(WireDialect::Backend);
        let frames = decoder.feed(
            b": keep-alive\n\
              event: ping\n\
              data: {broken\n\
              data:{\"type\":\"content\",\"text\":\"no space\"}\n\
              data: {\"type\":\"content\",\"text\":\"\"}\n\
              data: {\"type\":\"content\",\"text\":\"ok\"}\r\n",
        );
        assert_eq!(frames, vec![content("ok")]);
    }

    #[test]
    fn error_event_carries_message() {
        let mut decoder = FrameDecoder::new(WireDialect::Backend);
        let frames = decoder.feed(b"data: {\"type\":\"error\",\"error\":\"boom\"}\n");
        assert_eq!(frames, vec![RawFrame::Error("boom".into())]);
    }

    #[test]
    fn unterminated_tail_is_discarded() {
        let mut decoder = FrameDecoder::new(WireDialect::Backend);
        let tail = b"data: {\"type\":\"content\",\"text\":\"lost\"}";
        assert!(decoder.feed(tail).is_empty());
        assert_eq!(decoder.finish(), tail.len());
    }

    #[test]
    fn decodes_openai_compatible_chunks() {
        let mut decoder = FrameDecoder::new(WireDialect::OpenAiCompatible);
        let frames = decoder.feed(
            b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
              data: {\"choices\":[{\"delta\":{\"content\":\"Fog\"}}]}\n\n\
              data: [DONE]\n\n",
        );
        assert_eq!(frames, vec![RawFrame::Unknown, content("Fog"), RawFrame::Done]);

        let frames = decoder.feed(b"data: {\"error\":{\"message\":\"rate limited\"}}\n");
        assert_eq!(frames, vec![RawFrame::Error("rate limited".into())]);
    }
}
