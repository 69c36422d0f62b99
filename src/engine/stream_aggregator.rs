use std::collections::VecDeque;
use std::io::{self, Read};

use thiserror::Error;

use crate::engine::sse_decoder::{FrameDecoder, WireDialect};
use crate::engine::tag_scrubber::scrub;
use crate::model::raw_frame::RawFrame;

pub const DEFAULT_READ_CHUNK: usize = 4096;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("response has no body")]
    MissingBody,
    /// The producer sent an explicit error event.
    #[error("{0}")]
    Remote(String),
    #[error("stream transport failed: {0}")]
    Transport(#[from] io::Error),
}

/// Pull-based reader over one streamed turn.
///
/// Each item is the text newly revealed since the previous item. The
/// concatenation of all items is always `scrub(raw_text())` as of the last
/// item; nothing already yielded is ever taken back.
pub struct NarrativeStream<R> {
    body: R,
    decoder: FrameDecoder,
    pending: VecDeque<RawFrame>,
    raw: String,
    shown: String,
    read_buf: Vec<u8>,
    finished: bool,
}

impl<R: Read> NarrativeStream<R> {
    pub fn new(body: Option<R>, dialect: WireDialect) -> Result<Self, StreamError> {
        let body = body.ok_or(StreamError::MissingBody)?;
        Ok(Self {
            body,
            decoder: FrameDecoder::new(dialect),
            pending: VecDeque::new(),
            raw: String::new(),
            shown: String::new(),
            read_buf: vec![0; DEFAULT_READ_CHUNK],
            finished: false,
        })
    }

    pub fn with_read_chunk(mut self, size: usize) -> Self {
        self.read_buf = vec![0; size.max(1)];
        self
    }

    /// Everything received so far, control segments included.
    pub fn raw_text(&self) -> &str {
        &self.raw
    }

    pub fn into_raw_text(self) -> String {
        self.raw
    }

    /// Everything yielded so far.
    pub fn visible_text(&self) -> &str {
        &self.shown
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Process frames until new visible text appears, the body ends, or a
    /// failure occurs. Frames are handled one at a time so text that arrived
    /// ahead of an error event is still yielded first.
    fn advance(&mut self) -> Result<Option<String>, StreamError> {
        loop {
            let Some(frame) = self.pending.pop_front() else {
                if !self.fill()? {
                    return Ok(None);
                }
                continue;
            };

            match frame {
                RawFrame::Content(text) => {
                    self.raw.push_str(&text);
                    if let Some(delta) = self.reveal() {
                        return Ok(Some(delta));
                    }
                }
                RawFrame::Error(message) => {
                    tracing::error!(target: "survival_narrator", "stream aborted by producer: {}", message);
                    self.pending.clear();
                    return Err(StreamError::Remote(message));
                }
                other @ (RawFrame::Done | RawFrame::Unknown) => {
                    tracing::trace!(target: "survival_narrator", "ignoring {} frame", other.kind());
                }
            }
        }
    }

    /// Read one chunk into the frame queue. Returns `false` at end of body.
    fn fill(&mut self) -> Result<bool, StreamError> {
        loop {
            match self.body.read(&mut self.read_buf) {
                Ok(0) => {
                    let decoder = std::mem::take(&mut self.decoder);
                    decoder.finish();
                    tracing::info!(
                        target: "survival_narrator",
                        "stream completed: raw_len={} visible_len={}",
                        self.raw.len(),
                        self.shown.len()
                    );
                    return Ok(false);
                }
                Ok(n) => {
                    let frames = self.decoder.feed(&self.read_buf[..n]);
                    self.pending.extend(frames);
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(StreamError::Transport(e)),
            }
        }
    }

    /// Re-scrub the accumulator and return the unseen suffix, if any.
    fn reveal(&mut self) -> Option<String> {
        let visible = scrub(&self.raw);
        if visible.len() <= self.shown.len() {
            return None;
        }
        let Some(delta) = visible.strip_prefix(self.shown.as_str()) else {
            tracing::warn!(
                target: "survival_narrator",
                "visible text diverged from what was already shown; holding output"
            );
            return None;
        };
        let delta = delta.to_string();
        self.shown.push_str(&delta);
        Some(delta)
    }
}

impl<R: Read> Iterator for NarrativeStream<R> {
    type Item = Result<String, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(Some(delta)) => Some(Ok(delta)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
