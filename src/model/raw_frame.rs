/// One decoded `data: ` payload from the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFrame {
    /// A piece of narrative text to append.
    Content(String),
    /// Deliberate failure signalled by the producer.
    Error(String),
    /// Explicit end marker; natural end of body follows.
    Done,
    /// Well-formed JSON with a type we do not act on.
    Unknown,
}

impl RawFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            RawFrame::Content(_) => "content",
            RawFrame::Error(_) => "error",
            RawFrame::Done => "done",
            RawFrame::Unknown => "unknown",
        }
    }
}
