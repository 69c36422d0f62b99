use std::io::Read;

use reqwest::blocking::Response;
use reqwest::StatusCode;
use thiserror::Error;

use crate::engine::extractor::{parse_judged_turn, parse_narration_turn};
use crate::engine::llm_client::TransportError;
use crate::engine::sse_decoder::WireDialect;
use crate::engine::stream_aggregator::{NarrativeStream, StreamError};
use crate::model::turn_result::{JudgedTurnResult, ParsedTurnResult};

#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Wrap an HTTP response body as a narrative stream.
pub fn open_stream(
    resp: Response,
    dialect: WireDialect,
) -> Result<NarrativeStream<Response>, StreamError> {
    let empty = resp.status() == StatusCode::NO_CONTENT || resp.content_length() == Some(0);
    let body = if empty { None } else { Some(resp) };
    NarrativeStream::new(body, dialect)
}

/// Drive a narration stream to the end, forwarding each visible suffix.
///
/// Nothing is returned for a stream that fails part way; the text already
/// handed to `on_text` is all the caller gets.
pub fn run_narration<R, F>(
    mut stream: NarrativeStream<R>,
    mut on_text: F,
) -> Result<ParsedTurnResult, TurnError>
where
    R: Read,
    F: FnMut(&str),
{
    for delta in stream.by_ref() {
        on_text(&delta?);
    }
    Ok(parse_narration_turn(stream.raw_text()))
}

pub fn run_judgement<R, F>(
    mut stream: NarrativeStream<R>,
    mut on_text: F,
) -> Result<JudgedTurnResult, TurnError>
where
    R: Read,
    F: FnMut(&str),
{
    for delta in stream.by_ref() {
        on_text(&delta?);
    }
    Ok(parse_judged_turn(stream.raw_text()))
}
