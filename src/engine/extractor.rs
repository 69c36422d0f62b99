//! Post-stream extraction of hidden notes, state updates and choices from
//! the complete text of one model turn.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::engine::tag_scrubber::{choice_marker_spans, format_choices, is_partial_open_marker};
use crate::model::control_tag::{find_ignore_case, ControlTag};
use crate::model::state_update::{DecodeError, StateUpdate};
use crate::model::turn_result::{JudgedTurnResult, ParsedTurnResult};

static HIDDEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<hidden>(.*?)</hidden>").expect("hidden regex"));
static STATE_UPDATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<state_update>(.*?)</state_update>").expect("state_update regex"));
static OPTIONS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<options>(.*?)</options>").expect("options regex"));

/// Number of lettered choices a crisis presents.
pub const CRISIS_CHOICES: usize = 4;

/// Legacy separator between narrative and a bare choice block.
const LEGACY_SEPARATOR: &str = "---";

/// Parse a narration turn (the daily log, possibly ending in a crisis).
pub fn parse_narration_turn(raw: &str) -> ParsedTurnResult {
    let (text, hidden_info) = take_hidden(raw);
    let (text, mut state_update) = take_state_update(&text);

    let mut crisis: Option<(String, Vec<String>)> = None;
    let mut rewritten: Option<String> = None;

    if let Some(caps) = OPTIONS_RE.captures(&text) {
        let block = caps.get(0).map_or(0..0, |m| m.range());
        let inner = caps.get(1).map_or("", |m| m.as_str());
        match extract_choices(inner) {
            Some(choices) => {
                let mut log = String::with_capacity(text.len());
                log.push_str(&text[..block.start]);
                log.push_str(&text[block.end..]);
                crisis = Some((log, choices));
            }
            None => {
                tracing::debug!(
                    target: "survival_narrator",
                    "options block has fewer than {} choices; trying legacy separator",
                    CRISIS_CHOICES
                );
                // Keep what the player already saw on screen.
                let rendered = format_choices(inner);
                let before = &text[..block.start];
                let after = &text[block.end..];
                let (lead, trail) = if rendered.is_empty() {
                    ("", "")
                } else {
                    (
                        if !before.is_empty() && !before.ends_with('\n') { "\n" } else { "" },
                        if !after.is_empty() && !after.starts_with('\n') { "\n" } else { "" },
                    )
                };
                rewritten = Some(format!("{}{}{}{}{}", before, lead, rendered, trail, after));
            }
        }
    }
    let text = rewritten.unwrap_or(text);

    if crisis.is_none() {
        if let Some((before, after)) = text.split_once(LEGACY_SEPARATOR) {
            if let Some(choices) = extract_choices(after) {
                crisis = Some((before.to_string(), choices));
            }
        }
    }

    match crisis {
        Some((log, choices)) => {
            if state_update.take().is_some() {
                // Crisis turns defer mechanics to the judged turn.
                tracing::warn!(
                    target: "survival_narrator",
                    "discarding state update emitted alongside a crisis"
                );
            }
            ParsedTurnResult {
                log_text: truncate_unclosed(&log).trim().to_string(),
                has_crisis: true,
                choices,
                hidden_info,
                state_update,
            }
        }
        None => ParsedTurnResult {
            log_text: truncate_unclosed(&text).trim().to_string(),
            has_crisis: false,
            choices: Vec::new(),
            hidden_info,
            state_update,
        },
    }
}

/// Parse the turn resolving a chosen action. No choices are expected.
pub fn parse_judged_turn(raw: &str) -> JudgedTurnResult {
    let (text, state_update) = take_state_update(raw);
    JudgedTurnResult {
        narrative_text: truncate_unclosed(&text).trim().to_string(),
        state_update,
    }
}

/// Collect `A.`–`D.` choices in document order.
///
/// Returns the first four when at least four non-empty choices exist.
pub fn extract_choices(text: &str) -> Option<Vec<String>> {
    let spans = choice_marker_spans(text);
    let mut choices = Vec::with_capacity(spans.len());

    for (i, span) in spans.iter().enumerate() {
        let end = spans.get(i + 1).map_or(text.len(), |next| next.start);
        let content = text[span.end..end].trim();
        if content.is_empty() {
            continue;
        }
        let letter = &text[span.start..span.start + 1];
        choices.push(format!("{}. {}", letter, content));
    }

    if choices.len() < CRISIS_CHOICES {
        return None;
    }
    choices.truncate(CRISIS_CHOICES);
    Some(choices)
}

/// Parse JSON the way models actually emit it.
///
/// Tolerates a markdown code fence, a stray leading comma, prose before the
/// first `{` and anything after the matching closing `}`.
pub fn parse_lenient_json(text: &str) -> Result<Value, DecodeError> {
    let mut body = text.trim();
    body = body.strip_prefix("```json").unwrap_or(body);
    body = body.strip_prefix("```").unwrap_or(body);
    body = body.strip_suffix("```").unwrap_or(body);
    body = body.trim();
    body = body.strip_prefix(',').map(str::trim_start).unwrap_or(body);

    if let Some(start) = body.find('{') {
        body = &body[start..];
        if let Some(end) = balanced_object_end(body) {
            body = &body[..end];
        }
    }

    serde_json::from_str(body).map_err(|e| DecodeError::Json(e.to_string()))
}

/// Byte index just past the `}` closing the object that opens at index 0.
fn balanced_object_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in text.bytes().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn take_hidden(raw: &str) -> (String, Option<String>) {
    let notes: Vec<&str> = HIDDEN_RE
        .captures_iter(raw)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect();
    let text = HIDDEN_RE.replace_all(raw, "").into_owned();
    let hidden = (!notes.is_empty()).then(|| notes.join("\n"));
    (text, hidden)
}

fn take_state_update(raw: &str) -> (String, Option<StateUpdate>) {
    // The payload is expected last; if the model repeats it, the last one wins.
    let payload = STATE_UPDATE_RE
        .captures_iter(raw)
        .filter_map(|c| c.get(1))
        .last()
        .map(|m| m.as_str().to_string());
    let text = STATE_UPDATE_RE.replace_all(raw, "").into_owned();

    let update = payload.and_then(|json| {
        match parse_lenient_json(&json).and_then(|v| StateUpdate::from_value(&v)) {
            Ok(update) => Some(update),
            Err(e) => {
                tracing::warn!(
                    target: "survival_narrator",
                    "ignoring unusable state update ({}): {:.200}",
                    e,
                    json.trim()
                );
                None
            }
        }
    });
    (text, update)
}

/// Cut `text` at the earliest open marker that never got closed, or at a
/// trailing half-arrived one such as `<opti`.
fn truncate_unclosed(text: &str) -> &str {
    let cut = ControlTag::ALL
        .into_iter()
        .filter_map(|tag| {
            let open = find_ignore_case(text, tag.open_marker())?;
            let body = &text[open + tag.open_marker().len()..];
            tag.find_close(body).is_none().then_some(open)
        })
        .min();
    let text = match cut {
        Some(at) => &text[..at],
        None => text,
    };
    match text.rfind('<') {
        Some(at) if is_partial_open_marker(&text[at..]) => &text[..at],
        _ => text,
    }
}
