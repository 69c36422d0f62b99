//! Live scrubbing of control segments from narrative text.
//!
//! The scrubber is re-run over the whole accumulated buffer after every chunk.
//! Whatever it returns is safe to show: complete `<hidden>` and
//! `<state_update>` segments are dropped, complete `<options>` segments are
//! rendered as one choice per line, and anything from an unclosed or
//! half-arrived open marker onward is held back until more text arrives.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::control_tag::ControlTag;

static CHOICE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-D]\.").expect("choice marker regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Copying plain text.
    Outside { from: usize },
    /// Sitting on a `<` that may start a control marker.
    TagNamePrefix { at: usize },
    /// Past an open marker, waiting for its close marker.
    InsideTag { tag: ControlTag, content_start: usize },
}

/// Return the portion of `raw` that may be shown to the player right now.
pub fn scrub(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut state = ScanState::Outside { from: 0 };
    // Set after a rendered options block; the next visible text starts a line.
    let mut line_break_due = false;

    loop {
        state = match state {
            ScanState::Outside { from } => {
                let rest = &raw[from..];
                match rest.find('<') {
                    Some(rel) => {
                        push_text(&mut out, &rest[..rel], &mut line_break_due);
                        ScanState::TagNamePrefix { at: from + rel }
                    }
                    None => {
                        push_text(&mut out, rest, &mut line_break_due);
                        break;
                    }
                }
            }

            ScanState::TagNamePrefix { at } => {
                let tail = &raw[at..];
                if let Some(tag) = ControlTag::ALL.into_iter().find(|t| t.opens_at(tail)) {
                    ScanState::InsideTag {
                        tag,
                        content_start: at + tag.open_marker().len(),
                    }
                } else if is_partial_open_marker(tail) {
                    // The marker has not finished arriving; show nothing past it.
                    break;
                } else {
                    push_text(&mut out, "<", &mut line_break_due);
                    ScanState::Outside { from: at + 1 }
                }
            }

            ScanState::InsideTag { tag, content_start } => {
                let body = &raw[content_start..];
                let Some(rel) = tag.find_close(body) else {
                    // Unclosed segment: everything from its open marker is hidden.
                    break;
                };

                if tag == ControlTag::Options {
                    let rendered = format_choices(&scrub(&body[..rel]));
                    if !rendered.is_empty() {
                        if !out.is_empty() && !out.ends_with('\n') {
                            out.push('\n');
                        }
                        out.push_str(&rendered);
                        line_break_due = true;
                    }
                }

                ScanState::Outside {
                    from: content_start + rel + tag.close_marker().len(),
                }
            }
        };
    }

    out
}

fn push_text(out: &mut String, text: &str, line_break_due: &mut bool) {
    if text.is_empty() {
        return;
    }
    if std::mem::take(line_break_due) && !text.starts_with('\n') {
        out.push('\n');
    }
    out.push_str(text);
}

/// Whether `tail` is a strict prefix of any open marker, e.g. `<stat`.
pub(crate) fn is_partial_open_marker(tail: &str) -> bool {
    ControlTag::ALL.into_iter().any(|tag| {
        let marker = tag.open_marker().as_bytes();
        tail.len() < marker.len() && marker[..tail.len()].eq_ignore_ascii_case(tail.as_bytes())
    })
}

/// Byte ranges of every `A.`–`D.` choice marker in `text`, in document order.
///
/// A letter glued to a preceding ASCII letter or digit (`DNA.`) is part of a
/// word, not a marker. Lowercase letters and `E.` onward are never markers.
pub(crate) fn choice_marker_spans(text: &str) -> Vec<Range<usize>> {
    CHOICE_MARKER
        .find_iter(text)
        .filter(|m| {
            text[..m.start()]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_ascii_alphanumeric())
        })
        .map(|m| m.range())
        .collect()
}

/// Render the inside of an `<options>` segment with one choice per line.
pub fn format_choices(inner: &str) -> String {
    let markers = choice_marker_spans(inner);
    let mut lines = Vec::with_capacity(markers.len() + 1);

    let preamble_end = markers.first().map_or(inner.len(), |m| m.start);
    let preamble = inner[..preamble_end].trim();
    if !preamble.is_empty() {
        lines.push(preamble);
    }

    for (i, marker) in markers.iter().enumerate() {
        let end = markers.get(i + 1).map_or(inner.len(), |next| next.start);
        lines.push(inner[marker.start..end].trim());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn removes_complete_hidden_and_state_segments() {
        assert_eq!(
            scrub("The door creaks.<hidden>it is a trap</hidden> You wait."),
            "The door creaks. You wait."
        );
        assert_eq!(
            scrub("Quiet night.<state_update>{\"stat_changes\":{}}</state_update>"),
            "Quiet night."
        );
    }

    #[test]
    fn markers_are_case_insensitive() {
        assert_eq!(scrub("a<HIDDEN>b</Hidden>c"), "ac");
        assert_eq!(scrub("a<State_Update>{}"), "a");
    }

    #[test]
    fn unclosed_segment_truncates_at_open_marker() {
        assert_eq!(scrub("hello <hidden>the wolf is"), "hello ");
        assert_eq!(scrub("hello <options>A. Run"), "hello ");
        assert_eq!(scrub("x<state_update>{\"stat_changes\""), "x");
    }

    #[test]
    fn partial_open_marker_is_held_back() {
        assert_eq!(scrub("hello <state_up"), "hello ");
        assert_eq!(scrub("hello <opti"), "hello ");
        assert_eq!(scrub("hello <"), "hello ");
        assert_eq!(scrub("hello <HID"), "hello ");
    }

    #[test]
    fn every_prefix_of_every_marker_is_held_back() {
        for tag in ControlTag::ALL {
            let marker = tag.open_marker();
            for len in 1..=marker.len() {
                let text = format!("ok {}", &marker[..len]);
                assert_eq!(scrub(&text), "ok ", "prefix {:?}", &marker[..len]);
            }
        }
    }

    #[test]
    fn unrelated_angle_brackets_pass_through() {
        assert_eq!(scrub("a <b> c"), "a <b> c");
        assert_eq!(scrub("3 < 4 and <stats>"), "3 < 4 and <stats>");
        assert_eq!(scrub("<<hidden>x</hidden>"), "<");
    }

    #[test]
    fn options_render_one_choice_per_line() {
        assert_eq!(
            scrub("Fog.<options>A. Run B. Hide C. Shout D. Freeze</options>"),
            "Fog.\nA. Run\nB. Hide\nC. Shout\nD. Freeze"
        );
    }

    #[test]
    fn text_after_options_starts_a_new_line() {
        let raw = "Fog.<options>A. Run B. Hide C. Shout D. Freeze</options>Then silence.";
        assert_eq!(
            scrub(raw),
            "Fog.\nA. Run\nB. Hide\nC. Shout\nD. Freeze\nThen silence."
        );
        assert_eq!(
            scrub("<options>A. Run B. Hide</options>\nThen<hidden>x</hidden> quiet."),
            "A. Run\nB. Hide\nThen quiet."
        );
        assert_eq!(scrub("<options>A. Run</options><hidden>x</hidden>Then"), "A. Run\nThen");

        let mut previous = String::new();
        for (end, _) in raw.char_indices().skip(1).chain([(raw.len(), ' ')]) {
            let visible = scrub(&raw[..end]);
            assert!(visible.starts_with(&previous), "retracted at byte {}", end);
            previous = visible;
        }
    }

    #[test]
    fn hidden_inside_options_is_still_removed() {
        assert_eq!(
            scrub("<options>A. Run <hidden>bad idea</hidden>B. Hide</options>"),
            "A. Run\nB. Hide"
        );
    }

    #[test]
    fn text_after_a_closed_segment_keeps_flowing() {
        assert_eq!(
            scrub("a<hidden>x</hidden>b<hidden>y</hidden>c <sta"),
            "abc "
        );
    }

    #[test]
    fn multibyte_text_survives() {
        assert_eq!(scrub("雾中有影子。<hidden>是狼</hidden>你屏住呼吸"), "雾中有影子。你屏住呼吸");
    }

    #[test]
    fn choice_markers_skip_words_and_lowercase() {
        let text = "A. Test the DNA. B. run a. no E. nope";
        let spans = choice_marker_spans(text);
        let found: Vec<&str> = spans.iter().map(|r| &text[r.clone()]).collect();
        assert_eq!(found, vec!["A.", "B."]);
    }

    #[test]
    fn incremental_scrub_never_retracts() {
        let text = "Snow falls.<hidden>gm note</hidden> A figure approaches.\
                    <options>A. Wave B. Hide C. Run D. Wait</options>\
                    <state_update>{\"stat_changes\":{\"hp\":0,\"san\":0}}</state_update>";
        let mut previous = String::new();
        for (end, _) in text.char_indices().skip(1).chain([(text.len(), ' ')]) {
            let visible = scrub(&text[..end]);
            assert!(
                visible.starts_with(&previous),
                "visible text retracted at byte {}: {:?} -> {:?}",
                end,
                previous,
                visible
            );
            previous = visible;
        }
        assert_eq!(previous, scrub(text));
    }
}
