/// Bracketed control segments the model embeds in narrative text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlTag {
    /// GM-only reasoning, never shown to the player.
    Hidden,
    /// Trailing JSON payload with stat / inventory deltas.
    StateUpdate,
    /// Four lettered choices for a crisis turn.
    Options,
}

impl ControlTag {
    pub const ALL: [ControlTag; 3] = [
        ControlTag::Hidden,
        ControlTag::StateUpdate,
        ControlTag::Options,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ControlTag::Hidden => "hidden",
            ControlTag::StateUpdate => "state_update",
            ControlTag::Options => "options",
        }
    }

    pub fn open_marker(self) -> &'static str {
        match self {
            ControlTag::Hidden => "<hidden>",
            ControlTag::StateUpdate => "<state_update>",
            ControlTag::Options => "<options>",
        }
    }

    pub fn close_marker(self) -> &'static str {
        match self {
            ControlTag::Hidden => "</hidden>",
            ControlTag::StateUpdate => "</state_update>",
            ControlTag::Options => "</options>",
        }
    }

    /// Whether `text` begins with this tag's open marker, ignoring ASCII case.
    pub fn opens_at(self, text: &str) -> bool {
        starts_with_ignore_case(text, self.open_marker())
    }

    /// Byte offset of the first close marker in `text`, ignoring ASCII case.
    pub fn find_close(self, text: &str) -> Option<usize> {
        find_ignore_case(text, self.close_marker())
    }
}

pub(crate) fn starts_with_ignore_case(text: &str, marker: &str) -> bool {
    text.len() >= marker.len()
        && text.as_bytes()[..marker.len()].eq_ignore_ascii_case(marker.as_bytes())
}

pub(crate) fn find_ignore_case(text: &str, marker: &str) -> Option<usize> {
    let hay = text.as_bytes();
    let needle = marker.as_bytes();
    if needle.len() > hay.len() {
        return None;
    }
    (0..=hay.len() - needle.len())
        .find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_match_regardless_of_case() {
        assert!(ControlTag::StateUpdate.opens_at("<STATE_UPDATE>{}"));
        assert!(ControlTag::Hidden.opens_at("<Hidden>x</Hidden>"));
        assert!(!ControlTag::Options.opens_at("<opt"));
        assert_eq!(ControlTag::Hidden.find_close("wolf</HIDDEN> tail"), Some(4));
    }

    #[test]
    fn find_close_handles_multibyte_text() {
        assert_eq!(ControlTag::Options.find_close("狼</options>"), Some(3));
        assert_eq!(ControlTag::Options.find_close("狼"), None);
    }
}
