use serde::{Deserialize, Serialize};

use crate::model::state_update::StateUpdate;

/// Structured outcome of a narration turn, built once the stream has ended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedTurnResult {
    pub log_text: String,
    pub has_crisis: bool,
    /// Exactly four entries when `has_crisis`, otherwise empty.
    pub choices: Vec<String>,
    pub hidden_info: Option<String>,
    /// Always `None` on crisis turns; the judged turn carries the delta.
    pub state_update: Option<StateUpdate>,
}

/// Outcome of resolving the player's chosen action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JudgedTurnResult {
    pub narrative_text: String,
    pub state_update: Option<StateUpdate>,
}

impl JudgedTurnResult {
    pub fn score(&self) -> Option<i32> {
        self.state_update.as_ref().and_then(|u| u.score)
    }
}
