use serde::{Deserialize, Serialize};

use crate::model::state_update::InventoryItem;
use crate::model::survivor_state::{HistoryEntry, Stats, SurvivorState};

/// How many past days the narrator sees.
pub const HISTORY_WINDOW: usize = 5;

/// Body of `POST /api/game/narrate/stream`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrateRequest {
    pub day: u32,
    pub stats: Stats,
    pub inventory: Vec<InventoryItem>,
    pub hidden_tags: Vec<String>,
    pub history: Vec<HistoryEntry>,
}

/// Body of `POST /api/game/judge/stream`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeRequest {
    pub day: u32,
    pub event_context: String,
    pub action_content: String,
    pub stats: Stats,
    pub inventory: Vec<InventoryItem>,
    pub history: Vec<HistoryEntry>,
}

/// Body of `POST /api/game/ending`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndingRequest {
    pub days_survived: u32,
    pub high_light_moment: String,
    pub final_stats: Stats,
    pub final_inventory: Vec<InventoryItem>,
    pub history: Vec<HistoryEntry>,
}

impl NarrateRequest {
    pub fn from_state(state: &SurvivorState) -> Self {
        Self {
            day: state.day,
            stats: state.stats,
            inventory: state.inventory.clone(),
            hidden_tags: state.hidden_tags.clone(),
            history: state.recent_history(HISTORY_WINDOW).to_vec(),
        }
    }
}

impl JudgeRequest {
    pub fn from_state(
        state: &SurvivorState,
        event_context: impl Into<String>,
        action_content: impl Into<String>,
    ) -> Self {
        Self {
            day: state.day,
            event_context: event_context.into(),
            action_content: action_content.into(),
            stats: state.stats,
            inventory: state.inventory.clone(),
            history: state.recent_history(HISTORY_WINDOW).to_vec(),
        }
    }
}

impl EndingRequest {
    pub fn from_state(state: &SurvivorState, high_light_moment: impl Into<String>) -> Self {
        Self {
            days_survived: state.day,
            high_light_moment: high_light_moment.into(),
            final_stats: state.stats,
            final_inventory: state.inventory.clone(),
            history: state.history.clone(),
        }
    }
}
