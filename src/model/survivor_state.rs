use serde::{Deserialize, Serialize};

use crate::model::state_update::InventoryItem;

pub const STAT_MIN: i32 = 0;
pub const STAT_MAX: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub hp: i32,
    pub san: i32,
    pub hunger: i32,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            hp: STAT_MAX,
            san: STAT_MAX,
            hunger: STAT_MAX,
        }
    }
}

/// One day of the survivor's log, sent back to the narrator as context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub day: u32,
    pub log: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_result: Option<String>,
    pub event_result: String,
}

/// Authoritative player state the engine mutates between turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurvivorState {
    pub day: u32,
    pub stats: Stats,
    pub inventory: Vec<InventoryItem>,
    /// Persistent markers read by the narrator, never shown as plain text.
    pub hidden_tags: Vec<String>,
    pub history: Vec<HistoryEntry>,
}

impl Default for SurvivorState {
    fn default() -> Self {
        Self {
            day: 1,
            stats: Stats::default(),
            inventory: Vec::new(),
            hidden_tags: Vec::new(),
            history: Vec::new(),
        }
    }
}

impl SurvivorState {
    pub fn is_game_over(&self) -> bool {
        self.stats.hp <= STAT_MIN || self.stats.san <= STAT_MIN
    }

    pub fn item_count(&self, name: &str) -> u32 {
        self.inventory
            .iter()
            .find(|i| i.name == name)
            .map(|i| i.count)
            .unwrap_or(0)
    }

    pub fn recent_history(&self, count: usize) -> &[HistoryEntry] {
        let start = self.history.len().saturating_sub(count);
        &self.history[start..]
    }

    pub fn push_history(
        &mut self,
        log: impl Into<String>,
        event_result: impl Into<String>,
        player_action: Option<String>,
        judge_result: Option<String>,
    ) {
        self.history.push(HistoryEntry {
            day: self.day,
            log: log.into(),
            player_action,
            judge_result,
            event_result: event_result.into(),
        });
    }

    pub fn next_day(&mut self) {
        self.day += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_history_is_bounded() {
        let mut state = SurvivorState::default();
        for i in 0..7 {
            state.push_history(format!("day log {}", i), "none", None, None);
            state.next_day();
        }
        let recent = state.recent_history(5);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].log, "day log 2");
        assert_eq!(recent[4].day, 7);
        assert_eq!(state.recent_history(50).len(), 7);
    }

    #[test]
    fn game_over_when_hp_or_san_hits_zero() {
        let mut state = SurvivorState::default();
        assert!(!state.is_game_over());
        state.stats.san = 0;
        assert!(state.is_game_over());
    }
}
