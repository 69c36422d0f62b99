use crate::model::game_context::{EndingRequest, JudgeRequest, NarrateRequest};
use crate::model::message::ChatMessage;
use crate::model::state_update::InventoryItem;
use crate::model::survivor_state::{HistoryEntry, Stats};

/// Builds the messages sent to the model in custom mode.
/// This struct is intentionally dumb: it only formats text.
/// No parsing, no networking, no engine logic.
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn narrator_messages(req: &NarrateRequest) -> Vec<ChatMessage> {
        let mut prompt = String::new();

        push_day(&mut prompt, req.day);
        push_stats(&mut prompt, &req.stats);
        push_inventory(&mut prompt, &req.inventory);
        push_hidden_tags(&mut prompt, &req.hidden_tags);
        push_history_section(&mut prompt, &req.history);
        prompt.push_str("Write today's log.\n");

        vec![
            ChatMessage::system(format!("{}{}", NARRATOR_SYSTEM_PROMPT, STATE_UPDATE_SHAPE)),
            ChatMessage::user(prompt),
        ]
    }

    pub fn judge_messages(req: &JudgeRequest, luck: u8) -> Vec<ChatMessage> {
        let mut prompt = String::new();

        push_day(&mut prompt, req.day);
        push_stats(&mut prompt, &req.stats);
        push_inventory(&mut prompt, &req.inventory);
        push_history_section(&mut prompt, &req.history);

        prompt.push_str("CRISIS:\n");
        prompt.push_str(req.event_context.trim());
        prompt.push_str("\n\n");

        prompt.push_str("PLAYER ACTION:\n");
        prompt.push_str(req.action_content.trim());
        prompt.push_str("\n\n");

        prompt.push_str(&format!("LUCK ROLL (0-100): {}\n", luck));

        vec![
            ChatMessage::system(format!("{}{}", JUDGE_SYSTEM_PROMPT, STATE_UPDATE_SHAPE)),
            ChatMessage::user(prompt),
        ]
    }

    pub fn ending_messages(req: &EndingRequest) -> Vec<ChatMessage> {
        let mut prompt = String::new();

        prompt.push_str(&format!("DAYS SURVIVED: {}\n\n", req.days_survived));
        push_stats(&mut prompt, &req.final_stats);
        push_inventory(&mut prompt, &req.final_inventory);
        if !req.high_light_moment.trim().is_empty() {
            prompt.push_str("HIGHLIGHT:\n");
            prompt.push_str(req.high_light_moment.trim());
            prompt.push_str("\n\n");
        }
        push_history_section(&mut prompt, &req.history);

        vec![
            ChatMessage::system(ENDING_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ]
    }
}

const STATE_UPDATE_SHAPE: &str = r#"{"stat_changes":{"hp":0,"san":0,"hunger":0},"item_changes":{"remove":[{"name":"","count":1}],"add":[]},"new_hidden_tags":[],"remove_hidden_tags":[]}"#;

const NARRATOR_SYSTEM_PROMPT: &str = concat!(
    "You narrate one day of a survival story in plain prose.\n",
    "Put anything the player must not see inside <hidden>...</hidden>.\n",
    "If today brings a crisis, end with <options>A. ... B. ... C. ... D. ...</options> ",
    "offering exactly four actions, and do NOT emit a state update.\n",
    "Otherwise end with <state_update>JSON</state_update> using this shape:\n",
);

const JUDGE_SYSTEM_PROMPT: &str = concat!(
    "You judge the player's action against the crisis and the luck roll.\n",
    "Describe the outcome in plain prose, then end with ",
    "<state_update>JSON</state_update> adding an integer \"score\" (0-100) to this shape:\n",
);

const ENDING_SYSTEM_PROMPT: &str = concat!(
    "You summarise a finished survival run. Reply with one JSON object: ",
    "{\"cause_of_death\": string or null, \"epithet\": string, \"comment\": string, ",
    "\"radar_chart\": [five integers from 0 to 10]}.",
);

fn push_day(prompt: &mut String, day: u32) {
    prompt.push_str(&format!("DAY: {}\n\n", day));
}

fn push_stats(prompt: &mut String, stats: &Stats) {
    prompt.push_str("STATUS:\n");
    prompt.push_str(&format!(
        "- HP: {}\n- SAN: {}\n- Hunger: {}\n\n",
        stats.hp, stats.san, stats.hunger
    ));
}

fn push_inventory(prompt: &mut String, inventory: &[InventoryItem]) {
    prompt.push_str("INVENTORY:\n");
    if inventory.is_empty() {
        prompt.push_str("- (empty)\n");
    }
    for item in inventory {
        prompt.push_str(&format!("- {} x{}\n", item.name, item.count));
    }
    prompt.push('\n');
}

fn push_hidden_tags(prompt: &mut String, tags: &[String]) {
    if tags.is_empty() {
        return;
    }
    prompt.push_str("HIDDEN TAGS (never reveal directly):\n");
    for tag in tags {
        prompt.push_str(&format!("- {}\n", tag));
    }
    prompt.push('\n');
}

fn push_history_section(prompt: &mut String, history: &[HistoryEntry]) {
    if history.is_empty() {
        return;
    }
    prompt.push_str("RECENT DAYS:\n");
    for entry in history {
        prompt.push_str(&format!("Day {}: {}\n", entry.day, entry.log.trim()));
        if let Some(action) = &entry.player_action {
            prompt.push_str(&format!("  Player: {}\n", action.trim()));
        }
        if let Some(result) = &entry.judge_result {
            prompt.push_str(&format!("  Outcome: {}\n", result.trim()));
        }
    }
    prompt.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::message::ChatRole;
    use crate::model::survivor_state::SurvivorState;

    #[test]
    fn narrator_prompt_lists_state() {
        let mut state = SurvivorState::default();
        state.inventory.push(InventoryItem::new("water", 2));
        state.hidden_tags.push("bitten".into());
        state.push_history("Found a cellar.", "none", None, None);

        let messages = PromptBuilder::narrator_messages(&NarrateRequest::from_state(&state));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[0].content.contains("<state_update>"));
        let user = &messages[1].content;
        assert!(user.contains("- water x2"));
        assert!(user.contains("- bitten"));
        assert!(user.contains("Day 1: Found a cellar."));
    }

    #[test]
    fn judge_prompt_carries_action_and_luck() {
        let state = SurvivorState::default();
        let req = JudgeRequest::from_state(&state, "A dog blocks the road.", "B. Throw food");
        let messages = PromptBuilder::judge_messages(&req, 42);
        assert!(messages[1].content.contains("B. Throw food"));
        assert!(messages[1].content.contains("LUCK ROLL (0-100): 42"));
    }
}
