use crate::model::event_result::ApplyReport;
use crate::model::state_update::{InventoryItem, StateUpdate};
use crate::model::survivor_state::{SurvivorState, STAT_MAX, STAT_MIN};

/// Apply a StateUpdate to the SurvivorState, returning what happened to each part
pub fn apply_state_update(state: &mut SurvivorState, update: &StateUpdate) -> ApplyReport {
    let mut report = ApplyReport::default();
    if update.is_empty() {
        tracing::debug!(target: "survival_narrator", "state update carries no changes");
        return report;
    }

    let changes = update.stat_changes;
    for (name, slot, delta) in [
        ("hp", &mut state.stats.hp, changes.hp),
        ("san", &mut state.stats.san, changes.san),
        ("hunger", &mut state.stats.hunger, changes.hunger),
    ] {
        if delta == 0 {
            continue;
        }
        let before = *slot;
        *slot = before.saturating_add(delta).clamp(STAT_MIN, STAT_MAX);
        report.applied(format!("{} {} -> {}", name, before, *slot));
    }

    for item in &update.item_changes.remove {
        match remove_item(&mut state.inventory, item) {
            Some(Removal::Partial { left }) => {
                report.applied(format!("-{} {} ({} left)", item.count, item.name, left))
            }
            Some(Removal::Clamped { held }) => report.applied(format!(
                "-{} {} (asked for {}, clamped to all held)",
                held, item.name, item.count
            )),
            None => report.rejected(format!("Item '{}' not in inventory", item.name)),
        }
    }

    for item in &update.item_changes.add {
        if item.count == 0 {
            report.rejected(format!("Refusing to add zero '{}'", item.name));
            continue;
        }
        match state.inventory.iter_mut().find(|i| i.name == item.name) {
            Some(entry) => entry.count = entry.count.saturating_add(item.count),
            None => state.inventory.push(item.clone()),
        }
        report.applied(format!("+{} {}", item.count, item.name));
    }

    for tag in &update.new_hidden_tags {
        if state.hidden_tags.contains(tag) {
            continue;
        }
        state.hidden_tags.push(tag.clone());
        report.applied(format!("tag +{}", tag));
    }

    for tag in &update.remove_hidden_tags {
        let Some(index) = state.hidden_tags.iter().position(|t| t == tag) else {
            report.rejected(format!("Hidden tag '{}' not present", tag));
            continue;
        };
        state.hidden_tags.remove(index);
        report.applied(format!("tag -{}", tag));
    }

    for reason in report.rejections() {
        tracing::debug!(target: "survival_narrator", "state update part rejected: {}", reason);
    }

    report
}

enum Removal {
    Partial { left: u32 },
    /// The stack ran out before the requested count; it is gone.
    Clamped { held: u32 },
}

/// Subtract from a stack, dropping it once it reaches zero. `None` when the
/// item is not held at all.
fn remove_item(inventory: &mut Vec<InventoryItem>, item: &InventoryItem) -> Option<Removal> {
    let index = inventory.iter().position(|i| i.name == item.name)?;

    let held = inventory[index].count;
    if held > item.count {
        let left = held - item.count;
        inventory[index].count = left;
        return Some(Removal::Partial { left });
    }

    inventory.remove(index);
    if held == item.count {
        Some(Removal::Partial { left: 0 })
    } else {
        Some(Removal::Clamped { held })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::event_result::ApplyOutcome;
    use crate::model::state_update::{ItemChanges, StatChanges};
    use pretty_assertions::assert_eq;

    fn survivor() -> SurvivorState {
        let mut state = SurvivorState::default();
        state.stats.hp = 50;
        state.inventory = vec![InventoryItem::new("water", 2), InventoryItem::new("rope", 1)];
        state.hidden_tags = vec!["limping".into()];
        state
    }

    #[test]
    fn stats_are_clamped() {
        let mut state = survivor();
        let update = StateUpdate {
            stat_changes: StatChanges { hp: 80, san: -150, hunger: 0 },
            ..StateUpdate::default()
        };
        apply_state_update(&mut state, &update);
        assert_eq!(state.stats.hp, 100);
        assert_eq!(state.stats.san, 0);
        assert_eq!(state.stats.hunger, 100);
    }

    #[test]
    fn inventory_changes_merge_and_drop_empty_stacks() {
        let mut state = survivor();
        let update = StateUpdate {
            item_changes: ItemChanges {
                remove: vec![InventoryItem::new("rope", 1), InventoryItem::new("water", 1)],
                add: vec![InventoryItem::new("water", 3), InventoryItem::new("flare", 1)],
            },
            ..StateUpdate::default()
        };
        let report = apply_state_update(&mut state, &update);
        assert_eq!(
            state.inventory,
            vec![InventoryItem::new("water", 4), InventoryItem::new("flare", 1)]
        );
        assert_eq!(report.rejections().count(), 0);
    }

    #[test]
    fn over_removal_drops_the_stack_and_unknown_items_are_rejected() {
        let mut state = survivor();
        let update = StateUpdate {
            item_changes: ItemChanges {
                remove: vec![InventoryItem::new("water", 5), InventoryItem::new("gun", 1)],
                add: vec![],
            },
            ..StateUpdate::default()
        };
        let report = apply_state_update(&mut state, &update);
        assert_eq!(state.item_count("water"), 0);
        assert_eq!(state.inventory, vec![InventoryItem::new("rope", 1)]);
        assert_eq!(
            report.results,
            vec![
                ApplyOutcome::Applied {
                    change: "-2 water (asked for 5, clamped to all held)".into()
                },
                ApplyOutcome::Rejected {
                    reason: "Item 'gun' not in inventory".into()
                },
            ]
        );
    }

    #[test]
    fn hidden_tags_are_deduplicated() {
        let mut state = survivor();
        let update = StateUpdate {
            new_hidden_tags: vec!["limping".into(), "infected".into()],
            remove_hidden_tags: vec!["limping".into(), "cursed".into()],
            ..StateUpdate::default()
        };
        let report = apply_state_update(&mut state, &update);
        assert_eq!(state.hidden_tags, vec!["infected".to_string()]);
        assert!(report
            .results
            .contains(&ApplyOutcome::Rejected { reason: "Hidden tag 'cursed' not present".into() }));
    }
}
