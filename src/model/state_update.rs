use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Mechanical delta produced by one turn, carried inside `<state_update>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    /// Only present on judged-action turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
    #[serde(default)]
    pub stat_changes: StatChanges,
    #[serde(default)]
    pub item_changes: ItemChanges,
    #[serde(default)]
    pub new_hidden_tags: Vec<String>,
    #[serde(default)]
    pub remove_hidden_tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatChanges {
    #[serde(default)]
    pub hp: i32,
    #[serde(default)]
    pub san: i32,
    #[serde(default)]
    pub hunger: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemChanges {
    #[serde(default)]
    pub remove: Vec<InventoryItem>,
    #[serde(default)]
    pub add: Vec<InventoryItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub name: String,
    pub count: u32,
}

impl InventoryItem {
    pub fn new(name: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(String),
    #[error("expected a JSON object for `{0}`")]
    NotAnObject(&'static str),
    #[error("field `{field}` has the wrong shape: {reason}")]
    Field { field: String, reason: String },
}

impl StateUpdate {
    /// Validate an untrusted JSON value field by field.
    ///
    /// Absent sections decode to their empty defaults; present sections of the
    /// wrong shape are rejected so the caller never mutates state from a
    /// half-understood payload.
    pub fn from_value(value: &Value) -> Result<Self, DecodeError> {
        let obj = value
            .as_object()
            .ok_or(DecodeError::NotAnObject("state_update"))?;

        let score = match obj.get("score") {
            None | Some(Value::Null) => None,
            Some(v) => Some(number_field("score", v)?),
        };

        let stat_changes = match obj.get("stat_changes") {
            None | Some(Value::Null) => StatChanges::default(),
            Some(v) => {
                let stats = v.as_object().ok_or(DecodeError::NotAnObject("stat_changes"))?;
                StatChanges {
                    hp: optional_number(stats, "hp")?,
                    san: optional_number(stats, "san")?,
                    hunger: optional_number(stats, "hunger")?,
                }
            }
        };

        let item_changes = match obj.get("item_changes") {
            None | Some(Value::Null) => ItemChanges::default(),
            Some(v) => {
                let items = v.as_object().ok_or(DecodeError::NotAnObject("item_changes"))?;
                ItemChanges {
                    remove: item_list(items, "remove")?,
                    add: item_list(items, "add")?,
                }
            }
        };

        Ok(Self {
            score,
            stat_changes,
            item_changes,
            new_hidden_tags: string_list(obj, "new_hidden_tags")?,
            remove_hidden_tags: string_list(obj, "remove_hidden_tags")?,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| DecodeError::Json(e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn is_empty(&self) -> bool {
        self.stat_changes == StatChanges::default()
            && self.item_changes.add.is_empty()
            && self.item_changes.remove.is_empty()
            && self.new_hidden_tags.is_empty()
            && self.remove_hidden_tags.is_empty()
    }
}

fn number_field(field: &str, value: &Value) -> Result<i32, DecodeError> {
    let n = value.as_f64().ok_or_else(|| DecodeError::Field {
        field: field.to_string(),
        reason: format!("expected a number, got {}", value),
    })?;
    if !n.is_finite() || n.abs() > i32::MAX as f64 {
        return Err(DecodeError::Field {
            field: field.to_string(),
            reason: format!("number out of range: {}", n),
        });
    }
    Ok(n.round() as i32)
}

fn optional_number(obj: &Map<String, Value>, key: &str) -> Result<i32, DecodeError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(v) => number_field(key, v),
    }
}

fn string_list(obj: &Map<String, Value>, key: &str) -> Result<Vec<String>, DecodeError> {
    let Some(value) = obj.get(key) else {
        return Ok(Vec::new());
    };
    if value.is_null() {
        return Ok(Vec::new());
    }
    let Value::Array(items) = value else {
        return Err(DecodeError::Field {
            field: key.to_string(),
            reason: "expected an array of strings".to_string(),
        });
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item.as_str().map(str::trim) {
            Some("") => continue,
            Some(s) => out.push(s.to_string()),
            None => {
                return Err(DecodeError::Field {
                    field: key.to_string(),
                    reason: format!("expected a string, got {}", item),
                })
            }
        }
    }
    Ok(out)
}

fn item_list(obj: &Map<String, Value>, key: &str) -> Result<Vec<InventoryItem>, DecodeError> {
    let field = format!("item_changes.{}", key);
    let Some(value) = obj.get(key) else {
        return Ok(Vec::new());
    };
    if value.is_null() {
        return Ok(Vec::new());
    }
    let Value::Array(entries) = value else {
        return Err(DecodeError::Field {
            field,
            reason: "expected an array of items".to_string(),
        });
    };

    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        match item_entry(&field, entry) {
            Ok(item) => items.push(item),
            // Bad entries are dropped alone; the rest of the update stands.
            Err(e) => tracing::warn!(target: "survival_narrator", "skipping item entry: {}", e),
        }
    }
    Ok(items)
}

fn item_entry(field: &str, entry: &Value) -> Result<InventoryItem, DecodeError> {
    let invalid = |reason: String| DecodeError::Field {
        field: field.to_string(),
        reason,
    };
    let entry = entry
        .as_object()
        .ok_or_else(|| invalid(format!("expected an item object, got {}", entry)))?;

    let name = entry
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if name.is_empty() {
        return Err(invalid("item without a name".to_string()));
    }

    // A missing count means a single item.
    let count = match entry.get("count") {
        None | Some(Value::Null) => 1,
        Some(v) => number_field(field, v)?,
    };
    if count < 0 {
        return Err(invalid(format!("negative count {} for '{}'", count, name)));
    }

    Ok(InventoryItem::new(name, count as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn decodes_full_judge_payload() {
        let update = StateUpdate::from_value(&json!({
            "score": 75,
            "stat_changes": {"hp": -10, "san": -5, "hunger": -30},
            "item_changes": {
                "remove": [{"name": "canned beans", "count": 1}],
                "add": [{"name": "crowbar", "count": 1}]
            },
            "new_hidden_tags": ["bitten"],
            "remove_hidden_tags": []
        }))
        .unwrap();

        assert_eq!(update.score, Some(75));
        assert_eq!(
            update.stat_changes,
            StatChanges { hp: -10, san: -5, hunger: -30 }
        );
        assert_eq!(update.item_changes.remove, vec![InventoryItem::new("canned beans", 1)]);
        assert_eq!(update.item_changes.add, vec![InventoryItem::new("crowbar", 1)]);
        assert_eq!(update.new_hidden_tags, vec!["bitten".to_string()]);
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let update = StateUpdate::from_json(r#"{"stat_changes":{"san":5}}"#).unwrap();
        assert_eq!(update.stat_changes.san, 5);
        assert_eq!(update.stat_changes.hp, 0);
        assert!(update.item_changes.add.is_empty());
        assert_eq!(update.score, None);
    }

    #[test]
    fn float_deltas_are_rounded() {
        let update = StateUpdate::from_json(r#"{"stat_changes":{"hp":-2.6}}"#).unwrap();
        assert_eq!(update.stat_changes.hp, -3);
    }

    #[test]
    fn rejects_wrong_shapes() {
        assert_eq!(
            StateUpdate::from_json("[1,2]"),
            Err(DecodeError::NotAnObject("state_update"))
        );
        assert!(matches!(
            StateUpdate::from_json(r#"{"stat_changes":{"hp":"a lot"}}"#),
            Err(DecodeError::Field { .. })
        ));
        assert!(matches!(
            StateUpdate::from_json(r#"{"item_changes":{"add":"rope"}}"#),
            Err(DecodeError::Field { .. })
        ));
        assert!(matches!(
            StateUpdate::from_json("{not valid json}"),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn bad_item_entries_are_dropped_alone() {
        let update = StateUpdate::from_json(
            r#"{"stat_changes":{"hp":-10},
                "item_changes":{"add":[{"name":"","count":1},{"name":"rope","count":-1},
                                       "flare",{"name":"bandage","count":2}]},
                "new_hidden_tags":["cold"]}"#,
        )
        .unwrap();
        assert_eq!(update.stat_changes.hp, -10);
        assert_eq!(update.item_changes.add, vec![InventoryItem::new("bandage", 2)]);
        assert_eq!(update.new_hidden_tags, vec!["cold".to_string()]);
    }

    #[test]
    fn blank_tags_are_skipped() {
        let update =
            StateUpdate::from_json(r#"{"new_hidden_tags":["", "  ", "fevered"]}"#).unwrap();
        assert_eq!(update.new_hidden_tags, vec!["fevered".to_string()]);
    }
}
