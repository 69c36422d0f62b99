use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const RADAR_AXES: usize = 5;
const RADAR_DEFAULT: i32 = 5;
const RADAR_MAX: i32 = 10;

const DEFAULT_EPITHET: &str = "Doomsday Survivor";
const DEFAULT_COMMENT: &str = "Your journey through the end of the world is over.";

/// Closing summary of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndingVerdict {
    /// `None` when the player made it to the end alive.
    pub cause_of_death: Option<String>,
    pub epithet: String,
    pub comment: String,
    pub radar_chart: [i32; RADAR_AXES],
}

impl EndingVerdict {
    /// Build a verdict from whatever the model returned, filling gaps.
    ///
    /// The radar chart must have exactly five numeric axes; anything else is
    /// replaced by the neutral chart. Each axis is clamped to 0..=10.
    pub fn from_value(value: &Value) -> Self {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            cause_of_death: text("cause_of_death"),
            epithet: text("epithet").unwrap_or_else(|| DEFAULT_EPITHET.to_string()),
            comment: text("comment").unwrap_or_else(|| DEFAULT_COMMENT.to_string()),
            radar_chart: radar_chart(value.get("radar_chart")),
        }
    }
}

fn radar_chart(value: Option<&Value>) -> [i32; RADAR_AXES] {
    let neutral = [RADAR_DEFAULT; RADAR_AXES];
    let Some(Value::Array(axes)) = value else {
        return neutral;
    };
    if axes.len() != RADAR_AXES {
        return neutral;
    }

    let mut chart = neutral;
    for (slot, axis) in chart.iter_mut().zip(axes) {
        let Some(n) = axis.as_f64() else {
            return neutral;
        };
        *slot = (n.round() as i32).clamp(0, RADAR_MAX);
    }
    chart
}
