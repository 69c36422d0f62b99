use crate::model::ending::EndingVerdict;
use crate::model::event_result::ApplyReport;
use crate::model::survivor_state::SurvivorState;
use crate::model::turn_result::{JudgedTurnResult, ParsedTurnResult};

pub enum EngineCommand {
    /// Narrate the next day.
    Narrate,
    /// Resolve the pending crisis with a letter (`"B"`) or a free-form action.
    Judge { choice: String },
    Ending,
    Shutdown,
}

#[derive(Debug)]
pub enum EngineResponse {
    /// Newly revealed text of the turn being streamed.
    TextDelta(String),

    NarrationReady(ParsedTurnResult),

    JudgementReady(JudgedTurnResult),

    StateApplied {
        report: ApplyReport,
        state: SurvivorState,
    },

    EndingReady(EndingVerdict),

    Failed(String),
}
