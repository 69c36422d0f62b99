use std::sync::mpsc::{Receiver, Sender};

use anyhow::{bail, Context};

use crate::engine::apply_state::apply_state_update;
use crate::engine::llm_client::NarrativeSource;
use crate::engine::protocol::{EngineCommand, EngineResponse};
use crate::engine::turn::{open_stream, run_judgement, run_narration};
use crate::model::event_result::ApplyReport;
use crate::model::game_context::{EndingRequest, JudgeRequest, NarrateRequest};
use crate::model::survivor_state::SurvivorState;
use crate::model::turn_result::{JudgedTurnResult, ParsedTurnResult};

/// A crisis waiting for the player's decision.
#[derive(Debug, Clone, PartialEq)]
struct PendingCrisis {
    log_text: String,
    choices: Vec<String>,
}

pub struct Engine {
    rx: Receiver<EngineCommand>,
    tx: Sender<EngineResponse>,
    source: NarrativeSource,
    state: SurvivorState,
    crisis: Option<PendingCrisis>,
    /// Best-scored judged outcome so far, offered to the ending as its highlight.
    highlight: Option<(i32, String)>,
}

impl Engine {
    pub fn new(
        rx: Receiver<EngineCommand>,
        tx: Sender<EngineResponse>,
        source: NarrativeSource,
    ) -> Self {
        Self {
            rx,
            tx,
            source,
            state: SurvivorState::default(),
            crisis: None,
            highlight: None,
        }
    }

    pub fn with_state(mut self, state: SurvivorState) -> Self {
        self.state = state;
        self
    }

    pub fn run(&mut self) {
        while let Ok(cmd) = self.rx.recv() {
            let outcome = match cmd {
                EngineCommand::Narrate => self.narrate(),
                EngineCommand::Judge { choice } => self.judge(&choice),
                EngineCommand::Ending => self.ending(),
                EngineCommand::Shutdown => break,
            };

            if let Err(e) = outcome {
                tracing::error!(target: "survival_narrator", "turn failed: {:#}", e);
                let _ = self.tx.send(EngineResponse::Failed(format!("{:#}", e)));
            }
        }
        tracing::debug!(target: "survival_narrator", "engine loop stopped");
    }

    fn narrate(&mut self) -> anyhow::Result<()> {
        if self.crisis.is_some() {
            bail!("a crisis is waiting for a choice");
        }
        if self.state.is_game_over() {
            bail!("the survivor is dead; request the ending");
        }

        let req = NarrateRequest::from_state(&self.state);
        let resp = self
            .source
            .narrate(&req)
            .with_context(|| format!("narrating day {}", self.state.day))?;
        let stream = open_stream(resp, self.source.dialect())?;

        let tx = &self.tx;
        let result = run_narration(stream, |text| {
            let _ = tx.send(EngineResponse::TextDelta(text.to_string()));
        })?;

        let report = self.settle_narration(&result);
        let _ = self.tx.send(EngineResponse::NarrationReady(result));
        if let Some(report) = report {
            self.send_state(report);
        }
        Ok(())
    }

    fn judge(&mut self, choice: &str) -> anyhow::Result<()> {
        let Some(crisis) = self.crisis.take() else {
            bail!("there is no crisis to resolve");
        };

        let action = resolve_choice(&crisis.choices, choice);
        let req = JudgeRequest::from_state(&self.state, crisis.log_text.clone(), action.clone());

        let outcome = self.stream_judgement(&req);
        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                // The player may retry the same decision.
                self.crisis = Some(crisis);
                return Err(e);
            }
        };

        let report = self.settle_judgement(&crisis, &action, &result);
        let _ = self.tx.send(EngineResponse::JudgementReady(result));
        self.send_state(report);
        Ok(())
    }

    fn stream_judgement(&mut self, req: &JudgeRequest) -> anyhow::Result<JudgedTurnResult> {
        let resp = self.source.judge(req).context("judging the player's action")?;
        let stream = open_stream(resp, self.source.dialect())?;

        let tx = &self.tx;
        let result = run_judgement(stream, |text| {
            let _ = tx.send(EngineResponse::TextDelta(text.to_string()));
        })?;
        Ok(result)
    }

    fn ending(&mut self) -> anyhow::Result<()> {
        let highlight = self
            .highlight
            .as_ref()
            .map(|(_, text)| text.clone())
            .unwrap_or_default();
        let req = EndingRequest::from_state(&self.state, highlight);
        let verdict = self.source.ending(&req).context("requesting the ending")?;
        let _ = self.tx.send(EngineResponse::EndingReady(verdict));
        Ok(())
    }

    fn send_state(&self, report: ApplyReport) {
        let _ = self.tx.send(EngineResponse::StateApplied {
            report,
            state: self.state.clone(),
        });
    }

    /// Record a finished narration. Crisis turns only park the decision.
    fn settle_narration(&mut self, result: &ParsedTurnResult) -> Option<ApplyReport> {
        if result.has_crisis {
            self.crisis = Some(PendingCrisis {
                log_text: result.log_text.clone(),
                choices: result.choices.clone(),
            });
            return None;
        }

        let report = match &result.state_update {
            Some(update) => apply_state_update(&mut self.state, update),
            None => ApplyReport::default(),
        };
        self.state
            .push_history(result.log_text.clone(), report.summary(), None, None);
        self.state.next_day();
        Some(report)
    }

    fn settle_judgement(
        &mut self,
        crisis: &PendingCrisis,
        action: &str,
        result: &JudgedTurnResult,
    ) -> ApplyReport {
        let report = match &result.state_update {
            Some(update) => apply_state_update(&mut self.state, update),
            None => ApplyReport::default(),
        };

        if let Some(score) = result.score() {
            let better = self.highlight.as_ref().map_or(true, |(best, _)| score > *best);
            if better {
                self.highlight = Some((score, result.narrative_text.clone()));
            }
        }

        self.state.push_history(
            crisis.log_text.clone(),
            report.summary(),
            Some(action.to_string()),
            Some(result.narrative_text.clone()),
        );
        self.state.next_day();
        report
    }
}

/// Map a bare letter onto the matching choice; anything else is a free-form action.
fn resolve_choice(choices: &[String], input: &str) -> String {
    let input = input.trim();
    let mut letters = input.chars();
    if let (Some(letter), None) = (letters.next(), letters.next()) {
        let prefix = format!("{}.", letter.to_ascii_uppercase());
        if let Some(choice) = choices.iter().find(|c| c.starts_with(&prefix)) {
            return choice.clone();
        }
    }
    input.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::Settings;
    use crate::model::state_update::{InventoryItem, ItemChanges, StatChanges, StateUpdate};
    use pretty_assertions::assert_eq;
    use std::sync::mpsc;

    fn engine() -> (Engine, mpsc::Receiver<EngineResponse>) {
        let (_cmd_tx, cmd_rx) = mpsc::channel();
        let (resp_tx, resp_rx) = mpsc::channel();
        let source = NarrativeSource::from_settings(&Settings::default()).unwrap();
        (Engine::new(cmd_rx, resp_tx, source), resp_rx)
    }

    fn choices() -> Vec<String> {
        vec!["A. Run".into(), "B. Hide".into(), "C. Shout".into(), "D. Freeze".into()]
    }

    #[test]
    fn letters_resolve_to_choices() {
        assert_eq!(resolve_choice(&choices(), " b "), "B. Hide");
        assert_eq!(resolve_choice(&choices(), "E"), "E");
        assert_eq!(resolve_choice(&choices(), "climb the tree"), "climb the tree");
    }

    #[test]
    fn quiet_day_applies_update_and_advances() {
        let (mut engine, _rx) = engine();
        let result = ParsedTurnResult {
            log_text: "A quiet night.".into(),
            state_update: Some(StateUpdate {
                stat_changes: StatChanges { hp: 0, san: -5, hunger: -10 },
                ..StateUpdate::default()
            }),
            ..ParsedTurnResult::default()
        };

        let report = engine.settle_narration(&result).unwrap();
        assert_eq!(report.rejections().count(), 0);
        assert_eq!(engine.state.stats.san, 95);
        assert_eq!(engine.state.stats.hunger, 90);
        assert_eq!(engine.state.day, 2);
        assert_eq!(engine.state.history[0].log, "A quiet night.");
    }

    #[test]
    fn crisis_waits_for_judgement() {
        let (mut engine, _rx) = engine();
        let narration = ParsedTurnResult {
            log_text: "A shape in the fog.".into(),
            has_crisis: true,
            choices: choices(),
            ..ParsedTurnResult::default()
        };
        assert!(engine.settle_narration(&narration).is_none());
        assert_eq!(engine.state.day, 1);
        assert!(engine.narrate().is_err());

        let crisis = engine.crisis.take().unwrap();
        let judged = JudgedTurnResult {
            narrative_text: "You hide behind a car.".into(),
            state_update: Some(StateUpdate {
                score: Some(70),
                item_changes: ItemChanges {
                    remove: vec![],
                    add: vec![InventoryItem::new("hubcap", 1)],
                },
                ..StateUpdate::default()
            }),
        };
        engine.settle_judgement(&crisis, "B. Hide", &judged);

        assert_eq!(engine.state.day, 2);
        assert_eq!(engine.state.item_count("hubcap"), 1);
        let entry = &engine.state.history[0];
        assert_eq!(entry.player_action.as_deref(), Some("B. Hide"));
        assert_eq!(entry.judge_result.as_deref(), Some("You hide behind a car."));
        assert_eq!(engine.highlight, Some((70, "You hide behind a car.".into())));
    }

    #[test]
    fn judge_without_crisis_fails() {
        let (mut engine, _rx) = engine();
        assert!(engine.judge("A").is_err());
    }
}
