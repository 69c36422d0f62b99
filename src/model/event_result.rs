use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyOutcome {
    Applied { change: String },
    Rejected { reason: String },
}

/// What happened to each part of one state update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub results: Vec<ApplyOutcome>,
}

impl ApplyReport {
    pub fn applied(&mut self, change: impl Into<String>) {
        self.results.push(ApplyOutcome::Applied {
            change: change.into(),
        });
    }

    pub fn rejected(&mut self, reason: impl Into<String>) {
        self.results.push(ApplyOutcome::Rejected {
            reason: reason.into(),
        });
    }

    pub fn rejections(&self) -> impl Iterator<Item = &str> {
        self.results.iter().filter_map(|r| match r {
            ApplyOutcome::Rejected { reason } => Some(reason.as_str()),
            ApplyOutcome::Applied { .. } => None,
        })
    }

    /// One-line description of the applied changes, kept in the day's history.
    pub fn summary(&self) -> String {
        let changes: Vec<&str> = self
            .results
            .iter()
            .filter_map(|r| match r {
                ApplyOutcome::Applied { change } => Some(change.as_str()),
                ApplyOutcome::Rejected { .. } => None,
            })
            .collect();
        if changes.is_empty() {
            "no change".to_string()
        } else {
            changes.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_only_applied_changes() {
        let mut report = ApplyReport::default();
        assert_eq!(report.summary(), "no change");
        report.applied("hp 50 -> 40");
        report.rejected("Item 'gun' not in inventory");
        report.applied("+1 flare");
        assert_eq!(report.summary(), "hp 50 -> 40, +1 flare");
    }
}
