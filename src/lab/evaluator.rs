use std::collections::BTreeSet;

use super::{LabAttempt, LabDefinition, ObjectiveKind};
use crate::sandbox::{ParsedCommand, SimulatedOutput};

/// Outcome of checking one executed command against a lab's objectives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub newly_completed: BTreeSet<usize>,
    pub now_complete: bool,
}

impl Evaluation {
    pub fn is_empty(&self) -> bool {
        self.newly_completed.is_empty()
    }
}

/// Pure objective matcher; the caller applies the result to the attempt.
pub struct ObjectiveEvaluator;

impl ObjectiveEvaluator {
    pub fn evaluate(
        attempt: &LabAttempt,
        lab: &LabDefinition,
        parsed: &ParsedCommand,
        output: &SimulatedOutput,
    ) -> Evaluation {
        // Rejected input echoes the typed text back, so it must never count.
        if !parsed.valid {
            return Evaluation::default();
        }

        let mut newly_completed = BTreeSet::new();
        let lowered_output = output.output.to_lowercase();

        for (index, objective) in lab.objectives.iter().enumerate() {
            if attempt.completed_objectives.contains(&index) {
                continue;
            }

            // Earlier objectives must already be complete, not merely
            // completed by this same command.
            if !objective.independent && !(0..index).all(|i| attempt.completed_objectives.contains(&i)) {
                continue;
            }

            let satisfied = match &objective.kind {
                ObjectiveKind::Command { command } => parsed.command.eq_ignore_ascii_case(command.trim()),
                ObjectiveKind::Output { contains } => lowered_output.contains(&contains.to_lowercase()),
                ObjectiveKind::Flag => lab
                    .flags
                    .iter()
                    .any(|flag| !flag.is_empty() && lowered_output.contains(&flag.to_lowercase())),
            };

            if satisfied {
                newly_completed.insert(index);
            }
        }

        let total_completed = attempt.completed_objectives.union(&newly_completed).count();
        let now_complete = !lab.objectives.is_empty() && total_completed >= lab.objectives.len();

        Evaluation {
            newly_completed,
            now_complete,
        }
    }
}
