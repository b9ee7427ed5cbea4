use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::Evaluation;
use crate::protocol::{LabError, LabResult};

/// One student's progress on one lab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabAttempt {
    pub user_id: String,
    pub lab_id: String,
    pub completed_objectives: BTreeSet<usize>,
    pub hints_used: usize,
    pub commands_executed: u64,
    pub completed: bool,
    pub solution_viewed: bool,
    pub xp_awarded: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintReveal {
    /// 1-based.
    pub hint_number: usize,
    pub hint_text: String,
    pub hints_remaining: usize,
}

impl LabAttempt {
    pub fn new(user_id: impl Into<String>, lab_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            lab_id: lab_id.into(),
            completed_objectives: BTreeSet::new(),
            hints_used: 0,
            commands_executed: 0,
            completed: false,
            solution_viewed: false,
            xp_awarded: false,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Merges an evaluation. Objectives are never un-completed here.
    pub fn apply(&mut self, evaluation: &Evaluation) {
        self.completed_objectives.extend(evaluation.newly_completed.iter().copied());
        if evaluation.now_complete {
            self.mark_completed();
        }
    }

    pub fn mark_completed(&mut self) {
        if !self.completed {
            self.completed = true;
            self.completed_at = Some(Utc::now());
        }
    }

    /// Returns `amount` the first time it is called on a completed attempt
    /// and `None` afterwards.
    pub fn claim_reward(&mut self, amount: u32) -> Option<u32> {
        if !self.completed || self.xp_awarded {
            return None;
        }
        self.xp_awarded = true;
        Some(amount)
    }

    /// Hints are handed out strictly in order.
    pub fn reveal_hint(&mut self, hints: &[String]) -> LabResult<HintReveal> {
        let hint_text = hints.get(self.hints_used).ok_or(LabError::HintsExhausted)?.clone();
        self.hints_used += 1;

        Ok(HintReveal {
            hint_number: self.hints_used,
            hint_text,
            hints_remaining: hints.len() - self.hints_used,
        })
    }

    /// Clears progress but keeps what was already spent: hints, the
    /// solution view and any XP already paid out.
    pub fn reset_progress(&mut self) {
        self.completed = false;
        self.completed_at = None;
        self.completed_objectives.clear();
        self.commands_executed = 0;
    }

    pub fn progress_percentage(&self, objective_count: usize) -> u8 {
        if objective_count == 0 {
            return if self.completed { 100 } else { 0 };
        }
        let done = self.completed_objectives.len().min(objective_count);
        (done * 100 / objective_count) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints() -> Vec<String> {
        vec!["first".to_string(), "second".to_string()]
    }

    #[test]
    fn test_hints_are_sequential() {
        let mut attempt = LabAttempt::new("u", "l");

        let first = attempt.reveal_hint(&hints()).unwrap();
        assert_eq!(first.hint_number, 1);
        assert_eq!(first.hint_text, "first");
        assert_eq!(first.hints_remaining, 1);

        let second = attempt.reveal_hint(&hints()).unwrap();
        assert_eq!(second.hint_number, 2);
        assert_eq!(second.hints_remaining, 0);
    }

    #[test]
    fn test_exhausted_hints_do_not_increment() {
        let mut attempt = LabAttempt::new("u", "l");
        attempt.reveal_hint(&hints()).unwrap();
        attempt.reveal_hint(&hints()).unwrap();

        assert!(matches!(attempt.reveal_hint(&hints()), Err(LabError::HintsExhausted)));
        assert_eq!(attempt.hints_used, 2);

        let mut empty = LabAttempt::new("u", "l");
        assert!(empty.reveal_hint(&[]).is_err());
        assert_eq!(empty.hints_used, 0);
    }

    #[test]
    fn test_reset_keeps_spent_state() {
        let mut attempt = LabAttempt::new("u", "l");
        attempt.reveal_hint(&hints()).unwrap();
        attempt.solution_viewed = true;
        attempt.commands_executed = 7;
        attempt.apply(&Evaluation {
            newly_completed: BTreeSet::from([0, 1]),
            now_complete: true,
        });
        assert_eq!(attempt.claim_reward(12), Some(12));

        attempt.reset_progress();

        assert!(attempt.completed_objectives.is_empty());
        assert_eq!(attempt.commands_executed, 0);
        assert!(!attempt.completed);
        assert!(attempt.completed_at.is_none());
        assert_eq!(attempt.hints_used, 1);
        assert!(attempt.solution_viewed);
        assert!(attempt.xp_awarded);
    }

    #[test]
    fn test_reward_claimed_once() {
        let mut attempt = LabAttempt::new("u", "l");
        assert_eq!(attempt.claim_reward(25), None);

        attempt.mark_completed();
        assert_eq!(attempt.claim_reward(25), Some(25));
        assert_eq!(attempt.claim_reward(25), None);
    }

    #[test]
    fn test_apply_is_monotonic() {
        let mut attempt = LabAttempt::new("u", "l");
        attempt.apply(&Evaluation {
            newly_completed: BTreeSet::from([0]),
            now_complete: false,
        });
        attempt.apply(&Evaluation::default());
        attempt.apply(&Evaluation {
            newly_completed: BTreeSet::from([0]),
            now_complete: false,
        });
        assert_eq!(attempt.completed_objectives, BTreeSet::from([0]));
        assert!(!attempt.completed);
    }

    #[test]
    fn test_progress_percentage() {
        let mut attempt = LabAttempt::new("u", "l");
        assert_eq!(attempt.progress_percentage(3), 0);
        attempt.completed_objectives.insert(0);
        assert_eq!(attempt.progress_percentage(3), 33);
        attempt.completed_objectives.extend([1, 2]);
        assert_eq!(attempt.progress_percentage(3), 100);
        assert_eq!(attempt.progress_percentage(0), 0);
    }
}
