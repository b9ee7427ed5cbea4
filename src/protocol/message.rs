use serde::{Deserialize, Serialize};

use crate::lab::{Difficulty, HintReveal, LabAttempt, LabDefinition};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LabMessage {
    // Handshake
    Hello(HelloMessage),
    Welcome(WelcomeMessage),

    // Lab lifecycle
    StartLab(LabRequest),
    LabStarted(LabStarted),
    ResetLab(LabRequest),
    LabReset(LabAttempt),

    // Terminal
    Execute(ExecuteMessage),
    CommandResult(CommandOutcome),

    // Scoring
    SubmitFlag(SubmitFlagMessage),
    FlagResult(FlagVerdict),
    RequestHint(LabRequest),
    Hint(HintReveal),
    ViewSolution(LabRequest),
    Solution(SolutionView),

    // Control
    Ping,
    Pong,
    Disconnect(DisconnectMessage),
    Error(ErrorMessage),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloMessage {
    pub version: String,
    /// Identity supplied by the embedding platform; not authenticated here.
    pub user_id: String,
    pub client_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeMessage {
    pub server_version: String,
    pub labs: Vec<LabSummary>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabRequest {
    pub lab_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteMessage {
    pub lab_id: String,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitFlagMessage {
    pub lab_id: String,
    pub flag: String,
}

/// The student-facing view of a lab. Flags, the solution guide and the
/// environment stay on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub time_limit: Option<u32>,
    pub xp_reward: u32,
    pub objectives: Vec<String>,
    pub hint_count: usize,
}

impl From<&LabDefinition> for LabSummary {
    fn from(lab: &LabDefinition) -> Self {
        Self {
            id: lab.id.clone(),
            title: lab.title.clone(),
            description: lab.description.clone(),
            difficulty: lab.difficulty,
            time_limit: lab.time_limit,
            xp_reward: lab.xp_reward,
            objectives: lab.objectives.iter().map(|o| o.description.clone()).collect(),
            hint_count: lab.hints.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabStarted {
    pub lab: LabSummary,
    pub attempt: LabAttempt,
    pub prompt: String,
    /// False the first time the student opens the lab.
    pub resumed: bool,
}

impl LabStarted {
    pub fn message(&self) -> &'static str {
        if self.resumed {
            "Lab resumed."
        } else {
            "Lab started!"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub output: String,
    pub return_code: i32,
    pub is_error: bool,
    pub prompt: String,
    /// Objective indices this command completed.
    pub objectives_completed: Vec<usize>,
    pub lab_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagVerdict {
    pub correct: bool,
    /// XP paid out by this submission; zero when nothing new was earned.
    pub xp_awarded: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionView {
    pub solution_guide: String,
    pub original_xp: u32,
    pub reduced_xp: u32,
    pub penalty_percent: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectMessage {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub error_type: String,
    pub message: String,
}

impl From<&super::LabError> for ErrorMessage {
    fn from(error: &super::LabError) -> Self {
        Self {
            error_type: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

impl LabMessage {
    pub fn message_type(&self) -> &'static str {
        match self {
            LabMessage::Hello(_) => "hello",
            LabMessage::Welcome(_) => "welcome",
            LabMessage::StartLab(_) => "start_lab",
            LabMessage::LabStarted(_) => "lab_started",
            LabMessage::ResetLab(_) => "reset_lab",
            LabMessage::LabReset(_) => "lab_reset",
            LabMessage::Execute(_) => "execute",
            LabMessage::CommandResult(_) => "command_result",
            LabMessage::SubmitFlag(_) => "submit_flag",
            LabMessage::FlagResult(_) => "flag_result",
            LabMessage::RequestHint(_) => "request_hint",
            LabMessage::Hint(_) => "hint",
            LabMessage::ViewSolution(_) => "view_solution",
            LabMessage::Solution(_) => "solution",
            LabMessage::Ping => "ping",
            LabMessage::Pong => "pong",
            LabMessage::Disconnect(_) => "disconnect",
            LabMessage::Error(_) => "error",
        }
    }

    pub fn error(error: &super::LabError) -> Self {
        LabMessage::Error(ErrorMessage::from(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab::demo_lab;
    use crate::protocol::LabError;

    #[test]
    fn test_summary_hides_answers() {
        let lab = demo_lab();
        let summary = LabSummary::from(&lab);
        assert_eq!(summary.id, "intro-linux");
        assert_eq!(summary.objectives.len(), lab.objectives.len());
        assert_eq!(summary.hint_count, 3);

        let encoded = serde_json::to_string(&summary).unwrap();
        assert!(!encoded.contains("FLAG{found_it}"));
    }

    #[test]
    fn test_error_message_from_lab_error() {
        let message = LabMessage::error(&LabError::HintsExhausted);
        match message {
            LabMessage::Error(err) => {
                assert_eq!(err.error_type, "hints_exhausted");
                assert_eq!(err.message, "No more hints available");
            }
            other => panic!("unexpected {}", other.message_type()),
        }
    }
}
