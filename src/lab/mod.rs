pub mod attempt;
pub mod evaluator;

pub use attempt::*;
pub use evaluator::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::protocol::{LabError, LabResult};
use crate::sandbox::EnvironmentConfig;

pub const DEFAULT_XP_REWARD: u32 = 25;
pub const DEFAULT_SOLUTION_PENALTY: u32 = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    Expert,
}

/// What a student has to do to tick an objective off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ObjectiveKind {
    /// Run the named command (compared case-insensitively).
    Command { command: String },
    /// Produce output containing the text (case-insensitive).
    Output { contains: String },
    /// Make any of the lab's flags show up in a command's output.
    Flag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub kind: ObjectiveKind,
    /// Independent objectives can complete before the ones listed above them.
    #[serde(default)]
    pub independent: bool,
}

impl Objective {
    pub fn new(description: impl Into<String>, kind: ObjectiveKind) -> Self {
        Self {
            description: description.into(),
            kind,
            independent: false,
        }
    }

    pub fn command(command: impl Into<String>) -> Self {
        let command = command.into();
        Self::new(format!("Run {}", command), ObjectiveKind::Command { command })
    }

    pub fn output(contains: impl Into<String>) -> Self {
        let contains = contains.into();
        Self::new(format!("Find \"{}\"", contains), ObjectiveKind::Output { contains })
    }

    pub fn flag() -> Self {
        Self::new("Capture the flag", ObjectiveKind::Flag)
    }

    pub fn independent(mut self) -> Self {
        self.independent = true;
        self
    }
}

fn default_xp_reward() -> u32 {
    DEFAULT_XP_REWARD
}

fn default_penalty() -> u32 {
    DEFAULT_SOLUTION_PENALTY
}

/// A hands-on terminal exercise as authored by course staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Minutes; informational only.
    #[serde(default)]
    pub time_limit: Option<u32>,
    #[serde(default = "default_xp_reward")]
    pub xp_reward: u32,
    #[serde(default = "default_penalty")]
    pub xp_penalty_for_solution: u32,
    /// Overrides the global whitelist when non-empty.
    #[serde(default)]
    pub allowed_commands: BTreeSet<String>,
    #[serde(default)]
    pub objectives: Vec<Objective>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub solution_guide: String,
    #[serde(default)]
    pub environment: EnvironmentConfig,
}

impl LabDefinition {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            difficulty: Difficulty::default(),
            time_limit: None,
            xp_reward: DEFAULT_XP_REWARD,
            xp_penalty_for_solution: DEFAULT_SOLUTION_PENALTY,
            allowed_commands: BTreeSet::new(),
            objectives: Vec::new(),
            hints: Vec::new(),
            flags: Vec::new(),
            solution_guide: String::new(),
            environment: EnvironmentConfig::default(),
        }
    }

    pub fn with_objectives(mut self, objectives: Vec<Objective>) -> Self {
        self.objectives = objectives;
        self
    }

    pub fn with_hints<I, S>(mut self, hints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hints = hints.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_allowed_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_commands = commands.into_iter().map(|c| c.into().to_lowercase()).collect();
        self
    }

    pub fn with_environment(mut self, environment: EnvironmentConfig) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_solution(mut self, guide: impl Into<String>) -> Self {
        self.solution_guide = guide.into();
        self
    }

    pub fn with_xp(mut self, xp_reward: u32, penalty_percent: u32) -> Self {
        self.xp_reward = xp_reward;
        self.xp_penalty_for_solution = penalty_percent;
        self
    }

    /// Explicit flag submission: trimmed, exact and case-sensitive. The
    /// implicit flag objective is case-insensitive; both behaviors are kept.
    pub fn accepts_flag(&self, submitted: &str) -> bool {
        let submitted = submitted.trim();
        !submitted.is_empty() && self.flags.iter().any(|flag| flag.trim() == submitted)
    }

    /// XP this lab pays out, after the solution penalty if it applies.
    pub fn reward(&self, solution_viewed: bool) -> u32 {
        reward_for(self.xp_reward, self.xp_penalty_for_solution, solution_viewed)
    }

    /// Authoring checks applied when a lab is loaded.
    pub fn validate(&self) -> LabResult<()> {
        if self.id.trim().is_empty() {
            return Err(LabError::InvalidLab("lab id must not be empty".to_string()));
        }

        if self.title.trim().is_empty() {
            return Err(LabError::InvalidLab(format!("lab '{}' has no title", self.id)));
        }

        if self.xp_penalty_for_solution > 100 {
            return Err(LabError::InvalidLab(format!(
                "lab '{}': solution penalty {}% exceeds 100%",
                self.id, self.xp_penalty_for_solution
            )));
        }

        if self.flags.iter().any(|flag| flag.trim().is_empty()) {
            return Err(LabError::InvalidLab(format!("lab '{}' has an empty flag", self.id)));
        }

        if self.hints.iter().any(|hint| hint.trim().is_empty()) {
            return Err(LabError::InvalidLab(format!("lab '{}' has an empty hint", self.id)));
        }

        for (index, objective) in self.objectives.iter().enumerate() {
            match &objective.kind {
                ObjectiveKind::Command { command } if command.trim().is_empty() => {
                    return Err(LabError::InvalidLab(format!(
                        "lab '{}': objective {} names no command",
                        self.id, index
                    )));
                }
                ObjectiveKind::Output { contains } if contains.is_empty() => {
                    return Err(LabError::InvalidLab(format!(
                        "lab '{}': objective {} has empty output text",
                        self.id, index
                    )));
                }
                ObjectiveKind::Flag if self.flags.is_empty() => {
                    return Err(LabError::InvalidLab(format!(
                        "lab '{}': objective {} expects a flag but the lab defines none",
                        self.id, index
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// `xp * (100 - penalty) / 100` once the solution was viewed, else `xp`.
pub fn reward_for(xp_reward: u32, penalty_percent: u32, solution_viewed: bool) -> u32 {
    if !solution_viewed {
        return xp_reward;
    }
    let keep = 100u32.saturating_sub(penalty_percent);
    (u64::from(xp_reward) * u64::from(keep) / 100) as u32
}

/// The lab shipped with the server, used when no lab directory is configured.
pub fn demo_lab() -> LabDefinition {
    LabDefinition::new("intro-linux", "Linux Basics: Hidden Files")
        .with_objectives(vec![
            Objective::new("List the contents of your home directory", ObjectiveKind::Command {
                command: "ls".to_string(),
            }),
            Objective::new("Read the notes left for you", ObjectiveKind::Output {
                contains: "Hidden files start with a dot".to_string(),
            }),
            Objective::new("Find the hidden flag", ObjectiveKind::Flag),
        ])
        .with_hints([
            "Start by listing what is in your home directory.",
            "Files whose names start with a dot are hidden. Try ls -la.",
            "cat the hidden file to read its contents.",
        ])
        .with_flags(["FLAG{found_it}"])
        .with_solution("1. ls -la\n2. cat notes.txt\n3. cat .secret.txt\n4. Submit FLAG{found_it}")
}
