use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::TerminalPolicy;

const SHELL_METACHARACTERS: &[&str] = &["&&", "||", ";", "`", "$(", "|"];
const TRAVERSAL_SEQUENCES: &[&str] = &["../", "..\\"];

/// Result of parsing one line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCommand {
    pub command: String,
    pub args: Vec<String>,
    pub raw: String,
    pub valid: bool,
    pub error: Option<String>,
}

/// Why the parser refused a line; used for audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    Empty,
    BlockedPattern,
    Metacharacter,
    PathTraversal,
    Syntax,
    NotAllowed,
}

impl ParsedCommand {
    fn accepted(command: String, args: Vec<String>, raw: &str) -> Self {
        Self {
            command,
            args,
            raw: raw.to_string(),
            valid: true,
            error: None,
        }
    }

    fn rejected(command: String, args: Vec<String>, raw: &str, error: String) -> Self {
        Self {
            command,
            args,
            raw: raw.to_string(),
            valid: false,
            error: Some(error),
        }
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }

    pub fn rejection(&self) -> Option<RejectReason> {
        if self.valid {
            return None;
        }

        let error = self.error_message();
        let reason = if error == "Empty command" {
            RejectReason::Empty
        } else if error.ends_with("Shell metacharacters not allowed") {
            RejectReason::Metacharacter
        } else if error.ends_with("Path traversal not allowed") {
            RejectReason::PathTraversal
        } else if error.starts_with("Command blocked") {
            RejectReason::BlockedPattern
        } else if error.starts_with("Invalid command syntax") {
            RejectReason::Syntax
        } else {
            RejectReason::NotAllowed
        };

        Some(reason)
    }
}

/// Validates raw input against the blocklist, the metacharacter and
/// traversal filters, and the command whitelist.
///
/// The raw-string checks always run before tokenization so that quoting
/// cannot hide a chained command inside one word.
#[derive(Debug, Clone)]
pub struct CommandParser<'a> {
    policy: &'a TerminalPolicy,
    allowed: &'a BTreeSet<String>,
}

impl<'a> CommandParser<'a> {
    /// `lab_allowed` overrides the global whitelist when non-empty.
    pub fn new(policy: &'a TerminalPolicy, lab_allowed: &'a BTreeSet<String>) -> Self {
        let allowed = if lab_allowed.is_empty() {
            policy.whitelist()
        } else {
            lab_allowed
        };

        Self { policy, allowed }
    }

    pub fn parse(&self, input: &str) -> ParsedCommand {
        let input = input.trim();

        if input.is_empty() {
            return ParsedCommand::rejected(String::new(), Vec::new(), input, "Empty command".to_string());
        }

        if let Some(reason) = self.check_raw_input(input) {
            return ParsedCommand::rejected(
                String::new(),
                Vec::new(),
                input,
                format!("Command blocked: {}", reason),
            );
        }

        let words = match shell_words::split(input) {
            Ok(words) => words,
            Err(e) => {
                return ParsedCommand::rejected(
                    String::new(),
                    Vec::new(),
                    input,
                    format!("Invalid command syntax: {}", e),
                );
            }
        };

        let mut words = words.into_iter();
        let command = match words.next() {
            Some(first) => first.to_lowercase(),
            None => {
                return ParsedCommand::rejected(String::new(), Vec::new(), input, "Empty command".to_string());
            }
        };
        let args: Vec<String> = words.collect();

        if !self.is_allowed(&command) {
            let error = format!("Command not allowed: {}", command);
            return ParsedCommand::rejected(command, args, input, error);
        }

        ParsedCommand::accepted(command, args, input)
    }

    pub fn is_allowed(&self, command: &str) -> bool {
        self.allowed.contains(command)
    }

    pub fn help_text(&self) -> String {
        let mut text = String::from("Available commands:");
        for command in self.allowed {
            text.push_str("\n  ");
            text.push_str(command);
        }
        text
    }

    fn check_raw_input(&self, input: &str) -> Option<&'static str> {
        if self.policy.matches_blocked_pattern(input) {
            return Some("Dangerous pattern detected");
        }

        if SHELL_METACHARACTERS.iter().any(|meta| input.contains(meta)) {
            return Some("Shell metacharacters not allowed");
        }

        if TRAVERSAL_SEQUENCES.iter().any(|seq| input.contains(seq)) {
            return Some("Path traversal not allowed");
        }

        None
    }
}
