pub mod commands;
pub mod environment;
pub mod sanitizer;
pub mod shell;
pub mod validator;

pub use environment::*;
pub use sanitizer::*;
pub use shell::*;
pub use validator::*;

use regex::{Regex, RegexBuilder};
use std::collections::BTreeSet;

use crate::config::TerminalConfig;
use crate::protocol::{LabError, LabResult};

pub const DEFAULT_MAX_INPUT_LENGTH: usize = 500;

pub const DEFAULT_WHITELIST: &[&str] = &[
    "ls", "dir", "cd", "pwd", "cat", "head", "tail", "grep", "find",
    "echo", "whoami", "id", "hostname", "uname", "date", "cal",
    "nmap", "ping", "traceroute", "netstat", "curl", "wget",
    "ssh", "telnet", "nc", "nslookup", "dig", "whois",
    "file", "strings", "xxd", "base64", "md5sum", "sha256sum",
    "history", "clear", "help", "man",
];

// Matched case-insensitively against the raw input, before tokenization.
pub const DEFAULT_BLOCKED_PATTERNS: &[&str] = &[
    r"rm\s+-rf",
    r">\s*/dev/",
    r"mkfs",
    r"dd\s+if=",
    r"chmod\s+777",
    r"wget.*\|.*sh",
    r"curl.*\|.*sh",
];

/// Compiled global whitelist and blocklist shared by every lab terminal.
#[derive(Debug, Clone)]
pub struct TerminalPolicy {
    whitelist: BTreeSet<String>,
    blocked_patterns: Vec<Regex>,
    max_input_length: usize,
}

impl Default for TerminalPolicy {
    fn default() -> Self {
        Self {
            whitelist: DEFAULT_WHITELIST.iter().map(|c| c.to_string()).collect(),
            blocked_patterns: DEFAULT_BLOCKED_PATTERNS
                .iter()
                .filter_map(|pattern| compile_pattern(pattern).ok())
                .collect(),
            max_input_length: DEFAULT_MAX_INPUT_LENGTH,
        }
    }
}

impl TerminalPolicy {
    pub fn new<C, P, S>(whitelist: C, blocked_patterns: P) -> LabResult<Self>
    where
        C: IntoIterator<Item = String>,
        P: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let blocked_patterns = blocked_patterns
            .into_iter()
            .map(|pattern| compile_pattern(pattern.as_ref()))
            .collect::<LabResult<Vec<_>>>()?;

        Ok(Self {
            whitelist: whitelist.into_iter().map(|c| c.to_lowercase()).collect(),
            blocked_patterns,
            max_input_length: DEFAULT_MAX_INPUT_LENGTH,
        })
    }

    pub fn from_config(config: &TerminalConfig) -> LabResult<Self> {
        Ok(Self::new(config.whitelist.iter().cloned(), config.blocked_patterns.iter())?
            .with_max_input_length(config.max_input_length))
    }

    pub fn with_max_input_length(mut self, max_input_length: usize) -> Self {
        self.max_input_length = max_input_length;
        self
    }

    pub fn whitelist(&self) -> &BTreeSet<String> {
        &self.whitelist
    }

    pub fn blocked_patterns(&self) -> &[Regex] {
        &self.blocked_patterns
    }

    pub fn max_input_length(&self) -> usize {
        self.max_input_length
    }

    pub fn matches_blocked_pattern(&self, input: &str) -> bool {
        self.blocked_patterns.iter().any(|pattern| pattern.is_match(input))
    }
}

pub fn compile_pattern(pattern: &str) -> LabResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| LabError::Config(format!("Invalid blocked pattern '{}': {}", pattern, e)))
}
