use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};

use super::commands::{self, CommandFault};
use super::{EnvironmentConfig, NetworkConfig, Node, ParsedCommand};

pub const DEFAULT_HISTORY_LIMIT: usize = 1000;
pub const INITIAL_DIRECTORY: &str = "/home/student";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedOutput {
    pub output: String,
    pub return_code: i32,
    pub is_error: bool,
}

impl SimulatedOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            return_code: 0,
            is_error: false,
        }
    }

    /// A Unix-style failure: return code 1 and flagged as an error.
    pub fn error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            return_code: 1,
            is_error: true,
        }
    }

    /// Non-zero exit status that is not an error, like grep without matches.
    pub fn status(output: impl Into<String>, return_code: i32) -> Self {
        Self {
            output: output.into(),
            return_code,
            is_error: false,
        }
    }

    pub fn not_implemented(command: &str) -> Self {
        Self {
            output: format!("Command not implemented: {}", command),
            return_code: 127,
            is_error: true,
        }
    }
}

/// In-memory Unix-like machine that answers commands with computed output.
///
/// Nothing here touches the host: the filesystem and network are the maps
/// from the lab's [`EnvironmentConfig`].
#[derive(Debug, Clone)]
pub struct EnvironmentSimulator {
    filesystem: BTreeMap<String, Node>,
    network: NetworkConfig,
    user: String,
    hostname: String,
    current_directory: String,
    command_history: VecDeque<String>,
    history_limit: usize,
    clock: Option<DateTime<Utc>>,
}

impl EnvironmentSimulator {
    pub fn new(config: &EnvironmentConfig, history_limit: usize) -> Self {
        Self {
            filesystem: config.effective_filesystem(),
            network: config.network.clone(),
            user: config.simulated_user.clone(),
            hostname: config.simulated_hostname.clone(),
            current_directory: INITIAL_DIRECTORY.to_string(),
            command_history: VecDeque::new(),
            history_limit: history_limit.max(1),
            clock: None,
        }
    }

    /// Pins every timestamp the simulator prints.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn execute(&mut self, parsed: &ParsedCommand) -> SimulatedOutput {
        if !parsed.valid {
            return SimulatedOutput::error(parsed.error_message());
        }

        self.record_history(&parsed.raw);

        let handler = match commands::handler_for(&parsed.command) {
            Some(handler) => handler,
            None => return SimulatedOutput::not_implemented(&parsed.command),
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(self, &parsed.args)));
        match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(fault)) => SimulatedOutput::error(format!("Error: {}", fault)),
            Err(payload) => {
                let fault = CommandFault::from_panic(payload.as_ref());
                SimulatedOutput::error(format!("Error: {}", fault))
            }
        }
    }

    pub fn prompt(&self) -> String {
        format!("{}@{}:{}$ ", self.user, self.hostname, self.current_directory)
    }

    /// Textual path resolution: `.`/empty is the cwd, absolute paths are
    /// taken verbatim, a bare `..` is the parent of the cwd, anything else
    /// is appended to the cwd. Segments inside longer paths are not
    /// normalized.
    pub fn resolve(&self, path: &str) -> String {
        if path.is_empty() || path == "." {
            return self.current_directory.clone();
        }
        if path.starts_with('/') {
            return path.to_string();
        }
        if path == ".." {
            return match self.current_directory.rsplit_once('/') {
                Some((parent, _)) if !parent.is_empty() => parent.to_string(),
                _ => "/".to_string(),
            };
        }
        super::join_path(&self.current_directory, path)
    }

    pub fn lookup(&self, path: &str) -> Option<&Node> {
        self.filesystem.get(&self.resolve(path))
    }

    pub fn filesystem(&self) -> &BTreeMap<String, Node> {
        &self.filesystem
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn current_directory(&self) -> &str {
        &self.current_directory
    }

    pub(crate) fn set_current_directory(&mut self, path: String) {
        self.current_directory = path;
    }

    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.command_history.iter().map(String::as_str)
    }

    pub fn history_len(&self) -> usize {
        self.command_history.len()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    fn record_history(&mut self, raw: &str) {
        self.command_history.push_back(raw.to_string());
        while self.command_history.len() > self.history_limit {
            self.command_history.pop_front();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sandbox::{CommandParser, TerminalPolicy};
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    pub(crate) fn simulator() -> EnvironmentSimulator {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        EnvironmentSimulator::new(&EnvironmentConfig::default(), DEFAULT_HISTORY_LIMIT).with_clock(now)
    }

    pub(crate) fn run(sim: &mut EnvironmentSimulator, input: &str) -> SimulatedOutput {
        let policy = TerminalPolicy::default();
        let allowed = BTreeSet::new();
        let parsed = CommandParser::new(&policy, &allowed).parse(input);
        sim.execute(&parsed)
    }

    #[test]
    fn test_initial_prompt() {
        let sim = simulator();
        assert_eq!(sim.prompt(), "student@academy-lab:/home/student$ ");
    }

    #[test]
    fn test_custom_identity_in_prompt() {
        let config = EnvironmentConfig::default().with_identity("alice", "target-box");
        let sim = EnvironmentSimulator::new(&config, 10);
        assert_eq!(sim.prompt(), "alice@target-box:/home/student$ ");
    }

    #[test]
    fn test_resolve_rules() {
        let mut sim = simulator();
        assert_eq!(sim.resolve(""), "/home/student");
        assert_eq!(sim.resolve("."), "/home/student");
        assert_eq!(sim.resolve("/etc/passwd"), "/etc/passwd");
        assert_eq!(sim.resolve(".."), "/home");
        assert_eq!(sim.resolve("tools"), "/home/student/tools");
        assert_eq!(sim.resolve("tools/"), "/home/student/tools/");
        // No normalization of inner segments.
        assert_eq!(sim.resolve("./notes.txt"), "/home/student/./notes.txt");

        sim.set_current_directory("/".to_string());
        assert_eq!(sim.resolve("etc"), "/etc");
        assert_eq!(sim.resolve(".."), "/");

        sim.set_current_directory("/home".to_string());
        assert_eq!(sim.resolve(".."), "/");
    }

    #[test]
    fn test_invalid_parse_leaves_state_untouched() {
        let mut sim = simulator();
        let output = run(&mut sim, "ls; cd /");
        assert!(output.is_error);
        assert_eq!(output.return_code, 1);
        assert_eq!(output.output, "Command blocked: Shell metacharacters not allowed");
        assert_eq!(sim.history_len(), 0);
        assert_eq!(sim.current_directory(), "/home/student");
    }

    #[test]
    fn test_whitelisted_without_handler() {
        let mut sim = simulator();
        let output = run(&mut sim, "telnet 10.0.0.1");
        assert_eq!(output.return_code, 127);
        assert!(output.is_error);
        assert_eq!(output.output, "Command not implemented: telnet");
        assert_eq!(sim.history_len(), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut sim = EnvironmentSimulator::new(&EnvironmentConfig::default(), 3);
        for cmd in ["pwd", "whoami", "id", "hostname"] {
            run(&mut sim, cmd);
        }
        let history: Vec<&str> = sim.history().collect();
        assert_eq!(history, vec!["whoami", "id", "hostname"]);
    }

    #[test]
    fn test_malformed_environment_reported_as_error() {
        let mut host = crate::sandbox::HostProfile::default();
        host.ports.insert("ssh".to_string(), crate::sandbox::PortInfo::new("ssh", ""));
        let config = EnvironmentConfig::default().with_host("10.0.0.9", host);
        let mut sim = EnvironmentSimulator::new(&config, 10);

        let output = run(&mut sim, "nmap 10.0.0.9");
        assert!(output.is_error);
        assert_eq!(output.return_code, 1);
        assert!(output.output.starts_with("Error: "));
    }
}
