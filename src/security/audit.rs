use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::SecurityConfig;
use crate::protocol::{LabError, LabResult, SessionKey};
use crate::sandbox::{ParsedCommand, RejectReason, SimulatedOutput};

/// Stored command output is capped at this many characters.
pub const MAX_LOGGED_OUTPUT: usize = 5000;

/// One line of the command log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub lab_id: String,
    pub command: String,
    pub output: String,
    pub return_code: i32,
    pub was_blocked: bool,
    pub blocked_reason: Option<RejectReason>,
}

impl CommandRecord {
    pub fn new(key: &SessionKey, command: &str, parsed: &ParsedCommand, output: &SimulatedOutput) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id: key.user_id.clone(),
            lab_id: key.lab_id.clone(),
            command: command.to_string(),
            output: output.output.chars().take(MAX_LOGGED_OUTPUT).collect(),
            return_code: output.return_code,
            was_blocked: !parsed.valid,
            blocked_reason: parsed.rejection(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabEventType {
    ClientConnected,
    ClientDisconnected,
    LabStarted,
    LabCompleted,
    FlagSubmitted,
    HintRevealed,
    SolutionViewed,
    LabReset,
    RateLimitExceeded,
    SessionLimitReached,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabEvent {
    pub event_type: LabEventType,
    pub user_id: Option<String>,
    pub lab_id: Option<String>,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl LabEvent {
    pub fn new(event_type: LabEventType, key: Option<&SessionKey>, details: impl Into<String>) -> Self {
        Self {
            event_type,
            user_id: key.map(|k| k.user_id.clone()),
            lab_id: key.map(|k| k.lab_id.clone()),
            details: details.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Appends JSON lines to the audit file and mirrors every entry as a
/// tracing event.
#[derive(Debug)]
pub struct AuditLogger {
    log_file: Option<PathBuf>,
    enabled: bool,
    file_mutex: Mutex<()>,
}

impl AuditLogger {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            log_file: config.audit_log_file.clone(),
            enabled: config.enable_audit,
            file_mutex: Mutex::new(()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            log_file: None,
            enabled: false,
            file_mutex: Mutex::new(()),
        }
    }

    pub async fn log_command(&self, record: &CommandRecord) -> LabResult<()> {
        if !self.enabled {
            return Ok(());
        }

        if record.was_blocked {
            tracing::warn!(
                user = %record.user_id,
                lab = %record.lab_id,
                command = %record.command,
                reason = ?record.blocked_reason,
                "Command blocked"
            );
        } else {
            tracing::info!(
                user = %record.user_id,
                lab = %record.lab_id,
                command = %record.command,
                return_code = record.return_code,
                "Command executed"
            );
        }

        if let Some(ref log_file) = self.log_file {
            let line = serde_json::to_string(record)
                .map_err(|e| LabError::Config(format!("Failed to encode audit record: {}", e)))?;
            self.append_line(log_file, &line).await?;
        }

        Ok(())
    }

    pub async fn log_event(&self, event: LabEvent) -> LabResult<()> {
        if !self.enabled {
            return Ok(());
        }

        debug!("Lab event: {:?}", event);

        match event.event_type {
            LabEventType::RateLimitExceeded | LabEventType::SessionLimitReached => {
                tracing::warn!(
                    event_type = ?event.event_type,
                    user = ?event.user_id,
                    lab = ?event.lab_id,
                    details = %event.details,
                    "Lab event"
                );
            }
            _ => {
                tracing::info!(
                    event_type = ?event.event_type,
                    user = ?event.user_id,
                    lab = ?event.lab_id,
                    "Lab event"
                );
            }
        }

        if let Some(ref log_file) = self.log_file {
            let line = serde_json::to_string(&event)
                .map_err(|e| LabError::Config(format!("Failed to encode audit event: {}", e)))?;
            self.append_line(log_file, &line).await?;
        }

        Ok(())
    }

    async fn append_line(&self, log_file: &Path, line: &str) -> LabResult<()> {
        let _guard = self.file_mutex.lock().await;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(|e| LabError::Config(format!("Failed to open audit log: {}", e)))?;

        writeln!(file, "{}", line).map_err(|e| LabError::Config(format!("Failed to write audit log: {}", e)))?;

        file.flush()
            .map_err(|e| LabError::Config(format!("Failed to flush audit log: {}", e)))?;

        Ok(())
    }

    pub fn log_file_path(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{CommandParser, TerminalPolicy};
    use std::collections::BTreeSet;
    use tempfile::NamedTempFile;

    fn parse(input: &str) -> ParsedCommand {
        let policy = TerminalPolicy::default();
        let allowed = BTreeSet::new();
        CommandParser::new(&policy, &allowed).parse(input)
    }

    #[tokio::test]
    async fn test_command_log_lines() {
        let temp_file = NamedTempFile::new().unwrap();
        let config = SecurityConfig {
            enable_audit: true,
            audit_log_file: Some(temp_file.path().to_path_buf()),
        };
        let logger = AuditLogger::new(&config);
        let key = SessionKey::new("7", "intro-linux");

        let parsed = parse("ls -la");
        logger
            .log_command(&CommandRecord::new(&key, "ls -la", &parsed, &SimulatedOutput::ok("a  b")))
            .await
            .unwrap();

        let blocked = parse("ls; rm x");
        let output = SimulatedOutput::error(blocked.error_message());
        logger
            .log_command(&CommandRecord::new(&key, "ls; rm x", &blocked, &output))
            .await
            .unwrap();

        logger
            .log_event(LabEvent::new(LabEventType::FlagSubmitted, Some(&key), "correct"))
            .await
            .unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);

        let first: CommandRecord = serde_json::from_str(lines[0]).unwrap();
        assert!(!first.was_blocked);
        assert_eq!(first.user_id, "7");

        let second: CommandRecord = serde_json::from_str(lines[1]).unwrap();
        assert!(second.was_blocked);
        assert_eq!(second.blocked_reason, Some(RejectReason::Metacharacter));

        assert!(lines[2].contains("FlagSubmitted"));
    }

    #[test]
    fn test_output_is_truncated() {
        let key = SessionKey::new("u", "l");
        let parsed = parse("cat big");
        let output = SimulatedOutput::ok("x".repeat(MAX_LOGGED_OUTPUT + 100));
        let record = CommandRecord::new(&key, "cat big", &parsed, &output);
        assert_eq!(record.output.len(), MAX_LOGGED_OUTPUT);
    }

    #[tokio::test]
    async fn test_disabled_logger_writes_nothing() {
        let temp_file = NamedTempFile::new().unwrap();
        let config = SecurityConfig {
            enable_audit: false,
            audit_log_file: Some(temp_file.path().to_path_buf()),
        };
        let logger = AuditLogger::new(&config);
        assert!(!logger.is_enabled());

        logger
            .log_event(LabEvent::new(LabEventType::ClientConnected, None, "127.0.0.1"))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(temp_file.path()).unwrap(), "");
    }
}
