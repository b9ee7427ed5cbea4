pub mod terminal;

pub use terminal::*;

use crate::lab::{HintReveal, LabAttempt};
use crate::protocol::{
    message::*, LabCodec, LabError, LabMessage, LabResult, TERMLAB_VERSION,
};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Request/response client for a terminal lab server.
#[derive(Debug)]
pub struct LabClient {
    stream: Option<TcpStream>,
    server_addr: String,
    user_id: String,
    labs: Vec<LabSummary>,
}

impl LabClient {
    pub fn new(server_addr: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            stream: None,
            server_addr: server_addr.into(),
            user_id: user_id.into(),
            labs: Vec::new(),
        }
    }

    pub async fn connect(&mut self) -> LabResult<WelcomeMessage> {
        info!("Connecting to terminal lab server at {}", self.server_addr);

        let stream = TcpStream::connect(&self.server_addr)
            .await
            .map_err(|e| LabError::Network(format!("Failed to connect to {}: {}", self.server_addr, e)))?;
        self.stream = Some(stream);

        let hello = LabMessage::Hello(HelloMessage {
            version: TERMLAB_VERSION.to_string(),
            user_id: self.user_id.clone(),
            client_name: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        });

        match self.request(hello).await? {
            LabMessage::Welcome(welcome) => {
                info!("Connected to server (version {})", welcome.server_version);
                debug!("Available labs: {:?}", welcome.labs.iter().map(|l| &l.id).collect::<Vec<_>>());
                self.labs = welcome.labs.clone();
                Ok(welcome)
            }
            other => Err(unexpected(&other)),
        }
    }

    pub async fn start_lab(&mut self, lab_id: &str) -> LabResult<LabStarted> {
        match self.request(LabMessage::StartLab(lab_request(lab_id))).await? {
            LabMessage::LabStarted(started) => Ok(started),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn execute(&mut self, lab_id: &str, command: &str) -> LabResult<CommandOutcome> {
        let message = LabMessage::Execute(ExecuteMessage {
            lab_id: lab_id.to_string(),
            command: command.to_string(),
        });
        match self.request(message).await? {
            LabMessage::CommandResult(outcome) => Ok(outcome),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn submit_flag(&mut self, lab_id: &str, flag: &str) -> LabResult<FlagVerdict> {
        let message = LabMessage::SubmitFlag(SubmitFlagMessage {
            lab_id: lab_id.to_string(),
            flag: flag.to_string(),
        });
        match self.request(message).await? {
            LabMessage::FlagResult(verdict) => Ok(verdict),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn request_hint(&mut self, lab_id: &str) -> LabResult<HintReveal> {
        match self.request(LabMessage::RequestHint(lab_request(lab_id))).await? {
            LabMessage::Hint(hint) => Ok(hint),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn reset_lab(&mut self, lab_id: &str) -> LabResult<LabAttempt> {
        match self.request(LabMessage::ResetLab(lab_request(lab_id))).await? {
            LabMessage::LabReset(attempt) => Ok(attempt),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn view_solution(&mut self, lab_id: &str) -> LabResult<SolutionView> {
        match self.request(LabMessage::ViewSolution(lab_request(lab_id))).await? {
            LabMessage::Solution(view) => Ok(view),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn ping(&mut self) -> LabResult<()> {
        match self.request(LabMessage::Ping).await? {
            LabMessage::Pong => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn disconnect(&mut self) -> LabResult<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };

        let message = LabMessage::Disconnect(DisconnectMessage {
            reason: "Client requested disconnect".to_string(),
        });
        if let Err(e) = LabCodec::write_message(&mut stream, &message).await {
            warn!("Failed to send disconnect message: {}", e);
        }

        info!("Disconnected from terminal lab server");
        Ok(())
    }

    /// Sends one request and waits for its reply. Server `Error` replies
    /// become `LabError::Remote`.
    async fn request(&mut self, message: LabMessage) -> LabResult<LabMessage> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| LabError::Network("Not connected".to_string()))?;

        LabCodec::write_message(stream, &message).await?;
        match LabCodec::read_message(stream).await? {
            LabMessage::Error(err) => Err(LabError::Remote {
                kind: err.error_type,
                message: err.message,
            }),
            reply => Ok(reply),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn labs(&self) -> &[LabSummary] {
        &self.labs
    }
}

fn lab_request(lab_id: &str) -> LabRequest {
    LabRequest {
        lab_id: lab_id.to_string(),
    }
}

fn unexpected(message: &LabMessage) -> LabError {
    LabError::Protocol(format!("Unexpected {} response", message.message_type()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = LabClient::new("127.0.0.1:4242", "7");
        assert!(!client.is_connected());
        assert_eq!(client.user_id(), "7");
        assert!(client.labs().is_empty());
    }

    #[tokio::test]
    async fn test_request_requires_connection() {
        let mut client = LabClient::new("127.0.0.1:4242", "7");
        assert!(matches!(client.ping().await, Err(LabError::Network(_))));
        assert!(client.disconnect().await.is_ok());
    }
}
