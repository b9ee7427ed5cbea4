use crate::protocol::{
    message::*, LabCodec, LabError, LabMessage, LabResult, TERMLAB_VERSION,
};
use crate::security::{LabEvent, LabEventType};
use crate::server::LabService;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One client connection: a `Hello` handshake that names the student,
/// then a request/response loop until `Disconnect` or EOF.
pub struct Connection<S> {
    id: Uuid,
    stream: S,
    client_addr: String,
    service: Arc<LabService>,
    read_timeout: Duration,
    user_id: Option<String>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, client_addr: String, service: Arc<LabService>, read_timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            stream,
            client_addr,
            service,
            read_timeout,
            user_id: None,
        }
    }

    pub async fn handle(mut self) -> LabResult<()> {
        let user_id = self.handle_hello().await?;
        self.user_id = Some(user_id.clone());

        loop {
            let message = match self.read().await {
                Ok(message) => message,
                Err(LabError::Network(e)) => {
                    debug!(connection = %self.id, "Connection {} closed: {}", self.client_addr, e);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            debug!("Received {} from {}", message.message_type(), self.client_addr);

            let response = match message {
                LabMessage::Disconnect(msg) => {
                    info!("Client {} disconnected: {}", self.client_addr, msg.reason);
                    return Ok(());
                }
                LabMessage::Ping => LabMessage::Pong,
                request => self.dispatch(&user_id, request).await,
            };

            LabCodec::write_message(&mut self.stream, &response).await?;
        }
    }

    async fn handle_hello(&mut self) -> LabResult<String> {
        debug!("Waiting for hello from {}", self.client_addr);

        match self.read().await? {
            LabMessage::Hello(hello) => {
                if hello.version != TERMLAB_VERSION {
                    let error = LabError::Protocol(format!(
                        "Unsupported protocol version: {}. Expected: {}",
                        hello.version, TERMLAB_VERSION
                    ));
                    LabCodec::write_message(&mut self.stream, &LabMessage::error(&error)).await?;
                    return Err(error);
                }

                if hello.user_id.trim().is_empty() {
                    let error = LabError::Protocol("Missing user id".to_string());
                    LabCodec::write_message(&mut self.stream, &LabMessage::error(&error)).await?;
                    return Err(error);
                }

                info!(
                    connection = %self.id,
                    user = %hello.user_id,
                    client = %hello.client_name,
                    "Hello from {}",
                    self.client_addr
                );
                self.service
                    .record_event(LabEvent::new(
                        LabEventType::ClientConnected,
                        None,
                        format!("{} ({}) as user {}", self.client_addr, self.id, hello.user_id),
                    ))
                    .await;

                let welcome = LabMessage::Welcome(WelcomeMessage {
                    server_version: TERMLAB_VERSION.to_string(),
                    labs: self.service.summaries(),
                    message: Some("Welcome to Terminal Academy".to_string()),
                });
                LabCodec::write_message(&mut self.stream, &welcome).await?;
                Ok(hello.user_id)
            }
            other => {
                error!("Expected Hello message, got {:?}", other.message_type());
                let error = LabError::Protocol("Expected Hello message".to_string());
                LabCodec::write_message(&mut self.stream, &LabMessage::error(&error)).await?;
                Err(error)
            }
        }
    }

    async fn dispatch(&self, user_id: &str, request: LabMessage) -> LabMessage {
        let service = &self.service;

        let result = match request {
            LabMessage::StartLab(req) => service.start_lab(&req.lab_id, user_id).await.map(LabMessage::LabStarted),
            LabMessage::Execute(req) => service
                .execute_command(&req.lab_id, user_id, &req.command)
                .await
                .map(LabMessage::CommandResult),
            LabMessage::SubmitFlag(req) => service
                .submit_flag(&req.lab_id, user_id, &req.flag)
                .await
                .map(LabMessage::FlagResult),
            LabMessage::RequestHint(req) => service.request_hint(&req.lab_id, user_id).await.map(LabMessage::Hint),
            LabMessage::ResetLab(req) => service.reset_lab(&req.lab_id, user_id).await.map(LabMessage::LabReset),
            LabMessage::ViewSolution(req) => service.view_solution(&req.lab_id, user_id).await.map(LabMessage::Solution),
            other => Err(LabError::Protocol(format!("Unexpected {} message", other.message_type()))),
        };

        result.unwrap_or_else(|e| {
            warn!(user = %user_id, "Request from {} failed: {}", self.client_addr, e);
            LabMessage::error(&e)
        })
    }

    async fn read(&mut self) -> LabResult<LabMessage> {
        timeout(self.read_timeout, LabCodec::read_message(&mut self.stream))
            .await
            .map_err(|_| LabError::Network("Connection timeout".to_string()))?
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, LabCatalog};
    use crate::security::AuditLogger;
    use tokio::io::DuplexStream;

    fn service() -> Arc<LabService> {
        Arc::new(
            LabService::new(&Config::default(), LabCatalog::builtin())
                .unwrap()
                .with_audit(AuditLogger::disabled()),
        )
    }

    fn spawn_connection() -> DuplexStream {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let connection = Connection::new(server, "test".to_string(), service(), Duration::from_secs(5));
        tokio::spawn(connection.handle());
        client
    }

    async fn request(stream: &mut DuplexStream, message: LabMessage) -> LabMessage {
        LabCodec::write_message(stream, &message).await.unwrap();
        LabCodec::read_message(stream).await.unwrap()
    }

    fn hello(version: &str) -> LabMessage {
        LabMessage::Hello(HelloMessage {
            version: version.to_string(),
            user_id: "7".to_string(),
            client_name: "test".to_string(),
        })
    }

    #[tokio::test]
    async fn test_session_over_stream() {
        let mut client = spawn_connection();

        match request(&mut client, hello(TERMLAB_VERSION)).await {
            LabMessage::Welcome(welcome) => assert_eq!(welcome.labs[0].id, "intro-linux"),
            other => panic!("unexpected {}", other.message_type()),
        }

        let lab = LabRequest {
            lab_id: "intro-linux".to_string(),
        };
        match request(&mut client, LabMessage::StartLab(lab.clone())).await {
            LabMessage::LabStarted(started) => assert!(!started.resumed),
            other => panic!("unexpected {}", other.message_type()),
        }

        let execute = LabMessage::Execute(ExecuteMessage {
            lab_id: "intro-linux".to_string(),
            command: "cat welcome.txt".to_string(),
        });
        match request(&mut client, execute).await {
            LabMessage::CommandResult(result) => {
                assert!(result.output.starts_with("Welcome to Terminal Academy!"));
                assert_eq!(result.return_code, 0);
            }
            other => panic!("unexpected {}", other.message_type()),
        }

        assert!(matches!(request(&mut client, LabMessage::Ping).await, LabMessage::Pong));
    }

    #[tokio::test]
    async fn test_errors_become_messages() {
        let mut client = spawn_connection();
        request(&mut client, hello(TERMLAB_VERSION)).await;

        let hint = LabMessage::RequestHint(LabRequest {
            lab_id: "intro-linux".to_string(),
        });
        match request(&mut client, hint).await {
            LabMessage::Error(err) => assert_eq!(err.error_type, "attempt_not_found"),
            other => panic!("unexpected {}", other.message_type()),
        }

        match request(&mut client, LabMessage::Pong).await {
            LabMessage::Error(err) => assert_eq!(err.error_type, "protocol_error"),
            other => panic!("unexpected {}", other.message_type()),
        }
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let mut client = spawn_connection();
        match request(&mut client, hello("0.1")).await {
            LabMessage::Error(err) => assert!(err.message.contains("Unsupported protocol version")),
            other => panic!("unexpected {}", other.message_type()),
        }
    }
}
