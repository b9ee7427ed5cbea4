pub mod connection;
pub mod service;
pub mod store;

pub use connection::*;
pub use service::*;
pub use store::*;

use crate::config::{Config, LabCatalog};
use crate::protocol::{LabError, LabResult};
use crate::security::{LabEvent, LabEventType};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct LabServer {
    config: Arc<Config>,
    service: Arc<LabService>,
    active_connections: Arc<AtomicUsize>,
    listener: Option<TcpListener>,
    janitor: Option<JoinHandle<()>>,
    started_at: Instant,
}

impl LabServer {
    pub fn new(config: Config, catalog: LabCatalog) -> LabResult<Self> {
        config.validate()?;
        let service = LabService::new(&config, catalog)?;

        Ok(Self {
            config: Arc::new(config),
            service: Arc::new(service),
            active_connections: Arc::new(AtomicUsize::new(0)),
            listener: None,
            janitor: None,
            started_at: Instant::now(),
        })
    }

    pub async fn start(&mut self) -> LabResult<()> {
        let bind_addr = self.config.bind_address();

        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| LabError::Network(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        info!("Terminal lab server listening on {}", bind_addr);
        self.listener = Some(listener);
        self.janitor = Some(self.spawn_janitor());

        while let Some(ref listener) = self.listener {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let current = self.active_connections.load(Ordering::SeqCst);
                    if current >= self.config.server.max_connections {
                        warn!("Connection limit reached, rejecting connection from {}", addr);
                        drop(stream);
                        continue;
                    }

                    info!("New connection from {}", addr);
                    self.active_connections.fetch_add(1, Ordering::SeqCst);

                    let service = Arc::clone(&self.service);
                    let active = Arc::clone(&self.active_connections);
                    let read_timeout = Duration::from_secs(self.config.server.connection_timeout_seconds);

                    tokio::spawn(async move {
                        let connection = Connection::new(stream, addr.to_string(), Arc::clone(&service), read_timeout);
                        if let Err(e) = connection.handle().await {
                            error!("Connection error from {}: {}", addr, e);
                        }
                        active.fetch_sub(1, Ordering::SeqCst);
                        service
                            .record_event(LabEvent::new(LabEventType::ClientDisconnected, None, addr.to_string()))
                            .await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }

        Ok(())
    }

    /// Evicts idle simulators every minute.
    fn spawn_janitor(&self) -> JoinHandle<()> {
        let service = Arc::clone(&self.service);
        let max_idle = Duration::from_secs(self.config.server.session_idle_minutes * 60);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                service.evict_idle(max_idle).await;
            }
        })
    }

    pub async fn stop(&mut self) -> LabResult<()> {
        info!("Stopping terminal lab server");

        self.listener = None;
        if let Some(janitor) = self.janitor.take() {
            janitor.abort();
        }

        info!("Terminal lab server stopped");
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn service(&self) -> Arc<LabService> {
        Arc::clone(&self.service)
    }

    pub async fn stats(&self) -> ServerStats {
        ServerStats {
            active_connections: self.active_connections.load(Ordering::SeqCst),
            active_simulators: self.service.active_simulators().await,
            max_connections: self.config.server.max_connections,
            labs: self.service.catalog().len(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub active_connections: usize,
    pub active_simulators: usize,
    pub max_connections: usize,
    pub labs: usize,
    pub uptime_seconds: u64,
}
