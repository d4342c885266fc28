use anyhow::Result;
use log::{info, error, debug, warn};
use shared::{Config, ClientMessage, DaemonMessage, protocol};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use crate::controller::CaptureController;

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

pub struct Daemon {
    controller: CaptureController,
    timeout: Duration,
    shutdown: CancellationToken,
}

impl Daemon {
    pub fn new(config: Config) -> Result<Self> {
        let timeout = Duration::from_secs(config.ipc.timeout_seconds);
        let controller = CaptureController::with_defaults(config.capture)?;
        Ok(Self::with_controller(controller, timeout))
    }

    pub fn with_controller(controller: CaptureController, timeout: Duration) -> Self {
        Self {
            controller,
            timeout,
            shutdown: CancellationToken::new(),
        }
    }

    pub async fn handle_message(&self, message: ClientMessage) -> DaemonMessage {
        debug!("Handling client message: {:?}", message);

        match message {
            ClientMessage::StartCapture { max_attempts, attempt_duration_ms } => {
                self.start_capture(max_attempts, attempt_duration_ms).await
            }
            ClientMessage::StopCapture => {
                self.controller.stop().await;
                DaemonMessage::CaptureStopped
            }
            ClientMessage::GetStatus => {
                DaemonMessage::Status(self.controller.status().await)
            }
            ClientMessage::Shutdown => {
                info!("Received shutdown command");
                self.controller.stop().await;
                self.shutdown.cancel();
                DaemonMessage::CaptureStopped
            }
        }
    }

    async fn start_capture(&self, max_attempts: Option<u32>, attempt_duration_ms: Option<u64>) -> DaemonMessage {
        let defaults = self.controller.config();
        let max_attempts = max_attempts.unwrap_or(defaults.max_attempts);
        let attempt_duration_ms = attempt_duration_ms.unwrap_or(defaults.attempt_duration_ms);

        match self.controller.start(max_attempts, attempt_duration_ms).await {
            Ok(session_id) => DaemonMessage::CaptureStarted(session_id),
            Err(e) => {
                error!("Failed to start capture: {}", e);
                DaemonMessage::Error(e.to_string())
            }
        }
    }

    /// Accepts connections until a `Shutdown` request arrives.
    pub async fn serve(self: Arc<Self>, socket_path: &Path) -> Result<()> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }
        let listener = UnixListener::bind(socket_path)?;
        info!("Listening on {:?}", socket_path);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    let stream = match accepted {
                        Ok((stream, _)) => stream,
                        Err(e) => {
                            // fd exhaustion and aborted handshakes are transient.
                            warn!("Failed to accept client connection: {}", e);
                            tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                            continue;
                        }
                    };
                    let daemon = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = daemon.handle_connection(stream).await {
                            warn!("Client connection ended with error: {}", e);
                        }
                    });
                }
            }
        }

        if let Err(e) = std::fs::remove_file(socket_path) {
            debug!("Could not remove socket {:?}: {}", socket_path, e);
        }
        info!("Daemon stopped");
        Ok(())
    }

    async fn handle_connection(&self, mut stream: UnixStream) -> Result<()> {
        loop {
            let message = match tokio::time::timeout(
                self.timeout,
                protocol::receive_message::<_, ClientMessage>(&mut stream),
            ).await {
                Ok(Ok(message)) => message,
                // Peer hung up or went idle.
                Ok(Err(_)) | Err(_) => return Ok(()),
            };

            let reply = self.handle_message(message).await;
            protocol::send_message(&mut stream, &reply).await?;
        }
    }
}
