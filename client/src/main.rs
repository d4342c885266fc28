use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use log::{debug, info};
use shared::{CaptureStatus, ClientMessage, Config, DaemonMessage, protocol};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "siglog-client")]
#[command(about = "Control the siglog capture daemon")]
#[command(group(ArgGroup::new("action").args(["start", "stop", "status", "shutdown"]).multiple(false)))]
struct Args {
    /// Start a capture session
    #[arg(long)]
    start: bool,

    /// Number of capture attempts (defaults to the daemon's configuration)
    #[arg(short, long, requires = "start")]
    attempts: Option<u32>,

    /// Length of each capture attempt in milliseconds
    #[arg(short, long, requires = "start")]
    duration_ms: Option<u64>,

    /// Stop the running capture session
    #[arg(long)]
    stop: bool,

    /// Show the daemon's capture status
    #[arg(long)]
    status: bool,

    /// Stop capturing and shut the daemon down
    #[arg(long)]
    shutdown: bool,

    /// Daemon socket (defaults to the configured path)
    #[arg(long)]
    socket: Option<PathBuf>,
}

impl Args {
    fn message(&self) -> ClientMessage {
        if self.start {
            ClientMessage::StartCapture {
                max_attempts: self.attempts,
                attempt_duration_ms: self.duration_ms,
            }
        } else if self.stop {
            ClientMessage::StopCapture
        } else if self.shutdown {
            ClientMessage::Shutdown
        } else {
            ClientMessage::GetStatus
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = Config::load()?;
    let socket_path = args.socket.clone().unwrap_or(config.ipc.socket_path);
    let timeout = Duration::from_secs(config.ipc.timeout_seconds);

    let message = args.message();
    debug!("Sending {:?} to {:?}", message, socket_path);

    let mut stream = UnixStream::connect(&socket_path)
        .await
        .with_context(|| format!("Daemon not available at {:?}", socket_path))?;
    protocol::send_message(&mut stream, &message).await?;
    let reply: DaemonMessage = tokio::time::timeout(timeout, protocol::receive_message(&mut stream))
        .await
        .context("Timed out waiting for the daemon")??;

    match reply {
        DaemonMessage::CaptureStarted(session_id) => println!("Capture session {} started", session_id),
        DaemonMessage::CaptureStopped => println!("Capture stopped"),
        DaemonMessage::Status(status) => print_status(&status),
        DaemonMessage::Error(error) => anyhow::bail!("Daemon error: {}", error),
    }

    info!("Done");
    Ok(())
}

fn print_status(status: &CaptureStatus) {
    if status.is_capturing() {
        println!("State: {:?}", status.state);
    } else {
        println!("State: {:?} (not capturing)", status.state);
    }

    if let Some(session) = &status.session {
        println!("Session: {} (started {})", session.session_id, session.started_at.format("%Y-%m-%d %H:%M:%S"));
        println!("Output: {}", session.output_directory.display());
        println!(
            "Attempts: {}/{} ({} failed)",
            session.attempts_completed, session.max_attempts, session.failed_attempts
        );
        if session.cancellation_requested {
            println!("Cancellation requested");
        }
    }

    if let Some(summary) = &status.last_summary {
        println!(
            "Last session {}: {} failed out of {} attempts ({:?})",
            summary.session_id, summary.failed_attempts, summary.attempts_completed, summary.end
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_with_overrides() {
        let args = Args::parse_from(["siglog-client", "--start", "-a", "3", "-d", "500"]);
        match args.message() {
            ClientMessage::StartCapture { max_attempts, attempt_duration_ms } => {
                assert_eq!(max_attempts, Some(3));
                assert_eq!(attempt_duration_ms, Some(500));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_defaults_to_status() {
        let args = Args::parse_from(["siglog-client"]);
        assert!(matches!(args.message(), ClientMessage::GetStatus));
    }

    #[test]
    fn test_attempts_require_start() {
        assert!(Args::try_parse_from(["siglog-client", "--stop", "-a", "3"]).is_err());
        assert!(Args::try_parse_from(["siglog-client", "--start", "--stop"]).is_err());
    }

    #[test]
    fn test_only_one_action_at_a_time() {
        assert!(Args::try_parse_from(["siglog-client", "--stop", "--shutdown"]).is_err());
        assert!(Args::try_parse_from(["siglog-client", "--stop", "--status"]).is_err());
        assert!(Args::try_parse_from(["siglog-client", "--status", "--shutdown"]).is_err());
        assert!(Args::try_parse_from(["siglog-client", "--shutdown"]).is_ok());
    }
}
