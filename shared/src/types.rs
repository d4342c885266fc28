use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Result of one capture attempt, as reported by the process runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptOutcome {
    pub output_path: PathBuf,
    pub success: bool,
    pub error_text: Option<String>,
    /// False when the process could not be started at all.
    pub launched: bool,
}

impl AttemptOutcome {
    pub fn succeeded(output_path: PathBuf) -> Self {
        Self {
            output_path,
            success: true,
            error_text: None,
            launched: true,
        }
    }

    pub fn failed(output_path: PathBuf, error_text: impl Into<String>) -> Self {
        Self {
            output_path,
            success: false,
            error_text: Some(error_text.into()),
            launched: true,
        }
    }

    /// The tool never started; reported like any other failed attempt.
    pub fn launch_failed(output_path: PathBuf, message: impl Into<String>) -> Self {
        Self {
            launched: false,
            ..Self::failed(output_path, format!("launch failed: {}", message.into()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEnd {
    Exhausted,
    Cancelled,
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSummary {
    pub session_id: Uuid,
    pub started_at: DateTime<Local>,
    pub attempts_completed: u32,
    pub failed_attempts: u32,
    pub max_attempts: u32,
    pub end: SessionEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Running,
    Cancelling,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub started_at: DateTime<Local>,
    pub output_directory: PathBuf,
    pub attempts_completed: u32,
    pub failed_attempts: u32,
    pub max_attempts: u32,
    pub cancellation_requested: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureStatus {
    pub state: SessionState,
    pub session: Option<SessionSnapshot>,
    pub last_summary: Option<CaptureSummary>,
}

impl CaptureStatus {
    pub fn idle(last_summary: Option<CaptureSummary>) -> Self {
        Self {
            state: SessionState::Idle,
            session: None,
            last_summary,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.state != SessionState::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_capturing_until_idle() {
        let mut status = CaptureStatus::idle(None);
        assert!(!status.is_capturing());

        status.state = SessionState::Running;
        assert!(status.is_capturing());

        status.state = SessionState::Cancelling;
        assert!(status.is_capturing());
    }
}
