//! Capture controller
//!
//! Owns at most one capture session at a time. A session is a background task that
//! runs the capture tool up to `max_attempts` times, one attempt after another, with
//! a fixed pause between attempts. The pause is interruptible: `stop()` cancels the
//! session and the task exits as soon as the current attempt (if any) has finished.
//!
//! Session lifecycle: `Idle -> Running -> (Cancelling ->) Idle`.

use chrono::{DateTime, Local};
use log::{info, warn, Level};
use shared::{
    AttemptOutcome, CaptureConfig, CaptureError, CaptureStatus, CaptureSummary, LaunchFailurePolicy,
    SessionEnd, SessionSnapshot, SessionState,
};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::command::{self, Invocation};
use crate::diagnostics::{DiagnosticSink, LogSink};
use crate::runner::{ExternalRunner, ProcessRunner};

#[derive(Debug, Default)]
struct SessionProgress {
    attempts_completed: AtomicU32,
    failed_attempts: AtomicU32,
}

impl SessionProgress {
    fn attempts_completed(&self) -> u32 {
        self.attempts_completed.load(Ordering::Acquire)
    }

    fn failed_attempts(&self) -> u32 {
        self.failed_attempts.load(Ordering::Acquire)
    }
}

/// Clears the liveness flag when the session task ends, however it ends.
struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct ActiveSession {
    id: Uuid,
    started_at: DateTime<Local>,
    output_directory: PathBuf,
    max_attempts: u32,
    progress: Arc<SessionProgress>,
    cancel: CancellationToken,
    finished: watch::Receiver<Option<CaptureSummary>>,
    handle: JoinHandle<()>,
}

impl ActiveSession {
    fn snapshot(&self) -> SessionSnapshot {
        // Read failures first so the copy never shows more failures than attempts.
        let failed_attempts = self.progress.failed_attempts();
        let attempts_completed = self.progress.attempts_completed();

        SessionSnapshot {
            session_id: self.id,
            started_at: self.started_at,
            output_directory: self.output_directory.clone(),
            attempts_completed,
            failed_attempts,
            max_attempts: self.max_attempts,
            cancellation_requested: self.cancel.is_cancelled(),
        }
    }
}

pub struct CaptureController {
    config: Arc<CaptureConfig>,
    runner: Arc<dyn ProcessRunner>,
    sink: Arc<dyn DiagnosticSink>,
    active: Mutex<Option<ActiveSession>>,
    alive: Arc<AtomicBool>,
    last_summary: Arc<std::sync::Mutex<Option<CaptureSummary>>>,
}

impl CaptureController {
    pub fn new(
        config: CaptureConfig,
        runner: Arc<dyn ProcessRunner>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self, CaptureError> {
        config.validate()?;

        Ok(Self {
            config: Arc::new(config),
            runner,
            sink,
            active: Mutex::new(None),
            alive: Arc::new(AtomicBool::new(false)),
            last_summary: Arc::new(std::sync::Mutex::new(None)),
        })
    }

    /// Real capture tool, diagnostics to the log.
    pub fn with_defaults(config: CaptureConfig) -> Result<Self, CaptureError> {
        Self::new(config, Arc::new(ExternalRunner::new()), Arc::new(LogSink))
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Starts a new session in the background and returns its id.
    ///
    /// Fails without spawning anything if a session is still alive, if the tool
    /// directory is missing, or if today's output directory cannot be created.
    pub async fn start(&self, max_attempts: u32, attempt_duration_ms: u64) -> Result<Uuid, CaptureError> {
        if max_attempts == 0 {
            return Err(CaptureError::InvalidArgument("max_attempts must be positive".to_string()));
        }
        if attempt_duration_ms == 0 {
            return Err(CaptureError::InvalidArgument("attempt_duration_ms must be positive".to_string()));
        }

        let mut active = self.active.lock().await;
        if self.is_capturing() {
            return Err(CaptureError::AlreadyRunning);
        }
        // Whatever is left in the slot has already exited.
        active.take();

        if !self.config.tool_dir.is_dir() {
            return Err(CaptureError::ToolNotFound(self.config.tool_dir.clone()));
        }

        let started_at = Local::now();
        let date_stamp = command::date_stamp(&started_at);
        let output_directory = command::session_directory(&self.config.base_log_path, &date_stamp);
        if !output_directory.is_dir() {
            fs::create_dir_all(&output_directory).map_err(|source| CaptureError::DirectoryUnavailable {
                path: output_directory.clone(),
                source,
            })?;
        }

        let id = Uuid::new_v4();
        let progress = Arc::new(SessionProgress::default());
        let cancel = CancellationToken::new();
        let (finished_tx, finished_rx) = watch::channel(None);

        self.alive.store(true, Ordering::Release);
        let session_task = SessionTask {
            id,
            started_at,
            date_stamp,
            output_directory: output_directory.clone(),
            max_attempts,
            attempt_duration_ms,
            config: Arc::clone(&self.config),
            runner: Arc::clone(&self.runner),
            sink: Arc::clone(&self.sink),
            progress: Arc::clone(&progress),
            cancel: cancel.clone(),
            last_summary: Arc::clone(&self.last_summary),
            finished: finished_tx,
            alive: AliveGuard(Arc::clone(&self.alive)),
        };
        let handle = tokio::spawn(session_task.run());

        info!(
            "Started capture session {}: {} attempts of {}ms into {:?}",
            id, max_attempts, attempt_duration_ms, output_directory
        );

        *active = Some(ActiveSession {
            id,
            started_at,
            output_directory,
            max_attempts,
            progress,
            cancel,
            finished: finished_rx,
            handle,
        });

        Ok(id)
    }

    /// Cancels the running session and waits up to the grace period for it to exit.
    ///
    /// An attempt already in flight is never interrupted; if it outlasts the grace
    /// period the session keeps running detached until that attempt returns, and
    /// `is_capturing()` stays true until then. Calling this with no session is a no-op.
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        let Some(session) = active.as_mut() else {
            return;
        };

        if !session.cancel.is_cancelled() {
            info!("Stopping capture session {}", session.id);
            session.cancel.cancel();
        }

        let grace = Duration::from_millis(self.config.stop_grace_period_ms);
        let exited = tokio::time::timeout(grace, &mut session.handle).await.is_ok();
        if exited {
            *active = None;
        } else {
            warn!(
                "Capture session {} did not exit within {:?}; leaving the current attempt to finish",
                session.id, grace
            );
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> CaptureStatus {
        let active = self.active.lock().await;
        let last_summary = self.last_summary();

        match active.as_ref() {
            Some(session) if self.is_capturing() => CaptureStatus {
                state: if session.cancel.is_cancelled() {
                    SessionState::Cancelling
                } else {
                    SessionState::Running
                },
                session: Some(session.snapshot()),
                last_summary,
            },
            _ => CaptureStatus::idle(last_summary),
        }
    }

    /// Waits for the current session to end and returns its summary.
    ///
    /// With no session in flight this returns the most recent summary, if any.
    pub async fn wait(&self) -> Option<CaptureSummary> {
        let finished = {
            let active = self.active.lock().await;
            active.as_ref().map(|session| session.finished.clone())
        };
        let Some(mut finished) = finished else {
            return self.last_summary();
        };

        let summary = match finished.wait_for(Option::is_some).await {
            Ok(summary) => summary.clone(),
            Err(_) => None,
        };
        summary.or_else(|| self.last_summary())
    }

    pub fn last_summary(&self) -> Option<CaptureSummary> {
        self.last_summary.lock().ok().and_then(|summary| summary.clone())
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        if let Some(session) = self.active.get_mut().as_ref() {
            session.cancel.cancel();
        }
    }
}

/// Everything the background task needs, moved into it at spawn time.
struct SessionTask {
    id: Uuid,
    started_at: DateTime<Local>,
    date_stamp: String,
    output_directory: PathBuf,
    max_attempts: u32,
    attempt_duration_ms: u64,
    config: Arc<CaptureConfig>,
    runner: Arc<dyn ProcessRunner>,
    sink: Arc<dyn DiagnosticSink>,
    progress: Arc<SessionProgress>,
    cancel: CancellationToken,
    last_summary: Arc<std::sync::Mutex<Option<CaptureSummary>>>,
    finished: watch::Sender<Option<CaptureSummary>>,
    alive: AliveGuard,
}

impl SessionTask {
    async fn run(self) {
        let end = self.capture_loop().await;

        let attempts_completed = self.progress.attempts_completed();
        let failed_attempts = self.progress.failed_attempts();
        self.sink.emit(
            Level::Info,
            &format!(
                "capture finished: {} failed out of {} attempts",
                failed_attempts, attempts_completed
            ),
        );

        let summary = CaptureSummary {
            session_id: self.id,
            started_at: self.started_at,
            attempts_completed,
            failed_attempts,
            max_attempts: self.max_attempts,
            end,
        };
        if let Ok(mut last) = self.last_summary.lock() {
            *last = Some(summary.clone());
        }

        // Liveness drops before the summary is published so waiters see an idle controller.
        let Self { alive, finished, .. } = self;
        drop(alive);
        finished.send_replace(Some(summary));
    }

    async fn capture_loop(&self) -> SessionEnd {
        let delay = Duration::from_millis(self.config.inter_attempt_delay_ms);
        let mut attempt = 0;

        while attempt < self.max_attempts {
            if self.cancel.is_cancelled() {
                return self.cancelled(attempt);
            }

            let invocation = self.next_invocation();
            let runner = Arc::clone(&self.runner);
            let outcome = match task::spawn_blocking(move || runner.run(&invocation)).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let reason = format!("attempt {} did not complete: {}", attempt + 1, e);
                    self.sink.emit(Level::Error, &format!("capture session {} aborted: {}", self.id, reason));
                    return SessionEnd::Aborted(reason);
                }
            };
            attempt += 1;

            if let Some(end) = self.record(attempt, &outcome) {
                return end;
            }
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.cancelled(attempt),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        SessionEnd::Exhausted
    }

    fn next_invocation(&self) -> Invocation {
        let time_stamp = command::time_stamp(&Local::now());
        let output_path = command::build_output_path(
            &self.output_directory,
            &self.date_stamp,
            &time_stamp,
            &self.config.file_extension,
        );
        command::build_invocation(&self.config, output_path, self.attempt_duration_ms)
    }

    /// Updates counters for a finished attempt; returns an end reason if the session must stop.
    fn record(&self, attempt: u32, outcome: &AttemptOutcome) -> Option<SessionEnd> {
        self.progress.attempts_completed.fetch_add(1, Ordering::AcqRel);
        if outcome.success {
            return None;
        }

        self.progress.failed_attempts.fetch_add(1, Ordering::AcqRel);
        self.sink.emit(
            Level::Warn,
            &format!(
                "attempt {}/{} failed: {}",
                attempt,
                self.max_attempts,
                outcome.error_text.as_deref().unwrap_or("unknown error")
            ),
        );

        if !outcome.launched && self.config.launch_failure == LaunchFailurePolicy::Abort {
            let reason = "capture tool could not be launched".to_string();
            self.sink.emit(Level::Error, &format!("capture session {} aborted: {}", self.id, reason));
            return Some(SessionEnd::Aborted(reason));
        }
        None
    }

    fn cancelled(&self, attempts: u32) -> SessionEnd {
        self.sink.emit(
            Level::Info,
            &format!("capture session {} cancelled after {} attempts", self.id, attempts),
        );
        SessionEnd::Cancelled
    }
}
