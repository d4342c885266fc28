use log::debug;
use shared::{AttemptOutcome, CaptureError};
use std::process::{Command, Output, Stdio};

use crate::command::Invocation;

/// Runs one invocation to completion on the calling thread.
pub trait ProcessRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> AttemptOutcome;
}

/// Spawns the real capture tool.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExternalRunner;

impl ExternalRunner {
    pub fn new() -> Self {
        Self
    }

    fn execute(invocation: &Invocation) -> Result<Output, CaptureError> {
        // `output()` drains stdout and stderr concurrently, so a chatty child never
        // blocks on a full pipe.
        Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| CaptureError::LaunchFailed {
                program: invocation.program.clone(),
                source,
            })
    }
}

impl ProcessRunner for ExternalRunner {
    fn run(&self, invocation: &Invocation) -> AttemptOutcome {
        debug!("Running {:?} {:?}", invocation.program, invocation.args);

        let output = match Self::execute(invocation) {
            Ok(output) => output,
            Err(e) => return AttemptOutcome::launch_failed(invocation.output_path.clone(), e.to_string()),
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        let error_text = Some(stderr).filter(|s| !s.is_empty());

        if output.status.success() {
            AttemptOutcome {
                output_path: invocation.output_path.clone(),
                success: true,
                error_text,
                launched: true,
            }
        } else {
            let text = error_text.unwrap_or_else(|| format!("capture tool exited with {}", output.status));
            AttemptOutcome::failed(invocation.output_path.clone(), text)
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn shell(script: &str) -> Invocation {
        Invocation {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: std::env::temp_dir(),
            output_path: PathBuf::from("capture.sr"),
        }
    }

    #[test]
    fn test_zero_exit_is_success() {
        let outcome = ExternalRunner::new().run(&shell("exit 0"));
        assert!(outcome.success);
        assert_eq!(outcome.error_text, None);
        assert_eq!(outcome.output_path, PathBuf::from("capture.sr"));
    }

    #[test]
    fn test_nonzero_exit_captures_stderr() {
        let outcome = ExternalRunner::new().run(&shell("echo 'device not found' >&2; exit 3"));
        assert!(!outcome.success);
        assert_eq!(outcome.error_text.as_deref(), Some("device not found"));
    }

    #[test]
    fn test_nonzero_exit_without_stderr() {
        let outcome = ExternalRunner::new().run(&shell("exit 2"));
        assert!(!outcome.success);
        assert!(outcome.error_text.unwrap().contains("exited with"));
    }

    #[test]
    fn test_large_output_is_drained() {
        let outcome = ExternalRunner::new().run(&shell(
            "i=0; while [ $i -lt 20000 ]; do echo line-$i; echo err-$i >&2; i=$((i+1)); done",
        ));
        assert!(outcome.success);
        assert!(outcome.error_text.unwrap().ends_with("err-19999"));
    }

    #[test]
    fn test_missing_program_is_launch_failure() {
        let invocation = Invocation {
            program: PathBuf::from("/nonexistent/sigrok-cli"),
            args: vec![],
            working_dir: std::env::temp_dir(),
            output_path: PathBuf::from("capture.sr"),
        };
        let outcome = ExternalRunner::new().run(&invocation);
        assert!(!outcome.success);
        assert!(!outcome.launched);
        assert!(outcome.error_text.unwrap().starts_with("launch failed"));
    }
}
