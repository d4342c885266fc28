use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("a capture session is already running")]
    AlreadyRunning,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("output directory {path:?} is unavailable: {source}")]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("capture tool location does not exist: {0:?}")]
    ToolNotFound(PathBuf),

    #[error("invalid capture configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to launch {program:?}: {source}")]
    LaunchFailed {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
}
