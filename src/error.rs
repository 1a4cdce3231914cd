//! Error types shared by the process, session and recording layers.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced to callers of the launcher.
#[derive(Debug, Error)]
pub enum RioError {
    /// No tracked terminal process with this PID
    #[error("No Rio process with PID {0}")]
    ProcessNotFound(u32),

    /// Unknown session id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// No recording exists for the session
    #[error("No recording found for session {0}")]
    RecordingNotFound(String),

    /// Terminal binary missing from its expected install location
    #[error("Rio binary not found at {}", .0.display())]
    BinaryNotFound(PathBuf),

    /// The OS rejected a signal for this PID
    #[error("Permission denied signalling PID {0}")]
    PermissionDenied(u32),

    /// Terminal process could not be spawned
    #[error("Failed to spawn {}", binary.display())]
    SpawnFailure {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Recorder subprocess could not be spawned
    #[error("Failed to start recorder: {0}")]
    RecorderSpawnFailure(#[source] std::io::Error),

    #[error("Session {0} is already being recorded")]
    AlreadyRecording(String),

    #[error("Session {0} is not being recorded")]
    NotRecording(String),

    /// Relaunching a session failed
    #[error("Failed to restore session {session}: {hint}")]
    RestoreFailure {
        session: String,
        hint: String,
        #[source]
        source: Box<RioError>,
    },

    /// The bring-to-front primitive failed
    #[error("Failed to attach to PID {pid}")]
    AttachFailure {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported export format: {0}")]
    UnsupportedFormat(String),

    /// Malformed identifier or argument
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Playback exited with status {0}")]
    PlaybackFailed(String),

    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RioError {
    /// True for every "unknown process/session/recording/binary" variant.
    #[cfg(test)]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RioError::ProcessNotFound(_)
                | RioError::SessionNotFound(_)
                | RioError::RecordingNotFound(_)
                | RioError::BinaryNotFound(_)
        )
    }
}

/// Result type alias using [`RioError`].
pub type Result<T> = std::result::Result<T, RioError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_not_found_classification() {
        assert!(RioError::ProcessNotFound(42).is_not_found());
        assert!(RioError::SessionNotFound("x".into()).is_not_found());
        assert!(RioError::BinaryNotFound(PathBuf::from("/nope")).is_not_found());
        assert!(!RioError::PermissionDenied(42).is_not_found());
        assert!(!RioError::AlreadyRecording("x".into()).is_not_found());
    }

    #[test]
    fn test_restore_failure_keeps_cause() {
        let err = RioError::RestoreFailure {
            session: "dev".into(),
            hint: "check that Rio is installed".into(),
            source: Box::new(RioError::BinaryNotFound(PathBuf::from("/opt/rio"))),
        };
        assert!(err.to_string().contains("check that Rio is installed"));
        let cause = err.source().expect("cause");
        assert!(cause.to_string().contains("/opt/rio"));
    }
}
