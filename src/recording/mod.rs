//! Recorder subprocess lifecycle and the catalog of captured files.

mod catalog;
mod controller;

pub use catalog::{RecordingCatalog, RecordingEntry};
pub use controller::RecordingController;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::warn;

use crate::error::RioError;

/// The single active recording of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingHandle {
    pub session_id: String,
    pub file_path: PathBuf,
    /// Recorder subprocess
    pub pid: u32,
    pub start_time: DateTime<Utc>,
}

/// Whether the output file survived a stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Saved(PathBuf),
    Missing(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Gif,
    Svg,
    Txt,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Gif => "gif",
            ExportFormat::Svg => "svg",
            ExportFormat::Txt => "txt",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = RioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gif" => Ok(ExportFormat::Gif),
            "svg" => Ok(ExportFormat::Svg),
            "txt" => Ok(ExportFormat::Txt),
            _ => Err(RioError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Replace characters that are unsafe in file names.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// `<name>-<ISO timestamp with ':' and '.' as '-'>.<ext>`
pub fn recording_file_name(session_name: &str, at: DateTime<Utc>, extension: &str) -> String {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{}-{}.{}", sanitize_name(session_name), stamp, extension)
}

/// Sidecar next to a recording that names the owning session id. Session
/// names are not unique, so the file name alone cannot identify the owner.
pub fn owner_file(recording: &Path) -> PathBuf {
    let mut name = recording.as_os_str().to_owned();
    name.push(".owner");
    PathBuf::from(name)
}

/// Delete a recording and its owner file; already-missing files are fine.
pub async fn remove_recording(path: &Path) {
    for file in [path.to_path_buf(), owner_file(path)] {
        if let Err(e) = tokio::fs::remove_file(&file).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %file.display(), error = %e, "failed to remove recording");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_name_is_deterministic() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 5, 7).unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(
            recording_file_name("dev", at, "cast"),
            "dev-2026-10-18T09-05-07-042Z.cast"
        );
    }

    #[test]
    fn test_owner_file_sits_next_to_recording() {
        assert_eq!(
            owner_file(Path::new("/r/dev-2026-10-18T09-05-07-042Z.cast")),
            PathBuf::from("/r/dev-2026-10-18T09-05-07-042Z.cast.owner")
        );
    }

    #[tokio::test]
    async fn test_remove_recording_takes_owner_file_along() {
        let dir = tempfile::tempdir().unwrap();
        let cast = dir.path().join("dev.cast");
        std::fs::write(&cast, "x").unwrap();
        std::fs::write(owner_file(&cast), "id").unwrap();

        remove_recording(&cast).await;
        assert!(!cast.exists());
        assert!(!owner_file(&cast).exists());
        // second call is a no-op
        remove_recording(&cast).await;
    }

    #[test]
    fn test_unsafe_characters_are_replaced() {
        assert_eq!(sanitize_name("api/server: prod"), "api-server--prod");
        assert_eq!(sanitize_name("ok_name-1.2"), "ok_name-1.2");
    }

    #[test]
    fn test_export_format_parsing() {
        assert_eq!("GIF".parse::<ExportFormat>().unwrap(), ExportFormat::Gif);
        assert_eq!("txt".parse::<ExportFormat>().unwrap().extension(), "txt");
        assert!(matches!(
            "mp4".parse::<ExportFormat>(),
            Err(RioError::UnsupportedFormat(f)) if f == "mp4"
        ));
    }
}
