use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::Result;
use crate::session::SessionRecord;

use super::{owner_file, sanitize_name};

// Trailing `-YYYY-MM-DDTHH-MM-SS-mmmZ` appended by `recording_file_name`
static RE_TIMESTAMP_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-\d{4}-\d{2}-\d{2}T\d{2}-\d{2}-\d{2}(-\d{3})?Z$").unwrap());

/// A captured recording on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingEntry {
    /// Matching session id, or the file name when no session matches
    pub session_id: String,
    pub session_name: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

struct ScannedFile {
    path: PathBuf,
    created_at: DateTime<Utc>,
    size_bytes: u64,
    owner: Option<String>,
}

/// Recordings in a fixed directory.
#[derive(Debug, Clone)]
pub struct RecordingCatalog {
    dir: PathBuf,
    extension: String,
}

/// Session name encoded in a recording file stem.
pub(crate) fn session_name_from_stem(stem: &str) -> &str {
    match RE_TIMESTAMP_SUFFIX.find(stem) {
        Some(m) => &stem[..m.start()],
        None => stem,
    }
}

impl RecordingCatalog {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    async fn scan(&self) -> Result<Vec<ScannedFile>> {
        let dir = self.dir.clone();
        let extension = self.extension.clone();
        let mut files = tokio::task::spawn_blocking(move || scan_dir(&dir, &extension))
            .await
            .map_err(std::io::Error::other)??;
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(files)
    }

    /// Every recording, newest first. Files carrying an owner id match that
    /// session; files without one match by name when exactly one session
    /// has it.
    pub async fn list(&self, sessions: &[SessionRecord]) -> Result<Vec<RecordingEntry>> {
        let files = self.scan().await?;
        Ok(files
            .into_iter()
            .map(|file| {
                let stem = file
                    .path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let name = session_name_from_stem(&stem).to_string();

                let session = match &file.owner {
                    Some(owner) => sessions.iter().find(|s| &s.id == owner),
                    None => {
                        let mut named = sessions.iter().filter(|s| sanitize_name(&s.name) == name);
                        match (named.next(), named.next()) {
                            (Some(only), None) => Some(only),
                            _ => None,
                        }
                    }
                };
                entry(file, session, name)
            })
            .collect())
    }

    /// Recordings owned by one session, newest first.
    pub async fn for_session(&self, session: &SessionRecord) -> Result<Vec<RecordingEntry>> {
        let files = self.scan().await?;
        Ok(files
            .into_iter()
            .filter(|f| f.owner.as_deref() == Some(session.id.as_str()))
            .map(|file| entry(file, Some(session), session.name.clone()))
            .collect())
    }

    pub async fn latest_for(&self, session: &SessionRecord) -> Result<Option<RecordingEntry>> {
        Ok(self.for_session(session).await?.into_iter().next())
    }
}

fn entry(file: ScannedFile, session: Option<&SessionRecord>, name: String) -> RecordingEntry {
    let file_name = file
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    RecordingEntry {
        session_id: session.map(|s| s.id.clone()).unwrap_or(file_name),
        session_name: session.map(|s| s.name.clone()).unwrap_or(name),
        path: file.path,
        created_at: file.created_at,
        size_bytes: file.size_bytes,
    }
}

fn scan_dir(dir: &Path, extension: &str) -> std::io::Result<Vec<ScannedFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(std::io::Error::other)?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(extension)
        {
            continue;
        }
        let metadata = entry.metadata().map_err(std::io::Error::other)?;
        let created = metadata.created().or_else(|_| metadata.modified())?;
        let owner = std::fs::read_to_string(owner_file(path))
            .ok()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        files.push(ScannedFile {
            path: path.to_path_buf(),
            created_at: DateTime::<Utc>::from(created),
            size_bytes: metadata.len(),
            owner,
        });
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_session_name_from_stem() {
        assert_eq!(session_name_from_stem("dev-2026-10-18T09-05-07-042Z"), "dev");
        assert_eq!(
            session_name_from_stem("my-api-2026-10-18T09-05-07-042Z"),
            "my-api"
        );
        assert_eq!(session_name_from_stem("hand-made"), "hand-made");
    }

    #[tokio::test]
    async fn test_missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = RecordingCatalog::new(dir.path().join("recordings"), "cast");
        assert!(catalog.list(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_matches_sessions_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionRecord::new("dev", None);
        let older = dir.path().join("dev-2026-10-18T09-05-07-042Z.cast");
        std::fs::write(&older, "a").unwrap();
        std::fs::write(owner_file(&older), &session.id).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        let orphan = dir.path().join("gone-2026-10-18T10-00-00-000Z.cast");
        std::fs::write(&orphan, "bb").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = RecordingCatalog::new(dir.path(), "cast");
        let entries = catalog.list(std::slice::from_ref(&session)).await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, orphan);
        assert_eq!(entries[0].session_id, "gone-2026-10-18T10-00-00-000Z.cast");
        assert_eq!(entries[0].session_name, "gone");
        assert_eq!(entries[0].size_bytes, 2);
        assert_eq!(entries[1].session_id, session.id);
        assert_eq!(entries[1].session_name, "dev");

        let latest = catalog.latest_for(&session).await.unwrap().unwrap();
        assert_eq!(latest.path, older);
    }

    #[tokio::test]
    async fn test_same_named_sessions_keep_their_own_recordings() {
        let dir = tempfile::tempdir().unwrap();
        let first = SessionRecord::new("dev", None);
        let second = SessionRecord::new("dev", None);

        let mine = dir.path().join("dev-2026-10-18T09-05-07-042Z.cast");
        std::fs::write(&mine, "a").unwrap();
        std::fs::write(owner_file(&mine), format!("{}\n", second.id)).unwrap();
        let unowned = dir.path().join("dev-2026-10-18T10-00-00-000Z.cast");
        std::fs::write(&unowned, "b").unwrap();

        let catalog = RecordingCatalog::new(dir.path(), "cast");
        assert!(catalog.for_session(&first).await.unwrap().is_empty());
        let owned = catalog.for_session(&second).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].path, mine);

        // an unowned file is ambiguous between two sessions named "dev"
        let sessions = [first.clone(), second.clone()];
        let listed = catalog.list(&sessions).await.unwrap();
        let stray = listed.iter().find(|e| e.path == unowned).unwrap();
        assert_eq!(stray.session_id, "dev-2026-10-18T10-00-00-000Z.cast");
        let kept = listed.iter().find(|e| e.path == mine).unwrap();
        assert_eq!(kept.session_id, second.id);
    }
}
