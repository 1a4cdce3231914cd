//! Terminal profiles consumed as plain data.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A launch profile defined by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

pub trait ProfileProvider: Send + Sync {
    fn get_profile(&self, id: &str) -> Option<Profile>;
}

/// Profiles read once from a JSON array file.
#[derive(Debug, Default)]
pub struct JsonProfileProvider {
    profiles: Vec<Profile>,
}

impl JsonProfileProvider {
    /// A missing file yields no profiles; a malformed one is an error.
    pub fn load(path: impl Into<PathBuf>) -> crate::error::Result<Self> {
        let path = path.into();
        let profiles = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), count = profiles.len(), "loaded profiles");
        Ok(Self { profiles })
    }

    #[cfg(test)]
    pub fn from_profiles(profiles: Vec<Profile>) -> Self {
        Self { profiles }
    }
}

impl ProfileProvider for JsonProfileProvider {
    fn get_profile(&self, id: &str) -> Option<Profile> {
        self.profiles.iter().find(|p| p.id == id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_means_no_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let provider = JsonProfileProvider::load(dir.path().join("profiles.json")).unwrap();
        assert!(provider.get_profile("work").is_none());
    }

    #[test]
    fn test_load_profiles_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(
            &path,
            r#"[{"id": "work", "name": "Work", "workingDirectory": "/srv/work",
                 "environment": {"EDITOR": "hx"}, "shellCommand": "zsh", "shellArgs": ["-l"]}]"#,
        )
        .unwrap();

        let provider = JsonProfileProvider::load(&path).unwrap();
        let profile = provider.get_profile("work").unwrap();
        assert_eq!(profile.name, "Work");
        assert_eq!(profile.working_directory, Some(PathBuf::from("/srv/work")));
        assert_eq!(profile.shell_args, Some(vec!["-l".to_string()]));
        assert_eq!(
            profile.environment.unwrap().get("EDITOR").map(String::as_str),
            Some("hx")
        );
    }
}
