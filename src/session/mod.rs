//! Logical terminal sessions persisted in the key-value store.

mod lifecycle;
mod store;

pub use lifecycle::AttachOutcome;
pub use store::SessionStore;

#[cfg(test)]
pub(crate) use store::testing;

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::process::LaunchOptions;
use crate::profiles::Profile;

/// Profile data copied into a session at creation time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProfile {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_args: Option<Vec<String>>,
}

impl From<&Profile> for SessionProfile {
    fn from(profile: &Profile) -> Self {
        Self {
            id: profile.id.clone(),
            working_directory: profile.working_directory.clone(),
            environment: profile.environment.clone().unwrap_or_default(),
            shell_command: profile.shell_command.clone(),
            shell_args: profile.shell_args.clone(),
        }
    }
}

impl SessionProfile {
    /// Launch options that reproduce this profile.
    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            working_directory: self.working_directory.clone(),
            profile_id: Some(self.id.clone()),
            command: self.shell_command.clone(),
            args: self.shell_args.clone().unwrap_or_default(),
            env: self.environment.clone(),
            ..LaunchOptions::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub name: String,
    /// Window handles believed to belong to this session
    #[serde(default)]
    pub window_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<SessionProfile>,
}

impl SessionRecord {
    pub fn new(name: impl Into<String>, profile: Option<SessionProfile>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            window_ids: Vec::new(),
            created_at: now,
            last_accessed_at: now,
            profile,
        }
    }

    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }
}

/// Partial update applied by `SessionStore::update`.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub name: Option<String>,
    pub window_ids: Option<Vec<String>>,
    /// `Some(None)` clears the profile
    pub profile: Option<Option<SessionProfile>>,
}
