//! Launcher configuration: built-in defaults, optional JSON file, env overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, RioError};

/// Runtime configuration for the launcher.
#[derive(Debug, Clone)]
pub struct Config {
    /// User home directory (fallback working directory)
    pub home_dir: PathBuf,
    /// Expected install location of the terminal binary
    pub terminal_binary: PathBuf,
    /// Directory forced to the front of PATH for launched terminals
    pub toolchain_bin: PathBuf,
    /// Storage, profiles and config file live here
    pub data_dir: PathBuf,
    pub recordings_dir: PathBuf,
    pub recording_extension: String,
    pub recorder_binary: String,
    /// TERM value forced on the recorder
    pub recorder_term: String,
    pub gif_converter: String,
    pub svg_converter: String,
    /// Poll interval for processes discovered by reconciliation
    pub monitor_interval: Duration,
    /// Delay between graceful and forced termination
    pub kill_grace: Duration,
    pub recording_stop_timeout: Duration,
    /// Background reconciliation tick of the binary
    pub scan_interval: Duration,
    /// Start a recording whenever a session is created
    pub auto_record: bool,
}

/// On-disk overrides; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ConfigFile {
    terminal_binary: Option<PathBuf>,
    toolchain_bin: Option<PathBuf>,
    recordings_dir: Option<PathBuf>,
    recorder_binary: Option<String>,
    recorder_term: Option<String>,
    gif_converter: Option<String>,
    svg_converter: Option<String>,
    monitor_interval_ms: Option<u64>,
    kill_grace_ms: Option<u64>,
    recording_stop_timeout_ms: Option<u64>,
    scan_interval_ms: Option<u64>,
    auto_record: Option<bool>,
}

impl Config {
    /// Defaults rooted at the given home directory.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home_dir = home.into();
        let toolchain_bin = home_dir.join(".cargo").join("bin");
        Self {
            terminal_binary: toolchain_bin.join("rio"),
            toolchain_bin,
            data_dir: home_dir.join(".rio-launcher"),
            recordings_dir: home_dir.join(".rio-recordings"),
            recording_extension: "cast".to_string(),
            recorder_binary: "asciinema".to_string(),
            recorder_term: "xterm-256color".to_string(),
            gif_converter: "agg".to_string(),
            svg_converter: "svg-term".to_string(),
            monitor_interval: Duration::from_secs(5),
            kill_grace: Duration::from_secs(1),
            recording_stop_timeout: Duration::from_secs(5),
            scan_interval: Duration::from_secs(30),
            auto_record: false,
            home_dir,
        }
    }

    /// Load defaults, then `<data_dir>/config.json`, then environment overrides.
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| RioError::Config("cannot determine home directory".into()))?;
        let mut config = Self::with_home(home);

        if let Ok(dir) = std::env::var("RIO_LAUNCHER_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        let file = config.data_dir.join("config.json");
        if file.exists() {
            config.apply_file(&file)?;
        }
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| RioError::Config(format!("{}: {}", path.display(), e)))?;
        self.merge(file);
        Ok(())
    }

    fn merge(&mut self, file: ConfigFile) {
        if let Some(v) = file.terminal_binary {
            self.terminal_binary = v;
        }
        if let Some(v) = file.toolchain_bin {
            self.toolchain_bin = v;
        }
        if let Some(v) = file.recordings_dir {
            self.recordings_dir = v;
        }
        if let Some(v) = file.recorder_binary {
            self.recorder_binary = v;
        }
        if let Some(v) = file.recorder_term {
            self.recorder_term = v;
        }
        if let Some(v) = file.gif_converter {
            self.gif_converter = v;
        }
        if let Some(v) = file.svg_converter {
            self.svg_converter = v;
        }
        if let Some(ms) = file.monitor_interval_ms {
            self.monitor_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = file.kill_grace_ms {
            self.kill_grace = Duration::from_millis(ms);
        }
        if let Some(ms) = file.recording_stop_timeout_ms {
            self.recording_stop_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.scan_interval_ms {
            self.scan_interval = Duration::from_millis(ms);
        }
        if let Some(v) = file.auto_record {
            self.auto_record = v;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(bin) = std::env::var("RIO_LAUNCHER_BIN") {
            self.terminal_binary = PathBuf::from(bin);
        }
        if let Ok(recorder) = std::env::var("RIO_LAUNCHER_RECORDER") {
            self.recorder_binary = recorder;
        }
        if let Ok(dir) = std::env::var("RIO_LAUNCHER_RECORDINGS_DIR") {
            self.recordings_dir = PathBuf::from(dir);
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("monitorInterval", self.monitor_interval),
            ("killGrace", self.kill_grace),
            ("recordingStopTimeout", self.recording_stop_timeout),
            ("scanInterval", self.scan_interval),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(RioError::Config(format!("{} must be > 0", name)));
            }
        }

        let binaries = [
            ("recorderBinary", &self.recorder_binary),
            ("gifConverter", &self.gif_converter),
            ("svgConverter", &self.svg_converter),
        ];
        for (name, value) in binaries {
            if value.trim().is_empty() {
                return Err(RioError::Config(format!("{} must not be empty", name)));
            }
        }

        if self.terminal_binary.as_os_str().is_empty() {
            return Err(RioError::Config("terminalBinary must not be empty".into()));
        }
        Ok(())
    }

    pub fn storage_file(&self) -> PathBuf {
        self.data_dir.join("storage.json")
    }

    pub fn profiles_file(&self) -> PathBuf {
        self.data_dir.join("profiles.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_rooted_at_home() {
        let config = Config::with_home("/home/elle");
        assert_eq!(config.terminal_binary, PathBuf::from("/home/elle/.cargo/bin/rio"));
        assert_eq!(config.toolchain_bin, PathBuf::from("/home/elle/.cargo/bin"));
        assert_eq!(config.recordings_dir, PathBuf::from("/home/elle/.rio-recordings"));
        assert_eq!(config.monitor_interval, Duration::from_secs(5));
        assert_eq!(config.kill_grace, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_overrides_merge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"recorderBinary": "/usr/local/bin/asciinema", "killGraceMs": 250, "autoRecord": true}"#,
        )
        .unwrap();

        let mut config = Config::with_home("/home/elle");
        config.apply_file(&path).unwrap();
        assert_eq!(config.recorder_binary, "/usr/local/bin/asciinema");
        assert_eq!(config.kill_grace, Duration::from_millis(250));
        assert!(config.auto_record);
        // untouched fields keep their defaults
        assert_eq!(config.recorder_term, "xterm-256color");
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let mut config = Config::with_home("/home/elle");
        assert!(matches!(config.apply_file(&path), Err(RioError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_durations() {
        let mut config = Config::with_home("/home/elle");
        config.kill_grace = Duration::ZERO;
        assert!(matches!(config.validate(), Err(RioError::Config(_))));
    }
}
