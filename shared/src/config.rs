use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CaptureError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub ipc: IpcConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMapping {
    pub channel: String,
    pub role: String,
}

impl ChannelMapping {
    pub fn new(channel: &str, role: &str) -> Self {
        Self {
            channel: channel.to_string(),
            role: role.to_string(),
        }
    }
}

/// What happens to a session when the capture tool cannot be launched at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchFailurePolicy {
    /// Count it as a failed attempt and keep going.
    #[default]
    Continue,
    /// Record the failed attempt, then end the session.
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub tool_dir: PathBuf,
    pub executable: String,
    pub base_log_path: PathBuf,
    pub driver: String,
    pub sample_rate: u32,
    pub channels: Vec<ChannelMapping>,
    pub trigger: String,
    pub frames: u32,
    pub output_format: String,
    pub file_extension: String,
    pub inter_attempt_delay_ms: u64,
    pub stop_grace_period_ms: u64,
    pub max_attempts: u32,
    pub attempt_duration_ms: u64,
    pub launch_failure: LaunchFailurePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    pub socket_path: PathBuf,
    pub timeout_seconds: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);

        Self {
            tool_dir: PathBuf::from("/usr/bin"),
            executable: "sigrok-cli".to_string(),
            base_log_path: data_dir.join("siglog"),
            driver: "fx2lafw".to_string(),
            sample_rate: 2_000_000,
            channels: vec![
                ChannelMapping::new("D0", "SCL"),
                ChannelMapping::new("D2", "SDA"),
                ChannelMapping::new("D4", "DET"),
            ],
            trigger: "DET=r".to_string(),
            frames: 1,
            output_format: "srzip".to_string(),
            file_extension: "sr".to_string(),
            inter_attempt_delay_ms: 1000,
            stop_grace_period_ms: 100,
            max_attempts: 10,
            attempt_duration_ms: 5000,
            launch_failure: LaunchFailurePolicy::Continue,
        }
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/siglog.sock"),
            timeout_seconds: 30,
        }
    }
}

impl CaptureConfig {
    /// Checks the values the controller relies on never changing shape mid-run.
    pub fn validate(&self) -> Result<(), CaptureError> {
        let invalid = |msg: &str| Err(CaptureError::InvalidConfig(msg.to_string()));

        if self.executable.trim().is_empty() {
            return invalid("executable must not be empty");
        }
        if self.driver.trim().is_empty() {
            return invalid("driver must not be empty");
        }
        if self.output_format.trim().is_empty() {
            return invalid("output_format must not be empty");
        }
        if self.sample_rate == 0 {
            return invalid("sample_rate must be positive");
        }
        if self.channels.is_empty() {
            return invalid("channel map must not be empty");
        }
        if self.frames == 0 {
            return invalid("frames must be positive");
        }
        if self.inter_attempt_delay_ms == 0 {
            return invalid("inter_attempt_delay_ms must be positive");
        }
        if self.stop_grace_period_ms == 0 {
            return invalid("stop_grace_period_ms must be positive");
        }
        Ok(())
    }

    pub fn executable_path(&self) -> PathBuf {
        self.tool_dir.join(&self.executable)
    }

    /// `D0=SCL,D2=SDA,...` in configured order.
    pub fn channel_spec(&self) -> String {
        self.channels
            .iter()
            .map(|m| format!("{}={}", m.channel, m.role))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("siglog").join("config.yaml"))
    }

    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CaptureConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_rate, 2_000_000);
        assert_eq!(config.inter_attempt_delay_ms, 1000);
        assert_eq!(config.stop_grace_period_ms, 100);
    }

    #[test]
    fn test_channel_spec_keeps_order() {
        let config = CaptureConfig::default();
        assert_eq!(config.channel_spec(), "D0=SCL,D2=SDA,D4=DET");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = CaptureConfig::default();
        config.channels.clear();
        assert!(matches!(config.validate(), Err(CaptureError::InvalidConfig(_))));

        let mut config = CaptureConfig::default();
        config.inter_attempt_delay_ms = 0;
        assert!(matches!(config.validate(), Err(CaptureError::InvalidConfig(_))));

        let mut config = CaptureConfig::default();
        config.sample_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.capture.sample_rate = 1_000_000;
        config.capture.launch_failure = LaunchFailurePolicy::Abort;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.capture.sample_rate, 1_000_000);
        assert_eq!(loaded.capture.launch_failure, LaunchFailurePolicy::Abort);
        assert_eq!(loaded.capture.channels, config.capture.channels);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "capture:\n  driver: demo\n  launch_failure: abort\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.capture.driver, "demo");
        assert_eq!(config.capture.executable, "sigrok-cli");
        assert_eq!(config.capture.launch_failure, LaunchFailurePolicy::Abort);
        assert_eq!(config.ipc.timeout_seconds, 30);
    }
}
