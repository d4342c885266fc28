//! Output naming and argument construction for the capture tool.

use chrono::{DateTime, TimeZone};
use shared::CaptureConfig;
use std::path::{Path, PathBuf};

/// A fully resolved external program call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub output_path: PathBuf,
}

pub fn date_stamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y%m%d").to_string()
}

/// `HHmmssSSS`; attempts are always at least one millisecond apart, so stamps never repeat.
pub fn time_stamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%H%M%S%3f").to_string()
}

pub fn session_directory(base_log_path: &Path, date_stamp: &str) -> PathBuf {
    base_log_path.join(date_stamp)
}

/// `{dir}/{date}_{time}.{ext}`
pub fn build_output_path(dir: &Path, date_stamp: &str, time_stamp: &str, extension: &str) -> PathBuf {
    dir.join(format!("{}_{}.{}", date_stamp, time_stamp, extension))
}

#[derive(Debug, Clone)]
pub struct SigrokCommandBuilder {
    driver: String,
    sample_rate: u32,
    channels: String,
    duration_ms: u64,
    frames: u32,
    trigger: Option<String>,
    output_format: String,
    output_path: PathBuf,
}

impl SigrokCommandBuilder {
    pub fn new(output_path: PathBuf) -> Self {
        Self {
            driver: "fx2lafw".to_string(),
            sample_rate: 2_000_000,
            channels: String::new(),
            duration_ms: 1000,
            frames: 1,
            trigger: None,
            output_format: "srzip".to_string(),
            output_path,
        }
    }

    /// Seeds every device setting from the capture configuration.
    pub fn from_config(config: &CaptureConfig, output_path: PathBuf) -> Self {
        Self::new(output_path)
            .with_driver(config.driver.clone())
            .with_sample_rate(config.sample_rate)
            .with_channels(config.channel_spec())
            .with_frames(config.frames)
            .with_trigger(Some(config.trigger.clone()).filter(|t| !t.is_empty()))
            .with_output_format(config.output_format.clone())
    }

    pub fn with_driver(mut self, driver: String) -> Self {
        self.driver = driver;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_channels(mut self, channels: String) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_frames(mut self, frames: u32) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_trigger(mut self, trigger: Option<String>) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_output_format(mut self, format: String) -> Self {
        self.output_format = format;
        self
    }

    pub fn build(&self) -> Vec<String> {
        let mut args = vec![
            "-d".to_string(), self.driver.clone(),
            "--config".to_string(), format!("samplerate={}", self.sample_rate),
            "--time".to_string(), self.duration_ms.to_string(),
        ];

        if !self.channels.is_empty() {
            args.push("--channels".to_string());
            args.push(self.channels.clone());
        }

        args.extend(vec![
            "--frames".to_string(), self.frames.to_string(),
        ]);

        if let Some(trigger) = &self.trigger {
            args.push("-t".to_string());
            args.push(trigger.clone());
        }

        args.extend(vec![
            "-O".to_string(), self.output_format.clone(),
            "-o".to_string(), self.output_path.to_string_lossy().to_string(),
        ]);

        args
    }
}

/// Builds the call for one attempt: `{tool_dir}/{executable}` run from `tool_dir`.
pub fn build_invocation(config: &CaptureConfig, output_path: PathBuf, attempt_duration_ms: u64) -> Invocation {
    let args = SigrokCommandBuilder::from_config(config, output_path.clone())
        .with_duration_ms(attempt_duration_ms)
        .build();

    Invocation {
        program: config.executable_path(),
        args,
        working_dir: config.tool_dir.clone(),
        output_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, NaiveDate};

    #[test]
    fn test_default_builder() {
        let builder = SigrokCommandBuilder::new(PathBuf::from("out.sr"))
            .with_channels("D0=SCL".to_string());
        let args = builder.build();

        assert_eq!(args[0], "-d");
        assert_eq!(args[1], "fx2lafw");
        assert_eq!(args[3], "samplerate=2000000");
        assert_eq!(args[5], "1000");
        assert_eq!(args[7], "D0=SCL");
        assert_eq!(args.last().unwrap(), "out.sr");
        assert!(!args.contains(&"-t".to_string()));
    }

    #[test]
    fn test_invocation_from_config() {
        let config = CaptureConfig {
            tool_dir: PathBuf::from("/opt/sigrok"),
            ..CaptureConfig::default()
        };
        let invocation = build_invocation(&config, PathBuf::from("/logs/20250319/20250319_101500.sr"), 500);

        assert_eq!(invocation.program, PathBuf::from("/opt/sigrok/sigrok-cli"));
        assert_eq!(invocation.working_dir, PathBuf::from("/opt/sigrok"));
        assert_eq!(
            invocation.args.join(" "),
            "-d fx2lafw --config samplerate=2000000 --time 500 --channels D0=SCL,D2=SDA,D4=DET \
             --frames 1 -t DET=r -O srzip -o /logs/20250319/20250319_101500.sr"
        );
    }

    #[test]
    fn test_output_path_naming() {
        let at = Local
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2025, 3, 19).unwrap().and_hms_milli_opt(7, 5, 9, 42).unwrap(),
            )
            .unwrap();

        let date = date_stamp(&at);
        let time = time_stamp(&at);
        assert_eq!(date, "20250319");
        assert_eq!(time, "070509042");

        let dir = session_directory(Path::new("/logs"), &date);
        assert_eq!(dir, PathBuf::from("/logs/20250319"));
        assert_eq!(
            build_output_path(&dir, &date, &time, "sr"),
            PathBuf::from("/logs/20250319/20250319_070509042.sr")
        );
    }

    #[test]
    fn test_time_stamps_one_millisecond_apart_differ() {
        let at = Local::now();
        let later = at + chrono::Duration::milliseconds(1);
        assert_ne!(time_stamp(&at), time_stamp(&later));
        assert_eq!(time_stamp(&at).len(), 9);
    }
}
