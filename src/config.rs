use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Options snapshot for one scanning pipeline.
///
/// A snapshot is immutable while a pipeline is active; supplying a new
/// snapshot rebuilds the pipeline only when the two compare structurally
/// unequal (`PartialEq` is the deep value comparison — two independently
/// built but equal snapshots do not trigger a rebuild).
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScanOptions {
    /// Specific camera device to open (exact match); when absent, generic
    /// constraints are used instead
    pub device_id: Option<String>,

    /// Opaque hints forwarded verbatim to the decode capability
    pub decode_hints: Option<Value>,

    /// Video track constraints used when no device id is given; defaults to
    /// preferring the rear/environment-facing camera
    pub video_constraints: Option<Value>,

    /// Delay before the next cycle after a failed decode attempt
    #[serde(default = "default_delay_between_scan_attempts_ms")]
    pub delay_between_scan_attempts_ms: u64,

    /// Delay before the next cycle after a successful decode
    #[serde(default = "default_delay_between_scan_success_ms")]
    pub delay_between_scan_success_ms: u64,

    /// How long to wait for the video sink to become playable
    #[serde(default = "default_playback_timeout_ms")]
    pub playback_timeout_ms: u64,

    /// Play an audio cue on every non-empty successful result
    #[serde(default = "default_audio")]
    pub audio: bool,
}

fn default_delay_between_scan_attempts_ms() -> u64 {
    500
}

fn default_delay_between_scan_success_ms() -> u64 {
    500
}

fn default_playback_timeout_ms() -> u64 {
    10_000
}

fn default_audio() -> bool {
    true
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            device_id: None,
            decode_hints: None,
            video_constraints: None,
            delay_between_scan_attempts_ms: default_delay_between_scan_attempts_ms(),
            delay_between_scan_success_ms: default_delay_between_scan_success_ms(),
            playback_timeout_ms: default_playback_timeout_ms(),
            audio: default_audio(),
        }
    }
}

impl ScanOptions {
    /// Load options from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("scancam.toml")
    }

    /// Load options from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading scan options from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default(
                "delay_between_scan_attempts_ms",
                default_delay_between_scan_attempts_ms(),
            )?
            .set_default(
                "delay_between_scan_success_ms",
                default_delay_between_scan_success_ms(),
            )?
            .set_default("playback_timeout_ms", default_playback_timeout_ms())?
            .set_default("audio", default_audio())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with SCANCAM_ prefix
            .add_source(Environment::with_prefix("SCANCAM"))
            .build()?;

        let options: ScanOptions = settings.try_deserialize()?;
        options.validate()?;

        info!("Scan options loaded successfully");
        debug!("Final scan options: {:#?}", options);

        Ok(options)
    }

    /// Validate option values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.playback_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Playback timeout must be greater than 0".to_string(),
            ));
        }

        if let Some(device_id) = &self.device_id {
            if device_id.is_empty() {
                return Err(ConfigError::Message(
                    "Device id must not be empty when set".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn delay_between_scan_attempts(&self) -> Duration {
        Duration::from_millis(self.delay_between_scan_attempts_ms)
    }

    pub fn delay_between_scan_success(&self) -> Duration {
        Duration::from_millis(self.delay_between_scan_success_ms)
    }

    pub fn playback_timeout(&self) -> Duration {
        Duration::from_millis(self.playback_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let options = ScanOptions::default();
        assert_eq!(options.delay_between_scan_attempts_ms, 500);
        assert_eq!(options.delay_between_scan_success_ms, 500);
        assert_eq!(options.playback_timeout_ms, 10_000);
        assert!(options.audio);
        assert!(options.device_id.is_none());
        assert!(options.video_constraints.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let options = ScanOptions {
            playback_timeout_ms: 0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_device_id() {
        let options = ScanOptions {
            device_id: Some(String::new()),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_structural_equality() {
        let a = ScanOptions {
            device_id: Some("cam-1".to_string()),
            video_constraints: Some(json!({ "facingMode": "environment" })),
            ..Default::default()
        };
        // Independently built but structurally identical
        let a_prime = ScanOptions {
            device_id: Some("cam-1".to_string()),
            video_constraints: Some(json!({ "facingMode": "environment" })),
            ..Default::default()
        };
        let b = ScanOptions {
            device_id: Some("cam-2".to_string()),
            ..a.clone()
        };

        assert_eq!(a, a_prime);
        assert_ne!(a, b);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let options = ScanOptions::load_from_file("/nonexistent/scancam.toml").unwrap();
        assert_eq!(options, ScanOptions::default());
    }

    #[test]
    fn test_load_from_file_overrides() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "delay_between_scan_attempts_ms = 250\naudio = false"
        )
        .unwrap();

        let options = ScanOptions::load_from_file(file.path()).unwrap();
        assert_eq!(options.delay_between_scan_attempts_ms, 250);
        assert!(!options.audio);
        // Untouched fields keep their defaults
        assert_eq!(options.delay_between_scan_success_ms, 500);
    }
}
