//! Configuration loading and management

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::feedback::DEFAULT_START_CUE_GAP;
use crate::stream::DEFAULT_DETECTION_WINDOW;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(2000);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);
const DEFAULT_SAMPLE_RATE: u32 = 16000;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Unix socket the BLE helper connects to
    pub socket_path: PathBuf,

    /// Where WAV recordings are written
    pub recordings_dir: PathBuf,

    /// How long audio stays paused after a long press starts
    pub detection_window: Duration,

    /// Gap between the two pulses of the start cue
    pub start_cue_gap: Duration,

    /// Minimum spacing between toggles; `None` accepts every press
    pub min_toggle_interval: Option<Duration>,

    /// Speak "Recording started"/"Recording stopped"
    pub speech_feedback: bool,

    /// Upper bound on each shutdown step
    pub shutdown_timeout: Duration,

    /// Upper bound on a single BLE helper request
    pub request_timeout: Duration,

    /// Sample rate of decoded PCM
    ///
    /// Audio is taken to be 16-bit little-endian mono PCM. Devices streaming
    /// Opus need a matching `AudioDecoder` before their files are playable.
    pub sample_rate: u32,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let home = lookup("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("omi-buttond");

        let socket_path = data_dir.join("bridge.sock");
        let recordings_dir = lookup("OMI_RECORDINGS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("recordings"));

        let millis = |key: &str| -> Result<Option<Duration>> {
            Ok(parse(&lookup, key)?.map(Duration::from_millis))
        };

        let min_toggle_interval = millis("OMI_MIN_TOGGLE_INTERVAL_MS")?.filter(|d| !d.is_zero());

        let speech_feedback = match lookup("OMI_SPEECH_FEEDBACK") {
            Some(v) => !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "off"),
            None => true,
        };

        Ok(Self {
            socket_path,
            recordings_dir,
            detection_window: millis("OMI_DETECTION_WINDOW_MS")?.unwrap_or(DEFAULT_DETECTION_WINDOW),
            start_cue_gap: millis("OMI_START_CUE_GAP_MS")?.unwrap_or(DEFAULT_START_CUE_GAP),
            min_toggle_interval,
            speech_feedback,
            shutdown_timeout: millis("OMI_SHUTDOWN_TIMEOUT_MS")?.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT),
            request_timeout: millis("OMI_REQUEST_TIMEOUT_MS")?.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            sample_rate: parse(&lookup, "OMI_SAMPLE_RATE")?.unwrap_or(DEFAULT_SAMPLE_RATE),
            data_dir,
        })
    }

    /// Ensure data and recordings directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("creating {}", self.data_dir.display()))?;
        std::fs::create_dir_all(&self.recordings_dir)
            .with_context(|| format!("creating {}", self.recordings_dir.display()))?;
        Ok(())
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|v| v.trim().parse::<T>().with_context(|| format!("invalid {}: {:?}", key, v)))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("HOME", "/home/omi")]).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/home/omi/.local/share/omi-buttond"));
        assert_eq!(config.socket_path, config.data_dir.join("bridge.sock"));
        assert_eq!(config.recordings_dir, config.data_dir.join("recordings"));
        assert_eq!(config.detection_window, Duration::from_millis(1500));
        assert_eq!(config.start_cue_gap, Duration::from_millis(100));
        assert_eq!(config.min_toggle_interval, None);
        assert!(config.speech_feedback);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(2));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.sample_rate, 16000);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("HOME", "/home/omi"),
            ("OMI_RECORDINGS_DIR", "/tmp/takes"),
            ("OMI_DETECTION_WINDOW_MS", "2000"),
            ("OMI_MIN_TOGGLE_INTERVAL_MS", "300"),
            ("OMI_SPEECH_FEEDBACK", "Off"),
            ("OMI_SAMPLE_RATE", " 8000 "),
        ])
        .unwrap();

        assert_eq!(config.recordings_dir, PathBuf::from("/tmp/takes"));
        assert_eq!(config.detection_window, Duration::from_secs(2));
        assert_eq!(config.min_toggle_interval, Some(Duration::from_millis(300)));
        assert!(!config.speech_feedback);
        assert_eq!(config.sample_rate, 8000);
    }

    #[test]
    fn test_zero_interval_disables_debounce() {
        let config = load(&[("HOME", "/h"), ("OMI_MIN_TOGGLE_INTERVAL_MS", "0")]).unwrap();
        assert_eq!(config.min_toggle_interval, None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = load(&[("HOME", "/h"), ("OMI_DETECTION_WINDOW_MS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("OMI_DETECTION_WINDOW_MS"));

        assert!(load(&[]).is_err());
    }
}
