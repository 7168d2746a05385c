use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::constants::{DEFAULT_MOOD_LOG_PATH, DEFAULT_SESSION_SECS};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub cors_origin: String,
    pub mood_log_path: String,
    pub capture: CaptureConfig,
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub duration_secs: u64,
    pub frame_interval_ms: u64,
    pub mirror: bool,
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSource {
    /// Local camera by index. Needs the `webcam` cargo feature.
    Webcam,
    Directory,
    Snapshot,
}

impl Default for DeviceSource {
    /// 启用 `webcam` 特性时默认读取本地摄像头
    fn default() -> Self {
        if cfg!(feature = "webcam") {
            Self::Webcam
        } else {
            Self::Directory
        }
    }
}

impl FromStr for DeviceSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webcam" | "camera" => Ok(Self::Webcam),
            "directory" | "dir" => Ok(Self::Directory),
            "snapshot" | "http" => Ok(Self::Snapshot),
            other => Err(format!("unknown capture source: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub source: DeviceSource,
    pub camera_index: i32,
    pub dir: String,
    pub snapshot_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone)]
pub struct ClassifierConfig {
    pub mock: bool,
    pub mock_label: String,
    pub api_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("mock", &self.mock)
            .field("mock_label", &self.mock_label)
            .field("api_url", &self.api_url)
            .field("api_key", &"***REDACTED***")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            duration_secs: DEFAULT_SESSION_SECS,
            frame_interval_ms: 0,
            mirror: true,
            device: DeviceConfig::default(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            source: DeviceSource::default(),
            camera_index: 0,
            dir: "./frames".to_string(),
            snapshot_url: String::new(),
            timeout_secs: 5,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            mock: true,
            mock_label: "neutral".to_string(),
            api_url: String::new(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 5000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            cors_origin: env_or("CORS_ORIGIN", "*"),
            mood_log_path: env_or("MOOD_LOG_PATH", DEFAULT_MOOD_LOG_PATH),
            capture: CaptureConfig {
                duration_secs: env_or_parse("CAPTURE_DURATION_SECS", DEFAULT_SESSION_SECS),
                frame_interval_ms: env_or_parse("CAPTURE_FRAME_INTERVAL_MS", 0_u64),
                mirror: env_or_bool("CAPTURE_MIRROR", true),
                device: DeviceConfig {
                    source: env_or_parse("CAPTURE_SOURCE", DeviceSource::default()),
                    camera_index: env_or_parse("CAPTURE_CAMERA_INDEX", 0_i32),
                    dir: env_or("CAPTURE_DIR", "./frames"),
                    snapshot_url: env_or("CAPTURE_SNAPSHOT_URL", ""),
                    timeout_secs: env_or_parse("CAPTURE_TIMEOUT_SECS", 5_u64),
                },
            },
            classifier: ClassifierConfig {
                mock: env_or_bool("CLASSIFIER_MOCK", true),
                mock_label: env_or("CLASSIFIER_MOCK_LABEL", "neutral"),
                api_url: env_or("CLASSIFIER_API_URL", ""),
                api_key: env_or("CLASSIFIER_API_KEY", ""),
                timeout_secs: env_or_parse("CLASSIFIER_TIMEOUT_SECS", 30_u64),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
