//! Configuration management for the sentry
//!
//! Settings are read from an optional TOML file and then overridden by
//! `SENTRYCAM__SECTION__KEY` environment variables. Any key left unset falls
//! back to the reference deployment defaults.

use crate::errors::{Result, SentryError};
use crate::gimbal::PulseCalibration;
use crate::tracking::{CenterPoint, DeadZone};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "SENTRYCAM";

/// Lowest frame rate that does not flicker on playback
pub const MIN_FRAME_RATE: u32 = 25;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SentryConfig {
    pub camera: CameraConfig,
    pub tracking: TrackingConfig,
    pub recording: RecordingConfig,
    pub notify: NotifyConfig,
    pub mail: MailConfig,
    pub gimbal: GimbalConfig,
    pub overlay: OverlayConfig,
    pub detection: DetectionConfig,
    pub preview: PreviewConfig,
}

/// Capture device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Camera device index
    pub video_device: u32,
    /// Microphone name; `None` selects the system default input
    pub audio_device: Option<String>,
    pub width: u32,
    pub height: u32,
    /// Frames per second, at least 25
    pub frame_rate: u32,
    /// Video bitrate in bits per second
    pub bitrate: u32,
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
    /// Audio bitrate in bits per second
    pub audio_bitrate: u32,
    /// Consecutive frame read failures treated as end of stream
    pub max_consecutive_frame_errors: u32,
}

/// Dead zone and reference point for gimbal tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub dead_zone: DeadZone,
    pub center: CenterPoint,
}

/// Recording behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Stream or archive destination handed to the recording sink
    pub destination: String,
    /// Quiet interval without faces before recording stops
    pub quiet_timeout_ms: u64,
    /// Where the still frame is written when recording starts
    pub screenshot_path: PathBuf,
}

/// Remote recording endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub start_url: String,
    pub stop_url: String,
    /// Playback URL prefix the session locator is appended to
    pub history_prefix: String,
    /// Leading characters stripped from the session locator
    pub locator_prefix_len: usize,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// Upper bound on concurrently running notification tasks
    pub max_in_flight: usize,
}

/// Operator e-mail
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub attachment_name: String,
}

/// Servo wiring and calibration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GimbalConfig {
    /// GPIO line driving the pan servo
    pub horizontal_pin: u32,
    /// GPIO line driving the tilt servo
    pub vertical_pin: u32,
    pub calibration: PulseCalibration,
}

/// Frame annotation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub draw_faces: bool,
    pub timestamp: bool,
    /// Top-left corner of the timestamp [x, y]
    pub position: [u32; 2],
    /// Pixel size of one font cell
    pub scale: u32,
    /// Timestamp colour [r, g, b]
    pub color: [u8; 3],
}

/// Face detector model and tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Haar cascade XML
    pub model_path: PathBuf,
    pub scale_factor: f64,
    pub min_neighbors: i32,
    /// Smallest face side in pixels; 0 disables the limit
    pub min_face_size: i32,
}

/// Local preview written as a periodically refreshed JPEG
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub enabled: bool,
    pub path: PathBuf,
    /// Write every n-th frame
    pub every_n_frames: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("haarcascade_frontalface_alt.xml"),
            scale_factor: 1.1,
            min_neighbors: 3,
            min_face_size: 0,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("sentry-preview.jpg"),
            every_n_frames: 25,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            video_device: 0,
            audio_device: None,
            width: 1280,
            height: 720,
            frame_rate: 25,
            bitrate: 2_000_000,
            audio_sample_rate: 44_100,
            audio_channels: 2,
            audio_bitrate: 192_000,
            max_consecutive_frame_errors: 30,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            dead_zone: DeadZone {
                left: 400,
                right: 600,
                top: 300,
                down: 400,
            },
            center: CenterPoint { x: 500, y: 350 },
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            destination: "sentry.mp4".to_string(),
            quiet_timeout_ms: 10_000,
            screenshot_path: PathBuf::from("sentry-still.jpg"),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            start_url: "http://127.0.0.1:8080/control/record/start?app=live&name=cam&rec=rec".to_string(),
            stop_url: "http://127.0.0.1:8080/control/record/stop?app=live&name=cam&rec=rec".to_string(),
            history_prefix: "http://127.0.0.1:8080/history/".to_string(),
            locator_prefix_len: 11,
            connect_timeout_ms: 50_000,
            read_timeout_ms: 20_000,
            max_in_flight: 4,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: "localhost".to_string(),
            smtp_port: 465,
            username: String::new(),
            password: String::new(),
            from: "sentry@localhost".to_string(),
            to: Vec::new(),
            cc: Vec::new(),
            subject: "Face detected".to_string(),
            attachment_name: "still.jpg".to_string(),
        }
    }
}

impl Default for GimbalConfig {
    fn default() -> Self {
        Self {
            horizontal_pin: 18,
            vertical_pin: 17,
            calibration: PulseCalibration::default(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            draw_faces: true,
            timestamp: true,
            position: [920, 50],
            scale: 3,
            color: [255, 255, 0],
        }
    }
}

impl CameraConfig {
    /// Audio read cadence: 800 ms divided by the frame rate
    pub fn audio_interval(&self) -> Duration {
        let ms = 800 / u64::from(self.frame_rate.max(1));
        Duration::from_millis(ms.max(1))
    }
}

impl RecordingConfig {
    pub fn quiet_timeout(&self) -> Duration {
        Duration::from_millis(self.quiet_timeout_ms)
    }
}

impl SentryConfig {
    /// Load configuration from a TOML file plus environment overrides
    ///
    /// A missing file is not an error; defaults and environment apply.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
        }

        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| SentryError::Configuration(format!("Failed to read config: {}", e)))?;

        let config: SentryConfig = settings
            .try_deserialize()
            .map_err(|e| SentryError::Configuration(format!("Failed to parse config: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            SentryError::Configuration(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, toml_string)?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("sentrycam.toml")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(SentryError::Configuration(msg.to_string()));
        let camera = &self.camera;

        if camera.width == 0 || camera.height == 0 {
            return fail("Invalid resolution");
        }
        if camera.frame_rate < MIN_FRAME_RATE || camera.frame_rate > 240 {
            return fail("Invalid frame rate (must be 25-240)");
        }
        if camera.audio_channels == 0 || camera.audio_sample_rate == 0 {
            return fail("Invalid audio format");
        }

        let zone = &self.tracking.dead_zone;
        if zone.left > zone.right || zone.top > zone.down {
            return fail("Dead zone bounds are inverted");
        }
        let (w, h) = (camera.width as i32, camera.height as i32);
        if zone.left < 0 || zone.top < 0 || zone.right > w || zone.down > h {
            return fail("Dead zone lies outside the frame");
        }
        let center = &self.tracking.center;
        if center.x < 0 || center.y < 0 || center.x > w || center.y > h {
            return fail("Center point lies outside the frame");
        }

        if self.recording.quiet_timeout_ms == 0 {
            return fail("Quiet timeout must be positive");
        }
        if self.recording.destination.trim().is_empty() {
            return fail("Recording destination is empty");
        }

        if self.notify.start_url.trim().is_empty() || self.notify.stop_url.trim().is_empty() {
            return fail("Notification URLs must be set");
        }
        if self.notify.max_in_flight == 0 {
            return fail("max_in_flight must be at least 1");
        }

        if self.gimbal.calibration.pulse_count == 0 {
            return fail("Pulse count must be positive");
        }

        if self.detection.scale_factor <= 1.0 {
            return fail("Detection scale factor must exceed 1.0");
        }
        if self.preview.enabled && self.preview.every_n_frames == 0 {
            return fail("Preview interval must be at least one frame");
        }

        if self.mail.enabled && self.mail.to.is_empty() {
            return fail("Mail enabled without recipients");
        }

        Ok(())
    }
}
