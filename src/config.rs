use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SpotcamConfig {
    pub device: DeviceConfig,
    pub sensor: SensorConfig,
    pub camera: CameraConfig,
    pub uplink: UplinkConfig,
    pub triggers: TriggersConfig,
    pub fallback: FallbackConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeviceConfig {
    /// Station identifier reported with every capture
    #[serde(default = "default_station_id")]
    pub station_id: String,

    /// Parking spot number monitored by this device
    #[serde(default = "default_spot_number")]
    pub spot_number: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SensorConfig {
    /// Enable the distance sensor (disabling activates the fallback loop)
    #[serde(default = "default_sensor_enabled")]
    pub enabled: bool,

    /// Substitute a simulated sensor for the hardware driver
    #[serde(default = "default_simulate")]
    pub simulate: bool,

    /// I2C bus the sensor is attached to
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,

    /// I2C address of the sensor
    #[serde(default = "default_i2c_address")]
    pub i2c_address: u16,

    /// Sampling frequency in Hz
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: f64,

    /// Number of samples in the moving-average window
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,

    /// Distance below which a vehicle is considered present (mm)
    #[serde(default = "default_present_mm")]
    pub present_mm: u32,

    /// Distance above which the spot is considered vacant (mm)
    #[serde(default = "default_absent_mm")]
    pub absent_mm: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Substitute a simulated camera for the hardware driver
    #[serde(default = "default_simulate")]
    pub simulate: bool,

    /// Capture resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Image rotation in degrees (0, 90, 180, 270)
    #[serde(default = "default_camera_rotation")]
    pub rotation: u32,

    /// Brightness adjustment in percent
    #[serde(default = "default_camera_brightness")]
    pub brightness: u32,

    /// Encoded image format
    #[serde(default = "default_camera_format")]
    pub format: String,

    /// JPEG quality (1-100)
    #[serde(default = "default_camera_quality")]
    pub quality: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UplinkConfig {
    /// Protocol for the vision endpoint (http or https)
    #[serde(default = "default_uplink_protocol")]
    pub protocol: String,

    /// Host or IP address of the vision endpoint
    #[serde(default = "default_uplink_host")]
    pub host: String,

    /// Port of the vision endpoint
    #[serde(default = "default_uplink_port")]
    pub port: u16,

    /// Request path on the vision endpoint
    #[serde(default = "default_uplink_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_uplink_timeout")]
    pub timeout_seconds: u64,
}

impl UplinkConfig {
    /// Full URL of the vision endpoint
    pub fn url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.protocol, self.host, self.port, self.endpoint
        )
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TriggersConfig {
    pub entry: EntryTriggerConfig,
    pub exit: ExitTriggerConfig,
    pub verification: VerificationTriggerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EntryTriggerConfig {
    /// Capture a burst of images when a vehicle arrives
    #[serde(default = "default_trigger_enabled")]
    pub enabled: bool,

    /// Burst length in seconds
    #[serde(default = "default_entry_duration")]
    pub duration_seconds: u64,

    /// Seconds between captures within the burst
    #[serde(default = "default_entry_interval")]
    pub interval_seconds: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExitTriggerConfig {
    /// Capture an image when a vehicle leaves
    #[serde(default = "default_trigger_enabled")]
    pub enabled: bool,

    /// Send the exit capture immediately on the transition
    #[serde(default = "default_trigger_enabled")]
    pub send_immediate: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VerificationTriggerConfig {
    /// Periodically re-verify an occupied spot
    #[serde(default = "default_trigger_enabled")]
    pub enabled: bool,

    /// Seconds between verification checks
    #[serde(default = "default_verification_interval")]
    pub interval_seconds: u64,

    /// Verification burst length in seconds
    #[serde(default = "default_verification_duration")]
    pub duration_seconds: u64,

    /// Seconds between captures within the verification burst
    #[serde(default = "default_verification_send_interval")]
    pub send_interval_seconds: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FallbackConfig {
    /// Capture on a fixed interval when no presence sensor is available
    #[serde(default = "default_trigger_enabled")]
    pub enabled: bool,

    /// Seconds between fallback captures
    #[serde(default = "default_fallback_interval")]
    pub interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file path; stderr only when unset
    pub file: Option<String>,
}

impl SpotcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("spotcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("device.station_id", default_station_id())?
            .set_default("device.spot_number", default_spot_number())?
            .set_default("sensor.enabled", default_sensor_enabled())?
            .set_default("sensor.simulate", default_simulate())?
            .set_default("sensor.i2c_bus", default_i2c_bus() as i64)?
            .set_default("sensor.i2c_address", default_i2c_address() as i64)?
            .set_default("sensor.frequency_hz", default_frequency_hz())?
            .set_default("sensor.smoothing_window", default_smoothing_window() as i64)?
            .set_default("sensor.present_mm", default_present_mm())?
            .set_default("sensor.absent_mm", default_absent_mm())?
            .set_default("camera.simulate", default_simulate())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.rotation", default_camera_rotation())?
            .set_default("camera.brightness", default_camera_brightness())?
            .set_default("camera.format", default_camera_format())?
            .set_default("camera.quality", default_camera_quality() as i64)?
            .set_default("uplink.protocol", default_uplink_protocol())?
            .set_default("uplink.host", default_uplink_host())?
            .set_default("uplink.port", default_uplink_port() as i64)?
            .set_default("uplink.endpoint", default_uplink_endpoint())?
            .set_default("uplink.timeout_seconds", default_uplink_timeout() as i64)?
            .set_default("triggers.entry.enabled", default_trigger_enabled())?
            .set_default(
                "triggers.entry.duration_seconds",
                default_entry_duration() as i64,
            )?
            .set_default("triggers.entry.interval_seconds", default_entry_interval())?
            .set_default("triggers.exit.enabled", default_trigger_enabled())?
            .set_default("triggers.exit.send_immediate", default_trigger_enabled())?
            .set_default("triggers.verification.enabled", default_trigger_enabled())?
            .set_default(
                "triggers.verification.interval_seconds",
                default_verification_interval() as i64,
            )?
            .set_default(
                "triggers.verification.duration_seconds",
                default_verification_duration() as i64,
            )?
            .set_default(
                "triggers.verification.send_interval_seconds",
                default_verification_send_interval(),
            )?
            .set_default("fallback.enabled", default_trigger_enabled())?
            .set_default(
                "fallback.interval_seconds",
                default_fallback_interval() as i64,
            )?
            .set_default("log.level", default_log_level())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with SPOTCAM_ prefix
            .add_source(Environment::with_prefix("SPOTCAM").separator("__"))
            .build()?;

        let config: SpotcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.station_id.is_empty() {
            return Err(ConfigError::Message(
                "Device station_id must not be empty".to_string(),
            ));
        }

        if self.sensor.frequency_hz <= 0.0 {
            return Err(ConfigError::Message(
                "Sensor frequency_hz must be greater than 0".to_string(),
            ));
        }

        if self.sensor.smoothing_window == 0 {
            return Err(ConfigError::Message(
                "Sensor smoothing_window must be greater than 0".to_string(),
            ));
        }

        // The gap between the thresholds is the hysteresis band; an inverted
        // or collapsed band would chatter on every sample near the cutoff.
        if self.sensor.present_mm >= self.sensor.absent_mm {
            return Err(ConfigError::Message(
                "Sensor present_mm must be less than absent_mm".to_string(),
            ));
        }

        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if !matches!(self.camera.rotation, 0 | 90 | 180 | 270) {
            return Err(ConfigError::Message(
                "Camera rotation must be one of 0, 90, 180, 270".to_string(),
            ));
        }

        if self.camera.quality == 0 || self.camera.quality > 100 {
            return Err(ConfigError::Message(
                "Camera quality must be between 1 and 100".to_string(),
            ));
        }

        if self.uplink.host.is_empty() {
            return Err(ConfigError::Message(
                "Uplink host must not be empty".to_string(),
            ));
        }

        if !self.uplink.endpoint.starts_with('/') {
            return Err(ConfigError::Message(
                "Uplink endpoint must start with '/'".to_string(),
            ));
        }

        if self.uplink.timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Uplink timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.triggers.entry.enabled {
            if self.triggers.entry.duration_seconds == 0 {
                return Err(ConfigError::Message(
                    "Entry trigger duration_seconds must be greater than 0".to_string(),
                ));
            }
            if self.triggers.entry.interval_seconds <= 0.0 {
                return Err(ConfigError::Message(
                    "Entry trigger interval_seconds must be greater than 0".to_string(),
                ));
            }
        }

        if self.triggers.verification.enabled {
            if self.triggers.verification.interval_seconds == 0 {
                return Err(ConfigError::Message(
                    "Verification trigger interval_seconds must be greater than 0".to_string(),
                ));
            }
            if self.triggers.verification.duration_seconds == 0 {
                return Err(ConfigError::Message(
                    "Verification trigger duration_seconds must be greater than 0".to_string(),
                ));
            }
            if self.triggers.verification.send_interval_seconds <= 0.0 {
                return Err(ConfigError::Message(
                    "Verification trigger send_interval_seconds must be greater than 0"
                        .to_string(),
                ));
            }
        }

        if self.fallback.enabled && self.fallback.interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Fallback interval_seconds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for SpotcamConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig {
                station_id: default_station_id(),
                spot_number: default_spot_number(),
            },
            sensor: SensorConfig {
                enabled: default_sensor_enabled(),
                simulate: default_simulate(),
                i2c_bus: default_i2c_bus(),
                i2c_address: default_i2c_address(),
                frequency_hz: default_frequency_hz(),
                smoothing_window: default_smoothing_window(),
                present_mm: default_present_mm(),
                absent_mm: default_absent_mm(),
            },
            camera: CameraConfig {
                simulate: default_simulate(),
                resolution: default_camera_resolution(),
                rotation: default_camera_rotation(),
                brightness: default_camera_brightness(),
                format: default_camera_format(),
                quality: default_camera_quality(),
            },
            uplink: UplinkConfig {
                protocol: default_uplink_protocol(),
                host: default_uplink_host(),
                port: default_uplink_port(),
                endpoint: default_uplink_endpoint(),
                timeout_seconds: default_uplink_timeout(),
            },
            triggers: TriggersConfig {
                entry: EntryTriggerConfig {
                    enabled: default_trigger_enabled(),
                    duration_seconds: default_entry_duration(),
                    interval_seconds: default_entry_interval(),
                },
                exit: ExitTriggerConfig {
                    enabled: default_trigger_enabled(),
                    send_immediate: default_trigger_enabled(),
                },
                verification: VerificationTriggerConfig {
                    enabled: default_trigger_enabled(),
                    interval_seconds: default_verification_interval(),
                    duration_seconds: default_verification_duration(),
                    send_interval_seconds: default_verification_send_interval(),
                },
            },
            fallback: FallbackConfig {
                enabled: default_trigger_enabled(),
                interval_seconds: default_fallback_interval(),
            },
            log: LogConfig {
                level: default_log_level(),
                file: None,
            },
        }
    }
}

// Default value functions
fn default_station_id() -> String {
    "station-01".to_string()
}
fn default_spot_number() -> u32 {
    1
}

fn default_sensor_enabled() -> bool {
    true
}
fn default_simulate() -> bool {
    false
}
fn default_i2c_bus() -> u8 {
    1
}
fn default_i2c_address() -> u16 {
    0x29
}
fn default_frequency_hz() -> f64 {
    2.0
}
fn default_smoothing_window() -> usize {
    5
}
fn default_present_mm() -> u32 {
    500
}
fn default_absent_mm() -> u32 {
    700
}

fn default_camera_resolution() -> (u32, u32) {
    (1640, 1232)
}
fn default_camera_rotation() -> u32 {
    0
}
fn default_camera_brightness() -> u32 {
    50
}
fn default_camera_format() -> String {
    "jpeg".to_string()
}
fn default_camera_quality() -> u8 {
    85
}

fn default_uplink_protocol() -> String {
    "http".to_string()
}
fn default_uplink_host() -> String {
    "127.0.0.1".to_string()
}
fn default_uplink_port() -> u16 {
    8000
}
fn default_uplink_endpoint() -> String {
    "/receive_image".to_string()
}
fn default_uplink_timeout() -> u64 {
    10
}

fn default_trigger_enabled() -> bool {
    true
}
fn default_entry_duration() -> u64 {
    10
}
fn default_entry_interval() -> f64 {
    2.0
}
fn default_verification_interval() -> u64 {
    600
}
fn default_verification_duration() -> u64 {
    6
}
fn default_verification_send_interval() -> f64 {
    2.0
}
fn default_fallback_interval() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_validates() {
        let config = SpotcamConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = SpotcamConfig::default();
        config.sensor.present_mm = 700;
        config.sensor.absent_mm = 500;
        assert!(config.validate().is_err());

        // A collapsed band is just as bad
        config.sensor.present_mm = 600;
        config.sensor.absent_mm = 600;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sampling_settings_rejected() {
        let mut config = SpotcamConfig::default();
        config.sensor.frequency_hz = 0.0;
        assert!(config.validate().is_err());

        let mut config = SpotcamConfig::default();
        config.sensor.smoothing_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trigger_settings_rejected_only_when_enabled() {
        let mut config = SpotcamConfig::default();
        config.triggers.entry.duration_seconds = 0;
        assert!(config.validate().is_err());

        // A disabled trigger is allowed to carry nonsense timings
        config.triggers.entry.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_uplink_settings_rejected() {
        let mut config = SpotcamConfig::default();
        config.uplink.endpoint = "receive_image".to_string();
        assert!(config.validate().is_err());

        let mut config = SpotcamConfig::default();
        config.uplink.host = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_uplink_url() {
        let config = SpotcamConfig::default();
        assert_eq!(config.uplink.url(), "http://127.0.0.1:8000/receive_image");
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[device]
station_id = "garage-7"
spot_number = 42

[sensor]
present_mm = 450
absent_mm = 900
"#
        )
        .unwrap();

        let config = SpotcamConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.device.station_id, "garage-7");
        assert_eq!(config.device.spot_number, 42);
        assert_eq!(config.sensor.present_mm, 450);
        assert_eq!(config.sensor.absent_mm, 900);
        // Untouched sections keep their defaults
        assert_eq!(config.uplink.port, 8000);
        assert!(config.triggers.entry.enabled);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = SpotcamConfig::load_from_file("/nonexistent/spotcam.toml").unwrap();
        assert_eq!(config.device.spot_number, default_spot_number());
        assert!(config.validate().is_ok());
    }
}
