//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::calibration::EngineConfig;
use crate::error::{RcLinkError, Result};
use crate::link::{ReceiverConfig, SignalQualityEstimator, TransmitterConfig};
use crate::packet::protocol::NUM_PRIMARY_CHANNELS;
use crate::serial::{DEFAULT_BAUD_RATE, DEFAULT_DEVICE_PATHS};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub link: LinkConfig,
    pub radio: RadioConfig,
    pub signal: SignalConfig,
    pub calibration: CalibrationConfig,
    pub outputs: OutputConfig,
    pub inputs: InputConfig,
    pub battery: BatteryConfig,
    pub storage: StorageConfig,
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which end of the link this process drives
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Transmitter,
    Receiver,
}

/// Link timing
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    #[serde(default = "default_role")]
    pub role: Role,

    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,

    #[serde(default = "default_fetch_interval_ms")]
    pub fetch_interval_ms: u64,

    #[serde(default = "default_listen_duration_ms")]
    pub listen_duration_ms: u64,
}

/// Radio bridge serial port
#[derive(Debug, Deserialize, Clone)]
pub struct RadioConfig {
    /// Device paths tried in order
    #[serde(default = "default_serial_ports")]
    pub ports: Vec<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Signal quality estimator
#[derive(Debug, Deserialize, Clone)]
pub struct SignalConfig {
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    #[serde(default = "default_target_samples")]
    pub target_samples: u32,
}

/// Calibration page behaviour
#[derive(Debug, Deserialize, Clone)]
pub struct CalibrationConfig {
    #[serde(default = "default_long_press_ms")]
    pub long_press_ms: u64,

    #[serde(default = "default_deflection_threshold")]
    pub deflection_threshold: u16,

    #[serde(default = "default_saliency_threshold")]
    pub saliency_threshold: u16,

    #[serde(default = "default_bias_step")]
    pub bias_step: u16,

    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

/// Receiver actuator outputs
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_pulse_min_us")]
    pub pulse_min_us: u16,

    #[serde(default = "default_pulse_max_us")]
    pub pulse_max_us: u16,

    /// PWM channel directories: 5 primary channels, then 3 aux
    #[serde(default)]
    pub pwm_channels: Vec<PathBuf>,
}

/// Transmitter stick and button inputs
#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// ADC files in channel order: throttle, rudder, elevator, aileron, channel 5
    #[serde(default)]
    pub analog: Vec<PathBuf>,

    /// GPIO value files; aux switches first
    #[serde(default)]
    pub digital: Vec<PathBuf>,

    /// Index of the calibration button within `digital`
    #[serde(default)]
    pub button: usize,

    #[serde(default = "default_active_low")]
    pub active_low: bool,
}

/// Receiver battery sense
#[derive(Debug, Deserialize, Clone)]
pub struct BatteryConfig {
    /// Raw ADC file; empty reports 0 V
    #[serde(default)]
    pub path: String,

    /// Volts per ADC count
    #[serde(default = "default_battery_scale")]
    pub scale: f32,
}

/// Calibration settings persistence
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_settings_path")]
    pub settings_path: String,
}

/// Telemetry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

/// Diagnostic logging
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; console only when unset
    #[serde(default)]
    pub file_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_dir: None,
        }
    }
}

// Default value functions
fn default_role() -> Role { Role::Transmitter }
fn default_cycle_interval_ms() -> u64 { 2 }
fn default_fetch_interval_ms() -> u64 { crate::link::transmitter::DEFAULT_FETCH_INTERVAL_MS }
fn default_listen_duration_ms() -> u64 { crate::link::transmitter::DEFAULT_LISTEN_DURATION_MS }

fn default_serial_ports() -> Vec<String> {
    DEFAULT_DEVICE_PATHS.iter().map(|p| p.to_string()).collect()
}
fn default_baud_rate() -> u32 { DEFAULT_BAUD_RATE }
fn default_timeout_ms() -> u64 { 10 }

fn default_window_ms() -> u64 { crate::link::signal::DEFAULT_WINDOW_MS }
fn default_target_samples() -> u32 { crate::link::signal::DEFAULT_TARGET_SAMPLES }

fn default_long_press_ms() -> u64 { 1000 }
fn default_deflection_threshold() -> u16 { 300 }
fn default_saliency_threshold() -> u16 { 400 }
fn default_bias_step() -> u16 { 4 }
fn default_cooldown_ms() -> u64 { 150 }

fn default_pulse_min_us() -> u16 { crate::link::receiver::DEFAULT_PULSE_MIN_US }
fn default_pulse_max_us() -> u16 { crate::link::receiver::DEFAULT_PULSE_MAX_US }

fn default_active_low() -> bool { true }

fn default_battery_scale() -> f32 { 0.0075 }

fn default_settings_path() -> String { "./data/settings.bin".to_string() }

fn default_telemetry_enabled() -> bool { true }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

fn default_log_level() -> String { "info".to_string() }

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const BAUD_RATES: [u32; 6] = [9600, 57600, 115200, 230400, 460800, 921600];

/// Aux outputs follow the primary channels
const MAX_PWM_CHANNELS: usize = NUM_PRIMARY_CHANNELS + crate::packet::protocol::NUM_AUX_CHANNELS;

fn invalid(message: impl std::fmt::Display) -> RcLinkError {
    RcLinkError::Config(toml::de::Error::custom(message))
}

fn check_range<T: PartialOrd + std::fmt::Display>(name: &str, value: T, min: T, max: T) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(format!("{} must be between {} and {}", name, min, max)));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rc_link::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        check_range("cycle_interval_ms", self.link.cycle_interval_ms, 1, 1000)?;
        check_range("fetch_interval_ms", self.link.fetch_interval_ms, 1, 60000)?;
        check_range("listen_duration_ms", self.link.listen_duration_ms, 1, 1000)?;

        if self.radio.ports.is_empty() || self.radio.ports.iter().any(String::is_empty) {
            return Err(invalid("radio ports cannot be empty"));
        }
        if !BAUD_RATES.contains(&self.radio.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {:?}",
                BAUD_RATES
            )));
        }
        check_range("timeout_ms", self.radio.timeout_ms, 1, 10000)?;

        check_range("window_ms", self.signal.window_ms, 1, 60000)?;
        check_range("target_samples", self.signal.target_samples, 1, 100_000)?;

        check_range("long_press_ms", self.calibration.long_press_ms, 1, 10000)?;
        check_range("deflection_threshold", self.calibration.deflection_threshold, 1, 2047)?;
        check_range("saliency_threshold", self.calibration.saliency_threshold, 1, 2047)?;
        check_range("bias_step", self.calibration.bias_step, 1, 100)?;
        check_range("cooldown_ms", self.calibration.cooldown_ms, 0, 10000)?;

        check_range("pulse_min_us", self.outputs.pulse_min_us, 500, 1500)?;
        check_range("pulse_max_us", self.outputs.pulse_max_us, 1500, 2500)?;
        if self.outputs.pulse_min_us >= self.outputs.pulse_max_us {
            return Err(invalid("pulse_min_us must be less than pulse_max_us"));
        }
        if self.outputs.pwm_channels.len() > MAX_PWM_CHANNELS {
            return Err(invalid(format!(
                "at most {} pwm_channels are supported",
                MAX_PWM_CHANNELS
            )));
        }

        if self.inputs.analog.len() > NUM_PRIMARY_CHANNELS {
            return Err(invalid(format!(
                "at most {} analog inputs are supported",
                NUM_PRIMARY_CHANNELS
            )));
        }
        if !self.inputs.digital.is_empty() && self.inputs.button >= self.inputs.digital.len() {
            return Err(invalid(format!(
                "button index {} is out of bounds (have {} digital inputs)",
                self.inputs.button,
                self.inputs.digital.len()
            )));
        }

        if !self.battery.scale.is_finite() || self.battery.scale < 0.0 {
            return Err(invalid("battery scale must be a non-negative number"));
        }

        if self.storage.settings_path.is_empty() {
            return Err(invalid("settings_path cannot be empty"));
        }

        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }
        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }
        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!("log level must be one of: {:?}", LOG_LEVELS)));
        }

        Ok(())
    }

    /// Calibration engine settings
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            long_press_ms: self.calibration.long_press_ms,
            deflection_threshold: self.calibration.deflection_threshold,
            saliency_threshold: self.calibration.saliency_threshold,
            bias_step: self.calibration.bias_step,
            cooldown_ms: self.calibration.cooldown_ms,
        }
    }

    pub fn transmitter_config(&self) -> TransmitterConfig {
        TransmitterConfig {
            fetch_interval_ms: self.link.fetch_interval_ms,
            listen_duration_ms: self.link.listen_duration_ms,
        }
    }

    pub fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            pulse_min_us: self.outputs.pulse_min_us,
            pulse_max_us: self.outputs.pulse_max_us,
        }
    }

    /// A fresh estimator with the configured window
    pub fn estimator(&self) -> SignalQualityEstimator {
        SignalQualityEstimator::new(self.signal.window_ms, self.signal.target_samples)
    }
}
