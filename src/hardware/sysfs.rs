//! # Sysfs Collaborators
//!
//! Linux implementations of the hardware traits on top of sysfs attribute
//! files:
//!
//! | Collaborator | Files |
//! |--------------|-------|
//! | [`SysfsInputs`] | IIO `in_voltageN_raw`, GPIO `value` |
//! | [`SysfsPwm`] | PWM channel directory, `duty_cycle` in ns |
//! | [`SysfsBattery`] | IIO raw ADC file, scaled to volts |
//!
//! A failed read never stops the control loop: the previous value is kept
//! and the failure is logged.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, warn};

use super::{ActuatorOutput, BatterySensor, InputSampler};
use crate::error::{RcLinkError, Result};

/// Read and parse a single-value attribute file
pub fn read_attribute<T: FromStr>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    text.trim().parse().map_err(|_| {
        RcLinkError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unparsable value {:?} in {}", text.trim(), path.display()),
        ))
    })
}

/// Analog and digital input lines
#[derive(Debug)]
pub struct SysfsInputs {
    analog: Vec<PathBuf>,
    digital: Vec<PathBuf>,
    active_low: bool,
    last_analog: Vec<u16>,
}

impl SysfsInputs {
    /// `active_low` inverts digital lines wired with pull-ups
    pub fn new(analog: Vec<PathBuf>, digital: Vec<PathBuf>, active_low: bool) -> Self {
        let last_analog = vec![0; analog.len()];
        Self {
            analog,
            digital,
            active_low,
            last_analog,
        }
    }
}

impl InputSampler for SysfsInputs {
    fn read_channel(&mut self, id: usize) -> u16 {
        let Some(path) = self.analog.get(id) else {
            return 0;
        };
        match read_attribute::<u16>(path) {
            Ok(value) => {
                self.last_analog[id] = value;
                value
            }
            Err(e) => {
                debug!("Analog input {} unreadable: {}", id, e);
                self.last_analog[id]
            }
        }
    }

    fn read_digital(&mut self, id: usize) -> bool {
        let Some(path) = self.digital.get(id) else {
            return false;
        };
        match read_attribute::<u8>(path) {
            Ok(level) => (level != 0) != self.active_low,
            Err(e) => {
                debug!("Digital input {} unreadable: {}", id, e);
                false
            }
        }
    }
}

/// PWM outputs driving servos and the ESC
#[derive(Debug)]
pub struct SysfsPwm {
    channels: Vec<PathBuf>,
    last: Vec<Option<u16>>,
}

impl SysfsPwm {
    /// `channels` are PWM channel directories such as `/sys/class/pwm/pwmchip0/pwm0`
    pub fn new(channels: Vec<PathBuf>) -> Self {
        let last = vec![None; channels.len()];
        Self { channels, last }
    }
}

impl ActuatorOutput for SysfsPwm {
    fn set_pulse_width(&mut self, channel: usize, micros: u16) {
        let Some(dir) = self.channels.get(channel) else {
            return;
        };
        if self.last[channel] == Some(micros) {
            return;
        }

        let duty_ns = u64::from(micros) * 1000;
        match fs::write(dir.join("duty_cycle"), duty_ns.to_string()) {
            Ok(()) => self.last[channel] = Some(micros),
            Err(e) => warn!("Failed to set PWM channel {}: {}", channel, e),
        }
    }
}

/// Battery voltage from a raw ADC reading
#[derive(Debug)]
pub struct SysfsBattery {
    path: PathBuf,
    scale: f32,
    last: f32,
}

impl SysfsBattery {
    /// Volts = raw reading × `scale`
    pub fn new(path: PathBuf, scale: f32) -> Self {
        Self {
            path,
            scale,
            last: 0.0,
        }
    }
}

impl BatterySensor for SysfsBattery {
    fn read_voltage(&mut self) -> f32 {
        match read_attribute::<u32>(&self.path) {
            Ok(raw) => self.last = raw as f32 * self.scale,
            Err(e) => debug!("Battery unreadable: {}", e),
        }
        self.last
    }
}
