//! # Value Mapping Module
//!
//! Maps raw input samples to output pulse widths through a per-channel
//! piecewise-linear curve with its breakpoint at the calibrated center.
//!
//! ```text
//!  output
//!    outMax ┤                 ╭──
//!           │              ╭──╯
//! outCenter ┤──────────╭───╯
//!           │       ╭──╯
//!    outMin ┤─╭─────╯
//!           └─┬──────┬────────┬──── raw
//!           rawMin rawCenter rawMax
//! ```
//!
//! A channel is reversed when `out_min > out_max`; the same formula then
//! produces a falling curve. Values outside the raw range are extrapolated,
//! never clamped: safety clamping belongs to the receiver's output stage.
//!
//! ## Usage
//!
//! ```
//! use rc_link::calibration::mapping::ChannelCalibration;
//!
//! let cal = ChannelCalibration::new(685, 1145, 1647, 1000, 1500, 2000);
//! assert_eq!(cal.map_value(1145), 1500);
//! assert_eq!(cal.map_value(900), 1233);
//! ```

use crate::packet::protocol::NUM_CALIBRATION_PARAMS;

/// One of the six scalar fields defining a channel's curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    RawMin,
    RawCenter,
    RawMax,
    OutMin,
    OutCenter,
    OutMax,
}

impl Parameter {
    /// All parameters in the order the calibration page visits them.
    pub const ALL: [Parameter; NUM_CALIBRATION_PARAMS] = [
        Parameter::RawMin,
        Parameter::RawCenter,
        Parameter::RawMax,
        Parameter::OutMin,
        Parameter::OutCenter,
        Parameter::OutMax,
    ];

    /// Position in [`Parameter::ALL`] and in calibration frames.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Parameter at `index`, if any.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// `true` for the three raw-sample parameters.
    #[must_use]
    pub fn is_raw(self) -> bool {
        matches!(self, Parameter::RawMin | Parameter::RawCenter | Parameter::RawMax)
    }

    /// Short label for logs and displays.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Parameter::RawMin => "raw min",
            Parameter::RawCenter => "raw center",
            Parameter::RawMax => "raw max",
            Parameter::OutMin => "out min",
            Parameter::OutCenter => "out center",
            Parameter::OutMax => "out max",
        }
    }
}

/// Raw-to-output curve of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelCalibration {
    pub raw_min: u16,
    pub raw_center: u16,
    pub raw_max: u16,
    pub out_min: u16,
    pub out_center: u16,
    pub out_max: u16,
}

impl ChannelCalibration {
    /// Creates a calibration from its six parameters.
    #[must_use]
    pub const fn new(
        raw_min: u16,
        raw_center: u16,
        raw_max: u16,
        out_min: u16,
        out_center: u16,
        out_max: u16,
    ) -> Self {
        Self {
            raw_min,
            raw_center,
            raw_max,
            out_min,
            out_center,
            out_max,
        }
    }

    /// Builds a calibration from parameters in [`Parameter::ALL`] order.
    #[must_use]
    pub fn from_params(params: [u16; NUM_CALIBRATION_PARAMS]) -> Self {
        let [raw_min, raw_center, raw_max, out_min, out_center, out_max] = params;
        Self::new(raw_min, raw_center, raw_max, out_min, out_center, out_max)
    }

    /// Parameters in [`Parameter::ALL`] order.
    #[must_use]
    pub fn to_params(&self) -> [u16; NUM_CALIBRATION_PARAMS] {
        [
            self.raw_min,
            self.raw_center,
            self.raw_max,
            self.out_min,
            self.out_center,
            self.out_max,
        ]
    }

    #[must_use]
    pub fn get(&self, parameter: Parameter) -> u16 {
        self.to_params()[parameter.index()]
    }

    pub fn set(&mut self, parameter: Parameter, value: u16) {
        let mut params = self.to_params();
        params[parameter.index()] = value;
        *self = Self::from_params(params);
    }

    /// Whether the output direction is inverted.
    #[must_use]
    pub fn is_reversed(&self) -> bool {
        self.out_min > self.out_max
    }

    /// Swaps `out_min` and `out_max`, inverting the output direction.
    pub fn toggle_reversed(&mut self) {
        std::mem::swap(&mut self.out_min, &mut self.out_max);
    }

    /// Maps a raw sample to an output value.
    ///
    /// Below `raw_center` the lower segment is used, otherwise the upper one,
    /// so `map_value(raw_center) == out_center` exactly. Integer division
    /// truncates toward zero.
    #[must_use]
    pub fn map_value(&self, raw: u16) -> i32 {
        if raw < self.raw_center {
            lerp(raw, self.raw_min, self.raw_center, self.out_min, self.out_center)
        } else {
            lerp(raw, self.raw_center, self.raw_max, self.out_center, self.out_max)
        }
    }
}

/// Linear interpolation of `x` from `[x0, x1]` onto `[y0, y1]`.
///
/// A zero-width input span yields `y0`. Extrapolations beyond the `i32`
/// range saturate.
#[must_use]
pub fn lerp(x: u16, x0: u16, x1: u16, y0: u16, y1: u16) -> i32 {
    let span = i64::from(x1) - i64::from(x0);
    if span == 0 {
        return i32::from(y0);
    }

    let offset = i64::from(x) - i64::from(x0);
    let rise = i64::from(y1) - i64::from(y0);

    let value = i64::from(y0) + offset * rise / span;
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Converts a mapped value to the u16 carried in control frames.
///
/// Saturates at the limits of the wire type only; this is not the actuator
/// safety clamp.
#[must_use]
pub fn to_wire_value(mapped: i32) -> u16 {
    mapped.clamp(0, i32::from(u16::MAX)) as u16
}
