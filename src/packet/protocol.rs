//! # Link Protocol Constants and Types
//!
//! Core definitions for the 16-byte frames exchanged between the transmitter
//! and the receiver.
//!
//! ## Frame Layout
//!
//! | Type | Byte 0 | Payload (bytes 1..16) |
//! |------|--------|-----------------------|
//! | Unknown | 0 (or any unrecognised value) | ignored |
//! | Control | 2 | request flags, 5×u16 primary, 3×u8 aux, pad |
//! | Status | 3 | status flags, rating, f32 battery, pad |
//! | CalibrationGet | 4 | channel, 6×u16 parameters, pad |
//! | CalibrationSet | 5 | channel, 6×u16 parameters, pad |
//!
//! Multi-byte fields are little-endian. Padding is written as zero and
//! ignored on decode.

/// Size of every frame on the wire
pub const FRAME_SIZE: usize = 16;

/// A frame as carried by the radio
pub type RawFrame = [u8; FRAME_SIZE];

/// Frame type discriminants (byte 0)
pub const FRAMETYPE_UNKNOWN: u8 = 0;
pub const FRAMETYPE_CONTROL: u8 = 2;
pub const FRAMETYPE_STATUS: u8 = 3;
pub const FRAMETYPE_CALIBRATION_GET: u8 = 4;
pub const FRAMETYPE_CALIBRATION_SET: u8 = 5;

/// Number of 16-bit primary channels in a control frame
pub const NUM_PRIMARY_CHANNELS: usize = 5;

/// Number of 8-bit auxiliary channels in a control frame
pub const NUM_AUX_CHANNELS: usize = 3;

/// Number of calibration parameters per channel
pub const NUM_CALIBRATION_PARAMS: usize = 6;

/// Control request flags (byte 1 of a control frame)
///
/// ```text
/// bit 0      requesting status
/// bit 1      requesting calibration read
/// bit 2      requesting calibration write
/// bit 3      reserved
/// bits 4..7  calibration channel selector
/// ```
pub const REQUEST_STATUS_BIT: u8 = 1 << 0;
pub const REQUEST_CALIBRATION_GET_BIT: u8 = 1 << 1;
pub const REQUEST_CALIBRATION_SET_BIT: u8 = 1 << 2;
pub const REQUEST_CHANNEL_SHIFT: u32 = 4;
pub const REQUEST_CHANNEL_MASK: u8 = 0xF0;

/// Largest channel selector that fits in a control frame
pub const MAX_REQUEST_CHANNEL: u8 = REQUEST_CHANNEL_MASK >> REQUEST_CHANNEL_SHIFT;

/// Status flags (byte 1 of a status frame)
pub const STATUS_GOOD_SIGNAL_BIT: u8 = 1 << 0;

/// Encoded payload lengths, including the type byte
pub const CONTROL_FRAME_LEN: usize = 1 + 1 + NUM_PRIMARY_CHANNELS * 2 + NUM_AUX_CHANNELS;
pub const STATUS_FRAME_LEN: usize = 1 + 1 + 1 + 4;
pub const CALIBRATION_FRAME_LEN: usize = 1 + 1 + NUM_CALIBRATION_PARAMS * 2;

const _: () = assert!(CONTROL_FRAME_LEN <= FRAME_SIZE);
const _: () = assert!(STATUS_FRAME_LEN <= FRAME_SIZE);
const _: () = assert!(CALIBRATION_FRAME_LEN <= FRAME_SIZE);

/// Primary channel indices for semantic access.
pub mod channels {
    /// Throttle - left stick Y
    pub const THROTTLE: usize = 0;
    /// Rudder - left stick X
    pub const RUDDER: usize = 1;
    /// Elevator - right stick Y
    pub const ELEVATOR: usize = 2;
    /// Aileron - right stick X
    pub const AILERON: usize = 3;
    /// Channel 5 - auxiliary knob
    pub const CHANNEL_5: usize = 4;
}

/// What the transmitter asks of the receiver in a control frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Request {
    /// Plain control frame, no reply expected
    #[default]
    None,
    /// Reply with a status frame
    Status,
    /// Reply with the stored calibration of the selected channel
    CalibrationGet,
    /// Store the calibration frame that follows, then echo it back
    CalibrationSet,
}

/// Control frame payload (transmitter → receiver)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlFrame {
    /// One-shot request carried with this frame
    pub request: Request,

    /// Channel addressed by a calibration request (0-15)
    pub calibration_channel: u8,

    /// Primary channels, indexed by [`channels`]
    pub channels: [u16; NUM_PRIMARY_CHANNELS],

    /// Auxiliary channels (switches), 0 = off, 255 = on
    pub aux: [u8; NUM_AUX_CHANNELS],
}

/// Status frame payload (receiver → transmitter)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatusFrame {
    /// Majority of carrier samples in the last window were good
    pub good_signal: bool,

    /// Signal rating (0-66)
    pub signal_rating: u8,

    /// Receiver battery voltage in volts
    pub battery: f32,
}

/// Calibration frame payload (both directions)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationFrame {
    /// Channel selector
    pub channel: u8,

    /// rawMin, rawCenter, rawMax, outMin, outCenter, outMax
    pub params: [u16; NUM_CALIBRATION_PARAMS],
}

/// A decoded frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    Control(ControlFrame),
    Status(StatusFrame),
    /// Calibration values reported by the receiver
    CalibrationGet(CalibrationFrame),
    /// Calibration values the receiver should store
    CalibrationSet(CalibrationFrame),
    /// Unrecognised type byte; the payload is never interpreted
    Unknown(u8),
}

impl Frame {
    /// Type byte this frame is sent with
    pub fn frame_type(&self) -> u8 {
        match self {
            Frame::Control(_) => FRAMETYPE_CONTROL,
            Frame::Status(_) => FRAMETYPE_STATUS,
            Frame::CalibrationGet(_) => FRAMETYPE_CALIBRATION_GET,
            Frame::CalibrationSet(_) => FRAMETYPE_CALIBRATION_SET,
            Frame::Unknown(frame_type) => *frame_type,
        }
    }
}
