//! # Frame Encoder
//!
//! Serializes [`Frame`] values into fixed 16-byte wire frames.

use bytes::BufMut;

use super::protocol::*;

/// Encode a frame into its 16-byte wire representation
///
/// Unused trailing bytes are zero. An [`Frame::Unknown`] encodes as its type
/// byte followed by padding.
///
/// # Examples
///
/// ```
/// use rc_link::packet::encoder::encode_frame;
/// use rc_link::packet::protocol::{ControlFrame, Frame, FRAMETYPE_CONTROL};
///
/// let raw = encode_frame(&Frame::Control(ControlFrame::default()));
/// assert_eq!(raw.len(), 16);
/// assert_eq!(raw[0], FRAMETYPE_CONTROL);
/// ```
pub fn encode_frame(frame: &Frame) -> RawFrame {
    let mut raw = [0u8; FRAME_SIZE];
    let mut buf = &mut raw[..];

    buf.put_u8(frame.frame_type());

    match frame {
        Frame::Control(control) => encode_control_payload(control, &mut buf),
        Frame::Status(status) => encode_status_payload(status, &mut buf),
        Frame::CalibrationGet(calibration) | Frame::CalibrationSet(calibration) => {
            encode_calibration_payload(calibration, &mut buf)
        }
        Frame::Unknown(_) => {}
    }

    raw
}

/// Pack a request and its channel selector into the request flags byte
///
/// The channel selector is truncated to 4 bits and never disturbs the
/// request bits.
pub fn pack_request_flags(request: Request, channel: u8) -> u8 {
    let request_bits = match request {
        Request::None => 0,
        Request::Status => REQUEST_STATUS_BIT,
        Request::CalibrationGet => REQUEST_CALIBRATION_GET_BIT,
        Request::CalibrationSet => REQUEST_CALIBRATION_SET_BIT,
    };
    let channel_bits = (channel << REQUEST_CHANNEL_SHIFT) & REQUEST_CHANNEL_MASK;

    request_bits | channel_bits
}

/// Pack status flags into the status flags byte
pub fn pack_status_flags(good_signal: bool) -> u8 {
    if good_signal {
        STATUS_GOOD_SIGNAL_BIT
    } else {
        0
    }
}

fn encode_control_payload(control: &ControlFrame, buf: &mut impl BufMut) {
    buf.put_u8(pack_request_flags(control.request, control.calibration_channel));
    for &value in &control.channels {
        buf.put_u16_le(value);
    }
    buf.put_slice(&control.aux);
}

fn encode_status_payload(status: &StatusFrame, buf: &mut impl BufMut) {
    buf.put_u8(pack_status_flags(status.good_signal));
    buf.put_u8(status.signal_rating);
    buf.put_f32_le(status.battery);
}

fn encode_calibration_payload(calibration: &CalibrationFrame, buf: &mut impl BufMut) {
    buf.put_u8(calibration.channel);
    for &param in &calibration.params {
        buf.put_u16_le(param);
    }
}
