//! # Frame Decoder
//!
//! Parses 16-byte wire frames into [`Frame`] values.

use bytes::Buf;

use super::protocol::*;

/// Decode a 16-byte wire frame
///
/// Never fails: an unrecognised type byte yields [`Frame::Unknown`] and the
/// payload is left uninterpreted. Callers decide what to ignore.
///
/// # Examples
///
/// ```
/// use rc_link::packet::decoder::decode_frame;
/// use rc_link::packet::protocol::Frame;
///
/// let mut raw = [0u8; 16];
/// raw[0] = 255;
/// assert_eq!(decode_frame(&raw), Frame::Unknown(255));
/// ```
pub fn decode_frame(raw: &RawFrame) -> Frame {
    let mut buf = &raw[..];
    let frame_type = buf.get_u8();

    match frame_type {
        FRAMETYPE_CONTROL => Frame::Control(decode_control_payload(&mut buf)),
        FRAMETYPE_STATUS => Frame::Status(decode_status_payload(&mut buf)),
        FRAMETYPE_CALIBRATION_GET => Frame::CalibrationGet(decode_calibration_payload(&mut buf)),
        FRAMETYPE_CALIBRATION_SET => Frame::CalibrationSet(decode_calibration_payload(&mut buf)),
        other => Frame::Unknown(other),
    }
}

/// Unpack the request flags byte into a request and its channel selector
///
/// When several request bits are set the first one in the order status,
/// calibration read, calibration write wins.
pub fn unpack_request_flags(flags: u8) -> (Request, u8) {
    let request = if flags & REQUEST_STATUS_BIT != 0 {
        Request::Status
    } else if flags & REQUEST_CALIBRATION_GET_BIT != 0 {
        Request::CalibrationGet
    } else if flags & REQUEST_CALIBRATION_SET_BIT != 0 {
        Request::CalibrationSet
    } else {
        Request::None
    };
    let channel = (flags & REQUEST_CHANNEL_MASK) >> REQUEST_CHANNEL_SHIFT;

    (request, channel)
}

/// Unpack the status flags byte
pub fn unpack_status_flags(flags: u8) -> bool {
    flags & STATUS_GOOD_SIGNAL_BIT != 0
}

fn decode_control_payload(buf: &mut impl Buf) -> ControlFrame {
    let (request, calibration_channel) = unpack_request_flags(buf.get_u8());

    let mut channels = [0u16; NUM_PRIMARY_CHANNELS];
    for value in channels.iter_mut() {
        *value = buf.get_u16_le();
    }

    let mut aux = [0u8; NUM_AUX_CHANNELS];
    buf.copy_to_slice(&mut aux);

    ControlFrame {
        request,
        calibration_channel,
        channels,
        aux,
    }
}

fn decode_status_payload(buf: &mut impl Buf) -> StatusFrame {
    let good_signal = unpack_status_flags(buf.get_u8());
    let signal_rating = buf.get_u8();
    let battery = buf.get_f32_le();

    StatusFrame {
        good_signal,
        signal_rating,
        battery,
    }
}

fn decode_calibration_payload(buf: &mut impl Buf) -> CalibrationFrame {
    let channel = buf.get_u8();

    let mut params = [0u16; NUM_CALIBRATION_PARAMS];
    for param in params.iter_mut() {
        *param = buf.get_u16_le();
    }

    CalibrationFrame { channel, params }
}
