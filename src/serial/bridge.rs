//! # Radio Bridge Framing
//!
//! Byte framing between the host and the USB radio bridge.
//!
//! ## Frame Structure
//!
//! ```text
//! [SYNC] [LEN] [CMD] [PAYLOAD...] [CRC]
//!   1      1     1      LEN bytes    1
//! ```
//!
//! - **SYNC**: always `0xA5`
//! - **LEN**: payload length (0-32)
//! - **CRC**: CRC-8/DVB-S2 over LEN, CMD and PAYLOAD
//!
//! ## Commands
//!
//! | Command | Direction | Payload |
//! |---------|-----------|---------|
//! | `0x01` transmit | host → bridge | 16-byte radio frame |
//! | `0x02` listen | host → bridge | 1 byte, non-zero = receive mode |
//! | `0x81` received | bridge → host | 16-byte radio frame + carrier flag |

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use super::crc::crc8;
use crate::error::{RcLinkError, Result};
use crate::packet::protocol::{RawFrame, FRAME_SIZE};

pub const BRIDGE_SYNC_BYTE: u8 = 0xA5;

pub const CMD_TRANSMIT: u8 = 0x01;
pub const CMD_LISTEN: u8 = 0x02;
pub const CMD_RECEIVED: u8 = 0x81;

/// Largest payload the bridge accepts
pub const MAX_PAYLOAD_LEN: usize = 32;

/// Sync + length + command + CRC
const OVERHEAD: usize = 4;

const RECEIVED_PAYLOAD_LEN: usize = FRAME_SIZE + 1;

/// A message decoded from the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeMessage {
    /// A radio frame arrived over the air
    Received { frame: RawFrame, carrier: bool },
    /// A valid frame with a command the host does not handle
    Other { command: u8 },
}

/// Build a bridge frame
///
/// # Errors
///
/// Returns a protocol error if `payload` exceeds [`MAX_PAYLOAD_LEN`].
pub fn encode_command(command: u8, payload: &[u8]) -> Result<Bytes> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(RcLinkError::Protocol(format!(
            "Bridge payload too long: {} bytes",
            payload.len()
        )));
    }

    let mut buf = BytesMut::with_capacity(payload.len() + OVERHEAD);
    buf.put_u8(BRIDGE_SYNC_BYTE);
    buf.put_u8(payload.len() as u8);
    buf.put_u8(command);
    buf.put_slice(payload);
    let crc = crc8(&buf[1..]);
    buf.put_u8(crc);

    Ok(buf.freeze())
}

/// Frame asking the bridge to transmit `frame`
pub fn encode_transmit(frame: &RawFrame) -> Result<Bytes> {
    encode_command(CMD_TRANSMIT, frame)
}

/// Frame switching the bridge between receive and transmit mode
pub fn encode_listen(listening: bool) -> Result<Bytes> {
    encode_command(CMD_LISTEN, &[u8::from(listening)])
}

/// Pull the next complete message out of `buf`
///
/// Bytes before a sync byte, frames with an impossible length and frames
/// failing the CRC are dropped. Incomplete frames stay buffered.
pub fn decode_next(buf: &mut BytesMut) -> Option<BridgeMessage> {
    loop {
        match buf.iter().position(|&b| b == BRIDGE_SYNC_BYTE) {
            Some(offset) => buf.advance(offset),
            None => {
                buf.clear();
                return None;
            }
        }

        if buf.len() < 2 {
            return None;
        }

        let len = usize::from(buf[1]);
        if len > MAX_PAYLOAD_LEN {
            debug!("Bridge frame length {} out of range, resyncing", len);
            buf.advance(1);
            continue;
        }

        let total = len + OVERHEAD;
        if buf.len() < total {
            return None;
        }

        let expected = crc8(&buf[1..total - 1]);
        if buf[total - 1] != expected {
            debug!(
                "Bridge frame CRC mismatch: expected 0x{:02X}, got 0x{:02X}",
                expected,
                buf[total - 1]
            );
            buf.advance(1);
            continue;
        }

        let frame = buf.split_to(total);
        return Some(interpret(frame[2], &frame[3..total - 1]));
    }
}

fn interpret(command: u8, payload: &[u8]) -> BridgeMessage {
    if command == CMD_RECEIVED && payload.len() == RECEIVED_PAYLOAD_LEN {
        let mut frame = [0u8; FRAME_SIZE];
        frame.copy_from_slice(&payload[..FRAME_SIZE]);
        BridgeMessage::Received {
            frame,
            carrier: payload[FRAME_SIZE] != 0,
        }
    } else {
        BridgeMessage::Other { command }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn received(frame: RawFrame, carrier: bool) -> Bytes {
        let mut payload = frame.to_vec();
        payload.push(u8::from(carrier));
        encode_command(CMD_RECEIVED, &payload).unwrap()
    }

    #[test]
    fn test_encode_transmit_layout() {
        let frame = [7u8; FRAME_SIZE];
        let bytes = encode_transmit(&frame).unwrap();

        assert_eq!(bytes.len(), FRAME_SIZE + OVERHEAD);
        assert_eq!(bytes[0], BRIDGE_SYNC_BYTE);
        assert_eq!(bytes[1], FRAME_SIZE as u8);
        assert_eq!(bytes[2], CMD_TRANSMIT);
        assert_eq!(&bytes[3..19], &frame);
        assert_eq!(bytes[19], crc8(&bytes[1..19]));
    }

    #[test]
    fn test_encode_listen() {
        let on = encode_listen(true).unwrap();
        let off = encode_listen(false).unwrap();
        assert_eq!(&on[..4], &[BRIDGE_SYNC_BYTE, 1, CMD_LISTEN, 1]);
        assert_eq!(off[3], 0);
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let result = encode_command(CMD_TRANSMIT, &[0; MAX_PAYLOAD_LEN + 1]);
        assert!(matches!(result, Err(RcLinkError::Protocol(_))));
    }

    #[test]
    fn test_decode_received() {
        let mut buf = BytesMut::from(&received([3; FRAME_SIZE], true)[..]);
        assert_eq!(
            decode_next(&mut buf),
            Some(BridgeMessage::Received {
                frame: [3; FRAME_SIZE],
                carrier: true
            })
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_skips_leading_garbage() {
        let mut buf = BytesMut::from(&[0x00, 0x13, 0x37][..]);
        buf.extend_from_slice(&received([1; FRAME_SIZE], false));

        assert!(matches!(
            decode_next(&mut buf),
            Some(BridgeMessage::Received { carrier: false, .. })
        ));
    }

    #[test]
    fn test_decode_waits_for_partial_frame() {
        let bytes = received([9; FRAME_SIZE], true);
        let mut buf = BytesMut::from(&bytes[..10]);

        assert_eq!(decode_next(&mut buf), None);
        assert_eq!(buf.len(), 10);

        buf.extend_from_slice(&bytes[10..]);
        assert!(decode_next(&mut buf).is_some());
    }

    #[test]
    fn test_decode_drops_bad_crc_and_recovers() {
        let mut corrupted = received([5; FRAME_SIZE], true).to_vec();
        corrupted[5] ^= 0x01;

        let mut buf = BytesMut::from(&corrupted[..]);
        buf.extend_from_slice(&received([6; FRAME_SIZE], true));

        assert_eq!(
            decode_next(&mut buf),
            Some(BridgeMessage::Received {
                frame: [6; FRAME_SIZE],
                carrier: true
            })
        );
        assert_eq!(decode_next(&mut buf), None);
    }

    #[test]
    fn test_decode_other_command() {
        let mut buf = BytesMut::from(&encode_command(0x90, &[1, 2]).unwrap()[..]);
        assert_eq!(decode_next(&mut buf), Some(BridgeMessage::Other { command: 0x90 }));
    }

    #[test]
    fn test_decode_clears_buffer_without_sync() {
        let mut buf = BytesMut::from(&[0x01, 0x02, 0x03][..]);
        assert_eq!(decode_next(&mut buf), None);
        assert!(buf.is_empty());
    }
}
