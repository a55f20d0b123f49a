//! Radio frame codec.
//!
//! Frames mirror the packed record the firmware exchanges: one event code
//! byte, three padding bytes, then the 32-bit time in little-endian order.
//! There is no version field, so both units must share one `Event` table.

use crate::types::{Event, Message};

/// Size of every frame on the link.
pub const FRAME_LEN: usize = 8;

const TIME_OFFSET: usize = 4;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum WireError {
    #[error("frame length {actual}, expected {expected}")]
    Length { expected: usize, actual: usize },

    #[error("unknown event code {0}")]
    UnknownEvent(u8),
}

pub fn encode(message: &Message) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = message.event.code();
    frame[TIME_OFFSET..].copy_from_slice(&message.time.to_le_bytes());
    frame
}

pub fn decode(frame: &[u8]) -> Result<Message, WireError> {
    if frame.len() != FRAME_LEN {
        return Err(WireError::Length {
            expected: FRAME_LEN,
            actual: frame.len(),
        });
    }
    let event = Event::from_code(frame[0]).ok_or(WireError::UnknownEvent(frame[0]))?;
    let mut time = [0u8; 4];
    time.copy_from_slice(&frame[TIME_OFFSET..]);
    Ok(Message::with_time(event, u32::from_le_bytes(time)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_firmware_record() {
        let frame = encode(&Message::with_time(Event::MessageFinish, 4000));
        assert_eq!(frame, [5, 0, 0, 0, 0xa0, 0x0f, 0, 0]);
    }

    #[test]
    fn test_decode_finish_time() {
        let msg = decode(&[5, 0, 0, 0, 0xa0, 0x0f, 0, 0]).unwrap();
        assert_eq!(msg, Message::with_time(Event::MessageFinish, 4000));
    }

    #[test]
    fn test_decode_ignores_padding_bytes() {
        let msg = decode(&[3, 0xaa, 0xbb, 0xcc, 0, 0, 0, 0]).unwrap();
        assert_eq!(msg, Message::new(Event::MessageInit));
    }

    #[test]
    fn test_decode_rejects_short_frame() {
        assert_eq!(
            decode(&[5, 0, 0]),
            Err(WireError::Length {
                expected: FRAME_LEN,
                actual: 3
            })
        );
    }

    #[test]
    fn test_decode_rejects_unknown_code() {
        assert_eq!(
            decode(&[42, 0, 0, 0, 0, 0, 0, 0]),
            Err(WireError::UnknownEvent(42))
        );
    }
}
