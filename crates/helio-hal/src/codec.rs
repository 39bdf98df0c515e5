//! DDC/CI packet codec
//!
//! Encodes VCP get/set requests and decodes VCP feature replies as they
//! travel over the I2C bus at address 0x37.

use serde::Serialize;
use thiserror::Error;

/// I2C slave address of the DDC/CI endpoint
pub const DDC_I2C_ADDRESS: u16 = 0x37;

/// I2C slave address of the EDID EEPROM
pub const EDID_I2C_ADDRESS: u16 = 0x50;

/// Source address used for ordinary host to display requests
pub const HOST_SOURCE: u8 = 0x51;

/// Source address LG panels expect for their extended input control
pub const LG_SOURCE: u8 = 0x50;

/// Destination address byte folded into request checksums
const HOST_DESTINATION: u8 = 0x6E;

/// Virtual host address folded into reply checksums
const REPLY_CHECKSUM_SEED: u8 = 0x50;

const OP_GET_VCP: u8 = 0x01;
const OP_SET_VCP: u8 = 0x03;
const OP_GET_VCP_REPLY: u8 = 0x02;

/// Length of a VCP feature reply including the checksum
pub const REPLY_LEN: usize = 11;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Reply too short: {0} bytes")]
    TooShort(usize),

    #[error("Reply checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },

    #[error("Unexpected reply opcode {0:#04x}")]
    UnexpectedOpcode(u8),

    #[error("Display reported control {0:#04x} as unsupported")]
    Unsupported(u8),

    #[error("Reply for control {actual:#04x}, requested {requested:#04x}")]
    ControlMismatch { requested: u8, actual: u8 },

    #[error("Display returned a null message")]
    NullMessage,
}

/// Decoded VCP feature reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VcpReply {
    pub code: u8,
    pub kind: u8,
    pub max: u16,
    pub current: u16,
}

fn xor(seed: u8, bytes: &[u8]) -> u8 {
    bytes.iter().fold(seed, |acc, b| acc ^ b)
}

/// Build a Set VCP Feature packet
pub fn encode_write(source: u8, code: u8, value: u16) -> [u8; 7] {
    let [hi, lo] = value.to_be_bytes();
    let mut packet = [source, 0x84, OP_SET_VCP, code, hi, lo, 0];
    packet[6] = xor(HOST_DESTINATION, &packet[..6]);
    packet
}

/// Build a Get VCP Feature request packet
pub fn encode_read(source: u8, code: u8) -> [u8; 5] {
    let mut packet = [source, 0x82, OP_GET_VCP, code, 0];
    packet[4] = xor(HOST_DESTINATION, &packet[..4]);
    packet
}

/// Decode a Get VCP Feature reply for `requested`
pub fn decode_reply(requested: u8, reply: &[u8]) -> Result<VcpReply, CodecError> {
    // A display that has nothing to say answers with 0x6E 0x80 0xBE
    if reply.len() >= 2 && reply[1] == 0x80 {
        return Err(CodecError::NullMessage);
    }
    if reply.len() < REPLY_LEN {
        return Err(CodecError::TooShort(reply.len()));
    }

    let expected = xor(REPLY_CHECKSUM_SEED, &reply[..REPLY_LEN - 1]);
    let actual = reply[REPLY_LEN - 1];
    if expected != actual {
        return Err(CodecError::Checksum { expected, actual });
    }

    if reply[2] != OP_GET_VCP_REPLY {
        return Err(CodecError::UnexpectedOpcode(reply[2]));
    }
    if reply[3] != 0 {
        return Err(CodecError::Unsupported(requested));
    }
    if reply[4] != requested {
        return Err(CodecError::ControlMismatch {
            requested,
            actual: reply[4],
        });
    }

    Ok(VcpReply {
        code: reply[4],
        kind: reply[5],
        max: u16::from_be_bytes([reply[6], reply[7]]),
        current: u16::from_be_bytes([reply[8], reply[9]]),
    })
}

/// Build a reply frame, as a display would send it
pub fn encode_reply(code: u8, max: u16, current: u16) -> [u8; REPLY_LEN] {
    let [max_hi, max_lo] = max.to_be_bytes();
    let [cur_hi, cur_lo] = current.to_be_bytes();
    let mut frame = [
        0x6E,
        0x88,
        OP_GET_VCP_REPLY,
        0x00,
        code,
        0x00,
        max_hi,
        max_lo,
        cur_hi,
        cur_lo,
        0,
    ];
    frame[REPLY_LEN - 1] = xor(REPLY_CHECKSUM_SEED, &frame[..REPLY_LEN - 1]);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_write_brightness() {
        let packet = encode_write(0x51, 0x10, 50);
        assert_eq!(&packet[..6], &[0x51, 0x84, 0x03, 0x10, 0x00, 0x32]);
        assert_eq!(packet[6], 0x6E ^ 0x51 ^ 0x84 ^ 0x03 ^ 0x10 ^ 0x00 ^ 0x32);
    }

    #[test]
    fn test_encode_read() {
        let packet = encode_read(0x51, 0x12);
        assert_eq!(packet, [0x51, 0x82, 0x01, 0x12, 0x6E ^ 0x51 ^ 0x82 ^ 0x01 ^ 0x12]);
    }

    #[test]
    fn test_decode_reply() {
        let frame = encode_reply(0x10, 100, 42);
        let reply = decode_reply(0x10, &frame).unwrap();
        assert_eq!(reply.max, 100);
        assert_eq!(reply.current, 42);
    }

    #[test]
    fn test_decode_bad_checksum() {
        let mut frame = encode_reply(0x10, 100, 42);
        frame[9] ^= 0x01;
        assert!(matches!(
            decode_reply(0x10, &frame),
            Err(CodecError::Checksum { .. })
        ));
    }

    #[test]
    fn test_decode_unsupported_control() {
        let mut frame = encode_reply(0x10, 100, 42);
        frame[3] = 0x01;
        frame[10] = xor(REPLY_CHECKSUM_SEED, &frame[..10]);
        assert_eq!(decode_reply(0x10, &frame), Err(CodecError::Unsupported(0x10)));
    }

    #[test]
    fn test_decode_wrong_control() {
        let frame = encode_reply(0x12, 100, 42);
        assert_eq!(
            decode_reply(0x10, &frame),
            Err(CodecError::ControlMismatch {
                requested: 0x10,
                actual: 0x12
            })
        );
    }

    #[test]
    fn test_decode_null_message_and_short() {
        assert_eq!(decode_reply(0x10, &[0x6E, 0x80, 0xBE]), Err(CodecError::NullMessage));
        assert_eq!(decode_reply(0x10, &[0x6E, 0x88, 0x02]), Err(CodecError::TooShort(3)));
    }
}
