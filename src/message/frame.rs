//! Frame codec: delimited, byte-stuffed, checksummed messages.
//!
//! Wire format, bit-exact:
//!
//! ```text
//! 0x7E | escape( Head(3) ++ Body(N) ++ CRC(1) ) | 0x7E
//! ```
//!
//! - Head byte 0, bit 7: ack flag (remaining bits reserved, zero).
//! - Head bytes 1-2: big-endian 16-bit serial number.
//! - Body: the payload as canonical JSON.
//! - CRC: XOR of every byte of Head ++ Body.
//!
//! Escaping keeps payload bytes from being mistaken for frame boundaries:
//! `0x7E -> 0x25 0x02`, `0x25 -> 0x25 0x01`, everything else passes
//! through. The checksum is computed before escaping and verified after
//! unescaping; escape and unescape are exact inverses.

use std::sync::Mutex;

use serde_json::{Map, Value};
use thiserror::Error;

/// Unescaped frame boundary byte.
pub const DELIMITER: u8 = 0x7E;
/// Escape marker inside a frame.
const ESCAPE: u8 = 0x25;
/// Escaped form of the escape marker itself.
const ESCAPED_ESCAPE: u8 = 0x01;
/// Escaped form of the delimiter.
const ESCAPED_DELIMITER: u8 = 0x02;

const HEAD_LENGTH: usize = 3;
const ACK_FLAG: u8 = 0x80;
/// Delimiters (2) + head (3, unescaped) + minimal body (2) + crc (1).
const MIN_FRAME_LENGTH: usize = 8;

pub type Payload = Map<String, Value>;

#[derive(Debug, Error)]
pub enum CodecError {
    /// Format error: the frame is shorter than any valid encoding.
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    /// Format error: the frame does not start and end with the delimiter.
    #[error("missing frame delimiter")]
    Delimiter,
    /// Format error: an escape marker not followed by 0x01 or 0x02.
    #[error("bad escape sequence at byte {0}")]
    Escape(usize),
    /// Format error: the body is not a JSON object.
    #[error("unreadable frame body: {0}")]
    Body(String),
    /// Validation error: the frame arrived corrupted.
    #[error("checksum mismatch: computed {computed:#04x}, frame carries {carried:#04x}")]
    Checksum { computed: u8, carried: u8 },
}

/// Global wrap-around allocator for outbound serial numbers.
///
/// One monotonic counter over `0..=65535`; uniqueness holds only among
/// concurrently outstanding requests, which is all ack correlation needs.
#[derive(Debug)]
pub struct SerialAllocator {
    next: Mutex<u16>,
}

static SERIALS: SerialAllocator = SerialAllocator::new();

impl SerialAllocator {
    pub const fn new() -> Self {
        Self {
            next: Mutex::new(0),
        }
    }

    pub fn next(&self) -> u16 {
        let mut next = self.next.lock().unwrap();
        let serial = *next;
        *next = next.wrapping_add(1);
        serial
    }
}

impl Default for SerialAllocator {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn next_serial() -> u16 {
    SERIALS.next()
}

/// Three-byte frame header: ack flag plus serial number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Head {
    ack: bool,
    serial_number: u16,
}

impl Head {
    fn dump(&self) -> [u8; HEAD_LENGTH] {
        let flag = if self.ack { ACK_FLAG } else { 0x00 };
        let serial = self.serial_number.to_be_bytes();
        [flag, serial[0], serial[1]]
    }

    fn load(raw: &[u8; HEAD_LENGTH]) -> Self {
        Self {
            ack: raw[0] & ACK_FLAG != 0,
            serial_number: u16::from_be_bytes([raw[1], raw[2]]),
        }
    }
}

/// One complete unit of the wire protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub ack: bool,
    pub serial_number: u16,
    pub payload: Payload,
}

impl Message {
    /// An outbound request, stamped with a fresh serial number.
    pub fn request(payload: Payload) -> Self {
        Self {
            ack: false,
            serial_number: next_serial(),
            payload,
        }
    }

    /// An ack answering the request with the given serial number. Acks
    /// never allocate: the serial must be the one being answered.
    pub fn ack(serial_number: u16, payload: Payload) -> Self {
        Self {
            ack: true,
            serial_number,
            payload,
        }
    }

    /// Encode into the delimited wire form.
    pub fn dump(&self) -> Result<Vec<u8>, CodecError> {
        let head = Head {
            ack: self.ack,
            serial_number: self.serial_number,
        };
        let body = serde_json::to_vec(&Value::Object(self.payload.clone()))
            .map_err(|e| CodecError::Body(e.to_string()))?;

        let mut data = Vec::with_capacity(HEAD_LENGTH + body.len() + 1);
        data.extend_from_slice(&head.dump());
        data.extend_from_slice(&body);
        data.push(checksum(&data));

        let mut raw = Vec::with_capacity(data.len() + 2);
        raw.push(DELIMITER);
        raw.extend_from_slice(&escape(&data));
        raw.push(DELIMITER);
        Ok(raw)
    }

    /// Decode one complete delimited frame.
    pub fn load(raw: &[u8]) -> Result<Self, CodecError> {
        if raw.len() < MIN_FRAME_LENGTH {
            return Err(CodecError::TooShort(raw.len()));
        }
        if raw[0] != DELIMITER || raw[raw.len() - 1] != DELIMITER {
            return Err(CodecError::Delimiter);
        }

        let data = unescape(&raw[1..raw.len() - 1])?;
        let (content, carried) = match data.split_last() {
            Some((last, rest)) if rest.len() > HEAD_LENGTH => (rest, *last),
            _ => return Err(CodecError::TooShort(raw.len())),
        };
        let computed = checksum(content);
        if computed != carried {
            return Err(CodecError::Checksum { computed, carried });
        }

        let mut head_raw = [0u8; HEAD_LENGTH];
        head_raw.copy_from_slice(&content[..HEAD_LENGTH]);
        let head = Head::load(&head_raw);

        let body: Value = serde_json::from_slice(&content[HEAD_LENGTH..])
            .map_err(|e| CodecError::Body(e.to_string()))?;
        let payload = match body {
            Value::Object(map) => map,
            other => return Err(CodecError::Body(format!("expected an object, got {other}"))),
        };

        Ok(Self {
            ack: head.ack,
            serial_number: head.serial_number,
            payload,
        })
    }
}

/// Running XOR of all bytes.
fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |crc, byte| crc ^ byte)
}

/// Replace reserved bytes with two-byte escape sequences.
pub(crate) fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &byte in data {
        match byte {
            DELIMITER => out.extend_from_slice(&[ESCAPE, ESCAPED_DELIMITER]),
            ESCAPE => out.extend_from_slice(&[ESCAPE, ESCAPED_ESCAPE]),
            other => out.push(other),
        }
    }
    out
}

/// Exact inverse of [`escape`].
pub(crate) fn unescape(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(data.len());
    let mut index = 0;
    while index < data.len() {
        if data[index] == ESCAPE {
            match data.get(index + 1) {
                Some(&ESCAPED_ESCAPE) => out.push(ESCAPE),
                Some(&ESCAPED_DELIMITER) => out.push(DELIMITER),
                _ => return Err(CodecError::Escape(index)),
            }
            index += 2;
        } else {
            out.push(data[index]);
            index += 1;
        }
    }
    Ok(out)
}
