//! Framed message transport with end-to-end acknowledgements.
//!
//! This module turns an unreliable byte stream into synchronous
//! "send and wait for ack" messaging. It has three layers:
//!
//! - [`Message`] and the frame codec: a delimited, byte-stuffed, XOR-
//!   checksummed binary format carrying an ack flag, a 16-bit serial
//!   number, and a JSON payload.
//! - [`StreamParser`]: an incremental scanner that extracts validated
//!   frames from raw bytes, resynchronizing itself after noise, partial
//!   reads, and corruption.
//! - [`MessageTransport`]: a background reader plus a pending-ack table
//!   that correlates each outbound request with the reply carrying its
//!   serial number, built on the blocking primitives in
//!   [`sync`](crate::sync).
//!
//! # Wire format
//!
//! ```text
//! 0x7E | escape( Head(3) ++ Body(N) ++ CRC(1) ) | 0x7E
//! ```
//!
//! Head byte 0 bit 7 is the ack flag; bytes 1-2 are the big-endian serial
//! number. The CRC is the XOR of all header and body bytes, computed
//! before escaping. Reserved bytes inside the frame are escaped
//! (`0x7E -> 25 02`, `0x25 -> 25 01`) so a delimiter on the wire always
//! means a frame boundary.
//!
//! # Reliability semantics
//!
//! A request sent with a time bound blocks until a frame with the ack
//! flag and the same serial number arrives, or until the bound expires —
//! whichever happens first removes the correlation entry, exactly once.
//! Malformed or corrupted inbound frames never surface as errors; the
//! parser drops them and resynchronizes at the next delimiter.

mod frame;
mod parser;
mod stream;
mod transport;

pub use frame::{CodecError, DELIMITER, Message, Payload, SerialAllocator};
pub use parser::StreamParser;
pub use stream::{MemoryStream, Stream, StreamError, memory_pipe};
pub use transport::{MessageTransport, TransportError};
