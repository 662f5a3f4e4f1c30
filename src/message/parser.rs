//! Incremental, self-resynchronizing frame extraction.

use std::collections::VecDeque;

use log::warn;

use super::frame::{DELIMITER, Message};

/// Turns an arbitrary byte stream into validated [`Message`]s.
///
/// The parser keeps one growing buffer and scans it for delimiter pairs:
/// noise before a frame, frames split across reads, back-to-back
/// delimiters, and undecodable frames are all consumed without error.
/// Decode failures are logged and dropped — corruption desynchronizes at
/// most one frame, and a delimiter-less stream never grows the buffer.
#[derive(Debug, Default)]
pub struct StreamParser {
    buffer: Vec<u8>,
    messages: VecDeque<Message>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly-arrived bytes and extract every complete frame.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        loop {
            let Some(header) = self.buffer.iter().position(|&b| b == DELIMITER) else {
                // No frame can start in here; bound the buffer.
                self.buffer.clear();
                return;
            };

            let Some(tail) = self.buffer[header + 1..]
                .iter()
                .position(|&b| b == DELIMITER)
                .map(|i| header + 1 + i)
            else {
                // Partial frame: keep from the opening delimiter onward.
                self.buffer.drain(..header);
                return;
            };

            if tail == header + 1 {
                // Back-to-back delimiters are inter-frame noise; the tail
                // may open the next frame.
                self.buffer.drain(..tail);
                continue;
            }

            match Message::load(&self.buffer[header..=tail]) {
                Ok(msg) => self.messages.push_back(msg),
                Err(e) => warn!("dropping undecodable frame: {e}"),
            }
            self.buffer.drain(..=tail);
        }
    }

    /// Take every message parsed so far, oldest first.
    pub fn take_messages(&mut self) -> Vec<Message> {
        self.messages.drain(..).collect()
    }

    /// Discard any partial frame held in the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::message::frame::Payload;

    use super::*;

    fn message(serial: u16) -> Message {
        let mut payload = Payload::new();
        payload.insert("serial".into(), json!(serial));
        Message {
            ack: false,
            serial_number: serial,
            payload,
        }
    }

    #[test]
    fn frame_surrounded_by_garbage_parses_once() {
        let msg = message(1);
        let mut bytes = b"garbage".to_vec();
        bytes.extend_from_slice(&msg.dump().unwrap());
        bytes.extend_from_slice(b"more garbage");

        let mut parser = StreamParser::new();
        parser.feed(&bytes);

        assert_eq!(parser.take_messages(), vec![msg]);
        // Trailing garbage has no delimiter, so nothing is retained.
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn frame_split_across_reads_is_reassembled() {
        let msg = message(2);
        let raw = msg.dump().unwrap();
        let (first, second) = raw.split_at(raw.len() / 2);

        let mut parser = StreamParser::new();
        parser.feed(first);
        assert!(parser.take_messages().is_empty());
        parser.feed(second);
        assert_eq!(parser.take_messages(), vec![msg]);
    }

    #[test]
    fn back_to_back_delimiters_yield_nothing() {
        let mut parser = StreamParser::new();
        parser.feed(&[DELIMITER, DELIMITER]);
        assert!(parser.take_messages().is_empty());
    }

    #[test]
    fn multiple_frames_in_one_read_all_parse() {
        let (a, b) = (message(3), message(4));
        let mut bytes = a.dump().unwrap();
        bytes.extend_from_slice(&b.dump().unwrap());

        let mut parser = StreamParser::new();
        parser.feed(&bytes);
        assert_eq!(parser.take_messages(), vec![a, b]);
    }

    #[test]
    fn corrupted_frame_is_dropped_and_parsing_continues() {
        let good = message(5);
        let mut corrupted = message(6).dump().unwrap();
        let mid = corrupted.len() / 2;
        corrupted[mid] ^= 0x04;

        let mut bytes = corrupted;
        bytes.extend_from_slice(&good.dump().unwrap());

        let mut parser = StreamParser::new();
        parser.feed(&bytes);
        assert_eq!(parser.take_messages(), vec![good]);
    }

    #[test]
    fn delimiterless_stream_does_not_grow_the_buffer() {
        let mut parser = StreamParser::new();
        for _ in 0..100 {
            parser.feed(&[0x41; 512]);
            assert_eq!(parser.buffered(), 0);
        }
    }

    #[test]
    fn clear_discards_a_partial_frame() {
        let raw = message(7).dump().unwrap();
        let mut parser = StreamParser::new();
        parser.feed(&raw[..raw.len() - 1]);
        assert!(parser.buffered() > 0);
        parser.clear();
        assert_eq!(parser.buffered(), 0);
    }
}
