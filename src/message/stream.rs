//! Abstract byte stream consumed by the transport.

use std::{
    collections::VecDeque,
    io,
    sync::{Mutex, mpsc},
    time::Duration,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    /// No bytes arrived within the read timeout.
    #[error("stream read timed out")]
    TimedOut,
    /// The far side hung up.
    #[error("stream closed")]
    Closed,
    #[error("stream I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A readable/writable byte stream, e.g. a UART driver or a socket.
///
/// Methods take `&self`: implementations are expected to carry their own
/// interior locking, since the transport writes from caller threads while
/// its reader thread blocks in `read`.
pub trait Stream: Send + Sync {
    fn write(&self, data: &[u8]) -> Result<(), StreamError>;

    /// Read up to `max` bytes, blocking at most `timeout`. Returns
    /// [`StreamError::TimedOut`] if nothing arrived in time.
    fn read(&self, max: usize, timeout: Duration) -> Result<Vec<u8>, StreamError>;
}

/// One end of an in-memory duplex byte stream.
///
/// Useful as a loopback link in tests and demos: whatever one end writes,
/// the other end reads.
pub struct MemoryStream {
    tx: mpsc::Sender<Vec<u8>>,
    rx: Mutex<mpsc::Receiver<Vec<u8>>>,
    // Bytes received but not yet handed out by a bounded read.
    leftover: Mutex<VecDeque<u8>>,
}

/// Create a cross-wired pair of in-memory streams.
pub fn memory_pipe() -> (MemoryStream, MemoryStream) {
    let (a_tx, b_rx) = mpsc::channel();
    let (b_tx, a_rx) = mpsc::channel();
    (
        MemoryStream::new(a_tx, a_rx),
        MemoryStream::new(b_tx, b_rx),
    )
}

impl MemoryStream {
    fn new(tx: mpsc::Sender<Vec<u8>>, rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            tx,
            rx: Mutex::new(rx),
            leftover: Mutex::new(VecDeque::new()),
        }
    }
}

impl Stream for MemoryStream {
    fn write(&self, data: &[u8]) -> Result<(), StreamError> {
        self.tx.send(data.to_vec()).map_err(|_| StreamError::Closed)
    }

    fn read(&self, max: usize, timeout: Duration) -> Result<Vec<u8>, StreamError> {
        let mut leftover = self.leftover.lock().unwrap();
        if leftover.is_empty() {
            let chunk = match self.rx.lock().unwrap().recv_timeout(timeout) {
                Ok(chunk) => chunk,
                Err(mpsc::RecvTimeoutError::Timeout) => return Err(StreamError::TimedOut),
                Err(mpsc::RecvTimeoutError::Disconnected) => return Err(StreamError::Closed),
            };
            leftover.extend(chunk);
        }
        let take = max.min(leftover.len());
        Ok(leftover.drain(..take).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn written_bytes_come_out_the_other_end() {
        let (a, b) = memory_pipe();
        a.write(b"hello").unwrap();
        let got = b.read(1024, Duration::from_secs(1)).unwrap();
        assert_eq!(got, b"hello");
    }

    #[test]
    fn bounded_read_leaves_the_rest_for_later() {
        let (a, b) = memory_pipe();
        a.write(b"abcdef").unwrap();
        assert_eq!(b.read(4, Duration::from_secs(1)).unwrap(), b"abcd");
        assert_eq!(b.read(4, Duration::from_secs(1)).unwrap(), b"ef");
    }

    #[test]
    fn read_times_out_on_silence() {
        let (_a, b) = memory_pipe();
        assert!(matches!(
            b.read(1024, Duration::from_millis(20)),
            Err(StreamError::TimedOut)
        ));
    }

    #[test]
    fn read_reports_closed_when_peer_is_gone() {
        let (a, b) = memory_pipe();
        drop(a);
        assert!(matches!(
            b.read(1024, Duration::from_millis(20)),
            Err(StreamError::Closed)
        ));
    }

    #[test]
    fn both_directions_are_independent() {
        let (a, b) = memory_pipe();
        a.write(b"ping").unwrap();
        b.write(b"pong").unwrap();
        assert_eq!(b.read(16, Duration::from_secs(1)).unwrap(), b"ping");
        assert_eq!(a.read(16, Duration::from_secs(1)).unwrap(), b"pong");
    }
}
