//! Reliable request/ack messaging over an unreliable byte stream.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use log::{debug, warn};
use thiserror::Error;

use crate::sync::{
    BlockingQueue, Scheduler, ThreadScheduler, TimeoutError, Wait, Waiter, WaiterHandle,
};

use super::{
    frame::{CodecError, Message},
    parser::StreamParser,
    stream::{Stream, StreamError},
};

/// Largest chunk pulled from the stream per read.
const READ_CHUNK: usize = 1024;
/// Per-read timeout; also bounds how long shutdown takes to land.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("timed out waiting for an ack")]
    Timeout(#[from] TimeoutError),
}

/// An outstanding request waiting for its ack.
struct PendingAck {
    response: Option<Message>,
    handle: WaiterHandle,
}

struct TransportShared {
    pending: Mutex<HashMap<u16, PendingAck>>,
    inbound: BlockingQueue<Message>,
}

/// Synchronous send/receive messaging over a [`Stream`].
///
/// A background reader thread feeds stream bytes through a
/// [`StreamParser`]; decoded acks are matched against the pending table by
/// serial number and handed to the blocked sender, everything else is
/// queued for [`recv`](Self::recv). The reader is a long-lived daemon: a
/// read timeout clears the parser buffer and continues, any other stream
/// error is logged and the loop continues. Only
/// [`shutdown`](Self::shutdown) ends it.
pub struct MessageTransport {
    stream: Arc<dyn Stream>,
    shared: Arc<TransportShared>,
    scheduler: Arc<dyn Scheduler>,
    running: Arc<AtomicBool>,
    reader: Mutex<Option<thread::JoinHandle<()>>>,
}

impl MessageTransport {
    /// Wrap a stream and start the background reader.
    pub fn new(stream: impl Stream + 'static) -> Self {
        Self::with_scheduler(stream, Arc::new(ThreadScheduler))
    }

    pub fn with_scheduler(stream: impl Stream + 'static, scheduler: Arc<dyn Scheduler>) -> Self {
        let stream: Arc<dyn Stream> = Arc::new(stream);
        let shared = Arc::new(TransportShared {
            pending: Mutex::new(HashMap::new()),
            inbound: BlockingQueue::new(),
        });
        let running = Arc::new(AtomicBool::new(true));

        let reader = {
            let stream = Arc::clone(&stream);
            let shared = Arc::clone(&shared);
            let running = Arc::clone(&running);
            thread::spawn(move || read_loop(&*stream, &shared, &running))
        };

        Self {
            stream,
            shared,
            scheduler,
            running,
            reader: Mutex::new(Some(reader)),
        }
    }

    /// Write a message; with a non-`NoWait` bound, block for its ack.
    ///
    /// The pending-ack entry is registered before the write so a fast ack
    /// cannot slip past, and it is removed exactly once — on ack receipt,
    /// on timeout, or on a failed write. `Wait::NoWait` is
    /// fire-and-forget: nothing is registered and nothing blocks.
    pub fn send(&self, message: &Message, wait: Wait) -> Result<Option<Message>, TransportError> {
        let raw = message.dump()?;

        if wait == Wait::NoWait {
            self.stream.write(&raw)?;
            return Ok(None);
        }

        let serial = message.serial_number;
        let waiter = Waiter::new(Arc::clone(&self.scheduler));
        self.shared.pending.lock().unwrap().insert(
            serial,
            PendingAck {
                response: None,
                handle: waiter.handle(),
            },
        );

        if let Err(e) = self.stream.write(&raw) {
            self.shared.pending.lock().unwrap().remove(&serial);
            return Err(e.into());
        }

        match waiter.wait(wait) {
            Ok(()) => {
                let entry = self.shared.pending.lock().unwrap().remove(&serial);
                let response = entry.and_then(|e| e.response).ok_or(TimeoutError)?;
                Ok(Some(response))
            }
            Err(TimeoutError) => {
                self.shared.pending.lock().unwrap().remove(&serial);
                Err(TimeoutError.into())
            }
        }
    }

    /// Take the oldest inbound non-ack message, blocking up to `wait`.
    pub fn recv(&self, wait: Wait) -> Result<Message, TimeoutError> {
        self.shared.inbound.pop(wait)
    }

    /// Number of requests currently awaiting an ack.
    pub fn pending_acks(&self) -> usize {
        self.shared.pending.lock().unwrap().len()
    }

    /// Stop the background reader. Nothing in flight is drained; the
    /// reader notices the flag within one read timeout and exits.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(reader) = self.reader.lock().unwrap().take() {
            let _ = reader.join();
        }
    }
}

impl Drop for MessageTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn read_loop(stream: &dyn Stream, shared: &TransportShared, running: &AtomicBool) {
    let mut parser = StreamParser::new();
    while running.load(Ordering::SeqCst) {
        match stream.read(READ_CHUNK, READ_TIMEOUT) {
            Ok(data) => {
                parser.feed(&data);
                for message in parser.take_messages() {
                    dispatch(shared, message);
                }
            }
            Err(StreamError::TimedOut) => {
                // Frames are contiguous on the wire; an idle gap means any
                // partial frame is dead.
                parser.clear();
            }
            Err(e) => {
                warn!("transport read failed: {e}");
                thread::sleep(READ_TIMEOUT);
            }
        }
    }
    debug!("transport reader stopped");
}

fn dispatch(shared: &TransportShared, message: Message) {
    if !message.ack {
        shared.inbound.push(message);
        return;
    }

    let mut pending = shared.pending.lock().unwrap();
    match pending.get_mut(&message.serial_number) {
        Some(entry) => {
            entry.response = Some(message);
            entry.handle.release();
        }
        None => debug!(
            "discarding unsolicited ack, serial {}",
            message.serial_number
        ),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::message::frame::Payload;
    use crate::message::stream::memory_pipe;

    use super::*;

    fn payload(key: &str, value: i64) -> Payload {
        let mut map = Payload::new();
        map.insert(key.into(), json!(value));
        map
    }

    fn pair() -> (MessageTransport, MessageTransport) {
        let (a, b) = memory_pipe();
        (MessageTransport::new(a), MessageTransport::new(b))
    }

    #[test]
    fn send_blocks_until_the_ack_arrives() {
        let (local, remote) = pair();

        let responder = thread::spawn(move || {
            let request = remote.recv(Wait::For(Duration::from_secs(5))).unwrap();
            let ack = Message::ack(request.serial_number, payload("echo", 1));
            remote.send(&ack, Wait::NoWait).unwrap();
            request.serial_number
        });

        let request = Message::request(payload("cmd", 42));
        let response = local
            .send(&request, Wait::For(Duration::from_secs(5)))
            .unwrap()
            .expect("a bounded send returns the matched ack");

        assert!(response.ack);
        assert_eq!(response.serial_number, responder.join().unwrap());
        assert_eq!(response.payload, payload("echo", 1));
        assert_eq!(local.pending_acks(), 0);
    }

    #[test]
    fn send_times_out_and_leaves_no_pending_entry() {
        let (local, _remote) = pair();

        let request = Message::request(payload("cmd", 1));
        let before = local.pending_acks();
        let outcome = local.send(&request, Wait::millis(100));

        assert!(matches!(outcome, Err(TransportError::Timeout(_))));
        assert_eq!(local.pending_acks(), before);
    }

    #[test]
    fn fire_and_forget_registers_nothing() {
        let (local, remote) = pair();

        let request = Message::request(payload("notice", 7));
        assert!(matches!(local.send(&request, Wait::NoWait), Ok(None)));
        assert_eq!(local.pending_acks(), 0);

        let received = remote.recv(Wait::For(Duration::from_secs(5))).unwrap();
        assert_eq!(received, request);
    }

    #[test]
    fn recv_delivers_non_acks_in_fifo_order() {
        let (local, remote) = pair();

        for i in 0..3i64 {
            local
                .send(&Message::request(payload("n", i)), Wait::NoWait)
                .unwrap();
        }

        for i in 0..3i64 {
            let msg = remote.recv(Wait::For(Duration::from_secs(5))).unwrap();
            assert_eq!(msg.payload, payload("n", i));
        }
    }

    #[test]
    fn unsolicited_ack_is_discarded() {
        let (local, remote) = pair();

        // No request with this serial is outstanding.
        let stray = Message::ack(0x0BAD, Payload::new());
        remote.send(&stray, Wait::NoWait).unwrap();

        local
            .send(&Message::request(payload("after", 1)), Wait::NoWait)
            .unwrap();
        let seen = remote.recv(Wait::For(Duration::from_secs(5))).unwrap();
        assert_eq!(seen.payload, payload("after", 1));
        assert_eq!(local.pending_acks(), 0);
        assert!(local.recv(Wait::NoWait).is_err());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (local, _remote) = pair();
        local.shutdown();
        local.shutdown();
    }
}
