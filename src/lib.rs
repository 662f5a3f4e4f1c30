pub mod message;
pub mod sync;

pub use message::{CodecError, Message, MessageTransport, StreamParser, TransportError};
pub use sync::{BoundedThreadPool, Condition, Event, Future, PubSub, TimeoutError, Wait, Waiter};
