//! In-band stream events.
//!
//! Events travel along links in order with caps and buffers. The framework
//! interprets `StartOfStream` and `EndOfStream` itself (flags, parent
//! notification, buffer gating); custom events are passed through to the
//! element's `handle_event` callback untouched.

use bytes::Bytes;

/// A typed control signal traveling with buffers.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// First item on a pad, emitted automatically before the first buffer.
    StartOfStream,
    /// Last item on a pad; no buffers may follow it.
    EndOfStream,
    /// A user-defined event.
    Custom {
        /// Event name.
        name: String,
        /// Opaque payload.
        payload: Bytes,
    },
}

impl Event {
    /// Create a custom event.
    pub fn custom(name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Event::Custom {
            name: name.into(),
            payload: payload.into(),
        }
    }

    /// Short tag for logging.
    pub fn tag(&self) -> &str {
        match self {
            Event::StartOfStream => "start_of_stream",
            Event::EndOfStream => "end_of_stream",
            Event::Custom { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_event() {
        let event = Event::custom("seek", &b"\x00\x01"[..]);
        assert_eq!(event.tag(), "seek");
        assert_ne!(event, Event::EndOfStream);
    }
}
