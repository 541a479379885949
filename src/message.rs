//! Messages exchanged between actors and the mailboxes carrying them.
//!
//! Every element, bin and pipeline is an actor with a private mailbox. All
//! actors share one flat, tagged [`Message`] type; each actor kind
//! pattern-matches the subset addressed to it and logs the rest into a
//! default bucket. Mailboxes are unbounded: backpressure is the demand
//! protocol's and the toilet's job, never the channel's.

use crate::buffer::Buffer;
use crate::element::input_buffer::InputBufferConfig;
use crate::element::{DemandUnit, PadDirection, PadMode, PadRef, PlaybackState, Toilet};
use crate::error::ExitReason;
use crate::event::Event;
use crate::format::Caps;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque user payload carried by notifications and child messages.
pub type UserPayload = Arc<dyn Any + Send + Sync>;

/// Global link id counter.
static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);
/// Global spec reference counter.
static NEXT_SPEC_REF: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of one pad link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct LinkId(u64);

impl LinkId {
    pub fn new() -> Self {
        Self(NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Identifier of one children spec handed to a parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct SpecRef(u64);

impl SpecRef {
    pub fn new() -> Self {
        Self(NEXT_SPEC_REF.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SpecRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "spec-{}", self.0)
    }
}

/// Sending half of an actor's mailbox.
///
/// Sends are synchronous and never block (the channel is unbounded), which
/// lets controller code running inside a callback dispatch emit messages
/// without suspending. A send to a dead actor is dropped silently; actor
/// death is reported through the monitor path, not through send failures.
#[derive(Clone)]
pub(crate) struct Mailbox {
    name: Arc<str>,
    tx: kanal::Sender<Message>,
}

impl Mailbox {
    /// Create a mailbox, returning the sending handle and the receiver the
    /// actor loop will drain.
    pub fn channel(name: &str) -> (Self, kanal::Receiver<Message>) {
        let (tx, rx) = kanal::unbounded();
        (
            Self {
                name: Arc::from(name),
                tx,
            },
            rx,
        )
    }

    /// Send a message, ignoring a closed mailbox.
    pub fn send(&self, message: Message) {
        if self.tx.send(message).is_err() {
            tracing::trace!(actor = %self.name, "dropping message: mailbox closed");
        }
    }

    /// Name of the actor this mailbox belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox").field("actor", &self.name).finish()
    }
}

/// Where a stream pad actually terminates: the mailbox and pad of the
/// element behind any number of bin proxy pads.
///
/// Bins never carry stream traffic themselves; links that cross a bin
/// boundary are resolved to endpoints like this one so both peers address
/// each other's element directly.
#[derive(Clone, Debug)]
pub(crate) struct StreamEndpoint {
    /// The terminal element's mailbox.
    pub mailbox: Mailbox,
    /// The terminal element's pad.
    pub pad: PadRef,
}

/// Everything the parent needs to tell one end of a link.
pub(crate) struct HandleLink {
    /// Link this handshake belongs to.
    pub link: LinkId,
    /// The receiving element's pad.
    pub pad: PadRef,
    /// Role of the receiving element in this link.
    pub direction: PadDirection,
    /// Effective flow-control mode of the link.
    pub mode: PadMode,
    /// Unit demand is counted in on this link.
    pub unit: DemandUnit,
    /// The peer's pad.
    pub peer_pad: PadRef,
    /// The peer's mailbox.
    pub peer: Mailbox,
    /// Shared overflow counter (push links only).
    pub toilet: Option<Toilet>,
    /// Input-buffer settings (meaningful on the input side).
    pub input: InputBufferConfig,
    /// Where to send the `LinkResponse`.
    pub reply_to: Mailbox,
}

/// The flat message union all actors exchange.
pub(crate) enum Message {
    // --- stream plane, consumed by elements ---
    /// Caps arriving on an input pad.
    Caps { pad: PadRef, caps: Caps },
    /// An event arriving on an input pad.
    Event { pad: PadRef, event: Event },
    /// Buffers arriving on an input pad.
    Buffers { pad: PadRef, buffers: Vec<Buffer> },
    /// Demand arriving for an output pad.
    Demand { pad: PadRef, size: u64 },

    // --- control plane, consumed by elements and bins ---
    /// One end of a link handshake.
    HandleLink(Box<HandleLink>),
    /// Walk toward the given playback state.
    ChangePlaybackState { target: PlaybackState },
    /// A timer fired.
    TimerTick { timer: String },
    /// The pipeline clock changed rate.
    ClockRatioUpdate { ratio: f64 },
    /// Attach key/value pairs to the actor's log output.
    LogMetadata { entries: Vec<(String, String)> },
    /// An opaque message for the element's `handle_other`.
    Other { payload: UserPayload },
    /// Shut down gracefully.
    Terminate,

    // --- parent plane, consumed by bins and pipelines ---
    /// A child finished one playback transition.
    PlaybackStateChanged { child: String, state: PlaybackState },
    /// A child emitted a notification.
    Notification { child: String, payload: UserPayload },
    /// A child saw the start of stream on an input pad.
    StartOfStream { child: String, pad: PadRef },
    /// A child saw the end of stream on an input pad.
    EndOfStream { child: String, pad: PadRef },
    /// One link endpoint finished its handshake.
    LinkResponse { link: LinkId },
    /// Monitor signal: a child actor is gone.
    ChildDown { child: String, reason: ExitReason },
    /// The link handshake watchdog fired.
    LinkTimeout { spec: SpecRef },
    /// The termination grace period elapsed.
    TerminateTimeout,
    /// Route an opaque payload to a (possibly nested) child.
    MessageChild { child: String, payload: UserPayload },
}

impl Message {
    /// Tag for logging; avoids formatting payloads.
    pub fn tag(&self) -> &'static str {
        match self {
            Message::Caps { .. } => "caps",
            Message::Event { .. } => "event",
            Message::Buffers { .. } => "buffers",
            Message::Demand { .. } => "demand",
            Message::HandleLink(_) => "handle_link",
            Message::ChangePlaybackState { .. } => "change_playback_state",
            Message::TimerTick { .. } => "timer_tick",
            Message::ClockRatioUpdate { .. } => "clock_ratio_update",
            Message::LogMetadata { .. } => "log_metadata",
            Message::Other { .. } => "other",
            Message::Terminate => "terminate",
            Message::PlaybackStateChanged { .. } => "playback_state_changed",
            Message::Notification { .. } => "notification",
            Message::StartOfStream { .. } => "start_of_stream",
            Message::EndOfStream { .. } => "end_of_stream",
            Message::LinkResponse { .. } => "link_response",
            Message::ChildDown { .. } => "child_down",
            Message::LinkTimeout { .. } => "link_timeout",
            Message::TerminateTimeout => "terminate_timeout",
            Message::MessageChild { .. } => "message_child",
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message::{}", self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(LinkId::new(), LinkId::new());
        assert_ne!(SpecRef::new(), SpecRef::new());
    }

    #[test]
    fn test_mailbox_roundtrip() {
        let (mailbox, rx) = Mailbox::channel("probe");
        mailbox.send(Message::Terminate);
        let received = rx.try_recv().unwrap().unwrap();
        assert!(matches!(received, Message::Terminate));
        assert_eq!(mailbox.name(), "probe");
    }

    #[test]
    fn test_send_to_closed_mailbox_is_silent() {
        let (mailbox, rx) = Mailbox::channel("gone");
        drop(rx);
        mailbox.send(Message::Terminate);
    }
}
