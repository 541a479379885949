//! Stream controllers and action interpretation.
//!
//! Every stream item drained from an input queue passes through a
//! controller that validates ordering, updates pad state, invokes the
//! element callback, and interprets the returned actions:
//!
//! - [`caps`]: caps constraint check and `handle_caps`
//! - [`event`]: start/end-of-stream bookkeeping and `handle_event`
//! - [`buffer`]: caps-before-buffer contract and `handle_process`
//! - [`demand`]: `handle_demand` for output pads
//! - [`action`]: the order-preserving action interpreter

mod action;
mod buffer;
mod caps;
mod demand;
mod event;

use crate::buffer::Buffer;
use crate::event::Event;
use crate::format::Caps;

/// The stream item a callback was invoked with, kept around so a
/// `Forward` action can re-emit it on the opposite-direction pads.
pub(crate) enum Forwardable {
    Caps(Caps),
    Event(Event),
    Buffers(Vec<Buffer>),
}
