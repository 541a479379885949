//! The element callback contract and the actions callbacks return.
//!
//! An element is a behavior object implementing [`Element`] plus whatever
//! state it keeps in its own fields. Every callback runs to completion
//! inside the element's actor — callbacks never await — and returns a list
//! of [`Action`]s that the runtime interprets in order. Long-running work
//! must be decomposed into timer ticks or `handle_other` self-messages.

use crate::buffer::Buffer;
use crate::element::{DemandUnit, PadDirection, PadMode, PadRef, PadSpec, PlaybackState};
use crate::event::Event;
use crate::format::Caps;
use crate::message::UserPayload;
use smallvec::{smallvec, SmallVec};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Error returned from an element callback.
///
/// Recovered as a crash of the element; the parent decides whether to
/// propagate (it does, by tearing the pipeline down).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackError(pub String);

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CallbackError {}

impl From<String> for CallbackError {
    fn from(reason: String) -> Self {
        Self(reason)
    }
}

impl From<&str> for CallbackError {
    fn from(reason: &str) -> Self {
        Self(reason.to_string())
    }
}

/// Action list returned by callbacks. Small by design: most callbacks
/// return zero to four actions.
pub type Actions = SmallVec<[Action; 4]>;

/// Result of an element callback.
pub type CallbackResult = Result<Actions, CallbackError>;

/// Size argument of a demand action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemandSize {
    /// Set the pad's demand to exactly this value.
    Exact(u64),
    /// Adjust the pad's demand by this delta. A result below zero is a
    /// contract violation.
    Relative(i64),
}

/// One instruction emitted by an element callback.
///
/// Actions are interpreted strictly in list order.
pub enum Action {
    /// Send caps on an output pad.
    Caps {
        /// Output pad to send on.
        pad: PadRef,
        /// The caps to negotiate.
        caps: Caps,
    },
    /// Send buffers on an output pad. Caps must have been sent first.
    Buffer {
        /// Output pad to send on.
        pad: PadRef,
        /// Buffers, in emission order.
        buffers: Vec<Buffer>,
    },
    /// Send an event on an output pad.
    Event {
        /// Output pad to send on.
        pad: PadRef,
        /// The event.
        event: Event,
    },
    /// Change the demand on an input pad, then supply it.
    Demand {
        /// Input pad whose demand changes.
        pad: PadRef,
        /// How the demand changes.
        size: DemandSize,
    },
    /// Re-enter demand handling for a pad: on an output pad the element's
    /// `handle_demand` runs again; on an input pad the queue is re-drained.
    Redemand {
        /// The pad to re-enter.
        pad: PadRef,
    },
    /// Re-emit the item that triggered this callback on every linked pad of
    /// the opposite direction.
    Forward,
    /// Re-emit the item that triggered this callback on the given pads
    /// only.
    ForwardTo {
        /// Target pads (must be linked output pads for items arriving on
        /// an input, and vice versa).
        pads: Vec<PadRef>,
    },
    /// Send a notification to the parent.
    Notify(UserPayload),
    /// Complete the in-flight playback transition at this point of the
    /// action list instead of after it.
    PlaybackChangeSuccessful,
    /// Start (or restart) a named interval timer.
    StartTimer {
        /// Timer name, unique within the element.
        timer: String,
        /// Interval between ticks at clock ratio 1.0.
        interval: Duration,
    },
    /// Stop a named timer.
    StopTimer {
        /// Timer name.
        timer: String,
    },
}

impl Action {
    /// Shorthand for a single-buffer [`Action::Buffer`].
    pub fn buffer(pad: impl Into<PadRef>, buffer: Buffer) -> Self {
        Action::Buffer {
            pad: pad.into(),
            buffers: vec![buffer],
        }
    }

    /// Shorthand for [`Action::Demand`] with an exact size.
    pub fn demand(pad: impl Into<PadRef>, size: u64) -> Self {
        Action::Demand {
            pad: pad.into(),
            size: DemandSize::Exact(size),
        }
    }

    /// Shorthand for [`Action::Demand`] with a relative size.
    pub fn demand_delta(pad: impl Into<PadRef>, delta: i64) -> Self {
        Action::Demand {
            pad: pad.into(),
            size: DemandSize::Relative(delta),
        }
    }

    /// Shorthand for [`Action::Notify`].
    pub fn notify<T: Send + Sync + 'static>(payload: T) -> Self {
        Action::Notify(std::sync::Arc::new(payload))
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Caps { pad, .. } => write!(f, "Caps({pad})"),
            Action::Buffer { pad, buffers } => write!(f, "Buffer({pad}, {})", buffers.len()),
            Action::Event { pad, event } => write!(f, "Event({pad}, {})", event.tag()),
            Action::Demand { pad, size } => write!(f, "Demand({pad}, {size:?})"),
            Action::Redemand { pad } => write!(f, "Redemand({pad})"),
            Action::Forward => write!(f, "Forward"),
            Action::ForwardTo { pads } => write!(f, "ForwardTo({} pads)", pads.len()),
            Action::Notify(_) => write!(f, "Notify"),
            Action::PlaybackChangeSuccessful => write!(f, "PlaybackChangeSuccessful"),
            Action::StartTimer { timer, interval } => {
                write!(f, "StartTimer({timer}, {interval:?})")
            }
            Action::StopTimer { timer } => write!(f, "StopTimer({timer})"),
        }
    }
}

/// Snapshot of one pad, exposed to callbacks.
#[derive(Debug, Clone)]
pub struct PadInfo {
    /// Pad direction.
    pub direction: PadDirection,
    /// Effective flow-control mode.
    pub mode: PadMode,
    /// Unit demand is counted in on this link.
    pub unit: DemandUnit,
    /// Currently negotiated caps, if any.
    pub caps: Option<Caps>,
    /// Current outstanding demand.
    pub demand: u64,
}

/// Read-only context handed to every callback.
#[derive(Debug, Clone)]
pub struct CallbackContext {
    name: String,
    playback: PlaybackState,
    pads: HashMap<PadRef, PadInfo>,
}

impl CallbackContext {
    pub(crate) fn new(
        name: String,
        playback: PlaybackState,
        pads: HashMap<PadRef, PadInfo>,
    ) -> Self {
        Self {
            name,
            playback,
            pads,
        }
    }

    /// Name of this element instance.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current playback state.
    pub fn playback(&self) -> PlaybackState {
        self.playback
    }

    /// Snapshot of a linked pad.
    pub fn pad(&self, pad: &PadRef) -> Option<&PadInfo> {
        self.pads.get(pad)
    }

    /// Negotiated caps of a pad, if any.
    pub fn caps(&self, pad: &PadRef) -> Option<&Caps> {
        self.pads.get(pad).and_then(|info| info.caps.as_ref())
    }

    /// Iterate over all linked pads.
    pub fn pads(&self) -> impl Iterator<Item = (&PadRef, &PadInfo)> {
        self.pads.iter()
    }
}

/// Why an element is shutting down, passed to `handle_shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Graceful shutdown requested by the parent.
    Normal,
    /// The element is dying on an error.
    Crash,
}

/// The element callback contract.
///
/// Every element module implements a subset of these callbacks; all have
/// defaults except the pad declarations. State lives in the implementing
/// struct itself — the runtime owns the value and calls back with
/// `&mut self` from a single task, so no synchronization is needed.
///
/// # Example
///
/// ```rust,ignore
/// struct Doubler;
///
/// impl Element for Doubler {
///     fn known_input_pads(&self) -> Vec<PadSpec> {
///         vec![PadSpec::input("sink")]
///     }
///     fn known_output_pads(&self) -> Vec<PadSpec> {
///         vec![PadSpec::output("src")]
///     }
///     fn handle_demand(&mut self, _pad: &PadRef, size: u64, _unit: DemandUnit,
///                      _ctx: &CallbackContext) -> CallbackResult {
///         Ok(smallvec![Action::demand("sink", size)])
///     }
///     fn handle_process(&mut self, _pad: &PadRef, buffers: Vec<Buffer>,
///                       _ctx: &CallbackContext) -> CallbackResult {
///         Ok(smallvec![Action::Buffer { pad: "src".into(), buffers }])
///     }
/// }
/// ```
#[allow(unused_variables)]
pub trait Element: Send + 'static {
    /// Input pads this element can have.
    fn known_input_pads(&self) -> Vec<PadSpec> {
        Vec::new()
    }

    /// Output pads this element can have.
    fn known_output_pads(&self) -> Vec<PadSpec> {
        Vec::new()
    }

    /// Called once when the element actor starts, before any linking.
    fn handle_init(&mut self, ctx: &CallbackContext) -> CallbackResult {
        Ok(Actions::new())
    }

    /// `stopped → prepared`: allocate what playback needs.
    fn handle_stopped_to_prepared(&mut self, ctx: &CallbackContext) -> CallbackResult {
        Ok(Actions::new())
    }

    /// `prepared → playing`: traffic starts after this returns.
    fn handle_prepared_to_playing(&mut self, ctx: &CallbackContext) -> CallbackResult {
        Ok(Actions::new())
    }

    /// `playing → prepared`: traffic has stopped.
    fn handle_playing_to_prepared(&mut self, ctx: &CallbackContext) -> CallbackResult {
        Ok(Actions::new())
    }

    /// `prepared → stopped`: release resources.
    fn handle_prepared_to_stopped(&mut self, ctx: &CallbackContext) -> CallbackResult {
        Ok(Actions::new())
    }

    /// Demand arrived on a pull output pad. `size` is the pad's total
    /// outstanding demand in `unit`s.
    fn handle_demand(
        &mut self,
        pad: &PadRef,
        size: u64,
        unit: DemandUnit,
        ctx: &CallbackContext,
    ) -> CallbackResult {
        Ok(Actions::new())
    }

    /// Caps arrived on an input pad. Filters forward them by default.
    fn handle_caps(&mut self, pad: &PadRef, caps: &Caps, ctx: &CallbackContext) -> CallbackResult {
        Ok(smallvec![Action::Forward])
    }

    /// Buffers arrived on an input pad.
    fn handle_process(
        &mut self,
        pad: &PadRef,
        buffers: Vec<Buffer>,
        ctx: &CallbackContext,
    ) -> CallbackResult {
        Ok(Actions::new())
    }

    /// An event arrived on an input pad. Forwarded by default.
    fn handle_event(
        &mut self,
        pad: &PadRef,
        event: &Event,
        ctx: &CallbackContext,
    ) -> CallbackResult {
        Ok(smallvec![Action::Forward])
    }

    /// A message the framework does not recognize (sent via
    /// `message_child`).
    fn handle_other(&mut self, message: UserPayload, ctx: &CallbackContext) -> CallbackResult {
        Ok(Actions::new())
    }

    /// A timer started with [`Action::StartTimer`] ticked.
    fn handle_tick(&mut self, timer: &str, ctx: &CallbackContext) -> CallbackResult {
        Ok(Actions::new())
    }

    /// Last call before the actor exits; release external resources here.
    fn handle_shutdown(&mut self, reason: ShutdownReason) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;
    impl Element for Bare {}

    #[test]
    fn test_defaults_forward_stream_items() {
        let mut element = Bare;
        let ctx = CallbackContext::new("bare".into(), PlaybackState::Playing, HashMap::new());

        let actions = element
            .handle_caps(&"sink".into(), &Caps::new("audio/raw"), &ctx)
            .unwrap();
        assert!(matches!(actions[0], Action::Forward));

        let actions = element
            .handle_event(&"sink".into(), &Event::EndOfStream, &ctx)
            .unwrap();
        assert!(matches!(actions[0], Action::Forward));

        assert!(element.handle_init(&ctx).unwrap().is_empty());
    }

    #[test]
    fn test_action_helpers() {
        let action = Action::demand("sink", 8);
        assert!(
            matches!(action, Action::Demand { size: DemandSize::Exact(8), ref pad } if pad.name == "sink")
        );

        let action = Action::demand_delta("sink", -2);
        assert!(matches!(
            action,
            Action::Demand {
                size: DemandSize::Relative(-2),
                ..
            }
        ));

        assert_eq!(format!("{:?}", Action::Forward), "Forward");
    }

    #[test]
    fn test_callback_error_conversions() {
        let err: CallbackError = "boom".into();
        assert_eq!(err.to_string(), "boom");
        let err: CallbackError = String::from("bang").into();
        assert_eq!(err, CallbackError("bang".into()));
    }
}
