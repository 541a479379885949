//! The element runtime.
//!
//! This module defines the element side of the framework:
//!
//! - [`Element`]: the callback contract element modules implement
//! - [`PadSpec`]/[`PadRef`]: pad declarations and references
//! - [`Action`]: instructions callbacks return to the runtime
//! - [`PlaybackState`]: the per-element state machine
//!
//! # Design
//!
//! Elements follow the "sync callbacks, async orchestration" principle:
//! callbacks are synchronous and run to completion inside the element's
//! actor task, while the runtime handles scheduling, linking, demand and
//! backpressure. The moving parts live in the private submodules: the pad
//! model, the input queues, the demand handler with its delayed-demand
//! set, the stream controllers, and the actor loop itself.

pub(crate) mod actor;
mod controllers;
mod demand_handler;
pub mod input_buffer;
mod pad;
pub(crate) mod pad_model;
mod state_machine;
mod timer;
mod toilet;
mod traits;

pub use input_buffer::InputBufferConfig;
pub use pad::{DemandUnit, PadAvailability, PadDirection, PadMode, PadRef, PadSpec};
pub use state_machine::PlaybackState;
pub use toilet::Toilet;
pub use traits::{
    Action, Actions, CallbackContext, CallbackError, CallbackResult, DemandSize, Element, PadInfo,
    ShutdownReason,
};

pub use crate::message::UserPayload;
