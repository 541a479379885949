//! # Millrace
//!
//! A demand-driven streaming pipeline core.
//!
//! Millrace organizes media processing as a tree of concurrent actors: a
//! [`Pipeline`](pipeline::Pipeline) supervises child [`Element`]s (and
//! nested [`Bin`](parent::Bin)s), whose typed pads are linked into a graph
//! that buffers of payload-agnostic data flow through. Pull-mode links move
//! data under a demand/supply protocol with bounded input queues; push-mode
//! links are guarded by an atomic overflow counter that forcefully stops a
//! producer the consumer cannot keep up with.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use millrace::prelude::*;
//!
//! let spec = Spec::new()
//!     .child("src", MySource::new())
//!     .child("filter", PassThrough::new())
//!     .child("sink", MySink::new())
//!     .link(("src", "src"), ("filter", "sink"))
//!     .link(("filter", "src"), ("sink", "sink"));
//!
//! let handle = Pipeline::start(spec)?;
//! handle.play();
//! handle.terminate(TerminateOptions::default()).await?;
//! ```
//!
//! Elements implement the [`Element`] callback trait; every callback runs to
//! completion inside the element's own actor and returns a list of
//! [`Action`]s that the runtime interprets in order.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod clock;
pub mod element;
pub mod elements;
pub mod error;
pub mod event;
pub mod format;
mod message;
pub mod parent;
pub mod pipeline;
pub mod testing;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::buffer::{Buffer, Metadata};
    pub use crate::clock::ClockTime;
    pub use crate::element::{
        Action, Actions, CallbackContext, CallbackError, CallbackResult, DemandSize, DemandUnit,
        Element, PadDirection, PadMode, PadRef, PadSpec, PlaybackState,
    };
    pub use crate::elements::{NullSink, PassThrough, Tee};
    pub use crate::error::{Error, Result};
    pub use crate::event::Event;
    pub use crate::format::{Caps, CapsConstraint, CapsPattern};
    pub use crate::parent::{Bin, Endpoint, LinkSpec, Spec};
    pub use crate::pipeline::{
        Pipeline, PipelineConfig, PipelineHandle, PipelineNotification, TerminateOptions,
    };
}

pub use element::{Action, Element, PlaybackState};
pub use error::{Error, Result};

#[doc(inline)]
pub use parent::Spec;
#[doc(inline)]
pub use pipeline::Pipeline;
