//! Built-in utility elements.
//!
//! These are deliberately small: the framework treats concrete elements as
//! external collaborators, and the ones here exist for plumbing and
//! debugging pipelines (and as reference implementations of the callback
//! contract).

mod null;
mod passthrough;
mod tee;

pub use null::NullSink;
pub use passthrough::PassThrough;
pub use tee::Tee;
