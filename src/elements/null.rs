//! Null sink that consumes and discards buffers.

use crate::buffer::Buffer;
use crate::element::{Action, CallbackContext, CallbackResult, Element, PadRef, PadSpec};
use smallvec::smallvec;

/// A sink that discards everything it receives.
///
/// It demands `batch` units when playback starts and tops its demand back
/// up as buffers are consumed, so upstream keeps flowing at a steady
/// rate.
#[derive(Debug)]
pub struct NullSink {
    batch: u64,
}

impl NullSink {
    /// Create a null sink demanding 10 units at a time.
    pub fn new() -> Self {
        Self::with_batch(10)
    }

    /// Create a null sink with a custom demand batch.
    pub fn with_batch(batch: u64) -> Self {
        Self { batch }
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for NullSink {
    fn known_input_pads(&self) -> Vec<PadSpec> {
        vec![PadSpec::input("sink")]
    }

    fn handle_prepared_to_playing(&mut self, _ctx: &CallbackContext) -> CallbackResult {
        Ok(smallvec![Action::demand("sink", self.batch)])
    }

    fn handle_process(
        &mut self,
        _pad: &PadRef,
        buffers: Vec<Buffer>,
        _ctx: &CallbackContext,
    ) -> CallbackResult {
        Ok(smallvec![Action::demand_delta(
            "sink",
            buffers.len() as i64
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{DemandSize, Element, PlaybackState};
    use std::collections::HashMap;

    fn ctx() -> CallbackContext {
        CallbackContext::new("sink".into(), PlaybackState::Playing, HashMap::new())
    }

    #[test]
    fn test_initial_demand_on_playing() {
        let mut sink = NullSink::with_batch(32);
        let actions = sink.handle_prepared_to_playing(&ctx()).unwrap();
        assert!(matches!(
            actions[0],
            Action::Demand {
                size: DemandSize::Exact(32),
                ..
            }
        ));
    }

    #[test]
    fn test_demand_topped_up_per_batch() {
        let mut sink = NullSink::new();
        let buffers = vec![Buffer::from_sequence(0), Buffer::from_sequence(1)];
        let actions = sink.handle_process(&"sink".into(), buffers, &ctx()).unwrap();
        assert!(matches!(
            actions[0],
            Action::Demand {
                size: DemandSize::Relative(2),
                ..
            }
        ));
    }
}
