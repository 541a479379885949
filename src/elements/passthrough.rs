//! Pass-through element that forwards buffers unchanged.

use crate::buffer::Buffer;
use crate::element::{
    Action, CallbackContext, CallbackResult, DemandUnit, Element, PadRef, PadSpec,
};
use smallvec::smallvec;

/// A filter that forwards everything unchanged.
///
/// Useful for testing pipeline plumbing and as a starting point for
/// filter elements: demand arriving on `src` is forwarded upstream on
/// `sink`, buffers arriving on `sink` are re-emitted on `src`, and caps
/// and events ride the default forwarding behavior.
#[derive(Debug, Default)]
pub struct PassThrough;

impl PassThrough {
    /// Create a new pass-through element.
    pub fn new() -> Self {
        Self
    }
}

impl Element for PassThrough {
    fn known_input_pads(&self) -> Vec<PadSpec> {
        vec![PadSpec::input("sink")]
    }

    fn known_output_pads(&self) -> Vec<PadSpec> {
        vec![PadSpec::output("src")]
    }

    fn handle_demand(
        &mut self,
        _pad: &PadRef,
        size: u64,
        _unit: DemandUnit,
        _ctx: &CallbackContext,
    ) -> CallbackResult {
        Ok(smallvec![Action::demand("sink", size)])
    }

    fn handle_process(
        &mut self,
        _pad: &PadRef,
        buffers: Vec<Buffer>,
        _ctx: &CallbackContext,
    ) -> CallbackResult {
        Ok(smallvec![Action::Buffer {
            pad: "src".into(),
            buffers,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{DemandSize, DemandUnit, Element, PadDirection, PlaybackState};
    use std::collections::HashMap;

    fn ctx() -> CallbackContext {
        CallbackContext::new("filter".into(), PlaybackState::Playing, HashMap::new())
    }

    #[test]
    fn test_declares_one_pad_each_way() {
        let filter = PassThrough::new();
        let inputs = filter.known_input_pads();
        let outputs = filter.known_output_pads();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].direction, PadDirection::Input);
        assert_eq!(outputs[0].direction, PadDirection::Output);
    }

    #[test]
    fn test_demand_is_forwarded_upstream() {
        let mut filter = PassThrough::new();
        let actions = filter
            .handle_demand(&"src".into(), 16, DemandUnit::Buffers, &ctx())
            .unwrap();
        assert!(matches!(
            actions[0],
            Action::Demand {
                size: DemandSize::Exact(16),
                ref pad,
            } if pad.name == "sink"
        ));
    }

    #[test]
    fn test_buffers_are_reemitted_unchanged() {
        let mut filter = PassThrough::new();
        let buffers = vec![Buffer::from_sequence(3), Buffer::from_sequence(4)];
        let actions = filter
            .handle_process(&"sink".into(), buffers.clone(), &ctx())
            .unwrap();
        let Action::Buffer { pad, buffers: out } = &actions[0] else {
            panic!("expected a buffer action");
        };
        assert_eq!(pad.name, "src");
        assert_eq!(*out, buffers);
    }
}
