//! Tee element that fans one stream out to several consumers.

use crate::buffer::Buffer;
use crate::element::{Action, CallbackContext, CallbackResult, Element, PadRef, PadSpec};
use smallvec::smallvec;

/// Duplicates its input stream onto every linked output pad.
///
/// Both sides are push-mode: the tee forwards at the producer's pace and
/// every output link carries its own toilet. Output pads are created per
/// link request, so any number of consumers can attach.
#[derive(Debug, Default)]
pub struct Tee;

impl Tee {
    /// Create a new tee.
    pub fn new() -> Self {
        Self
    }
}

impl Element for Tee {
    fn known_input_pads(&self) -> Vec<PadSpec> {
        vec![PadSpec::input("sink").push()]
    }

    fn known_output_pads(&self) -> Vec<PadSpec> {
        vec![PadSpec::output("src").push().on_request()]
    }

    fn handle_process(
        &mut self,
        _pad: &PadRef,
        _buffers: Vec<Buffer>,
        _ctx: &CallbackContext,
    ) -> CallbackResult {
        Ok(smallvec![Action::Forward])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Element, PadAvailability, PadMode, PlaybackState};
    use std::collections::HashMap;

    #[test]
    fn test_output_pads_are_requested_per_link() {
        let tee = Tee::new();
        let outputs = tee.known_output_pads();
        assert_eq!(outputs[0].availability, PadAvailability::OnRequest);
        assert_eq!(outputs[0].mode, PadMode::Push);
        assert_eq!(tee.known_input_pads()[0].mode, PadMode::Push);
    }

    #[test]
    fn test_buffers_are_forwarded() {
        let mut tee = Tee::new();
        let ctx = CallbackContext::new("tee".into(), PlaybackState::Playing, HashMap::new());
        let actions = tee
            .handle_process(&"sink".into(), vec![Buffer::from_sequence(0)], &ctx)
            .unwrap();
        assert!(matches!(actions[0], Action::Forward));
    }
}
