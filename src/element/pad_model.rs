//! Per-pad state records within one element.
//!
//! All accesses happen on the owning element's actor task, so the model is
//! a plain map with typed accessors and no locking. Looking up a reference
//! that was never registered is a programmer error and fails with
//! [`Error::UnknownPad`].

use crate::element::input_buffer::InputBuffer;
use crate::element::{DemandUnit, PadDirection, PadMode, PadRef, PadSpec, Toilet};
use crate::error::{Error, Result};
use crate::format::Caps;
use crate::message::Mailbox;
use std::collections::HashMap;
use std::sync::Arc;

/// The linked peer of a pad.
#[derive(Debug, Clone)]
pub(crate) struct Peer {
    /// The peer's pad.
    pub pad: PadRef,
    /// The peer element's mailbox.
    pub mailbox: Mailbox,
}

/// Mutable per-pad record.
#[derive(Debug)]
pub(crate) struct PadData {
    /// The declaration this pad was instantiated from.
    pub spec: PadSpec,
    /// Effective flow-control mode of the link (may differ from the spec's
    /// for push-output → pull-input links).
    pub mode: PadMode,
    /// Unit demand is counted in on this link.
    pub unit: DemandUnit,
    /// Currently negotiated caps.
    pub caps: Option<Caps>,
    /// Linked peer, `None` until the link handshake completes.
    pub peer: Option<Peer>,
    /// Outstanding demand. Unsigned by construction: the demand invariant
    /// (`demand >= 0`) cannot be violated by representation.
    pub demand: u64,
    /// Input queue (input pads only, set at link time).
    pub input: Option<InputBuffer>,
    /// Overflow guard (push links only).
    pub toilet: Option<Toilet>,
    /// Caps were sent on this output pad.
    pub caps_sent: bool,
    /// Start-of-stream was sent (output) or received (input).
    pub start_of_stream: bool,
    /// End-of-stream was sent (output) or received (input).
    pub end_of_stream: bool,
}

impl PadData {
    pub fn new(spec: PadSpec) -> Self {
        Self {
            mode: spec.mode,
            unit: spec.unit,
            spec,
            caps: None,
            peer: None,
            demand: 0,
            input: None,
            toilet: None,
            caps_sent: false,
            start_of_stream: false,
            end_of_stream: false,
        }
    }

    /// Direction of this pad.
    pub fn direction(&self) -> PadDirection {
        self.spec.direction
    }

    /// Whether the link handshake completed for this pad.
    pub fn is_linked(&self) -> bool {
        self.peer.is_some()
    }
}

/// Keyed store of pad records for one element.
#[derive(Debug)]
pub(crate) struct PadModel {
    element: Arc<str>,
    specs: HashMap<String, PadSpec>,
    pads: HashMap<PadRef, PadData>,
}

impl PadModel {
    /// Build the model from an element's declared pads. Always-available
    /// pads are registered eagerly (unlinked); on-request pads get their
    /// records at link time.
    pub fn new(element: Arc<str>, input: Vec<PadSpec>, output: Vec<PadSpec>) -> Self {
        let mut specs = HashMap::new();
        let mut pads = HashMap::new();
        for spec in input.into_iter().chain(output) {
            if spec.availability == crate::element::PadAvailability::Always {
                pads.insert(PadRef::new(spec.name.clone()), PadData::new(spec.clone()));
            }
            specs.insert(spec.name.clone(), spec);
        }
        Self {
            element,
            specs,
            pads,
        }
    }

    /// Declared spec for a pad name.
    pub fn spec(&self, name: &str) -> Option<&PadSpec> {
        self.specs.get(name)
    }

    /// Get a pad record.
    pub fn get(&self, pad: &PadRef) -> Result<&PadData> {
        self.pads.get(pad).ok_or_else(|| Error::UnknownPad {
            element: self.element.to_string(),
            pad: pad.clone(),
        })
    }

    /// Get a pad record mutably.
    pub fn get_mut(&mut self, pad: &PadRef) -> Result<&mut PadData> {
        self.pads.get_mut(pad).ok_or_else(|| Error::UnknownPad {
            element: self.element.to_string(),
            pad: pad.clone(),
        })
    }

    /// Atomically apply a multi-field update to one pad record.
    pub fn update<R>(&mut self, pad: &PadRef, f: impl FnOnce(&mut PadData) -> R) -> Result<R> {
        Ok(f(self.get_mut(pad)?))
    }

    /// Insert the record for a freshly linked pad (on-request instances).
    pub fn insert(&mut self, pad: PadRef, data: PadData) {
        self.pads.insert(pad, data);
    }

    /// References of all linked pads with the given direction.
    pub fn linked_refs(&self, direction: PadDirection) -> Vec<PadRef> {
        self.pads
            .iter()
            .filter(|(_, data)| data.direction() == direction && data.is_linked())
            .map(|(pad, _)| pad.clone())
            .collect()
    }

    /// References of all linked input pads.
    pub fn linked_inputs(&self) -> Vec<PadRef> {
        self.linked_refs(PadDirection::Input)
    }

    /// Iterate over all registered pads.
    pub fn iter(&self) -> impl Iterator<Item = (&PadRef, &PadData)> {
        self.pads.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::PadAvailability;

    fn model() -> PadModel {
        PadModel::new(
            Arc::from("filter"),
            vec![PadSpec::input("sink")],
            vec![PadSpec::output("src"), PadSpec::output("aux").on_request()],
        )
    }

    #[test]
    fn test_always_pads_registered_eagerly() {
        let model = model();
        assert!(model.get(&"sink".into()).is_ok());
        assert!(model.get(&"src".into()).is_ok());
        // On-request pads only exist as specs until linked.
        assert!(model.get(&"aux".into()).is_err());
        assert_eq!(
            model.spec("aux").unwrap().availability,
            PadAvailability::OnRequest
        );
    }

    #[test]
    fn test_unknown_pad_is_an_error() {
        let mut model = model();
        let missing = PadRef::new("bogus");
        assert!(matches!(
            model.get(&missing),
            Err(Error::UnknownPad { ref pad, .. }) if *pad == missing
        ));
        assert!(model.get_mut(&missing).is_err());
    }

    #[test]
    fn test_update_applies_multi_field_changes() {
        let mut model = model();
        let pad = PadRef::new("src");
        model
            .update(&pad, |data| {
                data.caps_sent = true;
                data.demand = 7;
            })
            .unwrap();
        let data = model.get(&pad).unwrap();
        assert!(data.caps_sent);
        assert_eq!(data.demand, 7);
    }

    #[test]
    fn test_linked_refs_filters_unlinked() {
        let mut model = model();
        assert!(model.linked_refs(PadDirection::Output).is_empty());

        let (mailbox, _rx) = Mailbox::channel("peer");
        model
            .update(&"src".into(), |data| {
                data.peer = Some(Peer {
                    pad: PadRef::new("sink"),
                    mailbox,
                });
            })
            .unwrap();
        assert_eq!(
            model.linked_refs(PadDirection::Output),
            vec![PadRef::new("src")]
        );
    }
}
