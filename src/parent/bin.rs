//! Bins: parents that are themselves children.
//!
//! A bin exposes proxy pads to the outside. Inside, `itself` links bind
//! each proxy pad to an inner child's pad. When the outer parent sends the
//! bin a `HandleLink` for one of its proxy pads, the bin forwards it to
//! the bound inner child (swapping in the inner pad and its own mailbox as
//! the reply target); the inner child's `LinkResponse` then bubbles back
//! up the parent chain, each level decrementing its own response count.
//! The stream itself never touches the bin — the outer peer and the inner
//! child talk directly once linked: at spawn the bin publishes, per proxy
//! pad, the terminal element endpoint behind it (nested bins flatten
//! here), and the outer parent hands that endpoint to the other side of
//! the link as its stream peer.

use crate::element::actor::SpawnedElement;
use crate::element::{PadDirection, PadRef, PadSpec};
use crate::error::{LinkError, Result};
use crate::message::{HandleLink, LinkId, Mailbox, Message, SpecRef};
use crate::parent::actor::{ParentCore, Step};
use crate::parent::spec::Bin;
use std::collections::HashMap;

/// Bin-only state inside a [`ParentCore`].
pub(crate) struct BinState {
    /// The bin's own proxy pads.
    pub pads: HashMap<String, PadSpec>,
    /// Proxy input pad name → inner (child, pad) receiving the stream.
    pub input_bindings: HashMap<String, (String, PadRef)>,
    /// Proxy output pad name → inner (child, pad) producing the stream.
    pub output_bindings: HashMap<String, (String, PadRef)>,
    /// Links forwarded inward, keyed by id, with the outer reply target.
    pub proxied: HashMap<LinkId, Mailbox>,
}

impl BinState {
    fn new(pads: &[PadSpec]) -> Self {
        Self {
            pads: pads.iter().map(|s| (s.name.clone(), s.clone())).collect(),
            input_bindings: HashMap::new(),
            output_bindings: HashMap::new(),
            proxied: HashMap::new(),
        }
    }
}

/// Spawn a bin child: build its core, process its internal spec, and run
/// it as an actor. The outer parent sees the same shape as for a plain
/// element.
pub(crate) fn spawn_bin(name: &str, bin: Bin, outer: &ParentCore) -> Result<SpawnedElement> {
    let input_specs: HashMap<String, PadSpec> = bin
        .pads
        .iter()
        .filter(|s| s.direction == PadDirection::Input)
        .map(|s| (s.name.clone(), s.clone()))
        .collect();
    let output_specs: HashMap<String, PadSpec> = bin
        .pads
        .iter()
        .filter(|s| s.direction == PadDirection::Output)
        .map(|s| (s.name.clone(), s.clone()))
        .collect();

    let (mailbox, rx) = Mailbox::channel(name);
    let mut core = ParentCore::new_bin(
        name,
        mailbox.clone(),
        outer.own.clone(),
        outer.config.clone(),
        BinState::new(&bin.pads),
    );
    if let Err(error) = core.start_spec(bin.spec) {
        core.abort_all();
        return Err(error);
    }

    // Snapshot the terminal stream endpoint behind every bound proxy pad
    // while the core is still on this side of the spawn. Inner bins
    // already resolved theirs the same way, so nesting flattens here.
    let mut terminals = HashMap::new();
    if let Some(state) = &core.bin {
        for (pad_name, (child, child_pad)) in state
            .input_bindings
            .iter()
            .chain(state.output_bindings.iter())
        {
            terminals.insert(pad_name.clone(), core.stream_endpoint(child, child_pad));
        }
    }

    let join = tokio::spawn(core.run(rx.to_async()));
    let abort = join.abort_handle();
    Ok(SpawnedElement {
        mailbox,
        abort,
        join,
        input_specs,
        output_specs,
        terminals,
    })
}

impl ParentCore {
    /// Record an `itself → child` binding: the bin's proxy input pad feeds
    /// the given inner input pad.
    pub(crate) fn bind_bin_input(
        &mut self,
        spec_ref: SpecRef,
        bin_pad: PadRef,
        child: String,
        child_pad: PadRef,
    ) -> Result<()> {
        self.bind_bin_pad(spec_ref, bin_pad, child, child_pad, PadDirection::Input)
    }

    /// Record a `child → itself` binding: the given inner output pad feeds
    /// the bin's proxy output pad.
    pub(crate) fn bind_bin_output(
        &mut self,
        spec_ref: SpecRef,
        child: String,
        child_pad: PadRef,
        bin_pad: PadRef,
    ) -> Result<()> {
        self.bind_bin_pad(spec_ref, bin_pad, child, child_pad, PadDirection::Output)
    }

    fn bind_bin_pad(
        &mut self,
        spec_ref: SpecRef,
        bin_pad: PadRef,
        child: String,
        child_pad: PadRef,
        direction: PadDirection,
    ) -> Result<()> {
        let bin_spec = {
            let Some(bin) = &self.bin else {
                return Err(LinkError::ItselfOutsideBin.into());
            };
            bin.pads
                .get(&bin_pad.name)
                .ok_or_else(|| LinkError::NoSuchPad {
                    child: self.name.to_string(),
                    pad: bin_pad.clone(),
                })?
                .clone()
        };
        if bin_spec.direction != direction {
            return Err(LinkError::WrongDirection {
                child: self.name.to_string(),
                pad: bin_pad,
            }
            .into());
        }
        let child_spec = self.endpoint_spec(&child, &child_pad, direction)?;
        let child_pad = self.claim_pad(&child, child_pad, &child_spec)?;

        let bin = self.bin.as_mut().expect("checked above");
        let bindings = match direction {
            PadDirection::Input => &mut bin.input_bindings,
            PadDirection::Output => &mut bin.output_bindings,
        };
        bindings.insert(bin_pad.name, (child, child_pad));

        // Boundary links carry no handshake of their own; they resolve
        // through the external link that reaches this proxy pad.
        self.spec_link_done(spec_ref);
        Ok(())
    }

    /// The outer parent is linking one of this bin's proxy pads: forward
    /// the handshake to the bound inner child and remember where the
    /// response must bubble to.
    pub(crate) fn bin_handle_link(&mut self, link: HandleLink) -> Step {
        let Some(bin) = &self.bin else {
            tracing::warn!(parent = %self.name, "handle_link on a pipeline root");
            return Step::Continue;
        };
        let bindings = match link.direction {
            PadDirection::Input => &bin.input_bindings,
            PadDirection::Output => &bin.output_bindings,
        };
        let Some((child, child_pad)) = bindings.get(&link.pad.name).cloned() else {
            tracing::error!(parent = %self.name, pad = %link.pad, "bin pad is not bound");
            return self.begin_terminate(Some(
                LinkError::UnboundBinPad { pad: link.pad }.into(),
            ));
        };
        let Some(entry) = self.children.get(&child) else {
            return self.begin_terminate(Some(LinkError::UnknownChild { child }.into()));
        };
        let inner = HandleLink {
            link: link.link,
            pad: child_pad,
            direction: link.direction,
            mode: link.mode,
            unit: link.unit,
            peer_pad: link.peer_pad,
            peer: link.peer,
            toilet: link.toilet,
            input: link.input,
            reply_to: self.own.clone(),
        };
        entry.mailbox.send(Message::HandleLink(Box::new(inner)));
        self.bin
            .as_mut()
            .expect("checked above")
            .proxied
            .insert(link.link, link.reply_to);
        Step::Continue
    }

    /// Bubble a proxied link response to the outer parent. Returns false
    /// when the link is not proxied (it is one of this parent's own).
    pub(crate) fn bin_forward_link_response(&mut self, link: LinkId) -> bool {
        let Some(bin) = &mut self.bin else {
            return false;
        };
        match bin.proxied.remove(&link) {
            Some(reply_to) => {
                reply_to.send(Message::LinkResponse { link });
                true
            }
            None => false,
        }
    }
}
