//! The pad linking protocol.
//!
//! For every link in a spec the parent validates both endpoints against
//! the children's declared pads, derives the effective link mode, and
//! sends a `HandleLink` to each end. Each element registers the peer in
//! its pad model and replies with `LinkResponse`; the parent counts the
//! responses down per link and per spec. Once a whole spec is linked,
//! its children are advanced to the parent's current playback state.
//! `itself` endpoints never handshake here — they bind a bin proxy pad to
//! an inner child and resolve when the external side of the boundary
//! arrives.

use crate::element::input_buffer::InputBufferConfig;
use crate::element::{PadAvailability, PadDirection, PadMode, PadRef, PadSpec, Toilet};
use crate::error::{Error, LinkError, Result};
use crate::message::{HandleLink, LinkId, Message, SpecRef, StreamEndpoint};
use crate::parent::actor::{ParentCore, Step};
use crate::parent::spec::{ChildRef, LinkSpec, Spec};

/// One link awaiting endpoint responses.
pub(crate) struct PendingLink {
    pub spec: SpecRef,
    pub to_respond: u8,
}

/// One spec awaiting its links.
pub(crate) struct PendingSpec {
    pub children: Vec<String>,
    pub links: usize,
}

impl ParentCore {
    /// Spawn a spec's children and set its links up. On error the caller
    /// is expected to abort the subtree (`abort_all`).
    pub(crate) fn start_spec(&mut self, spec: Spec) -> Result<()> {
        let spec_ref = SpecRef::new();
        let mut names = Vec::new();
        for (name, def) in spec.children {
            names.push(name.clone());
            self.add_child(name, def)?;
        }
        self.pending_specs.insert(
            spec_ref,
            PendingSpec {
                children: names,
                links: spec.links.len(),
            },
        );
        for link in spec.links {
            self.resolve_link(spec_ref, link)?;
        }
        if self
            .pending_specs
            .get(&spec_ref)
            .is_some_and(|s| s.links == 0)
        {
            self.init_playback_state(spec_ref);
        }
        if self.pending_specs.contains_key(&spec_ref) {
            let own = self.own.clone();
            let timeout = self.config.link_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                own.send(Message::LinkTimeout { spec: spec_ref });
            });
        }
        Ok(())
    }

    /// Validate one link and start its handshake (or record a bin binding).
    fn resolve_link(&mut self, spec_ref: SpecRef, link: LinkSpec) -> Result<()> {
        match (link.from.child, link.to.child) {
            (ChildRef::Itself, ChildRef::Itself) => Err(LinkError::ItselfOutsideBin.into()),
            (ChildRef::Itself, ChildRef::Child(to)) => {
                self.bind_bin_input(spec_ref, link.from.pad, to, link.to.pad)
            }
            (ChildRef::Child(from), ChildRef::Itself) => {
                self.bind_bin_output(spec_ref, from, link.from.pad, link.to.pad)
            }
            (ChildRef::Child(from), ChildRef::Child(to)) => {
                self.link_children(spec_ref, from, link.from.pad, to, link.to.pad)
            }
        }
    }

    /// Link an output pad of `from` to an input pad of `to`, both direct
    /// children of this parent.
    fn link_children(
        &mut self,
        spec_ref: SpecRef,
        from: String,
        from_pad: PadRef,
        to: String,
        to_pad: PadRef,
    ) -> Result<()> {
        let out_spec = self.endpoint_spec(&from, &from_pad, PadDirection::Output)?;
        let in_spec = self.endpoint_spec(&to, &to_pad, PadDirection::Input)?;

        let mode = match (out_spec.mode, in_spec.mode) {
            (PadMode::Pull, PadMode::Pull) => PadMode::Pull,
            (PadMode::Push, _) => PadMode::Push,
            (PadMode::Pull, PadMode::Push) => {
                return Err(LinkError::ModeMismatch {
                    output: from_pad,
                    input: to_pad,
                }
                .into())
            }
        };
        // The input pad's declaration governs the unit, watermark and
        // toilet of the link.
        let unit = in_spec.unit;
        let input = InputBufferConfig {
            preferred_size: in_spec
                .preferred_size
                .unwrap_or(self.config.input_preferred_size),
        };
        let toilet = match mode {
            PadMode::Push => Some(Toilet::new(
                in_spec
                    .toilet_capacity
                    .unwrap_or(self.config.toilet_capacity),
            )),
            PadMode::Pull => None,
        };

        let from_pad = self.claim_pad(&from, from_pad, &out_spec)?;
        let to_pad = self.claim_pad(&to, to_pad, &in_spec)?;

        let link = LinkId::new();
        self.pending_links.insert(
            link,
            PendingLink {
                spec: spec_ref,
                to_respond: 2,
            },
        );

        // The handshake goes to the immediate child — a bin forwards it
        // inward to the bound inner element — but the stream peer each
        // side registers must be the terminal element behind any bin
        // boundary: bins never carry stream traffic themselves.
        let from_mailbox = self.children[&from].mailbox.clone();
        let to_mailbox = self.children[&to].mailbox.clone();
        let from_stream = self.stream_endpoint(&from, &from_pad);
        let to_stream = self.stream_endpoint(&to, &to_pad);
        tracing::debug!(
            parent = %self.name,
            %link,
            from = %format_args!("{from}.{from_pad}"),
            to = %format_args!("{to}.{to_pad}"),
            ?mode,
            "linking"
        );

        from_mailbox.send(Message::HandleLink(Box::new(HandleLink {
            link,
            pad: from_pad,
            direction: PadDirection::Output,
            mode,
            unit,
            peer_pad: to_stream.pad,
            peer: to_stream.mailbox,
            toilet: toilet.clone(),
            input,
            reply_to: self.own.clone(),
        })));
        to_mailbox.send(Message::HandleLink(Box::new(HandleLink {
            link,
            pad: to_pad,
            direction: PadDirection::Input,
            mode,
            unit,
            peer_pad: from_stream.pad,
            peer: from_stream.mailbox,
            toilet,
            input,
            reply_to: self.own.clone(),
        })));
        Ok(())
    }

    /// Resolve where the stream for `(child, pad)` actually terminates.
    ///
    /// For a plain element that is the child itself; for a bin it is the
    /// inner element its proxy pad was bound to, captured when the bin was
    /// spawned (nested bins are already flattened there). An unbound bin
    /// pad falls back to the bin's own mailbox, where the forwarded
    /// handshake raises the unbound-pad error.
    pub(crate) fn stream_endpoint(&self, child: &str, pad: &PadRef) -> StreamEndpoint {
        let entry = &self.children[child];
        match entry.terminals.get(&pad.name) {
            Some(endpoint) => endpoint.clone(),
            None => StreamEndpoint {
                mailbox: entry.mailbox.clone(),
                pad: pad.clone(),
            },
        }
    }

    /// Look up and validate one endpoint's pad declaration.
    pub(crate) fn endpoint_spec(
        &self,
        child: &str,
        pad: &PadRef,
        direction: PadDirection,
    ) -> Result<PadSpec> {
        let entry = self
            .children
            .get(child)
            .ok_or_else(|| LinkError::UnknownChild {
                child: child.to_string(),
            })?;
        let specs = match direction {
            PadDirection::Input => &entry.input_specs,
            PadDirection::Output => &entry.output_specs,
        };
        let spec = specs.get(&pad.name).ok_or_else(|| {
            // Declared with the other direction counts as a direction
            // error, not an unknown pad.
            let other = match direction {
                PadDirection::Input => &entry.output_specs,
                PadDirection::Output => &entry.input_specs,
            };
            if other.contains_key(&pad.name) {
                Error::from(LinkError::WrongDirection {
                    child: child.to_string(),
                    pad: pad.clone(),
                })
            } else {
                Error::from(LinkError::NoSuchPad {
                    child: child.to_string(),
                    pad: pad.clone(),
                })
            }
        })?;
        Ok(spec.clone())
    }

    /// Reserve a pad for a link, instantiating on-request pads and
    /// rejecting double links of static pads.
    pub(crate) fn claim_pad(&mut self, child: &str, pad: PadRef, spec: &PadSpec) -> Result<PadRef> {
        let pad = match spec.availability {
            PadAvailability::Always => {
                if pad.instance.is_some() {
                    return Err(LinkError::NoSuchPad {
                        child: child.to_string(),
                        pad,
                    }
                    .into());
                }
                pad
            }
            PadAvailability::OnRequest => match pad.instance {
                Some(_) => pad,
                None => {
                    self.next_pad_instance += 1;
                    PadRef::instance(pad.name, self.next_pad_instance)
                }
            },
        };
        if !self.linked_pads.insert((child.to_string(), pad.clone())) {
            return Err(LinkError::AlreadyLinked {
                child: child.to_string(),
                pad,
            }
            .into());
        }
        Ok(pad)
    }

    /// One endpoint answered; a link is live when both have, and a spec is
    /// live when all its links are.
    pub(crate) fn handle_link_response(&mut self, link: LinkId) -> Step {
        if self.bin_forward_link_response(link) {
            return Step::Continue;
        }
        let Some(pending) = self.pending_links.get_mut(&link) else {
            tracing::warn!(parent = %self.name, %link, "response for unknown link");
            return Step::Continue;
        };
        pending.to_respond -= 1;
        if pending.to_respond == 0 {
            let spec = pending.spec;
            self.pending_links.remove(&link);
            self.spec_link_done(spec);
        }
        Step::Continue
    }

    /// Count one resolved link against its spec.
    pub(crate) fn spec_link_done(&mut self, spec_ref: SpecRef) {
        let done = match self.pending_specs.get_mut(&spec_ref) {
            Some(spec) => {
                spec.links = spec.links.saturating_sub(1);
                spec.links == 0
            }
            None => false,
        };
        if done {
            self.init_playback_state(spec_ref);
        }
    }

    /// A fully linked spec: advance its children to the parent's current
    /// playback state (or the step in flight) and let the normal gating
    /// take over.
    pub(crate) fn init_playback_state(&mut self, spec_ref: SpecRef) {
        let Some(spec) = self.pending_specs.remove(&spec_ref) else {
            return;
        };
        let target = self.pending_step.unwrap_or(self.playback);
        tracing::debug!(parent = %self.name, %spec_ref, %target, "spec linked");
        for name in &spec.children {
            if let Some(child) = self.children.get(name) {
                child
                    .mailbox
                    .send(Message::ChangePlaybackState { target });
            }
        }
    }

    /// The linking watchdog fired; a still-pending spec aborts startup.
    pub(crate) fn handle_link_timeout(&mut self, spec_ref: SpecRef) -> Step {
        if !self.pending_specs.contains_key(&spec_ref) {
            return Step::Continue;
        }
        tracing::error!(parent = %self.name, %spec_ref, "linking timed out");
        self.begin_terminate(Some(LinkError::Timeout.into()))
    }
}
