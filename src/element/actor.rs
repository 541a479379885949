//! The element actor: mailbox loop, dispatch and lifecycle.
//!
//! Each element runs as one Tokio task draining a private mailbox. Message
//! handling is fully synchronous — a callback executes to completion and
//! may not await — so the actor only suspends between messages.

use crate::element::controllers::Forwardable;
use crate::element::demand_handler::DelayedDemand;
use crate::element::input_buffer::InputBuffer;
use crate::element::pad_model::{PadData, PadModel, Peer};
use crate::element::state_machine::Transition;
use crate::element::timer::TimerEntry;
use crate::element::{
    Actions, CallbackContext, CallbackResult, Element, PadDirection, PadInfo, PadMode, PadRef,
    PadSpec, PlaybackState, ShutdownReason,
};
use crate::error::{Error, Result};
use crate::message::{HandleLink, Mailbox, Message, StreamEndpoint, UserPayload};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Outcome of handling one message.
#[derive(Debug)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

/// State of one element actor.
pub(crate) struct ElementCore {
    pub(crate) name: Arc<str>,
    pub(crate) element: Box<dyn Element>,
    pub(crate) pads: PadModel,
    pub(crate) playback: PlaybackState,
    /// Target of the in-flight transition, cleared on completion.
    pub(crate) pending_playback: Option<PlaybackState>,
    /// Re-entrance guard: true while a drain of an input queue is running.
    pub(crate) supplying_demand: bool,
    /// Guard against recursive drains of the delayed set.
    pub(crate) draining_delayed: bool,
    pub(crate) delayed_demands: HashSet<(PadRef, DelayedDemand)>,
    pub(crate) parent: Mailbox,
    pub(crate) own: Mailbox,
    pub(crate) timers: HashMap<String, TimerEntry>,
    pub(crate) clock_ratio: f64,
    pub(crate) log_metadata: Vec<(String, String)>,
    pub(crate) rng: SmallRng,
}

impl ElementCore {
    pub(crate) fn new(
        name: &str,
        element: Box<dyn Element>,
        input_pads: Vec<PadSpec>,
        output_pads: Vec<PadSpec>,
        parent: Mailbox,
        own: Mailbox,
    ) -> Self {
        let name: Arc<str> = Arc::from(name);
        Self {
            pads: PadModel::new(name.clone(), input_pads, output_pads),
            name,
            element,
            playback: PlaybackState::Stopped,
            pending_playback: None,
            supplying_demand: false,
            draining_delayed: false,
            delayed_demands: HashSet::new(),
            parent,
            own,
            timers: HashMap::new(),
            clock_ratio: 1.0,
            log_metadata: Vec::new(),
            rng: SmallRng::from_entropy(),
        }
    }

    /// Actor main loop. Runs until terminated, the parent goes away, or a
    /// fatal error crashes the element.
    pub(crate) async fn run(mut self, rx: kanal::AsyncReceiver<Message>) -> Result<()> {
        tracing::debug!(element = %self.name, "element started");

        let ctx = self.context();
        let init = self.element.handle_init(&ctx);
        match self.interpret("handle_init", init, None) {
            Ok(()) => {}
            Err(e) => return self.crash(e),
        }

        loop {
            let message = match rx.recv().await {
                Ok(message) => message,
                // Parent gone without terminating us; treat as shutdown.
                Err(_) => break,
            };
            match self.handle_message(message) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(e) => return self.crash(e),
            }
        }

        self.stop_all_timers();
        self.element.handle_shutdown(ShutdownReason::Normal);
        tracing::debug!(element = %self.name, "element stopped");
        Ok(())
    }

    fn crash(mut self, error: Error) -> Result<()> {
        tracing::error!(
            element = %self.name,
            metadata = ?self.log_metadata,
            "element crashed: {error}"
        );
        self.stop_all_timers();
        self.element.handle_shutdown(ShutdownReason::Crash);
        Err(error)
    }

    /// Single dispatch point for everything arriving in the mailbox.
    fn handle_message(&mut self, message: Message) -> Result<Flow> {
        match message {
            Message::Caps { pad, caps } => self.incoming_caps(pad, caps)?,
            Message::Event { pad, event } => self.incoming_event(pad, event)?,
            Message::Buffers { pad, buffers } => self.incoming_buffers(pad, buffers)?,
            Message::Demand { pad, size } => self.incoming_demand(pad, size)?,
            Message::HandleLink(link) => self.handle_link(*link)?,
            Message::ChangePlaybackState { target } => self.change_playback_state(target)?,
            Message::TimerTick { timer } => self.handle_timer_tick(timer)?,
            Message::ClockRatioUpdate { ratio } => self.handle_clock_ratio_update(ratio),
            Message::LogMetadata { entries } => self.log_metadata.extend(entries),
            Message::Other { payload } => self.handle_other(payload)?,
            Message::Terminate => return Ok(Flow::Stop),
            other => {
                tracing::warn!(
                    element = %self.name,
                    message = other.tag(),
                    "ignoring message not addressed to elements"
                );
            }
        }
        Ok(Flow::Continue)
    }

    // ------------------------------------------------------------------
    // Incoming stream items
    // ------------------------------------------------------------------

    fn incoming_caps(&mut self, pad: PadRef, caps: crate::format::Caps) -> Result<()> {
        self.store_item(&pad, |input| input.store_caps(caps))?;
        self.after_store(pad)
    }

    fn incoming_event(&mut self, pad: PadRef, event: crate::event::Event) -> Result<()> {
        self.store_item(&pad, |input| input.store_event(event))?;
        self.after_store(pad)
    }

    fn incoming_buffers(&mut self, pad: PadRef, buffers: Vec<crate::buffer::Buffer>) -> Result<()> {
        self.store_item(&pad, |input| input.store_buffers(buffers))?;
        self.after_store(pad)
    }

    /// Queue one incoming item on an input pad, validating the pad exists,
    /// points the right way, and has completed its link handshake.
    fn store_item(&mut self, pad: &PadRef, store: impl FnOnce(&mut InputBuffer)) -> Result<()> {
        let name = self.name.to_string();
        let data = self.pads.get_mut(pad)?;
        if data.direction() != PadDirection::Input {
            return Err(Error::contract(
                name,
                format!("stream item received on output pad `{pad}`"),
            ));
        }
        match data.input.as_mut() {
            Some(input) => {
                store(input);
                Ok(())
            }
            None => Err(Error::contract(
                name,
                format!("stream item arrived on unlinked pad `{pad}`"),
            )),
        }
    }

    /// After an item lands in an input queue: pull pads supply the current
    /// demand, push pads drain everything that is queued. Nothing is
    /// delivered to callbacks before the element plays.
    fn after_store(&mut self, pad: PadRef) -> Result<()> {
        if self.playback != PlaybackState::Playing {
            return Ok(());
        }
        match self.pads.get(&pad)?.mode {
            PadMode::Pull => self.supply_demand(pad, None),
            PadMode::Push => self.drain_push_pad(pad),
        }
    }

    fn incoming_demand(&mut self, pad: PadRef, size: u64) -> Result<()> {
        {
            let data = self.pads.get_mut(&pad)?;
            if data.direction() != PadDirection::Output {
                return Err(Error::contract(
                    self.name.to_string(),
                    format!("demand received on input pad `{pad}`"),
                ));
            }
            data.demand = data.demand.saturating_add(size);
        }
        if self.playback == PlaybackState::Playing {
            self.handle_redemand(pad)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Linking
    // ------------------------------------------------------------------

    fn handle_link(&mut self, link: HandleLink) -> Result<()> {
        let spec = self
            .pads
            .spec(&link.pad.name)
            .ok_or_else(|| Error::UnknownPad {
                element: self.name.to_string(),
                pad: link.pad.clone(),
            })?
            .clone();

        let mut data = PadData::new(spec);
        data.mode = link.mode;
        data.unit = link.unit;
        data.peer = Some(Peer {
            pad: link.peer_pad,
            mailbox: link.peer,
        });
        data.toilet = link.toilet;
        if link.direction == PadDirection::Input {
            data.input = Some(InputBuffer::new(link.unit, link.input));
        }
        self.pads.insert(link.pad.clone(), data);

        tracing::debug!(element = %self.name, pad = %link.pad, "pad linked");
        link.reply_to.send(Message::LinkResponse { link: link.link });

        // A pad linked into an already playing element goes live at once.
        if self.playback == PlaybackState::Playing && link.direction == PadDirection::Input {
            self.arm_input_pad(link.pad)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Playback
    // ------------------------------------------------------------------

    /// Walk the state machine toward `target`, one adjacent transition at a
    /// time, reporting each completed step to the parent. Requesting the
    /// current state is a no-op.
    fn change_playback_state(&mut self, target: PlaybackState) -> Result<()> {
        while let Some(next) = self.playback.step_toward(target) {
            let transition = Transition {
                from: self.playback,
                to: next,
            };
            self.pending_playback = Some(next);
            let ctx = self.context();
            let result = match (transition.from, next) {
                (PlaybackState::Stopped, PlaybackState::Prepared) => {
                    self.element.handle_stopped_to_prepared(&ctx)
                }
                (PlaybackState::Prepared, PlaybackState::Playing) => {
                    self.element.handle_prepared_to_playing(&ctx)
                }
                (PlaybackState::Playing, PlaybackState::Prepared) => {
                    self.element.handle_playing_to_prepared(&ctx)
                }
                _ => self.element.handle_prepared_to_stopped(&ctx),
            };
            self.interpret(transition.callback_name(), result, None)?;
            // Complete automatically unless an action already did.
            self.complete_playback_change()?;
        }
        Ok(())
    }

    /// Adopt the pending state, arm pads if playback begins, and report to
    /// the parent. Called by the action interpreter for
    /// `PlaybackChangeSuccessful` and automatically after each transition
    /// callback; extra calls are ignored.
    pub(crate) fn complete_playback_change(&mut self) -> Result<()> {
        let Some(next) = self.pending_playback.take() else {
            return Ok(());
        };
        let from = self.playback;
        self.playback = next;
        tracing::debug!(element = %self.name, %from, to = %next, "playback changed");
        if from == PlaybackState::Prepared && next == PlaybackState::Playing {
            self.arm_pads()?;
        }
        self.parent.send(Message::PlaybackStateChanged {
            child: self.name.to_string(),
            state: next,
        });
        Ok(())
    }

    /// Bring every linked pad live. Input pull pads place their initial
    /// demand and flush anything queued, push pads just flush, and output
    /// pads with demand that piled up before playback get serviced.
    fn arm_pads(&mut self) -> Result<()> {
        for pad in self.pads.linked_inputs() {
            self.arm_input_pad(pad)?;
        }
        for pad in self.pads.linked_refs(PadDirection::Output) {
            if self.pads.get(&pad)?.demand > 0 {
                self.handle_redemand(pad)?;
            }
        }
        Ok(())
    }

    fn arm_input_pad(&mut self, pad: PadRef) -> Result<()> {
        match self.pads.get(&pad)?.mode {
            PadMode::Pull => {
                let data = self.pads.get_mut(&pad)?;
                if let (Some(input), Some(peer)) = (data.input.as_mut(), data.peer.as_ref()) {
                    input.demand_deficit(&peer.mailbox, &peer.pad);
                }
                self.supply_demand(pad, None)
            }
            PadMode::Push => self.drain_push_pad(pad),
        }
    }

    // ------------------------------------------------------------------
    // Remaining control plane
    // ------------------------------------------------------------------

    fn handle_other(&mut self, payload: UserPayload) -> Result<()> {
        let ctx = self.context();
        let result = self.element.handle_other(payload, &ctx);
        self.interpret("handle_other", result, None)
    }

    // ------------------------------------------------------------------
    // Shared plumbing
    // ------------------------------------------------------------------

    /// Build the read-only context passed to callbacks.
    pub(crate) fn context(&self) -> CallbackContext {
        let pads = self
            .pads
            .iter()
            .filter(|(_, data)| data.is_linked())
            .map(|(pad, data)| {
                (
                    pad.clone(),
                    PadInfo {
                        direction: data.direction(),
                        mode: data.mode,
                        unit: data.unit,
                        caps: data.caps.clone(),
                        demand: data.demand,
                    },
                )
            })
            .collect();
        CallbackContext::new(self.name.to_string(), self.playback, pads)
    }

    /// Wrap a callback result and run its actions.
    pub(crate) fn interpret(
        &mut self,
        callback: &'static str,
        result: CallbackResult,
        forwardable: Option<(&PadRef, &Forwardable)>,
    ) -> Result<()> {
        let actions = self.wrap_callback(callback, result)?;
        self.process_actions(actions, forwardable)
    }

    pub(crate) fn wrap_callback(
        &self,
        callback: &'static str,
        result: CallbackResult,
    ) -> Result<Actions> {
        result.map_err(|e| Error::Callback {
            element: self.name.to_string(),
            callback,
            reason: e.0,
        })
    }
}

/// A spawned element, as the parent sees it.
pub(crate) struct SpawnedElement {
    pub mailbox: Mailbox,
    pub abort: tokio::task::AbortHandle,
    pub join: tokio::task::JoinHandle<Result<()>>,
    pub input_specs: HashMap<String, PadSpec>,
    pub output_specs: HashMap<String, PadSpec>,
    /// For bins: pad name → the terminal stream endpoint behind the
    /// proxy pad. Empty for plain elements (their pads are their own).
    pub terminals: HashMap<String, StreamEndpoint>,
}

/// Spawn one element actor. Pad declarations are captured before the
/// element moves into its task so the parent can validate links without
/// asking the actor.
pub(crate) fn spawn_element(
    name: &str,
    element: Box<dyn Element>,
    parent: Mailbox,
) -> SpawnedElement {
    let input_pads = element.known_input_pads();
    let output_pads = element.known_output_pads();
    let input_specs = input_pads
        .iter()
        .map(|s| (s.name.clone(), s.clone()))
        .collect();
    let output_specs = output_pads
        .iter()
        .map(|s| (s.name.clone(), s.clone()))
        .collect();

    let (mailbox, rx) = Mailbox::channel(name);
    let core = ElementCore::new(name, element, input_pads, output_pads, parent, mailbox.clone());
    let join = tokio::spawn(core.run(rx.to_async()));
    let abort = join.abort_handle();

    SpawnedElement {
        mailbox,
        abort,
        join,
        input_specs,
        output_specs,
        terminals: HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::element::input_buffer::InputBufferConfig;
    use crate::element::{Action, CallbackResult, DemandUnit, PadMode, Toilet};
    use crate::format::Caps;
    use crate::message::LinkId;
    use smallvec::smallvec;
    use std::sync::{Arc, Mutex};

    /// A sink that records processed sequence numbers and re-enters the
    /// demand machinery from inside `handle_process`.
    struct DeferringSink {
        processed: Arc<Mutex<Vec<u64>>>,
        initial: u64,
    }

    impl Element for DeferringSink {
        fn known_input_pads(&self) -> Vec<PadSpec> {
            vec![PadSpec::input("sink")]
        }

        fn handle_prepared_to_playing(&mut self, _ctx: &CallbackContext) -> CallbackResult {
            Ok(smallvec![Action::demand("sink", self.initial)])
        }

        fn handle_process(
            &mut self,
            _pad: &PadRef,
            buffers: Vec<Buffer>,
            _ctx: &CallbackContext,
        ) -> CallbackResult {
            let mut processed = self.processed.lock().unwrap();
            processed.extend(buffers.iter().map(|b| b.metadata().sequence));
            let count = buffers.len() as i64;
            drop(processed);
            Ok(smallvec![
                Action::Redemand { pad: "sink".into() },
                Action::demand_delta("sink", count),
            ])
        }
    }

    struct Harness {
        core: ElementCore,
        parent_rx: kanal::Receiver<Message>,
        peer: Mailbox,
        peer_rx: kanal::Receiver<Message>,
    }

    fn sink_harness(element: Box<dyn Element>, mode: PadMode, toilet: Option<Toilet>) -> Harness {
        let input_pads = element.known_input_pads();
        let output_pads = element.known_output_pads();
        let (parent, parent_rx) = Mailbox::channel("parent");
        let (own, _own_rx) = Mailbox::channel("sink");
        let (peer, peer_rx) = Mailbox::channel("peer");
        let mut core = ElementCore::new(
            "sink",
            element,
            input_pads,
            output_pads,
            parent,
            own.clone(),
        );
        core.handle_message(Message::HandleLink(Box::new(HandleLink {
            link: LinkId::new(),
            pad: "sink".into(),
            direction: PadDirection::Input,
            mode,
            unit: DemandUnit::Buffers,
            peer_pad: "src".into(),
            peer: peer.clone(),
            toilet,
            input: InputBufferConfig { preferred_size: 10 },
            reply_to: core.parent.clone(),
        })))
        .unwrap();
        Harness {
            core,
            parent_rx,
            peer,
            peer_rx,
        }
    }

    fn drain_parent(rx: &kanal::Receiver<Message>) -> Vec<&'static str> {
        let mut tags = Vec::new();
        while let Ok(Some(message)) = rx.try_recv() {
            tags.push(message.tag());
        }
        tags
    }

    #[test]
    fn test_playback_walk_reports_each_step() {
        struct Bare;
        impl Element for Bare {}
        let (parent, parent_rx) = Mailbox::channel("parent");
        let (own, _own_rx) = Mailbox::channel("el");
        let mut core = ElementCore::new("el", Box::new(Bare), vec![], vec![], parent, own);

        core.handle_message(Message::ChangePlaybackState {
            target: PlaybackState::Playing,
        })
        .unwrap();

        let mut states = Vec::new();
        while let Ok(Some(message)) = parent_rx.try_recv() {
            if let Message::PlaybackStateChanged { state, .. } = message {
                states.push(state);
            }
        }
        assert_eq!(states, vec![PlaybackState::Prepared, PlaybackState::Playing]);
        assert_eq!(core.playback, PlaybackState::Playing);

        // Same-state request is a no-op: no further reports.
        core.handle_message(Message::ChangePlaybackState {
            target: PlaybackState::Playing,
        })
        .unwrap();
        assert!(parent_rx.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_link_handshake_replies_and_arms() {
        let processed = Arc::new(Mutex::new(Vec::new()));
        let mut h = sink_harness(
            Box::new(DeferringSink {
                processed,
                initial: 4,
            }),
            PadMode::Pull,
            None,
        );
        assert!(drain_parent(&h.parent_rx).contains(&"link_response"));

        h.core
            .handle_message(Message::ChangePlaybackState {
                target: PlaybackState::Playing,
            })
            .unwrap();

        // Arming a pull input places the initial watermark demand.
        let Ok(Some(Message::Demand { pad, size })) = h.peer_rx.try_recv() else {
            panic!("expected a demand for the peer");
        };
        assert_eq!(pad, PadRef::new("src"));
        assert_eq!(size, 10);
    }

    #[test]
    fn test_reentrant_redemand_is_deferred_and_order_preserved() {
        let processed = Arc::new(Mutex::new(Vec::new()));
        let mut h = sink_harness(
            Box::new(DeferringSink {
                processed: processed.clone(),
                initial: 4,
            }),
            PadMode::Pull,
            None,
        );
        h.core
            .handle_message(Message::ChangePlaybackState {
                target: PlaybackState::Playing,
            })
            .unwrap();

        h.core
            .handle_message(Message::Caps {
                pad: "sink".into(),
                caps: Caps::new("test/raw"),
            })
            .unwrap();
        for sequence in 0..6 {
            h.core
                .handle_message(Message::Buffers {
                    pad: "sink".into(),
                    buffers: vec![Buffer::from_sequence(sequence)],
                })
                .unwrap();
        }

        // Every drain re-entered the machinery, yet delivery order equals
        // emission order and nothing is left parked.
        assert_eq!(*processed.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
        assert!(h.core.delayed_demands.is_empty());
        assert!(!h.core.supplying_demand);
    }

    #[test]
    fn test_buffer_before_caps_is_a_contract_error() {
        let processed = Arc::new(Mutex::new(Vec::new()));
        let mut h = sink_harness(
            Box::new(DeferringSink {
                processed,
                initial: 4,
            }),
            PadMode::Pull,
            None,
        );
        h.core
            .handle_message(Message::ChangePlaybackState {
                target: PlaybackState::Playing,
            })
            .unwrap();

        let error = h
            .core
            .handle_message(Message::Buffers {
                pad: "sink".into(),
                buffers: vec![Buffer::from_sequence(0)],
            })
            .unwrap_err();
        let text = error.to_string();
        assert!(text.contains("buffer"), "{text}");
        assert!(text.contains("caps were not sent"), "{text}");
    }

    #[test]
    fn test_push_drain_credits_the_toilet() {
        let toilet = Toilet::new(100);
        let processed = Arc::new(Mutex::new(Vec::new()));
        let mut h = sink_harness(
            Box::new(DeferringSink {
                processed: processed.clone(),
                initial: 0,
            }),
            PadMode::Push,
            Some(toilet.clone()),
        );
        h.core
            .handle_message(Message::ChangePlaybackState {
                target: PlaybackState::Playing,
            })
            .unwrap();

        // Producer side accounted three units; draining them subtracts.
        toilet.add(3).unwrap();
        h.core
            .handle_message(Message::Caps {
                pad: "sink".into(),
                caps: Caps::new("test/raw"),
            })
            .unwrap();
        h.core
            .handle_message(Message::Buffers {
                pad: "sink".into(),
                buffers: (0..3).map(Buffer::from_sequence).collect(),
            })
            .unwrap();

        assert_eq!(toilet.size(), 0);
        assert_eq!(*processed.lock().unwrap(), vec![0, 1, 2]);
        let _ = h.peer;
    }
}
