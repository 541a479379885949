//! The parent actor core, shared by pipelines and bins.
//!
//! A parent supervises child actors: it spawns them, links their pads,
//! routes control messages, orchestrates playback transitions, and tears
//! the subtree down on termination or on a child crash. Bins run the same
//! core with a parent mailbox of their own and a set of proxy pads; the
//! root pipeline instead owns the notification broadcast.

use crate::element::PlaybackState;
use crate::error::{Error, Result};
use crate::message::{Mailbox, Message, SpecRef, UserPayload};
use crate::parent::bin::BinState;
use crate::parent::child_life::ChildEntry;
use crate::parent::link_handler::{PendingLink, PendingSpec};
use crate::pipeline::{PipelineConfig, PipelineNotification};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Outcome of dispatching one message in the parent loop.
pub(crate) enum Step {
    Continue,
    Done,
}

/// State of one parent actor (pipeline or bin).
pub(crate) struct ParentCore {
    pub(crate) name: Arc<str>,
    pub(crate) config: PipelineConfig,
    pub(crate) children: HashMap<String, ChildEntry>,
    /// Pads already taken by a link, per child.
    pub(crate) linked_pads: HashSet<(String, crate::element::PadRef)>,
    pub(crate) pending_links: HashMap<crate::message::LinkId, PendingLink>,
    pub(crate) pending_specs: HashMap<SpecRef, PendingSpec>,
    pub(crate) playback: PlaybackState,
    pub(crate) target: PlaybackState,
    /// The adjacent transition currently awaited from all children.
    pub(crate) pending_step: Option<PlaybackState>,
    pub(crate) own: Mailbox,
    /// The parent's mailbox; `None` at the pipeline root.
    pub(crate) parent: Option<Mailbox>,
    /// Notification broadcast; present at the pipeline root only.
    pub(crate) notifications: Option<broadcast::Sender<PipelineNotification>>,
    /// Bin-only state (proxy pads and forwarded links).
    pub(crate) bin: Option<BinState>,
    pub(crate) terminating: bool,
    pub(crate) pending_error: Option<Error>,
    /// Counter for instantiating on-request pads.
    pub(crate) next_pad_instance: u32,
}

impl ParentCore {
    /// Create the root pipeline core.
    pub(crate) fn new_root(
        name: &str,
        own: Mailbox,
        notifications: broadcast::Sender<PipelineNotification>,
        config: PipelineConfig,
    ) -> Self {
        Self::new(name, own, config, None, Some(notifications), None)
    }

    /// Create a bin core.
    pub(crate) fn new_bin(
        name: &str,
        own: Mailbox,
        parent: Mailbox,
        config: PipelineConfig,
        bin: BinState,
    ) -> Self {
        Self::new(name, own, config, Some(parent), None, Some(bin))
    }

    fn new(
        name: &str,
        own: Mailbox,
        config: PipelineConfig,
        parent: Option<Mailbox>,
        notifications: Option<broadcast::Sender<PipelineNotification>>,
        bin: Option<BinState>,
    ) -> Self {
        Self {
            name: Arc::from(name),
            config,
            children: HashMap::new(),
            linked_pads: HashSet::new(),
            pending_links: HashMap::new(),
            pending_specs: HashMap::new(),
            playback: PlaybackState::Stopped,
            target: PlaybackState::Stopped,
            pending_step: None,
            own,
            parent,
            notifications,
            bin,
            terminating: false,
            pending_error: None,
            next_pad_instance: 0,
        }
    }

    /// Parent main loop: drain the mailbox until the subtree is down.
    pub(crate) async fn run(mut self, rx: kanal::AsyncReceiver<Message>) -> Result<()> {
        tracing::debug!(parent = %self.name, "parent started");
        loop {
            let message = match rx.recv().await {
                Ok(message) => message,
                Err(_) => break,
            };
            match self.dispatch(message) {
                Step::Continue => {}
                Step::Done => break,
            }
        }
        tracing::debug!(parent = %self.name, "parent stopped");
        match self.pending_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Single entry point demultiplexing incoming messages to the
    /// controllers.
    fn dispatch(&mut self, message: Message) -> Step {
        match message {
            Message::PlaybackStateChanged { child, state } => {
                self.child_playback_changed(child, state)
            }
            Message::ChangePlaybackState { target } => self.change_playback_state(target),
            Message::Notification { child, payload } => self.child_notification(child, payload),
            Message::StartOfStream { child, pad } => self.child_start_of_stream(child, pad),
            Message::EndOfStream { child, pad } => self.child_end_of_stream(child, pad),
            Message::LogMetadata { entries } => self.forward_log_metadata(entries),
            Message::ClockRatioUpdate { ratio } => self.forward_clock_ratio(ratio),
            Message::LinkResponse { link } => self.handle_link_response(link),
            Message::LinkTimeout { spec } => self.handle_link_timeout(spec),
            Message::ChildDown { child, reason } => self.handle_child_down(child, reason),
            Message::HandleLink(link) => self.bin_handle_link(*link),
            Message::MessageChild { child, payload } => self.route_message_child(child, payload),
            Message::Terminate => self.begin_terminate(None),
            Message::TerminateTimeout => self.handle_terminate_timeout(),
            Message::TimerTick { timer } => {
                // Parents run no timers of their own.
                tracing::trace!(parent = %self.name, %timer, "ignoring timer tick");
                Step::Continue
            }
            other => {
                tracing::warn!(
                    parent = %self.name,
                    message = other.tag(),
                    "unrecognized message"
                );
                Step::Continue
            }
        }
    }

    // ------------------------------------------------------------------
    // Termination and crash propagation
    // ------------------------------------------------------------------

    /// Start tearing the subtree down, optionally recording the error the
    /// parent will exit with.
    pub(crate) fn begin_terminate(&mut self, error: Option<Error>) -> Step {
        if self.terminating {
            if self.pending_error.is_none() {
                self.pending_error = error;
            }
            return Step::Continue;
        }
        self.terminating = true;
        self.pending_error = error;

        let alive: Vec<&ChildEntry> = self.children.values().filter(|c| c.alive).collect();
        if alive.is_empty() {
            return self.finish();
        }
        for child in alive {
            child.mailbox.send(Message::Terminate);
        }
        let own = self.own.clone();
        let grace = self.config.terminate_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            own.send(Message::TerminateTimeout);
        });
        Step::Continue
    }

    /// Grace period over: forcefully kill whatever is still up.
    fn handle_terminate_timeout(&mut self) -> Step {
        if !self.terminating {
            return Step::Continue;
        }
        let stragglers: Vec<String> = self
            .children
            .iter()
            .filter(|(_, c)| c.alive)
            .map(|(n, _)| n.clone())
            .collect();
        if stragglers.is_empty() {
            return Step::Continue;
        }
        tracing::warn!(
            parent = %self.name,
            children = ?stragglers,
            "children did not exit within the grace period, aborting them"
        );
        for name in &stragglers {
            if let Some(child) = self.children.get_mut(name) {
                child.abort.abort();
                child.alive = false;
            }
        }
        self.finish()
    }

    /// All children are down; emit the final notification and stop.
    pub(crate) fn finish(&mut self) -> Step {
        self.notify(PipelineNotification::Terminated);
        Step::Done
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    /// Route an opaque payload to a child, descending through bins on
    /// `/`-separated paths.
    fn route_message_child(&mut self, child: String, payload: UserPayload) -> Step {
        let (head, rest) = match child.split_once('/') {
            Some((head, rest)) => (head.to_string(), Some(rest.to_string())),
            None => (child, None),
        };
        match self.children.get(&head) {
            Some(entry) => match rest {
                Some(rest) => entry.mailbox.send(Message::MessageChild {
                    child: rest,
                    payload,
                }),
                None => entry.mailbox.send(Message::Other { payload }),
            },
            None => {
                tracing::warn!(
                    parent = %self.name,
                    child = %head,
                    "message_child for unknown child"
                );
            }
        }
        Step::Continue
    }

    fn forward_log_metadata(&mut self, entries: Vec<(String, String)>) -> Step {
        for child in self.children.values().filter(|c| c.alive) {
            child.mailbox.send(Message::LogMetadata {
                entries: entries.clone(),
            });
        }
        Step::Continue
    }

    fn forward_clock_ratio(&mut self, ratio: f64) -> Step {
        for child in self.children.values().filter(|c| c.alive) {
            child.mailbox.send(Message::ClockRatioUpdate { ratio });
        }
        Step::Continue
    }

    // ------------------------------------------------------------------
    // Upward reporting
    // ------------------------------------------------------------------

    /// Publish a notification at the root; bins have no broadcast and
    /// report upward through their parent mailbox instead.
    pub(crate) fn notify(&self, notification: PipelineNotification) {
        if let Some(sender) = &self.notifications {
            let _ = sender.send(notification);
        }
    }

    /// Prefix a child name with this bin's name for upward reports.
    pub(crate) fn path_to(&self, child: &str) -> String {
        format!("{}/{child}", self.name)
    }
}
