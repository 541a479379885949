//! Child spawning, monitoring and crash handling.
//!
//! Every child runs as a Tokio task. A small watcher task awaits the
//! child's join handle and translates its outcome into a `ChildDown`
//! message — the monitor signal. Any unexpected down (crash, kill, panic,
//! or a normal exit nobody asked for) makes the parent tear down the rest
//! of the subtree and exit with a child-crash error.

use crate::element::actor::{spawn_element, SpawnedElement};
use crate::element::{Element, PadSpec, PlaybackState};
use crate::error::{Error, ExitReason, Result};
use crate::message::{Mailbox, Message, StreamEndpoint};
use crate::parent::actor::{ParentCore, Step};
use crate::parent::bin::spawn_bin;
use crate::parent::spec::{Bin, ChildDef};
use crate::pipeline::PipelineNotification;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::{AbortHandle, JoinHandle};

/// A supervised child, as the parent tracks it.
pub(crate) struct ChildEntry {
    pub mailbox: Mailbox,
    pub abort: AbortHandle,
    pub input_specs: HashMap<String, PadSpec>,
    pub output_specs: HashMap<String, PadSpec>,
    /// For bin children: proxy pad name → terminal stream endpoint.
    pub terminals: HashMap<String, StreamEndpoint>,
    pub playback: PlaybackState,
    pub alive: bool,
}

impl ParentCore {
    /// Spawn one child (element or bin) and register it. Fails on name
    /// collisions or when a bin's internal spec is invalid.
    pub(crate) fn add_child(&mut self, name: String, def: ChildDef) -> Result<()> {
        if self.children.contains_key(&name) {
            return Err(crate::error::LinkError::DuplicateChild { name }.into());
        }
        let spawned = match def {
            ChildDef::Element(element) => self.spawn_element_child(&name, element),
            ChildDef::Bin(bin) => self.spawn_bin_child(&name, bin)?,
        };
        watch_child(self.own.clone(), name.clone(), spawned.join);
        self.children.insert(
            name,
            ChildEntry {
                mailbox: spawned.mailbox,
                abort: spawned.abort,
                input_specs: spawned.input_specs,
                output_specs: spawned.output_specs,
                terminals: spawned.terminals,
                playback: PlaybackState::Stopped,
                alive: true,
            },
        );
        Ok(())
    }

    fn spawn_element_child(&self, name: &str, element: Box<dyn Element>) -> SpawnedElement {
        spawn_element(name, element, self.own.clone())
    }

    fn spawn_bin_child(&self, name: &str, bin: Bin) -> Result<SpawnedElement> {
        spawn_bin(name, bin, self)
    }

    /// Abort every spawned child. Used when startup fails halfway.
    pub(crate) fn abort_all(&mut self) {
        for child in self.children.values_mut() {
            child.abort.abort();
            child.alive = false;
        }
    }

    /// Monitor signal: a child actor is gone.
    pub(crate) fn handle_child_down(&mut self, child: String, reason: ExitReason) -> Step {
        match self.children.get_mut(&child) {
            Some(entry) => entry.alive = false,
            None => {
                tracing::warn!(parent = %self.name, %child, "down signal from unknown child");
                return Step::Continue;
            }
        }
        self.notify(PipelineNotification::ChildDown {
            child: child.clone(),
            reason: reason.clone(),
        });

        if self.terminating {
            if reason.is_crash() {
                tracing::warn!(parent = %self.name, %child, %reason, "child died during teardown");
            }
            if self.children.values().all(|c| !c.alive) {
                return self.finish();
            }
            return Step::Continue;
        }

        // Peer crash is distinguished from a normal (but unexpected) end by
        // the reason; both bring the subtree down.
        tracing::error!(
            parent = %self.name,
            %child,
            %reason,
            "child went down, shutting down the subtree"
        );
        self.begin_terminate(Some(Error::ChildCrash { child, reason }))
    }
}

/// Await a child task and report its fate to the parent.
fn watch_child(parent: Mailbox, child: String, join: JoinHandle<Result<()>>) {
    tokio::spawn(async move {
        let reason = match join.await {
            Ok(Ok(())) => ExitReason::Normal,
            // A toilet overflow is a forceful kill of the producer, not an
            // ordinary failure.
            Ok(Err(Error::ToiletOverflow { .. })) => ExitReason::Killed,
            Ok(Err(error)) => ExitReason::Failure(Arc::new(error)),
            Err(join_error) if join_error.is_cancelled() => ExitReason::Killed,
            Err(_) => ExitReason::Panicked,
        };
        parent.send(Message::ChildDown { child, reason });
    });
}
