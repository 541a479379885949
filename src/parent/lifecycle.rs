//! Parent playback orchestration and child notification bubbling.
//!
//! The parent walks its own playback state toward a target one adjacent
//! step at a time. A step is broadcast to all (non-pending) children and
//! completes only when every child reports the new state; then the parent
//! adopts it, reports upward, and issues the next step. Children spawned
//! by a spec that is still linking join the walk when the spec resolves,
//! and the gate waits for them.

use crate::element::{PadRef, PlaybackState};
use crate::message::{Message, UserPayload};
use crate::parent::actor::{ParentCore, Step};
use crate::pipeline::PipelineNotification;

impl ParentCore {
    /// A playback request from the public API or from the outer parent.
    pub(crate) fn change_playback_state(&mut self, target: PlaybackState) -> Step {
        self.target = target;
        self.kick_playback();
        Step::Continue
    }

    /// Issue the next adjacent step toward the target, unless one is
    /// already in flight. Requesting the current state is a no-op.
    pub(crate) fn kick_playback(&mut self) {
        if self.terminating || self.pending_step.is_some() {
            return;
        }
        let Some(next) = self.playback.step_toward(self.target) else {
            return;
        };
        self.pending_step = Some(next);
        tracing::debug!(parent = %self.name, step = %next, "requesting playback step");
        let pending_children = self.pending_spec_children();
        for (name, child) in self.children.iter().filter(|(_, c)| c.alive) {
            if !pending_children.contains(name) {
                child
                    .mailbox
                    .send(Message::ChangePlaybackState { target: next });
            }
        }
        self.maybe_complete_step();
    }

    /// A child finished one transition.
    pub(crate) fn child_playback_changed(&mut self, child: String, state: PlaybackState) -> Step {
        match self.children.get_mut(&child) {
            Some(entry) => entry.playback = state,
            None => {
                tracing::warn!(parent = %self.name, %child, "playback report from unknown child");
                return Step::Continue;
            }
        }
        self.notify(PipelineNotification::ChildPlaybackChanged {
            child: child.clone(),
            state,
        });
        self.maybe_complete_step();
        Step::Continue
    }

    /// Complete the in-flight step once **all** live children have reached
    /// it (or moved past it in the direction of travel).
    pub(crate) fn maybe_complete_step(&mut self) {
        let Some(next) = self.pending_step else {
            return;
        };
        let upward = next > self.playback;
        let ready = self
            .children
            .values()
            .filter(|c| c.alive)
            .all(|c| if upward { c.playback >= next } else { c.playback <= next });
        if !ready {
            return;
        }
        self.pending_step = None;
        let from = self.playback;
        self.playback = next;
        tracing::debug!(parent = %self.name, %from, to = %next, "playback changed");

        match &self.parent {
            Some(parent) => parent.send(Message::PlaybackStateChanged {
                child: self.name.to_string(),
                state: next,
            }),
            None => self.notify(PipelineNotification::PlaybackChanged(next)),
        }
        self.kick_playback();
    }

    // ------------------------------------------------------------------
    // Child reports bubbling upward
    // ------------------------------------------------------------------

    /// A notification from a child: broadcast at the root, forward with a
    /// path-prefixed child name inside a bin.
    pub(crate) fn child_notification(&mut self, child: String, payload: UserPayload) -> Step {
        match &self.parent {
            Some(parent) => parent.send(Message::Notification {
                child: self.path_to(&child),
                payload,
            }),
            None => self.notify(PipelineNotification::Notification { child, payload }),
        }
        Step::Continue
    }

    /// A child saw the start of stream on one of its input pads.
    pub(crate) fn child_start_of_stream(&mut self, child: String, pad: PadRef) -> Step {
        tracing::debug!(parent = %self.name, %child, %pad, "start of stream");
        match &self.parent {
            Some(parent) => parent.send(Message::StartOfStream {
                child: self.path_to(&child),
                pad,
            }),
            None => self.notify(PipelineNotification::StartOfStream { child, pad }),
        }
        Step::Continue
    }

    /// A child saw the end of stream on one of its input pads.
    pub(crate) fn child_end_of_stream(&mut self, child: String, pad: PadRef) -> Step {
        tracing::debug!(parent = %self.name, %child, %pad, "end of stream");
        match &self.parent {
            Some(parent) => parent.send(Message::EndOfStream {
                child: self.path_to(&child),
                pad,
            }),
            None => self.notify(PipelineNotification::EndOfStream { child, pad }),
        }
        Step::Continue
    }

    /// Names of children belonging to specs that are still linking; they
    /// receive playback commands when their spec resolves.
    fn pending_spec_children(&self) -> std::collections::HashSet<String> {
        self.pending_specs
            .values()
            .flat_map(|spec| spec.children.iter().cloned())
            .collect()
    }
}
