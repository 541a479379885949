//! The public pipeline API.
//!
//! [`Pipeline::start`] spawns the supervising actor and all children from a
//! [`Spec`] and returns a [`PipelineHandle`] for driving playback,
//! messaging children and terminating. Runtime observations — playback
//! changes, stream boundaries, notifications, child deaths — are published
//! on a broadcast channel that any number of [`NotificationReceiver`]s can
//! subscribe to.

use crate::clock::Clock;
use crate::element::{PadRef, PlaybackState};
use crate::error::{Error, ExitReason, Result};
use crate::message::{Mailbox, Message, UserPayload};
use crate::parent::actor::ParentCore;
use crate::parent::Spec;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Configuration for a pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Default input-buffer watermark, in demand units.
    pub input_preferred_size: u64,
    /// Default toilet capacity for push links, in demand units.
    pub toilet_capacity: i64,
    /// How long the link handshake of one spec may take.
    pub link_timeout: Duration,
    /// Grace period between asking a child to terminate and killing it.
    pub terminate_grace: Duration,
    /// Clock whose rate-ratio updates are fanned out to all elements.
    pub clock: Option<Clock>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_preferred_size: crate::element::input_buffer::DEFAULT_PREFERRED_SIZE,
            toilet_capacity: 200,
            link_timeout: Duration::from_secs(5),
            terminate_grace: Duration::from_secs(5),
            clock: None,
        }
    }
}

/// Options for [`PipelineHandle::terminate`].
#[derive(Clone, Copy, Debug)]
pub struct TerminateOptions {
    /// Wait for the subtree to finish shutting down.
    pub blocking: bool,
}

impl Default for TerminateOptions {
    fn default() -> Self {
        Self { blocking: true }
    }
}

/// Events published by the pipeline during execution.
#[derive(Clone)]
pub enum PipelineNotification {
    /// The pipeline finished a playback transition.
    PlaybackChanged(PlaybackState),
    /// A direct child finished a playback transition.
    ChildPlaybackChanged {
        /// Child name.
        child: String,
        /// The state it reached.
        state: PlaybackState,
    },
    /// A child saw the start of stream on an input pad.
    StartOfStream {
        /// Child name (`bin/inner` for nested children).
        child: String,
        /// The input pad.
        pad: PadRef,
    },
    /// A child saw the end of stream on an input pad.
    EndOfStream {
        /// Child name (`bin/inner` for nested children).
        child: String,
        /// The input pad.
        pad: PadRef,
    },
    /// A child emitted a notification action.
    Notification {
        /// Child name.
        child: String,
        /// The opaque payload.
        payload: UserPayload,
    },
    /// A child actor went down.
    ChildDown {
        /// Child name.
        child: String,
        /// Why it went down.
        reason: ExitReason,
    },
    /// The pipeline finished tearing down.
    Terminated,
}

impl fmt::Debug for PipelineNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineNotification::PlaybackChanged(state) => {
                write!(f, "PlaybackChanged({state})")
            }
            PipelineNotification::ChildPlaybackChanged { child, state } => {
                write!(f, "ChildPlaybackChanged({child}, {state})")
            }
            PipelineNotification::StartOfStream { child, pad } => {
                write!(f, "StartOfStream({child}, {pad})")
            }
            PipelineNotification::EndOfStream { child, pad } => {
                write!(f, "EndOfStream({child}, {pad})")
            }
            PipelineNotification::Notification { child, .. } => {
                write!(f, "Notification({child})")
            }
            PipelineNotification::ChildDown { child, reason } => {
                write!(f, "ChildDown({child}, {reason})")
            }
            PipelineNotification::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Receiver for pipeline notifications.
///
/// Multiple receivers can be created from a single handle.
pub struct NotificationReceiver {
    receiver: broadcast::Receiver<PipelineNotification>,
}

impl NotificationReceiver {
    /// Receive the next notification.
    ///
    /// Returns `None` once the pipeline is gone. A lagging receiver skips
    /// to the oldest retained notification.
    pub async fn recv(&mut self) -> Option<PipelineNotification> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) => return Some(notification),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification receiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive a notification without blocking.
    pub fn try_recv(&mut self) -> Option<PipelineNotification> {
        loop {
            match self.receiver.try_recv() {
                Ok(notification) => return Some(notification),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// A stream adapter for notifications, for use with async iteration.
pub struct NotificationStream {
    receiver: NotificationReceiver,
}

impl NotificationStream {
    /// Wrap a receiver into a [`futures::Stream`].
    pub fn new(receiver: NotificationReceiver) -> Self {
        Self { receiver }
    }
}

impl futures::Stream for NotificationStream {
    type Item = PipelineNotification;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let fut = self.receiver.recv();
        tokio::pin!(fut);
        fut.poll(cx)
    }
}

/// Entry point for running pipelines.
pub struct Pipeline;

impl Pipeline {
    /// Start a pipeline from a spec with default configuration.
    ///
    /// Must be called within a Tokio runtime. Children are spawned and the
    /// link handshake begins immediately; the pipeline starts in
    /// [`PlaybackState::Stopped`].
    pub fn start(spec: Spec) -> Result<PipelineHandle> {
        Self::start_with_config(spec, PipelineConfig::default())
    }

    /// Start a pipeline with custom configuration.
    pub fn start_with_config(spec: Spec, config: PipelineConfig) -> Result<PipelineHandle> {
        let (mailbox, rx) = Mailbox::channel("pipeline");
        let (notifications, _) = broadcast::channel(256);

        if let Some(clock) = &config.clock {
            spawn_clock_forwarder(clock, mailbox.clone());
        }

        let mut core = ParentCore::new_root("pipeline", mailbox.clone(), notifications.clone(), config);
        if let Err(error) = core.start_spec(spec) {
            core.abort_all();
            return Err(error);
        }
        let join = tokio::spawn(core.run(rx.to_async()));

        Ok(PipelineHandle {
            mailbox,
            notifications,
            join,
        })
    }
}

/// Forward clock ratio updates into the pipeline's mailbox.
fn spawn_clock_forwarder(clock: &Clock, mailbox: Mailbox) {
    let mut updates = clock.subscribe();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(ratio) => mailbox.send(Message::ClockRatioUpdate { ratio }),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Handle to a running pipeline.
pub struct PipelineHandle {
    mailbox: Mailbox,
    notifications: broadcast::Sender<PipelineNotification>,
    join: JoinHandle<Result<()>>,
}

impl PipelineHandle {
    /// Request the `Playing` state.
    pub fn play(&self) {
        self.change_playback(PlaybackState::Playing);
    }

    /// Request the `Prepared` state.
    pub fn prepare(&self) {
        self.change_playback(PlaybackState::Prepared);
    }

    /// Request the `Stopped` state.
    pub fn stop(&self) {
        self.change_playback(PlaybackState::Stopped);
    }

    /// Request an arbitrary playback state.
    pub fn change_playback(&self, target: PlaybackState) {
        self.mailbox.send(Message::ChangePlaybackState { target });
    }

    /// Send an opaque message to a child's `handle_other`. Nested children
    /// are addressed with `/`-separated paths (`"wrapper/decoder"`).
    pub fn message_child<T: Send + Sync + 'static>(&self, child: impl Into<String>, payload: T) {
        self.mailbox.send(Message::MessageChild {
            child: child.into(),
            payload: std::sync::Arc::new(payload),
        });
    }

    /// Attach key/value pairs to the log output of the whole tree.
    pub fn log_metadata(&self, entries: Vec<(String, String)>) {
        self.mailbox.send(Message::LogMetadata { entries });
    }

    /// Subscribe to pipeline notifications.
    pub fn subscribe(&self) -> NotificationReceiver {
        NotificationReceiver {
            receiver: self.notifications.subscribe(),
        }
    }

    /// Wait for the pipeline to end on its own (termination or crash).
    pub async fn wait(self) -> Result<()> {
        match self.join.await {
            Ok(result) => result,
            Err(join_error) => Err(Error::Runtime(join_error.to_string())),
        }
    }

    /// Tear the pipeline down.
    ///
    /// With `blocking` set (the default) this resolves once every child is
    /// gone, returning the pipeline's final result.
    pub async fn terminate(self, options: TerminateOptions) -> Result<()> {
        self.mailbox.send(Message::Terminate);
        if options.blocking {
            self.wait().await
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("subscribers", &self.notifications.receiver_count())
            .finish()
    }
}
