//! Test support: scripted elements and notification assertions.
//!
//! [`Harness`] wraps a pipeline handle together with a notification
//! subscription and offers awaiting assertions over the notification
//! stream (`assert_start_of_stream`, `assert_child_down`, ...).
//! [`TestSource`] and [`TestSink`] are scripted endpoints for exercising
//! pipelines from tests.

use crate::buffer::Buffer;
use crate::element::{
    Action, Actions, CallbackContext, CallbackResult, DemandUnit, Element, PadRef, PadSpec,
    PlaybackState,
};
use crate::error::{ExitReason, Result};
use crate::event::Event;
use crate::format::Caps;
use crate::message::UserPayload;
use crate::parent::Spec;
use crate::pipeline::{
    NotificationReceiver, Pipeline, PipelineConfig, PipelineHandle, PipelineNotification,
    TerminateOptions,
};
use smallvec::smallvec;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How long awaiting assertions wait before panicking.
pub const ASSERT_TIMEOUT: Duration = Duration::from_secs(5);

/// Caps used by the scripted test elements.
pub fn test_caps() -> Caps {
    Caps::new("test/raw").with_field("rate", 48_000)
}

// ============================================================================
// Harness
// ============================================================================

/// A started pipeline plus a notification subscription, with awaiting
/// assertions for tests.
pub struct Harness {
    handle: PipelineHandle,
    notifications: NotificationReceiver,
}

impl Harness {
    /// Start a pipeline and subscribe to its notifications.
    pub fn start(spec: Spec) -> Result<Self> {
        Self::start_with_config(spec, PipelineConfig::default())
    }

    /// Start with custom configuration.
    pub fn start_with_config(spec: Spec, config: PipelineConfig) -> Result<Self> {
        let handle = Pipeline::start_with_config(spec, config)?;
        let notifications = handle.subscribe();
        Ok(Self {
            handle,
            notifications,
        })
    }

    /// The underlying handle.
    pub fn handle(&self) -> &PipelineHandle {
        &self.handle
    }

    /// Request the `Playing` state.
    pub fn play(&self) {
        self.handle.play();
    }

    /// Request the `Stopped` state.
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Terminate the pipeline, waiting for teardown.
    pub async fn terminate(self) -> Result<()> {
        self.handle.terminate(TerminateOptions::default()).await
    }

    /// Wait for the pipeline to end on its own.
    pub async fn wait(self) -> Result<()> {
        self.handle.wait().await
    }

    /// Await a start-of-stream report from the given child.
    pub async fn assert_start_of_stream(&mut self, child: &str) {
        self.expect(&format!("start_of_stream from `{child}`"), |n| {
            matches!(n, PipelineNotification::StartOfStream { child: c, .. } if c == child)
        })
        .await;
    }

    /// Await an end-of-stream report from the given child.
    pub async fn assert_end_of_stream(&mut self, child: &str) {
        self.expect(&format!("end_of_stream from `{child}`"), |n| {
            matches!(n, PipelineNotification::EndOfStream { child: c, .. } if c == child)
        })
        .await;
    }

    /// Await the pipeline reaching the given playback state.
    pub async fn assert_playback(&mut self, state: PlaybackState) {
        self.expect(&format!("playback change to {state}"), |n| {
            matches!(n, PipelineNotification::PlaybackChanged(s) if *s == state)
        })
        .await;
    }

    /// Await a notification payload from the given child.
    pub async fn assert_notification(&mut self, child: &str) -> UserPayload {
        let notification = self
            .expect(&format!("notification from `{child}`"), |n| {
                matches!(n, PipelineNotification::Notification { child: c, .. } if c == child)
            })
            .await;
        match notification {
            PipelineNotification::Notification { payload, .. } => payload,
            _ => unreachable!(),
        }
    }

    /// Await the given child going down and return the reason.
    pub async fn assert_child_down(&mut self, child: &str) -> ExitReason {
        let notification = self
            .expect(&format!("down of `{child}`"), |n| {
                matches!(n, PipelineNotification::ChildDown { child: c, .. } if c == child)
            })
            .await;
        match notification {
            PipelineNotification::ChildDown { reason, .. } => reason,
            _ => unreachable!(),
        }
    }

    /// Assert that no child goes down within the given window.
    pub async fn refute_child_down(&mut self, window: Duration) {
        let result = tokio::time::timeout(window, async {
            loop {
                match self.notifications.recv().await {
                    Some(PipelineNotification::ChildDown { child, reason }) => {
                        return (child, reason);
                    }
                    Some(_) => continue,
                    None => std::future::pending::<()>().await,
                }
            }
        })
        .await;
        if let Ok((child, reason)) = result {
            panic!("unexpected down of `{child}`: {reason}");
        }
    }

    async fn expect(
        &mut self,
        what: &str,
        matcher: impl Fn(&PipelineNotification) -> bool,
    ) -> PipelineNotification {
        let waited = tokio::time::timeout(ASSERT_TIMEOUT, async {
            loop {
                match self.notifications.recv().await {
                    Some(notification) if matcher(&notification) => return notification,
                    Some(_) => continue,
                    None => panic!("notification stream closed while waiting for {what}"),
                }
            }
        })
        .await;
        match waited {
            Ok(notification) => notification,
            Err(_) => panic!("timed out waiting for {what}"),
        }
    }
}

// ============================================================================
// TestSource
// ============================================================================

/// One scripted emission of a [`TestSource`].
#[derive(Debug, Clone)]
pub enum SourceItem {
    /// Emit caps.
    Caps(Caps),
    /// Emit one buffer.
    Buffer(Buffer),
    /// Emit an event.
    Event(Event),
}

/// Records the sizes `handle_demand` was invoked with.
pub type DemandProbe = Arc<Mutex<Vec<u64>>>;

/// A source that plays back a script.
///
/// In pull mode (the default) it emits script items as demand arrives,
/// followed by one end-of-stream event when the script runs dry. In push
/// mode it emits the entire script when playback starts.
pub struct TestSource {
    script: VecDeque<SourceItem>,
    push: bool,
    eos_sent: bool,
    demand_probe: Option<DemandProbe>,
}

impl TestSource {
    /// A source playing back the given script.
    pub fn from_script(script: Vec<SourceItem>) -> Self {
        Self {
            script: script.into(),
            push: false,
            eos_sent: false,
            demand_probe: None,
        }
    }

    /// A source emitting [`test_caps`] and `count` sequence-numbered
    /// buffers.
    pub fn counting(count: u64) -> Self {
        let mut script = vec![SourceItem::Caps(test_caps())];
        script.extend((0..count).map(|i| SourceItem::Buffer(Buffer::from_sequence(i))));
        Self::from_script(script)
    }

    /// A source that skips caps and emits buffers straight away, for
    /// exercising the buffer-before-caps contract.
    pub fn without_caps(count: u64) -> Self {
        Self::from_script(
            (0..count)
                .map(|i| SourceItem::Buffer(Buffer::from_sequence(i)))
                .collect(),
        )
    }

    /// Switch the source's output pad to push mode.
    pub fn push_mode(mut self) -> Self {
        self.push = true;
        self
    }

    /// Record every `handle_demand` size into the probe.
    pub fn with_demand_probe(mut self, probe: DemandProbe) -> Self {
        self.demand_probe = Some(probe);
        self
    }

    /// Emit up to `budget` units in the link's demand unit (caps and
    /// events are free), plus the end-of-stream once the script is
    /// exhausted.
    fn emit(&mut self, budget: u64, unit: DemandUnit) -> Actions {
        let mut actions = Actions::new();
        let mut emitted = 0;
        while emitted < budget {
            match self.script.pop_front() {
                Some(SourceItem::Caps(caps)) => actions.push(Action::Caps {
                    pad: "src".into(),
                    caps,
                }),
                Some(SourceItem::Buffer(buffer)) => {
                    emitted += unit.measure_one(&buffer);
                    actions.push(Action::buffer("src", buffer));
                }
                Some(SourceItem::Event(event)) => actions.push(Action::Event {
                    pad: "src".into(),
                    event,
                }),
                None => {
                    if !self.eos_sent {
                        self.eos_sent = true;
                        actions.push(Action::Event {
                            pad: "src".into(),
                            event: Event::EndOfStream,
                        });
                    }
                    break;
                }
            }
        }
        actions
    }
}

impl Element for TestSource {
    fn known_output_pads(&self) -> Vec<PadSpec> {
        if self.push {
            vec![PadSpec::output("src").push()]
        } else {
            vec![PadSpec::output("src")]
        }
    }

    fn handle_prepared_to_playing(&mut self, _ctx: &CallbackContext) -> CallbackResult {
        if self.push {
            Ok(self.emit(u64::MAX, DemandUnit::Buffers))
        } else {
            Ok(Actions::new())
        }
    }

    fn handle_demand(
        &mut self,
        _pad: &PadRef,
        size: u64,
        unit: DemandUnit,
        _ctx: &CallbackContext,
    ) -> CallbackResult {
        if let Some(probe) = &self.demand_probe {
            probe.lock().unwrap().push(size);
        }
        Ok(self.emit(size, unit))
    }
}

// ============================================================================
// TestSink
// ============================================================================

/// Shared view into what a [`TestSink`] received.
#[derive(Clone, Default)]
pub struct SinkProbe {
    /// Buffers in delivery order.
    pub buffers: Arc<Mutex<Vec<Buffer>>>,
    /// Caps in delivery order.
    pub caps: Arc<Mutex<Vec<Caps>>>,
    /// Events in delivery order.
    pub events: Arc<Mutex<Vec<Event>>>,
}

impl SinkProbe {
    /// Sequence numbers of the received buffers.
    pub fn sequences(&self) -> Vec<u64> {
        self.buffers
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.metadata().sequence)
            .collect()
    }

    /// Number of received buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffers.lock().unwrap().len()
    }
}

/// A sink that records everything it receives.
pub struct TestSink {
    probe: SinkProbe,
    push: bool,
    unit: DemandUnit,
    initial_demand: Option<u64>,
    autodemand: bool,
    redemand_once: bool,
    redemanded: bool,
    block_until: Option<Arc<AtomicBool>>,
    blocked: bool,
}

impl TestSink {
    /// A pull sink that demands 10 units up front and keeps its demand
    /// topped up. Returns the sink and a probe into what it received.
    pub fn new() -> (Self, SinkProbe) {
        let probe = SinkProbe::default();
        (
            Self {
                probe: probe.clone(),
                push: false,
                unit: DemandUnit::Buffers,
                initial_demand: Some(10),
                autodemand: true,
                redemand_once: false,
                redemanded: false,
                block_until: None,
                blocked: false,
            },
            probe,
        )
    }

    /// Switch the sink's input pad to push mode.
    pub fn push_mode(mut self) -> Self {
        self.push = true;
        self
    }

    /// Count demand on the sink's input pad in bytes.
    pub fn byte_unit(mut self) -> Self {
        self.unit = DemandUnit::Bytes;
        self
    }

    /// Set the demand placed when playback starts.
    pub fn initial_demand(mut self, size: u64) -> Self {
        self.initial_demand = Some(size);
        self
    }

    /// Never demand anything (and never top up).
    pub fn never_demand(mut self) -> Self {
        self.initial_demand = None;
        self.autodemand = false;
        self
    }

    /// Consume the initial demand but do not top it up afterwards.
    pub fn no_autodemand(mut self) -> Self {
        self.autodemand = false;
        self
    }

    /// Issue a redemand on the input pad during the first `handle_process`,
    /// exercising the delayed-demand path.
    pub fn redemand_once(mut self) -> Self {
        self.redemand_once = true;
        self
    }

    /// Block inside the first `handle_process` until the flag is set
    /// (bounded at 3 s), wedging this sink's actor.
    pub fn block_until(mut self, release: Arc<AtomicBool>) -> Self {
        self.block_until = Some(release);
        self
    }
}

impl Element for TestSink {
    fn known_input_pads(&self) -> Vec<PadSpec> {
        let spec = PadSpec::input("sink").unit(self.unit);
        if self.push {
            vec![spec.push()]
        } else {
            vec![spec]
        }
    }

    fn handle_prepared_to_playing(&mut self, _ctx: &CallbackContext) -> CallbackResult {
        match self.initial_demand {
            Some(size) if !self.push => Ok(smallvec![Action::demand("sink", size)]),
            _ => Ok(Actions::new()),
        }
    }

    fn handle_caps(&mut self, _pad: &PadRef, caps: &Caps, _ctx: &CallbackContext) -> CallbackResult {
        self.probe.caps.lock().unwrap().push(caps.clone());
        Ok(Actions::new())
    }

    fn handle_event(
        &mut self,
        _pad: &PadRef,
        event: &Event,
        _ctx: &CallbackContext,
    ) -> CallbackResult {
        self.probe.events.lock().unwrap().push(event.clone());
        Ok(Actions::new())
    }

    fn handle_process(
        &mut self,
        _pad: &PadRef,
        buffers: Vec<Buffer>,
        _ctx: &CallbackContext,
    ) -> CallbackResult {
        if !self.blocked {
            if let Some(release) = &self.block_until {
                self.blocked = true;
                let start = Instant::now();
                while !release.load(Ordering::Acquire) && start.elapsed() < Duration::from_secs(3)
                {
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        }
        let consumed = self.unit.measure(&buffers) as i64;
        self.probe.buffers.lock().unwrap().extend(buffers);

        let mut actions = Actions::new();
        if self.redemand_once && !self.redemanded {
            self.redemanded = true;
            actions.push(Action::Redemand {
                pad: "sink".into(),
            });
        }
        if self.autodemand && !self.push {
            actions.push(Action::demand_delta("sink", consumed));
        }
        Ok(actions)
    }
}

// ============================================================================
// FailingFilter
// ============================================================================

/// A pass-through-shaped filter whose `handle_process` fails, for
/// exercising crash propagation.
#[derive(Debug, Default)]
pub struct FailingFilter;

impl FailingFilter {
    /// Create a failing filter.
    pub fn new() -> Self {
        Self
    }
}

impl Element for FailingFilter {
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
        _buffers: Vec<Buffer>,
        _ctx: &CallbackContext,
    ) -> CallbackResult {
        Err("synthetic processing failure".into())
    }
}
