//! Backpressure tests: pull-mode demand accounting, bounded queues, the
//! push-mode toilet, and re-entrant demand.

use millrace::error::{Error, ExitReason};
use millrace::pipeline::PipelineConfig;
use millrace::testing::{DemandProbe, Harness, TestSink, TestSource};
use millrace::Spec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn small_queue_config() -> PipelineConfig {
    PipelineConfig {
        input_preferred_size: 10,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_pull_mode_delivers_everything_in_order() {
    let probe: DemandProbe = Arc::new(Mutex::new(Vec::new()));
    let (sink, sink_probe) = TestSink::new();
    let spec = Spec::new()
        .child(
            "src",
            TestSource::counting(100).with_demand_probe(probe.clone()),
        )
        .child("sink", sink.initial_demand(10))
        .link(("src", "src"), ("sink", "sink"));

    let mut harness = Harness::start_with_config(spec, small_queue_config()).unwrap();
    harness.play();
    harness.assert_end_of_stream("sink").await;

    // No drops in pull mode: everything emitted is accepted, in order.
    assert_eq!(sink_probe.sequences(), (0..100).collect::<Vec<_>>());

    // The source was asked repeatedly, never for nothing.
    let sizes = probe.lock().unwrap().clone();
    assert!(sizes.iter().all(|&s| s > 0));
    assert!(sizes.iter().sum::<u64>() >= 100);

    harness.terminate().await.unwrap();
}

#[tokio::test]
async fn test_queue_stays_bounded_when_the_sink_stops_demanding() {
    let probe: DemandProbe = Arc::new(Mutex::new(Vec::new()));
    let (sink, sink_probe) = TestSink::new();
    let spec = Spec::new()
        .child(
            "src",
            TestSource::counting(100).with_demand_probe(probe.clone()),
        )
        .child("sink", sink.initial_demand(10).no_autodemand())
        .link(("src", "src"), ("sink", "sink"));

    let mut harness = Harness::start_with_config(spec, small_queue_config()).unwrap();
    harness.play();
    harness.assert_start_of_stream("sink").await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    // The sink demanded 10 once: exactly 10 buffers were delivered, and
    // the input queue refilled to its watermark without running further.
    assert_eq!(sink_probe.sequences(), (0..10).collect::<Vec<_>>());
    let demanded: u64 = probe.lock().unwrap().iter().sum();
    assert!(
        demanded <= 30,
        "source was asked for {demanded} units with a bounded queue"
    );

    harness.terminate().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_toilet_overflow_kills_the_push_producer() {
    init_logging();
    let release = Arc::new(AtomicBool::new(false));
    let (sink, sink_probe) = TestSink::new();
    let spec = Spec::new()
        .child("src", TestSource::counting(300).push_mode())
        .child("sink", sink.push_mode().block_until(release.clone()))
        .link(("src", "src"), ("sink", "sink"));

    let mut harness = Harness::start(spec).unwrap();
    harness.play();

    // 300 buffers against a wedged consumer and a capacity of 200: the
    // producer is forcefully killed.
    let reason = harness.assert_child_down("src").await;
    assert!(matches!(reason, ExitReason::Killed), "got {reason}");
    release.store(true, Ordering::Release);

    let result = harness.wait().await;
    assert!(matches!(result, Err(Error::ChildCrash { ref child, .. }) if child == "src"));

    // The consumer drained a prefix at most; it was never required to
    // keep up.
    assert!(sink_probe.buffer_count() <= 300);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_push_within_capacity_flows_without_kills() {
    let (sink, sink_probe) = TestSink::new();
    let spec = Spec::new()
        .child("src", TestSource::counting(50).push_mode())
        .child("sink", sink.push_mode())
        .link(("src", "src"), ("sink", "sink"));

    let mut harness = Harness::start(spec).unwrap();
    harness.play();

    harness.assert_end_of_stream("sink").await;
    harness.refute_child_down(Duration::from_millis(200)).await;
    assert_eq!(sink_probe.sequences(), (0..50).collect::<Vec<_>>());

    harness.terminate().await.unwrap();
}

#[tokio::test]
async fn test_reentrant_redemand_preserves_buffer_order() {
    let (sink, sink_probe) = TestSink::new();
    let spec = Spec::new()
        .child("src", TestSource::counting(50))
        .child("sink", sink.initial_demand(4).redemand_once())
        .link(("src", "src"), ("sink", "sink"));

    let mut harness = Harness::start_with_config(spec, small_queue_config()).unwrap();
    harness.play();
    harness.assert_end_of_stream("sink").await;

    // The redemand issued inside handle_process was deferred, not
    // interleaved: arrival order equals emission order.
    assert_eq!(sink_probe.sequences(), (0..50).collect::<Vec<_>>());

    harness.terminate().await.unwrap();
}

#[tokio::test]
async fn test_byte_counted_demand() {
    use millrace::buffer::Buffer;
    use millrace::testing::{test_caps, SourceItem};

    let mut script = vec![SourceItem::Caps(test_caps())];
    script.extend((0..8).map(|i| {
        SourceItem::Buffer(
            Buffer::new(vec![0u8; 4]).with_metadata(millrace::buffer::Metadata::from_sequence(i)),
        )
    }));

    let (sink, sink_probe) = TestSink::new();
    let spec = Spec::new()
        .child("src", TestSource::from_script(script))
        .child("sink", sink.byte_unit().initial_demand(32))
        .link(("src", "src"), ("sink", "sink"));

    let mut harness = Harness::start(spec).unwrap();
    harness.play();
    harness.assert_end_of_stream("sink").await;

    assert_eq!(sink_probe.sequences(), (0..8).collect::<Vec<_>>());
    let received: usize = sink_probe
        .buffers
        .lock()
        .unwrap()
        .iter()
        .map(|b| b.len())
        .sum();
    assert_eq!(received, 32);

    harness.terminate().await.unwrap();
}
