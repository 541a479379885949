//! Integration tests for the pipeline core: stream contracts, round
//! trips, crash propagation and child messaging.

use millrace::element::{Action, CallbackContext, CallbackResult, Element, PadSpec, UserPayload};
use millrace::elements::PassThrough;
use millrace::error::{Error, ExitReason};
use millrace::event::Event;
use millrace::format::CapsPattern;
use millrace::testing::{test_caps, FailingFilter, Harness, TestSink, TestSource};
use millrace::{Pipeline, Spec};
use smallvec::smallvec;

/// Assert that `text` contains the given fragments in order.
fn assert_contains_in_order(text: &str, fragments: &[&str]) {
    let mut rest = text;
    for fragment in fragments {
        match rest.find(fragment) {
            Some(at) => rest = &rest[at + fragment.len()..],
            None => panic!("`{text}` does not contain `{fragment}` (in order)"),
        }
    }
}

#[tokio::test]
async fn test_happy_path_source_to_sink() {
    let (sink, probe) = TestSink::new();
    let spec = Spec::new()
        .child("src", TestSource::counting(5))
        .child("sink", sink)
        .link(("src", "src"), ("sink", "sink"));

    let mut harness = Harness::start(spec).unwrap();
    harness.play();

    harness.assert_start_of_stream("sink").await;
    harness.assert_end_of_stream("sink").await;

    assert_eq!(probe.sequences(), vec![0, 1, 2, 3, 4]);
    assert_eq!(probe.caps.lock().unwrap().clone(), vec![test_caps()]);

    harness.terminate().await.unwrap();
}

#[tokio::test]
async fn test_buffer_before_caps_crashes_the_source() {
    let (sink, _probe) = TestSink::new();
    let spec = Spec::new()
        .child("src", TestSource::without_caps(3))
        .child("sink", sink)
        .link(("src", "src"), ("sink", "sink"));

    let mut harness = Harness::start(spec).unwrap();
    harness.play();

    let reason = harness.assert_child_down("src").await;
    let ExitReason::Failure(error) = reason else {
        panic!("expected a failure, got {reason}");
    };
    assert!(matches!(*error, Error::Contract { .. }));
    assert_contains_in_order(&error.to_string(), &["buffer", "caps", "not", "sent"]);

    // The parent observes the crash and shuts the pipeline down.
    let result = harness.wait().await;
    assert!(matches!(result, Err(Error::ChildCrash { ref child, .. }) if child == "src"));
}

#[tokio::test]
async fn test_passthrough_roundtrip() {
    let (sink, probe) = TestSink::new();
    let spec = Spec::new()
        .child("src", TestSource::counting(20))
        .child("filter", PassThrough::new())
        .child("sink", sink)
        .link(("src", "src"), ("filter", "sink"))
        .link(("filter", "src"), ("sink", "sink"));

    let mut harness = Harness::start(spec).unwrap();
    harness.play();

    harness.assert_start_of_stream("sink").await;
    harness.assert_end_of_stream("sink").await;

    // Buffers forwarded by a passthrough equal the buffers emitted, in
    // order; caps survive the hop untouched.
    assert_eq!(probe.sequences(), (0..20).collect::<Vec<_>>());
    assert_eq!(probe.caps.lock().unwrap().clone(), vec![test_caps()]);
    let events = probe.events.lock().unwrap().clone();
    assert_eq!(events, vec![Event::StartOfStream, Event::EndOfStream]);

    harness.terminate().await.unwrap();
}

#[tokio::test]
async fn test_filter_crash_propagates_to_the_pipeline() {
    let (sink, _probe) = TestSink::new();
    let spec = Spec::new()
        .child("src", TestSource::counting(5))
        .child("filter", FailingFilter::new())
        .child("sink", sink)
        .link(("src", "src"), ("filter", "sink"))
        .link(("filter", "src"), ("sink", "sink"));

    let mut harness = Harness::start(spec).unwrap();
    harness.play();

    let reason = harness.assert_child_down("filter").await;
    let ExitReason::Failure(error) = reason else {
        panic!("expected a failure, got {reason}");
    };
    assert!(matches!(*error, Error::Callback { .. }));

    let result = harness.wait().await;
    assert!(matches!(result, Err(Error::ChildCrash { ref child, .. }) if child == "filter"));
}

#[tokio::test]
async fn test_caps_constraint_mismatch_crashes_the_consumer() {
    struct PickySink;
    impl Element for PickySink {
        fn known_input_pads(&self) -> Vec<PadSpec> {
            vec![PadSpec::input("sink").caps(CapsPattern::new("video/raw"))]
        }
        fn handle_prepared_to_playing(&mut self, _ctx: &CallbackContext) -> CallbackResult {
            Ok(smallvec![Action::demand("sink", 10)])
        }
    }

    let spec = Spec::new()
        .child("src", TestSource::counting(3))
        .child("sink", PickySink)
        .link(("src", "src"), ("sink", "sink"));

    let mut harness = Harness::start(spec).unwrap();
    harness.play();

    let reason = harness.assert_child_down("sink").await;
    let ExitReason::Failure(error) = reason else {
        panic!("expected a failure, got {reason}");
    };
    assert!(matches!(*error, Error::Contract { .. }));
    assert_contains_in_order(&error.to_string(), &["caps", "constraint"]);
}

#[tokio::test]
async fn test_message_child_reaches_handle_other() {
    struct Echo;
    impl Element for Echo {
        fn handle_other(&mut self, message: UserPayload, _ctx: &CallbackContext) -> CallbackResult {
            Ok(smallvec![Action::Notify(message)])
        }
    }

    let spec = Spec::new().child("echo", Echo);
    let mut harness = Harness::start(spec).unwrap();

    harness.handle().message_child("echo", String::from("ping"));
    let payload = harness.assert_notification("echo").await;
    assert_eq!(payload.downcast_ref::<String>().unwrap(), "ping");

    harness.terminate().await.unwrap();
}

#[tokio::test]
async fn test_link_to_unknown_pad_aborts_startup() {
    let (sink, _probe) = TestSink::new();
    let spec = Spec::new()
        .child("src", TestSource::counting(1))
        .child("sink", sink)
        .link(("src", "bogus"), ("sink", "sink"));

    let result = Pipeline::start(spec);
    assert!(matches!(
        result,
        Err(Error::Link(millrace::error::LinkError::NoSuchPad { .. }))
    ));
}

#[tokio::test]
async fn test_duplicate_link_aborts_startup() {
    let (sink, _probe) = TestSink::new();
    let spec = Spec::new()
        .child("a", TestSource::counting(1))
        .child("b", TestSource::counting(1))
        .child("sink", sink)
        .link(("a", "src"), ("sink", "sink"))
        .link(("b", "src"), ("sink", "sink"));

    let result = Pipeline::start(spec);
    assert!(matches!(
        result,
        Err(Error::Link(millrace::error::LinkError::AlreadyLinked { .. }))
    ));
}

#[tokio::test]
async fn test_duplicate_child_name_aborts_startup() {
    let (sink, _probe) = TestSink::new();
    let spec = Spec::new()
        .child("x", TestSource::counting(1))
        .child("x", sink);

    let result = Pipeline::start(spec);
    assert!(matches!(
        result,
        Err(Error::Link(millrace::error::LinkError::DuplicateChild { .. }))
    ));
}

#[tokio::test]
async fn test_tee_duplicates_the_stream() {
    use millrace::elements::Tee;

    let (sink_a, probe_a) = TestSink::new();
    let (sink_b, probe_b) = TestSink::new();
    let spec = Spec::new()
        .child("src", TestSource::counting(10).push_mode())
        .child("tee", Tee::new())
        .child("a", sink_a.push_mode())
        .child("b", sink_b.push_mode())
        .link(("src", "src"), ("tee", "sink"))
        .link(("tee", "src"), ("a", "sink"))
        .link(("tee", "src"), ("b", "sink"));

    let mut harness = Harness::start(spec).unwrap();
    harness.play();

    harness.assert_end_of_stream("a").await;
    harness.assert_end_of_stream("b").await;

    // Each consumer sees the full stream, in order.
    assert_eq!(probe_a.sequences(), (0..10).collect::<Vec<_>>());
    assert_eq!(probe_b.sequences(), (0..10).collect::<Vec<_>>());
    assert_eq!(probe_a.caps.lock().unwrap().clone(), vec![test_caps()]);

    harness.terminate().await.unwrap();
}

#[tokio::test]
async fn test_no_crash_on_happy_path() {
    let (sink, _probe) = TestSink::new();
    let spec = Spec::new()
        .child("src", TestSource::counting(10))
        .child("sink", sink)
        .link(("src", "src"), ("sink", "sink"));

    let mut harness = Harness::start(spec).unwrap();
    harness.play();
    harness.assert_end_of_stream("sink").await;
    harness
        .refute_child_down(std::time::Duration::from_millis(200))
        .await;
    harness.terminate().await.unwrap();
}
