//! Bin tests: hierarchical composition, cross-boundary links, nested
//! routing and bin failure modes.

use millrace::element::{Action, CallbackContext, CallbackResult, Element, PadSpec, UserPayload};
use millrace::elements::PassThrough;
use millrace::error::{Error, ExitReason};
use millrace::parent::{Bin, Endpoint};
use millrace::testing::{Harness, TestSink, TestSource};
use millrace::Spec;
use smallvec::smallvec;

fn passthrough_bin() -> Bin {
    Bin::new(
        vec![PadSpec::input("sink"), PadSpec::output("src")],
        Spec::new()
            .child("inner", PassThrough::new())
            .link(Endpoint::itself("sink"), ("inner", "sink"))
            .link(("inner", "src"), Endpoint::itself("src")),
    )
}

#[tokio::test]
async fn test_stream_flows_through_a_bin() {
    let (sink, probe) = TestSink::new();
    let spec = Spec::new()
        .child("src", TestSource::counting(10))
        .bin("wrap", passthrough_bin())
        .child("sink", sink)
        .link(("src", "src"), ("wrap", "sink"))
        .link(("wrap", "src"), ("sink", "sink"));

    let mut harness = Harness::start(spec).unwrap();
    harness.play();

    // The inner element reports through the bin with a path-prefixed
    // name; the outer sink reports directly.
    harness.assert_start_of_stream("wrap/inner").await;
    harness.assert_start_of_stream("sink").await;
    harness.assert_end_of_stream("sink").await;

    assert_eq!(probe.sequences(), (0..10).collect::<Vec<_>>());

    harness.terminate().await.unwrap();
}

#[tokio::test]
async fn test_nested_bins() {
    let inner = Bin::new(
        vec![PadSpec::input("sink"), PadSpec::output("src")],
        Spec::new()
            .child("deep", PassThrough::new())
            .link(Endpoint::itself("sink"), ("deep", "sink"))
            .link(("deep", "src"), Endpoint::itself("src")),
    );
    let outer = Bin::new(
        vec![PadSpec::input("sink"), PadSpec::output("src")],
        Spec::new()
            .bin("nested", inner)
            .link(Endpoint::itself("sink"), ("nested", "sink"))
            .link(("nested", "src"), Endpoint::itself("src")),
    );

    let (sink, probe) = TestSink::new();
    let spec = Spec::new()
        .child("src", TestSource::counting(7))
        .bin("wrap", outer)
        .child("sink", sink)
        .link(("src", "src"), ("wrap", "sink"))
        .link(("wrap", "src"), ("sink", "sink"));

    let mut harness = Harness::start(spec).unwrap();
    harness.play();

    harness.assert_start_of_stream("wrap/nested/deep").await;
    harness.assert_end_of_stream("sink").await;
    assert_eq!(probe.sequences(), (0..7).collect::<Vec<_>>());

    harness.terminate().await.unwrap();
}

#[tokio::test]
async fn test_message_child_descends_into_bins() {
    struct Echo;
    impl Element for Echo {
        fn handle_other(&mut self, message: UserPayload, _ctx: &CallbackContext) -> CallbackResult {
            Ok(smallvec![Action::Notify(message)])
        }
    }

    let bin = Bin::new(vec![], Spec::new().child("echo", Echo));
    let spec = Spec::new().bin("wrap", bin);

    let mut harness = Harness::start(spec).unwrap();
    harness
        .handle()
        .message_child("wrap/echo", String::from("down the tree"));

    let payload = harness.assert_notification("wrap/echo").await;
    assert_eq!(payload.downcast_ref::<String>().unwrap(), "down the tree");

    harness.terminate().await.unwrap();
}

#[tokio::test]
async fn test_unbound_bin_pad_fails_the_pipeline() {
    // The bin declares a proxy pad but its internal spec never binds it.
    let bin = Bin::new(
        vec![PadSpec::input("sink")],
        Spec::new().child("inner", {
            let (sink, _probe) = TestSink::new();
            sink
        }),
    );
    let spec = Spec::new()
        .child("src", TestSource::counting(3))
        .bin("wrap", bin)
        .link(("src", "src"), ("wrap", "sink"));

    let mut harness = Harness::start(spec).unwrap();
    harness.play();

    let reason = harness.assert_child_down("wrap").await;
    let ExitReason::Failure(error) = reason else {
        panic!("expected a failure, got {reason}");
    };
    assert!(matches!(
        *error,
        Error::Link(millrace::error::LinkError::UnboundBinPad { .. })
    ));

    let result = harness.wait().await;
    assert!(matches!(result, Err(Error::ChildCrash { ref child, .. }) if child == "wrap"));
}

#[tokio::test]
async fn test_inner_crash_tears_down_the_whole_tree() {
    use millrace::testing::FailingFilter;

    let bin = Bin::new(
        vec![PadSpec::input("sink"), PadSpec::output("src")],
        Spec::new()
            .child("inner", FailingFilter::new())
            .link(Endpoint::itself("sink"), ("inner", "sink"))
            .link(("inner", "src"), Endpoint::itself("src")),
    );

    let (sink, _probe) = TestSink::new();
    let spec = Spec::new()
        .child("src", TestSource::counting(5))
        .bin("wrap", bin)
        .child("sink", sink)
        .link(("src", "src"), ("wrap", "sink"))
        .link(("wrap", "src"), ("sink", "sink"));

    let mut harness = Harness::start(spec).unwrap();
    harness.play();

    // The inner element dies; the bin escalates by dying itself; the
    // pipeline tears everything down.
    let reason = harness.assert_child_down("wrap").await;
    assert!(reason.is_crash(), "got {reason}");

    let result = harness.wait().await;
    assert!(matches!(result, Err(Error::ChildCrash { ref child, .. }) if child == "wrap"));
}
