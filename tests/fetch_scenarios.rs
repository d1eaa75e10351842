//! End-to-end fetch scenarios
//!
//! Drives [`segfetch::session::run`] against an in-memory, per-segment
//! scripted [`Face`] the way the teacher's `tests/auth_integration_test.rs`
//! drives `NntpClient` against a (real or fake) server — except every
//! scenario here runs against a fake, so none of them are `#[ignore]`d. Each
//! test below is one of the concrete, literal-valued scenarios from
//! `spec.md` §8.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use segfetch::face::{Face, FaceEvent, PendingInterest};
use segfetch::name::{Name, NamingConvention};
use segfetch::options::{AdaptiveOptions, DataFetcherOptions, FetchOptions, FixedOptions, PipelineKind};
use segfetch::packet::{ContentType, Data, Interest, Nack, NackReason};
use segfetch::rtt::RttEstimatorOptions;
use segfetch::validator::AcceptAllValidator;
use segfetch::{cancellation, session, FetchError};
use std::sync::Arc;

/// What a scripted [`Face`] does the `n`th time it sees an Interest for a
/// given segment.
#[derive(Clone)]
enum Reply {
    /// Answer immediately with this content, and this `FinalBlockId` if any.
    Data { content: &'static str, final_segment: Option<u64> },
    /// Reject with this reason.
    Nack(NackReason),
    /// Never answer this particular expression at all — the caller's own
    /// RTO/retry machinery must eventually supersede it.
    Drop,
}

/// A [`Face`] whose replies are scripted per segment number, consumed in
/// order; a segment whose script is exhausted keeps repeating its last
/// entry. Every scenario here skips version discovery, so `discovery_reply`
/// is never populated.
struct ScriptedFace {
    convention: NamingConvention,
    by_segment: Mutex<HashMap<u64, VecDeque<Reply>>>,
    discovery_reply: Option<Data>,
    /// Senders for `Reply::Drop` expressions. Held here (never sent to, never
    /// dropped) so the pending Interest genuinely never resolves and the
    /// caller's own RTO timer is what ends the race, rather than an
    /// immediate "face gave up" signal.
    held: Mutex<Vec<tokio::sync::oneshot::Sender<FaceEvent>>>,
}

impl ScriptedFace {
    fn new(convention: NamingConvention) -> Self {
        ScriptedFace {
            convention,
            by_segment: Mutex::new(HashMap::new()),
            discovery_reply: None,
            held: Mutex::new(Vec::new()),
        }
    }

    fn script(self, segment: u64, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.by_segment
            .lock()
            .unwrap()
            .insert(segment, replies.into_iter().collect());
        self
    }
}

impl Face for ScriptedFace {
    fn express(&self, interest: Interest) -> PendingInterest {
        let (tx, rx) = tokio::sync::oneshot::channel();

        if interest.can_be_prefix {
            let mut reply = self.discovery_reply.clone().expect("no discovery script configured");
            reply.name = interest.name;
            let _ = tx.send(FaceEvent::Data(reply));
            return PendingInterest::new(rx);
        }

        let segment = interest
            .name
            .segment_number(self.convention)
            .expect("scripted face only handles segment-bearing names");

        let next = {
            let mut scripts = self.by_segment.lock().unwrap();
            scripts.get_mut(&segment).and_then(|q| {
                if q.len() > 1 {
                    q.pop_front()
                } else {
                    q.front().cloned()
                }
            })
        };

        match next {
            Some(Reply::Data { content, final_segment }) => {
                let _ = tx.send(FaceEvent::Data(Data {
                    name: interest.name,
                    final_block_id: final_segment,
                    freshness_period: None,
                    content: content.as_bytes().to_vec(),
                    content_type: ContentType::Blob,
                    congestion_mark: false,
                    signature: vec![],
                }));
            }
            Some(Reply::Nack(reason)) => {
                let _ = tx.send(FaceEvent::Nack(Nack {
                    name: interest.name,
                    nonce: interest.nonce,
                    reason,
                }));
            }
            Some(Reply::Drop) => {
                self.held.lock().unwrap().push(tx);
            }
            None => {
                // Drop `tx` without sending: `PendingInterest::wait` then
                // resolves to `None`, the same observable outcome as a
                // `Face` that cancels a pending expression.
            }
        }

        PendingInterest::new(rx)
    }
}

fn base_options(pipeline: PipelineKind) -> FetchOptions {
    FetchOptions {
        pipeline,
        skip_version_discovery: true,
        ..FetchOptions::default()
    }
}

async fn run_to_completion(
    face: Arc<ScriptedFace>,
    prefix: &str,
    options: FetchOptions,
    deadline: Duration,
) -> segfetch::Result<(Vec<u8>, session::SessionSummary)> {
    let mut sink = Vec::new();
    let (_handle, cancel) = cancellation();
    let summary = session::run(
        face,
        Arc::new(AcceptAllValidator),
        Name::parse(prefix),
        &mut sink,
        &options,
        Some(deadline),
        cancel,
        None,
        None,
    )
    .await?;
    Ok((sink, summary))
}

/// Scenario 1: a content that fits in one segment, fixed pipeline.
#[tokio::test]
async fn one_segment_success() {
    let face = Arc::new(ScriptedFace::new(NamingConvention::default()).script(
        0,
        [Reply::Data { content: "hello", final_segment: Some(0) }],
    ));
    let mut options = base_options(PipelineKind::Fixed);
    options.fixed = FixedOptions { window: 5 };

    let (sink, summary) = run_to_completion(face, "/a/b", options, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(sink, b"hello");
    assert_eq!(summary.segments, 1);
    assert_eq!(summary.timeouts, 0);
    assert_eq!(summary.retransmissions, 0);
}

/// Scenario 2: three segments answered in request order.
#[tokio::test]
async fn in_order_three_segment_delivery() {
    let face = Arc::new(
        ScriptedFace::new(NamingConvention::default())
            .script(0, [Reply::Data { content: "A", final_segment: Some(2) }])
            .script(1, [Reply::Data { content: "BB", final_segment: None }])
            .script(2, [Reply::Data { content: "CCC", final_segment: None }]),
    );
    let mut options = base_options(PipelineKind::Fixed);
    options.fixed = FixedOptions { window: 3 };

    let (sink, _summary) = run_to_completion(face, "/x", options, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(sink, b"ABBCCC");
}

/// Scenario 3: same three segments, but the underlying replies are paced so
/// that segment 1's reply is observed before segment 0's; the reorder
/// buffer must still flush in strict segment order.
#[tokio::test]
async fn out_of_order_delivery_still_streams_in_order() {
    use segfetch::reorder::ReorderBuffer;

    let mut buf = ReorderBuffer::new();
    let mut sink: Vec<u8> = Vec::new();
    let validator = AcceptAllValidator;

    let data = |content: &str, final_segment: Option<u64>| Data {
        name: Name::parse("/x"),
        final_block_id: final_segment,
        freshness_period: None,
        content: content.as_bytes().to_vec(),
        content_type: ContentType::Blob,
        congestion_mark: false,
        signature: vec![],
    };

    buf.accept(1, data("BB", None), &validator, &mut sink).await.unwrap();
    assert!(sink.is_empty(), "segment 1 alone must not be released early");

    buf.accept(0, data("A", Some(2)), &validator, &mut sink).await.unwrap();
    assert_eq!(sink, b"ABB");

    buf.accept(2, data("CCC", None), &validator, &mut sink).await.unwrap();
    assert_eq!(sink, b"ABBCCC");
}

/// Scenario 4: AIMD pipeline drops segment 3's first expression; the RTO
/// checker must retransmit it exactly once, after which the session
/// completes and the window has been cut roughly in half.
#[tokio::test]
async fn timeout_then_retransmission_aimd() {
    let face = Arc::new(
        ScriptedFace::new(NamingConvention::default())
            .script(0, [Reply::Data { content: "a", final_segment: None }])
            .script(1, [Reply::Data { content: "b", final_segment: None }])
            .script(2, [Reply::Data { content: "c", final_segment: None }])
            .script(3, [Reply::Drop, Reply::Data { content: "d", final_segment: None }])
            .script(4, [Reply::Data { content: "e", final_segment: None }])
            .script(5, [Reply::Data { content: "f", final_segment: None }])
            .script(6, [Reply::Data { content: "g", final_segment: Some(6) }]),
    );

    let mut options = base_options(PipelineKind::Aimd);
    options.interest_lifetime = Duration::from_millis(200);
    options.adaptive = AdaptiveOptions {
        init_cwnd: 8.0,
        init_ssthresh: 8.0,
        rtt: RttEstimatorOptions {
            initial_rto: Duration::from_millis(20),
            min_rto: Duration::from_millis(10),
            max_rto: Duration::from_millis(500),
            ..RttEstimatorOptions::default()
        },
        ..AdaptiveOptions::default()
    };

    let (sink, summary) = run_to_completion(face, "/r", options, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(sink, b"abcdefg");
    assert_eq!(summary.segments, 7);
    assert!(summary.timeouts >= 1, "the dropped segment must register a timeout");
    assert!(summary.retransmissions >= 1, "the dropped segment must be retransmitted");
}

/// Scenario 5: every Interest is NACKed with `Congestion`; after the retry
/// ceiling is exhausted the session fails with a transport-fatal error.
#[tokio::test]
async fn congestion_nack_exhausts_retries() {
    let face = Arc::new(ScriptedFace::new(NamingConvention::default()).script(
        0,
        std::iter::repeat(Reply::Nack(NackReason::Congestion)).take(8),
    ));

    let mut options = base_options(PipelineKind::Fixed);
    options.fixed = FixedOptions { window: 5 };
    options.data_fetcher = DataFetcherOptions {
        max_retries_on_timeout_or_nack: Some(3),
        max_congestion_backoff: Duration::from_secs(10),
    };

    let err = run_to_completion(face, "/n", options, Duration::from_secs(5))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::RetriesExhausted { .. }));
}

/// Scenario 6: an application-level NACK (`ContentType::Nack`) on segment 0
/// fails the session immediately and releases no bytes.
#[tokio::test]
async fn application_nack_fails_fast() {
    // `Reply` above has no content-type field, so a one-off `Face` is
    // simpler than extending it just for this scenario.
    struct NackOnSegmentZero;
    impl Face for NackOnSegmentZero {
        fn express(&self, interest: Interest) -> PendingInterest {
            let (tx, rx) = tokio::sync::oneshot::channel();
            let _ = tx.send(FaceEvent::Data(Data {
                name: interest.name,
                final_block_id: Some(0),
                freshness_period: None,
                content: vec![],
                content_type: ContentType::Nack,
                congestion_mark: false,
                signature: vec![],
            }));
            PendingInterest::new(rx)
        }
    }

    let mut options = base_options(PipelineKind::Fixed);
    options.fixed = FixedOptions { window: 5 };

    let mut sink = Vec::new();
    let (_handle, cancel) = cancellation();
    let err = session::run(
        Arc::new(NackOnSegmentZero),
        Arc::new(AcceptAllValidator),
        Name::parse("/ack"),
        &mut sink,
        &options,
        Some(Duration::from_secs(5)),
        cancel,
        None,
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, FetchError::ApplicationNack { segment: 0 }));
    assert!(sink.is_empty());
}

/// Cancellation is idempotent: calling it twice has no additional effect,
/// and the session observes exactly one `Cancelled` failure.
#[tokio::test]
async fn cancel_handle_is_idempotent() {
    let (handle, cancel) = cancellation();
    handle.cancel();
    handle.cancel();

    let face = Arc::new(ScriptedFace::new(NamingConvention::default()));
    let options = base_options(PipelineKind::Fixed);
    let mut sink = Vec::new();
    let err = session::run(
        face,
        Arc::new(AcceptAllValidator),
        Name::parse("/c"),
        &mut sink,
        &options,
        None,
        cancel,
        None,
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, FetchError::Cancelled));
}
