//! Shared engine behind the AIMD and CUBIC pipelines
//!
//! AIMD and CUBIC differ only in how they grow and shrink the congestion
//! window; everything else — per-segment retransmission bookkeeping, RTO
//! detection, Conservative Window Adaptation, and delivery ordering — is
//! identical, so it lives here once. Grounded on the original tool's
//! `PipelineInterestsAdaptive`, which factors the two strategies the same
//! way via a `AdjustWindowStrategy` plug-in.
//!
//! Idiomatic translation note: `spec.md` §4.4.2 describes a periodic RTO
//! checker that sweeps all in-flight segments every `rtoCheckInterval`
//! (e.g. 10ms). This engine instead arms one `tokio::time::sleep_until`
//! deadline per in-flight segment and `select!`s over all of them via
//! `FuturesUnordered` — functionally the same contract (a segment whose RTO
//! elapses is detected and requeued for retransmission) but without the
//! polling granularity, since each timeout fires exactly at its own RTO.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::sleep_until;
use tracing::{debug, trace, warn};

use crate::error::FetchError;
use crate::face::{Face, FaceEvent};
use crate::name::{Name, NamingConvention};
use crate::options::AdaptiveOptions;
use crate::packet::{Interest, NackReason};
use crate::rtt::RttEstimator;
use crate::sample_log::SampleLog;
use crate::validator::Validator;

use super::{classify_failure, FailureVerdict, SegmentResult, SegmentState};

/// A pluggable window-growth/shrink strategy, implemented by AIMD and
/// CUBIC, matching `spec.md` §4.4.3/§4.4.4's `increase()`/`decrease()` pair.
pub trait WindowController: Send {
    /// Grow the window after a segment completes without signaling
    /// congestion. `srtt` is the RTT estimator's current smoothed RTT (used
    /// by CUBIC's time-based growth function; AIMD ignores it).
    fn increase(&mut self, cwnd: f64, srtt: Duration, opts: &AdaptiveOptions) -> f64;

    /// Shrink the window after a loss signal — a congestion Nack, a
    /// congestion-marked Data, or an RTO-triggered timeout. `spec.md` does
    /// not distinguish the cause inside `decrease()`; Conservative Window
    /// Adaptation (see [`recovery point dedup`](run)) is what limits how
    /// often this is called in the first place.
    fn decrease(&mut self, cwnd: f64, opts: &AdaptiveOptions) -> f64;
}

struct Outstanding {
    state: SegmentState,
    sent_at: Instant,
    retries: u32,
}

/// Segments genuinely occupying a window slot: everything in `outstanding`
/// except those already moved to `retx_queue` and awaiting a resend. Spec
/// §4.4.2's "decrement nInFlight once" on a loss event is realized by
/// excluding `InRetxQueue` here rather than by removing the segment from
/// `outstanding` (which still needs its retry count and state tracked).
fn in_flight_count(outstanding: &HashMap<u64, Outstanding>) -> f64 {
    outstanding
        .values()
        .filter(|o| o.state != SegmentState::InRetxQueue)
        .count() as f64
}

/// Aggregate counters surfaced to the session for the verbose-mode summary
/// (`spec.md` §7 "User-visible behavior").
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptiveStats {
    /// Number of RTO-triggered timeouts observed.
    pub timeouts: u64,
    /// Number of segment retransmissions sent.
    pub retransmissions: u64,
    /// Number of congestion signals observed (marks + Nacks).
    pub congestion_marks: u64,
    /// Smallest fresh RTT sample seen.
    pub min_rtt: Option<Duration>,
    /// Largest fresh RTT sample seen.
    pub max_rtt: Option<Duration>,
    /// Sum of every fresh RTT sample (paired with `rtt_samples` for the
    /// mean).
    pub rtt_sum: Duration,
    /// Count of fresh RTT samples fed into `rtt_sum`.
    pub rtt_samples: u64,
}

impl AdaptiveStats {
    fn record_rtt(&mut self, sample: Duration) {
        self.min_rtt = Some(self.min_rtt.map_or(sample, |m| m.min(sample)));
        self.max_rtt = Some(self.max_rtt.map_or(sample, |m| m.max(sample)));
        self.rtt_sum += sample;
        self.rtt_samples += 1;
    }
}

/// Drive `versioned_name`'s segments 0..=`final_segment` (when known)
/// through `window`, sending completed-in-any-order results on `tx`.
///
/// `initial_final_segment` may be `None` if the caller has not yet learned
/// the content's length (e.g. it is fetching segment zero itself); once any
/// Data carries a `final_block_id`, the engine adopts it as the last
/// segment to request and drops any in-flight/queued work for segments
/// beyond it (`spec.md` §4.4 invariant 2).
pub async fn run(
    face: Arc<dyn Face>,
    validator: Arc<dyn Validator>,
    versioned_name: Name,
    initial_final_segment: Option<u64>,
    naming_convention: NamingConvention,
    interest_lifetime: Duration,
    must_be_fresh: bool,
    rtt_opts: crate::rtt::RttEstimatorOptions,
    adaptive_opts: AdaptiveOptions,
    max_retries: Option<u32>,
    mut window: Box<dyn WindowController>,
    tx: mpsc::UnboundedSender<SegmentResult>,
    stats: Arc<std::sync::Mutex<AdaptiveStats>>,
    cwnd_log: Option<SampleLog>,
    rtt_log: Option<SampleLog>,
) {
    let start = Instant::now();
    let mut rtt = RttEstimator::new(rtt_opts);
    let mut cwnd = adaptive_opts.init_cwnd;
    let mut final_segment = initial_final_segment;
    let mut next_to_send: u64 = 0;
    let mut high_interest: Option<u64> = None;
    let mut recovery_point: Option<u64> = None;
    let mut outstanding: HashMap<u64, Outstanding> = HashMap::new();
    let mut retx_queue: VecDeque<u64> = VecDeque::new();
    let mut deferred_failures: Vec<(u64, FetchError)> = Vec::new();

    let mut inflight = FuturesUnordered::new();

    macro_rules! gated_decrease {
        ($segment:expr) => {{
            let gate_ok = !adaptive_opts.enable_cwa
                || recovery_point.is_none_or(|rp| $segment > rp);
            if gate_ok {
                cwnd = window
                    .decrease(cwnd, &adaptive_opts)
                    .clamp(adaptive_opts.min_cwnd, adaptive_opts.max_cwnd);
                recovery_point = high_interest;
                if let Some(log) = &cwnd_log {
                    log.record(start.elapsed(), cwnd);
                }
            }
        }};
    }

    loop {
        // Admit new work up to floor(cwnd): drain retransmissions first,
        // then request never-sent segments (spec.md §4.4.2 "Scheduling new
        // Interests").
        while in_flight_count(&outstanding) < cwnd.max(adaptive_opts.min_cwnd) {
            let segment = if let Some(seg) = retx_queue.pop_front() {
                let Some(o) = outstanding.get_mut(&seg) else {
                    continue;
                };
                if o.retries >= max_retries.unwrap_or(u32::MAX) {
                    outstanding.remove(&seg);
                    match classify_failure(seg, final_segment) {
                        FailureVerdict::Fatal => {
                            let _ = tx.send(Err(FetchError::RetriesExhausted {
                                name: format!("{seg}"),
                                reason: "retransmit retries exhausted".into(),
                            }));
                            return;
                        }
                        FailureVerdict::Irrelevant => {}
                        FailureVerdict::Deferred => deferred_failures.push((
                            seg,
                            FetchError::RetriesExhausted {
                                name: format!("{seg}"),
                                reason: "retransmit retries exhausted".into(),
                            },
                        )),
                    }
                    continue;
                }
                o.state = SegmentState::Retransmitted;
                o.retries += 1;
                o.sent_at = Instant::now();
                stats.lock().unwrap().retransmissions += 1;
                seg
            } else if final_segment.is_none_or(|last| next_to_send <= last) {
                let seg = next_to_send;
                next_to_send += 1;
                high_interest = Some(high_interest.map_or(seg, |h| h.max(seg)));
                outstanding.insert(
                    seg,
                    Outstanding {
                        state: SegmentState::FirstTimeSent,
                        sent_at: Instant::now(),
                        retries: 0,
                    },
                );
                seg
            } else {
                break;
            };

            let name = versioned_name.append_segment(segment, naming_convention);
            let interest = Interest::new(name, must_be_fresh, interest_lifetime);
            let pending = face.express(interest);
            let rto = rtt.rto();
            inflight.push(Box::pin(async move {
                let deadline = tokio::time::Instant::now() + rto;
                tokio::select! {
                    ev = pending.wait() => (segment, ev, false),
                    _ = sleep_until(deadline) => (segment, None, true),
                }
            }));
        }

        if inflight.is_empty() && outstanding.is_empty() && retx_queue.is_empty() {
            break;
        }

        let Some((segment, event, timed_out)) = inflight.next().await else {
            break;
        };

        if timed_out {
            warn!(segment, "rto elapsed without reply");
            stats.lock().unwrap().timeouts += 1;
            rtt.backoff_rto();
            if let Some(o) = outstanding.get_mut(&segment) {
                if o.state != SegmentState::InRetxQueue {
                    o.state = SegmentState::InRetxQueue;
                    retx_queue.push_back(segment);
                }
            }
            gated_decrease!(segment);
            continue;
        }

        match event {
            Some(FaceEvent::Data(data)) => {
                let was_retransmitted = outstanding
                    .get(&segment)
                    .is_some_and(|o| o.state != SegmentState::FirstTimeSent);
                let sent_at = outstanding.get(&segment).map(|o| o.sent_at);
                let n_in_flight = in_flight_count(&outstanding) as u32;

                match validator.validate(&data).await {
                    Ok(()) => {}
                    Err(e) => {
                        let _ = tx.send(Err(FetchError::ValidationFailed(e.to_string())));
                        outstanding.remove(&segment);
                        continue;
                    }
                }

                if final_segment.is_none() {
                    if let Some(last) = data.final_block_id {
                        debug!(last, "learned final segment from data");
                        final_segment = Some(last);
                        outstanding.retain(|&seg, _| seg <= last);
                        retx_queue.retain(|&seg| seg <= last);
                        let mut still_deferred = Vec::new();
                        for (seg, err) in deferred_failures.drain(..) {
                            match classify_failure(seg, final_segment) {
                                FailureVerdict::Fatal => {
                                    let _ = tx.send(Err(err));
                                    return;
                                }
                                FailureVerdict::Irrelevant => {}
                                FailureVerdict::Deferred => still_deferred.push((seg, err)),
                            }
                        }
                        deferred_failures = still_deferred;
                    }
                }

                if !was_retransmitted {
                    if let Some(sent_at) = sent_at {
                        let sample = sent_at.elapsed();
                        let n_expected = ((n_in_flight + 1) / 2).max(1);
                        rtt.add_measurement(sample, n_expected);
                        stats.lock().unwrap().record_rtt(sample);
                        if let Some(log) = &rtt_log {
                            log.record(start.elapsed(), sample.as_secs_f64() * 1000.0);
                        }
                    }
                }

                outstanding.remove(&segment);

                if data.congestion_mark && !adaptive_opts.ignore_congestion_marks {
                    stats.lock().unwrap().congestion_marks += 1;
                    gated_decrease!(segment);
                } else {
                    cwnd = window
                        .increase(cwnd, rtt.smoothed_rtt().unwrap_or(Duration::from_millis(1)), &adaptive_opts)
                        .clamp(adaptive_opts.min_cwnd, adaptive_opts.max_cwnd);
                    if let Some(log) = &cwnd_log {
                        log.record(start.elapsed(), cwnd);
                    }
                }
                trace!(segment, cwnd, "segment delivered");

                if tx.send(Ok((segment, data))).is_err() {
                    return;
                }
            }
            Some(FaceEvent::Nack(nack)) => match nack.reason {
                NackReason::Duplicate => {}
                NackReason::Congestion => {
                    stats.lock().unwrap().congestion_marks += 1;
                    gated_decrease!(segment);
                    if let Some(o) = outstanding.get_mut(&segment) {
                        if o.state != SegmentState::InRetxQueue {
                            o.state = SegmentState::InRetxQueue;
                            retx_queue.push_back(segment);
                        }
                    }
                }
                reason => {
                    outstanding.remove(&segment);
                    let err = FetchError::NonRetryableNack {
                        name: format!("{segment}"),
                        reason: format!("{reason:?}"),
                    };
                    match classify_failure(segment, final_segment) {
                        FailureVerdict::Fatal => {
                            let _ = tx.send(Err(err));
                            return;
                        }
                        FailureVerdict::Irrelevant => {}
                        FailureVerdict::Deferred => deferred_failures.push((segment, err)),
                    }
                }
            },
            None => {
                outstanding.remove(&segment);
                let _ = tx.send(Err(FetchError::Cancelled));
                return;
            }
        }

        if let Some(last) = final_segment {
            if next_to_send > last && outstanding.is_empty() && retx_queue.is_empty() {
                break;
            }
        }
    }
}
