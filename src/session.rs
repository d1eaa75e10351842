//! Top-level fetch orchestrator
//!
//! Composes [`crate::discovery::discover_version`], one of the three
//! [`crate::pipeline`] strategies, and a [`crate::reorder::ReorderBuffer`]
//! into the single `run(prefix, sink, validator)` entry point described by
//! `spec.md` §4.6. Grounded on the teacher's `client::Client`, which plays
//! the same role of wiring its collaborators (connection pool, command
//! layer, assembler) into one call the binary drives to completion.
//!
//! Idiomatic translation note: `spec.md` §5 describes an explicit
//! destructor ordering (cancel timers → cancel in-flight Interests → drop
//! reorder buffer → drop pipeline → drop discovery) for a single-threaded
//! callback-based event loop. Here that ordering is simply the reverse
//! drop order of Rust's stack-allocated locals combined with dropping the
//! pipeline's result channel, which causes the spawned pipeline task to
//! observe a closed channel and stop expressing further Interests at its
//! next send — no explicit destructor is written.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::discovery::{self, DiscoveryOutcome};
use crate::error::{FetchError, Result};
use crate::face::Face;
use crate::name::Name;
use crate::options::{FetchOptions, PipelineKind};
use crate::pipeline::{fetch_aimd, fetch_cubic, fetch_fixed, adaptive::AdaptiveStats, SegmentResult};
use crate::reorder::{ReorderBuffer, Sink};
use crate::sample_log::SampleLog;
use crate::validator::Validator;

/// A handle used to request cancellation of a running [`FetchSession::run`].
///
/// Cloning and sending a `CancelHandle` to another task is the idiomatic
/// equivalent of the original tool's external `cancel()` call on a running
/// fetch.
#[derive(Clone)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    /// Signal cancellation. Idempotent: calling this more than once, or
    /// after the session has already finished, has no further effect.
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

/// The session's half of a cancellation pair, passed to [`FetchSession::run`].
#[derive(Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    /// Resolve once [`CancelHandle::cancel`] has been called.
    ///
    /// Resolves immediately if cancellation was already requested, so this
    /// is safe to race against other futures in a loop via `select!`.
    async fn cancelled(&mut self) {
        let _ = self.0.wait_for(|&c| c).await;
    }
}

/// Build a fresh, not-yet-cancelled handle/signal pair.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelSignal(rx))
}

/// Aggregate counters and timing for one completed [`FetchSession::run`],
/// matching the verbose-mode summary described in `spec.md` §7.
#[derive(Debug, Clone, Copy)]
pub struct SessionSummary {
    /// Number of distinct segments delivered to the sink.
    pub segments: u64,
    /// Total content bytes delivered to the sink.
    pub bytes: u64,
    /// Wall-clock time from the start of discovery to completion.
    pub elapsed: Duration,
    /// Number of RTO-triggered timeouts observed (0 for the fixed
    /// pipeline, whose retries are internal to each `DataFetcher`).
    pub timeouts: u64,
    /// Number of segment retransmissions sent.
    pub retransmissions: u64,
    /// Number of congestion signals (marks + Nacks) observed.
    pub congestion_marks: u64,
    /// Smallest RTT sample observed, if any were taken.
    pub min_rtt: Option<Duration>,
    /// Largest RTT sample observed, if any were taken.
    pub max_rtt: Option<Duration>,
    /// Mean of every RTT sample observed, if any were taken.
    pub avg_rtt: Option<Duration>,
}

impl SessionSummary {
    /// Goodput over the session's wall-clock duration, in bits per second.
    pub fn goodput_bits_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        (self.bytes as f64 * 8.0) / secs
    }

    fn from_adaptive(stats: AdaptiveStats, segments: u64, bytes: u64, elapsed: Duration) -> Self {
        let avg_rtt = (stats.rtt_samples > 0)
            .then(|| stats.rtt_sum / stats.rtt_samples as u32);
        SessionSummary {
            segments,
            bytes,
            elapsed,
            timeouts: stats.timeouts,
            retransmissions: stats.retransmissions,
            congestion_marks: stats.congestion_marks,
            min_rtt: stats.min_rtt,
            max_rtt: stats.max_rtt,
            avg_rtt,
        }
    }

    fn from_fixed(segments: u64, bytes: u64, elapsed: Duration) -> Self {
        SessionSummary {
            segments,
            bytes,
            elapsed,
            timeouts: 0,
            retransmissions: 0,
            congestion_marks: 0,
            min_rtt: None,
            max_rtt: None,
            avg_rtt: None,
        }
    }
}

/// Format a goodput value with an appropriate SI unit, as the verbose-mode
/// summary prints it (`spec.md` §7 "goodput in bits/s with appropriate SI
/// unit").
pub fn format_goodput(bits_per_sec: f64) -> String {
    const UNITS: [&str; 5] = ["bit/s", "kbit/s", "Mbit/s", "Gbit/s", "Tbit/s"];
    let mut value = bits_per_sec;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Resolve `prefix` to a versioned name, sent through the chosen pipeline,
/// and deliver the resulting content bytes to `sink` in segment order.
///
/// Returns once the content has been fully delivered, an unrecoverable
/// failure occurs, `deadline` elapses (as [`FetchError::Timeout`]), or
/// `cancel` is triggered (as [`FetchError::Cancelled`]).
///
/// `cwnd_log`/`rtt_log`, if given, receive one sample line per congestion-
/// window change / RTT measurement (`spec.md` §6 `--log-cwnd`/`--log-rtt`);
/// the fixed pipeline never uses them, since it has no window or RTT
/// estimator of its own.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    face: Arc<dyn Face>,
    validator: Arc<dyn Validator>,
    prefix: Name,
    sink: &mut dyn Sink,
    options: &FetchOptions,
    deadline: Option<Duration>,
    mut cancel: CancelSignal,
    cwnd_log: Option<SampleLog>,
    rtt_log: Option<SampleLog>,
) -> Result<SessionSummary> {
    let start = Instant::now();
    let deadline_at = deadline.map(|d| start + d);

    macro_rules! race {
        ($fut:expr) => {{
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = sleep_until_deadline(deadline_at) => return Err(FetchError::Timeout),
                result = $fut => result,
            }
        }};
    }

    let versioned_name = if options.skip_version_discovery || prefix.ends_with_version(options.discovery.naming_convention) {
        debug!("version discovery skipped");
        prefix
    } else {
        match race!(discovery::discover_version(&*face, &*validator, prefix, &options.discovery)) {
            Ok(DiscoveryOutcome::AlreadyVersioned(name)) => name,
            Ok(DiscoveryOutcome::Discovered { versioned_name, .. }) => versioned_name,
            Err(e) => return Err(e),
        }
    };

    let (mut rx, stats): (mpsc::UnboundedReceiver<SegmentResult>, Option<Arc<std::sync::Mutex<AdaptiveStats>>>) =
        match options.pipeline {
            PipelineKind::Fixed => {
                let rx = fetch_fixed(
                    face.clone(),
                    validator.clone(),
                    versioned_name,
                    None,
                    options.naming_convention,
                    options.fixed,
                    options.data_fetcher,
                    options.interest_lifetime,
                    options.must_be_fresh,
                );
                (rx, None)
            }
            PipelineKind::Aimd => {
                let (rx, stats) = fetch_aimd(
                    face.clone(),
                    validator.clone(),
                    versioned_name,
                    None,
                    options.naming_convention,
                    options.interest_lifetime,
                    options.must_be_fresh,
                    options.adaptive,
                    options.aimd,
                    options.data_fetcher.max_retries_on_timeout_or_nack,
                    cwnd_log.clone(),
                    rtt_log.clone(),
                );
                (rx, Some(stats))
            }
            PipelineKind::Cubic => {
                let (rx, stats) = fetch_cubic(
                    face.clone(),
                    validator.clone(),
                    versioned_name,
                    None,
                    options.naming_convention,
                    options.interest_lifetime,
                    options.must_be_fresh,
                    options.adaptive,
                    options.cubic,
                    options.data_fetcher.max_retries_on_timeout_or_nack,
                    cwnd_log.clone(),
                    rtt_log.clone(),
                );
                (rx, Some(stats))
            }
        };

    let mut reorder = ReorderBuffer::new();
    let mut segments = 0u64;
    let mut bytes = 0u64;
    let mut last_segment: Option<u64> = None;

    loop {
        let next = race!(rx.recv());
        match next {
            Some(Ok((segment, data))) => {
                if last_segment.is_none() {
                    last_segment = data.final_block_id;
                }
                let written = reorder.accept(segment, data, &*validator, sink).await?;
                if written > 0 {
                    segments += 1;
                    bytes += written;
                    debug!(segment, written, "segment delivered");
                }
            }
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }

    // The pipeline's channel closing is only a success if every segment
    // 0..=lastSegmentNo actually reached the sink (spec.md §4.5 "when the
    // pipeline signals success and m_bufferedData is empty, the session
    // succeeds"). A pipeline that returns early without reporting an error
    // must not be mistaken for a completed fetch.
    match last_segment {
        Some(last) if reorder.is_empty() && reorder.next_to_deliver() == last + 1 => {}
        _ => {
            return Err(FetchError::Other(
                "pipeline ended before all segments were delivered".into(),
            ))
        }
    }

    let elapsed = start.elapsed();
    let summary = match stats {
        Some(stats) => {
            let stats = *stats.lock().unwrap();
            SessionSummary::from_adaptive(stats, segments, bytes, elapsed)
        }
        None => SessionSummary::from_fixed(segments, bytes, elapsed),
    };

    info!(
        segments = summary.segments,
        timeouts = summary.timeouts,
        retransmissions = summary.retransmissions,
        congestion_marks = summary.congestion_marks,
        goodput = %format_goodput(summary.goodput_bits_per_sec()),
        "fetch complete"
    );

    Ok(summary)
}

async fn sleep_until_deadline(deadline_at: Option<Instant>) {
    match deadline_at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
