//! Fixed-window Interest pipeline
//!
//! Keeps exactly `window` Interests outstanding at all times and relies on
//! [`crate::data_fetcher::fetch_segment`]'s own retry policy rather than
//! any RTT-driven retransmission, per `spec.md` §4.4.1. Grounded on the
//! original tool's `PipelineInterestsFixedWindow`, the simplest of its
//! three pipelines, and on the teacher's `ratelimit`-gated concurrent
//! fetch pattern for bounding how many requests run at once.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

use crate::data_fetcher::{self, DataFetcherOptions};
use crate::error::FetchError;
use crate::face::Face;
use crate::name::{Name, NamingConvention};
use crate::options::FixedOptions;
use crate::packet::Interest;
use crate::validator::Validator;

use super::{classify_failure, FailureVerdict, SegmentResult};

/// Fetch every segment of `versioned_name` with a constant number of
/// Interests outstanding, delivering results on the returned channel as
/// they complete (not necessarily in segment order).
pub fn fetch_fixed(
    face: Arc<dyn Face>,
    validator: Arc<dyn Validator>,
    versioned_name: Name,
    final_segment: Option<u64>,
    naming_convention: NamingConvention,
    fixed_opts: FixedOptions,
    fetcher_opts: DataFetcherOptions,
    interest_lifetime: Duration,
    must_be_fresh: bool,
) -> mpsc::UnboundedReceiver<SegmentResult> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run(
        face,
        validator,
        versioned_name,
        final_segment,
        naming_convention,
        fixed_opts,
        fetcher_opts,
        interest_lifetime,
        must_be_fresh,
        tx,
    ));
    rx
}

async fn run(
    face: Arc<dyn Face>,
    validator: Arc<dyn Validator>,
    versioned_name: Name,
    mut final_segment: Option<u64>,
    naming_convention: NamingConvention,
    fixed_opts: FixedOptions,
    fetcher_opts: DataFetcherOptions,
    interest_lifetime: Duration,
    must_be_fresh: bool,
    tx: mpsc::UnboundedSender<SegmentResult>,
) {
    let mut next_to_send: u64 = 0;
    // Segments whose DataFetcher failed before FinalBlockId was known; kept
    // until the content's length is learnt, then re-classified (§4.4
    // invariant 4, §9 "Deferred failure").
    let mut deferred_failures: Vec<(u64, FetchError)> = Vec::new();

    if final_segment.is_none() {
        let data = fetch_one(
            &*face,
            &*validator,
            &versioned_name,
            0,
            naming_convention,
            interest_lifetime,
            must_be_fresh,
            &fetcher_opts,
        )
        .await;
        match data {
            Ok(data) => {
                final_segment = data.final_block_id;
                next_to_send = 1;
                if tx.send(Ok((0, data))).is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        }
    }

    let mut inflight = FuturesUnordered::new();
    let window = fixed_opts.window.max(1);

    loop {
        while (inflight.len() as u64) < window {
            let segment = match final_segment {
                Some(last) if next_to_send > last => break,
                _ => next_to_send,
            };
            next_to_send += 1;

            let face = face.clone();
            let validator = validator.clone();
            let name = versioned_name.clone();
            inflight.push(Box::pin(async move {
                let result = fetch_one(
                    &*face,
                    &*validator,
                    &name,
                    segment,
                    naming_convention,
                    interest_lifetime,
                    must_be_fresh,
                    &fetcher_opts,
                )
                .await;
                (segment, result)
            }));

            if final_segment.is_some_and(|last| next_to_send > last) {
                break;
            }
        }

        let Some((segment, result)) = inflight.next().await else {
            break;
        };

        debug!(segment, ok = result.is_ok(), "segment fetch completed");

        match result {
            Ok(data) => {
                if final_segment.is_none() {
                    if let Some(last) = data.final_block_id {
                        final_segment = Some(last);
                        // A FinalBlockId just arrived: re-classify every
                        // failure we had been holding open.
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
                if tx.send(Ok((segment, data))).is_err() {
                    return;
                }
            }
            Err(e) => match classify_failure(segment, final_segment) {
                FailureVerdict::Fatal => {
                    let _ = tx.send(Err(e));
                    return;
                }
                FailureVerdict::Irrelevant => {}
                FailureVerdict::Deferred => deferred_failures.push((segment, e)),
            },
        }

        if let Some(last) = final_segment {
            if next_to_send > last && inflight.is_empty() {
                break;
            }
        }
    }
}

async fn fetch_one(
    face: &dyn Face,
    validator: &dyn Validator,
    versioned_name: &Name,
    segment: u64,
    naming_convention: NamingConvention,
    interest_lifetime: Duration,
    must_be_fresh: bool,
    fetcher_opts: &DataFetcherOptions,
) -> crate::error::Result<crate::packet::Data> {
    let name = versioned_name.append_segment(segment, naming_convention);
    let interest = Interest::new(name, must_be_fresh, interest_lifetime);
    data_fetcher::fetch_segment(face, validator, interest, fetcher_opts).await
}
