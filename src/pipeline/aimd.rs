//! AIMD congestion window adaptation
//!
//! Slow start followed by additive-increase/multiplicative-decrease, per
//! `spec.md` §4.4.3. Grounded on the original tool's
//! `PipelineInterestsAimd`: below `ssthresh` the window grows by one
//! segment per acknowledgment (slow start); at or above it, by
//! `additiveIncrease / cwnd` per acknowledgment (congestion avoidance), and
//! a congestion signal sets `ssthresh := max(2.0, cwnd * mdCoef)` and either
//! resets the window to `initCwnd` or drops it to the new `ssthresh`
//! (RFC 5681 style).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::face::Face;
use crate::name::{Name, NamingConvention};
use crate::options::{AdaptiveOptions, AimdOptions};
use crate::sample_log::SampleLog;
use crate::validator::Validator;

use super::adaptive::{self, AdaptiveStats, WindowController};
use super::SegmentResult;

struct AimdWindow {
    opts: AimdOptions,
    ssthresh: f64,
}

impl WindowController for AimdWindow {
    fn increase(&mut self, cwnd: f64, _srtt: Duration, _opts: &AdaptiveOptions) -> f64 {
        if cwnd < self.ssthresh {
            cwnd + 1.0
        } else {
            cwnd + self.opts.additive_increase / cwnd
        }
    }

    fn decrease(&mut self, cwnd: f64, opts: &AdaptiveOptions) -> f64 {
        self.ssthresh = (cwnd * self.opts.multiplicative_decrease).max(2.0);
        if self.opts.reset_cwnd_to_init {
            opts.init_cwnd
        } else {
            self.ssthresh
        }
    }
}

/// Fetch every segment of `versioned_name` using an AIMD-controlled
/// window, delivering results on the returned channel as they complete.
#[allow(clippy::too_many_arguments)]
pub fn fetch_aimd(
    face: Arc<dyn Face>,
    validator: Arc<dyn Validator>,
    versioned_name: Name,
    final_segment: Option<u64>,
    naming_convention: NamingConvention,
    interest_lifetime: Duration,
    must_be_fresh: bool,
    adaptive_opts: AdaptiveOptions,
    aimd_opts: AimdOptions,
    max_retries: Option<u32>,
    cwnd_log: Option<SampleLog>,
    rtt_log: Option<SampleLog>,
) -> (mpsc::UnboundedReceiver<SegmentResult>, Arc<Mutex<AdaptiveStats>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stats = Arc::new(Mutex::new(AdaptiveStats::default()));
    let window = Box::new(AimdWindow {
        ssthresh: adaptive_opts.init_ssthresh,
        opts: aimd_opts,
    });
    tokio::spawn(adaptive::run(
        face,
        validator,
        versioned_name,
        final_segment,
        naming_convention,
        interest_lifetime,
        must_be_fresh,
        adaptive_opts.rtt,
        adaptive_opts,
        max_retries,
        window,
        tx,
        stats.clone(),
        cwnd_log,
        rtt_log,
    ));
    (rx, stats)
}
