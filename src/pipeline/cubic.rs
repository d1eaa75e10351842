//! CUBIC congestion window adaptation
//!
//! Implements the CUBIC window-growth function, per `spec.md` §4.4.4.
//! Grounded on the original tool's `PipelineInterestsCubic`: after a
//! congestion event the window remembers `wMax`, the size it had just
//! before backing off, and grows back toward (and beyond) `wMax` along a
//! cubic curve parameterized by `c` and the elapsed time since the last
//! decrease, rather than linearly as AIMD does. Below `ssthresh` the window
//! still grows by one segment per acknowledgment (slow start), exactly as
//! AIMD does.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::face::Face;
use crate::name::{Name, NamingConvention};
use crate::options::{AdaptiveOptions, CubicOptions};
use crate::sample_log::SampleLog;
use crate::validator::Validator;

use super::adaptive::{self, AdaptiveStats, WindowController};
use super::SegmentResult;

struct CubicWindow {
    opts: CubicOptions,
    /// Window size just before the most recent decrease.
    w_max: f64,
    /// `wMax` as of the decrease before that one (used only by fast
    /// convergence).
    last_w_max: f64,
    ssthresh: f64,
    last_decrease_time: Instant,
}

impl CubicWindow {
    fn new(opts: CubicOptions, init_cwnd: f64, init_ssthresh: f64) -> Self {
        CubicWindow {
            opts,
            w_max: init_cwnd,
            last_w_max: init_cwnd,
            ssthresh: init_ssthresh,
            last_decrease_time: Instant::now(),
        }
    }
}

impl WindowController for CubicWindow {
    fn increase(&mut self, cwnd: f64, srtt: Duration, opts: &AdaptiveOptions) -> f64 {
        if cwnd < self.ssthresh {
            return cwnd + 1.0;
        }

        if self.w_max < opts.init_cwnd {
            self.w_max = cwnd;
        }

        let t = self.last_decrease_time.elapsed().as_secs_f64();
        let k = (self.w_max * (1.0 - self.opts.beta) / self.opts.c).cbrt();
        let w_cubic = self.opts.c * (t - k).powi(3) + self.w_max;

        let srtt_s = srtt.as_secs_f64().max(f64::EPSILON);
        let w_est = self.w_max * self.opts.beta
            + 3.0 * (1.0 - self.opts.beta) / (1.0 + self.opts.beta) * t / srtt_s;

        let increment = (w_cubic.max(w_est) - cwnd).max(0.0);
        cwnd + increment / cwnd
    }

    fn decrease(&mut self, cwnd: f64, opts: &AdaptiveOptions) -> f64 {
        if self.opts.enable_fast_conv && cwnd < self.last_w_max {
            self.last_w_max = cwnd;
            self.w_max = cwnd * (1.0 + self.opts.beta) / 2.0;
        } else {
            self.last_w_max = cwnd;
            self.w_max = cwnd;
        }
        self.ssthresh = opts.init_cwnd.max(cwnd * self.opts.beta);
        self.last_decrease_time = Instant::now();
        self.ssthresh
    }
}

/// Fetch every segment of `versioned_name` using a CUBIC-controlled
/// window, delivering results on the returned channel as they complete.
#[allow(clippy::too_many_arguments)]
pub fn fetch_cubic(
    face: Arc<dyn Face>,
    validator: Arc<dyn Validator>,
    versioned_name: Name,
    final_segment: Option<u64>,
    naming_convention: NamingConvention,
    interest_lifetime: Duration,
    must_be_fresh: bool,
    adaptive_opts: AdaptiveOptions,
    cubic_opts: CubicOptions,
    max_retries: Option<u32>,
    cwnd_log: Option<SampleLog>,
    rtt_log: Option<SampleLog>,
) -> (mpsc::UnboundedReceiver<SegmentResult>, Arc<Mutex<AdaptiveStats>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stats = Arc::new(Mutex::new(AdaptiveStats::default()));
    let window = Box::new(CubicWindow::new(cubic_opts, adaptive_opts.init_cwnd, adaptive_opts.init_ssthresh));
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_start_grows_by_one_until_ssthresh() {
        let mut w = CubicWindow::new(CubicOptions::default(), 2.0, f64::MAX);
        assert_eq!(
            w.increase(2.0, Duration::from_millis(50), &AdaptiveOptions::default()),
            3.0
        );
    }

    #[test]
    fn decrease_applies_beta_and_sets_wmax() {
        let mut w = CubicWindow::new(CubicOptions::default(), 2.0, f64::MAX);
        w.last_w_max = 10.0; // fast-conv gate: only triggers when cwnd < last_w_max
        let opts = AdaptiveOptions::default();
        let new_cwnd = w.decrease(10.0, &opts);
        assert!((new_cwnd - 7.0).abs() < 1e-9); // 10 * beta(0.7)
        assert!((w.w_max - 10.0).abs() < 1e-9);
    }

    #[test]
    fn decrease_floors_ssthresh_at_init_cwnd() {
        let mut w = CubicWindow::new(CubicOptions::default(), 2.0, f64::MAX);
        let opts = AdaptiveOptions {
            init_cwnd: 5.0,
            ..AdaptiveOptions::default()
        };
        let new_cwnd = w.decrease(2.0, &opts);
        assert_eq!(new_cwnd, 5.0);
    }

    #[test]
    fn increase_past_ssthresh_grows_toward_wmax() {
        let mut w = CubicWindow::new(CubicOptions::default(), 2.0, f64::MAX);
        let opts = AdaptiveOptions::default();
        w.decrease(10.0, &opts);
        let ssthresh = w.ssthresh;
        let grown = w.increase(ssthresh, Duration::from_millis(50), &opts);
        assert!(grown >= ssthresh);
    }
}
