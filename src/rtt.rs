//! Round-trip time estimation
//!
//! Maintains smoothed RTT, RTT variation, and an estimated retransmission
//! timeout using Jacobson/Karn-style updates, per `spec.md` §4.2. The gains
//! are scaled down by the number of samples expected concurrently so that a
//! pipeline with many segments in flight does not over-smooth the estimate
//! from a single sample — grounded on `ndn-cxx`'s `RttEstimator`, whose
//! defaults (`alpha = 1/8`, `beta = 1/4`, `k = 8`) this module keeps.

use std::time::Duration;

use tracing::trace;

/// Tunable parameters for [`RttEstimator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttEstimatorOptions {
    /// Smoothed-RTT gain
    pub alpha: f64,
    /// RTT-variation gain
    pub beta: f64,
    /// RTO variance multiplier
    pub k: u32,
    /// RTO used before any sample has been taken
    pub initial_rto: Duration,
    /// Lower clamp for the computed RTO
    pub min_rto: Duration,
    /// Upper clamp for the computed RTO
    pub max_rto: Duration,
    /// Multiplier applied to the RTO on [`RttEstimator::backoff_rto`]
    pub rto_backoff_multiplier: f64,
}

impl Default for RttEstimatorOptions {
    fn default() -> Self {
        RttEstimatorOptions {
            alpha: 1.0 / 8.0,
            beta: 1.0 / 4.0,
            k: 8,
            initial_rto: Duration::from_secs(1),
            min_rto: Duration::from_millis(200),
            max_rto: Duration::from_secs(60),
            rto_backoff_multiplier: 2.0,
        }
    }
}

fn clamp_duration(d: Duration, min: Duration, max: Duration) -> Duration {
    if d < min {
        min
    } else if d > max {
        max
    } else {
        d
    }
}

/// Running smoothed RTT / RTT-variance / RTO estimate.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    opts: RttEstimatorOptions,
    s_rtt: Option<Duration>,
    rtt_var: Duration,
    rto: Duration,
}

impl RttEstimator {
    /// Build an estimator with the given options; its RTO starts at
    /// `opts.initial_rto` until the first sample arrives.
    pub fn new(opts: RttEstimatorOptions) -> Self {
        let rto = opts.initial_rto;
        RttEstimator {
            opts,
            s_rtt: None,
            rtt_var: Duration::ZERO,
            rto,
        }
    }

    /// Feed a fresh RTT sample measured while `n_expected_samples` segments
    /// were concurrently in flight. Only samples from non-retransmitted
    /// segments should ever be passed here.
    pub fn add_measurement(&mut self, rtt: Duration, n_expected_samples: u32) {
        let n = (n_expected_samples.max(1)) as f64;

        match self.s_rtt {
            None => {
                self.s_rtt = Some(rtt);
                self.rtt_var = rtt / 2;
            }
            Some(s_rtt) => {
                let alpha = self.opts.alpha / n;
                let beta = self.opts.beta / n;
                let rtt_s = rtt.as_secs_f64();
                let s_rtt_s = s_rtt.as_secs_f64();
                let rtt_var_s = self.rtt_var.as_secs_f64();

                let err = (rtt_s - s_rtt_s).abs();
                let new_rtt_var = (1.0 - beta) * rtt_var_s + beta * err;
                let new_s_rtt = (1.0 - alpha) * s_rtt_s + alpha * rtt_s;

                self.rtt_var = Duration::from_secs_f64(new_rtt_var.max(0.0));
                self.s_rtt = Some(Duration::from_secs_f64(new_s_rtt.max(0.0)));
            }
        }

        let s_rtt = self.s_rtt.expect("set above");
        let computed =
            s_rtt.as_secs_f64() + self.opts.k as f64 * self.rtt_var.as_secs_f64();
        self.rto = clamp_duration(
            Duration::from_secs_f64(computed.max(0.0)),
            self.opts.min_rto,
            self.opts.max_rto,
        );

        trace!(
            rtt_ms = rtt.as_millis() as u64,
            s_rtt_ms = self.s_rtt.unwrap().as_millis() as u64,
            rto_ms = self.rto.as_millis() as u64,
            n_expected_samples,
            "rtt sample recorded"
        );
    }

    /// Back off the RTO after a loss/timeout event, up to `max_rto`.
    pub fn backoff_rto(&mut self) {
        let backed_off = self.rto.mul_f64(self.opts.rto_backoff_multiplier);
        self.rto = backed_off.min(self.opts.max_rto);
        trace!(rto_ms = self.rto.as_millis() as u64, "rto backed off");
    }

    /// The current RTO estimate.
    pub fn rto(&self) -> Duration {
        self.rto
    }

    /// The current smoothed RTT, if any sample has been taken.
    pub fn smoothed_rtt(&self) -> Option<Duration> {
        self.s_rtt
    }

    /// The current RTT variation.
    pub fn rtt_var(&self) -> Duration {
        self.rtt_var
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_initializes_srtt_and_half_rttvar() {
        let mut est = RttEstimator::new(RttEstimatorOptions::default());
        est.add_measurement(Duration::from_millis(100), 1);
        assert_eq!(est.smoothed_rtt(), Some(Duration::from_millis(100)));
        assert_eq!(est.rtt_var(), Duration::from_millis(50));
    }

    #[test]
    fn rto_is_clamped() {
        let opts = RttEstimatorOptions {
            min_rto: Duration::from_millis(500),
            max_rto: Duration::from_secs(2),
            ..Default::default()
        };
        let mut est = RttEstimator::new(opts);
        est.add_measurement(Duration::from_millis(1), 1);
        assert!(est.rto() >= Duration::from_millis(500));

        est.add_measurement(Duration::from_secs(10), 1);
        assert!(est.rto() <= Duration::from_secs(2));
    }

    #[test]
    fn many_expected_samples_scale_down_gains() {
        let mut solo = RttEstimator::new(RttEstimatorOptions::default());
        solo.add_measurement(Duration::from_millis(100), 1);
        solo.add_measurement(Duration::from_millis(200), 1);

        let mut crowded = RttEstimator::new(RttEstimatorOptions::default());
        crowded.add_measurement(Duration::from_millis(100), 1);
        crowded.add_measurement(Duration::from_millis(200), 8);

        // With more expected samples, the second measurement should move
        // sRtt less than in the solo case.
        let solo_srtt = solo.smoothed_rtt().unwrap();
        let crowded_srtt = crowded.smoothed_rtt().unwrap();
        assert!(crowded_srtt < solo_srtt);
    }

    #[test]
    fn backoff_doubles_and_clamps() {
        let opts = RttEstimatorOptions {
            max_rto: Duration::from_secs(1),
            ..Default::default()
        };
        let mut est = RttEstimator::new(opts);
        est.add_measurement(Duration::from_millis(100), 1);
        let before = est.rto();
        est.backoff_rto();
        assert!(est.rto() >= before);
        for _ in 0..10 {
            est.backoff_rto();
        }
        assert_eq!(est.rto(), Duration::from_secs(1));
    }
}
