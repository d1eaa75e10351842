//! Fetch session and pipeline configuration
//!
//! One options struct per pipeline kind, plus the session-wide
//! [`FetchOptions`] that wraps them, per `spec.md` §6's option tables.
//! Grounded on the teacher's `config::ServerConfig`/`RetryConfig`, which
//! similarly groups connection-wide settings alongside a nested retry
//! policy with sensible defaults; `serde` derives are gated behind the
//! `serde` feature the same way the teacher gates optional functionality.

use std::time::Duration;

use crate::data_fetcher::DataFetcherOptions;
use crate::discovery::DiscoveryOptions;
use crate::name::NamingConvention;
use crate::rtt::RttEstimatorOptions;

/// Which window-growth strategy a pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PipelineKind {
    /// A constant number of Interests in flight at all times.
    Fixed,
    /// Additive-increase/multiplicative-decrease window adaptation.
    Aimd,
    /// CUBIC window adaptation.
    Cubic,
}

/// Options for the [`crate::pipeline::fixed`] pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FixedOptions {
    /// Number of Interests kept outstanding at all times.
    pub window: u64,
}

impl Default for FixedOptions {
    fn default() -> Self {
        FixedOptions { window: 1 }
    }
}

/// Options shared by every adaptive (AIMD/CUBIC) pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdaptiveOptions {
    /// Initial congestion window, in segments.
    pub init_cwnd: f64,
    /// Initial slow-start threshold; growth is linear (one segment per
    /// acknowledgment) below this and sub-linear at or above it, until the
    /// first decrease sets a new value (`spec.md` §4.4.3/§4.4.4).
    pub init_ssthresh: f64,
    /// Minimum congestion window a backoff may shrink to.
    pub min_cwnd: f64,
    /// Upper bound the congestion window may never exceed.
    pub max_cwnd: f64,
    /// Whether Conservative Window Adaptation is enabled: at most one
    /// window decrease per RTT (tracked via a `recoveryPoint` segment
    /// number, per `spec.md` §4.4.2).
    pub enable_cwa: bool,
    /// Whether a Data's congestion mark is ignored entirely (the CLI's
    /// `--ignore-marks`), rather than treated as a congestion signal.
    pub ignore_congestion_marks: bool,
    /// RTT estimator tunables.
    pub rtt: RttEstimatorOptions,
}

impl Default for AdaptiveOptions {
    fn default() -> Self {
        AdaptiveOptions {
            init_cwnd: 2.0,
            init_ssthresh: f64::MAX,
            min_cwnd: 1.0,
            max_cwnd: f64::MAX,
            enable_cwa: true,
            ignore_congestion_marks: false,
            rtt: RttEstimatorOptions::default(),
        }
    }
}

/// Options specific to the AIMD pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AimdOptions {
    /// Window growth per RTT during additive increase.
    pub additive_increase: f64,
    /// Multiplicative decrease factor applied to the window on loss.
    pub multiplicative_decrease: f64,
    /// Reset the window to `init_cwnd` on every decrease, instead of to the
    /// (generally larger) post-decrease `ssthresh`.
    pub reset_cwnd_to_init: bool,
}

impl Default for AimdOptions {
    fn default() -> Self {
        AimdOptions {
            additive_increase: 1.0,
            multiplicative_decrease: 0.5,
            reset_cwnd_to_init: false,
        }
    }
}

/// Options specific to the CUBIC pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CubicOptions {
    /// CUBIC's scaling constant.
    pub c: f64,
    /// Window multiplier applied on a congestion event.
    pub beta: f64,
    /// Whether fast convergence is enabled (shrinks `wMax` further when the
    /// window was still growing at the last congestion event).
    pub enable_fast_conv: bool,
}

impl Default for CubicOptions {
    fn default() -> Self {
        CubicOptions {
            c: 0.4,
            beta: 0.7,
            enable_fast_conv: true,
        }
    }
}

/// Top-level options for a [`crate::session::FetchSession`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FetchOptions {
    /// Which congestion-control strategy to run.
    pub pipeline: PipelineKind,
    /// Byte-level encoding for segment/version name components.
    pub naming_convention: NamingConvention,
    /// Lifetime given to every data-fetching Interest.
    pub interest_lifetime: Duration,
    /// Retry policy applied to each segment fetch.
    pub data_fetcher: DataFetcherOptions,
    /// Policy applied to the initial version-discovery round trip.
    pub discovery: DiscoveryOptions,
    /// Skip version discovery even if `prefix` has no version component
    /// (the CLI's `--no-version-discovery`); the name is then fetched
    /// as-is, unversioned.
    pub skip_version_discovery: bool,
    /// Set MustBeFresh on every per-segment fetch Interest (the CLI's
    /// `--fresh`). The version-discovery Interest always sets MustBeFresh
    /// regardless of this flag (`spec.md` §4.3).
    pub must_be_fresh: bool,
    /// Fixed-window-pipeline-specific options.
    pub fixed: FixedOptions,
    /// Adaptive-pipeline-specific options shared by AIMD and CUBIC.
    pub adaptive: AdaptiveOptions,
    /// AIMD-specific options, used only when `pipeline == Aimd`.
    pub aimd: AimdOptions,
    /// CUBIC-specific options, used only when `pipeline == Cubic`.
    pub cubic: CubicOptions,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            pipeline: PipelineKind::Cubic,
            naming_convention: NamingConvention::default(),
            interest_lifetime: Duration::from_secs(4),
            data_fetcher: DataFetcherOptions::default(),
            discovery: DiscoveryOptions::default(),
            skip_version_discovery: false,
            must_be_fresh: false,
            fixed: FixedOptions::default(),
            adaptive: AdaptiveOptions::default(),
            aimd: AimdOptions::default(),
            cubic: CubicOptions::default(),
        }
    }
}
