#![doc = include_str!("../README.md")]

/// Single-segment fetch with retry
pub mod data_fetcher;
/// Version discovery
pub mod discovery;
/// Fetch engine error types
pub mod error;
/// The network-facing collaborator interface
pub mod face;
/// Name and component model
pub mod name;
/// Fetch session and pipeline configuration
pub mod options;
/// In-memory packet types
pub mod packet;
/// Congestion-controlled Interest pipelines
pub mod pipeline;
/// Reorder buffer / consumer
pub mod reorder;
/// RTT estimation
pub mod rtt;
/// Time-series sample logging for `--log-cwnd`/`--log-rtt`
pub mod sample_log;
/// Top-level fetch orchestrator
pub mod session;
/// Data validation collaborator
pub mod validator;

pub use data_fetcher::{fetch_segment, DataFetcherOptions};
pub use discovery::{discover_version, DiscoveryOptions, DiscoveryOutcome};
pub use error::{FetchError, Result};
pub use face::{Face, FaceEvent, PendingInterest};
pub use name::{Component, Name, NamingConvention};
pub use options::{
    AdaptiveOptions, AimdOptions, CubicOptions, FetchOptions, FixedOptions, PipelineKind,
};
pub use packet::{ContentType, Data, Interest, Nack, NackReason};
pub use pipeline::{fetch_aimd, fetch_cubic, fetch_fixed};
pub use reorder::{ReorderBuffer, Sink};
pub use rtt::{RttEstimator, RttEstimatorOptions};
pub use sample_log::SampleLog;
pub use session::{cancellation, run as run_fetch_session, CancelHandle, CancelSignal, SessionSummary};
pub use validator::{AcceptAllValidator, Validator};
