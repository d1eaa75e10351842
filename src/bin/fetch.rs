//! `segfetch` — fetch a segmented object by name.
//!
//! This binary is wired against an in-memory [`DemoFace`], not a real
//! forwarder connection: building a transport adapter for an actual
//! content-centric network stack is out of scope (`spec.md` §1's
//! "Non-goals"), so the demonstration producer below synthesizes the
//! requested object itself, deterministically, so every pipeline type and
//! CLI flag has something real to exercise end to end.

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::error;

use segfetch::discovery::encode_metadata_payload;
use segfetch::face::{Face, FaceEvent, PendingInterest};
use segfetch::name::{Name, NamingConvention};
use segfetch::options::{
    AdaptiveOptions, AimdOptions, CubicOptions, DataFetcherOptions, DiscoveryOptions, FetchOptions,
    FixedOptions, PipelineKind,
};
use segfetch::packet::{ContentType, Data, Interest};
use segfetch::reorder::Sink;
use segfetch::rtt::RttEstimatorOptions;
use segfetch::sample_log::SampleLog;
use segfetch::validator::{AcceptAllValidator, Validator};
use segfetch::{cancellation, session, FetchError};

/// Adapts the process's standard output stream to [`Sink`].
struct StdoutSink(std::io::Stdout);

impl Sink for StdoutSink {
    fn write(&mut self, bytes: &[u8]) -> segfetch::Result<()> {
        self.0
            .lock()
            .write_all(bytes)
            .map_err(|e| FetchError::Other(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PipelineTypeArg {
    Fixed,
    Aimd,
    Cubic,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum NamingConventionArg {
    Marker,
    Typed,
}

/// Fetch a segmented object from a content-centric network by name.
#[derive(Debug, Parser)]
#[command(name = "segfetch", version, about)]
struct Cli {
    /// The content name to fetch (may or may not include a trailing version)
    ndn_name: String,

    /// Set MustBeFresh on Interests
    #[arg(long)]
    fresh: bool,

    /// Interest lifetime, in milliseconds
    #[arg(long, default_value_t = 4000)]
    lifetime: u64,

    /// Per-Interest retry ceiling on timeout or Nack (-1 = unlimited)
    #[arg(long, default_value_t = 3, allow_negative_numbers = true)]
    retries: i64,

    /// Congestion-control strategy
    #[arg(long = "pipeline-type", value_enum, default_value = "cubic")]
    pipeline_type: PipelineTypeArg,

    /// Skip version discovery even if the name has no version component
    #[arg(long)]
    no_version_discovery: bool,

    /// On-wire encoding of segment/version name components
    #[arg(long = "naming-convention", value_enum, default_value = "typed")]
    naming_convention: NamingConventionArg,

    /// Number of Interests kept outstanding at all times (fixed pipeline only)
    #[arg(long = "pipeline-size", default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..=1024))]
    pipeline_size: u64,

    /// Ignore a Data's congestion mark rather than treating it as a loss signal
    #[arg(long = "ignore-marks")]
    ignore_marks: bool,

    /// Disable Conservative Window Adaptation
    #[arg(long = "disable-cwa")]
    disable_cwa: bool,

    /// Initial congestion window, in segments
    #[arg(long = "init-cwnd", default_value_t = 2.0)]
    init_cwnd: f64,

    /// Initial slow-start threshold, in segments (unset = unbounded)
    #[arg(long = "init-ssthresh")]
    init_ssthresh: Option<f64>,

    /// Smoothed-RTT gain
    #[arg(long = "rto-alpha", default_value_t = 0.125)]
    rto_alpha: f64,

    /// RTT-variation gain
    #[arg(long = "rto-beta", default_value_t = 0.25)]
    rto_beta: f64,

    /// RTO variance multiplier
    #[arg(long = "rto-k", default_value_t = 8)]
    rto_k: u32,

    /// Lower clamp for the computed RTO, in milliseconds
    #[arg(long = "min-rto", default_value_t = 200)]
    min_rto: u64,

    /// Upper clamp for the computed RTO, in milliseconds
    #[arg(long = "max-rto", default_value_t = 60_000)]
    max_rto: u64,

    /// AIMD additive-increase step
    #[arg(long = "aimd-step", default_value_t = 1.0)]
    aimd_step: f64,

    /// AIMD multiplicative-decrease factor
    #[arg(long = "aimd-beta", default_value_t = 0.5)]
    aimd_beta: f64,

    /// Reset the window to init-cwnd on every AIMD decrease
    #[arg(long = "reset-cwnd-to-init")]
    reset_cwnd_to_init: bool,

    /// CUBIC window multiplier applied on a congestion event
    #[arg(long = "cubic-beta", default_value_t = 0.7)]
    cubic_beta: f64,

    /// Enable CUBIC fast convergence
    #[arg(long = "fast-conv")]
    fast_conv: bool,

    /// Only print fatal errors
    #[arg(long, conflicts_with = "verbose")]
    quiet: bool,

    /// Print a per-segment trace and a completion summary
    #[arg(long, conflicts_with = "quiet")]
    verbose: bool,

    /// Append a congestion-window sample log to this path
    #[arg(long = "log-cwnd")]
    log_cwnd: Option<PathBuf>,

    /// Append an RTT sample log to this path
    #[arg(long = "log-rtt")]
    log_rtt: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "segfetch=error"
    } else if cli.verbose {
        "segfetch=debug"
    } else {
        "segfetch=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Runtime::new().expect("failed to start async runtime");
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> ExitCode {
    let options = match build_options(&cli) {
        Ok(opts) => opts,
        Err(msg) => {
            eprintln!("segfetch: {msg}");
            return ExitCode::from(2);
        }
    };

    let cwnd_log = match open_sample_log(&cli.log_cwnd, "--log-cwnd") {
        Ok(log) => log,
        Err(code) => return code,
    };
    let rtt_log = match open_sample_log(&cli.log_rtt, "--log-rtt") {
        Ok(log) => log,
        Err(code) => return code,
    };

    let naming_convention = options.naming_convention;
    let prefix = Name::parse(&cli.ndn_name);
    let face: Arc<dyn Face> = Arc::new(DemoFace::new(prefix.clone(), naming_convention));
    let validator: Arc<dyn Validator> = Arc::new(AcceptAllValidator);

    let mut sink = StdoutSink(std::io::stdout());
    let (_handle, cancel) = cancellation();

    let result = session::run(
        face,
        validator,
        prefix,
        &mut sink,
        &options,
        None,
        cancel,
        cwnd_log,
        rtt_log,
    )
    .await;

    match result {
        Ok(summary) => {
            let _ = sink.0.flush();
            if cli.verbose {
                let avg = summary
                    .avg_rtt
                    .map(|d| format!("{:.1}ms", d.as_secs_f64() * 1000.0))
                    .unwrap_or_else(|| "n/a".into());
                let min = summary
                    .min_rtt
                    .map(|d| format!("{:.1}ms", d.as_secs_f64() * 1000.0))
                    .unwrap_or_else(|| "n/a".into());
                let max = summary
                    .max_rtt
                    .map(|d| format!("{:.1}ms", d.as_secs_f64() * 1000.0))
                    .unwrap_or_else(|| "n/a".into());
                eprintln!(
                    "segments={} timeouts={} retransmissions={} congestion_marks={} goodput={} rtt(min/avg/max)={}/{}/{}",
                    summary.segments,
                    summary.timeouts,
                    summary.retransmissions,
                    summary.congestion_marks,
                    session::format_goodput(summary.goodput_bits_per_sec()),
                    min,
                    avg,
                    max,
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "fetch failed");
            match e {
                FetchError::ApplicationNack { .. } => ExitCode::from(3),
                FetchError::ValidationFailed(_) => ExitCode::from(5),
                _ => ExitCode::from(1),
            }
        }
    }
}

/// Open `path` for appending, wrapping it as a [`SampleLog`]; `None` if no
/// path was given. An open failure is reported on stderr and mapped to exit
/// code 4, per `spec.md` §6.
fn open_sample_log(path: &Option<PathBuf>, flag: &str) -> Result<Option<SampleLog>, ExitCode> {
    let Some(path) = path else { return Ok(None) };
    match std::fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Ok(Some(SampleLog::new(file))),
        Err(e) => {
            eprintln!("segfetch: could not open {flag} file {}: {e}", path.display());
            Err(ExitCode::from(4))
        }
    }
}

fn build_options(cli: &Cli) -> Result<FetchOptions, String> {
    let naming_convention = match cli.naming_convention {
        NamingConventionArg::Marker => NamingConvention::Marker,
        NamingConventionArg::Typed => NamingConvention::Typed,
    };
    let pipeline = match cli.pipeline_type {
        PipelineTypeArg::Fixed => PipelineKind::Fixed,
        PipelineTypeArg::Aimd => PipelineKind::Aimd,
        PipelineTypeArg::Cubic => PipelineKind::Cubic,
    };
    let max_retries = if cli.retries < 0 {
        None
    } else {
        Some(cli.retries as u32)
    };

    let rtt = RttEstimatorOptions {
        alpha: cli.rto_alpha,
        beta: cli.rto_beta,
        k: cli.rto_k,
        min_rto: Duration::from_millis(cli.min_rto),
        max_rto: Duration::from_millis(cli.max_rto),
        ..RttEstimatorOptions::default()
    };

    let adaptive = AdaptiveOptions {
        init_cwnd: cli.init_cwnd,
        init_ssthresh: cli.init_ssthresh.unwrap_or(f64::MAX),
        enable_cwa: !cli.disable_cwa,
        ignore_congestion_marks: cli.ignore_marks,
        rtt,
        ..AdaptiveOptions::default()
    };

    Ok(FetchOptions {
        pipeline,
        naming_convention,
        interest_lifetime: Duration::from_millis(cli.lifetime),
        data_fetcher: DataFetcherOptions {
            max_retries_on_timeout_or_nack: max_retries,
            ..DataFetcherOptions::default()
        },
        discovery: DiscoveryOptions {
            max_retries,
            interest_lifetime: Duration::from_millis(cli.lifetime),
            naming_convention,
        },
        skip_version_discovery: cli.no_version_discovery,
        must_be_fresh: cli.fresh,
        fixed: FixedOptions {
            window: cli.pipeline_size,
        },
        adaptive,
        aimd: AimdOptions {
            additive_increase: cli.aimd_step,
            multiplicative_decrease: cli.aimd_beta,
            reset_cwnd_to_init: cli.reset_cwnd_to_init,
        },
        cubic: CubicOptions {
            beta: cli.cubic_beta,
            enable_fast_conv: cli.fast_conv,
            ..CubicOptions::default()
        },
    })
}

/// A self-contained in-memory producer standing in for a real forwarder
/// connection. Deterministically synthesizes a 10-segment, 64-byte-segment
/// object for any requested prefix so the binary has something real to
/// fetch without depending on an external network.
struct DemoFace {
    prefix: Name,
    naming_convention: NamingConvention,
    content: Vec<u8>,
    segment_size: usize,
    version: u64,
}

impl DemoFace {
    fn new(prefix: Name, naming_convention: NamingConvention) -> Self {
        let segment_size = 64;
        let total_segments = 10usize;
        let content: Vec<u8> = (0..segment_size * total_segments)
            .map(|i| b'a' + (i % 26) as u8)
            .collect();
        DemoFace {
            prefix,
            naming_convention,
            content,
            segment_size,
            version: 1,
        }
    }

    fn last_segment(&self) -> u64 {
        (self.content.len() / self.segment_size - 1) as u64
    }
}

impl Face for DemoFace {
    fn express(&self, interest: Interest) -> PendingInterest {
        let (tx, rx) = tokio::sync::oneshot::channel();

        let event = if interest.can_be_prefix {
            let versioned = self.prefix.append_version(self.version, self.naming_convention);
            FaceEvent::Data(Data {
                name: interest.name,
                final_block_id: None,
                freshness_period: None,
                content: encode_metadata_payload(&versioned),
                content_type: ContentType::Blob,
                congestion_mark: false,
                signature: vec![],
            })
        } else {
            match interest.name.segment_number(self.naming_convention) {
                Ok(segment) => {
                    let last = self.last_segment();
                    let start = segment as usize * self.segment_size;
                    let end = (start + self.segment_size).min(self.content.len());
                    let payload = if start < self.content.len() {
                        self.content[start..end].to_vec()
                    } else {
                        Vec::new()
                    };
                    FaceEvent::Data(Data {
                        name: interest.name,
                        final_block_id: Some(last),
                        freshness_period: None,
                        content: payload,
                        content_type: ContentType::Blob,
                        congestion_mark: false,
                        signature: vec![],
                    })
                }
                Err(_) => FaceEvent::Timeout,
            }
        };

        let _ = tx.send(event);
        PendingInterest::new(rx)
    }
}
