//! Congestion-controlled Interest pipelines
//!
//! Three strategies share the same outward shape — fetch every segment of
//! a versioned name, delivering each as soon as it arrives, in whatever
//! order the network returns it — per `spec.md` §4.4. [`fixed`] keeps a
//! constant number of Interests outstanding; [`aimd`] and [`cubic`] grow
//! and shrink that number using the shared engine in [`adaptive`].

pub mod adaptive;
pub mod aimd;
pub mod cubic;
pub mod fixed;

pub use aimd::fetch_aimd;
pub use cubic::fetch_cubic;
pub use fixed::fetch_fixed;

use crate::error::FetchError;
use crate::packet::Data;

/// Retransmission state of one in-flight segment.
///
/// The original tool's adaptive pipeline historically distinguished a
/// fourth state, `RetxReceived` (Data arrived for a segment already queued
/// for retransmission, but before the retransmission itself was sent). The
/// merged state machine used here — without that state — reflects the
/// later revision of the same engine, which folds that transition into
/// [`SegmentState::FirstTimeSent`] simply completing before retransmission
/// occurs (see `SPEC_FULL.md` §9 for the resolution of this point).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Sent once, not yet acknowledged or queued for retransmission.
    FirstTimeSent,
    /// Judged lost (RTO elapsed or a retryable Nack arrived) and waiting
    /// for a retransmission slot.
    InRetxQueue,
    /// Retransmitted at least once; still outstanding.
    Retransmitted,
}

/// One segment's terminal outcome as delivered to the reorder buffer.
pub type SegmentResult = Result<(u64, Data), FetchError>;

/// How a failed segment should be treated given what is currently known
/// about the content's length, per `spec.md` §4.4 invariant 4 ("deferred
/// failure") and §9 "Deferred failure must retract if FinalBlockId proves
/// it irrelevant".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureVerdict {
    /// `FinalBlockId` is known and the failed segment is within the
    /// content: the session must fail.
    Fatal,
    /// `FinalBlockId` is not yet known: hold the failure until it is
    /// learnt, then re-classify.
    Deferred,
    /// `FinalBlockId` is known and the failed segment is beyond the last
    /// segment of the content: it was never part of the content (e.g. a
    /// speculative request sent before the window learnt where the content
    /// ends) and the failure is discarded silently.
    Irrelevant,
}

/// Classify a segment failure against the (possibly still-unknown) final
/// segment number of the content.
pub fn classify_failure(segment: u64, final_segment: Option<u64>) -> FailureVerdict {
    match final_segment {
        Some(last) if segment <= last => FailureVerdict::Fatal,
        Some(_) => FailureVerdict::Irrelevant,
        None => FailureVerdict::Deferred,
    }
}
