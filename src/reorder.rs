//! Reorder buffer / consumer
//!
//! Accepts segments from a [`crate::pipeline`] in whatever order they
//! arrive, validates each, buffers it by segment number, and writes content
//! bytes to a caller-supplied sink in strict segment order, per `spec.md`
//! §4.5. Grounded on the original tool's `Consumer`, which holds a
//! `std::map<uint64_t, shared_ptr<Data>>` for exactly this purpose; here a
//! [`std::collections::BTreeMap`] gives the same ascending-key iteration for
//! free.

use std::collections::BTreeMap;

use tracing::trace;

use crate::error::{FetchError, Result};
use crate::packet::{ContentType, Data};
use crate::validator::Validator;

/// Where delivered content bytes go.
///
/// A plain trait (rather than `tokio::io::AsyncWrite`) since the reorder
/// buffer only ever needs one primitive: append these bytes, in order.
pub trait Sink: Send {
    /// Append `bytes`, the next contiguous slice of content.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;
}

impl Sink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Buffers out-of-order [`Data`] by segment number and releases content to
/// a [`Sink`] in strict segment order.
///
/// Per `spec.md` §3 "Per-segment record" invariant: `next_to_deliver` never
/// exceeds the smallest buffered key, i.e. delivery never skips a segment.
pub struct ReorderBuffer {
    buffered: BTreeMap<u64, Data>,
    next_to_deliver: u64,
}

impl ReorderBuffer {
    /// A fresh buffer expecting segment 0 first.
    pub fn new() -> Self {
        ReorderBuffer {
            buffered: BTreeMap::new(),
            next_to_deliver: 0,
        }
    }

    /// Whether every buffered segment has been written to the sink.
    pub fn is_empty(&self) -> bool {
        self.buffered.is_empty()
    }

    /// The next segment number this buffer is waiting to flush. Equals
    /// `last_segment + 1` once every segment `0..=last_segment` has been
    /// delivered to the sink.
    pub fn next_to_deliver(&self) -> u64 {
        self.next_to_deliver
    }

    /// Validate, buffer, and flush as much in-order content as `data`'s
    /// arrival makes available.
    ///
    /// Returns `Ok(())` once `data` (and any segments it unblocks) has been
    /// handled. A validation failure or an application-level Nack content
    /// type is session-fatal and returned as an `Err`; a duplicate arrival
    /// for an already-delivered or already-buffered segment is a silent
    /// no-op per `spec.md` §4.4 invariant 3 / §8 "inserting a segment twice
    /// yields the same delivered stream as inserting it once".
    ///
    /// On success, returns the number of content bytes flushed to `sink` by
    /// this call (0 for a duplicate or a segment still held for reorder).
    pub async fn accept(
        &mut self,
        segment: u64,
        data: Data,
        validator: &dyn Validator,
        sink: &mut dyn Sink,
    ) -> Result<u64> {
        if segment < self.next_to_deliver || self.buffered.contains_key(&segment) {
            trace!(segment, "duplicate segment dropped");
            return Ok(0);
        }

        validator
            .validate(&data)
            .await
            .map_err(|e| FetchError::ValidationFailed(e.to_string()))?;

        if matches!(data.content_type, ContentType::Nack) {
            return Err(FetchError::ApplicationNack { segment });
        }

        self.buffered.insert(segment, data);
        self.flush(sink)
    }

    fn flush(&mut self, sink: &mut dyn Sink) -> Result<u64> {
        let mut written = 0u64;
        while let Some(data) = self.buffered.remove(&self.next_to_deliver) {
            sink.write(&data.content)?;
            written += data.content.len() as u64;
            trace!(segment = self.next_to_deliver, "segment delivered to sink");
            self.next_to_deliver += 1;
        }
        Ok(written)
    }
}

impl Default for ReorderBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;
    use crate::validator::AcceptAllValidator;

    fn data(content: &str) -> Data {
        Data {
            name: Name::parse("/a/b"),
            final_block_id: None,
            freshness_period: None,
            content: content.as_bytes().to_vec(),
            content_type: ContentType::Blob,
            congestion_mark: false,
            signature: vec![],
        }
    }

    #[tokio::test]
    async fn in_order_delivery_streams_immediately() {
        let mut buf = ReorderBuffer::new();
        let mut sink = Vec::new();
        buf.accept(0, data("A"), &AcceptAllValidator, &mut sink).await.unwrap();
        assert_eq!(sink, b"A");
        buf.accept(1, data("BB"), &AcceptAllValidator, &mut sink).await.unwrap();
        assert_eq!(sink, b"ABB");
    }

    #[tokio::test]
    async fn out_of_order_delivery_still_streams_in_order() {
        let mut buf = ReorderBuffer::new();
        let mut sink = Vec::new();

        buf.accept(1, data("BB"), &AcceptAllValidator, &mut sink).await.unwrap();
        assert!(sink.is_empty());

        buf.accept(0, data("A"), &AcceptAllValidator, &mut sink).await.unwrap();
        assert_eq!(sink, b"ABB");

        buf.accept(2, data("CCC"), &AcceptAllValidator, &mut sink).await.unwrap();
        assert_eq!(sink, b"ABBCCC");
    }

    #[tokio::test]
    async fn duplicate_segment_is_a_silent_no_op() {
        let mut buf = ReorderBuffer::new();
        let mut sink = Vec::new();
        buf.accept(0, data("A"), &AcceptAllValidator, &mut sink).await.unwrap();
        buf.accept(0, data("A"), &AcceptAllValidator, &mut sink).await.unwrap();
        assert_eq!(sink, b"A");
        buf.accept(1, data("BB"), &AcceptAllValidator, &mut sink).await.unwrap();
        buf.accept(1, data("BB"), &AcceptAllValidator, &mut sink).await.unwrap();
        assert_eq!(sink, b"ABB");
    }

    #[tokio::test]
    async fn application_nack_content_type_fails_the_session() {
        let mut buf = ReorderBuffer::new();
        let mut sink = Vec::new();
        let mut nacked = data("");
        nacked.content_type = ContentType::Nack;
        let err = buf.accept(0, nacked, &AcceptAllValidator, &mut sink).await.unwrap_err();
        assert!(matches!(err, FetchError::ApplicationNack { segment: 0 }));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn empty_after_fully_drained() {
        let mut buf = ReorderBuffer::new();
        let mut sink = Vec::new();
        buf.accept(0, data("A"), &AcceptAllValidator, &mut sink).await.unwrap();
        assert!(buf.is_empty());
    }
}
