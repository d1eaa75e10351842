//! Minimal library-level usage example: fetch a small in-memory object with
//! each of the three pipeline strategies and print how many segments/bytes
//! each one delivered.
//!
//! Run with `cargo run --example fetch_demo`.

use std::sync::Arc;

use segfetch::discovery::encode_metadata_payload;
use segfetch::face::{Face, FaceEvent, PendingInterest};
use segfetch::name::{Name, NamingConvention};
use segfetch::options::{FetchOptions, FixedOptions, PipelineKind};
use segfetch::packet::{ContentType, Data, Interest};
use segfetch::validator::AcceptAllValidator;
use segfetch::{cancellation, session};

/// Synthesizes a 5-segment, 16-byte-segment object for any requested prefix.
struct InMemoryFace {
    prefix: Name,
    naming_convention: NamingConvention,
    content: Vec<u8>,
    segment_size: usize,
}

impl InMemoryFace {
    fn new(prefix: Name, naming_convention: NamingConvention) -> Self {
        let segment_size = 16;
        let content: Vec<u8> = (0..segment_size * 5).map(|i| b'A' + (i % 26) as u8).collect();
        InMemoryFace { prefix, naming_convention, content, segment_size }
    }

    fn last_segment(&self) -> u64 {
        (self.content.len() / self.segment_size - 1) as u64
    }
}

impl Face for InMemoryFace {
    fn express(&self, interest: Interest) -> PendingInterest {
        let (tx, rx) = tokio::sync::oneshot::channel();

        let event = if interest.can_be_prefix {
            let versioned = self.prefix.append_version(1, self.naming_convention);
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
            let segment = interest
                .name
                .segment_number(self.naming_convention)
                .expect("in-memory face only serves segment-bearing names");
            let start = segment as usize * self.segment_size;
            let end = (start + self.segment_size).min(self.content.len());
            FaceEvent::Data(Data {
                name: interest.name,
                final_block_id: Some(self.last_segment()),
                freshness_period: None,
                content: self.content[start..end].to_vec(),
                content_type: ContentType::Blob,
                congestion_mark: false,
                signature: vec![],
            })
        };

        let _ = tx.send(event);
        PendingInterest::new(rx)
    }
}

#[tokio::main]
async fn main() {
    let naming_convention = NamingConvention::default();
    let prefix = Name::parse("/example/object");

    for pipeline in [PipelineKind::Fixed, PipelineKind::Aimd, PipelineKind::Cubic] {
        let face: Arc<dyn Face> =
            Arc::new(InMemoryFace::new(prefix.clone(), naming_convention));
        let options = FetchOptions {
            pipeline,
            naming_convention,
            fixed: FixedOptions { window: 2 },
            ..FetchOptions::default()
        };

        let mut sink = Vec::new();
        let (_handle, cancel) = cancellation();
        let summary = session::run(
            face,
            Arc::new(AcceptAllValidator),
            prefix.clone(),
            &mut sink,
            &options,
            None,
            cancel,
            None,
            None,
        )
        .await
        .expect("fetch against the in-memory face should never fail");

        println!(
            "{pipeline:?}: {} segments, {} bytes, content={:?}",
            summary.segments,
            summary.bytes,
            String::from_utf8_lossy(&sink),
        );
    }
}
