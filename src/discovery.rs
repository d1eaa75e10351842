//! Version discovery
//!
//! Resolves an unversioned name to its latest versioned form by sending a
//! single `CanBePrefix=true, MustBeFresh=true` Interest toward the base
//! name and decoding the versioned name carried in the reply's metadata
//! payload, per `spec.md` §4.3 and §3 "Metadata reply". Grounded on the
//! original tool's
//! `DiscoverVersion`/`discover-version.cpp`, which does exactly this and
//! retries the same discovery Interest (with a fresh nonce) on timeout or
//! Nack up to a configurable retry count.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{FetchError, Result};
use crate::face::{Face, FaceEvent};
use crate::name::{Component, Name, NamingConvention};
use crate::packet::{Data, Interest};
use crate::validator::Validator;

/// Encode a versioned [`Name`] as a metadata-object payload.
///
/// This is deliberately not a general Name wire codec (that remains out of
/// scope per `spec.md` §1) — it is only the encoding this crate's own
/// discovery producer and consumer agree on for the one payload the fetch
/// engine ever needs to decode: the versioned name carried by a metadata
/// reply (`spec.md` §3 "Metadata reply"). Each component is hex-encoded so
/// that binary segment/version components survive the round trip.
pub fn encode_metadata_payload(name: &Name) -> Vec<u8> {
    name.components()
        .iter()
        .map(|c| hex_encode(c.as_bytes()))
        .collect::<Vec<_>>()
        .join("/")
        .into_bytes()
}

/// Decode a metadata-object payload produced by [`encode_metadata_payload`].
fn decode_metadata_payload(payload: &[u8]) -> Result<Name> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| FetchError::InvalidVersionedName)?;
    let mut name = Name::new();
    for part in text.split('/').filter(|s| !s.is_empty()) {
        let bytes = hex_decode(part).ok_or(FetchError::InvalidVersionedName)?;
        name = name.append(Component::from_bytes(bytes));
    }
    if name.is_empty() {
        return Err(FetchError::InvalidVersionedName);
    }
    Ok(name)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Tunables for [`discover_version`].
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryOptions {
    /// Maximum timeout/Nack retries for the discovery Interest. `None`
    /// means retry indefinitely.
    pub max_retries: Option<u32>,
    /// Lifetime given to the discovery Interest.
    pub interest_lifetime: Duration,
    /// Convention used to recognize the version component in the reply.
    pub naming_convention: NamingConvention,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        DiscoveryOptions {
            max_retries: Some(3),
            interest_lifetime: Duration::from_secs(4),
            naming_convention: NamingConvention::default(),
        }
    }
}

/// The result of resolving a name to its versioned form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// `base_name` already ended in a version component; no Interest was
    /// sent.
    AlreadyVersioned(Name),
    /// A discovery Interest was sent and answered; `versioned_name` is the
    /// versioned name decoded from the reply's metadata payload. The
    /// metadata reply itself is a distinct object from the content (its
    /// Name is the metadata sub-name, not `versioned_name/<segment>`), so
    /// `data` is kept only for diagnostics/logging — the pipeline still
    /// fetches segment 0 of `versioned_name` fresh.
    Discovered { versioned_name: Name, data: Data },
}

/// Resolve `base_name` to a versioned name.
///
/// If `base_name` already ends in a version component under
/// `opts.naming_convention`, this returns immediately without sending
/// anything. Otherwise it sends one `CanBePrefix`/`MustBeFresh` discovery
/// Interest, retrying on timeout or Nack, and returns as soon as any reply
/// whose name carries a version component arrives.
pub async fn discover_version(
    face: &dyn Face,
    validator: &dyn Validator,
    base_name: Name,
    opts: &DiscoveryOptions,
) -> Result<DiscoveryOutcome> {
    if base_name.ends_with_version(opts.naming_convention) {
        debug!("name already versioned, skipping discovery");
        return Ok(DiscoveryOutcome::AlreadyVersioned(base_name));
    }

    let mut retries: u32 = 0;

    loop {
        let interest = Interest {
            name: base_name.clone(),
            must_be_fresh: true,
            can_be_prefix: true,
            lifetime: opts.interest_lifetime,
            nonce: rand::random(),
            application_parameters: None,
        };
        let pending = face.express(interest);

        match pending.wait().await {
            Some(FaceEvent::Data(data)) => {
                validator
                    .validate(&data)
                    .await
                    .map_err(|e| FetchError::ValidationFailed(e.to_string()))?;

                let versioned_name = decode_metadata_payload(&data.content)?;
                if !versioned_name.ends_with_version(opts.naming_convention) {
                    return Err(FetchError::InvalidVersionedName);
                }

                debug!(?versioned_name, "version discovered");
                return Ok(DiscoveryOutcome::Discovered { versioned_name, data });
            }
            Some(FaceEvent::Nack(_)) | Some(FaceEvent::Timeout) => {
                retries += 1;
                warn!(retries, "discovery interest unanswered, retrying");
                if opts.max_retries.is_some_and(|max| retries > max) {
                    return Err(FetchError::DiscoveryFailed(
                        "retries exhausted without a versioned reply".into(),
                    ));
                }
            }
            None => return Err(FetchError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::face::PendingInterest;
    use crate::packet::ContentType;
    use crate::validator::AcceptAllValidator;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    struct ScriptedFace {
        calls: AtomicUsize,
        events: Vec<FaceEvent>,
    }

    impl Face for ScriptedFace {
        fn express(&self, _interest: Interest) -> PendingInterest {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = oneshot::channel();
            let event = self.events.get(idx).cloned().unwrap_or(FaceEvent::Timeout);
            let _ = tx.send(event);
            PendingInterest::new(rx)
        }
    }

    fn metadata_reply(request_name: &str, versioned: Name) -> Data {
        Data {
            name: Name::parse(request_name),
            final_block_id: None,
            freshness_period: None,
            content: encode_metadata_payload(&versioned),
            content_type: ContentType::Blob,
            congestion_mark: false,
            signature: vec![],
        }
    }

    #[tokio::test]
    async fn already_versioned_skips_the_network() {
        let base = Name::parse("/a/b").append_version(3, NamingConvention::Typed);
        let face = ScriptedFace {
            calls: AtomicUsize::new(0),
            events: vec![],
        };
        let outcome = discover_version(
            &face,
            &AcceptAllValidator,
            base.clone(),
            &DiscoveryOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, DiscoveryOutcome::AlreadyVersioned(base));
        assert_eq!(face.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn discovers_version_from_reply_name() {
        let base = Name::parse("/a/b");
        let versioned = base.append_version(42, NamingConvention::Typed);
        let face = ScriptedFace {
            calls: AtomicUsize::new(0),
            events: vec![FaceEvent::Data(metadata_reply("/a/b", versioned.clone()))],
        };
        let outcome = discover_version(
            &face,
            &AcceptAllValidator,
            base,
            &DiscoveryOptions::default(),
        )
        .await
        .unwrap();
        match outcome {
            DiscoveryOutcome::Discovered { versioned_name, .. } => {
                assert_eq!(versioned_name, versioned)
            }
            other => panic!("expected Discovered, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn retries_are_exhausted_on_repeated_timeout() {
        let base = Name::parse("/a/b");
        let face = ScriptedFace {
            calls: AtomicUsize::new(0),
            events: vec![],
        };
        let opts = DiscoveryOptions {
            max_retries: Some(2),
            ..DiscoveryOptions::default()
        };
        let err = discover_version(&face, &AcceptAllValidator, base, &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::DiscoveryFailed(_)));
        assert_eq!(face.calls.load(Ordering::SeqCst), 3);
    }
}
