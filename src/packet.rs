//! In-memory packet types
//!
//! The fetch engine treats wire encoding/decoding, signing, and signature
//! validation as out of scope (an external collaborator's job; see
//! [`crate::validator`]). These types only carry the fields the engine
//! itself reads or writes.

use std::time::Duration;

use crate::name::Name;

/// An outbound request for a Name.
///
/// Every Interest expressed by this crate carries `can_be_prefix = false`
/// except the single discovery Interest issued by
/// [`crate::discovery::VersionDiscovery`], so that in the common case the
/// reply's name is guaranteed to equal the Interest's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interest {
    /// The requested name
    pub name: Name,
    /// Whether only fresh (non-stale) content may satisfy this Interest
    pub must_be_fresh: bool,
    /// Whether a reply name may extend this Interest's name with
    /// additional components (only true for discovery Interests)
    pub can_be_prefix: bool,
    /// How long the network layer should wait before declaring a timeout
    pub lifetime: Duration,
    /// A nonce distinguishing (re)transmissions of logically the same
    /// request; a fresh value is chosen for every expression
    pub nonce: u32,
    /// Opaque application parameters, used only by discovery Interests to
    /// derive the metadata sub-name
    pub application_parameters: Option<Vec<u8>>,
}

impl Interest {
    /// Build a non-prefix Interest for `name` with the given lifetime and
    /// freshness requirement. A nonce is generated immediately.
    pub fn new(name: Name, must_be_fresh: bool, lifetime: Duration) -> Self {
        Interest {
            name,
            must_be_fresh,
            can_be_prefix: false,
            lifetime,
            nonce: rand::random(),
            application_parameters: None,
        }
    }

    /// Return a copy of this Interest with a freshly generated nonce,
    /// as required before every re-expression.
    #[must_use]
    pub fn with_fresh_nonce(&self) -> Self {
        Interest {
            nonce: rand::random(),
            ..self.clone()
        }
    }
}

/// Content-type values the fetch engine recognizes on inbound Data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// Ordinary opaque content
    Blob,
    /// A public key
    Key,
    /// An application-level negative acknowledgment
    Nack,
    /// Any other content-type value, carried through opaquely
    Other(u32),
}

impl ContentType {
    /// Decode a content-type value as seen on the wire.
    pub fn from_u32(v: u32) -> Self {
        match v {
            0 => ContentType::Blob,
            2 => ContentType::Key,
            3 => ContentType::Nack,
            other => ContentType::Other(other),
        }
    }
}

/// An inbound reply to an Interest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    /// The exact name of the Interest this Data satisfies
    pub name: Name,
    /// The last segment number of the content, if this Data carries one
    pub final_block_id: Option<u64>,
    /// Freshness period, if present
    pub freshness_period: Option<Duration>,
    /// The content payload
    pub content: Vec<u8>,
    /// The content-type tag
    pub content_type: ContentType,
    /// Whether the forwarder marked this Data as having experienced
    /// congestion on its way back
    pub congestion_mark: bool,
    /// Opaque signature bytes; never inspected by the fetch engine itself
    pub signature: Vec<u8>,
}

/// The reason a Nack rejected an Interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackReason {
    /// The forwarder already has an outstanding, indistinguishable Interest
    Duplicate,
    /// The forwarder is experiencing congestion
    Congestion,
    /// No route exists toward the requested name
    NoRoute,
    /// Any other or unspecified reason
    Other,
}

/// An inbound rejection of an Interest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nack {
    /// Name of the rejected Interest
    pub name: Name,
    /// Nonce of the rejected Interest
    pub nonce: u32,
    /// Why the Interest was rejected
    pub reason: NackReason,
}
