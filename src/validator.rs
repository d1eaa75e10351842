//! The validation collaborator interface
//!
//! The fetch engine treats signatures opaquely and delegates verification
//! entirely to a [`Validator`], per `spec.md` §6. A validator that accepts
//! everything is valid configuration — see [`AcceptAllValidator`], grounded
//! on the original tool's use of an accept-all validator by default.

use futures::future::BoxFuture;

use crate::error::Result;
use crate::packet::Data;

/// Validates inbound Data on the fetch engine's behalf.
pub trait Validator: Send + Sync {
    /// Validate `data`, resolving to `Ok(())` if it is acceptable or
    /// `Err(FetchError::ValidationFailed(..))` otherwise.
    fn validate<'a>(&'a self, data: &'a Data) -> BoxFuture<'a, Result<()>>;
}

/// A validator that accepts every Data packet unconditionally.
///
/// Useful for testing and for deployments that perform validation out of
/// band (e.g. at the content-store layer).
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllValidator;

impl Validator for AcceptAllValidator {
    fn validate<'a>(&'a self, _data: &'a Data) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;
    use crate::packet::ContentType;

    #[tokio::test]
    async fn accept_all_always_succeeds() {
        let validator = AcceptAllValidator;
        let data = Data {
            name: Name::parse("/a/b"),
            final_block_id: None,
            freshness_period: None,
            content: vec![],
            content_type: ContentType::Blob,
            congestion_mark: false,
            signature: vec![],
        };
        assert!(validator.validate(&data).await.is_ok());
    }
}
