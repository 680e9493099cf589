//! Persistence boundary for signatures and signers

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{NewSignature, Signature, SignatureId, SignatureType, Signer, SignerId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn signature_not_found(id: SignatureId) -> Self {
        StoreError::NotFound {
            kind: "Signature",
            id: id.to_string(),
        }
    }

    pub fn signer_not_found(id: SignerId) -> Self {
        StoreError::NotFound {
            kind: "Signer",
            id: id.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Create/get/update access to signature records.
///
/// Lookups return `Ok(None)` for unknown ids; updates of unknown ids fail with
/// [`StoreError::NotFound`].
#[async_trait]
pub trait SignatureStore: Send + Sync {
    async fn get_or_create_signature_type(
        &self,
        backend_code: &str,
        template_id: &str,
    ) -> StoreResult<SignatureType>;

    /// Insert a draft signature together with its signers.
    async fn create_signature(&self, new: NewSignature) -> StoreResult<Signature>;

    async fn get_signature(&self, id: SignatureId) -> StoreResult<Option<Signature>>;

    async fn find_signature_by_backend_id(&self, backend_id: &str)
        -> StoreResult<Option<Signature>>;

    async fn set_signature_backend_id(&self, id: SignatureId, backend_id: &str)
        -> StoreResult<()>;

    /// Persist status, status datetime and the document slot in one write.
    async fn update_signature(&self, signature: &Signature) -> StoreResult<()>;

    /// Newest first.
    async fn latest_signatures(&self, limit: usize) -> StoreResult<Vec<Signature>>;

    async fn get_signer(&self, id: SignerId) -> StoreResult<Option<Signer>>;

    async fn set_signer_backend_id(&self, id: SignerId, backend_id: &str) -> StoreResult<()>;

    /// Persist status, status datetime and status details.
    async fn update_signer(&self, signer: &Signer) -> StoreResult<()>;
}
