//! Status notifications from the signing backend
//!
//! The backend reports envelope and recipient progress asynchronously. Each
//! report is validated against the forward-only lifecycle and written under a
//! per-entity lock. When an envelope completes, or when no document is stored
//! yet (envelopes rendered from a backend template), the rendered document is
//! fetched and committed together with the new status in a single write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, SignatureBackend};
use crate::filename::document_filename;
use crate::locks::{EntityKey, EntityLocks};
use crate::model::{truncate_details, Document, Signature, SignatureId, Signer, SignerId};
use crate::status::{InvalidStatus, Status};
use crate::store::{SignatureStore, StoreError};

/// Default upper bound on fetching and reading a document
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    InvalidStatus(#[from] InvalidStatus),

    #[error("Failed to fetch document for envelope {envelope}: {reason}")]
    UpstreamFetch { envelope: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl CallbackError {
    fn upstream(signature: &Signature, reason: impl ToString) -> Self {
        CallbackError::UpstreamFetch {
            envelope: signature.backend_id.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Envelope-level notification with the recipient reports it carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeNotification {
    pub envelope_id: String,
    pub status: String,
    #[serde(default)]
    pub status_datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recipients: Vec<RecipientNotification>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientNotification {
    pub signer_id: SignerId,
    pub status: String,
    #[serde(default)]
    pub status_datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A single status report addressed by local id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "lowercase")]
pub enum StatusEvent {
    Signature {
        id: SignatureId,
        status: String,
        #[serde(default)]
        status_datetime: Option<DateTime<Utc>>,
    },
    Signer {
        id: SignerId,
        status: String,
        #[serde(default)]
        status_datetime: Option<DateTime<Utc>>,
        #[serde(default)]
        message: Option<String>,
    },
}

/// Result of an envelope status write
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureUpdate {
    pub signature: Signature,
    /// Whether a freshly fetched document replaced the stored one
    pub document_replaced: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Signature(SignatureUpdate),
    Signer(Signer),
}

pub struct CallbackHandler {
    store: Arc<dyn SignatureStore>,
    backend: Arc<dyn SignatureBackend>,
    locks: Arc<EntityLocks>,
    fetch_timeout: Duration,
}

impl CallbackHandler {
    pub fn new(
        store: Arc<dyn SignatureStore>,
        backend: Arc<dyn SignatureBackend>,
        locks: Arc<EntityLocks>,
    ) -> Self {
        Self {
            store,
            backend,
            locks,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Record a recipient's new status.
    ///
    /// `status_datetime` defaults to now and `message` to an empty string.
    pub async fn apply_signer_status(
        &self,
        signer_id: SignerId,
        status: &str,
        status_datetime: Option<DateTime<Utc>>,
        message: Option<&str>,
    ) -> Result<Signer, CallbackError> {
        let status: Status = status.parse()?;
        let _guard = self.locks.acquire(EntityKey::Signer(signer_id)).await;

        let mut signer = self
            .store
            .get_signer(signer_id)
            .await?
            .ok_or_else(|| CallbackError::NotFound {
                kind: "Signer",
                id: signer_id.to_string(),
            })?;
        signer.status.check_transition(status)?;

        signer.status = status;
        signer.status_datetime = status_datetime.unwrap_or_else(Utc::now);
        signer.status_details = truncate_details(message.unwrap_or_default());
        self.store.update_signer(&signer).await?;

        info!(
            "Signer {} of signature {} is now {}",
            signer.id, signer.signature_id, signer.status
        );
        Ok(signer)
    }

    /// Record an envelope's new status, refreshing its document when needed.
    ///
    /// The stored record is reloaded under the entity lock, so `signature`
    /// only identifies the envelope. Nothing is written unless the document
    /// fetch (when one is due) succeeds.
    pub async fn apply_signature_status(
        &self,
        signature: &Signature,
        status: &str,
        status_datetime: Option<DateTime<Utc>>,
    ) -> Result<SignatureUpdate, CallbackError> {
        let status: Status = status.parse()?;
        let _guard = self.locks.acquire(EntityKey::Signature(signature.id)).await;

        let mut current = self
            .store
            .get_signature(signature.id)
            .await?
            .ok_or_else(|| CallbackError::NotFound {
                kind: "Signature",
                id: signature.id.to_string(),
            })?;
        current.status.check_transition(status)?;

        let document_replaced = status == Status::Completed || !current.has_document();
        if document_replaced {
            let content = self.fetch_first_document(&current).await?;
            let filename = document_filename(
                current.document.as_ref().map(|d| d.name.as_str()),
                &current.title,
            );
            debug!(
                "Replacing document of signature {} with {} ({} bytes)",
                current.id,
                filename,
                content.len()
            );
            current.document = Some(Document::new(filename, content));
        }

        current.status = status;
        current.status_datetime = status_datetime.unwrap_or_else(Utc::now);
        self.store.update_signature(&current).await?;

        info!(
            "Signature {} is now {} (document replaced: {})",
            current.id, current.status, document_replaced
        );
        Ok(SignatureUpdate {
            signature: current,
            document_replaced,
        })
    }

    /// Apply a backend envelope notification: recipients first, then the envelope.
    ///
    /// The first failure aborts the remaining writes.
    pub async fn apply_notification(
        &self,
        notification: &EnvelopeNotification,
    ) -> Result<SignatureUpdate, CallbackError> {
        let signature = self
            .store
            .find_signature_by_backend_id(&notification.envelope_id)
            .await?
            .ok_or_else(|| CallbackError::NotFound {
                kind: "Envelope",
                id: notification.envelope_id.clone(),
            })?;

        for recipient in &notification.recipients {
            if signature.signer(recipient.signer_id).is_none() {
                warn!(
                    "Envelope {} reported unknown signer {}",
                    notification.envelope_id, recipient.signer_id
                );
                return Err(CallbackError::NotFound {
                    kind: "Signer",
                    id: recipient.signer_id.to_string(),
                });
            }
            self.apply_signer_status(
                recipient.signer_id,
                &recipient.status,
                recipient.status_datetime,
                recipient.message.as_deref(),
            )
            .await?;
        }

        self.apply_signature_status(&signature, &notification.status, notification.status_datetime)
            .await
    }

    pub async fn apply_event(&self, event: &StatusEvent) -> Result<EventOutcome, CallbackError> {
        match event {
            StatusEvent::Signature {
                id,
                status,
                status_datetime,
            } => {
                let signature = self.store.get_signature(*id).await?.ok_or_else(|| {
                    CallbackError::NotFound {
                        kind: "Signature",
                        id: id.to_string(),
                    }
                })?;
                self.apply_signature_status(&signature, status, *status_datetime)
                    .await
                    .map(EventOutcome::Signature)
            }
            StatusEvent::Signer {
                id,
                status,
                status_datetime,
                message,
            } => self
                .apply_signer_status(*id, status, *status_datetime, message.as_deref())
                .await
                .map(EventOutcome::Signer),
        }
    }

    /// Read the first document the backend returns, bounded by the fetch timeout.
    ///
    /// Every stream is dropped (closed) before this returns, on every path.
    async fn fetch_first_document(&self, signature: &Signature) -> Result<Vec<u8>, CallbackError> {
        let fetch = async {
            let streams = self
                .backend
                .fetch_documents(signature)
                .await
                .map_err(|e| CallbackError::upstream(signature, e))?;
            let mut stream = streams.into_iter().next().ok_or_else(|| {
                CallbackError::upstream(
                    signature,
                    BackendError::NoDocument(signature.backend_id.clone()),
                )
            })?;

            let mut content = Vec::new();
            stream
                .read_to_end(&mut content)
                .await
                .map_err(|e| CallbackError::upstream(signature, e))?;
            Ok(content)
        };

        match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Document fetch for signature {} timed out after {:?}",
                    signature.id, self.fetch_timeout
                );
                Err(CallbackError::upstream(
                    signature,
                    format!("timed out after {:?}", self.fetch_timeout),
                ))
            }
        }
    }
}
