//! Callback handler behaviour against an in-memory store and a scripted backend

use anysign_core::*;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};

// ============================================================
// Test doubles
// ============================================================

/// Stream that records when it is dropped
struct TrackedStream {
    inner: Cursor<Vec<u8>>,
    closed: Arc<AtomicBool>,
    stall: bool,
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.stall {
            return Poll::Pending;
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy, PartialEq)]
enum FetchMode {
    Ok,
    Fail,
    Empty,
    Stall,
}

struct ScriptedBackend {
    content: Vec<u8>,
    mode: FetchMode,
    fetches: AtomicUsize,
    closed: Arc<AtomicBool>,
}

impl ScriptedBackend {
    fn new(mode: FetchMode) -> Arc<Self> {
        Arc::new(Self {
            content: b"%PDF-1.7 signed".to_vec(),
            mode,
            fetches: AtomicUsize::new(0),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn stream_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignatureBackend for ScriptedBackend {
    fn code(&self) -> &str {
        "scripted"
    }

    async fn create_signature(
        &self,
        _signature: &Signature,
        _request: &EnvelopeRequest,
    ) -> Result<CreatedEnvelope, BackendError> {
        Ok(CreatedEnvelope::default())
    }

    async fn fetch_documents(
        &self,
        _signature: &Signature,
    ) -> Result<Vec<DocumentStream>, BackendError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            FetchMode::Fail => Err(BackendError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            }),
            FetchMode::Empty => Ok(Vec::new()),
            FetchMode::Ok | FetchMode::Stall => {
                let stream = TrackedStream {
                    inner: Cursor::new(self.content.clone()),
                    closed: self.closed.clone(),
                    stall: self.mode == FetchMode::Stall,
                };
                Ok(vec![Box::new(stream) as DocumentStream])
            }
        }
    }

    async fn recipient_view_url(
        &self,
        _signature: &Signature,
        _signer: &Signer,
        return_url: &str,
    ) -> Result<String, BackendError> {
        Ok(return_url.to_string())
    }
}

/// Memory store whose envelope writes always fail
struct BrokenWrites(MemoryStore);

#[async_trait]
impl SignatureStore for BrokenWrites {
    async fn get_or_create_signature_type(
        &self,
        backend_code: &str,
        template_id: &str,
    ) -> StoreResult<SignatureType> {
        self.0.get_or_create_signature_type(backend_code, template_id).await
    }

    async fn create_signature(&self, new: NewSignature) -> StoreResult<Signature> {
        self.0.create_signature(new).await
    }

    async fn get_signature(&self, id: SignatureId) -> StoreResult<Option<Signature>> {
        self.0.get_signature(id).await
    }

    async fn find_signature_by_backend_id(
        &self,
        backend_id: &str,
    ) -> StoreResult<Option<Signature>> {
        self.0.find_signature_by_backend_id(backend_id).await
    }

    async fn set_signature_backend_id(&self, id: SignatureId, backend_id: &str) -> StoreResult<()> {
        self.0.set_signature_backend_id(id, backend_id).await
    }

    async fn update_signature(&self, _signature: &Signature) -> StoreResult<()> {
        Err(StoreError::Backend("disk full".to_string()))
    }

    async fn latest_signatures(&self, limit: usize) -> StoreResult<Vec<Signature>> {
        self.0.latest_signatures(limit).await
    }

    async fn get_signer(&self, id: SignerId) -> StoreResult<Option<Signer>> {
        self.0.get_signer(id).await
    }

    async fn set_signer_backend_id(&self, id: SignerId, backend_id: &str) -> StoreResult<()> {
        self.0.set_signer_backend_id(id, backend_id).await
    }

    async fn update_signer(&self, signer: &Signer) -> StoreResult<()> {
        self.0.update_signer(signer).await
    }
}

// ============================================================
// Fixtures
// ============================================================

async fn create(
    store: &dyn SignatureStore,
    title: &str,
    template_id: &str,
    document: Option<Document>,
    signers: &[&str],
) -> Signature {
    let signature_type = store
        .get_or_create_signature_type("scripted", template_id)
        .await
        .unwrap();
    let signature = store
        .create_signature(NewSignature {
            signature_type,
            title: title.to_string(),
            document,
            signers: signers
                .iter()
                .map(|name| NewSigner {
                    full_name: name.to_string(),
                    email: format!("{}@example.com", name.to_lowercase()),
                })
                .collect(),
        })
        .await
        .unwrap();
    store
        .set_signature_backend_id(signature.id, &format!("env-{}", signature.id))
        .await
        .unwrap();
    store.get_signature(signature.id).await.unwrap().unwrap()
}

fn handler(store: Arc<dyn SignatureStore>, backend: Arc<ScriptedBackend>) -> CallbackHandler {
    CallbackHandler::new(store, backend, Arc::new(EntityLocks::new()))
}

fn uploaded() -> Option<Document> {
    Some(Document::new("signatures/original.pdf", b"%PDF-1.4 draft".to_vec()))
}

fn assert_recent(t: chrono::DateTime<Utc>) {
    let age = Utc::now() - t;
    assert!(age >= ChronoDuration::zero() && age < ChronoDuration::seconds(5));
}

// ============================================================
// Signer status
// ============================================================

#[tokio::test]
async fn declined_signer_keeps_timestamp_and_message() {
    let store = Arc::new(MemoryStore::new());
    let signature = create(store.as_ref(), "Lease", "", uploaded(), &["Ada", "Alan"]).await;
    let second = signature.signers[1].clone();
    assert_eq!(second.signing_order, 2);

    let handler = handler(store.clone(), ScriptedBackend::new(FetchMode::Ok));
    handler
        .apply_signer_status(second.id, "sent", None, None)
        .await
        .unwrap();

    let t = Utc.with_ymd_and_hms(2024, 7, 1, 9, 30, 0).unwrap();
    handler
        .apply_signer_status(second.id, "declined", Some(t), Some("recipient refused"))
        .await
        .unwrap();

    let stored = store.get_signer(second.id).await.unwrap().unwrap();
    assert_eq!(stored.status, Status::Declined);
    assert_eq!(stored.status_datetime, t);
    assert_eq!(stored.status_details, "recipient refused");
}

#[tokio::test]
async fn signer_defaults_to_now_and_empty_details() {
    let store = Arc::new(MemoryStore::new());
    let signature = create(store.as_ref(), "Lease", "", uploaded(), &["Ada"]).await;
    let signer_id = signature.signers[0].id;

    let handler = handler(store.clone(), ScriptedBackend::new(FetchMode::Ok));
    let updated = handler
        .apply_signer_status(signer_id, "delivered", None, None)
        .await
        .unwrap();

    assert_eq!(updated.status, Status::Delivered);
    assert_eq!(updated.status_details, "");
    assert_recent(updated.status_datetime);
    assert_eq!(store.get_signer(signer_id).await.unwrap().unwrap(), updated);
}

#[tokio::test]
async fn unknown_signer_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let signature = create(store.as_ref(), "Lease", "", uploaded(), &["Ada"]).await;

    let handler = handler(store.clone(), ScriptedBackend::new(FetchMode::Ok));
    let err = handler
        .apply_signer_status(SignerId(404), "sent", None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, CallbackError::NotFound { kind: "Signer", .. }));
    let untouched = store.get_signature(signature.id).await.unwrap().unwrap();
    assert_eq!(untouched.signers, signature.signers);
}

#[tokio::test]
async fn unknown_status_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let signature = create(store.as_ref(), "Lease", "", uploaded(), &["Ada"]).await;

    let handler = handler(store.clone(), ScriptedBackend::new(FetchMode::Ok));
    let err = handler
        .apply_signer_status(signature.signers[0].id, "voided", None, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CallbackError::InvalidStatus(InvalidStatus::Unknown(ref s)) if s == "voided"
    ));
}

#[tokio::test]
async fn backward_signer_transition_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let signature = create(store.as_ref(), "Lease", "", uploaded(), &["Ada"]).await;
    let signer_id = signature.signers[0].id;

    let handler = handler(store.clone(), ScriptedBackend::new(FetchMode::Ok));
    handler
        .apply_signer_status(signer_id, "completed", None, None)
        .await
        .unwrap();
    let err = handler
        .apply_signer_status(signer_id, "sent", None, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CallbackError::InvalidStatus(InvalidStatus::Backward {
            from: Status::Completed,
            to: Status::Sent
        })
    ));
    let stored = store.get_signer(signer_id).await.unwrap().unwrap();
    assert_eq!(stored.status, Status::Completed);
}

#[tokio::test]
async fn long_details_are_truncated() {
    let store = Arc::new(MemoryStore::new());
    let signature = create(store.as_ref(), "Lease", "", uploaded(), &["Ada"]).await;
    let message = "x".repeat(400);

    let handler = handler(store.clone(), ScriptedBackend::new(FetchMode::Ok));
    let updated = handler
        .apply_signer_status(signature.signers[0].id, "sent", None, Some(&message))
        .await
        .unwrap();
    assert_eq!(updated.status_details.len(), 250);
}

#[tokio::test]
async fn concurrent_signer_reports_do_not_lose_updates() {
    let store = Arc::new(MemoryStore::new());
    let signature = create(store.as_ref(), "Lease", "", uploaded(), &["Ada"]).await;
    let signer_id = signature.signers[0].id;
    let handler = Arc::new(handler(store.clone(), ScriptedBackend::new(FetchMode::Ok)));

    let mut tasks = Vec::new();
    for status in ["sent", "delivered"] {
        let handler = handler.clone();
        tasks.push(tokio::spawn(async move {
            handler.apply_signer_status(signer_id, status, None, None).await
        }));
    }
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) | Err(CallbackError::InvalidStatus(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let stored = store.get_signer(signer_id).await.unwrap().unwrap();
    assert_eq!(stored.status, Status::Delivered);
}

// ============================================================
// Signature status
// ============================================================

#[tokio::test]
async fn completed_template_envelope_fetches_and_names_document() {
    let store = Arc::new(MemoryStore::new());
    let signature = create(store.as_ref(), "Contract Q3", "tmpl-42", None, &["Ada"]).await;
    let backend = ScriptedBackend::new(FetchMode::Ok);

    let update = handler(store.clone(), backend.clone())
        .apply_signature_status(&signature, "completed", None)
        .await
        .unwrap();

    assert!(update.document_replaced);
    assert_eq!(backend.fetch_count(), 1);
    assert!(backend.stream_closed());

    let stored = store.get_signature(signature.id).await.unwrap().unwrap();
    assert_eq!(stored.status, Status::Completed);
    assert_recent(stored.status_datetime);
    let document = stored.document.unwrap();
    assert_eq!(document.name, "contract-q3.pdf");
    assert_eq!(document.content, b"%PDF-1.7 signed".to_vec());
}

#[tokio::test]
async fn sent_with_document_does_not_fetch() {
    let store = Arc::new(MemoryStore::new());
    let signature = create(store.as_ref(), "Lease", "", uploaded(), &["Ada"]).await;
    let backend = ScriptedBackend::new(FetchMode::Ok);

    let t = Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap();
    let update = handler(store.clone(), backend.clone())
        .apply_signature_status(&signature, "sent", Some(t))
        .await
        .unwrap();

    assert!(!update.document_replaced);
    assert_eq!(backend.fetch_count(), 0);
    let stored = store.get_signature(signature.id).await.unwrap().unwrap();
    assert_eq!(stored.status, Status::Sent);
    assert_eq!(stored.status_datetime, t);
    assert_eq!(stored.document, uploaded());
}

#[tokio::test]
async fn missing_document_is_fetched_before_completion() {
    let store = Arc::new(MemoryStore::new());
    let signature = create(store.as_ref(), "Offer Letter", "tmpl-1", None, &["Ada"]).await;
    let backend = ScriptedBackend::new(FetchMode::Ok);

    let update = handler(store.clone(), backend.clone())
        .apply_signature_status(&signature, "sent", None)
        .await
        .unwrap();

    assert!(update.document_replaced);
    assert_eq!(backend.fetch_count(), 1);
    assert_eq!(update.signature.document.unwrap().name, "offer-letter.pdf");
}

#[tokio::test]
async fn completion_reuses_existing_filename() {
    let store = Arc::new(MemoryStore::new());
    let signature = create(store.as_ref(), "Contract Q3", "", uploaded(), &["Ada"]).await;
    let backend = ScriptedBackend::new(FetchMode::Ok);
    let handler = handler(store.clone(), backend.clone());

    handler
        .apply_signature_status(&signature, "sent", None)
        .await
        .unwrap();
    let update = handler
        .apply_signature_status(&signature, "completed", None)
        .await
        .unwrap();

    assert_eq!(backend.fetch_count(), 1);
    let document = update.signature.document.unwrap();
    assert_eq!(document.name, "signatures/original.pdf");
    assert_eq!(document.content, b"%PDF-1.7 signed".to_vec());
}

#[tokio::test]
async fn stream_is_closed_when_store_fails() {
    let store = Arc::new(BrokenWrites(MemoryStore::new()));
    let signature = create(store.as_ref(), "Contract Q3", "", None, &["Ada"]).await;
    let backend = ScriptedBackend::new(FetchMode::Ok);

    let err = handler(store.clone(), backend.clone())
        .apply_signature_status(&signature, "completed", None)
        .await
        .unwrap_err();

    assert!(matches!(err, CallbackError::Storage(StoreError::Backend(_))));
    assert!(backend.stream_closed());
    let stored = store.get_signature(signature.id).await.unwrap().unwrap();
    assert_eq!(stored.status, Status::Draft);
}

#[tokio::test]
async fn failed_fetch_leaves_record_untouched() {
    let store = Arc::new(MemoryStore::new());
    let signature = create(store.as_ref(), "Contract Q3", "", uploaded(), &["Ada"]).await;
    let backend = ScriptedBackend::new(FetchMode::Fail);

    let err = handler(store.clone(), backend.clone())
        .apply_signature_status(&signature, "completed", None)
        .await
        .unwrap_err();

    match err {
        CallbackError::UpstreamFetch { envelope, reason } => {
            assert_eq!(envelope, signature.backend_id);
            assert!(reason.contains("503"));
        }
        other => panic!("expected upstream fetch error, got {other:?}"),
    }
    let stored = store.get_signature(signature.id).await.unwrap().unwrap();
    assert_eq!(stored, signature);
}

#[tokio::test]
async fn empty_document_list_is_an_upstream_error() {
    let store = Arc::new(MemoryStore::new());
    let signature = create(store.as_ref(), "Contract Q3", "", None, &[]).await;

    let err = handler(store.clone(), ScriptedBackend::new(FetchMode::Empty))
        .apply_signature_status(&signature, "completed", None)
        .await
        .unwrap_err();
    assert!(matches!(err, CallbackError::UpstreamFetch { .. }));
}

#[tokio::test]
async fn stalled_fetch_times_out_and_closes_stream() {
    let store = Arc::new(MemoryStore::new());
    let signature = create(store.as_ref(), "Contract Q3", "", None, &[]).await;
    let backend = ScriptedBackend::new(FetchMode::Stall);

    let err = handler(store.clone(), backend.clone())
        .with_fetch_timeout(Duration::from_millis(50))
        .apply_signature_status(&signature, "completed", None)
        .await
        .unwrap_err();

    match err {
        CallbackError::UpstreamFetch { reason, .. } => assert!(reason.contains("timed out")),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(backend.stream_closed());
    let stored = store.get_signature(signature.id).await.unwrap().unwrap();
    assert_eq!(stored.status, Status::Draft);
}

#[tokio::test]
async fn backward_signature_transition_does_not_fetch() {
    let store = Arc::new(MemoryStore::new());
    let signature = create(store.as_ref(), "Lease", "", uploaded(), &[]).await;
    let backend = ScriptedBackend::new(FetchMode::Ok);
    let handler = handler(store.clone(), backend.clone());

    handler
        .apply_signature_status(&signature, "delivered", None)
        .await
        .unwrap();
    let err = handler
        .apply_signature_status(&signature, "sent", None)
        .await
        .unwrap_err();

    assert!(matches!(err, CallbackError::InvalidStatus(InvalidStatus::Backward { .. })));
    assert_eq!(backend.fetch_count(), 0);
}

// ============================================================
// Notifications
// ============================================================

#[tokio::test]
async fn notification_updates_recipients_then_envelope() {
    let store = Arc::new(MemoryStore::new());
    let signature = create(store.as_ref(), "Contract Q3", "", uploaded(), &["Ada", "Alan"]).await;
    let backend = ScriptedBackend::new(FetchMode::Ok);
    let t = Utc.with_ymd_and_hms(2024, 9, 30, 17, 0, 0).unwrap();

    let notification = EnvelopeNotification {
        envelope_id: signature.backend_id.clone(),
        status: "completed".to_string(),
        status_datetime: Some(t),
        recipients: signature
            .signers
            .iter()
            .map(|s| RecipientNotification {
                signer_id: s.id,
                status: "completed".to_string(),
                status_datetime: Some(t),
                message: None,
            })
            .collect(),
    };

    let update = handler(store.clone(), backend.clone())
        .apply_notification(&notification)
        .await
        .unwrap();

    assert_eq!(update.signature.status, Status::Completed);
    assert_eq!(update.signature.status_datetime, t);
    assert!(update.document_replaced);
    let stored = store.get_signature(signature.id).await.unwrap().unwrap();
    assert!(stored
        .signers
        .iter()
        .all(|s| s.status == Status::Completed && s.status_datetime == t));
}

#[tokio::test]
async fn notification_for_unknown_envelope_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let notification = EnvelopeNotification {
        envelope_id: "env-missing".to_string(),
        status: "sent".to_string(),
        status_datetime: None,
        recipients: Vec::new(),
    };

    let err = handler(store, ScriptedBackend::new(FetchMode::Ok))
        .apply_notification(&notification)
        .await
        .unwrap_err();
    assert!(matches!(err, CallbackError::NotFound { kind: "Envelope", .. }));
}

#[tokio::test]
async fn notification_rejects_foreign_signer() {
    let store = Arc::new(MemoryStore::new());
    let ours = create(store.as_ref(), "Ours", "", uploaded(), &["Ada"]).await;
    let theirs = create(store.as_ref(), "Theirs", "", uploaded(), &["Alan"]).await;

    let notification = EnvelopeNotification {
        envelope_id: ours.backend_id.clone(),
        status: "sent".to_string(),
        status_datetime: None,
        recipients: vec![RecipientNotification {
            signer_id: theirs.signers[0].id,
            status: "sent".to_string(),
            status_datetime: None,
            message: None,
        }],
    };

    let err = handler(store.clone(), ScriptedBackend::new(FetchMode::Ok))
        .apply_notification(&notification)
        .await
        .unwrap_err();
    assert!(matches!(err, CallbackError::NotFound { kind: "Signer", .. }));
    let stored = store.get_signer(theirs.signers[0].id).await.unwrap().unwrap();
    assert_eq!(stored.status, Status::Draft);
}

#[tokio::test]
async fn status_events_route_by_entity() {
    let store = Arc::new(MemoryStore::new());
    let signature = create(store.as_ref(), "Lease", "", uploaded(), &["Ada"]).await;
    let handler = handler(store.clone(), ScriptedBackend::new(FetchMode::Ok));

    let event: StatusEvent = serde_json::from_value(serde_json::json!({
        "entity": "signer",
        "id": signature.signers[0].id,
        "status": "sent",
        "message": "emailed"
    }))
    .unwrap();
    match handler.apply_event(&event).await.unwrap() {
        EventOutcome::Signer(signer) => assert_eq!(signer.status_details, "emailed"),
        other => panic!("unexpected outcome {other:?}"),
    }

    let event = StatusEvent::Signature {
        id: signature.id,
        status: "sent".to_string(),
        status_datetime: None,
    };
    match handler.apply_event(&event).await.unwrap() {
        EventOutcome::Signature(update) => assert_eq!(update.signature.status, Status::Sent),
        other => panic!("unexpected outcome {other:?}"),
    }
}

// ============================================================
// Properties
// ============================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn signer_write_persists_given_values(
        status in prop::sample::select(vec!["draft", "sent", "delivered", "completed"]),
        offset_secs in prop::option::of(0i64..1_000_000),
        message in prop::option::of("[a-zA-Z0-9 ]{0,250}"),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let store = Arc::new(MemoryStore::new());
            let signature = create(store.as_ref(), "Lease", "", uploaded(), &["Ada"]).await;
            let signer_id = signature.signers[0].id;
            let t = offset_secs.map(|s| Utc.timestamp_opt(1_700_000_000 + s, 0).unwrap());

            handler(store.clone(), ScriptedBackend::new(FetchMode::Ok))
                .apply_signer_status(signer_id, status, t, message.as_deref())
                .await
                .unwrap();

            let stored = store.get_signer(signer_id).await.unwrap().unwrap();
            assert_eq!(stored.status.as_str(), status);
            assert_eq!(stored.status_details, message.clone().unwrap_or_default());
            match t {
                Some(t) => assert_eq!(stored.status_datetime, t),
                None => assert_recent(stored.status_datetime),
            }
        });
    }
}
