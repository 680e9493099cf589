//! Backend-agnostic electronic signature core
//!
//! This crate holds the signature (envelope) and signer records, their shared
//! status lifecycle, and the callback handler that applies status reports from
//! a remote signing backend. Persistence and the backend itself sit behind the
//! [`SignatureStore`] and [`SignatureBackend`] traits.

pub mod backend;
pub mod callback;
pub mod filename;
pub mod locks;
pub mod memory;
pub mod model;
pub mod status;
pub mod store;

pub use backend::{
    signer_return_path, BackendError, BackendRegistry, BackendSettings, CreatedEnvelope,
    DocumentStream, EnvelopeRequest, SignatureBackend,
};
pub use callback::{
    CallbackError, CallbackHandler, EnvelopeNotification, EventOutcome, RecipientNotification,
    SignatureUpdate, StatusEvent,
};
pub use locks::{EntityKey, EntityLocks};
pub use memory::MemoryStore;
pub use model::{
    Document, NewSignature, NewSigner, Signature, SignatureId, SignatureType, SignatureTypeId,
    Signer, SignerId, ValidationError,
};
pub use status::{InvalidStatus, Status};
pub use store::{SignatureStore, StoreError, StoreResult};
