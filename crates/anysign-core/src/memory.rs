//! In-process signature store

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::model::{
    NewSignature, Signature, SignatureId, SignatureType, SignatureTypeId, Signer, SignerId,
};
use crate::status::Status;
use crate::store::{SignatureStore, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    types: Vec<SignatureType>,
    signatures: BTreeMap<SignatureId, Signature>,
    signers: BTreeMap<SignerId, Signer>,
    next_signature: i64,
    next_signer: i64,
}

impl Tables {
    fn assemble(&self, mut signature: Signature) -> Signature {
        let mut signers: Vec<Signer> = self
            .signers
            .values()
            .filter(|s| s.signature_id == signature.id)
            .cloned()
            .collect();
        signers.sort_by_key(|s| s.signing_order);
        signature.signers = signers;
        signature
    }
}

/// Signature store kept in memory, ids assigned sequentially from 1
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl SignatureStore for MemoryStore {
    async fn get_or_create_signature_type(
        &self,
        backend_code: &str,
        template_id: &str,
    ) -> StoreResult<SignatureType> {
        let mut tables = self.lock()?;
        if let Some(existing) = tables
            .types
            .iter()
            .find(|t| t.backend_code == backend_code && t.template_id == template_id)
        {
            return Ok(existing.clone());
        }
        let created = SignatureType {
            id: SignatureTypeId(tables.types.len() as i64 + 1),
            backend_code: backend_code.to_string(),
            template_id: template_id.to_string(),
        };
        tables.types.push(created.clone());
        Ok(created)
    }

    async fn create_signature(&self, new: NewSignature) -> StoreResult<Signature> {
        let mut tables = self.lock()?;
        let now = Utc::now();

        tables.next_signature += 1;
        let id = SignatureId(tables.next_signature);

        for ordered in new.ordered_signers() {
            tables.next_signer += 1;
            let signer = Signer {
                id: SignerId(tables.next_signer),
                signature_id: id,
                backend_id: String::new(),
                full_name: ordered.full_name,
                email: ordered.email,
                signing_order: ordered.signing_order,
                status: Status::Draft,
                status_datetime: now,
                status_details: String::new(),
            };
            tables.signers.insert(signer.id, signer);
        }

        let signature = Signature {
            id,
            signature_type: new.signature_type,
            backend_id: String::new(),
            title: new.title,
            document: new.document,
            status: Status::Draft,
            status_datetime: now,
            signers: Vec::new(),
        };
        tables.signatures.insert(id, signature.clone());
        Ok(tables.assemble(signature))
    }

    async fn get_signature(&self, id: SignatureId) -> StoreResult<Option<Signature>> {
        let tables = self.lock()?;
        Ok(tables
            .signatures
            .get(&id)
            .cloned()
            .map(|s| tables.assemble(s)))
    }

    async fn find_signature_by_backend_id(
        &self,
        backend_id: &str,
    ) -> StoreResult<Option<Signature>> {
        if backend_id.is_empty() {
            return Ok(None);
        }
        let tables = self.lock()?;
        Ok(tables
            .signatures
            .values()
            .find(|s| s.backend_id == backend_id)
            .cloned()
            .map(|s| tables.assemble(s)))
    }

    async fn set_signature_backend_id(
        &self,
        id: SignatureId,
        backend_id: &str,
    ) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let stored = tables
            .signatures
            .get_mut(&id)
            .ok_or_else(|| StoreError::signature_not_found(id))?;
        stored.backend_id = backend_id.to_string();
        Ok(())
    }

    async fn update_signature(&self, signature: &Signature) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let stored = tables
            .signatures
            .get_mut(&signature.id)
            .ok_or_else(|| StoreError::signature_not_found(signature.id))?;
        stored.status = signature.status;
        stored.status_datetime = signature.status_datetime;
        stored.document = signature.document.clone();
        Ok(())
    }

    async fn latest_signatures(&self, limit: usize) -> StoreResult<Vec<Signature>> {
        let tables = self.lock()?;
        Ok(tables
            .signatures
            .values()
            .rev()
            .take(limit)
            .cloned()
            .map(|s| tables.assemble(s))
            .collect())
    }

    async fn get_signer(&self, id: SignerId) -> StoreResult<Option<Signer>> {
        Ok(self.lock()?.signers.get(&id).cloned())
    }

    async fn set_signer_backend_id(&self, id: SignerId, backend_id: &str) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let stored = tables
            .signers
            .get_mut(&id)
            .ok_or_else(|| StoreError::signer_not_found(id))?;
        stored.backend_id = backend_id.to_string();
        Ok(())
    }

    async fn update_signer(&self, signer: &Signer) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let stored = tables
            .signers
            .get_mut(&signer.id)
            .ok_or_else(|| StoreError::signer_not_found(signer.id))?;
        stored.status = signer.status;
        stored.status_datetime = signer.status_datetime;
        stored.status_details = signer.status_details.clone();
        Ok(())
    }
}
