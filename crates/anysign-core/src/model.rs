//! Signature (envelope) and signer records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::status::Status;

/// Maximum length of a signature title
pub const MAX_TITLE_LEN: usize = 100;

/// Maximum length of a signer's full name
pub const MAX_FULL_NAME_LEN: usize = 50;

/// Maximum length of stored status details
pub const MAX_STATUS_DETAILS_LEN: usize = 250;

macro_rules! record_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

record_id!(SignatureTypeId);
record_id!(SignatureId);
record_id!(SignerId);

/// Which backend a signature goes through, and which backend template it uses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureType {
    pub id: SignatureTypeId,
    pub backend_code: String,
    /// Empty when the document is uploaded rather than rendered from a template
    pub template_id: String,
}

impl SignatureType {
    pub fn uses_template(&self) -> bool {
        !self.template_id.is_empty()
    }
}

/// The single document slot of a signature
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    #[serde(skip_serializing, default)]
    pub content: Vec<u8>,
}

impl Document {
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.name)
            .field("len", &self.content.len())
            .finish()
    }
}

/// An envelope: one document sent to an ordered list of signers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub id: SignatureId,
    pub signature_type: SignatureType,
    /// Envelope id assigned by the signing service, empty until created there
    pub backend_id: String,
    pub title: String,
    pub document: Option<Document>,
    pub status: Status,
    pub status_datetime: DateTime<Utc>,
    pub signers: Vec<Signer>,
}

impl Signature {
    pub fn has_document(&self) -> bool {
        self.document.as_ref().is_some_and(|d| !d.name.is_empty())
    }

    pub fn signer(&self, id: SignerId) -> Option<&Signer> {
        self.signers.iter().find(|s| s.id == id)
    }
}

/// One recipient of an envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub id: SignerId,
    pub signature_id: SignatureId,
    /// Recipient id assigned by the signing service
    pub backend_id: String,
    pub full_name: String,
    pub email: String,
    /// 1-based, unique within the signature
    pub signing_order: u32,
    pub status: Status,
    pub status_datetime: DateTime<Utc>,
    pub status_details: String,
}

/// Signer data supplied when an envelope is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSigner {
    pub full_name: String,
    pub email: String,
}

/// Envelope data supplied at creation, before storage assigns ids
#[derive(Debug, Clone, PartialEq)]
pub struct NewSignature {
    pub signature_type: SignatureType,
    pub title: String,
    pub document: Option<Document>,
    pub signers: Vec<NewSigner>,
}

/// A signer with its position resolved, ready for storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedSigner {
    pub full_name: String,
    pub email: String,
    pub signing_order: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Title exceeds {} characters", MAX_TITLE_LEN)]
    TitleTooLong,

    #[error("Signer {position} has an empty name")]
    EmptySignerName { position: u32 },

    #[error("Signer {position} name exceeds {} characters", MAX_FULL_NAME_LEN)]
    SignerNameTooLong { position: u32 },

    #[error("Signer {position} has an invalid email: {email}")]
    InvalidEmail { position: u32, email: String },
}

impl NewSignature {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(ValidationError::TitleTooLong);
        }
        for (position, signer) in (1u32..).zip(&self.signers) {
            let name = signer.full_name.trim();
            if name.is_empty() {
                return Err(ValidationError::EmptySignerName { position });
            }
            if name.chars().count() > MAX_FULL_NAME_LEN {
                return Err(ValidationError::SignerNameTooLong { position });
            }
            if !is_plausible_email(&signer.email) {
                return Err(ValidationError::InvalidEmail {
                    position,
                    email: signer.email.clone(),
                });
            }
        }
        Ok(())
    }

    /// Signers in enumeration order with `signing_order` starting at 1
    pub fn ordered_signers(&self) -> Vec<OrderedSigner> {
        (1u32..)
            .zip(&self.signers)
            .map(|(signing_order, s)| OrderedSigner {
                full_name: s.full_name.trim().to_string(),
                email: s.email.trim().to_string(),
                signing_order,
            })
            .collect()
    }
}

fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    }
}

/// Cut free-text details to the stored column width
pub fn truncate_details(message: &str) -> String {
    message.chars().take(MAX_STATUS_DETAILS_LEN).collect()
}
