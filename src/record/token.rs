//! Store-internal record metadata and its archived form, the concurrency token.
//!
//! The token is what lets an update replay the identity and change tag the
//! store handed out on the last read. Clients keep it next to each decoded
//! entity and hand it back unchanged on the next save; they never look inside.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::value::RecordId;

/// Errors archiving or restoring system fields.
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Failed to archive system fields: {0}")]
    Archive(String),

    #[error("Failed to restore system fields: {0}")]
    Restore(String),

    #[error("Restored system fields are incomplete: {0}")]
    Incomplete(&'static str),
}

/// Metadata owned by the store rather than by the client.
///
/// Store implementations stamp `change_tag` and the timestamps on every
/// successful save. A save whose `change_tag` does not match the stored one
/// is a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemFields {
    pub record_id: RecordId,
    pub record_type: String,
    pub change_tag: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl SystemFields {
    pub fn new(record_type: impl Into<String>, record_id: RecordId) -> Self {
        Self {
            record_id,
            record_type: record_type.into(),
            change_tag: None,
            created_at: None,
            modified_at: None,
        }
    }

    /// Archives the fields as CBOR.
    pub(crate) fn archive(&self) -> Result<ConcurrencyToken, TokenError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| TokenError::Archive(e.to_string()))?;
        Ok(ConcurrencyToken(buf))
    }

    /// Restores fields from a token, rejecting archives that lack an identity.
    pub(crate) fn restore(token: &ConcurrencyToken) -> Result<Self, TokenError> {
        let fields: SystemFields = ciborium::from_reader(token.0.as_slice())
            .map_err(|e| TokenError::Restore(e.to_string()))?;

        if fields.record_type.is_empty() {
            return Err(TokenError::Incomplete("record_type"));
        }
        if fields.record_id.record_name().is_empty() {
            return Err(TokenError::Incomplete("record_name"));
        }
        Ok(fields)
    }
}

/// Opaque archived system metadata of one persisted record.
///
/// Equality is byte equality. An entity without a token has never been saved.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConcurrencyToken(#[serde(with = "serde_bytes")] Vec<u8>);

impl ConcurrencyToken {
    /// Wraps bytes previously obtained from [`ConcurrencyToken::as_bytes`].
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConcurrencyToken({} bytes)", self.0.len())
    }
}
