//! Mapping between typed entities and generic records.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::token::{ConcurrencyToken, TokenError};
use super::value::{Asset, FieldValue, GenericRecord, RecordId};

/// Why a generic record could not be turned into an entity.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Expected a {expected} record, found {found}")]
    WrongRecordType {
        expected: &'static str,
        found: String,
    },

    #[error("Required field '{0}' is missing")]
    MissingField(&'static str),

    #[error("Field '{field}' is not a {expected}")]
    WrongFieldType {
        field: &'static str,
        expected: &'static str,
    },

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// An entity that round-trips through a [`GenericRecord`].
///
/// `encode` only writes the fields the entity owns, on top of the record
/// restored from its token, so store-side fields survive an update.
pub trait RecordCodec: Sized {
    /// Record type name in the store.
    const RECORD_TYPE: &'static str;

    /// Token captured when this value was decoded; `None` if never saved.
    fn token(&self) -> Option<&ConcurrencyToken>;

    fn encode(&self) -> GenericRecord;

    fn decode(record: &GenericRecord) -> Result<Self, DecodeError>;

    fn is_persisted(&self) -> bool {
        self.token().is_some()
    }

    /// Store identity recovered from the token.
    ///
    /// `None` both for unsaved values and for tokens that no longer restore;
    /// use [`is_persisted`](Self::is_persisted) to tell them apart.
    fn record_id(&self) -> Option<RecordId> {
        let token = self.token()?;
        match GenericRecord::restore(token) {
            Ok(record) => Some(record.record_id().clone()),
            Err(e) => {
                tracing::warn!("Cannot restore {} token: {}", Self::RECORD_TYPE, e);
                None
            }
        }
    }
}

/// The record an entity's fields are written onto.
///
/// Restored from the token when there is one. A token that no longer
/// restores is logged and replaced by a fresh record, as if never saved.
pub fn base_record(record_type: &'static str, token: Option<&ConcurrencyToken>) -> GenericRecord {
    if let Some(token) = token {
        match GenericRecord::restore(token) {
            Ok(record) if record.record_type() == record_type => return record,
            Ok(record) => {
                tracing::warn!(
                    "Token for {} restored as a {} record; starting a new record",
                    record_type,
                    record.record_type()
                );
            }
            Err(e) => {
                tracing::warn!("Discarding unreadable {} token: {}", record_type, e);
            }
        }
    }
    GenericRecord::new(record_type)
}

/// Checks the type tag and captures the record's token.
pub fn decode_header(
    record: &GenericRecord,
    record_type: &'static str,
) -> Result<ConcurrencyToken, DecodeError> {
    if record.record_type() != record_type {
        return Err(DecodeError::WrongRecordType {
            expected: record_type,
            found: record.record_type().to_string(),
        });
    }
    Ok(record.token()?)
}

fn required<'a, T>(
    record: &'a GenericRecord,
    field: &'static str,
    expected: &'static str,
    extract: impl FnOnce(&'a FieldValue) -> Option<T>,
) -> Result<T, DecodeError> {
    let value = record.get(field).ok_or(DecodeError::MissingField(field))?;
    extract(value).ok_or(DecodeError::WrongFieldType { field, expected })
}

pub fn required_string(record: &GenericRecord, field: &'static str) -> Result<String, DecodeError> {
    required(record, field, "string", |v| v.as_str().map(str::to_string))
}

pub fn required_int(record: &GenericRecord, field: &'static str) -> Result<i64, DecodeError> {
    required(record, field, "integer", FieldValue::as_int)
}

pub fn required_double(record: &GenericRecord, field: &'static str) -> Result<f64, DecodeError> {
    required(record, field, "double", FieldValue::as_double)
}

pub fn required_timestamp(
    record: &GenericRecord,
    field: &'static str,
) -> Result<DateTime<Utc>, DecodeError> {
    required(record, field, "timestamp", FieldValue::as_timestamp)
}

pub fn required_asset(record: &GenericRecord, field: &'static str) -> Result<Asset, DecodeError> {
    required(record, field, "asset", |v| v.as_asset().cloned())
}

// Optional fields of the wrong type read as absent.

pub fn optional_string(record: &GenericRecord, field: &str) -> Option<String> {
    record
        .get(field)
        .and_then(FieldValue::as_str)
        .map(str::to_string)
}

pub fn optional_double(record: &GenericRecord, field: &str) -> Option<f64> {
    record.get(field).and_then(FieldValue::as_double)
}

pub fn optional_timestamp(record: &GenericRecord, field: &str) -> Option<DateTime<Utc>> {
    record.get(field).and_then(FieldValue::as_timestamp)
}
