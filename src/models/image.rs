use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{
    base_record, decode_header, optional_string, optional_timestamp, required_asset, Asset,
    ConcurrencyToken, DecodeError, GenericRecord, RecordCodec,
};

mod keys {
    pub const NAME: &str = "name";
    pub const DATE_TAKEN: &str = "dateTaken";
    pub const DATA: &str = "data";
}

/// A photo attached to a meal. The bytes travel as an asset, not inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub name: Option<String>,
    pub date_taken: Option<DateTime<Utc>>,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<ConcurrencyToken>,
}

impl Image {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            name: None,
            date_taken: None,
            data,
            token: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_date_taken(mut self, date: DateTime<Utc>) -> Self {
        self.date_taken = Some(date);
        self
    }
}

impl RecordCodec for Image {
    const RECORD_TYPE: &'static str = "Images";

    fn token(&self) -> Option<&ConcurrencyToken> {
        self.token.as_ref()
    }

    fn encode(&self) -> GenericRecord {
        let mut record = base_record(Self::RECORD_TYPE, self.token.as_ref());
        record.set_optional(keys::NAME, self.name.as_deref());
        record.set_optional(keys::DATE_TAKEN, self.date_taken);
        record.set(keys::DATA, Asset::new(self.data.clone()));
        record
    }

    fn decode(record: &GenericRecord) -> Result<Self, DecodeError> {
        let token = decode_header(record, Self::RECORD_TYPE)?;
        let asset = required_asset(record, keys::DATA)?;
        if asset.is_detached() {
            return Err(DecodeError::WrongFieldType {
                field: keys::DATA,
                expected: "asset with payload",
            });
        }
        Ok(Self {
            name: optional_string(record, keys::NAME),
            date_taken: optional_timestamp(record, keys::DATE_TAKEN),
            data: asset.into_data(),
            token: Some(token),
        })
    }
}
