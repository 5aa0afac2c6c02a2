use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::record::{
    base_record, decode_header, required_string, required_timestamp, ConcurrencyToken,
    DecodeError, GenericRecord, RecordCodec,
};

mod keys {
    pub const DATE: &str = crate::models::TimelineEntry::DATE_FIELD;
    pub const REMARKS: &str = "remarks";
}

/// A note on how the starter looked, without feeding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarterCheckIn {
    pub date: DateTime<Utc>,
    pub remarks: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<ConcurrencyToken>,
}

impl StarterCheckIn {
    pub fn new(date: DateTime<Utc>, remarks: impl Into<String>) -> Self {
        Self {
            date,
            remarks: remarks.into(),
            token: None,
        }
    }

    /// A check-in dated now.
    pub fn now(remarks: impl Into<String>) -> Self {
        Self::new(Utc::now(), remarks)
    }
}

impl RecordCodec for StarterCheckIn {
    const RECORD_TYPE: &'static str = "StarterCheckIns";

    fn token(&self) -> Option<&ConcurrencyToken> {
        self.token.as_ref()
    }

    fn encode(&self) -> GenericRecord {
        let mut record = base_record(Self::RECORD_TYPE, self.token.as_ref());
        record.set(keys::DATE, self.date);
        record.set(keys::REMARKS, self.remarks.as_str());
        record
    }

    fn decode(record: &GenericRecord) -> Result<Self, DecodeError> {
        let token = decode_header(record, Self::RECORD_TYPE)?;
        Ok(Self {
            date: required_timestamp(record, keys::DATE)?,
            remarks: required_string(record, keys::REMARKS)?,
            token: Some(token),
        })
    }
}

impl fmt::Display for StarterCheckIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.date.format("%Y-%m-%d %H:%M"), self.remarks)
    }
}
