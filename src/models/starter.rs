use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::record::{
    base_record, decode_header, optional_string, optional_timestamp, required_int,
    required_string, ConcurrencyToken, DecodeError, GenericRecord, RecordCodec,
};

mod keys {
    pub const NAME: &str = "name";
    pub const FEED_INTERVAL_MINUTES: &str = "feedIntervalMinutes";
    pub const BIRTHDAY: &str = "birthday";
    pub const BIRTHPLACE: &str = "birthplace";
}

/// The sourdough starter everything else hangs off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Starter {
    pub name: String,
    pub feed_interval_minutes: i64,
    pub birthday: Option<DateTime<Utc>>,
    pub birthplace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<ConcurrencyToken>,
}

impl Starter {
    /// A new, unsaved starter born now.
    pub fn new(name: impl Into<String>, feed_interval_minutes: i64) -> Self {
        Self {
            name: name.into(),
            feed_interval_minutes,
            birthday: Some(Utc::now()),
            birthplace: None,
            token: None,
        }
    }

    pub fn with_birthday(mut self, birthday: Option<DateTime<Utc>>) -> Self {
        self.birthday = birthday;
        self
    }

    pub fn with_birthplace(mut self, birthplace: impl Into<String>) -> Self {
        self.birthplace = Some(birthplace.into());
        self
    }
}

impl RecordCodec for Starter {
    const RECORD_TYPE: &'static str = "Starters";

    fn token(&self) -> Option<&ConcurrencyToken> {
        self.token.as_ref()
    }

    fn encode(&self) -> GenericRecord {
        let mut record = base_record(Self::RECORD_TYPE, self.token.as_ref());
        record.set(keys::NAME, self.name.as_str());
        record.set(keys::FEED_INTERVAL_MINUTES, self.feed_interval_minutes);
        record.set_optional(keys::BIRTHDAY, self.birthday);
        record.set_optional(keys::BIRTHPLACE, self.birthplace.as_deref());
        record
    }

    fn decode(record: &GenericRecord) -> Result<Self, DecodeError> {
        let token = decode_header(record, Self::RECORD_TYPE)?;
        Ok(Self {
            name: required_string(record, keys::NAME)?,
            feed_interval_minutes: required_int(record, keys::FEED_INTERVAL_MINUTES)?,
            birthday: optional_timestamp(record, keys::BIRTHDAY),
            birthplace: optional_string(record, keys::BIRTHPLACE),
            token: Some(token),
        })
    }
}

impl fmt::Display for Starter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "Feed every {} min", self.feed_interval_minutes)?;
        if let Some(birthday) = &self.birthday {
            write!(f, "Born {}", birthday.format("%Y-%m-%d"))?;
            if let Some(place) = &self.birthplace {
                write!(f, " in {}", place)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;

    #[test]
    fn test_encode_writes_owned_fields() {
        let starter = Starter::new("Levain", 360).with_birthplace("Irvine");
        let record = starter.encode();

        assert_eq!(record.record_type(), "Starters");
        assert_eq!(record.get("name").and_then(FieldValue::as_str), Some("Levain"));
        assert_eq!(
            record.get("feedIntervalMinutes").and_then(FieldValue::as_int),
            Some(360)
        );
        assert_eq!(
            record.get("birthplace").and_then(FieldValue::as_str),
            Some("Irvine")
        );
    }

    #[test]
    fn test_decode_captures_token() {
        let starter = Starter::new("Levain", 360).with_birthday(None);
        assert!(!starter.is_persisted());

        let decoded = Starter::decode(&starter.encode()).unwrap();
        assert!(decoded.is_persisted());
        assert_eq!(decoded.name, "Levain");
        assert_eq!(decoded.feed_interval_minutes, 360);
        assert!(decoded.birthday.is_none());
        assert!(decoded.birthplace.is_none());
    }

    #[test]
    fn test_reencode_keeps_identity() {
        let record = Starter::new("Levain", 360).encode();
        let decoded = Starter::decode(&record).unwrap();

        let renamed = Starter {
            name: "Audrey".to_string(),
            ..decoded
        };
        let updated = renamed.encode();
        assert_eq!(updated.record_id(), record.record_id());
        assert_eq!(updated.get("name").and_then(FieldValue::as_str), Some("Audrey"));
    }

    #[test]
    fn test_clearing_optional_removes_field() {
        let starter = Starter::new("Levain", 360).with_birthplace("Irvine");
        let decoded = Starter::decode(&starter.encode()).unwrap();
        let moved = Starter {
            birthplace: None,
            ..decoded
        };
        assert!(moved.encode().get("birthplace").is_none());
    }

    #[test]
    fn test_decode_requires_interval() {
        let mut record = GenericRecord::new("Starters");
        record.set("name", "Levain");
        assert!(matches!(
            Starter::decode(&record),
            Err(DecodeError::MissingField("feedIntervalMinutes"))
        ));

        record.set("feedIntervalMinutes", 360.0);
        assert!(matches!(
            Starter::decode(&record),
            Err(DecodeError::WrongFieldType { .. })
        ));
    }

    #[test]
    fn test_starter_json_roundtrip() {
        let starter = Starter::new("Levain", 360).with_birthplace("Irvine");
        let json = serde_json::to_string(&starter).unwrap();
        let parsed: Starter = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, starter);
    }
}
