//! The generic, schema-less record exchanged with the remote store.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::owner::{OwnerRef, Reference};
use super::token::{ConcurrencyToken, SystemFields, TokenError};

/// Zone every record lives in unless the store says otherwise.
pub const DEFAULT_ZONE: &str = "_defaultZone";

/// Field holding a child's reference to its owner.
pub const OWNER_FIELD: &str = "owner";

/// Identity of a record inside the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    record_name: String,
    zone: String,
}

impl RecordId {
    /// Generates a fresh identity in the default zone.
    pub fn new() -> Self {
        Self::with_name(Uuid::new_v4().to_string())
    }

    pub fn with_name(record_name: impl Into<String>) -> Self {
        Self {
            record_name: record_name.into(),
            zone: DEFAULT_ZONE.to_string(),
        }
    }

    pub fn in_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = zone.into();
        self
    }

    pub fn record_name(&self) -> &str {
        &self.record_name
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.zone, self.record_name)
    }
}

/// Binary payload stored out-of-line from the record that references it.
#[derive(Clone, PartialEq, Eq)]
pub struct Asset {
    checksum: String,
    data: Vec<u8>,
}

impl Asset {
    pub fn new(data: Vec<u8>) -> Self {
        let checksum = Self::checksum_of(&data);
        Self { checksum, data }
    }

    /// A reference to a payload held elsewhere; the store fills the data back in.
    pub fn detached(checksum: impl Into<String>) -> Self {
        Self {
            checksum: checksum.into(),
            data: Vec::new(),
        }
    }

    /// Hex SHA-256 of the payload.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn is_detached(&self) -> bool {
        self.data.is_empty() && self.checksum != Self::checksum_of(&[])
    }

    fn checksum_of(data: &[u8]) -> String {
        let digest = Sha256::digest(data);
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("checksum", &self.checksum)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Dynamically typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Double(f64),
    Timestamp(DateTime<Utc>),
    Bytes(Vec<u8>),
    Asset(Asset),
    Reference(Reference),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            FieldValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_asset(&self) -> Option<&Asset> {
        match self {
            FieldValue::Asset(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            FieldValue::Reference(r) => Some(r),
            _ => None,
        }
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Double(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Bytes(v)
    }
}

impl From<Asset> for FieldValue {
    fn from(v: Asset) -> Self {
        FieldValue::Asset(v)
    }
}

impl From<Reference> for FieldValue {
    fn from(v: Reference) -> Self {
        FieldValue::Reference(v)
    }
}

/// A record as the store sees it: system fields plus named values.
///
/// A record sent to the store is a change set: keys it sets are written,
/// keys it explicitly cleared are deleted, and every other stored field is
/// left alone.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericRecord {
    system: SystemFields,
    fields: BTreeMap<String, FieldValue>,
    cleared: BTreeSet<String>,
}

impl GenericRecord {
    /// A brand-new record with a fresh identity.
    pub fn new(record_type: impl Into<String>) -> Self {
        Self::with_id(record_type, RecordId::new())
    }

    pub fn with_id(record_type: impl Into<String>, record_id: RecordId) -> Self {
        Self {
            system: SystemFields::new(record_type, record_id),
            fields: BTreeMap::new(),
            cleared: BTreeSet::new(),
        }
    }

    /// Rebuilds a record with no fields from an archived token.
    pub fn restore(token: &ConcurrencyToken) -> Result<Self, TokenError> {
        Ok(Self {
            system: SystemFields::restore(token)?,
            fields: BTreeMap::new(),
            cleared: BTreeSet::new(),
        })
    }

    /// Archives this record's system fields.
    pub fn token(&self) -> Result<ConcurrencyToken, TokenError> {
        self.system.archive()
    }

    pub fn record_id(&self) -> &RecordId {
        &self.system.record_id
    }

    pub fn record_type(&self) -> &str {
        &self.system.record_type
    }

    pub fn system_fields(&self) -> &SystemFields {
        &self.system
    }

    /// Store implementations stamp change tags and timestamps through this.
    pub fn system_fields_mut(&mut self) -> &mut SystemFields {
        &mut self.system
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        self.cleared.remove(&key);
        self.fields.insert(key, value.into());
    }

    /// Sets the field when `value` is present, clears it otherwise.
    pub fn set_optional<V: Into<FieldValue>>(&mut self, key: impl Into<String>, value: Option<V>) {
        match value {
            Some(v) => self.set(key, v),
            None => {
                let key = key.into();
                self.remove(&key);
            }
        }
    }

    /// Removes the field and marks it cleared, so saving this record deletes
    /// it from the store too.
    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.cleared.insert(key.to_string());
        self.fields.remove(key)
    }

    /// Keys removed since this record was built or restored.
    pub fn cleared_fields(&self) -> impl Iterator<Item = &str> {
        self.cleared.iter().map(String::as_str)
    }

    /// Applies a change set on top of this record: takes its system fields,
    /// deletes its cleared keys and writes its fields. Fields the change set
    /// does not mention keep their values.
    pub fn apply_changes(&mut self, changes: GenericRecord) {
        self.system = changes.system;
        for key in &changes.cleared {
            self.fields.remove(key);
        }
        self.fields.extend(changes.fields);
        self.cleared.clear();
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn fields_mut(&mut self) -> impl Iterator<Item = (&str, &mut FieldValue)> {
        self.fields.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    /// The owner reference, if this record is a child.
    pub fn owner(&self) -> Option<&Reference> {
        self.get(OWNER_FIELD).and_then(FieldValue::as_reference)
    }

    pub fn set_owner<P>(&mut self, owner: &OwnerRef<P>) {
        self.set(OWNER_FIELD, owner.reference().clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_defaults_to_default_zone() {
        let id = RecordId::new();
        assert_eq!(id.zone(), DEFAULT_ZONE);
        assert!(Uuid::parse_str(id.record_name()).is_ok());
        assert_ne!(id, RecordId::new());
    }

    #[test]
    fn test_set_optional_clears_field() {
        let mut record = GenericRecord::new("Starters");
        record.set_optional("birthplace", Some("Irvine"));
        assert_eq!(
            record.get("birthplace").and_then(FieldValue::as_str),
            Some("Irvine")
        );

        record.set_optional::<&str>("birthplace", None);
        assert!(record.get("birthplace").is_none());
    }

    #[test]
    fn test_restore_keeps_identity_drops_fields() {
        let mut record = GenericRecord::new("Starters");
        record.set("name", "Levain");

        let token = record.token().unwrap();
        let restored = GenericRecord::restore(&token).unwrap();

        assert_eq!(restored.record_id(), record.record_id());
        assert_eq!(restored.record_type(), "Starters");
        assert!(restored.get("name").is_none());
    }

    #[test]
    fn test_typed_accessors_reject_other_types() {
        let value = FieldValue::Int(360);
        assert_eq!(value.as_int(), Some(360));
        assert_eq!(value.as_double(), None);
        assert_eq!(value.as_str(), None);
    }

    #[test]
    fn test_remove_marks_field_cleared() {
        let mut record = GenericRecord::new("Starters");
        record.set("birthplace", "Irvine");
        record.set_optional::<&str>("birthplace", None);
        assert_eq!(record.cleared_fields().collect::<Vec<_>>(), vec!["birthplace"]);

        record.set("birthplace", "Austin");
        assert_eq!(record.cleared_fields().count(), 0);
    }

    #[test]
    fn test_apply_changes_keeps_unmentioned_fields() {
        let mut stored = GenericRecord::new("Starters");
        stored.set("name", "Levain");
        stored.set("birthplace", "Irvine");
        stored.set("hydrationPercent", 100i64);

        let mut changes = GenericRecord::restore(&stored.token().unwrap()).unwrap();
        changes.set("name", "Audrey");
        changes.remove("birthplace");
        stored.apply_changes(changes);

        assert_eq!(stored.get("name").and_then(FieldValue::as_str), Some("Audrey"));
        assert!(stored.get("birthplace").is_none());
        assert_eq!(
            stored.get("hydrationPercent").and_then(FieldValue::as_int),
            Some(100)
        );
        assert_eq!(stored.cleared_fields().count(), 0);
    }

    #[test]
    fn test_asset_checksum() {
        let asset = Asset::new(b"crumb shot".to_vec());
        assert_eq!(asset.checksum().len(), 64);
        assert!(!asset.is_detached());

        let detached = Asset::detached(asset.checksum());
        assert!(detached.is_detached());
        assert_eq!(detached.checksum(), asset.checksum());
    }
}
