//! The remote record store, as seen from the client.
//!
//! The store is schema-less: it saves, queries and deletes [`GenericRecord`]s
//! and knows nothing about starters or meals. Transport, authentication and
//! retries belong to implementations of [`RecordStore`]; [`MemoryStore`] is
//! the in-process one.

mod memory;

use std::cmp::Ordering;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::record::{FieldValue, GenericRecord, OwnerRef, RecordCodec, RecordId, OWNER_FIELD};

pub use memory::MemoryStore;

/// Errors reported by a record store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unreachable: {0}")]
    Unavailable(String),

    #[error("Not signed in to the store")]
    NotAuthenticated,

    #[error("Record {record_id} was changed on the server")]
    ServerRecordChanged { record_id: RecordId },

    #[error("Record {0} does not exist on the server")]
    UnknownItem(RecordId),

    #[error("Record {record_id} references missing record {target}")]
    InvalidReference { record_id: RecordId, target: RecordId },

    #[error("Store error: {0}")]
    Internal(String),
}

/// Record filter. Only equality on a single field is supported.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    All,
    Equals { field: String, value: FieldValue },
}

impl Predicate {
    pub fn owned_by<P>(owner: &OwnerRef<P>) -> Self {
        Predicate::Equals {
            field: OWNER_FIELD.to_string(),
            value: FieldValue::Reference(owner.reference().clone()),
        }
    }

    pub fn matches(&self, record: &GenericRecord) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Equals { field, value } => match (record.get(field), value) {
                // References match on target identity, whatever the cascade action.
                (Some(FieldValue::Reference(a)), FieldValue::Reference(b)) => {
                    a.record_id() == b.record_id()
                }
                (Some(actual), expected) => actual == expected,
                (None, _) => false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub ascending: bool,
}

impl SortKey {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }

    /// Orders two records by this key. Records lacking the field sort last.
    pub fn compare(&self, a: &GenericRecord, b: &GenericRecord) -> Ordering {
        match (a.get(&self.field), b.get(&self.field)) {
            (Some(x), Some(y)) => {
                let ord = compare_values(x, y);
                if self.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

fn compare_values(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a, b) {
        (FieldValue::Timestamp(x), FieldValue::Timestamp(y)) => x.cmp(y),
        (FieldValue::Int(x), FieldValue::Int(y)) => x.cmp(y),
        (FieldValue::Double(x), FieldValue::Double(y)) => x.total_cmp(y),
        (FieldValue::String(x), FieldValue::String(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// A query over one record type.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub record_type: String,
    pub predicate: Predicate,
    pub sort: Option<SortKey>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(record_type: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            record_type: record_type.into(),
            predicate,
            sort: None,
            limit: None,
        }
    }

    /// Every record of the type.
    pub fn all(record_type: impl Into<String>) -> Self {
        Self::new(record_type, Predicate::All)
    }

    /// Records of entity type `E` owned by `owner`.
    pub fn owned_by<E: RecordCodec, P>(owner: &OwnerRef<P>) -> Self {
        Self::new(E::RECORD_TYPE, Predicate::owned_by(owner))
    }

    pub fn sorted_by(mut self, key: SortKey) -> Self {
        self.sort = Some(key);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Asynchronous access to a remote record store.
///
/// Saving a batch is all-or-nothing. Deleting a record also deletes every
/// record whose reference to it carries
/// [`ReferenceAction::DeleteSelf`](crate::record::ReferenceAction::DeleteSelf).
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Streams the matching records.
    fn query(&self, query: Query) -> BoxStream<'_, Result<GenericRecord, StoreError>>;

    /// Saves the batch and returns the stored records with fresh system
    /// fields. The returned order need not match the input.
    async fn save(&self, records: Vec<GenericRecord>) -> Result<Vec<GenericRecord>, StoreError>;

    /// Deletes records by identity, returning the identities actually deleted.
    async fn delete(&self, record_ids: Vec<RecordId>) -> Result<Vec<RecordId>, StoreError>;

    /// Removes every record in a zone.
    async fn delete_zone(&self, zone: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Starter;
    use chrono::{Duration, Utc};

    #[test]
    fn test_owned_by_matches_reference_target() {
        let starter_record = GenericRecord::new("Starters");
        let owner: OwnerRef<Starter> = OwnerRef::to_record(&starter_record);

        let mut child = GenericRecord::new("StarterMeals");
        assert!(!Predicate::owned_by(&owner).matches(&child));

        child.set_owner(&owner);
        assert!(Predicate::owned_by(&owner).matches(&child));

        let other: OwnerRef<Starter> = OwnerRef::to_record(&GenericRecord::new("Starters"));
        assert!(!Predicate::owned_by(&other).matches(&child));
    }

    #[test]
    fn test_sort_key_descending_by_date() {
        let now = Utc::now();
        let mut older = GenericRecord::new("StarterMeals");
        older.set("date", now - Duration::hours(1));
        let mut newer = GenericRecord::new("StarterMeals");
        newer.set("date", now);
        let undated = GenericRecord::new("StarterMeals");

        let key = SortKey::descending("date");
        assert_eq!(key.compare(&newer, &older), Ordering::Less);
        assert_eq!(key.compare(&older, &undated), Ordering::Less);
        assert_eq!(
            SortKey::ascending("date").compare(&newer, &older),
            Ordering::Greater
        );
    }

    #[test]
    fn test_query_builder() {
        let query = Query::all("Starters")
            .sorted_by(SortKey::descending("date"))
            .limit(1);
        assert_eq!(query.record_type, "Starters");
        assert_eq!(query.predicate, Predicate::All);
        assert_eq!(query.limit, Some(1));
    }
}
