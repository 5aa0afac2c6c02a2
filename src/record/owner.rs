//! Ownership references from child records to their parent.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use super::codec::RecordCodec;
use super::value::{GenericRecord, RecordId};

/// What the store does to the referencing record when the target is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceAction {
    None,
    DeleteSelf,
}

/// A reference field value pointing at another record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    record_id: RecordId,
    action: ReferenceAction,
}

impl Reference {
    pub fn new(record_id: RecordId, action: ReferenceAction) -> Self {
        Self { record_id, action }
    }

    pub fn record_id(&self) -> &RecordId {
        &self.record_id
    }

    pub fn action(&self) -> ReferenceAction {
        self.action
    }
}

/// A cascading reference to a record of entity type `P`.
///
/// The type parameter keeps a meal's owner from being handed to a query that
/// expects a starter. Children of `P` are deleted by the store with it.
pub struct OwnerRef<P> {
    reference: Reference,
    _owner: PhantomData<fn() -> P>,
}

impl<P> OwnerRef<P> {
    /// References the given record. The caller vouches that it holds a `P`.
    pub fn to_record(record: &GenericRecord) -> Self {
        Self::to_id(record.record_id().clone())
    }

    pub(crate) fn to_id(record_id: RecordId) -> Self {
        Self {
            reference: Reference::new(record_id, ReferenceAction::DeleteSelf),
            _owner: PhantomData,
        }
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn record_id(&self) -> &RecordId {
        self.reference.record_id()
    }
}

impl<P: RecordCodec> OwnerRef<P> {
    /// References a persisted entity; `None` if it has never been saved.
    pub fn of(owner: &P) -> Option<Self> {
        owner.record_id().map(Self::to_id)
    }
}

impl<P> Clone for OwnerRef<P> {
    fn clone(&self) -> Self {
        Self {
            reference: self.reference.clone(),
            _owner: PhantomData,
        }
    }
}

impl<P> PartialEq for OwnerRef<P> {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
    }
}

impl<P> fmt::Debug for OwnerRef<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerRef")
            .field("owner", &std::any::type_name::<P>())
            .field("record_id", self.record_id())
            .finish()
    }
}
