//! In-process record store.
//!
//! Behaves like the remote store where the client can tell the difference:
//! change tags are checked on save, batches are atomic, references cascade on
//! delete and asset payloads live in a separate table. Failures and latency
//! can be injected for tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use futures::FutureExt;
use uuid::Uuid;

use super::{Query, RecordStore, StoreError};
use crate::record::{Asset, FieldValue, GenericRecord, RecordId, ReferenceAction};

#[derive(Default)]
struct Inner {
    /// Records in insertion order.
    records: Vec<GenericRecord>,
    /// Asset payloads keyed by checksum.
    assets: HashMap<String, Vec<u8>>,
    unavailable: bool,
    fail_next: Option<StoreError>,
    latency: Option<Duration>,
    save_calls: usize,
}

impl Inner {
    fn position(&self, record_id: &RecordId) -> Option<usize> {
        self.records.iter().position(|r| r.record_id() == record_id)
    }

    /// Fails the call if the store is down or a failure was queued.
    fn check_reachable(&mut self) -> Result<(), StoreError> {
        if let Some(err) = self.fail_next.take() {
            return Err(err);
        }
        if self.unavailable {
            return Err(StoreError::Unavailable("network unreachable".to_string()));
        }
        Ok(())
    }

    fn run_query(&self, query: &Query) -> Vec<GenericRecord> {
        let mut matches: Vec<&GenericRecord> = self
            .records
            .iter()
            .filter(|r| r.record_type() == query.record_type && query.predicate.matches(r))
            .collect();

        if let Some(key) = &query.sort {
            matches.sort_by(|a, b| key.compare(a, b));
        }
        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }

        matches.into_iter().map(|r| self.hydrate(r.clone())).collect()
    }

    /// Fills detached asset fields back in from the asset table.
    fn hydrate(&self, mut record: GenericRecord) -> GenericRecord {
        for (_, value) in record.fields_mut() {
            if let FieldValue::Asset(asset) = value {
                if let Some(data) = self.assets.get(asset.checksum()) {
                    *asset = Asset::new(data.clone());
                }
            }
        }
        record
    }

    /// Moves asset payloads out of the record into the asset table.
    fn detach_assets(&mut self, record: &mut GenericRecord) {
        for (_, value) in record.fields_mut() {
            if let FieldValue::Asset(asset) = value {
                if !asset.is_detached() {
                    let detached = Asset::detached(asset.checksum());
                    let owned = std::mem::replace(asset, detached);
                    let checksum = owned.checksum().to_string();
                    self.assets.insert(checksum, owned.into_data());
                }
            }
        }
    }

    fn validate_save(&self, batch: &[GenericRecord]) -> Result<(), StoreError> {
        let batch_ids: HashSet<&RecordId> = batch.iter().map(|r| r.record_id()).collect();

        for record in batch {
            let incoming_tag = &record.system_fields().change_tag;
            match self.position(record.record_id()) {
                Some(pos) => {
                    let stored = &self.records[pos];
                    if stored.record_type() != record.record_type() {
                        return Err(StoreError::Internal(format!(
                            "record {} is a {}, not a {}",
                            record.record_id(),
                            stored.record_type(),
                            record.record_type()
                        )));
                    }
                    if &stored.system_fields().change_tag != incoming_tag {
                        return Err(StoreError::ServerRecordChanged {
                            record_id: record.record_id().clone(),
                        });
                    }
                }
                None if incoming_tag.is_some() => {
                    return Err(StoreError::UnknownItem(record.record_id().clone()));
                }
                None => {}
            }

            for (_, value) in record.fields() {
                if let FieldValue::Reference(reference) = value {
                    let target = reference.record_id();
                    if !batch_ids.contains(target) && self.position(target).is_none() {
                        return Err(StoreError::InvalidReference {
                            record_id: record.record_id().clone(),
                            target: target.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Writes the batch as change sets over the stored records.
    fn apply_save(&mut self, batch: Vec<GenericRecord>) -> Vec<GenericRecord> {
        let now = Utc::now();
        let mut saved = Vec::with_capacity(batch.len());

        for changes in batch {
            let existing = self.position(changes.record_id());
            let mut record = match existing {
                Some(pos) => self.hydrate(self.records[pos].clone()),
                None => GenericRecord::with_id(changes.record_type(), changes.record_id().clone()),
            };
            record.apply_changes(changes);
            {
                let system = record.system_fields_mut();
                system.change_tag = Some(Uuid::new_v4().to_string());
                system.modified_at = Some(now);
                if existing.is_none() {
                    system.created_at = Some(now);
                }
            }

            // The caller gets the record back with its payloads attached.
            saved.push(record.clone());

            self.detach_assets(&mut record);
            match existing {
                Some(pos) => self.records[pos] = record,
                None => self.records.push(record),
            }
        }
        self.collect_assets();
        saved
    }

    /// Deletes the records and everything that cascades from them.
    fn apply_delete(&mut self, record_ids: &[RecordId]) -> Vec<RecordId> {
        let mut deleted: Vec<RecordId> = record_ids
            .iter()
            .filter(|id| self.position(id).is_some())
            .cloned()
            .collect();
        let mut doomed: HashSet<RecordId> = deleted.iter().cloned().collect();

        loop {
            let cascaded: Vec<RecordId> = self
                .records
                .iter()
                .filter(|r| !doomed.contains(r.record_id()))
                .filter(|r| {
                    r.fields().any(|(_, value)| match value {
                        FieldValue::Reference(reference) => {
                            reference.action() == ReferenceAction::DeleteSelf
                                && doomed.contains(reference.record_id())
                        }
                        _ => false,
                    })
                })
                .map(|r| r.record_id().clone())
                .collect();
            if cascaded.is_empty() {
                break;
            }
            doomed.extend(cascaded);
        }

        self.records.retain(|r| !doomed.contains(r.record_id()));
        self.collect_assets();
        deleted.dedup();
        deleted
    }

    fn collect_assets(&mut self) {
        let live: HashSet<String> = self
            .records
            .iter()
            .flat_map(|r| r.fields())
            .filter_map(|(_, value)| value.as_asset().map(|a| a.checksum().to_string()))
            .collect();
        self.assets.retain(|checksum, _| live.contains(checksum));
    }
}

/// A record store held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulates losing the connection (or getting it back).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Makes the next store call fail with `error`.
    pub fn fail_next_with(&self, error: StoreError) {
        self.lock().fail_next = Some(error);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Number of stored records of a type.
    pub fn record_count(&self, record_type: &str) -> usize {
        self.lock()
            .records
            .iter()
            .filter(|r| r.record_type() == record_type)
            .count()
    }

    /// Number of asset payloads held.
    pub fn asset_count(&self) -> usize {
        self.lock().assets.len()
    }

    /// Number of save calls received, including failed ones.
    pub fn save_calls(&self) -> usize {
        self.lock().save_calls
    }

    async fn round_trip(&self) -> Result<(), StoreError> {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.lock().check_reachable()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn query(&self, query: Query) -> BoxStream<'_, Result<GenericRecord, StoreError>> {
        async move {
            self.round_trip().await?;
            let records = self.lock().run_query(&query);
            tracing::trace!("{} query matched {} record(s)", query.record_type, records.len());
            Ok(records)
        }
        .into_stream()
        .flat_map(|result: Result<Vec<GenericRecord>, StoreError>| match result {
            Ok(records) => stream::iter(records.into_iter().map(Ok)).left_stream(),
            Err(e) => stream::once(async move { Err(e) }).right_stream(),
        })
        .boxed()
    }

    async fn save(&self, records: Vec<GenericRecord>) -> Result<Vec<GenericRecord>, StoreError> {
        self.lock().save_calls += 1;
        self.round_trip().await?;

        let mut inner = self.lock();
        inner.validate_save(&records)?;
        Ok(inner.apply_save(records))
    }

    async fn delete(&self, record_ids: Vec<RecordId>) -> Result<Vec<RecordId>, StoreError> {
        self.round_trip().await?;
        Ok(self.lock().apply_delete(&record_ids))
    }

    async fn delete_zone(&self, zone: &str) -> Result<(), StoreError> {
        self.round_trip().await?;
        let mut inner = self.lock();
        inner.records.retain(|r| r.record_id().zone() != zone);
        inner.collect_assets();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Starter, StarterMeal};
    use crate::record::{OwnerRef, DEFAULT_ZONE};
    use futures::TryStreamExt;

    async fn query_all(store: &MemoryStore, record_type: &str) -> Vec<GenericRecord> {
        store
            .query(Query::all(record_type))
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_save_stamps_change_tag() {
        let store = MemoryStore::new();
        let saved = store.save(vec![GenericRecord::new("Starters")]).await.unwrap();

        let system = saved[0].system_fields();
        assert!(system.change_tag.is_some());
        assert!(system.created_at.is_some());
        assert_eq!(store.record_count("Starters"), 1);
    }

    #[tokio::test]
    async fn test_stale_change_tag_conflicts() {
        let store = MemoryStore::new();
        let first = store.save(vec![GenericRecord::new("Starters")]).await.unwrap();
        let token = first[0].token().unwrap();

        // Two writers start from the same token; only the first wins.
        let mut a = GenericRecord::restore(&token).unwrap();
        a.set("name", "a");
        let mut b = GenericRecord::restore(&token).unwrap();
        b.set("name", "b");

        store.save(vec![a]).await.unwrap();
        let err = store.save(vec![b]).await.unwrap_err();
        assert!(matches!(err, StoreError::ServerRecordChanged { .. }));
    }

    #[tokio::test]
    async fn test_update_merges_onto_stored_fields() {
        let store = MemoryStore::new();
        let mut record = GenericRecord::new("Starters");
        record.set("name", "Levain");
        record.set("birthplace", "Irvine");
        record.set("hydrationPercent", 100i64);
        let first = store.save(vec![record]).await.unwrap();

        let mut update = GenericRecord::restore(&first[0].token().unwrap()).unwrap();
        update.set("name", "Audrey");
        update.remove("birthplace");
        let saved = store.save(vec![update]).await.unwrap();

        for record in [&saved[0], &query_all(&store, "Starters").await[0]] {
            assert_eq!(record.get("name").and_then(FieldValue::as_str), Some("Audrey"));
            assert!(record.get("birthplace").is_none());
            assert_eq!(
                record.get("hydrationPercent").and_then(FieldValue::as_int),
                Some(100)
            );
        }
        assert_eq!(saved[0].system_fields().created_at, first[0].system_fields().created_at);
    }

    #[tokio::test]
    async fn test_replaced_asset_is_dropped_on_save() {
        let store = MemoryStore::new();
        let mut image = GenericRecord::new("Images");
        image.set("data", Asset::new(vec![1, 1, 1]));
        let first = store.save(vec![image]).await.unwrap();

        let mut update = GenericRecord::restore(&first[0].token().unwrap()).unwrap();
        update.set("data", Asset::new(vec![2, 2, 2]));
        store.save(vec![update]).await.unwrap();

        assert_eq!(store.asset_count(), 1);
        let fetched = query_all(&store, "Images").await;
        let asset = fetched[0].get("data").and_then(FieldValue::as_asset).unwrap();
        assert_eq!(asset.data(), &[2, 2, 2]);
    }

    #[tokio::test]
    async fn test_batch_is_atomic() {
        let store = MemoryStore::new();
        let good = GenericRecord::new("Starters");
        let mut dangling = GenericRecord::new("StarterMeals");
        let missing: OwnerRef<Starter> = OwnerRef::to_record(&GenericRecord::new("Starters"));
        dangling.set_owner(&missing);

        let err = store.save(vec![good, dangling]).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference { .. }));
        assert_eq!(store.record_count("Starters"), 0);
    }

    #[tokio::test]
    async fn test_delete_cascades_through_owners() {
        let store = MemoryStore::new();
        let starter = GenericRecord::new("Starters");
        let starter_ref: OwnerRef<Starter> = OwnerRef::to_record(&starter);
        let mut meal = GenericRecord::new("StarterMeals");
        meal.set_owner(&starter_ref);
        let meal_ref: OwnerRef<StarterMeal> = OwnerRef::to_record(&meal);
        let mut water = GenericRecord::new("WaterRations");
        water.set_owner(&meal_ref);
        let starter_id = starter.record_id().clone();

        store.save(vec![starter, meal, water]).await.unwrap();
        let deleted = store.delete(vec![starter_id.clone()]).await.unwrap();

        assert_eq!(deleted, vec![starter_id]);
        assert_eq!(store.record_count("Starters"), 0);
        assert_eq!(store.record_count("StarterMeals"), 0);
        assert_eq!(store.record_count("WaterRations"), 0);
    }

    #[tokio::test]
    async fn test_delete_unknown_returns_nothing() {
        let store = MemoryStore::new();
        let deleted = store.delete(vec![RecordId::new()]).await.unwrap();
        assert!(deleted.is_empty());
    }

    #[tokio::test]
    async fn test_assets_stored_out_of_line() {
        let store = MemoryStore::new();
        let mut image = GenericRecord::new("Images");
        image.set("data", Asset::new(vec![9, 9, 9]));
        store.save(vec![image]).await.unwrap();
        assert_eq!(store.asset_count(), 1);

        let stored = store.lock().records[0].clone();
        assert!(stored.get("data").and_then(FieldValue::as_asset).unwrap().is_detached());

        let fetched = query_all(&store, "Images").await;
        let asset = fetched[0].get("data").and_then(FieldValue::as_asset).unwrap();
        assert_eq!(asset.data(), &[9, 9, 9]);
    }

    #[tokio::test]
    async fn test_unavailable_fails_calls() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let result: Result<Vec<GenericRecord>, _> =
            store.query(Query::all("Starters")).try_collect().await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));

        store.set_unavailable(false);
        assert!(query_all(&store, "Starters").await.is_empty());
    }

    #[tokio::test]
    async fn test_fail_next_is_one_shot() {
        let store = MemoryStore::new();
        store.fail_next_with(StoreError::NotAuthenticated);
        assert!(store.save(vec![GenericRecord::new("Starters")]).await.is_err());
        assert!(store.save(vec![GenericRecord::new("Starters")]).await.is_ok());
        assert_eq!(store.save_calls(), 2);
    }

    #[tokio::test]
    async fn test_delete_zone_clears_records() {
        let store = MemoryStore::new();
        store.save(vec![GenericRecord::new("Starters")]).await.unwrap();
        store.delete_zone(DEFAULT_ZONE).await.unwrap();
        assert_eq!(store.record_count("Starters"), 0);
    }
}
