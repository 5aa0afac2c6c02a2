//! The store client: the only way domain code talks to the record store.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use futures::TryStreamExt;
use tracing::Instrument;

use super::error::ClientError;
use super::join::{join2_with, join3_with};
use super::operation::{Operation, OperationHandle};
use crate::config::ClientConfig;
use crate::models::{
    merge_by_date, FlourRation, Image, Starter, StarterCheckIn, StarterMeal, TimelineEntry,
    WaterRation,
};
use crate::record::{GenericRecord, OwnerRef, RecordCodec, RecordId};
use crate::store::{Query, RecordStore, SortKey, StoreError};

/// Client for one starter's records in a [`RecordStore`].
///
/// Every operation is spawned onto the Tokio runtime and returned as an
/// [`Operation`]; await it for the outcome, or pass its handle to a later
/// operation's `after` list to order the two.
///
/// The client caches the starter it last saved or found on initialization.
/// Only [`put`](Self::put), [`initialize`](Self::initialize) and a
/// [`delete`](Self::delete) of that same starter change the cache.
pub struct StoreClient<S: RecordStore> {
    store: Arc<S>,
    starter: Arc<RwLock<Option<Starter>>>,
    config: Arc<ClientConfig>,
}

impl<S: RecordStore> Clone for StoreClient<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            starter: self.starter.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: RecordStore> StoreClient<S> {
    /// Connects with the default configuration. See [`initialize_with`](Self::initialize_with).
    pub fn initialize(store: Arc<S>) -> Operation<Self> {
        Self::initialize_with(store, ClientConfig::default())
    }

    /// Looks up the starter and yields a client caching it.
    ///
    /// An empty store is not an error: the client simply has no starter yet.
    pub fn initialize_with(store: Arc<S>, config: ClientConfig) -> Operation<Self> {
        let client = Self {
            store,
            starter: Arc::new(RwLock::new(None)),
            config: Arc::new(config),
        };
        let this = client.clone();
        client.spawn("initialize", &[], async move {
            match this.query_starter().await {
                Ok(starter) => this.cache_starter(Some(starter)),
                Err(ClientError::RecordNotFound) => {
                    tracing::info!("No starter in the store yet");
                }
                Err(e) => return Err(e),
            }
            Ok(this)
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The cached starter, `None` if there is none yet.
    pub fn starter(&self) -> Option<Starter> {
        self.starter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetches the starter from the store. Does not touch the cache.
    pub fn fetch_starter(&self) -> Operation<Starter> {
        let this = self.clone();
        self.spawn("fetch_starter", &[], async move { this.query_starter().await })
    }

    /// Saves the starter and caches the stored version.
    ///
    /// Saving a starter decoded from the store updates it in place; the save
    /// fails with a [`StoreError::ServerRecordChanged`] if someone else
    /// updated it first.
    pub fn put(&self, starter: &Starter) -> Operation<Starter> {
        let record = starter.encode();
        let this = self.clone();
        self.spawn("put", &[], async move {
            let saved = this.save(vec![record]).await?;
            let record = saved.first().ok_or(ClientError::RecordNotFound)?;
            let starter: Starter = decode_one(record)?;
            this.cache_starter(Some(starter.clone()));
            Ok(starter)
        })
    }

    /// Deletes a saved record. The store deletes everything it owns with it.
    ///
    /// Fails with [`ClientError::RecordNotFound`] unless the store confirms
    /// the record was deleted.
    ///
    /// # Panics
    ///
    /// If `record` was never saved or its token cannot be restored.
    pub fn delete<E: RecordCodec>(&self, record: &E) -> Operation<()> {
        let record_id = match record.record_id() {
            Some(id) => id,
            None if record.is_persisted() => {
                panic!("cannot delete a {}: its token cannot be restored", E::RECORD_TYPE)
            }
            None => panic!("cannot delete a {} that was never saved", E::RECORD_TYPE),
        };
        let record_type = E::RECORD_TYPE;
        let is_starter = record_type == Starter::RECORD_TYPE;
        let this = self.clone();
        self.spawn("delete", &[], async move {
            let deleted = this
                .round_trip(this.store.delete(vec![record_id.clone()]))
                .await?;
            if !deleted.contains(&record_id) {
                return Err(ClientError::RecordNotFound);
            }
            tracing::debug!("Deleted {} {}", record_type, record_id);
            if is_starter {
                this.forget_starter(&record_id);
            }
            Ok(())
        })
    }

    /// Feeds the cached starter one meal. See [`feed_starter_batch`](Self::feed_starter_batch).
    pub fn feed_starter(&self, meal: StarterMeal) -> Operation<StarterMeal> {
        let (batch, meal_ids) = self.meal_graph(&[meal]);
        let this = self.clone();
        self.spawn("feed_starter", &[], async move {
            let mut meals = this.save_meals(batch, meal_ids).await?;
            meals.pop().ok_or(ClientError::RecordNotFound)
        })
    }

    /// Saves the meals with all their rations and photos in one atomic batch.
    ///
    /// Yields the saved meals, fully populated, in the order given.
    ///
    /// # Panics
    ///
    /// If there is no saved starter cached, or a meal has no water ration.
    /// Both are checked before anything is sent to the store.
    pub fn feed_starter_batch(&self, meals: Vec<StarterMeal>) -> Operation<Vec<StarterMeal>> {
        let (batch, meal_ids) = self.meal_graph(&meals);
        let this = self.clone();
        self.spawn("feed_starter", &[], async move {
            this.save_meals(batch, meal_ids).await
        })
    }

    pub fn check_in_starter(&self, check_in: StarterCheckIn) -> Operation<StarterCheckIn> {
        let (batch, ids) = self.check_in_graph(&[check_in]);
        let this = self.clone();
        self.spawn("check_in_starter", &[], async move {
            let mut check_ins = this.save_check_ins(batch, ids).await?;
            check_ins.pop().ok_or(ClientError::RecordNotFound)
        })
    }

    /// Saves the check-ins against the cached starter in one batch, yielding
    /// them in the order given.
    ///
    /// # Panics
    ///
    /// If there is no saved starter cached.
    pub fn check_in_starter_batch(
        &self,
        check_ins: Vec<StarterCheckIn>,
    ) -> Operation<Vec<StarterCheckIn>> {
        let (batch, ids) = self.check_in_graph(&check_ins);
        let this = self.clone();
        self.spawn("check_in_starter", &[], async move {
            this.save_check_ins(batch, ids).await
        })
    }

    /// The starter's most recent meal, with its rations and photo.
    ///
    /// # Panics
    ///
    /// If `starter` was never saved.
    pub fn fetch_last_meal(&self, starter: &Starter) -> Operation<StarterMeal> {
        let owner = owner_of(starter);
        let this = self.clone();
        self.spawn("fetch_last_meal", &[], async move {
            let query = Query::owned_by::<StarterMeal, _>(&owner)
                .sorted_by(SortKey::descending(TimelineEntry::DATE_FIELD))
                .limit(1);
            let records = this.query(query).await?;
            let record = records.first().ok_or(ClientError::RecordNotFound)?;
            let meal: StarterMeal = decode_one(record)?;
            this.fetch_details(meal, OwnerRef::to_record(record)).await
        })
    }

    /// Loads the rations and photo of a meal, e.g. one from [`fetch_all_meals`](Self::fetch_all_meals).
    ///
    /// Fails with [`ClientError::RecordNotFound`] if the water ration is missing.
    ///
    /// # Panics
    ///
    /// If `meal` was never saved.
    pub fn fetch_meal_details(&self, meal: &StarterMeal) -> Operation<StarterMeal> {
        let owner = owner_of(meal);
        let meal = meal.clone();
        let this = self.clone();
        self.spawn("fetch_meal_details", &[], async move {
            this.fetch_details(meal, owner).await
        })
    }

    /// All of the starter's meals, newest first, once every operation in
    /// `after` has finished.
    ///
    /// The meals come without rations or photo.
    ///
    /// # Panics
    ///
    /// If `starter` was never saved.
    pub fn fetch_all_meals(
        &self,
        starter: &Starter,
        after: &[OperationHandle],
    ) -> Operation<Vec<StarterMeal>> {
        let owner = owner_of(starter);
        let this = self.clone();
        self.spawn("fetch_all_meals", after, async move {
            this.query_timeline::<StarterMeal>(&owner).await
        })
    }

    /// # Panics
    ///
    /// If `starter` was never saved.
    pub fn fetch_all_check_ins(
        &self,
        starter: &Starter,
        after: &[OperationHandle],
    ) -> Operation<Vec<StarterCheckIn>> {
        let owner = owner_of(starter);
        let this = self.clone();
        self.spawn("fetch_all_check_ins", after, async move {
            this.query_timeline::<StarterCheckIn>(&owner).await
        })
    }

    /// Meals and check-ins merged newest first. A meal and a check-in on the
    /// same date list the meal first.
    ///
    /// # Panics
    ///
    /// If `starter` was never saved.
    pub fn fetch_timeline(
        &self,
        starter: &Starter,
        after: &[OperationHandle],
    ) -> Operation<Vec<TimelineEntry>> {
        let owner = owner_of(starter);
        let this = self.clone();
        self.spawn("fetch_timeline", after, async move {
            let meals = this.query_timeline::<StarterMeal>(&owner);
            let check_ins = this.query_timeline::<StarterCheckIn>(&owner);
            join2_with(meals, check_ins, |meals, check_ins| -> Result<_, ClientError> {
                let timeline = merge_by_date(meals?, check_ins?);
                tracing::debug!("Timeline has {} entries", timeline.len());
                Ok(timeline)
            })
            .await
        })
    }

    fn spawn<T, F>(&self, label: &'static str, after: &[OperationHandle], work: F) -> Operation<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, ClientError>> + Send + 'static,
    {
        let span = tracing::debug_span!("starter_kit", op = label, container = %self.config.container);
        Operation::spawn(label, after, work.instrument(span))
    }

    /// Awaits one store call, giving up after the configured timeout.
    async fn round_trip<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, ClientError> {
        let timeout = self.config.operation_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result.map_err(ClientError::from),
            Err(_) => {
                tracing::warn!("Store did not answer within {:?}", timeout);
                Err(ClientError::StoreUnavailable(format!(
                    "no answer within {:?}",
                    timeout
                )))
            }
        }
    }

    async fn query(&self, query: Query) -> Result<Vec<GenericRecord>, ClientError> {
        let record_type = query.record_type.clone();
        let records = self
            .round_trip(self.store.query(query).try_collect::<Vec<_>>())
            .await?;
        tracing::debug!("Fetched {} {} record(s)", records.len(), record_type);
        Ok(records)
    }

    async fn save(&self, records: Vec<GenericRecord>) -> Result<Vec<GenericRecord>, ClientError> {
        let count = records.len();
        let saved = self.round_trip(self.store.save(records)).await?;
        tracing::debug!("Saved {} of {} record(s)", saved.len(), count);
        Ok(saved)
    }

    async fn query_starter(&self) -> Result<Starter, ClientError> {
        let records = self.query(Query::all(Starter::RECORD_TYPE)).await?;
        if records.len() > 1 {
            tracing::warn!(
                "Found {} starter records, expected at most one; using the first",
                records.len()
            );
        }
        let record = records.first().ok_or(ClientError::RecordNotFound)?;
        decode_one(record)
    }

    /// Records of type `E` owned by the starter, newest first.
    async fn query_timeline<E: RecordCodec>(
        &self,
        owner: &OwnerRef<Starter>,
    ) -> Result<Vec<E>, ClientError> {
        let query = Query::owned_by::<E, _>(owner)
            .sorted_by(SortKey::descending(TimelineEntry::DATE_FIELD));
        let records = self.query(query).await?;
        Ok(decode_all(&records))
    }

    /// Fetches the meal's children and joins them onto it.
    async fn fetch_details(
        &self,
        meal: StarterMeal,
        owner: OwnerRef<StarterMeal>,
    ) -> Result<StarterMeal, ClientError> {
        let flour = self.query(Query::owned_by::<FlourRation, _>(&owner));
        let water = self.query(Query::owned_by::<WaterRation, _>(&owner).limit(1));
        let image = self.query(Query::owned_by::<Image, _>(&owner).limit(1));

        join3_with(flour, water, image, |flour, water, image| -> Result<_, ClientError> {
            let (flour, water, image) = (flour?, water?, image?);
            assemble_meal(meal, &flour, water.first(), image.first())
        })
        .await
    }

    /// Builds the save batch for the meals: flour rations, meals, water
    /// rations and photos, each child owned by its meal and each meal by the
    /// cached starter. Returns the batch and the meal identities in order.
    fn meal_graph(&self, meals: &[StarterMeal]) -> (Vec<GenericRecord>, Vec<RecordId>) {
        let starter = self.current_starter_ref();

        let mut flours = Vec::new();
        let mut meal_records = Vec::with_capacity(meals.len());
        let mut waters = Vec::with_capacity(meals.len());
        let mut images = Vec::new();

        for meal in meals {
            let Some(water) = &meal.water_ration else {
                panic!("cannot feed a meal from {} without a water ration", meal.date);
            };

            let mut record = meal.encode();
            record.set_owner(&starter);
            let owner: OwnerRef<StarterMeal> = OwnerRef::to_record(&record);

            for flour in meal.flour_rations.iter().flatten() {
                flours.push(owned_record(flour, &owner));
            }
            waters.push(owned_record(water, &owner));
            if let Some(image) = &meal.image {
                images.push(owned_record(image, &owner));
            }
            meal_records.push(record);
        }

        let meal_ids = meal_records.iter().map(|r| r.record_id().clone()).collect();
        let mut batch = flours;
        batch.extend(meal_records);
        batch.extend(waters);
        batch.extend(images);
        (batch, meal_ids)
    }

    fn check_in_graph(&self, check_ins: &[StarterCheckIn]) -> (Vec<GenericRecord>, Vec<RecordId>) {
        let starter = self.current_starter_ref();
        let batch: Vec<GenericRecord> = check_ins
            .iter()
            .map(|check_in| owned_record(check_in, &starter))
            .collect();
        let ids = batch.iter().map(|r| r.record_id().clone()).collect();
        (batch, ids)
    }

    async fn save_meals(
        &self,
        batch: Vec<GenericRecord>,
        meal_ids: Vec<RecordId>,
    ) -> Result<Vec<StarterMeal>, ClientError> {
        let saved = self.save(batch).await?;
        let meals = meal_ids
            .iter()
            .map(|id| {
                let record = find_record(&saved, id)?;
                let meal: StarterMeal = decode_one(record)?;
                let children = |record_type: &str| -> Vec<GenericRecord> {
                    saved
                        .iter()
                        .filter(|r| r.record_type() == record_type && is_owned_by(r, id))
                        .cloned()
                        .collect()
                };
                let flour = children(FlourRation::RECORD_TYPE);
                let water = children(WaterRation::RECORD_TYPE);
                let image = children(Image::RECORD_TYPE);
                assemble_meal(meal, &flour, water.first(), image.first())
            })
            .collect::<Result<Vec<_>, _>>()?;
        tracing::info!("Fed the starter {} meal(s)", meals.len());
        Ok(meals)
    }

    async fn save_check_ins(
        &self,
        batch: Vec<GenericRecord>,
        ids: Vec<RecordId>,
    ) -> Result<Vec<StarterCheckIn>, ClientError> {
        let saved = self.save(batch).await?;
        let check_ins = ids
            .iter()
            .map(|id| find_record(&saved, id).and_then(|r| decode_one::<StarterCheckIn>(r)))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::info!("Checked in on the starter {} time(s)", check_ins.len());
        Ok(check_ins)
    }

    /// Owner reference for new meals and check-ins.
    ///
    /// # Panics
    ///
    /// If no saved starter is cached.
    fn current_starter_ref(&self) -> OwnerRef<Starter> {
        match self.starter().as_ref().and_then(OwnerRef::of) {
            Some(owner) => owner,
            None => panic!("no saved starter; put or initialize one before adding records to it"),
        }
    }

    fn cache_starter(&self, starter: Option<Starter>) {
        let mut cached = self.starter.write().unwrap_or_else(PoisonError::into_inner);
        match &starter {
            Some(s) => tracing::info!("Current starter is now '{}'", s.name),
            None => tracing::info!("Cleared the current starter"),
        }
        *cached = starter;
    }

    fn forget_starter(&self, record_id: &RecordId) {
        let mut cached = self.starter.write().unwrap_or_else(PoisonError::into_inner);
        let is_cached = cached
            .as_ref()
            .and_then(|s| s.record_id())
            .is_some_and(|id| &id == record_id);
        if is_cached {
            tracing::info!("Deleted the current starter");
            *cached = None;
        }
    }
}

/// # Panics
///
/// If `owner` was never saved or its token cannot be restored.
fn owner_of<P: RecordCodec>(owner: &P) -> OwnerRef<P> {
    match OwnerRef::of(owner) {
        Some(owner) => owner,
        None if owner.is_persisted() => panic!(
            "a {} cannot own records: its token cannot be restored",
            P::RECORD_TYPE
        ),
        None => panic!("a {} must be saved before it can own records", P::RECORD_TYPE),
    }
}

fn owned_record<E: RecordCodec, P>(entity: &E, owner: &OwnerRef<P>) -> GenericRecord {
    let mut record = entity.encode();
    record.set_owner(owner);
    record
}

fn is_owned_by(record: &GenericRecord, owner: &RecordId) -> bool {
    record.owner().is_some_and(|r| r.record_id() == owner)
}

fn find_record<'a>(
    records: &'a [GenericRecord],
    record_id: &RecordId,
) -> Result<&'a GenericRecord, ClientError> {
    records
        .iter()
        .find(|r| r.record_id() == record_id)
        .ok_or_else(|| {
            tracing::warn!("Store did not return saved record {}", record_id);
            ClientError::RecordNotFound
        })
}

/// Decodes a record that has to be there. An undecodable one counts as missing.
fn decode_one<E: RecordCodec>(record: &GenericRecord) -> Result<E, ClientError> {
    E::decode(record).map_err(|e| {
        tracing::warn!("Cannot decode {} {}: {}", E::RECORD_TYPE, record.record_id(), e);
        ClientError::RecordNotFound
    })
}

/// Decodes a list, skipping records that do not decode.
fn decode_all<E: RecordCodec>(records: &[GenericRecord]) -> Vec<E> {
    records
        .iter()
        .filter_map(|record| match E::decode(record) {
            Ok(entity) => Some(entity),
            Err(e) => {
                tracing::warn!(
                    "Skipping undecodable {} {}: {}",
                    E::RECORD_TYPE,
                    record.record_id(),
                    e
                );
                None
            }
        })
        .collect()
}

/// Joins a meal with its child records. The water ration is required; a photo
/// that does not decode is dropped.
fn assemble_meal(
    meal: StarterMeal,
    flour: &[GenericRecord],
    water: Option<&GenericRecord>,
    image: Option<&GenericRecord>,
) -> Result<StarterMeal, ClientError> {
    let Some(water) = water else {
        tracing::warn!("Meal from {} has no water ration", meal.date);
        return Err(ClientError::RecordNotFound);
    };
    let water: WaterRation = decode_one(water)?;
    let flour = decode_all::<FlourRation>(flour);
    let image = image.and_then(|record| match Image::decode(record) {
        Ok(image) => Some(image),
        Err(e) => {
            tracing::warn!("Dropping undecodable photo {}: {}", record.record_id(), e);
            None
        }
    });
    Ok(meal.with_details(flour, water, image))
}
