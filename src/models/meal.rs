use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::flour_ration::FlourRation;
use super::image::Image;
use super::water_ration::WaterRation;
use crate::record::{
    base_record, decode_header, required_timestamp, ConcurrencyToken, DecodeError, GenericRecord,
    RecordCodec,
};

mod keys {
    pub const DATE: &str = crate::models::TimelineEntry::DATE_FIELD;
}

/// One feeding of the starter.
///
/// The meal record itself only carries the date; rations and the photo are
/// separate records owned by it. A meal decoded straight from a query has
/// `flour_rations` and `water_ration` unset until its details are fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarterMeal {
    pub date: DateTime<Utc>,
    pub flour_rations: Option<Vec<FlourRation>>,
    pub water_ration: Option<WaterRation>,
    pub image: Option<Image>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<ConcurrencyToken>,
}

impl StarterMeal {
    pub fn new(date: DateTime<Utc>, flour_rations: Vec<FlourRation>, water: WaterRation) -> Self {
        Self {
            date,
            flour_rations: Some(flour_rations),
            water_ration: Some(water),
            image: None,
            token: None,
        }
    }

    pub fn with_image(mut self, image: Image) -> Self {
        self.image = Some(image);
        self
    }

    /// Replaces the children, keeping date and token.
    pub fn with_details(
        self,
        flour_rations: Vec<FlourRation>,
        water: WaterRation,
        image: Option<Image>,
    ) -> Self {
        Self {
            flour_rations: Some(flour_rations),
            water_ration: Some(water),
            image,
            ..self
        }
    }

    /// Whether the children are loaded. A meal is only complete with water.
    pub fn is_complete(&self) -> bool {
        self.water_ration.is_some()
    }
}

impl RecordCodec for StarterMeal {
    const RECORD_TYPE: &'static str = "StarterMeals";

    fn token(&self) -> Option<&ConcurrencyToken> {
        self.token.as_ref()
    }

    fn encode(&self) -> GenericRecord {
        let mut record = base_record(Self::RECORD_TYPE, self.token.as_ref());
        record.set(keys::DATE, self.date);
        record
    }

    fn decode(record: &GenericRecord) -> Result<Self, DecodeError> {
        let token = decode_header(record, Self::RECORD_TYPE)?;
        Ok(Self {
            date: required_timestamp(record, keys::DATE)?,
            flour_rations: None,
            water_ration: None,
            image: None,
            token: Some(token),
        })
    }
}

impl fmt::Display for StarterMeal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Meal: {}", self.date.format("%Y-%m-%d %H:%M"))?;
        if let Some(flour) = &self.flour_rations {
            for ration in flour {
                writeln!(f, "  - {}", ration)?;
            }
        }
        if let Some(water) = &self.water_ration {
            writeln!(f, "  - {}", water)?;
        }
        if self.image.is_some() {
            writeln!(f, "  (photo)")?;
        }
        Ok(())
    }
}
