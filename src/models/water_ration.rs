use serde::{Deserialize, Serialize};
use std::fmt;

use super::measurement::{Mass, Temperature};
use crate::record::{
    base_record, decode_header, optional_double, required_double, ConcurrencyToken, DecodeError,
    GenericRecord, RecordCodec,
};

mod keys {
    pub const WEIGHT_IN_GRAMS: &str = "weightInGrams";
    pub const TEMPERATURE_IN_FAHRENHEIT: &str = "temperatureInFahrenheit";
}

/// The water added at a meal. Every meal has exactly one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterRation {
    pub amount: Mass,
    pub temperature: Option<Temperature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<ConcurrencyToken>,
}

impl WaterRation {
    pub fn new(amount: Mass, temperature: Option<Temperature>) -> Self {
        Self {
            amount,
            temperature,
            token: None,
        }
    }
}

/// Compares amount and temperature only; persisted and unsaved rations of
/// the same water are equal.
impl PartialEq for WaterRation {
    fn eq(&self, other: &Self) -> bool {
        self.amount == other.amount && self.temperature == other.temperature
    }
}

impl RecordCodec for WaterRation {
    const RECORD_TYPE: &'static str = "WaterRations";

    fn token(&self) -> Option<&ConcurrencyToken> {
        self.token.as_ref()
    }

    fn encode(&self) -> GenericRecord {
        let mut record = base_record(Self::RECORD_TYPE, self.token.as_ref());
        record.set(keys::WEIGHT_IN_GRAMS, self.amount.in_grams());
        record.set_optional(
            keys::TEMPERATURE_IN_FAHRENHEIT,
            self.temperature.map(|t| t.in_fahrenheit()),
        );
        record
    }

    fn decode(record: &GenericRecord) -> Result<Self, DecodeError> {
        let token = decode_header(record, Self::RECORD_TYPE)?;
        Ok(Self {
            amount: Mass::grams(required_double(record, keys::WEIGHT_IN_GRAMS)?),
            temperature: optional_double(record, keys::TEMPERATURE_IN_FAHRENHEIT)
                .map(Temperature::fahrenheit),
            token: Some(token),
        })
    }
}

impl fmt::Display for WaterRation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} water", self.amount)?;
        if let Some(temperature) = &self.temperature {
            write!(f, " at {}", temperature)?;
        }
        Ok(())
    }
}
