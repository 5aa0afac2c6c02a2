use serde::{Deserialize, Serialize};
use std::fmt;

use super::measurement::Mass;
use crate::record::{
    base_record, decode_header, required_double, required_string, ConcurrencyToken, DecodeError,
    GenericRecord, RecordCodec,
};

mod keys {
    pub const FLOUR_NAME: &str = "flourName";
    pub const WEIGHT_IN_GRAMS: &str = "weightInGrams";
}

/// One flour added at a meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlourRation {
    pub flour_name: String,
    pub amount: Mass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<ConcurrencyToken>,
}

impl FlourRation {
    pub fn new(flour_name: impl Into<String>, amount: Mass) -> Self {
        Self {
            flour_name: flour_name.into(),
            amount,
            token: None,
        }
    }
}

impl RecordCodec for FlourRation {
    const RECORD_TYPE: &'static str = "FlourRations";

    fn token(&self) -> Option<&ConcurrencyToken> {
        self.token.as_ref()
    }

    fn encode(&self) -> GenericRecord {
        let mut record = base_record(Self::RECORD_TYPE, self.token.as_ref());
        record.set(keys::FLOUR_NAME, self.flour_name.as_str());
        record.set(keys::WEIGHT_IN_GRAMS, self.amount.in_grams());
        record
    }

    fn decode(record: &GenericRecord) -> Result<Self, DecodeError> {
        let token = decode_header(record, Self::RECORD_TYPE)?;
        Ok(Self {
            flour_name: required_string(record, keys::FLOUR_NAME)?,
            amount: Mass::grams(required_double(record, keys::WEIGHT_IN_GRAMS)?),
            token: Some(token),
        })
    }
}

impl fmt::Display for FlourRation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.flour_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MassUnit;
    use crate::record::FieldValue;

    #[test]
    fn test_encodes_grams() {
        let ration = FlourRation::new("Rye", Mass::new(0.05, MassUnit::Kilograms));
        let record = ration.encode();
        let grams = record
            .get("weightInGrams")
            .and_then(FieldValue::as_double)
            .unwrap();
        assert!((grams - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_yields_grams() {
        let ration = FlourRation::new("Rye", Mass::new(2.0, MassUnit::Ounces));
        let decoded = FlourRation::decode(&ration.encode()).unwrap();

        assert_eq!(decoded.amount.unit, MassUnit::Grams);
        assert!((decoded.amount.in_grams() - ration.amount.in_grams()).abs() < 1e-9);
        assert_eq!(decoded.flour_name, "Rye");
    }

    #[test]
    fn test_decode_requires_name() {
        let mut record = GenericRecord::new("FlourRations");
        record.set("weightInGrams", 50.0);
        assert!(matches!(
            FlourRation::decode(&record),
            Err(DecodeError::MissingField("flourName"))
        ));
    }

    #[test]
    fn test_display() {
        let ration = FlourRation::new("Whole Wheat", Mass::grams(50.0));
        assert_eq!(ration.to_string(), "50 g Whole Wheat");
    }
}
