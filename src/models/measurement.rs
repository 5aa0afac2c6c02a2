use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MassUnit {
    Grams,
    Kilograms,
    Ounces,
    Pounds,
}

impl MassUnit {
    fn grams_per_unit(self) -> f64 {
        match self {
            MassUnit::Grams => 1.0,
            MassUnit::Kilograms => 1000.0,
            MassUnit::Ounces => 28.349523125,
            MassUnit::Pounds => 453.59237,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            MassUnit::Grams => "g",
            MassUnit::Kilograms => "kg",
            MassUnit::Ounces => "oz",
            MassUnit::Pounds => "lb",
        }
    }
}

/// A mass in any unit. Records always carry grams.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Mass {
    pub value: f64,
    pub unit: MassUnit,
}

impl Mass {
    pub fn new(value: f64, unit: MassUnit) -> Self {
        Self { value, unit }
    }

    pub fn grams(value: f64) -> Self {
        Self::new(value, MassUnit::Grams)
    }

    pub fn in_grams(&self) -> f64 {
        self.value * self.unit.grams_per_unit()
    }

    pub fn converted(&self, unit: MassUnit) -> Self {
        Self::new(self.in_grams() / unit.grams_per_unit(), unit)
    }
}

/// Masses compare by their value in grams.
impl PartialEq for Mass {
    fn eq(&self, other: &Self) -> bool {
        self.in_grams() == other.in_grams()
    }
}

impl fmt::Display for Mass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
    Kelvin,
}

/// A temperature in any scale. Records always carry degrees Fahrenheit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Temperature {
    pub value: f64,
    pub unit: TemperatureUnit,
}

impl Temperature {
    pub fn new(value: f64, unit: TemperatureUnit) -> Self {
        Self { value, unit }
    }

    pub fn fahrenheit(value: f64) -> Self {
        Self::new(value, TemperatureUnit::Fahrenheit)
    }

    pub fn celsius(value: f64) -> Self {
        Self::new(value, TemperatureUnit::Celsius)
    }

    pub fn chilly() -> Self {
        Self::fahrenheit(55.0)
    }

    pub fn room() -> Self {
        Self::fahrenheit(72.0)
    }

    pub fn warm() -> Self {
        Self::fahrenheit(80.0)
    }

    pub fn in_fahrenheit(&self) -> f64 {
        match self.unit {
            TemperatureUnit::Fahrenheit => self.value,
            TemperatureUnit::Celsius => self.value * 9.0 / 5.0 + 32.0,
            TemperatureUnit::Kelvin => (self.value - 273.15) * 9.0 / 5.0 + 32.0,
        }
    }

    pub fn converted(&self, unit: TemperatureUnit) -> Self {
        let f = self.in_fahrenheit();
        let value = match unit {
            TemperatureUnit::Fahrenheit => f,
            TemperatureUnit::Celsius => (f - 32.0) * 5.0 / 9.0,
            TemperatureUnit::Kelvin => (f - 32.0) * 5.0 / 9.0 + 273.15,
        };
        Self::new(value, unit)
    }
}

impl PartialEq for Temperature {
    fn eq(&self, other: &Self) -> bool {
        self.in_fahrenheit() == other.in_fahrenheit()
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self.unit {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
            TemperatureUnit::Kelvin => "K",
        };
        write!(f, "{}{}", self.value, symbol)
    }
}
