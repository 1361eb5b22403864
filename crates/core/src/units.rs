//! Distance units accepted by proximity queries

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit of a radius or a reported distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistanceUnit {
    /// Meters (`m`)
    #[serde(rename = "m")]
    Meters,
    /// Kilometers (`km`)
    #[serde(rename = "km")]
    Kilometers,
    /// Statute miles (`mi`)
    #[serde(rename = "mi")]
    Miles,
    /// Feet (`ft`)
    #[serde(rename = "ft")]
    Feet,
}

impl DistanceUnit {
    /// Meters in one unit
    pub fn meters_per_unit(self) -> f64 {
        match self {
            DistanceUnit::Meters => 1.0,
            DistanceUnit::Kilometers => 1000.0,
            DistanceUnit::Miles => 1609.34,
            DistanceUnit::Feet => 0.3048,
        }
    }

    /// Convert a value in this unit to meters
    pub fn to_meters(self, value: f64) -> f64 {
        value * self.meters_per_unit()
    }

    /// Convert meters to this unit
    pub fn from_meters(self, meters: f64) -> f64 {
        meters / self.meters_per_unit()
    }

    /// Short symbol
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceUnit::Meters => "m",
            DistanceUnit::Kilometers => "km",
            DistanceUnit::Miles => "mi",
            DistanceUnit::Feet => "ft",
        }
    }
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "m" => Ok(DistanceUnit::Meters),
            "km" => Ok(DistanceUnit::Kilometers),
            "mi" => Ok(DistanceUnit::Miles),
            "ft" => Ok(DistanceUnit::Feet),
            other => Err(Error::invalid_input(format!(
                "unknown distance unit '{other}', expected one of m, km, mi, ft"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!("km".parse::<DistanceUnit>().unwrap(), DistanceUnit::Kilometers);
        assert_eq!("MI".parse::<DistanceUnit>().unwrap(), DistanceUnit::Miles);
        assert_eq!("m".parse::<DistanceUnit>().unwrap(), DistanceUnit::Meters);
        assert_eq!("ft".parse::<DistanceUnit>().unwrap(), DistanceUnit::Feet);
        assert!("parsecs".parse::<DistanceUnit>().is_err());
    }

    #[test]
    fn test_conversions_round_trip() {
        for unit in [
            DistanceUnit::Meters,
            DistanceUnit::Kilometers,
            DistanceUnit::Miles,
            DistanceUnit::Feet,
        ] {
            let meters = unit.to_meters(12.5);
            assert!((unit.from_meters(meters) - 12.5).abs() < 1e-9);
        }
        assert_eq!(DistanceUnit::Kilometers.to_meters(5.0), 5000.0);
    }

    #[test]
    fn test_serde_uses_symbols() {
        let json = serde_json::to_string(&DistanceUnit::Kilometers).unwrap();
        assert_eq!(json, "\"km\"");
        let unit: DistanceUnit = serde_json::from_str("\"mi\"").unwrap();
        assert_eq!(unit, DistanceUnit::Miles);
    }
}
