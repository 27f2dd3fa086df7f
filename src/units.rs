//! Free-text length parsing.
//!
//! Lengths are normalized to feet, the host's internal unit. A value with no
//! unit, or with a unit we do not recognize, is read in the configured
//! default unit (millimeters unless overridden), never "as-is".

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::OnceLock;

const MM_PER_FOOT: f64 = 304.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LengthUnit {
    #[default]
    Millimeter,
    Centimeter,
    Meter,
    Inch,
    Foot,
}

impl LengthUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Millimeter => "mm",
            Self::Centimeter => "cm",
            Self::Meter => "m",
            Self::Inch => "in",
            Self::Foot => "ft",
        }
    }

    pub fn feet_per_unit(self) -> f64 {
        match self {
            Self::Millimeter => 1.0 / MM_PER_FOOT,
            Self::Centimeter => 10.0 / MM_PER_FOOT,
            Self::Meter => 1000.0 / MM_PER_FOOT,
            Self::Inch => 1.0 / 12.0,
            Self::Foot => 1.0,
        }
    }

    /// Matches a unit token as written by a person or a model: short forms,
    /// words (singular and plural, US and UK spelling), Cyrillic
    /// abbreviations, and the `"`/`'` marks.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "mm" | "millimeter" | "millimeters" | "millimetre" | "millimetres" | "мм" => {
                Some(Self::Millimeter)
            }
            "cm" | "centimeter" | "centimeters" | "centimetre" | "centimetres" | "см" => {
                Some(Self::Centimeter)
            }
            "m" | "meter" | "meters" | "metre" | "metres" | "м" => Some(Self::Meter),
            "in" | "inch" | "inches" | "\"" | "дюйм" => Some(Self::Inch),
            "ft" | "foot" | "feet" | "'" | "фут" => Some(Self::Foot),
            _ => None,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        Self::from_token(raw).ok_or_else(|| "unit must be one of: mm, cm, m, in, ft".to_string())
    }
}

impl std::fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LengthUnit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LengthUnit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        crate::shared::serde_ext::parse_via_string(deserializer, "length unit", Self::parse)
    }
}

/// A length in internal units (feet).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Length {
    feet: f64,
}

impl Length {
    pub fn from_feet(feet: f64) -> Self {
        Self { feet }
    }

    pub fn from_unit(value: f64, unit: LengthUnit) -> Self {
        Self {
            feet: value * unit.feet_per_unit(),
        }
    }

    pub fn feet(self) -> f64 {
        self.feet
    }

    pub fn in_unit(self, unit: LengthUnit) -> f64 {
        self.feet / unit.feet_per_unit()
    }

    pub fn millimeters(self) -> f64 {
        self.in_unit(LengthUnit::Millimeter)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnitSource {
    Explicit(LengthUnit),
    Defaulted(LengthUnit),
    Unrecognized { token: String, used: LengthUnit },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLength {
    pub length: Length,
    pub source: UnitSource,
}

impl ParsedLength {
    pub fn unit(&self) -> LengthUnit {
        match &self.source {
            UnitSource::Explicit(unit) | UnitSource::Defaulted(unit) => *unit,
            UnitSource::Unrecognized { used, .. } => *used,
        }
    }
}

fn length_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r#"(?P<num>[-+]?(?:\d+(?:[.,]\d+)?|[.,]\d+))\s*(?P<unit>[^\s\d]*)"#).ok()
        })
        .as_ref()
}

/// Extracts the first signed decimal number in `input` and the unit token
/// that follows it. Returns `None` when the text holds no number.
pub fn parse_length(input: &str, default_unit: LengthUnit) -> Option<ParsedLength> {
    let captures = length_pattern()?.captures(input)?;
    let number = captures.name("num")?.as_str().replace(',', ".");
    let value = number.parse::<f64>().ok()?;
    let token = captures
        .name("unit")
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ')']))
        .unwrap_or_default();

    let source = if token.is_empty() {
        UnitSource::Defaulted(default_unit)
    } else {
        match LengthUnit::from_token(token) {
            Some(unit) => UnitSource::Explicit(unit),
            None => UnitSource::Unrecognized {
                token: token.to_string(),
                used: default_unit,
            },
        }
    };
    let mut parsed = ParsedLength {
        length: Length::default(),
        source,
    };
    parsed.length = Length::from_unit(value, parsed.unit());
    Some(parsed)
}

/// Convenience form of [`parse_length`] with the millimeter default.
pub fn parse_unit(input: &str) -> Option<Length> {
    parse_length(input, LengthUnit::Millimeter).map(|parsed| parsed.length)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn millimeters_round_trip() {
        let length = parse_unit("500mm").expect("parse");
        assert!(close(length.millimeters(), 500.0));
    }

    #[test]
    fn feet_and_inches_agree() {
        let feet = parse_unit("2ft").expect("feet");
        let inches = parse_unit("24in").expect("inches");
        assert!(close(feet.feet(), inches.feet()));
        assert!(close(feet.feet(), 2.0));
    }

    #[test]
    fn meters_are_not_mistaken_for_millimeters() {
        let length = parse_unit("3 m").expect("meters");
        assert!(close(length.millimeters(), 3000.0));
        let length = parse_unit("3 meters").expect("meters word");
        assert!(close(length.millimeters(), 3000.0));
    }

    #[test]
    fn localized_and_punctuated_units() {
        assert!(close(parse_unit("250 мм").expect("cyrillic").millimeters(), 250.0));
        assert!(close(parse_unit("1,5м").expect("comma").millimeters(), 1500.0));
        assert!(close(parse_unit("6\"").expect("inch mark").feet(), 0.5));
        assert!(close(parse_unit("move 10cm.").expect("sentence").millimeters(), 100.0));
    }

    #[test]
    fn absent_unit_uses_default() {
        let parsed = parse_length("-120", LengthUnit::Millimeter).expect("parse");
        assert_eq!(parsed.source, UnitSource::Defaulted(LengthUnit::Millimeter));
        assert!(close(parsed.length.millimeters(), -120.0));

        let parsed = parse_length("4", LengthUnit::Foot).expect("parse");
        assert!(close(parsed.length.feet(), 4.0));
    }

    #[test]
    fn unrecognized_unit_falls_back_and_is_flagged() {
        let parsed = parse_length("12 cubits", LengthUnit::Millimeter).expect("parse");
        assert_eq!(
            parsed.source,
            UnitSource::Unrecognized {
                token: "cubits".to_string(),
                used: LengthUnit::Millimeter
            }
        );
        assert!(close(parsed.length.millimeters(), 12.0));
    }

    #[test]
    fn text_without_number_is_rejected() {
        assert!(parse_unit("about a meter").is_none());
        assert!(parse_unit("").is_none());
    }
}
