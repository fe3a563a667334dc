//! The indicator result value object and its classification scheme.
//!
//! A result is *undefined* (no class) when no verdict is possible for the
//! input, e.g. an empty region. Undefined is a terminal state, not an
//! error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::figure::FigureSpec;

/// Quality class of a defined result. Maps onto a traffic-light label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Class {
    /// Worst quality.
    One,
    /// Poor quality.
    Two,
    /// Medium quality.
    Three,
    /// Good quality.
    Four,
    /// Best quality.
    Five,
}

impl Class {
    /// The class as its numeric wire form.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
            Self::Five => 5,
        }
    }

    /// Parses the numeric wire form. Valid classes are 1 through 5.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            4 => Some(Self::Four),
            5 => Some(Self::Five),
            _ => None,
        }
    }

    /// The traffic-light label for this class.
    ///
    /// Fixed mapping: 1 → red, 2 and 3 → yellow, 4 and 5 → green.
    #[must_use]
    pub const fn label(self) -> Label {
        match self {
            Self::One => Label::Red,
            Self::Two | Self::Three => Label::Yellow,
            Self::Four | Self::Five => Label::Green,
        }
    }
}

impl Serialize for Class {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Class {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        Self::from_u8(value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid result class: {value}")))
    }
}

/// Traffic-light quality label derived from the result class.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Label {
    /// Good data quality (classes 4 and 5).
    Green,
    /// Medium data quality (classes 2 and 3).
    Yellow,
    /// Poor data quality (class 1).
    Red,
    /// No verdict possible for this input.
    Undefined,
}

/// The outcome of one indicator run for one feature.
///
/// Serialization adds a `label` field derived from the class; on
/// deserialization the field is ignored and re-derived.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorResult {
    /// Free-text description of the verdict.
    pub description: String,
    /// Creation time of this result (UTC).
    pub timestamp: DateTime<Utc>,
    /// Latest timestamp of the OSM data the result is based on.
    #[serde(rename = "timestampOSM", default)]
    pub timestamp_osm: Option<DateTime<Utc>>,
    /// Numeric result value, indicator specific.
    #[serde(default)]
    pub value: Option<f64>,
    /// Result class, 1 through 5. `None` means undefined.
    #[serde(default)]
    pub class: Option<Class>,
    /// Structured plot description, when one was produced.
    #[serde(default)]
    pub figure: Option<FigureSpec>,
}

impl Serialize for IndicatorResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct as _;

        let fields = 3
            + usize::from(self.timestamp_osm.is_some())
            + usize::from(self.value.is_some())
            + usize::from(self.class.is_some())
            + usize::from(self.figure.is_some());
        let mut state = serializer.serialize_struct("IndicatorResult", fields)?;
        state.serialize_field("description", &self.description)?;
        state.serialize_field("timestamp", &self.timestamp)?;
        if let Some(timestamp_osm) = &self.timestamp_osm {
            state.serialize_field("timestampOSM", timestamp_osm)?;
        }
        if let Some(value) = &self.value {
            state.serialize_field("value", value)?;
        }
        if let Some(class) = &self.class {
            state.serialize_field("class", class)?;
        }
        state.serialize_field("label", &self.label())?;
        if let Some(figure) = &self.figure {
            state.serialize_field("figure", figure)?;
        }
        state.end()
    }
}

impl IndicatorResult {
    /// A fresh, undefined result with the given placeholder description.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            timestamp: Utc::now(),
            timestamp_osm: None,
            value: None,
            class: None,
            figure: None,
        }
    }

    /// The label derived from the class; [`Label::Undefined`] when no
    /// class is set.
    #[must_use]
    pub fn label(&self) -> Label {
        self.class.map_or(Label::Undefined, Class::label)
    }

    /// Whether a verdict was reached.
    #[must_use]
    pub const fn is_defined(&self) -> bool {
        self.class.is_some()
    }
}

/// Static metadata describing an indicator variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorMetadata {
    /// Human-readable indicator name.
    pub name: String,
    /// Short description of what the indicator measures.
    pub description: String,
}

/// Where an indicator is applicable.
#[derive(Debug, Clone, PartialEq)]
pub enum Coverage {
    /// Applicable everywhere.
    Global,
    /// Applicable inside the given polygon only.
    Polygon(Box<geojson::Geometry>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_label_mapping_is_fixed() {
        assert_eq!(Class::One.label(), Label::Red);
        assert_eq!(Class::Two.label(), Label::Yellow);
        assert_eq!(Class::Three.label(), Label::Yellow);
        assert_eq!(Class::Four.label(), Label::Green);
        assert_eq!(Class::Five.label(), Label::Green);
    }

    #[test]
    fn class_round_trips_through_u8() {
        for value in 1..=5_u8 {
            assert_eq!(Class::from_u8(value).unwrap().as_u8(), value);
        }
        assert!(Class::from_u8(0).is_none());
        assert!(Class::from_u8(6).is_none());
    }

    #[test]
    fn undefined_result_has_undefined_label() {
        let result = IndicatorResult::new("no verdict yet");
        assert!(!result.is_defined());
        assert_eq!(result.label(), Label::Undefined);
    }

    #[test]
    fn result_serializes_class_as_number() {
        let mut result = IndicatorResult::new("ok");
        result.class = Some(Class::Five);
        result.value = Some(0.97);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["class"], 5);
        assert_eq!(json["label"], "green");
        assert_eq!(json["value"], 0.97);
        assert!(json.get("figure").is_none());
    }

    #[test]
    fn serialized_label_tracks_the_class() {
        let undefined = serde_json::to_value(IndicatorResult::new("n/a")).unwrap();
        assert!(undefined.get("class").is_none());
        assert_eq!(undefined["label"], "undefined");

        let mut result = IndicatorResult::new("poor");
        result.class = Some(Class::One);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["label"], "red");

        // Round trip re-derives the label instead of storing it.
        let parsed: IndicatorResult = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.label(), Label::Red);
    }

    #[test]
    fn class_deserialization_rejects_out_of_range() {
        assert!(serde_json::from_value::<Class>(serde_json::json!(3)).is_ok());
        assert!(serde_json::from_value::<Class>(serde_json::json!(7)).is_err());
    }
}
