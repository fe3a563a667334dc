//! Topics: named filters over OSM features plus an aggregation kind.
//!
//! A topic is either a [`TopicPreset`] (key selecting a server-side filter
//! expression and aggregation kind) or a [`TopicData`] carrying a
//! pre-fetched time series. Presets for common measures are compiled in;
//! see [`topic_presets`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the aggregation service bins a measure.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AggregationKind {
    /// Number of features.
    Count,
    /// Summed length in meters.
    Length,
    /// Summed area in square meters.
    Area,
    /// Summed perimeter in meters.
    Perimeter,
}

/// One (timestamp, value) pair of a binned time series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    /// Bin timestamp (UTC).
    pub timestamp: DateTime<Utc>,
    /// Aggregated value for the bin (non-negative).
    pub value: f64,
}

/// Pre-fetched series attached to an inline topic.
///
/// Mirrors the aggregation service's response shape so callers can pass
/// a captured response through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesData {
    /// Ordered (timestamp, value) pairs, timestamps strictly increasing.
    pub result: Vec<DataPoint>,
}

/// A preset topic: server-side filter expression plus aggregation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicPreset {
    /// Unique key (e.g. `building-count`).
    pub key: String,
    /// Human-readable name.
    pub name: String,
    /// Short description of the measure.
    pub description: String,
    /// Endpoint group on the aggregation service.
    pub endpoint: String,
    /// Filter DSL expression passed verbatim to the service.
    pub filter: String,
    /// Aggregation kind requested from the service.
    pub aggregation: AggregationKind,
}

/// An inline topic carrying its own time series.
///
/// No network call is made for inline topics; the attached data is used
/// verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicData {
    /// Unique key.
    pub key: String,
    /// Human-readable name.
    pub name: String,
    /// Short description of the measure.
    pub description: String,
    /// The pre-fetched series.
    pub data: SeriesData,
}

/// Either a preset topic or an inline topic with attached data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Topic {
    /// Preset resolved against the aggregation service.
    Preset(TopicPreset),
    /// Inline topic with pre-fetched data.
    Data(TopicData),
}

impl Topic {
    /// The topic key.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Preset(preset) => &preset.key,
            Self::Data(data) => &data.key,
        }
    }

    /// The human-readable topic name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Preset(preset) => &preset.name,
            Self::Data(data) => &data.name,
        }
    }

    /// The aggregation kind, if known.
    ///
    /// Inline topics carry raw values without an aggregation kind.
    #[must_use]
    pub const fn aggregation(&self) -> Option<AggregationKind> {
        match self {
            Self::Preset(preset) => Some(preset.aggregation),
            Self::Data(_) => None,
        }
    }
}

/// Returns the compiled-in topic presets.
///
/// Filter expressions follow the aggregation service's filter DSL.
#[must_use]
pub fn topic_presets() -> Vec<TopicPreset> {
    vec![
        TopicPreset {
            key: "building-count".to_string(),
            name: "Building Count".to_string(),
            description: "Number of buildings mapped in OSM.".to_string(),
            endpoint: "elements".to_string(),
            filter: "building=* and building!=no and geometry:polygon".to_string(),
            aggregation: AggregationKind::Count,
        },
        TopicPreset {
            key: "major-roads-length".to_string(),
            name: "Major Roads Length".to_string(),
            description: "Length of the major road network mapped in OSM.".to_string(),
            endpoint: "elements".to_string(),
            filter: "highway in (motorway, trunk, primary, secondary, tertiary) \
                     and geometry:line"
                .to_string(),
            aggregation: AggregationKind::Length,
        },
        TopicPreset {
            key: "amenities".to_string(),
            name: "Amenities".to_string(),
            description: "Number of amenities mapped in OSM.".to_string(),
            endpoint: "elements".to_string(),
            filter: "amenity=* and (geometry:point or geometry:polygon)".to_string(),
            aggregation: AggregationKind::Count,
        },
    ]
}

/// Looks up a compiled-in topic preset by key.
#[must_use]
pub fn get_topic_preset(key: &str) -> Option<TopicPreset> {
    topic_presets().into_iter().find(|preset| preset.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_lookup_by_key() {
        let preset = get_topic_preset("building-count").unwrap();
        assert_eq!(preset.aggregation, AggregationKind::Count);
        assert!(preset.filter.contains("building=*"));
        assert!(get_topic_preset("no-such-topic").is_none());
    }

    #[test]
    fn aggregation_kind_string_forms() {
        assert_eq!(AggregationKind::Length.to_string(), "length");
        assert_eq!(
            "perimeter".parse::<AggregationKind>().unwrap(),
            AggregationKind::Perimeter
        );
    }

    #[test]
    fn topic_deserializes_preset_or_data() {
        let preset: Topic = serde_json::from_value(serde_json::json!({
            "key": "building-count",
            "name": "Building Count",
            "description": "Number of buildings.",
            "endpoint": "elements",
            "filter": "building=* and geometry:polygon",
            "aggregation": "count"
        }))
        .unwrap();
        assert!(matches!(preset, Topic::Preset(_)));

        let inline: Topic = serde_json::from_value(serde_json::json!({
            "key": "custom",
            "name": "Custom",
            "description": "Pre-fetched series.",
            "data": {
                "result": [
                    { "timestamp": "2008-01-01T00:00:00Z", "value": 1.0 },
                    { "timestamp": "2008-02-01T00:00:00Z", "value": 2.0 }
                ]
            }
        }))
        .unwrap();
        match inline {
            Topic::Data(data) => assert_eq!(data.data.result.len(), 2),
            Topic::Preset(_) => panic!("expected inline topic"),
        }
    }

    #[test]
    fn inline_topic_has_no_aggregation_kind() {
        let topic = Topic::Data(TopicData {
            key: "custom".to_string(),
            name: "Custom".to_string(),
            description: String::new(),
            data: SeriesData { result: vec![] },
        });
        assert!(topic.aggregation().is_none());
        assert_eq!(topic.key(), "custom");
    }
}
