#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Data-quality indicators for OSM.
//!
//! Every indicator follows the same three-phase lifecycle:
//!
//! 1. `preprocess` fetches raw inputs from the aggregation service
//!    (suspends on I/O),
//! 2. `calculate` is pure CPU: it sets class, value, and description,
//! 3. `create_figure` attaches a structured plot description.
//!
//! Recoverable numerical conditions (no data, deleted data, no valid
//! model fit) downgrade the result to *undefined* rather than raising;
//! errors are reserved for broken inputs and failing collaborators.
//! After `calculate` an indicator is immutable from the caller's
//! perspective.

pub mod currentness;
pub mod mapping_saturation;

use async_trait::async_trait;
use geojson::Feature;
use osm_quality_client::{AggregationApi, AggregationServiceError};
use osm_quality_models::{
    AggregationKind, Coverage, IndicatorMetadata, IndicatorResult, Topic,
};
use thiserror::Error;

pub use currentness::Currentness;
pub use mapping_saturation::MappingSaturation;

/// Default data attribution for all indicators.
pub const OSM_ATTRIBUTION: &str = "© OpenStreetMap contributors";

/// Errors raised by indicator preprocessing.
#[derive(Debug, Error)]
pub enum IndicatorError {
    /// The aggregation service failed or answered with garbage.
    #[error(transparent)]
    Aggregation(#[from] AggregationServiceError),

    /// The indicator does not support the given topic.
    #[error("indicator '{indicator}' does not support topic '{topic}': {reason}")]
    UnsupportedTopic {
        /// Indicator key.
        indicator: String,
        /// Topic key.
        topic: String,
        /// Why the combination is invalid.
        reason: String,
    },

    /// The input is unusable for this indicator.
    #[error("invalid indicator input: {message}")]
    Input {
        /// Description of the problem.
        message: String,
    },
}

/// Keys of the available indicators.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum IndicatorKey {
    /// Growth-curve analysis of a monthly time series.
    MappingSaturation,
    /// Age distribution of latest contributions.
    Currentness,
}

/// The lifecycle and descriptors every indicator variant exposes.
#[async_trait]
pub trait Indicator: Send {
    /// Static name and description of the indicator.
    fn metadata(&self) -> IndicatorMetadata;

    /// The topic this instance analyses.
    fn topic(&self) -> &Topic;

    /// The current result. Owned exclusively by the indicator until
    /// emission.
    fn result(&self) -> &IndicatorResult;

    /// Data attribution string.
    fn attribution(&self) -> &'static str {
        OSM_ATTRIBUTION
    }

    /// Aggregation kinds this indicator can interpret.
    fn supported_aggregations(&self) -> &'static [AggregationKind];

    /// Where the indicator is applicable.
    fn coverage(&self) -> Coverage {
        Coverage::Global
    }

    /// Fetches and stores raw inputs.
    ///
    /// # Errors
    ///
    /// Returns [`IndicatorError`] when the aggregation service fails or
    /// the input cannot be used.
    async fn preprocess(&mut self, api: &dyn AggregationApi) -> Result<(), IndicatorError>;

    /// Computes class, value, and description. Pure CPU; may leave the
    /// result undefined when preconditions are unmet.
    fn calculate(&mut self);

    /// Attaches a figure to the result, or leaves it unset when the
    /// result is undefined.
    fn create_figure(&mut self);

    /// Raw series and model data for `include_data` output.
    fn data(&self) -> serde_json::Value;
}

/// Checks that `key` can analyse `topic`.
///
/// # Errors
///
/// Returns [`IndicatorError::UnsupportedTopic`] when the indicator does
/// not declare support for the topic's aggregation kind, or when an
/// indicator that needs live contribution data is given an inline
/// topic.
pub fn validate_indicator_topic(key: IndicatorKey, topic: &Topic) -> Result<(), IndicatorError> {
    let supported: &[AggregationKind] = match key {
        IndicatorKey::MappingSaturation => MappingSaturation::SUPPORTED_AGGREGATIONS,
        IndicatorKey::Currentness => Currentness::SUPPORTED_AGGREGATIONS,
    };
    match topic.aggregation() {
        Some(kind) if !supported.contains(&kind) => Err(IndicatorError::UnsupportedTopic {
            indicator: key.to_string(),
            topic: topic.key().to_string(),
            reason: format!("aggregation kind '{kind}' is not supported"),
        }),
        None if key == IndicatorKey::Currentness => Err(IndicatorError::UnsupportedTopic {
            indicator: key.to_string(),
            topic: topic.key().to_string(),
            reason: "inline topic data carries no contribution history".to_string(),
        }),
        _ => Ok(()),
    }
}

/// Creates an indicator instance for `key` over `(topic, feature)`.
///
/// # Errors
///
/// Returns [`IndicatorError::UnsupportedTopic`] for invalid
/// indicator/topic combinations.
pub fn create_indicator(
    key: IndicatorKey,
    topic: Topic,
    feature: Feature,
) -> Result<Box<dyn Indicator>, IndicatorError> {
    validate_indicator_topic(key, &topic)?;
    Ok(match key {
        IndicatorKey::MappingSaturation => Box::new(MappingSaturation::new(topic, feature)),
        IndicatorKey::Currentness => Box::new(Currentness::new(topic, feature)),
    })
}

#[cfg(test)]
pub(crate) mod test_util {
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone as _, Utc};
    use osm_quality_client::{
        AggregationApi, AggregationServiceError, QueryOptions, ResultEntry,
    };
    use osm_quality_models::Topic;

    /// Stub aggregation API answering from canned entries.
    pub struct StubApi {
        pub entries: Vec<ResultEntry>,
        pub latest: DateTime<Utc>,
    }

    impl StubApi {
        /// Monthly snapshot series starting 2008-01 with the given values.
        pub fn monthly(values: &[f64]) -> Self {
            let entries = values
                .iter()
                .enumerate()
                .map(|(i, &value)| {
                    let month = i32::try_from(i).unwrap();
                    ResultEntry::Snapshot {
                        timestamp: month_timestamp(month),
                        value,
                    }
                })
                .collect();
            Self {
                entries,
                latest: month_timestamp(i32::try_from(values.len()).unwrap() - 1),
            }
        }

        /// Monthly contribution intervals, chronological, starting 2008-01.
        pub fn contributions(values: &[f64]) -> Self {
            let entries = values
                .iter()
                .enumerate()
                .map(|(i, &value)| {
                    let month = i32::try_from(i).unwrap();
                    ResultEntry::Interval {
                        from_timestamp: month_timestamp(month),
                        to_timestamp: month_timestamp(month + 1),
                        value,
                    }
                })
                .collect();
            Self {
                entries,
                latest: month_timestamp(i32::try_from(values.len()).unwrap()),
            }
        }
    }

    /// The first day of the month `offset` months after 2008-01.
    pub fn month_timestamp(offset: i32) -> DateTime<Utc> {
        let year = 2008 + offset.div_euclid(12);
        let month = u32::try_from(offset.rem_euclid(12)).unwrap() + 1;
        Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap()
    }

    #[async_trait]
    impl AggregationApi for StubApi {
        async fn query(
            &self,
            _topic: &Topic,
            _feature: &geojson::Feature,
            _options: QueryOptions,
        ) -> Result<Vec<ResultEntry>, AggregationServiceError> {
            Ok(self.entries.clone())
        }

        async fn latest_timestamp(&self) -> Result<DateTime<Utc>, AggregationServiceError> {
            Ok(self.latest)
        }
    }

    /// A unit-square polygon feature.
    pub fn square_feature() -> geojson::Feature {
        let geometry = geojson::Geometry::new(geojson::Value::Polygon(vec![vec![
            vec![0.0, 0.0],
            vec![0.01, 0.0],
            vec![0.01, 0.01],
            vec![0.0, 0.01],
            vec![0.0, 0.0],
        ]]));
        geojson::Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: None,
            foreign_members: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osm_quality_models::{get_topic_preset, SeriesData, TopicData};

    fn preset_topic(key: &str) -> Topic {
        Topic::Preset(get_topic_preset(key).unwrap())
    }

    fn inline_topic() -> Topic {
        Topic::Data(TopicData {
            key: "custom".to_string(),
            name: "Custom".to_string(),
            description: String::new(),
            data: SeriesData { result: vec![] },
        })
    }

    #[test]
    fn indicator_keys_parse_from_kebab_case() {
        assert_eq!(
            "mapping-saturation".parse::<IndicatorKey>().unwrap(),
            IndicatorKey::MappingSaturation
        );
        assert_eq!(
            "currentness".parse::<IndicatorKey>().unwrap(),
            IndicatorKey::Currentness
        );
        assert!("not-an-indicator".parse::<IndicatorKey>().is_err());
        assert_eq!(IndicatorKey::MappingSaturation.to_string(), "mapping-saturation");
    }

    #[test]
    fn saturation_accepts_all_preset_kinds_and_inline_topics() {
        for key in ["building-count", "major-roads-length", "amenities"] {
            assert!(
                validate_indicator_topic(IndicatorKey::MappingSaturation, &preset_topic(key))
                    .is_ok()
            );
        }
        assert!(
            validate_indicator_topic(IndicatorKey::MappingSaturation, &inline_topic()).is_ok()
        );
    }

    #[test]
    fn currentness_rejects_inline_topics() {
        let err = validate_indicator_topic(IndicatorKey::Currentness, &inline_topic()).unwrap_err();
        assert!(matches!(err, IndicatorError::UnsupportedTopic { .. }));
    }

    #[test]
    fn factory_resolves_both_indicators() {
        let feature = test_util::square_feature();
        let saturation = create_indicator(
            IndicatorKey::MappingSaturation,
            preset_topic("building-count"),
            feature.clone(),
        )
        .unwrap();
        assert_eq!(saturation.metadata().name, "Mapping Saturation");
        assert_eq!(saturation.attribution(), OSM_ATTRIBUTION);

        let currentness = create_indicator(
            IndicatorKey::Currentness,
            preset_topic("building-count"),
            feature,
        )
        .unwrap();
        assert_eq!(currentness.metadata().name, "Currentness");
        assert!(matches!(currentness.coverage(), Coverage::Global));
    }
}
