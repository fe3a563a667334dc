#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Runs indicators over areas of interest.
//!
//! One request carries an indicator key, a topic, and a GeoJSON feature
//! collection. Requests are validated up front (geometry kind,
//! indicator/topic compatibility); validation failures are terminal.
//! Failures after fan-out are per feature: an oversized AOI or a
//! failing aggregation call leaves an error record on the affected
//! feature while the remaining features complete normally.
//!
//! The output mirrors the input feature collection, index for index.

pub mod config;

use futures::stream::{self, StreamExt as _};
use geo::GeodesicArea as _;
use geojson::{Feature, FeatureCollection, JsonObject};
use osm_quality_client::AggregationApi;
use osm_quality_indicators::{
    create_indicator, validate_indicator_topic, IndicatorError, IndicatorKey,
};
use osm_quality_models::Topic;
use thiserror::Error;

pub use config::Config;

/// Request-level and per-feature failure modes. Malformed requests
/// abort the run; [`OrchestratorError::AreaTooLarge`] and indicator
/// failures only mark the affected feature.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The configuration could not be loaded or parsed.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// The request is malformed.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Description of the problem.
        message: String,
    },

    /// An AOI feature exceeds the configured size limit.
    #[error(
        "feature {feature_index} covers {area_km2:.1} km², above the limit of {limit_km2:.1} km²"
    )]
    AreaTooLarge {
        /// Index of the feature within the input collection.
        feature_index: usize,
        /// Geodesic area of the feature.
        area_km2: f64,
        /// Configured limit.
        limit_km2: f64,
    },

    /// The indicator/topic combination is invalid.
    #[error(transparent)]
    Indicator(#[from] IndicatorError),
}

/// One indicator run over a feature collection.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Which indicator to run.
    pub indicator: IndicatorKey,
    /// The topic to analyse.
    pub topic: Topic,
    /// Areas of interest; every feature must carry a polygon or
    /// multipolygon geometry.
    pub collection: FeatureCollection,
    /// Attach a figure to each defined result.
    pub include_figure: bool,
    /// Attach the raw series and model data to each feature.
    pub include_data: bool,
}

impl RunRequest {
    /// A request with the default output options (figures on, raw data
    /// off).
    #[must_use]
    pub const fn new(indicator: IndicatorKey, topic: Topic, collection: FeatureCollection) -> Self {
        Self {
            indicator,
            topic,
            collection,
            include_figure: true,
            include_data: false,
        }
    }
}

/// Runs `request` against `api` and returns the output collection.
///
/// Features are processed concurrently, at most [`Config::concurrency`]
/// at a time. The output collection has the same length and order as
/// the input; each feature's properties gain either the indicator
/// output (`metadata`, `topic`, `result`, `attribution`) or an `error`
/// record.
///
/// # Errors
///
/// Returns [`OrchestratorError`] when the request fails validation
/// before fan-out. Per-feature failures (oversized AOI, aggregation
/// service errors) do not error; they become error records.
pub async fn run(
    api: &dyn AggregationApi,
    config: &Config,
    request: RunRequest,
) -> Result<FeatureCollection, OrchestratorError> {
    validate_request(&request)?;

    let width = config.concurrency.max(1);
    log::info!(
        "running {} over {} features (concurrency {width})",
        request.indicator,
        request.collection.features.len(),
    );

    let outcomes: Vec<Result<JsonObject, OrchestratorError>> = stream::iter(
        request
            .collection
            .features
            .iter()
            .enumerate()
            .map(|(index, feature)| {
                let topic = request.topic.clone();
                async move {
                    check_area(config, index, feature)?;
                    run_feature(
                        api,
                        request.indicator,
                        topic,
                        feature,
                        request.include_figure,
                        request.include_data,
                    )
                    .await
                    .map_err(OrchestratorError::from)
                }
            }),
    )
    .buffered(width)
    .collect()
    .await;

    let features = request
        .collection
        .features
        .into_iter()
        .zip(outcomes)
        .enumerate()
        .map(|(index, (mut feature, outcome))| {
            let mut properties = feature.properties.take().unwrap_or_default();
            match outcome {
                Ok(output) => properties.extend(output),
                Err(error) => {
                    log::warn!("feature {index} failed: {error}");
                    properties.insert(
                        "error".to_string(),
                        serde_json::json!({
                            "indicator": request.indicator.to_string(),
                            "kind": error_kind(&error),
                            "message": error.to_string(),
                        }),
                    );
                }
            }
            feature.properties = Some(properties);
            feature
        })
        .collect();

    Ok(FeatureCollection {
        bbox: request.collection.bbox,
        features,
        foreign_members: request.collection.foreign_members,
    })
}

/// Runs the full indicator lifecycle for one feature and renders its
/// output properties.
async fn run_feature(
    api: &dyn AggregationApi,
    key: IndicatorKey,
    topic: Topic,
    feature: &Feature,
    include_figure: bool,
    include_data: bool,
) -> Result<JsonObject, IndicatorError> {
    let mut indicator = create_indicator(key, topic, feature.clone())?;
    indicator.preprocess(api).await?;
    indicator.calculate();
    if include_figure {
        indicator.create_figure();
    }

    let to_value = |value: serde_json::Result<serde_json::Value>| {
        value.map_err(|e| IndicatorError::Input {
            message: format!("cannot serialize indicator output: {e}"),
        })
    };

    let mut properties = JsonObject::new();
    properties.insert(
        "metadata".to_string(),
        to_value(serde_json::to_value(indicator.metadata()))?,
    );
    properties.insert(
        "topic".to_string(),
        to_value(serde_json::to_value(indicator.topic()))?,
    );
    properties.insert(
        "result".to_string(),
        to_value(serde_json::to_value(indicator.result()))?,
    );
    properties.insert(
        "attribution".to_string(),
        serde_json::Value::String(indicator.attribution().to_string()),
    );
    if include_data {
        properties.insert("data".to_string(), indicator.data());
    }
    Ok(properties)
}

/// The error taxonomy name attached to per-feature error records.
const fn error_kind(error: &OrchestratorError) -> &'static str {
    match error {
        OrchestratorError::AreaTooLarge { .. } => "SizeRestrictionError",
        OrchestratorError::Indicator(IndicatorError::Aggregation(_)) => "AggregationServiceError",
        OrchestratorError::Indicator(IndicatorError::UnsupportedTopic { .. }) => {
            "IndicatorTopicError"
        }
        _ => "InputError",
    }
}

/// Per-feature AOI size check; a zero limit disables it.
fn check_area(config: &Config, index: usize, feature: &Feature) -> Result<(), OrchestratorError> {
    if config.area_limit_km2 <= 0.0 {
        return Ok(());
    }
    let geometry = feature
        .geometry
        .as_ref()
        .ok_or_else(|| OrchestratorError::InvalidRequest {
            message: format!("feature {index} has no geometry"),
        })?;
    let area_km2 = geodesic_area_km2(geometry, index)?;
    if area_km2 > config.area_limit_km2 {
        return Err(OrchestratorError::AreaTooLarge {
            feature_index: index,
            area_km2,
            limit_km2: config.area_limit_km2,
        });
    }
    Ok(())
}

fn validate_request(request: &RunRequest) -> Result<(), OrchestratorError> {
    if request.collection.features.is_empty() {
        return Err(OrchestratorError::InvalidRequest {
            message: "the feature collection is empty".to_string(),
        });
    }
    validate_indicator_topic(request.indicator, &request.topic)?;

    for (index, feature) in request.collection.features.iter().enumerate() {
        let geometry =
            feature
                .geometry
                .as_ref()
                .ok_or_else(|| OrchestratorError::InvalidRequest {
                    message: format!("feature {index} has no geometry"),
                })?;
        if !matches!(
            geometry.value,
            geojson::Value::Polygon(_) | geojson::Value::MultiPolygon(_)
        ) {
            return Err(OrchestratorError::InvalidRequest {
                message: format!("feature {index} is not a polygon or multipolygon"),
            });
        }
    }
    Ok(())
}

/// Geodesic area of a polygonal GeoJSON geometry in km².
fn geodesic_area_km2(geometry: &geojson::Geometry, index: usize) -> Result<f64, OrchestratorError> {
    let geometry: geo::Geometry<f64> =
        (&geometry.value)
            .try_into()
            .map_err(|e: geojson::Error| OrchestratorError::InvalidRequest {
                message: format!("feature {index} has an invalid geometry: {e}"),
            })?;
    Ok(geometry.geodesic_area_unsigned() / 1.0e6)
}
