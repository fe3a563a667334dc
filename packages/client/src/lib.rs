#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! HTTP client for the OSM aggregation service.
//!
//! The service answers POST requests with binned time series for a filter
//! expression over an area of interest. This crate issues those requests,
//! parses the `result` arrays, and exposes the latest-data timestamp from
//! the `metadata` endpoint.
//!
//! Contract: a single HTTP attempt per call; retry policy belongs to the
//! caller. The client never interprets values, it only parses and
//! surfaces them. Inline topics (with attached data) are returned
//! verbatim without any network call.

pub mod response;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use geojson::{Feature, FeatureCollection};
use osm_quality_models::{SeriesData, Topic};
use thiserror::Error;

pub use response::ResultEntry;

/// Default total timeout per request. The aggregation service can take
/// several minutes for large areas.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(660);

/// Errors from the aggregation service or its client.
#[derive(Debug, Error)]
pub enum AggregationServiceError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("aggregation service request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-2xx status.
    #[error("aggregation service returned {status}: {message}")]
    Service {
        /// HTTP status code.
        status: u16,
        /// Upstream error message, when one was provided.
        message: String,
    },

    /// The response body could not be parsed as the expected shape.
    /// Typically the result of a timeout during response streaming.
    #[error("aggregation service returned an invalid response: {message}")]
    InvalidResponse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Data attached to an inline topic failed validation.
    #[error("invalid inline topic data: {message}")]
    InvalidTopicData {
        /// Description of the validation failure.
        message: String,
    },
}

/// Kinds of OSM contributions the contribution endpoints can filter by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ContributionType {
    /// Feature was created.
    #[strum(serialize = "creation")]
    Creation,
    /// A tag changed.
    #[strum(serialize = "tagChange")]
    TagChange,
    /// The geometry changed.
    #[strum(serialize = "geometryChange")]
    GeometryChange,
    /// Feature was deleted.
    #[strum(serialize = "deletion")]
    Deletion,
}

/// Options for one aggregation query.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// ISO-8601 point, range, or interval expression
    /// (e.g. `2008-01-01//P1M`).
    pub time: Option<String>,
    /// Second filter expression, ratio endpoints only.
    pub filter2: Option<String>,
    /// Explicit endpoint path override, relative to the base URL.
    pub endpoint: Option<String>,
    /// Restrict contribution queries to these contribution kinds.
    pub contribution_types: Option<Vec<ContributionType>>,
    /// Query monthly counts of latest contributions instead of an
    /// element aggregation.
    pub count_latest: bool,
}

/// The query surface indicators depend on.
///
/// Implemented by [`AggregationClient`]; tests substitute stubs.
#[async_trait]
pub trait AggregationApi: Send + Sync {
    /// Queries a binned time series for `topic` over `feature`.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationServiceError`] on transport failures, non-2xx
    /// responses, unparseable bodies, or invalid inline topic data.
    async fn query(
        &self,
        topic: &Topic,
        feature: &Feature,
        options: QueryOptions,
    ) -> Result<Vec<ResultEntry>, AggregationServiceError>;

    /// The upper bound of the service's temporal extent (UTC).
    ///
    /// # Errors
    ///
    /// Returns [`AggregationServiceError`] on transport failures or an
    /// unparseable metadata response.
    async fn latest_timestamp(&self) -> Result<DateTime<Utc>, AggregationServiceError>;
}

/// Client for the OSM aggregation service.
///
/// Holds a pooled HTTP client and a fixed user agent; safe to share and
/// to call concurrently.
#[derive(Debug, Clone)]
pub struct AggregationClient {
    http: reqwest::Client,
    base_url: String,
}

impl AggregationClient {
    /// Creates a client against `base_url` identifying as `user_agent`.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationServiceError::Http`] if the underlying HTTP
    /// client cannot be constructed.
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self, AggregationServiceError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn build_url(&self, topic: &Topic, options: &QueryOptions) -> String {
        if let Some(endpoint) = &options.endpoint {
            return format!("{}/{}", self.base_url, endpoint.trim_matches('/'));
        }
        if options.count_latest {
            return format!("{}/contributions/latest/count", self.base_url);
        }
        match topic {
            Topic::Preset(preset) => format!(
                "{}/{}/{}",
                self.base_url, preset.endpoint, preset.aggregation
            ),
            // Inline topics never reach URL building; query() returns
            // their data before issuing a request.
            Topic::Data(_) => format!("{}/elements/count", self.base_url),
        }
    }

    fn build_form(topic: &Topic, feature: &Feature, options: &QueryOptions) -> Vec<(String, String)> {
        let collection = FeatureCollection {
            bbox: None,
            features: vec![feature.clone()],
            foreign_members: None,
        };
        let mut form = vec![("bpolys".to_string(), collection.to_string())];
        if let Topic::Preset(preset) = topic {
            form.push(("filter".to_string(), preset.filter.clone()));
        }
        if let Some(filter2) = &options.filter2 {
            form.push(("filter2".to_string(), filter2.clone()));
        }
        if let Some(time) = &options.time {
            form.push(("time".to_string(), time.clone()));
        }
        if let Some(types) = &options.contribution_types {
            let joined = types
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            form.push(("contributionType".to_string(), joined));
        }
        form
    }
}

#[async_trait]
impl AggregationApi for AggregationClient {
    async fn query(
        &self,
        topic: &Topic,
        feature: &Feature,
        options: QueryOptions,
    ) -> Result<Vec<ResultEntry>, AggregationServiceError> {
        if let Topic::Data(data) = topic {
            return response::entries_from_inline(&data.data);
        }

        let url = self.build_url(topic, &options);
        let form = Self::build_form(topic, feature, &options);
        log::debug!("POST {url} (topic: {})", topic.key());

        let resp = self.http.post(&url).form(&form).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(AggregationServiceError::Service {
                status: status.as_u16(),
                message: response::upstream_message(&body),
            });
        }

        response::parse_result_body(&body)
    }

    async fn latest_timestamp(&self) -> Result<DateTime<Utc>, AggregationServiceError> {
        let url = format!("{}/metadata", self.base_url);
        log::debug!("GET {url}");

        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(AggregationServiceError::Service {
                status: status.as_u16(),
                message: response::upstream_message(&body),
            });
        }

        parse_metadata_timestamp(&body)
    }
}

/// Extracts `extractRegion.temporalExtent.toTimestamp` from a metadata
/// response body.
///
/// # Errors
///
/// Returns [`AggregationServiceError::InvalidResponse`] if the field is
/// missing or not a recognised timestamp format.
pub fn parse_metadata_timestamp(body: &str) -> Result<DateTime<Utc>, AggregationServiceError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| AggregationServiceError::InvalidResponse {
            message: format!("metadata response is not valid JSON: {e}"),
        })?;
    let raw = value["extractRegion"]["temporalExtent"]["toTimestamp"]
        .as_str()
        .ok_or_else(|| AggregationServiceError::InvalidResponse {
            message: "metadata response is missing toTimestamp".to_string(),
        })?;

    // The service emits minute precision without seconds; accept full
    // RFC 3339 as well.
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%MZ") {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AggregationServiceError::InvalidResponse {
            message: format!("unrecognised toTimestamp '{raw}': {e}"),
        })
}

/// Validates and returns the series attached to an inline topic.
///
/// # Errors
///
/// Returns [`AggregationServiceError::InvalidTopicData`] when the series
/// is empty, carries non-finite or negative values, or timestamps are
/// not strictly increasing.
pub fn validate_inline_series(data: &SeriesData) -> Result<(), AggregationServiceError> {
    if data.result.is_empty() {
        return Err(AggregationServiceError::InvalidTopicData {
            message: "empty result field".to_string(),
        });
    }
    for point in &data.result {
        if !point.value.is_finite() || point.value < 0.0 {
            return Err(AggregationServiceError::InvalidTopicData {
                message: format!("value {} at {} is not a non-negative number", point.value, point.timestamp),
            });
        }
    }
    for window in data.result.windows(2) {
        if window[1].timestamp <= window[0].timestamp {
            return Err(AggregationServiceError::InvalidTopicData {
                message: format!("timestamps are not strictly increasing at {}", window[1].timestamp),
            });
        }
    }
    Ok(())
}
