//! Parsing of aggregation service response bodies.
//!
//! Aggregation endpoints answer with a `result` array of
//! `{timestamp, value}` entries; contribution endpoints answer with
//! `{fromTimestamp, toTimestamp, value}` entries. Error bodies carry
//! `{status, message}` (older deployments use an `error` key).

use chrono::{DateTime, Utc};
use osm_quality_models::SeriesData;
use serde::{Deserialize, Serialize};

use crate::{validate_inline_series, AggregationServiceError};

/// One entry of a service `result` array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged, rename_all = "camelCase")]
pub enum ResultEntry {
    /// Point-in-time aggregation value.
    Snapshot {
        /// Bin timestamp.
        timestamp: DateTime<Utc>,
        /// Aggregated value.
        value: f64,
    },
    /// Value over a time interval (contribution queries).
    Interval {
        /// Interval start.
        #[serde(rename = "fromTimestamp")]
        from_timestamp: DateTime<Utc>,
        /// Interval end.
        #[serde(rename = "toTimestamp")]
        to_timestamp: DateTime<Utc>,
        /// Aggregated value.
        value: f64,
    },
}

impl ResultEntry {
    /// The aggregated value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        match self {
            Self::Snapshot { value, .. } | Self::Interval { value, .. } => *value,
        }
    }

    /// The timestamp associated with the entry. For intervals this is
    /// the interval end, matching the "state at end of bin" reading.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Snapshot { timestamp, .. } => *timestamp,
            Self::Interval { to_timestamp, .. } => *to_timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResultBody {
    result: Vec<ResultEntry>,
}

/// Parses a 2xx response body into its `result` entries.
///
/// # Errors
///
/// Returns [`AggregationServiceError::InvalidResponse`] when the body is
/// not valid JSON of the expected shape or the result array is empty.
/// The latter typically means the response was cut short by an upstream
/// timeout while streaming.
pub fn parse_result_body(body: &str) -> Result<Vec<ResultEntry>, AggregationServiceError> {
    let parsed: ResultBody =
        serde_json::from_str(body).map_err(|e| AggregationServiceError::InvalidResponse {
            message: format!("response is not a valid result body: {e}"),
        })?;
    if parsed.result.is_empty() {
        return Err(AggregationServiceError::InvalidResponse {
            message: "empty result field".to_string(),
        });
    }
    Ok(parsed.result)
}

/// Converts an inline topic's attached series into result entries.
///
/// # Errors
///
/// Returns [`AggregationServiceError::InvalidTopicData`] when the series
/// fails validation.
pub fn entries_from_inline(data: &SeriesData) -> Result<Vec<ResultEntry>, AggregationServiceError> {
    validate_inline_series(data)?;
    Ok(data
        .result
        .iter()
        .map(|point| ResultEntry::Snapshot {
            timestamp: point.timestamp,
            value: point.value,
        })
        .collect())
}

/// Extracts the upstream error message from an error body.
///
/// Falls back to a body preview when neither `message` nor `error` is
/// present.
#[must_use]
pub fn upstream_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value["message"].as_str() {
            return message.to_string();
        }
        if let Some(error) = value["error"].as_str() {
            return error.to_string();
        }
    }
    let preview: String = body.chars().take(200).collect();
    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn parses_snapshot_entries() {
        let body = r#"{"attribution": {"url": "https://ohsome.org/copyrights"},
            "result": [
            {"timestamp": "2008-01-01T00:00:00Z", "value": 0.0},
            {"timestamp": "2008-02-01T00:00:00Z", "value": 3.0}
        ]}"#;
        let entries = parse_result_body(body).unwrap();
        assert_eq!(entries.len(), 2);
        assert!((entries[1].value() - 3.0).abs() < f64::EPSILON);
        assert_eq!(
            entries[0].timestamp(),
            Utc.with_ymd_and_hms(2008, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn parses_interval_entries() {
        let body = r#"{"result": [
            {"fromTimestamp": "2008-01-01T00:00:00Z",
             "toTimestamp": "2008-02-01T00:00:00Z",
             "value": 12.0}
        ]}"#;
        let entries = parse_result_body(body).unwrap();
        match entries[0] {
            ResultEntry::Interval { to_timestamp, .. } => {
                assert_eq!(entries[0].timestamp(), to_timestamp);
            }
            ResultEntry::Snapshot { .. } => panic!("expected interval entry"),
        }
    }

    #[test]
    fn empty_result_is_invalid() {
        let err = parse_result_body(r#"{"result": []}"#).unwrap_err();
        assert!(matches!(
            err,
            AggregationServiceError::InvalidResponse { .. }
        ));
    }

    #[test]
    fn truncated_body_is_invalid() {
        assert!(parse_result_body(r#"{"result": [{"timestamp": "2008-"#).is_err());
    }

    #[test]
    fn upstream_message_prefers_message_key() {
        let body = r#"{"status": 400, "message": "invalid filter"}"#;
        assert_eq!(upstream_message(body), "invalid filter");
        let body = r#"{"error": "Bad Request"}"#;
        assert_eq!(upstream_message(body), "Bad Request");
        assert_eq!(upstream_message("oops"), "oops");
    }
}
