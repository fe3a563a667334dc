//! The Currentness indicator.
//!
//! For every feature of a topic only its latest edit counts. The monthly
//! counts of those latest contributions form an age distribution; the
//! median age (the number of months one has to look back to cover half
//! of all features) decides the verdict. Old data is not wrong data, so
//! a low score flags a region for review rather than condemning it.

use async_trait::async_trait;
use chrono::{DateTime, Datelike as _, Utc};
use geojson::Feature;
use osm_quality_client::{AggregationApi, ContributionType, QueryOptions};
use osm_quality_models::{
    AggregationKind, Axis, Class, FigureSpec, IndicatorMetadata, IndicatorResult, PlotColor, Topic,
    Trace,
};

use crate::{Indicator, IndicatorError};

/// Median-age class thresholds in months, best to worst. A median age
/// below `THRESHOLDS[i].0` months yields `THRESHOLDS[i].1`.
const THRESHOLDS: [(usize, Class); 4] = [
    (24, Class::Five),
    (36, Class::Four),
    (48, Class::Three),
    (96, Class::Two),
];

/// Bucket boundaries for figure coloring: up to 3 years green, up to
/// 8 years yellow, older red.
const GREEN_MONTHS: usize = 36;
const YELLOW_MONTHS: usize = 96;

/// Below this many features the age distribution is statistical noise.
const LOW_CONTRIBUTION_COUNT: f64 = 25.0;

/// Currentness indicator. See the module docs for the method.
pub struct Currentness {
    topic: Topic,
    feature: Feature,
    /// Absolute monthly counts of latest contributions, most recent
    /// month first.
    contrib_abs: Vec<f64>,
    /// `contrib_abs` normalised to shares of the total.
    contrib_rel: Vec<f64>,
    /// Bin timestamps, most recent first.
    timestamps: Vec<DateTime<Utc>>,
    contrib_sum: f64,
    median_months: Option<usize>,
    /// Number of most recent months without any contribution.
    gap_months: usize,
    low_significance: bool,
    result: IndicatorResult,
}

impl Currentness {
    /// Aggregation kinds this indicator can interpret.
    pub const SUPPORTED_AGGREGATIONS: &'static [AggregationKind] = &[
        AggregationKind::Count,
        AggregationKind::Length,
        AggregationKind::Area,
    ];

    /// Creates the indicator for `(topic, feature)`.
    #[must_use]
    pub fn new(topic: Topic, feature: Feature) -> Self {
        Self {
            topic,
            feature,
            contrib_abs: Vec::new(),
            contrib_rel: Vec::new(),
            timestamps: Vec::new(),
            contrib_sum: 0.0,
            median_months: None,
            gap_months: 0,
            low_significance: false,
            result: IndicatorResult::new(
                "The quality of the data in this area could not be determined.",
            ),
        }
    }

    /// Median age of the features in months, when one was computed.
    #[must_use]
    pub const fn median_months(&self) -> Option<usize> {
        self.median_months
    }

    /// Monthly interval from 2008 up to the service's latest timestamp,
    /// aligned so the most recent bin is a full month.
    fn interval_expression(latest: DateTime<Utc>) -> String {
        format!(
            "2008-{:02}-{:02}/{}/P1M",
            latest.month(),
            latest.day(),
            latest.format("%Y-%m-%d"),
        )
    }

    /// Index of the first month (most recent first) at which the
    /// cumulative count reaches half the total. Compares absolute counts
    /// so an exact half is hit exactly, which normalised shares cannot
    /// guarantee.
    fn median_index(contrib_abs: &[f64], contrib_sum: f64) -> Option<usize> {
        let mut cumulative = 0.0;
        for (i, count) in contrib_abs.iter().enumerate() {
            cumulative += count;
            if 2.0 * cumulative >= contrib_sum {
                return Some(i);
            }
        }
        None
    }

    const fn classify(median_months: usize) -> Class {
        let mut i = 0;
        while i < THRESHOLDS.len() {
            if median_months < THRESHOLDS[i].0 {
                return THRESHOLDS[i].1;
            }
            i += 1;
        }
        Class::One
    }

    fn describe(&self, median_months: usize, class: Class) -> String {
        let mut description = format!(
            "In this region, half of the {} features were last edited within the past \
             {median_months} months.",
            self.topic.name(),
        );
        let verdict = match class.label() {
            osm_quality_models::Label::Green => " The data can be considered up to date.",
            osm_quality_models::Label::Yellow => {
                " A larger part of the data has not been edited recently; \
                 it may be out of date in places."
            }
            _ => {
                " Most of the data has not been touched for a long time; \
                 it is likely out of date."
            }
        };
        description.push_str(verdict);
        if self.gap_months > 0 {
            description.push_str(&format!(
                " Note: there were no contributions at all in the last {} months.",
                self.gap_months
            ));
        }
        if self.low_significance {
            description.push_str(&format!(
                " Note: this is based on fewer than {LOW_CONTRIBUTION_COUNT} features; \
                 the result has low statistical significance."
            ));
        }
        description
    }

    /// Splits the month range `[start, end)` (most recent first) into a
    /// bar trace, oldest bin first so bars draw left to right.
    fn band_traces(&self, name: &str, color: PlotColor, start: usize, end: usize) -> [Trace; 2] {
        let end = end.min(self.contrib_abs.len());
        let start = start.min(end);
        let mut x: Vec<DateTime<Utc>> = self.timestamps[start..end].to_vec();
        let mut rel: Vec<f64> = self.contrib_rel[start..end].to_vec();
        let mut abs: Vec<f64> = self.contrib_abs[start..end].to_vec();
        x.reverse();
        rel.reverse();
        abs.reverse();

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let hover: Vec<String> = abs
            .iter()
            .zip(&rel)
            .map(|(a, r)| format!("{} features ({:.1}%)", a.round() as u64, r * 100.0))
            .collect();

        let mut share = Trace::bar(name, color, x.clone(), rel);
        share.hover = Some(hover);
        let mut absolute = Trace::bar(format!("{name} (absolute)"), color, x, abs);
        absolute.secondary_y = true;
        [share, absolute]
    }
}

#[async_trait]
impl Indicator for Currentness {
    fn metadata(&self) -> IndicatorMetadata {
        IndicatorMetadata {
            name: "Currentness".to_string(),
            description: "Estimates how up to date the data is from the age distribution \
                          of each feature's latest edit."
                .to_string(),
        }
    }

    fn topic(&self) -> &Topic {
        &self.topic
    }

    fn result(&self) -> &IndicatorResult {
        &self.result
    }

    fn supported_aggregations(&self) -> &'static [AggregationKind] {
        Self::SUPPORTED_AGGREGATIONS
    }

    async fn preprocess(&mut self, api: &dyn AggregationApi) -> Result<(), IndicatorError> {
        let latest = api.latest_timestamp().await?;
        let options = QueryOptions {
            time: Some(Self::interval_expression(latest)),
            contribution_types: Some(vec![
                ContributionType::Creation,
                ContributionType::TagChange,
                ContributionType::GeometryChange,
            ]),
            count_latest: true,
            ..QueryOptions::default()
        };
        let mut entries = api.query(&self.topic, &self.feature, options).await?;
        entries.reverse();
        self.contrib_abs = entries.iter().map(osm_quality_client::ResultEntry::value).collect();
        self.timestamps = entries
            .iter()
            .map(osm_quality_client::ResultEntry::timestamp)
            .collect();
        self.result.timestamp_osm = Some(latest);
        Ok(())
    }

    fn calculate(&mut self) {
        self.contrib_sum = self.contrib_abs.iter().sum();
        if self.contrib_sum <= 0.0 {
            log::info!("no latest contributions, skipping currentness calculation");
            self.result.description =
                "No features of this topic have ever been edited in this region.".to_string();
            return;
        }

        self.contrib_rel = self
            .contrib_abs
            .iter()
            .map(|v| v / self.contrib_sum)
            .collect();
        self.gap_months = self
            .contrib_abs
            .iter()
            .take_while(|&&v| v == 0.0)
            .count();
        self.low_significance = self.contrib_sum < LOW_CONTRIBUTION_COUNT;

        let Some(median) = Self::median_index(&self.contrib_abs, self.contrib_sum) else {
            // Unreachable for a positive sum, guarded anyway.
            self.result.description =
                "The age distribution of this region could not be evaluated.".to_string();
            return;
        };
        let class = Self::classify(median);

        self.median_months = Some(median);
        #[allow(clippy::cast_precision_loss)]
        {
            self.result.value = Some(median as f64);
        }
        self.result.class = Some(class);
        self.result.description = self.describe(median, class);
    }

    fn create_figure(&mut self) {
        if !self.result.is_defined() {
            log::info!("result is undefined, skipping figure creation");
            return;
        }
        if self.low_significance {
            log::info!("too few contributions, skipping figure creation");
            return;
        }

        let [green_rel, green_abs] =
            self.band_traces("Up to 3 years old", PlotColor::Green, 0, GREEN_MONTHS);
        let [yellow_rel, yellow_abs] = self.band_traces(
            "3 to 8 years old",
            PlotColor::Yellow,
            GREEN_MONTHS,
            YELLOW_MONTHS,
        );
        let [red_rel, red_abs] = self.band_traces(
            "Older than 8 years",
            PlotColor::Red,
            YELLOW_MONTHS,
            self.contrib_abs.len(),
        );

        self.result.figure = Some(FigureSpec {
            title: "Currentness".to_string(),
            subtitle: Some("Share of features by month of latest edit".to_string()),
            x_axis: Axis::new("Month of latest edit"),
            y_axis: Axis::new("Share of features"),
            secondary_y_axis: Some(Axis::hidden("Features")),
            traces: vec![green_rel, green_abs, yellow_rel, yellow_abs, red_rel, red_abs],
        });
    }

    fn data(&self) -> serde_json::Value {
        serde_json::json!({
            "timestamps": self.timestamps,
            "contributionsAbsolute": self.contrib_abs,
            "contributionsRelative": self.contrib_rel,
            "contributionsSum": self.contrib_sum,
            "medianMonths": self.median_months,
        })
    }
}
