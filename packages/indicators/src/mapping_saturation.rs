//! The Mapping Saturation indicator.
//!
//! Premise: every aggregation of OSM features over a fixed area (count
//! of buildings, length of roads) has a maximum; after a period of
//! increased mapping activity the series levels off near it. A family
//! of monotone growth models is fitted to the monthly series since
//! 2008, the best fit is selected by mean absolute error, and the
//! fraction of the fitted curve's latest value already reached three
//! years ago decides the verdict.
//!
//! Reference papers:
//! - Gröchenig S et al. (2014): Digging into the history of VGI
//!   data-sets (<https://doi.org/10.1080/17489725.2014.978403>)
//! - Barrington-Leigh C and Millard-Ball A (2017): The world's
//!   user-generated road map is more than 80% complete
//!   (<https://doi.org/10.1371/journal.pone.0180698>)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geojson::Feature;
use osm_quality_client::{AggregationApi, QueryOptions};
use osm_quality_fitting::{select_best, FittedModel, GrowthModel};
use osm_quality_models::{
    AggregationKind, Axis, Class, DashStyle, FigureSpec, IndicatorMetadata, IndicatorResult,
    PlotColor, Topic, Trace, TraceKind,
};

use crate::{Indicator, IndicatorError};

/// Growth over the last three years at or below this fraction counts
/// as saturated (derived from Gröchenig et al.).
const GROWTH_SATURATED: f64 = 0.03;

/// Growth above this fraction counts as heavy ongoing mapping.
const GROWTH_RAPID: f64 = 0.3;

/// Length of the recent window the saturation metric looks back over.
const WINDOW_MONTHS: usize = 36;

/// Series whose maximum never exceeds this are start-stage regions;
/// fitting a growth curve to them is meaningless.
const START_STAGE_MAX: f64 = 2.0;

/// Asymptote lines further than this factor above the observed maximum
/// are left out of the figure to keep the y-range readable.
const ASYMPTOTE_PLOT_FACTOR: f64 = 5.0;

/// Mapping Saturation indicator. See the module docs for the method.
pub struct MappingSaturation {
    topic: Topic,
    feature: Feature,
    time_range: String,
    values: Vec<f64>,
    timestamps: Vec<DateTime<Utc>>,
    best_fit: Option<FittedModel>,
    result: IndicatorResult,
}

impl MappingSaturation {
    /// Aggregation kinds this indicator can interpret.
    pub const SUPPORTED_AGGREGATIONS: &'static [AggregationKind] = &[
        AggregationKind::Count,
        AggregationKind::Length,
        AggregationKind::Area,
        AggregationKind::Perimeter,
    ];

    /// Creates the indicator for `(topic, feature)` with the default
    /// monthly time range since 2008.
    #[must_use]
    pub fn new(topic: Topic, feature: Feature) -> Self {
        Self::with_time_range(topic, feature, "2008-01-01//P1M")
    }

    /// Creates the indicator with an explicit time range expression.
    #[must_use]
    pub fn with_time_range(topic: Topic, feature: Feature, time_range: &str) -> Self {
        Self {
            topic,
            feature,
            time_range: time_range.to_string(),
            values: Vec::new(),
            timestamps: Vec::new(),
            best_fit: None,
            result: IndicatorResult::new(
                "The quality of the data in this area could not be determined.",
            ),
        }
    }

    /// The selected best-fit model, when one was found.
    #[must_use]
    pub const fn best_fit(&self) -> Option<&FittedModel> {
        self.best_fit.as_ref()
    }

    /// Saturation and growth over the recent window of the fitted
    /// curve. Saturation is clamped into `[0, 1]`.
    fn saturation_metric(fitted_values: &[f64]) -> Option<(f64, f64)> {
        let last = fitted_values.len().checked_sub(1)?;
        let early = last.saturating_sub(WINDOW_MONTHS);
        let denominator = fitted_values[last];
        if denominator <= 0.0 {
            return None;
        }
        let saturation = (fitted_values[early] / denominator).clamp(0.0, 1.0);
        Some((saturation, 1.0 - saturation))
    }

    /// Description of an undefined or start-stage edge case, when one
    /// is present.
    fn edge_case(&self) -> Option<EdgeCase> {
        let max = self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max <= 0.0 {
            return Some(EdgeCase::NoData);
        }
        if self.values.last().is_some_and(|&last| last == 0.0) {
            return Some(EdgeCase::Deleted);
        }
        if max <= START_STAGE_MAX {
            return Some(EdgeCase::StartStage);
        }
        None
    }

    fn describe(&self, saturation: f64, growth: f64, class: Class) -> String {
        let model_name = self
            .best_fit
            .as_ref()
            .map_or("growth model", |fit| fit.name.as_str());
        let latest = self
            .timestamps
            .last()
            .map_or_else(String::new, |ts| ts.format("%Y-%m-%d").to_string());
        let base = format!(
            "The saturation of the last 3 years is {:.1}% (growth {:.1}%), \
             estimated with the {model_name} on {} data up to {latest}.",
            saturation * 100.0,
            growth * 100.0,
            self.topic.name(),
        );
        let verdict = match class.label() {
            osm_quality_models::Label::Green => {
                "Mapping of this topic appears to be saturated; little new data is to be expected."
            }
            osm_quality_models::Label::Yellow => {
                "Mapping activity is still ongoing; saturation has not been reached yet."
            }
            _ => "The data is growing rapidly; mapping of this topic is far from complete.",
        };
        format!("{base} {verdict}")
    }
}

/// Short-circuit conditions checked before model fitting.
enum EdgeCase {
    /// No feature of the topic was ever mapped here.
    NoData,
    /// Features existed but have all been deleted.
    Deleted,
    /// A handful of features at most; the region is in a start stage.
    StartStage,
}

#[async_trait]
impl Indicator for MappingSaturation {
    fn metadata(&self) -> IndicatorMetadata {
        IndicatorMetadata {
            name: "Mapping Saturation".to_string(),
            description: "Estimates whether the mapping of a topic has reached saturation \
                          by fitting growth models to its monthly history."
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
        let options = QueryOptions {
            time: Some(self.time_range.clone()),
            ..QueryOptions::default()
        };
        let entries = api.query(&self.topic, &self.feature, options).await?;
        self.values = entries.iter().map(osm_quality_client::ResultEntry::value).collect();
        self.timestamps = entries
            .iter()
            .map(osm_quality_client::ResultEntry::timestamp)
            .collect();
        self.result.timestamp_osm = self.timestamps.last().copied();
        Ok(())
    }

    fn calculate(&mut self) {
        match self.edge_case() {
            Some(EdgeCase::NoData) => {
                log::info!("series is all zero, skipping saturation calculation");
                self.result.description =
                    "No features of this topic were ever mapped in this region.".to_string();
                return;
            }
            Some(EdgeCase::Deleted) => {
                log::info!("series ends at zero, skipping saturation calculation");
                self.result.description =
                    "All mapped features of this topic in this region have been deleted."
                        .to_string();
                return;
            }
            Some(EdgeCase::StartStage) => {
                self.result.class = Some(Class::One);
                self.result.description =
                    "Hardly any features of this topic are mapped in this region; \
                     mapping is still in the start stage."
                        .to_string();
                return;
            }
            None => {}
        }

        #[allow(clippy::cast_precision_loss)]
        let x: Vec<f64> = (0..self.values.len()).map(|i| i as f64).collect();
        let observed_min = self.values.iter().copied().fold(f64::INFINITY, f64::min);

        let mut fits: Vec<FittedModel> = Vec::new();
        for model in GrowthModel::ALL {
            match model.fit(&x, &self.values) {
                Ok(fit) if fit.is_valid(observed_min) => fits.push(fit),
                Ok(fit) => {
                    log::debug!("discarding invalid fit of {}", fit.name);
                }
                Err(error) => {
                    log::debug!("skipping {}: {error}", model.name());
                }
            }
        }

        let Some(best) = select_best(&fits).cloned() else {
            log::info!("no growth model produced a valid fit");
            self.result.description =
                "None of the growth models fit the history of this region; \
                 no saturation estimate is possible."
                    .to_string();
            return;
        };
        log::info!("best fitting model: {} (mae {:.3})", best.name, best.mae);

        let Some((saturation, growth)) = Self::saturation_metric(&best.fitted_values) else {
            self.result.description =
                "The fitted curve never rises above zero; no saturation estimate is possible."
                    .to_string();
            return;
        };

        let class = if growth <= GROWTH_SATURATED {
            Class::Five
        } else if growth <= GROWTH_RAPID {
            Class::Three
        } else {
            Class::One
        };

        self.best_fit = Some(best);
        self.result.value = Some(saturation);
        self.result.class = Some(class);
        self.result.description = self.describe(saturation, growth, class);
    }

    fn create_figure(&mut self) {
        if !self.result.is_defined() {
            log::info!("result is undefined, skipping figure creation");
            return;
        }

        let y_label = self.topic.aggregation().map_or_else(
            || "Value".to_string(),
            |kind| {
                let kind = kind.to_string();
                let mut chars = kind.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_uppercase().collect::<String>() + chars.as_str()
                })
            },
        );

        let mut traces = vec![Trace::line(
            "OSM data",
            PlotColor::Blue,
            self.timestamps.clone(),
            self.values.clone(),
        )];
        let mut subtitle = None;

        if let Some(best) = &self.best_fit {
            traces.push(Trace::line(
                "Modelled saturation curve",
                PlotColor::Red,
                self.timestamps.clone(),
                best.fitted_values.clone(),
            ));

            let observed_max = self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if best.asymptote < observed_max * ASYMPTOTE_PLOT_FACTOR {
                traces.push(Trace {
                    name: "Estimated total data".to_string(),
                    kind: TraceKind::Line,
                    color: PlotColor::Red,
                    dash: Some(DashStyle::Dash),
                    x: self.timestamps.clone(),
                    y: vec![best.asymptote; self.timestamps.len()],
                    secondary_y: false,
                    hover: None,
                });
            }
            subtitle = Some(format!("{} (MAE {:.1})", best.name, best.mae));
        }

        self.result.figure = Some(FigureSpec {
            title: "Mapping Saturation".to_string(),
            subtitle,
            x_axis: Axis::new("Date"),
            y_axis: Axis::new(y_label),
            secondary_y_axis: None,
            traces,
        });
    }

    fn data(&self) -> serde_json::Value {
        serde_json::json!({
            "timestamps": self.timestamps,
            "values": self.values,
            "bestFit": self.best_fit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{square_feature, StubApi};
    use osm_quality_models::{get_topic_preset, Label};

    fn preset_topic() -> Topic {
        Topic::Preset(get_topic_preset("building-count").unwrap())
    }

    async fn run(values: &[f64]) -> MappingSaturation {
        let api = StubApi::monthly(values);
        let mut indicator = MappingSaturation::new(preset_topic(), square_feature());
        indicator.preprocess(&api).await.unwrap();
        indicator.calculate();
        indicator.create_figure();
        indicator
    }

    fn logistic_series(n: usize, plateau: f64, midpoint: f64, rate: f64) -> Vec<f64> {
        (0..n)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let x = i as f64;
                plateau / (1.0 + (-rate * (x - midpoint)).exp())
            })
            .collect()
    }

    #[tokio::test]
    async fn all_zero_series_is_undefined_without_figure() {
        let indicator = run(&[0.0; 60]).await;
        assert!(!indicator.result().is_defined());
        assert_eq!(indicator.result().label(), Label::Undefined);
        assert!(indicator.result().figure.is_none());
    }

    #[tokio::test]
    async fn deleted_data_is_undefined() {
        let mut values = logistic_series(100, 500.0, 30.0, 0.2);
        *values.last_mut().unwrap() = 0.0;
        let indicator = run(&values).await;
        assert!(!indicator.result().is_defined());
        assert!(indicator.result().description.contains("deleted"));
    }

    #[tokio::test]
    async fn near_empty_region_is_start_stage_red() {
        let mut values = vec![0.0; 80];
        for v in values.iter_mut().skip(70) {
            *v = 2.0;
        }
        let indicator = run(&values).await;
        assert_eq!(indicator.result().class, Some(Class::One));
        assert_eq!(indicator.result().label(), Label::Red);
        assert!(indicator.result().description.contains("start stage"));
        assert!(indicator.best_fit().is_none());
    }

    #[tokio::test]
    async fn saturated_series_is_green() {
        // Plateaued 12 years ago; essentially flat over the window.
        let values = logistic_series(170, 30_000.0, 30.0, 0.25);
        let indicator = run(&values).await;
        assert_eq!(indicator.result().class, Some(Class::Five));
        assert_eq!(indicator.result().label(), Label::Green);
        let saturation = indicator.result().value.unwrap();
        assert!(1.0 - saturation <= GROWTH_SATURATED);
        assert!(indicator.result().description.contains("saturated"));
        let best = indicator.best_fit().unwrap();
        assert_eq!(best.fitted_values.len(), values.len());
        assert!(best.asymptote > 0.0);
    }

    #[tokio::test]
    async fn steadily_growing_series_is_not_green() {
        // Linear growth with a steeper tail: far from saturation.
        let n = 120;
        let values: Vec<f64> = (0..n)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let x = i as f64;
                let tail = if i + 24 >= n {
                    #[allow(clippy::cast_precision_loss)]
                    let t = (i + 24 - n) as f64;
                    50.0 * t
                } else {
                    0.0
                };
                100.0 * x + tail
            })
            .collect();
        let indicator = run(&values).await;
        match indicator.result().class {
            Some(Class::One | Class::Three) => {}
            other => panic!("expected red or yellow, got {other:?}"),
        }
        if let Some(saturation) = indicator.result().value {
            assert!(1.0 - saturation > GROWTH_SATURATED);
        }
    }

    #[tokio::test]
    async fn figure_shows_observed_and_fitted_traces() {
        let values = logistic_series(170, 30_000.0, 30.0, 0.25);
        let indicator = run(&values).await;
        let figure = indicator.result().figure.as_ref().unwrap();
        assert!(figure.traces.len() >= 2);
        assert_eq!(figure.traces[0].name, "OSM data");
        assert_eq!(figure.traces[1].name, "Modelled saturation curve");
        assert!(figure.subtitle.as_ref().unwrap().contains("MAE"));
        // The dashed asymptote line shares the x-range of the data.
        if let Some(asymptote) = figure.traces.get(2) {
            assert_eq!(asymptote.dash, Some(DashStyle::Dash));
            assert_eq!(asymptote.x.len(), values.len());
        }
    }

    #[tokio::test]
    async fn data_payload_carries_series_and_best_fit() {
        let values = logistic_series(170, 30_000.0, 30.0, 0.25);
        let indicator = run(&values).await;
        let data = indicator.data();
        assert_eq!(data["values"].as_array().unwrap().len(), values.len());
        assert!(data["bestFit"]["mae"].is_number());
    }
}
