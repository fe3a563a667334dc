#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared value objects for OSM data-quality indicators.
//!
//! Defines the vocabulary every other crate speaks:
//!
//! - [`Topic`]: what is measured (a server-side filter preset, or an
//!   inline topic carrying a pre-fetched time series),
//! - [`AggregationKind`]: how the aggregation service bins it
//!   (count / length / area / perimeter),
//! - [`IndicatorResult`]: the outcome of one indicator run, a class in
//!   1..=5 with the derived traffic-light [`Label`], a numeric value, a
//!   description, timestamps, and an optional [`FigureSpec`],
//! - [`FigureSpec`]: a renderer-agnostic plot description.
//!
//! All timestamps are UTC and serialise as ISO-8601.

pub mod figure;
pub mod result;
pub mod topic;

pub use figure::{Axis, DashStyle, FigureSpec, PlotColor, Trace, TraceKind};
pub use result::{Class, Coverage, IndicatorMetadata, IndicatorResult, Label};
pub use topic::{
    get_topic_preset, topic_presets, AggregationKind, DataPoint, SeriesData, Topic, TopicData,
    TopicPreset,
};
