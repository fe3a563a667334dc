//! Renderer-agnostic plot descriptions.
//!
//! Indicators attach a [`FigureSpec`] to their result instead of a
//! rendered image. Frontends turn the description into an actual chart; the
//! contract is only that the data is well-formed, not that two renderers
//! produce identical pixels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named colors used across indicator figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PlotColor {
    /// Observed-data blue.
    Blue,
    /// Good-quality green.
    Green,
    /// Medium-quality yellow.
    Yellow,
    /// Poor-quality red.
    Red,
}

impl PlotColor {
    /// The hex value frontends should use for this color.
    #[must_use]
    pub const fn hex(self) -> &'static str {
        match self {
            Self::Blue => "#2185D0",
            Self::Green => "#21BA45",
            Self::Yellow => "#FBBD08",
            Self::Red => "#DB2828",
        }
    }
}

/// Line dash style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DashStyle {
    /// Continuous line.
    Solid,
    /// Dashed line.
    Dash,
}

/// How a trace is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    /// Connected line.
    Line,
    /// Vertical bars.
    Bar,
}

/// One data trace of a figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    /// Legend entry.
    pub name: String,
    /// Drawing style.
    pub kind: TraceKind,
    /// Trace color.
    pub color: PlotColor,
    /// Dash style, line traces only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dash: Option<DashStyle>,
    /// X coordinates (UTC timestamps).
    pub x: Vec<DateTime<Utc>>,
    /// Y coordinates.
    pub y: Vec<f64>,
    /// Whether the trace binds to the secondary y-axis.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub secondary_y: bool,
    /// Optional per-point hover text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hover: Option<Vec<String>>,
}

impl Trace {
    /// A solid line trace on the primary y-axis.
    #[must_use]
    pub fn line(
        name: impl Into<String>,
        color: PlotColor,
        x: Vec<DateTime<Utc>>,
        y: Vec<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: TraceKind::Line,
            color,
            dash: None,
            x,
            y,
            secondary_y: false,
            hover: None,
        }
    }

    /// A bar trace on the primary y-axis.
    #[must_use]
    pub fn bar(
        name: impl Into<String>,
        color: PlotColor,
        x: Vec<DateTime<Utc>>,
        y: Vec<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: TraceKind::Bar,
            color,
            dash: None,
            x,
            y,
            secondary_y: false,
            hover: None,
        }
    }
}

/// An axis of a figure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Axis {
    /// Axis title.
    pub title: String,
    /// Hidden axes carry data (e.g. for hover) but are not drawn.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
}

impl Axis {
    /// A visible axis with the given title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            hidden: false,
        }
    }

    /// A hidden axis carrying hover-only data.
    #[must_use]
    pub fn hidden(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            hidden: true,
        }
    }
}

/// A complete figure description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FigureSpec {
    /// Figure title.
    pub title: String,
    /// Subtitle, e.g. the selected model and its error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    /// Shared x-axis.
    pub x_axis: Axis,
    /// Primary y-axis.
    pub y_axis: Axis,
    /// Secondary y-axis, if any trace binds to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_y_axis: Option<Axis>,
    /// Data traces, drawn in order.
    pub traces: Vec<Trace>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn trace_constructors_set_kind() {
        let ts = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let line = Trace::line("observed", PlotColor::Blue, vec![ts], vec![1.0]);
        assert_eq!(line.kind, TraceKind::Line);
        let bar = Trace::bar("buckets", PlotColor::Green, vec![ts], vec![1.0]);
        assert_eq!(bar.kind, TraceKind::Bar);
        assert!(!bar.secondary_y);
    }

    #[test]
    fn figure_spec_serializes_camel_case() {
        let spec = FigureSpec {
            title: "Mapping Saturation".to_string(),
            subtitle: None,
            x_axis: Axis::new("Date"),
            y_axis: Axis::new("Count"),
            secondary_y_axis: Some(Axis::hidden("Absolute")),
            traces: vec![],
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["xAxis"]["title"], "Date");
        assert_eq!(json["secondaryYAxis"]["hidden"], true);
    }

    #[test]
    fn colors_have_hex_values() {
        assert_eq!(PlotColor::Red.hex(), "#DB2828");
        assert_eq!(PlotColor::Blue.to_string(), "blue");
    }
}
