#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for OSM data-quality indicators.
//!
//! ```text
//! osm_quality run mapping-saturation --topic building-count --aoi region.geojson
//! osm_quality run currentness --topic major-roads-length --aoi region.geojson --out result.geojson
//! osm_quality indicators
//! osm_quality topics
//! ```
//!
//! The output is a GeoJSON feature collection mirroring the input, with
//! the indicator results attached to each feature's properties.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use osm_quality_client::{validate_inline_series, AggregationClient};
use osm_quality_indicators::{Currentness, IndicatorKey, MappingSaturation};
use osm_quality_models::{get_topic_preset, topic_presets, Topic, TopicData};
use osm_quality_orchestrator::{Config, RunRequest};
use strum::IntoEnumIterator as _;

#[derive(Parser)]
#[command(name = "osm_quality", about = "Data-quality indicators for OpenStreetMap")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an indicator over an area of interest
    Run {
        /// Indicator key, e.g. mapping-saturation
        indicator: String,
        /// Key of a built-in topic preset
        #[arg(long, conflicts_with = "topic_file")]
        topic: Option<String>,
        /// Path to a JSON file with a custom topic and attached data
        #[arg(long)]
        topic_file: Option<PathBuf>,
        /// Path to a GeoJSON file with the area(s) of interest
        #[arg(long)]
        aoi: PathBuf,
        /// Write the output here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        /// Skip figure creation
        #[arg(long)]
        no_figure: bool,
        /// Attach the raw series and model data to each feature
        #[arg(long)]
        include_data: bool,
    },
    /// List the available indicators
    Indicators,
    /// List the built-in topic presets
    Topics,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_logger(config.log_level.as_deref());

    match cli.command {
        Commands::Run {
            indicator,
            topic,
            topic_file,
            aoi,
            out,
            no_figure,
            include_data,
        } => {
            let indicator: IndicatorKey = indicator.parse().map_err(|_| {
                let known = IndicatorKey::iter()
                    .map(|k| k.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("unknown indicator '{indicator}' (available: {known})")
            })?;
            let topic = resolve_topic(topic.as_deref(), topic_file.as_deref())?;
            let collection = read_collection(&aoi)?;

            let client = AggregationClient::new(&config.base_url, &config.user_agent)?;
            let mut request = RunRequest::new(indicator, topic, collection);
            request.include_figure = !no_figure;
            request.include_data = include_data;

            let output = osm_quality_orchestrator::run(&client, &config, request).await?;
            let rendered = serde_json::to_string_pretty(&output)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)?;
                    log::info!("wrote {}", path.display());
                }
                None => println!("{rendered}"),
            }
        }
        Commands::Indicators => {
            for key in IndicatorKey::iter() {
                let supported = match key {
                    IndicatorKey::MappingSaturation => MappingSaturation::SUPPORTED_AGGREGATIONS,
                    IndicatorKey::Currentness => Currentness::SUPPORTED_AGGREGATIONS,
                };
                let kinds = supported
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("{key} (aggregations: {kinds})");
            }
        }
        Commands::Topics => {
            for preset in topic_presets() {
                println!(
                    "{} - {} ({}/{})",
                    preset.key, preset.name, preset.endpoint, preset.aggregation
                );
            }
        }
    }

    Ok(())
}

fn init_logger(level: Option<&str>) {
    match level {
        Some(level) => {
            let mut builder = pretty_env_logger::formatted_builder();
            builder.parse_filters(level);
            builder.init();
        }
        None => pretty_env_logger::init(),
    }
}

fn resolve_topic(
    key: Option<&str>,
    file: Option<&Path>,
) -> Result<Topic, Box<dyn std::error::Error>> {
    match (key, file) {
        (Some(key), None) => get_topic_preset(key).map(Topic::Preset).ok_or_else(|| {
            let known = topic_presets()
                .into_iter()
                .map(|p| p.key)
                .collect::<Vec<_>>()
                .join(", ");
            format!("unknown topic '{key}' (available: {known})").into()
        }),
        (None, Some(path)) => {
            let text = std::fs::read_to_string(path)?;
            let data: TopicData = serde_json::from_str(&text)?;
            validate_inline_series(&data.data)?;
            Ok(Topic::Data(data))
        }
        _ => Err("exactly one of --topic or --topic-file is required".into()),
    }
}

/// Reads the AOI file; single features and bare geometries are wrapped
/// into a one-feature collection.
fn read_collection(path: &Path) -> Result<geojson::FeatureCollection, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let parsed: geojson::GeoJson = text.parse()?;
    let collection = match parsed {
        geojson::GeoJson::FeatureCollection(collection) => collection,
        geojson::GeoJson::Feature(feature) => geojson::FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        },
        geojson::GeoJson::Geometry(geometry) => geojson::FeatureCollection {
            bbox: None,
            features: vec![geojson::Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: None,
                foreign_members: None,
            }],
            foreign_members: None,
        },
    };
    Ok(collection)
}
