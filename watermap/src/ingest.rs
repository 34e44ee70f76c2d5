//! Parsing of the sample feed document.
//!
//! The feed is `{"entries": [...]}`. Field names drifted across the sensor
//! firmware and the test generator, so each metric accepts its known aliases.

use crate::core_modules::sample::Sample;
use crate::error::{WatermapError, WatermapResult};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct SampleFeed {
    entries: Vec<FeedEntry>,
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
    lat: f64,
    lon: f64,
    #[serde(rename = "pH", alias = "ph")]
    ph: f64,
    #[serde(alias = "turbidity_v")]
    turbidity: f64,
    tds: f64,
    #[serde(rename = "temp", alias = "temperature", alias = "temperature_c")]
    temperature: f64,
    #[serde(default)]
    timestamp: Option<String>,
}

impl From<FeedEntry> for Sample {
    fn from(entry: FeedEntry) -> Self {
        Sample {
            lat: entry.lat,
            lon: entry.lon,
            ph: entry.ph,
            turbidity: entry.turbidity,
            tds: entry.tds,
            temperature: entry.temperature,
            timestamp: entry.timestamp,
        }
    }
}

/// Parses a feed document held in memory.
pub fn parse_samples(json: &str) -> WatermapResult<Vec<Sample>> {
    let feed: SampleFeed = serde_json::from_str(json).map_err(WatermapError::Input)?;
    Ok(feed.entries.into_iter().map(Sample::from).collect())
}

/// Reads and parses a feed document from disk.
pub fn load_samples(path: impl AsRef<Path>) -> WatermapResult<Vec<Sample>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)?;
    let samples = parse_samples(&raw)?;
    tracing::debug!(path = %path.display(), count = samples.len(), "loaded samples");
    Ok(samples)
}
