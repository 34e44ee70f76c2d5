// THEORY:
// The `exporter` turns a finished `GridStore` into the flat, transport-ready output
// document: global metadata plus one record per touched cell, each carrying its
// address, de-projected center, blended means, indicator and cumulative weight.
// Record order follows the store's iteration order and carries no meaning.

use crate::core_modules::grid_store::GridStore;
use crate::core_modules::projection::projection::{PIXEL_SIZE_METERS, to_center};
use crate::error::{WatermapError, WatermapResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One exported grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelRecord {
    pub lat: f64,
    pub lon: f64,
    pub px: i32,
    pub py: i32,
    #[serde(rename = "pH")]
    pub ph: f64,
    pub turbidity: f64,
    pub tds: f64,
    pub temp: f64,
    /// Bloom-risk indicator.
    pub abi: f64,
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// The complete output of one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub pixel_size_meters: u32,
    pub pixel_count: usize,
    pub pixels: Vec<PixelRecord>,
}

impl ExportDocument {
    pub fn to_json_pretty(&self) -> WatermapResult<String> {
        serde_json::to_string_pretty(self).map_err(WatermapError::Export)
    }

    /// Writes the document as pretty JSON, creating parent directories and
    /// replacing any previous file.
    pub fn write_to(&self, path: impl AsRef<Path>) -> WatermapResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_pretty()?)?;
        tracing::info!(path = %path.display(), pixels = self.pixel_count, "wrote export");
        Ok(())
    }
}

/// Shapes every initialized accumulator in `store` into an `ExportDocument`.
pub fn export(store: &GridStore) -> ExportDocument {
    let pixels: Vec<PixelRecord> = store
        .iter()
        .filter_map(|(address, cell)| {
            let means = cell.means()?;
            let (lat, lon) = to_center(*address);
            Some(PixelRecord {
                lat,
                lon,
                px: cell.px,
                py: cell.py,
                ph: means.ph,
                turbidity: means.turbidity,
                tds: means.tds,
                temp: means.temperature,
                abi: cell.indicator(),
                weight: cell.weight(),
                timestamp: cell.timestamp().map(str::to_owned),
            })
        })
        .collect();

    ExportDocument {
        pixel_size_meters: PIXEL_SIZE_METERS,
        pixel_count: pixels.len(),
        pixels,
    }
}
