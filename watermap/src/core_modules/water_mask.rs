// THEORY:
// The `water_mask` module answers a single question for the diffusion engine: is
// this point on the globe over water? It is the pruning oracle for the spread.
//
// Key principles:
// 1.  **Oracle Seam**: The engine only sees the `WaterOracle` trait. The production
//     oracle is `WaterMask`, a global equirectangular grayscale raster, but any
//     `Fn(lat, lon) -> bool` also works, which keeps shoreline scenarios testable
//     at 100 m resolution without a planet-sized image.
// 2.  **Load Once, Read Forever**: A `WaterMask` is built from an image exactly once
//     and is immutable afterwards. Whoever owns the service decides its lifetime and
//     shares it behind an `Arc`; lookups are plain O(1) reads, safe from any thread.
// 3.  **Bounds Are Land**: Coordinates outside [-90, 90] x [-180, 180], or ones that
//     map outside the raster, are simply "not water". Nothing here can fail after
//     construction.

use crate::core_modules::projection::projection::{PixelAddress, to_center};
use crate::error::{WatermapError, WatermapResult};
use image::{GrayImage, Luma};
use std::path::Path;

/// Raster values strictly above this are water.
pub const WATER_THRESHOLD: u8 = 128;

/// Anything that can classify a geographic coordinate as water or land.
pub trait WaterOracle: Send + Sync {
    fn is_water(&self, lat: f64, lon: f64) -> bool;

    /// Classifies a grid cell by its center coordinate.
    fn is_water_pixel(&self, address: PixelAddress) -> bool {
        let (lat, lon) = to_center(address);
        self.is_water(lat, lon)
    }
}

impl<F> WaterOracle for F
where
    F: Fn(f64, f64) -> bool + Send + Sync,
{
    fn is_water(&self, lat: f64, lon: f64) -> bool {
        self(lat, lon)
    }
}

/// An immutable global water/land raster in equirectangular layout.
#[derive(Debug, Clone)]
pub struct WaterMask {
    raster: GrayImage,
}

impl WaterMask {
    /// Wraps an already-decoded single-channel raster.
    pub fn from_image(raster: GrayImage) -> WatermapResult<Self> {
        if raster.width() == 0 || raster.height() == 0 {
            return Err(WatermapError::EmptyMask);
        }
        Ok(Self { raster })
    }

    /// Decodes a mask image from disk, keeping channel 0 of whatever color type it has.
    pub fn load(path: impl AsRef<Path>) -> WatermapResult<Self> {
        let path = path.as_ref();
        let decoded = image::open(path).map_err(|source| WatermapError::MaskLoad {
            path: path.to_path_buf(),
            source,
        })?;

        let raster = match decoded {
            image::DynamicImage::ImageLuma8(gray) => gray,
            other => {
                let rgba = other.to_rgba8();
                GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
                    Luma([rgba.get_pixel(x, y)[0]])
                })
            }
        };

        let mask = Self::from_image(raster)?;
        tracing::info!(
            path = %path.display(),
            width = mask.width(),
            height = mask.height(),
            "loaded water mask"
        );
        if mask.width() < 360 || mask.height() < 180 {
            tracing::warn!("water mask is coarser than one degree per raster pixel");
        }
        Ok(mask)
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    /// Maps a coordinate to its raster pixel, or `None` when it falls outside.
    fn raster_position(&self, lat: f64, lon: f64) -> Option<(u32, u32)> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return None;
        }

        let width = self.raster.width() as f64;
        let height = self.raster.height() as f64;
        let x = ((lon + 180.0) / 360.0 * width).floor();
        let y = ((90.0 - lat) / 180.0 * height).floor();

        if x < 0.0 || x >= width || y < 0.0 || y >= height {
            return None;
        }
        Some((x as u32, y as u32))
    }
}

impl WaterOracle for WaterMask {
    fn is_water(&self, lat: f64, lon: f64) -> bool {
        match self.raster_position(lat, lon) {
            Some((x, y)) => self.raster.get_pixel(x, y)[0] > WATER_THRESHOLD,
            None => false,
        }
    }
}
