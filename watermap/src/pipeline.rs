// THEORY:
// The `pipeline` module is the top-level API for one aggregation run. It takes a
// batch of samples and a shared water oracle and hands back a finished export
// document, hiding the projector, the engine and the grid store behind a single call.
//
// A run is strictly sequential: each sample is projected to its origin cell and
// spread into a `GridStore` that the run creates and owns. The store never escapes a
// run that failed; callers only ever see a complete document.

use crate::core_modules::diffusion::diffusion::DiffusionEngine;
use crate::core_modules::exporter;
use crate::core_modules::grid_store::GridStore;
use crate::core_modules::water_mask::WaterOracle;
use crate::error::WatermapResult;
use std::sync::Arc;

// Re-export key data structures for the public API.
pub use crate::core_modules::diffusion::diffusion::LandPolicy;
pub use crate::core_modules::exporter::{ExportDocument, PixelRecord};
pub use crate::core_modules::pixel_accumulator::WaterMetrics;
pub use crate::core_modules::projection::projection::{PIXEL_SIZE_METERS, PixelAddress};
pub use crate::core_modules::sample::Sample;
pub use crate::core_modules::water_mask::WaterMask;

const DEFAULT_DECAY: f64 = 0.5;
const LAKE_DECAY: f64 = 0.8;
const DEFAULT_MIN_WEIGHT: f64 = 0.01;

/// Tunable behavior of the diffusion step.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Per-level multiplicative weight falloff, in (0, 1).
    pub decay: f64,
    /// Contributions below this weight are pruned, in (0, 1].
    pub min_weight: f64,
    pub land_policy: LandPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            decay: DEFAULT_DECAY,
            min_weight: DEFAULT_MIN_WEIGHT,
            land_policy: LandPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Wider smoothing used for large lakes.
    pub fn lake() -> Self {
        Self::with_decay(LAKE_DECAY)
    }

    pub fn with_decay(decay: f64) -> Self {
        Self { decay, ..Self::default() }
    }
}

/// Counters from the last completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub samples: usize,
    pub samples_on_land: usize,
    pub pixels: usize,
}

/// Runs aggregations against one shared water oracle.
#[derive(Clone)]
pub struct WatermapPipeline {
    oracle: Arc<dyn WaterOracle>,
    config: PipelineConfig,
}

impl WatermapPipeline {
    pub fn new(oracle: Arc<dyn WaterOracle>, config: PipelineConfig) -> WatermapResult<Self> {
        // Validate once up front so a bad config fails at startup.
        DiffusionEngine::new(oracle.as_ref(), &config)?;
        Ok(Self { oracle, config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Folds every sample, in order, into a fresh grid store.
    pub fn aggregate(&self, samples: &[Sample]) -> WatermapResult<(GridStore, RunSummary)> {
        let engine = DiffusionEngine::new(self.oracle.as_ref(), &self.config)?;
        let mut store = GridStore::new();
        let mut summary = RunSummary { samples: samples.len(), ..RunSummary::default() };

        for sample in samples {
            if !engine.spread(&mut store, sample.origin(), sample) {
                summary.samples_on_land += 1;
                tracing::debug!(lat = sample.lat, lon = sample.lon, "sample origin is on land, skipped");
            }
        }

        summary.pixels = store.len();
        tracing::info!(
            samples = summary.samples,
            on_land = summary.samples_on_land,
            pixels = summary.pixels,
            decay = self.config.decay,
            "aggregation run complete"
        );
        Ok((store, summary))
    }

    /// One complete run: aggregate, then export.
    pub fn run(&self, samples: &[Sample]) -> WatermapResult<ExportDocument> {
        let (store, _) = self.aggregate(samples)?;
        Ok(exporter::export(&store))
    }
}
