// THEORY:
// This file is the main entry point for the `watermap` library crate. It exposes
// `WatermapPipeline` and its associated data structures (`PipelineConfig`,
// `ExportDocument`, `Sample`, ...) as the high-level interface for turning a feed
// of geolocated water-quality samples into a smoothed bloom-risk grid. The
// projection, mask, accumulator and diffusion internals live in `core_modules`.

pub mod core_modules;
pub mod error;
pub mod ingest;
pub mod parallel_pipeline;
pub mod pipeline;

pub use error::{WatermapError, WatermapResult};
