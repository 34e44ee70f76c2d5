pub mod diffusion;
pub mod exporter;
pub mod grid_store;
pub mod pixel_accumulator;
pub mod projection;
pub mod sample;
pub mod water_mask;
