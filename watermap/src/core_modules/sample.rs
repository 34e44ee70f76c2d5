use crate::core_modules::pixel_accumulator::WaterMetrics;
use crate::core_modules::projection::projection::{PixelAddress, to_pixel};

/// One geolocated water-quality reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub lat: f64,
    pub lon: f64,
    pub ph: f64,
    pub turbidity: f64,
    pub tds: f64,
    pub temperature: f64,
    pub timestamp: Option<String>,
}

impl Sample {
    pub fn new(lat: f64, lon: f64, metrics: WaterMetrics) -> Self {
        Self {
            lat,
            lon,
            ph: metrics.ph,
            turbidity: metrics.turbidity,
            tds: metrics.tds,
            temperature: metrics.temperature,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn metrics(&self) -> WaterMetrics {
        WaterMetrics::new(self.ph, self.turbidity, self.tds, self.temperature)
    }

    /// The grid cell this sample falls in.
    pub fn origin(&self) -> PixelAddress {
        to_pixel(self.lat, self.lon)
    }
}
