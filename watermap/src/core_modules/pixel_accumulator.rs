// THEORY:
// The `PixelAccumulator` is the stateful unit of the grid. One lives at each
// touched 100 m cell and folds every weighted contribution it receives into a
// running weighted average of the four water metrics, then re-derives the
// bloom-risk indicator from those blended means.
//
// Key principles:
// 1.  **Explicit First Touch**: A fresh accumulator has no means at all (`None`),
//     rather than zeros guarded by a `weight == 0` check. The first update sets the
//     means directly; every later update blends.
// 2.  **Indicator From Means**: The indicator is always computed from the current
//     blended means, never from the incoming sample alone.
// 3.  **No Validation**: Non-finite metrics flow straight into the means. Rejecting
//     them is the ingestion layer's job.

use serde::{Deserialize, Serialize};

/// The four measured water-quality metrics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WaterMetrics {
    pub ph: f64,
    pub turbidity: f64,
    pub tds: f64,
    pub temperature: f64,
}

impl WaterMetrics {
    pub fn new(ph: f64, turbidity: f64, tds: f64, temperature: f64) -> Self {
        Self { ph, turbidity, tds, temperature }
    }

    /// Composite bloom-risk score in [0, 1].
    pub fn bloom_risk_index(&self) -> f64 {
        let temp_score = clamp((self.temperature - 15.0) / 15.0, 0.0, 1.0);
        let turb_score = clamp(self.turbidity / 5.0, 0.0, 1.0);
        let tds_score = clamp(self.tds / 500.0, 0.0, 1.0);
        let ph_score = clamp((self.ph - 7.0) / 2.5, 0.0, 1.0);

        // Summed in this order so a fully saturated sample scores exactly 1.0.
        0.35 * temp_score + 0.20 * tds_score + 0.30 * turb_score + 0.15 * ph_score
    }

    /// Weighted blend of `self` (carrying `old_weight`) with `incoming` (carrying `new_weight`).
    fn blend(&self, old_weight: f64, incoming: &WaterMetrics, new_weight: f64) -> WaterMetrics {
        let total = old_weight + new_weight;
        let mix = |current: f64, value: f64| (current * old_weight + value * new_weight) / total;
        WaterMetrics {
            ph: mix(self.ph, incoming.ph),
            turbidity: mix(self.turbidity, incoming.turbidity),
            tds: mix(self.tds, incoming.tds),
            temperature: mix(self.temperature, incoming.temperature),
        }
    }
}

/// `max(lo, min(hi, v))`; NaN stays NaN.
pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.clamp(lo, hi)
}

/// A running weighted average of water metrics for one grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelAccumulator {
    // --- Identity ---
    pub px: i32,
    pub py: i32,

    // --- Accumulated State ---
    /// Blended means; `None` until the first update.
    means: Option<WaterMetrics>,
    /// Bloom-risk indicator derived from `means`.
    indicator: f64,
    /// Sum of every weight folded in so far.
    weight: f64,
    /// Timestamp carried by the most recent update.
    timestamp: Option<String>,
}

impl PixelAccumulator {
    pub fn new(px: i32, py: i32) -> Self {
        Self {
            px,
            py,
            means: None,
            indicator: 0.0,
            weight: 0.0,
            timestamp: None,
        }
    }

    /// Folds one weighted contribution into the running means.
    pub fn update(&mut self, incoming: &WaterMetrics, weight: f64, timestamp: Option<&str>) {
        let blended = match &self.means {
            None => *incoming,
            Some(current) => current.blend(self.weight, incoming, weight),
        };

        self.indicator = blended.bloom_risk_index();
        self.means = Some(blended);
        self.weight += weight;
        self.timestamp = timestamp.map(str::to_owned);
    }

    pub fn means(&self) -> Option<&WaterMetrics> {
        self.means.as_ref()
    }

    pub fn indicator(&self) -> f64 {
        self.indicator
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }
}
