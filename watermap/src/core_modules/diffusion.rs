// THEORY:
// The `DiffusionEngine` is the heart of the aggregator. For every sample it grows a
// region outward from the sample's cell by breadth-first region growing, where the
// "cold edge" of the region is a geometric decay of influence rather than a
// value threshold.
//
// Key architectural principles & algorithm steps:
// 1.  **Origin Gate**: The origin cell must be water or the whole call is a no-op.
//     No accumulator is created and nothing is explored.
// 2.  **Level-by-Level Growth**: A FIFO queue walks the 4-connected lattice. The
//     weight at level L is `decay^L`. Because levels are visited in order, the first
//     time a cell is reached is its shortest distance, so it gets the highest weight
//     it could get and is never counted twice within one spread.
// 3.  **Decay Edge**: A branch stops once the next level's weight would drop below
//     `min_weight`. The radius is bounded by `log(min_weight) / log(decay)` levels no
//     matter how large the plane is.
// 4.  **Shorelines**: Land cells never receive value. Whether they still relay the
//     spread is the `LandPolicy`: `PassThrough` lets them consume a level and keep
//     growing, `Block` stops the branch at the shore.
// 5.  **Single Writer**: The engine borrows the run's `GridStore` mutably for the
//     duration of one spread. Samples are folded in strictly one after another.

use crate::core_modules::grid_store::GridStore;
use crate::core_modules::projection::projection::{PixelAddress, max_level};
use crate::core_modules::sample::Sample;
use crate::core_modules::water_mask::WaterOracle;
use crate::error::{WatermapError, WatermapResult};
use crate::pipeline::PipelineConfig;

pub mod diffusion {
    use super::*; // Make parent imports available.
    use std::collections::{HashSet, VecDeque};

    /// What a land cell does to a spread that reaches it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum LandPolicy {
        /// Land consumes a level and relays the spread, without receiving value.
        #[default]
        PassThrough,
        /// Land ends the branch.
        Block,
    }

    /// Spreads samples over a `GridStore`, pruned by a water oracle.
    pub struct DiffusionEngine<'a, O: WaterOracle + ?Sized> {
        oracle: &'a O,
        decay: f64,
        /// Deepest level whose weight still reaches `min_weight`.
        radius: u32,
        land_policy: LandPolicy,
    }

    impl<'a, O: WaterOracle + ?Sized> DiffusionEngine<'a, O> {
        pub fn new(oracle: &'a O, config: &PipelineConfig) -> WatermapResult<Self> {
            if !(config.decay > 0.0 && config.decay < 1.0) {
                return Err(WatermapError::InvalidConfig(format!(
                    "decay must be in (0, 1), got {}",
                    config.decay
                )));
            }
            if !(config.min_weight > 0.0 && config.min_weight <= 1.0) {
                return Err(WatermapError::InvalidConfig(format!(
                    "min_weight must be in (0, 1], got {}",
                    config.min_weight
                )));
            }

            Ok(Self {
                oracle,
                decay: config.decay,
                radius: max_level(config.decay, config.min_weight),
                land_policy: config.land_policy,
            })
        }

        /// Influence of a sample `level` steps away from its origin.
        pub fn weight_at(&self, level: u32) -> f64 {
            self.decay.powi(level as i32)
        }

        /// Number of levels a spread reaches beyond its origin.
        pub fn radius(&self) -> u32 {
            self.radius
        }

        /// Spreads one sample from `origin` into `store`.
        /// Returns `false`, touching nothing, when the origin is land.
        pub fn spread(&self, store: &mut GridStore, origin: PixelAddress, sample: &Sample) -> bool {
            if !self.oracle.is_water_pixel(origin) {
                return false;
            }

            let metrics = sample.metrics();
            let timestamp = sample.timestamp.as_deref();

            let mut visited: HashSet<PixelAddress> = HashSet::from([origin]);
            let mut queue: VecDeque<(PixelAddress, u32)> = VecDeque::from([(origin, 0)]);

            while let Some((current, level)) = queue.pop_front() {
                let weight = self.weight_at(level);

                // The origin was already checked above.
                let is_water = level == 0 || self.oracle.is_water_pixel(current);
                if is_water {
                    store.get_or_insert(current).update(&metrics, weight, timestamp);
                } else if self.land_policy == LandPolicy::Block {
                    continue;
                }

                if level >= self.radius {
                    continue;
                }

                for neighbor in current.neighbors() {
                    if visited.insert(neighbor) {
                        queue.push_back((neighbor, level + 1));
                    }
                }
            }
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::diffusion::*;
    use super::*;
    use crate::core_modules::pixel_accumulator::WaterMetrics;
    use crate::core_modules::projection::projection::{max_level, to_center};

    fn sample_at(address: PixelAddress) -> Sample {
        let (lat, lon) = to_center(address);
        Sample::new(lat, lon, WaterMetrics::new(8.0, 2.0, 100.0, 20.0))
    }

    fn all_water(_lat: f64, _lon: f64) -> bool {
        true
    }

    fn all_land(_lat: f64, _lon: f64) -> bool {
        false
    }

    /// Water everywhere except the column of cells whose centers sit just east of lon 0.
    fn land_column(_lat: f64, lon: f64) -> bool {
        !(lon > 0.0 && lon < 0.0009)
    }

    fn config(decay: f64, land_policy: LandPolicy) -> PipelineConfig {
        PipelineConfig { decay, min_weight: 0.01, land_policy }
    }

    #[test]
    fn open_water_spread_is_a_bounded_diamond() {
        let oracle = all_water;
        let engine = DiffusionEngine::new(&oracle, &PipelineConfig::default()).unwrap();
        let origin = PixelAddress::new(10, -4);
        let mut store = GridStore::new();

        engine.spread(&mut store, origin, &sample_at(origin));

        let radius = max_level(0.5, 0.01);
        assert_eq!(radius, 6);
        // |dx| + |dy| <= r holds 2r(r+1) + 1 cells.
        assert_eq!(store.len(), (2 * radius * (radius + 1) + 1) as usize);

        for (address, cell) in store.iter() {
            let distance = origin.lattice_distance(address);
            assert!(distance <= radius);
            assert!(cell.weight() >= 0.01);
            // First-reached level wins: exactly one contribution at the shortest distance.
            assert_eq!(cell.weight(), 0.5f64.powi(distance as i32));
        }
        assert_eq!(store.get(&origin).unwrap().weight(), 1.0);
    }

    #[test]
    fn slower_decay_reaches_further() {
        let oracle = all_water;
        let engine = DiffusionEngine::new(&oracle, &PipelineConfig::lake()).unwrap();
        let origin = PixelAddress::new(0, 0);
        let mut store = GridStore::new();

        engine.spread(&mut store, origin, &sample_at(origin));

        let radius = max_level(0.8, 0.01);
        assert_eq!(store.len(), (2 * radius * (radius + 1) + 1) as usize);
        assert!(store.get(&PixelAddress::new(radius as i32, 0)).is_some());
        assert!(store.get(&PixelAddress::new(radius as i32 + 1, 0)).is_none());
    }

    #[test]
    fn land_origin_leaves_store_untouched() {
        let oracle = all_land;
        let engine = DiffusionEngine::new(&oracle, &PipelineConfig::default()).unwrap();
        let mut store = GridStore::new();
        let origin = PixelAddress::new(0, 0);

        assert!(!engine.spread(&mut store, origin, &sample_at(origin)));

        assert!(store.is_empty());
    }

    #[test]
    fn land_origin_surrounded_by_water_is_still_a_no_op() {
        let oracle = land_column;
        let engine = DiffusionEngine::new(&oracle, &PipelineConfig::default()).unwrap();
        let mut store = GridStore::new();
        let origin = PixelAddress::new(0, 0);
        assert!(!oracle.is_water_pixel(origin));

        assert!(!engine.spread(&mut store, origin, &sample_at(origin)));

        assert!(store.is_empty());
    }

    #[test]
    fn pass_through_land_relays_but_receives_nothing() {
        let oracle = land_column;
        let engine = DiffusionEngine::new(&oracle, &config(0.5, LandPolicy::PassThrough)).unwrap();
        let origin = PixelAddress::new(-1, 0);
        let mut store = GridStore::new();

        engine.spread(&mut store, origin, &sample_at(origin));

        assert!(store.iter().all(|(address, _)| address.px != 0));
        // Two steps east, across the land column.
        assert_eq!(store.get(&PixelAddress::new(1, 0)).unwrap().weight(), 0.25);
        assert_eq!(store.get(&PixelAddress::new(5, 0)).unwrap().weight(), 0.5f64.powi(6));
    }

    #[test]
    fn blocking_land_stops_the_spread_at_the_shore() {
        let oracle = land_column;
        let engine = DiffusionEngine::new(&oracle, &config(0.5, LandPolicy::Block)).unwrap();
        let origin = PixelAddress::new(-1, 0);
        let mut store = GridStore::new();

        engine.spread(&mut store, origin, &sample_at(origin));

        assert!(store.iter().all(|(address, _)| address.px < 0));
        assert_eq!(store.get(&PixelAddress::new(-7, 0)).unwrap().weight(), 0.5f64.powi(6));
        assert_eq!(store.get(&origin).unwrap().weight(), 1.0);
    }

    #[test]
    fn consecutive_samples_blend_in_shared_cells() {
        let oracle = all_water;
        let engine = DiffusionEngine::new(&oracle, &PipelineConfig::default()).unwrap();
        let mut store = GridStore::new();

        let a = PixelAddress::new(0, 0);
        let b = PixelAddress::new(2, 0);
        let warm = sample_at(a);
        let mut cold = sample_at(b);
        cold.temperature = 5.0;

        engine.spread(&mut store, a, &warm);
        engine.spread(&mut store, b, &cold);

        let at_a = store.get(&a).unwrap();
        // 1.0 from its own sample, 0.25 from the one two cells away.
        assert_eq!(at_a.weight(), 1.25);
        let expected = (20.0 * 1.0 + 5.0 * 0.25) / 1.25;
        assert!((at_a.means().unwrap().temperature - expected).abs() < 1e-12);

        let midway = store.get(&PixelAddress::new(1, 0)).unwrap();
        assert_eq!(midway.weight(), 1.0);
        assert!((midway.means().unwrap().temperature - 12.5).abs() < 1e-12);
    }

    #[test]
    fn timestamps_follow_the_latest_spread() {
        let oracle = all_water;
        let engine = DiffusionEngine::new(&oracle, &PipelineConfig::default()).unwrap();
        let mut store = GridStore::new();
        let origin = PixelAddress::new(0, 0);

        engine.spread(&mut store, origin, &sample_at(origin).with_timestamp("2025-12-22T00:00:00Z"));
        engine.spread(&mut store, origin, &sample_at(origin).with_timestamp("2025-12-22T00:30:00Z"));

        let edge = store.get(&PixelAddress::new(0, 6)).unwrap();
        assert_eq!(edge.timestamp(), Some("2025-12-22T00:30:00Z"));
    }

    #[test]
    fn radius_is_the_last_level_above_the_floor() {
        let oracle = all_water;
        for (decay, min_weight, radius) in [(0.5, 0.01, 6), (0.8, 0.01, 20), (0.5, 0.25, 2), (0.5, 1.0, 0)] {
            let config = PipelineConfig { decay, min_weight, land_policy: LandPolicy::PassThrough };
            let engine = DiffusionEngine::new(&oracle, &config).unwrap();
            assert_eq!(engine.radius(), radius);
            assert!(engine.weight_at(radius) >= min_weight);
            assert!(engine.weight_at(radius + 1) < min_weight);
        }
    }

    #[test]
    fn floor_of_one_touches_only_the_origin() {
        let oracle = all_water;
        let config = PipelineConfig { min_weight: 1.0, ..PipelineConfig::default() };
        let engine = DiffusionEngine::new(&oracle, &config).unwrap();
        let mut store = GridStore::new();
        let origin = PixelAddress::new(3, 3);

        assert!(engine.spread(&mut store, origin, &sample_at(origin)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn rejects_unbounded_decay() {
        let oracle = all_water;
        assert!(DiffusionEngine::new(&oracle, &config(1.0, LandPolicy::PassThrough)).is_err());
        assert!(DiffusionEngine::new(&oracle, &config(0.0, LandPolicy::PassThrough)).is_err());
        let zero_floor = PipelineConfig { min_weight: 0.0, ..PipelineConfig::default() };
        assert!(DiffusionEngine::new(&oracle, &zero_floor).is_err());
    }

    #[test]
    fn works_through_a_trait_object() {
        let oracle: Box<dyn WaterOracle> = Box::new(all_water);
        let engine = DiffusionEngine::new(&*oracle, &PipelineConfig::default()).unwrap();
        let mut store = GridStore::new();
        let origin = PixelAddress::new(0, 0);
        engine.spread(&mut store, origin, &sample_at(origin));
        assert_eq!(store.len(), 85);
    }
}
