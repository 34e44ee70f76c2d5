// THEORY:
// The `GridStore` is the owner of every `PixelAccumulator` touched during one
// aggregation run. It is a plain keyed container: the diffusion engine is its
// only writer and the exporter its only reader. Cells are created lazily through `get_or_insert`, so an address that was
// never reached by a water-borne spread simply does not exist in the store.

use crate::core_modules::pixel_accumulator::PixelAccumulator;
use crate::core_modules::projection::projection::PixelAddress;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Mapping from grid address to its accumulator for a single run.
#[derive(Debug, Default)]
pub struct GridStore {
    cells: HashMap<PixelAddress, PixelAccumulator>,
}

impl GridStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the accumulator at `address`, creating an empty one on first touch.
    pub fn get_or_insert(&mut self, address: PixelAddress) -> &mut PixelAccumulator {
        match self.cells.entry(address) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => slot.insert(PixelAccumulator::new(address.px, address.py)),
        }
    }

    pub fn get(&self, address: &PixelAddress) -> Option<&PixelAccumulator> {
        self.cells.get(address)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterates in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&PixelAddress, &PixelAccumulator)> {
        self.cells.iter()
    }
}
