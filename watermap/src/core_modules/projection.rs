// THEORY:
// The `projection` module is the lowest layer of the aggregator. It owns the only
// piece of geodesy in the system: a flat, local equirectangular approximation that
// turns degrees into meters and meters into fixed 100 m square cells.
//
// Key principles:
// 1.  **Pixel Addressing**: A cell is addressed by a signed integer pair (px, py).
//     px grows eastward, py grows northward. Nothing here knows about the mask or
//     the accumulators.
// 2.  **Center Round Trip**: `to_center` de-projects the longitude with the cosine
//     of the *center latitude*, not the latitude of whatever sample landed in the
//     cell. That is what makes `to_pixel(to_center(p)) == p` hold.
// 3.  **No Failure Modes**: Every finite input produces an address. Out-of-range
//     degrees just produce degenerate addresses; near the poles the cosine goes to
//     zero and longitudes blow up. Both are accepted.

pub mod projection {
    /// Side length of one grid cell, in meters.
    pub const PIXEL_SIZE_METERS: u32 = 100;

    /// Meters per degree of latitude (and of longitude at the equator).
    pub const METERS_PER_DEGREE: f64 = 111_320.0;

    /// The integer address of one cell in the local planar grid.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct PixelAddress {
        pub px: i32,
        pub py: i32,
    }

    impl PixelAddress {
        pub fn new(px: i32, py: i32) -> Self {
            Self { px, py }
        }

        /// The four axis-aligned neighbors: west, east, south, north.
        pub fn neighbors(&self) -> [PixelAddress; 4] {
            [
                PixelAddress::new(self.px - 1, self.py),
                PixelAddress::new(self.px + 1, self.py),
                PixelAddress::new(self.px, self.py - 1),
                PixelAddress::new(self.px, self.py + 1),
            ]
        }

        /// Manhattan distance in cells, i.e. the BFS level at which `other` is first reached.
        #[cfg(test)]
        pub fn lattice_distance(&self, other: &PixelAddress) -> u32 {
            self.px.abs_diff(other.px) + self.py.abs_diff(other.py)
        }
    }

    /// Projects a geographic coordinate (degrees) onto its containing cell.
    pub fn to_pixel(lat: f64, lon: f64) -> PixelAddress {
        let pixel_size = PIXEL_SIZE_METERS as f64;
        let lat_meters = lat * METERS_PER_DEGREE;
        let lon_meters = lon * METERS_PER_DEGREE * lat.to_radians().cos();

        PixelAddress {
            px: (lon_meters / pixel_size).floor() as i32,
            py: (lat_meters / pixel_size).floor() as i32,
        }
    }

    /// Returns the (lat, lon) of the center of a cell.
    pub fn to_center(address: PixelAddress) -> (f64, f64) {
        let pixel_size = PIXEL_SIZE_METERS as f64;
        let center_lat = (address.py as f64 + 0.5) * pixel_size / METERS_PER_DEGREE;
        // Uses the center latitude's cosine; see module notes.
        let center_lon = (address.px as f64 + 0.5) * pixel_size
            / (METERS_PER_DEGREE * center_lat.to_radians().cos());
        (center_lat, center_lon)
    }

    /// Deepest BFS level whose weight `decay^level` is still at least `min_weight`.
    pub fn max_level(decay: f64, min_weight: f64) -> u32 {
        if !(decay > 0.0 && decay < 1.0) || !(min_weight > 0.0 && min_weight <= 1.0) {
            return 0;
        }
        let mut level = (min_weight.ln() / decay.ln()).floor() as u32;
        // Guard the floor against ln rounding on either side of an exact power.
        while decay.powi(level as i32 + 1) >= min_weight {
            level += 1;
        }
        while level > 0 && decay.powi(level as i32) < min_weight {
            level -= 1;
        }
        level
    }
}

#[cfg(test)]
mod tests {
    use super::projection::*;

    #[test]
    fn origin_maps_to_zero_cell() {
        assert_eq!(to_pixel(0.0, 0.0), PixelAddress::new(0, 0));
        assert_eq!(to_pixel(-0.0001, -0.0001), PixelAddress::new(-1, -1));
    }

    #[test]
    fn projects_with_latitude_cosine() {
        // 1 km north, and 1 km east at 60 degrees where a degree of longitude is half as long.
        let lat = 60.0;
        let lon_step = 1_000.0 / (METERS_PER_DEGREE * 0.5);
        let base = to_pixel(lat, 0.0);
        let east = to_pixel(lat, lon_step + 1e-9);
        assert_eq!(base.px, 0);
        assert_eq!(east.px, 10);
    }

    #[test]
    fn center_round_trips_to_same_cell() {
        for px in [-5_000, -731, -1, 0, 1, 42, 9_999] {
            for py in [-40_000, -3, -1, 0, 1, 17, 45_000] {
                let address = PixelAddress::new(px, py);
                let (lat, lon) = to_center(address);
                assert_eq!(to_pixel(lat, lon), address, "round trip failed for {:?}", address);
            }
        }
    }

    #[test]
    fn center_lies_inside_the_cell() {
        let (lat, lon) = to_center(PixelAddress::new(0, 0));
        assert!(lat > 0.0 && lat < PIXEL_SIZE_METERS as f64 / METERS_PER_DEGREE);
        assert!(lon > 0.0);
    }

    #[test]
    fn out_of_range_degrees_still_produce_an_address() {
        let address = to_pixel(123.0, 400.0);
        assert_eq!(address.py, (123.0 * METERS_PER_DEGREE / 100.0).floor() as i32);
    }

    #[test]
    fn neighbors_are_one_step_away() {
        let origin = PixelAddress::new(3, -2);
        for n in origin.neighbors() {
            assert_eq!(origin.lattice_distance(&n), 1);
        }
    }

    #[test]
    fn max_level_for_default_tuning() {
        // 0.5^6 = 0.015625 contributes, 0.5^7 = 0.0078125 does not.
        assert_eq!(max_level(0.5, 0.01), 6);
        // 0.8^20 ~= 0.0115, 0.8^21 ~= 0.0092
        assert_eq!(max_level(0.8, 0.01), 20);
        assert_eq!(max_level(0.5, 0.25), 2);
        assert_eq!(max_level(1.5, 0.01), 0);
    }
}
