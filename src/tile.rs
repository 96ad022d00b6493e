use std::{f64::consts::PI, fmt};

/// Highest zoom level whose tile indices still fit comfortably into a `u32`.
pub const MAX_ZOOM: u8 = 30;

/// A slippy-map tile with x, y and z-coordinate.
/// ref: https://wiki.openstreetmap.org/wiki/Slippy_map_tilenames
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Tile {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl Tile {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Computes the tile containing the given point (in degrees) at `zoom`.
    ///
    /// See [`lat_lng_to_tile`]. Zoom levels above [`MAX_ZOOM`] saturate.
    pub fn from_lat_lng(lat: f64, lng: f64, zoom: u8) -> Self {
        let zoom = zoom.min(MAX_ZOOM);
        let (x, y) = lat_lng_to_tile(lat, lng, zoom);
        Self::new(x, y, zoom)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Number of tiles along one axis at `zoom`, i.e. `2^zoom`. Zoom levels
/// above [`MAX_ZOOM`] count as `MAX_ZOOM`.
pub fn tile_count_per_axis(zoom: u8) -> u32 {
    1u32 << zoom.min(MAX_ZOOM)
}

/// Maps a point given in degrees to Web Mercator tile indices at `zoom`.
///
/// Both indices are clamped into `[0, 2^zoom - 1]`. Points outside the
/// projection's valid range (e.g. latitudes beyond ±85.0511°, or the poles
/// themselves) land on the nearest edge tile instead of producing garbage.
/// Zoom levels above [`MAX_ZOOM`] are treated as `MAX_ZOOM`.
///
/// # Example
/// ```rust
/// # use mosaic_tile_downloader::lat_lng_to_tile;
/// assert_eq!(lat_lng_to_tile(50.7929, 6.0402, 18), (135470, 87999));
/// ```
pub fn lat_lng_to_tile(lat: f64, lng: f64, zoom: u8) -> (u32, u32) {
    let count = tile_count_per_axis(zoom);
    let n = f64::from(count);

    let x = (lng + 180_f64) / 360_f64 * n;

    let lat_rad = lat * PI / 180_f64;
    let y = (1_f64 - (lat_rad.tan() + 1_f64 / lat_rad.cos()).ln() / PI) / 2_f64 * n;

    // ln() of a negative number is NaN once the latitude leaves [-90, 90]
    let y = if y.is_nan() {
        if lat > 0_f64 {
            0_f64
        } else {
            n
        }
    } else {
        y
    };

    (clamp_index(x, count), clamp_index(y, count))
}

fn clamp_index(value: f64, count: u32) -> u32 {
    let max = count - 1;

    if value.is_nan() || value <= 0_f64 {
        0
    } else if value >= f64::from(max) {
        // covers +inf and exactly-on-the-eastern/southern-edge values
        value.floor().min(f64::from(max)) as u32
    } else {
        value.floor() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_index() {
        let tile = Tile::from_lat_lng(50.7929, 6.0402, 18);
        assert_eq!((tile.x, tile.y), (135470, 87999));
    }

    #[test]
    fn zoom_zero_is_single_tile() {
        assert_eq!(lat_lng_to_tile(45.0, 90.0, 0), (0, 0));
        assert_eq!(lat_lng_to_tile(-45.0, -90.0, 0), (0, 0));
    }

    #[test]
    fn western_edge() {
        for z in 0..=MAX_ZOOM {
            assert_eq!(lat_lng_to_tile(0.0, -180.0, z).0, 0);
        }
    }

    #[test]
    fn eastern_and_northern_edges_clamp() {
        for z in 0..=16 {
            let max = tile_count_per_axis(z) - 1;
            assert_eq!(lat_lng_to_tile(85.0511, 180.0, z), (max, 0));
        }
    }

    #[test]
    fn out_of_range_latitudes_clamp() {
        let max = tile_count_per_axis(10) - 1;
        assert_eq!(lat_lng_to_tile(90.0, 0.0, 10).1, 0);
        assert_eq!(lat_lng_to_tile(89.9, 0.0, 10).1, 0);
        assert_eq!(lat_lng_to_tile(120.0, 0.0, 10).1, 0);
        assert_eq!(lat_lng_to_tile(-90.0, 0.0, 10).1, max);
        assert_eq!(lat_lng_to_tile(-120.0, 0.0, 10).1, max);
    }

    #[test]
    fn out_of_range_longitudes_clamp() {
        let max = tile_count_per_axis(4) - 1;
        assert_eq!(lat_lng_to_tile(0.0, -200.0, 4).0, 0);
        assert_eq!(lat_lng_to_tile(0.0, 400.0, 4).0, max);
        assert_eq!(lat_lng_to_tile(0.0, f64::NAN, 4).0, 0);
    }

    #[test]
    fn indices_stay_in_range() {
        let lats = [-100.0, -85.06, -45.0, 0.0, 33.3, 85.05, 100.0];
        let lngs = [-190.0, -180.0, -0.5, 0.0, 179.99, 180.0, 270.0];

        for z in [0u8, 1, 5, 12, 19] {
            let count = tile_count_per_axis(z);
            for &lat in &lats {
                for &lng in &lngs {
                    let (x, y) = lat_lng_to_tile(lat, lng, z);
                    assert!(x < count && y < count, "{} {} {}", lat, lng, z);
                }
            }
        }
    }

    #[test]
    fn zoom_saturates() {
        assert_eq!(tile_count_per_axis(31), tile_count_per_axis(MAX_ZOOM));
        assert_eq!(
            lat_lng_to_tile(50.7929, 6.0402, u8::MAX),
            lat_lng_to_tile(50.7929, 6.0402, MAX_ZOOM)
        );

        let tile = Tile::from_lat_lng(-33.9, 151.2, 40);
        assert_eq!(tile.z, MAX_ZOOM);
        assert!(tile.x < tile_count_per_axis(MAX_ZOOM));
    }

    #[test]
    fn display_is_path_order() {
        assert_eq!(Tile::new(3, 5, 7).to_string(), "7/3/5");
    }
}
