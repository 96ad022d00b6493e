use std::fmt::Debug;

use crate::error::ConfigError;
use crate::tile::{tile_count_per_axis, Tile, MAX_ZOOM};

/// A geographic bounding box given in degrees.
///
/// # Example
/// ```rust
/// # use mosaic_tile_downloader::GeoBox;
/// let aachen_germany = GeoBox::new(50.811, 6.031, 50.7492, 6.1649);
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GeoBox {
    pub north: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
}

impl GeoBox {
    /// Creates a bounding box from its corners, north-west first.
    ///
    /// Nothing is validated here; out-of-range values are clamped when the
    /// box is converted into tiles.
    pub fn new(north: f64, west: f64, south: f64, east: f64) -> Self {
        Self {
            north,
            west,
            south,
            east,
        }
    }

    /// Whether the box spans the antimeridian, which tile ranges can't express.
    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    /// The tile rectangle covering this box at `zoom`.
    ///
    /// Unlike [`geo_box_to_tile_box`], zoom levels above [`MAX_ZOOM`] and
    /// boxes crossing the antimeridian are errors. A box whose north edge
    /// lies south of its south edge yields an empty rectangle.
    pub fn to_tile_box(&self, zoom: u8) -> Result<TileBox, ConfigError> {
        if zoom > MAX_ZOOM {
            return Err(ConfigError::ZoomOutOfRange {
                zoom,
                max: MAX_ZOOM,
            });
        }
        if self.crosses_antimeridian() {
            return Err(ConfigError::AntimeridianSpan {
                west: self.west,
                east: self.east,
            });
        }

        Ok(geo_box_to_tile_box(self, zoom))
    }
}

/// An inclusive rectangle of tile indices at a single zoom level.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TileBox {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
    pub zoom: u8,
}

impl TileBox {
    pub fn new(left: u32, right: u32, top: u32, bottom: u32, zoom: u8) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
            zoom,
        }
    }

    /// Checks that the corners are ordered and lie on the map at `zoom`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.zoom > MAX_ZOOM {
            return Err(ConfigError::ZoomOutOfRange {
                zoom: self.zoom,
                max: MAX_ZOOM,
            });
        }

        let count = tile_count_per_axis(self.zoom);
        if self.right >= count || self.bottom >= count {
            return Err(ConfigError::MalformedTileBox(format!(
                "indices must be below {} at zoom {}",
                count, self.zoom
            )));
        }
        if self.left > self.right {
            return Err(ConfigError::MalformedTileBox(format!(
                "left ({}) is east of right ({})",
                self.left, self.right
            )));
        }
        if self.top > self.bottom {
            return Err(ConfigError::MalformedTileBox(format!(
                "top ({}) is south of bottom ({})",
                self.top, self.bottom
            )));
        }

        Ok(())
    }

    /// Amount of tiles in the box. Inverted boxes are empty.
    pub fn len(&self) -> usize {
        let width = (u64::from(self.right) + 1).saturating_sub(u64::from(self.left));
        let height = (u64::from(self.bottom) + 1).saturating_sub(u64::from(self.top));
        (width * height) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates an iterator over all tiles in the box, both ends inclusive,
    /// column by column.
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + Debug {
        let (top, bottom, zoom) = (self.top, self.bottom, self.zoom);

        (self.left..=self.right)
            .flat_map(move |x| (top..=bottom).map(move |y| Tile::new(x, y, zoom)))
    }
}

/// Converts a geographic box into the tile rectangle covering it at `zoom`.
///
/// The north-west corner yields the top-left tile and the south-east corner
/// the bottom-right tile. Whether the result is a non-empty rectangle is
/// not checked. Zoom levels above [`MAX_ZOOM`] saturate.
pub fn geo_box_to_tile_box(geo: &GeoBox, zoom: u8) -> TileBox {
    let top_left = Tile::from_lat_lng(geo.north, geo.west, zoom);
    let bottom_right = Tile::from_lat_lng(geo.south, geo.east, zoom);

    TileBox::new(
        top_left.x,
        bottom_right.x,
        top_left.y,
        bottom_right.y,
        top_left.z,
    )
}

/// A bounding box fixture containing preset coordinates for a known geographic
/// region (a continent, country, city, etc).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Fixture {
    Usa,
    AachenGermany,
}

impl std::str::FromStr for Fixture {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Fixture::*;

        let s = s.to_lowercase();
        if s.starts_with("us") {
            return Ok(Usa);
        }

        if s.starts_with("aachen") {
            return Ok(AachenGermany);
        }

        Err("unrecognized fixture")
    }
}

impl std::convert::From<Fixture> for GeoBox {
    fn from(fixture: Fixture) -> Self {
        use Fixture::*;

        match fixture {
            Usa => Self::new(49.4325, -125.3321, 23.8991, -65.7421),
            AachenGermany => Self::new(50.811, 6.031, 50.7492, 6.1649),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiles_are_inclusive() {
        let tiles: Vec<_> = TileBox::new(0, 1, 0, 1, 2).tiles().collect();
        assert_eq!(
            tiles,
            vec![
                Tile::new(0, 0, 2),
                Tile::new(0, 1, 2),
                Tile::new(1, 0, 2),
                Tile::new(1, 1, 2),
            ]
        );
    }

    #[test]
    fn len_matches_iteration() {
        let tile_box = TileBox::new(3, 7, 10, 12, 5);
        assert_eq!(tile_box.len(), 15);
        assert_eq!(tile_box.tiles().count(), 15);
    }

    #[test]
    fn inverted_box_is_empty() {
        let tile_box = TileBox::new(5, 4, 0, 0, 3);
        assert!(tile_box.is_empty());
        assert_eq!(tile_box.tiles().count(), 0);
        assert!(matches!(
            tile_box.validate(),
            Err(ConfigError::MalformedTileBox(_))
        ));
    }

    #[test]
    fn validate_rejects_off_map_indices() {
        assert!(TileBox::new(0, 3, 0, 3, 2).validate().is_ok());
        assert!(TileBox::new(0, 4, 0, 3, 2).validate().is_err());
        assert!(matches!(
            TileBox::new(0, 0, 0, 0, 31).validate(),
            Err(ConfigError::ZoomOutOfRange { zoom: 31, .. })
        ));
    }

    #[test]
    fn geo_box_corners() {
        let geo = GeoBox::from(Fixture::AachenGermany);
        let tile_box = geo_box_to_tile_box(&geo, 18);

        assert!(tile_box.left <= 135470 && 135470 <= tile_box.right);
        assert!(tile_box.top <= 87999 && 87999 <= tile_box.bottom);
        assert!(tile_box.validate().is_ok());
    }

    #[test]
    fn whole_world() {
        let geo = GeoBox::new(90.0, -180.0, -90.0, 180.0);
        assert_eq!(geo_box_to_tile_box(&geo, 2), TileBox::new(0, 3, 0, 3, 2));
    }

    #[test]
    fn conversion_saturates_zoom() {
        let geo = GeoBox::new(90.0, -180.0, -90.0, 180.0);
        let tile_box = geo_box_to_tile_box(&geo, 200);

        assert_eq!(tile_box.zoom, MAX_ZOOM);
        assert!(tile_box.validate().is_ok());
    }

    #[test]
    fn checked_conversion() {
        let aachen = GeoBox::from(Fixture::AachenGermany);
        assert_eq!(aachen.to_tile_box(12).unwrap(), geo_box_to_tile_box(&aachen, 12));
        assert!(matches!(
            aachen.to_tile_box(31),
            Err(ConfigError::ZoomOutOfRange { zoom: 31, .. })
        ));

        let pacific = GeoBox::new(10.0, 170.0, 0.0, -170.0);
        assert!(matches!(
            pacific.to_tile_box(4),
            Err(ConfigError::AntimeridianSpan { .. })
        ));

        let upside_down = GeoBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(upside_down.to_tile_box(4).unwrap().is_empty());
    }

    #[test]
    fn fixtures_parse() {
        assert_eq!("USA".parse::<Fixture>(), Ok(Fixture::Usa));
        assert_eq!("aachen".parse::<Fixture>(), Ok(Fixture::AachenGermany));
        assert!("atlantis".parse::<Fixture>().is_err());
        assert!(!GeoBox::from(Fixture::Usa).crosses_antimeridian());
    }
}
