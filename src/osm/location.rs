use crate::osm::parse::parse_coordinate;

/// Fixed-point coordinates are stored as `degrees * 10^7`.
pub const COORDINATE_PRECISION: i32 = 10_000_000;

const UNDEFINED: i32 = i32::MAX;

/// A geographic position in fixed-point representation.
///
/// `x` holds the first coordinate of an OSM attribute pair (latitude), `y`
/// the second (longitude). A coordinate that could not be parsed keeps the
/// undefined sentinel; the location as a whole is defined only when both
/// coordinates are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    x: i32,
    y: i32,
}

impl Default for Location {
    fn default() -> Self {
        Location {
            x: UNDEFINED,
            y: UNDEFINED,
        }
    }
}

impl Location {
    pub fn undefined() -> Location {
        Location::default()
    }

    pub fn from_raw(x: i32, y: i32) -> Location {
        Location { x, y }
    }

    /// Builds a location from decimal-degree attribute strings.
    pub fn from_degrees(lat: &str, lon: &str) -> Location {
        Location {
            x: parse_coordinate(lat).unwrap_or(UNDEFINED),
            y: parse_coordinate(lon).unwrap_or(UNDEFINED),
        }
    }

    pub fn is_defined(&self) -> bool {
        self.x != UNDEFINED && self.y != UNDEFINED
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn set_x(&mut self, x: Option<i32>) {
        self.x = x.unwrap_or(UNDEFINED);
    }

    pub fn set_y(&mut self, y: Option<i32>) {
        self.y = y.unwrap_or(UNDEFINED);
    }

    pub fn lat(&self) -> f64 {
        f64::from(self.x) / f64::from(COORDINATE_PRECISION)
    }

    pub fn lon(&self) -> f64 {
        f64::from(self.y) / f64::from(COORDINATE_PRECISION)
    }
}

/// Axis-aligned bounding box over two locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    min: Location,
    max: Location,
}

impl BoundingBox {
    pub fn new() -> BoundingBox {
        BoundingBox::default()
    }

    pub fn from_corners(min: Location, max: Location) -> BoundingBox {
        let mut bbox = BoundingBox::new();
        bbox.extend(min);
        bbox.extend(max);
        bbox
    }

    /// Grows the box to include `loc`; undefined locations are ignored.
    pub fn extend(&mut self, loc: Location) -> &mut BoundingBox {
        if !loc.is_defined() {
            return self;
        }
        if !self.min.is_defined() {
            self.min = loc;
            self.max = loc;
        } else {
            self.min.x = self.min.x.min(loc.x);
            self.min.y = self.min.y.min(loc.y);
            self.max.x = self.max.x.max(loc.x);
            self.max.y = self.max.y.max(loc.y);
        }
        self
    }

    pub fn is_defined(&self) -> bool {
        self.min.is_defined()
    }

    pub fn min(&self) -> Location {
        self.min
    }

    pub fn max(&self) -> Location {
        self.max
    }
}
