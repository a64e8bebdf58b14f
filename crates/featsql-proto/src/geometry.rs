//! Geometry literals appearing in spatial filter predicates.

use serde::{Deserialize, Serialize};

/// A planar coordinate, serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate(pub f64, pub f64);

impl Coordinate {
    /// Create a coordinate.
    pub fn new(x: f64, y: f64) -> Self {
        Self(x, y)
    }

    fn wkt(&self) -> String {
        format!("{} {}", self.0, self.1)
    }
}

/// A geometry literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Geometry {
    /// A single point.
    Point(Coordinate),
    /// An open or closed line.
    LineString(Vec<Coordinate>),
    /// A polygon given as exterior ring followed by interior rings.
    Polygon(Vec<Vec<Coordinate>>),
    /// A collection of polygons.
    MultiPolygon(Vec<Vec<Vec<Coordinate>>>),
    /// An axis-aligned bounding box. `min_x > max_x` denotes a box crossing
    /// the antimeridian.
    Envelope {
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    },
}

impl Geometry {
    /// Create an envelope.
    pub fn envelope(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Geometry::Envelope {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Closed exterior ring of an axis-aligned rectangle.
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Vec<Coordinate> {
        vec![
            Coordinate(min_x, min_y),
            Coordinate(max_x, min_y),
            Coordinate(max_x, max_y),
            Coordinate(min_x, max_y),
            Coordinate(min_x, min_y),
        ]
    }

    /// Render as well-known text.
    ///
    /// Envelopes render as the equivalent rectangle polygon without any
    /// antimeridian handling; callers that need the split do it before
    /// rendering.
    pub fn to_wkt(&self) -> String {
        match self {
            Geometry::Point(c) => format!("POINT({})", c.wkt()),
            Geometry::LineString(coords) => format!("LINESTRING{}", ring_wkt(coords)),
            Geometry::Polygon(rings) => format!("POLYGON{}", polygon_wkt(rings)),
            Geometry::MultiPolygon(polygons) => {
                let parts: Vec<String> = polygons.iter().map(|p| polygon_wkt(p)).collect();
                format!("MULTIPOLYGON({})", parts.join(","))
            }
            Geometry::Envelope {
                min_x,
                min_y,
                max_x,
                max_y,
            } => format!(
                "POLYGON{}",
                polygon_wkt(&[Self::rectangle(*min_x, *min_y, *max_x, *max_y)])
            ),
        }
    }
}

fn ring_wkt(coords: &[Coordinate]) -> String {
    let parts: Vec<String> = coords.iter().map(Coordinate::wkt).collect();
    format!("({})", parts.join(","))
}

fn polygon_wkt(rings: &[Vec<Coordinate>]) -> String {
    let parts: Vec<String> = rings.iter().map(|r| ring_wkt(r)).collect();
    format!("({})", parts.join(","))
}
