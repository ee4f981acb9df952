//! Bounding-box and polygon filters plus capacity aggregation.
//!
//! Everything here is a linear scan over an already small working set;
//! no spatial index is built.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::RenewVizError;
use crate::models::GeneratorRecord;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Anything that may carry a position.
pub trait Located {
    fn location(&self) -> Option<GeoPoint>;
}

impl<T: Located + ?Sized> Located for &T {
    fn location(&self) -> Option<GeoPoint> {
        (**self).location()
    }
}

/// Inclusive latitude/longitude rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        in_bounds(point, self.min_lat, self.max_lat, self.min_lon, self.max_lon)
    }
}

pub fn in_bounds(point: GeoPoint, min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> bool {
    (min_lat..=max_lat).contains(&point.lat) && (min_lon..=max_lon).contains(&point.lon)
}

/// Closed ring of at least three vertices. The last vertex connects back to
/// the first; self-intersection is not checked.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<GeoPoint>,
}

impl Polygon {
    pub fn new(vertices: Vec<GeoPoint>) -> Result<Self, RenewVizError> {
        if vertices.len() < 3 {
            return Err(RenewVizError::InvalidGeometry(format!(
                "a polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        if let Some(bad) = vertices
            .iter()
            .find(|v| !v.lat.is_finite() || !v.lon.is_finite())
        {
            return Err(RenewVizError::InvalidGeometry(format!(
                "non-finite vertex {bad:?}"
            )));
        }
        Ok(Self { vertices })
    }

    /// Parses a JSON array of `[lat, lon]` pairs, e.g. `[[30,-100],[40,-100],[40,-90]]`.
    pub fn from_json(coordinates: &str) -> Result<Self, RenewVizError> {
        let pairs: Vec<[f64; 2]> = serde_json::from_str(coordinates).map_err(|e| {
            RenewVizError::InvalidGeometry(format!("coordinates must be [[lat, lon], ...]: {e}"))
        })?;
        Self::new(
            pairs
                .into_iter()
                .map(|[lat, lon]| GeoPoint::new(lat, lon))
                .collect(),
        )
    }

    pub fn vertices(&self) -> &[GeoPoint] {
        &self.vertices
    }

    /// Smallest box holding every vertex.
    pub fn bounding_box(&self) -> BoundingBox {
        let first = self.vertices[0];
        self.vertices.iter().skip(1).fold(
            BoundingBox::new(first.lat, first.lat, first.lon, first.lon),
            |b, v| BoundingBox {
                min_lat: b.min_lat.min(v.lat),
                max_lat: b.max_lat.max(v.lat),
                min_lon: b.min_lon.min(v.lon),
                max_lon: b.max_lon.max(v.lon),
            },
        )
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        in_polygon(point, self)
    }
}

/// Even-odd ray casting along increasing longitude.
///
/// Points exactly on an edge or vertex may land on either side.
pub fn in_polygon(point: GeoPoint, polygon: &Polygon) -> bool {
    let vertices = polygon.vertices();
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (a, b) = (vertices[i], vertices[j]);
        // Straddling guarantees a.lat != b.lat, so the division is safe.
        if (a.lat > point.lat) != (b.lat > point.lat) {
            let crossing_lon = (b.lon - a.lon) * (point.lat - a.lat) / (b.lat - a.lat) + a.lon;
            if point.lon < crossing_lon {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Entities with a location inside `bbox`. Entities without one are dropped.
pub fn filter_by_bounds<T>(entities: impl IntoIterator<Item = T>, bbox: &BoundingBox) -> Vec<T>
where
    T: Located,
{
    entities
        .into_iter()
        .filter(|e| e.location().is_some_and(|p| bbox.contains(p)))
        .collect()
}

/// Entities with a location inside `polygon`.
///
/// The vertex bounding box is checked first to skip the ray cast for far
/// away points; the polygon test alone decides membership.
pub fn filter_by_polygon<T>(entities: impl IntoIterator<Item = T>, polygon: &Polygon) -> Vec<T>
where
    T: Located,
{
    let bbox = polygon.bounding_box();
    entities
        .into_iter()
        .filter(|e| {
            e.location()
                .is_some_and(|p| bbox.contains(p) && polygon.contains(p))
        })
        .collect()
}

/// Count and capacity totals over a set of generators.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateStats {
    pub count: usize,
    pub total_capacity_mw: f64,
    pub capacity_by_source: BTreeMap<String, f64>,
    pub count_by_source: BTreeMap<String, usize>,
}

impl AggregateStats {
    pub fn capacity_of(&self, source: &str) -> f64 {
        self.capacity_by_source.get(source).copied().unwrap_or(0.0)
    }

    pub fn count_of(&self, source: &str) -> usize {
        self.count_by_source.get(source).copied().unwrap_or(0)
    }
}

pub fn summarize<'a>(generators: impl IntoIterator<Item = &'a GeneratorRecord>) -> AggregateStats {
    generators
        .into_iter()
        .fold(AggregateStats::default(), |mut stats, g| {
            stats.count += 1;
            stats.total_capacity_mw += g.nameplate_capacity_mw;
            *stats
                .capacity_by_source
                .entry(g.energy_source.clone())
                .or_insert(0.0) += g.nameplate_capacity_mw;
            *stats
                .count_by_source
                .entry(g.energy_source.clone())
                .or_insert(0) += 1;
            stats
        })
}
