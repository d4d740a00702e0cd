//! Géométrie normalisée et sérialisation au format JSON Esri
//!
//! Le service cible exige une forme vide explicite plutôt qu'un champ absent:
//! un point vide est sérialisé `{"x":"NaN","y":"NaN"}`, une polyligne vide
//! `{"paths":[]}` et un polygone vide `{"rings":[]}`.

use geo::{Coord, Geometry, LineString, Polygon};
use serde_json::{json, Map, Value};

use crate::types::{GeometryKind, SpatialReference};

/// Géométrie prête à être envoyée au service
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Point { x: f64, y: f64 },
    Polyline { paths: Vec<Vec<[f64; 2]>> },
    Polygon { rings: Vec<Vec<[f64; 2]>> },
}

impl Shape {
    /// Forme vide correspondant au type de la couche
    ///
    /// Retourne `None` pour une couche sans géométrie.
    pub fn empty(kind: GeometryKind) -> Option<Self> {
        match kind {
            GeometryKind::Point => Some(Shape::Point {
                x: f64::NAN,
                y: f64::NAN,
            }),
            GeometryKind::Polyline => Some(Shape::Polyline { paths: Vec::new() }),
            GeometryKind::Polygon => Some(Shape::Polygon { rings: Vec::new() }),
            GeometryKind::None => None,
        }
    }

    /// Convertit une géométrie `geo`
    ///
    /// Un MULTIPOLYGON produit une liste plate d'anneaux (un par anneau de
    /// chaque polygone membre), sans distinction extérieur/trou.
    pub fn from_geometry(geom: &Geometry) -> Option<Self> {
        match geom {
            Geometry::Point(p) => Some(Shape::Point { x: p.x(), y: p.y() }),
            Geometry::LineString(ls) => Some(Shape::Polyline {
                paths: vec![path(ls)],
            }),
            Geometry::MultiLineString(mls) => Some(Shape::Polyline {
                paths: mls.0.iter().map(path).collect(),
            }),
            Geometry::Polygon(p) => Some(Shape::Polygon { rings: rings(p) }),
            Geometry::MultiPolygon(mp) => Some(Shape::Polygon {
                rings: mp.0.iter().flat_map(rings).collect(),
            }),
            _ => None,
        }
    }

    /// Indique si la forme est la sentinelle vide
    pub fn is_empty(&self) -> bool {
        match self {
            Shape::Point { x, y } => x.is_nan() && y.is_nan(),
            Shape::Polyline { paths } => paths.is_empty(),
            Shape::Polygon { rings } => rings.is_empty(),
        }
    }

    /// Type de couche correspondant à la forme
    pub fn kind(&self) -> GeometryKind {
        match self {
            Shape::Point { .. } => GeometryKind::Point,
            Shape::Polyline { .. } => GeometryKind::Polyline,
            Shape::Polygon { .. } => GeometryKind::Polygon,
        }
    }

    /// Sérialise au format JSON Esri avec la référence spatiale cible
    pub fn to_esri_json(&self, sr: &SpatialReference) -> Value {
        let mut obj = Map::new();

        match self {
            Shape::Point { x, y } => {
                obj.insert("x".into(), number_or_nan(*x));
                obj.insert("y".into(), number_or_nan(*y));
            }
            Shape::Polyline { paths } => {
                obj.insert("paths".into(), json!(paths));
            }
            Shape::Polygon { rings } => {
                obj.insert("rings".into(), json!(rings));
            }
        }

        if sr.wkid.is_some() || sr.latest_wkid.is_some() {
            obj.insert("spatialReference".into(), json!(sr));
        }

        Value::Object(obj)
    }
}

fn path(ls: &LineString) -> Vec<[f64; 2]> {
    ls.0.iter().map(|c: &Coord| [c.x, c.y]).collect()
}

fn rings(p: &Polygon) -> Vec<Vec<[f64; 2]>> {
    std::iter::once(p.exterior())
        .chain(p.interiors().iter())
        .filter(|ring| !ring.0.is_empty())
        .map(path)
        .collect()
}

// serde_json sérialiserait NaN en null
fn number_or_nan(v: f64) -> Value {
    if v.is_nan() {
        Value::String("NaN".to_string())
    } else {
        json!(v)
    }
}
