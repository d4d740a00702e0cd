//! Types de données pour le crate wkt-esri

use geo::Geometry;
use serde::{Deserialize, Serialize};

/// Type de géométrie d'une couche cible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    /// Table sans géométrie
    #[default]
    None,
    Point,
    Polyline,
    Polygon,
}

impl GeometryKind {
    /// Convertit un `geometryType` Esri (`esriGeometryPolygon`, ...)
    pub fn from_esri(geometry_type: &str) -> Self {
        match geometry_type {
            "esriGeometryPoint" => GeometryKind::Point,
            "esriGeometryPolyline" => GeometryKind::Polyline,
            "esriGeometryPolygon" => GeometryKind::Polygon,
            _ => GeometryKind::None,
        }
    }

    pub fn is_none(self) -> bool {
        self == GeometryKind::None
    }
}

/// Référence spatiale d'une couche (identifiant historique + identifiant standard)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpatialReference {
    /// Identifiant historique (ex: 102729)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wkid: Option<u32>,

    /// Identifiant standard EPSG (ex: 2272)
    #[serde(
        default,
        rename = "latestWkid",
        skip_serializing_if = "Option::is_none"
    )]
    pub latest_wkid: Option<u32>,
}

impl SpatialReference {
    pub fn new(wkid: Option<u32>, latest_wkid: Option<u32>) -> Self {
        Self { wkid, latest_wkid }
    }

    /// Référence construite depuis un code EPSG unique
    pub fn from_epsg(epsg: u32) -> Self {
        Self {
            wkid: Some(epsg),
            latest_wkid: Some(epsg),
        }
    }

    /// Code EPSG utilisable pour la reprojection (standard en priorité)
    pub fn epsg(&self) -> Option<u32> {
        self.latest_wkid.or(self.wkid)
    }
}

/// Types WKT reconnus par le parseur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WktType {
    Point,
    LineString,
    Polygon,
    MultiPolygon,
}

/// Géométrie (E)WKT parsée
#[derive(Debug, Clone)]
pub struct ParsedWkt {
    /// SRID embarqué dans la cellule (`SRID=<n>;`)
    pub srid: Option<u32>,

    /// Type détecté
    pub wkt_type: WktType,

    /// Géométrie `geo`
    pub geometry: Geometry,
}
