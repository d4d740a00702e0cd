//! Reprojection de géométries avec PROJ
//!
//! La transformation réelle n'est disponible qu'avec le feature `reproject`.
//! Sans lui, seule l'identité (même EPSG des deux côtés) est acceptée.

use geo::Geometry;

use crate::error::SyncError;

#[cfg(feature = "reproject")]
use geo::{Coord, LineString, MultiLineString, MultiPolygon, Point, Polygon};
#[cfg(feature = "reproject")]
use proj::Proj;

/// Reprojection de géométries entre deux systèmes de coordonnées
pub struct Reprojector {
    #[cfg(feature = "reproject")]
    proj: Option<Proj>,
    source_epsg: u32,
    target_epsg: u32,
}

impl Reprojector {
    /// Crée un reprojector entre deux EPSG
    ///
    /// # Errors
    /// `Reprojection` si PROJ ne connaît pas l'un des deux systèmes, ou si
    /// les EPSG diffèrent sans le feature `reproject`.
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self, SyncError> {
        if source_epsg == target_epsg {
            return Ok(Self {
                #[cfg(feature = "reproject")]
                proj: None,
                source_epsg,
                target_epsg,
            });
        }

        #[cfg(feature = "reproject")]
        {
            let source = format!("EPSG:{}", source_epsg);
            let target = format!("EPSG:{}", target_epsg);

            let proj = Proj::new_known_crs(&source, &target, None).map_err(|e| {
                SyncError::Reprojection(format!(
                    "Failed to create projection from {} to {}: {}",
                    source, target, e
                ))
            })?;

            Ok(Self {
                proj: Some(proj),
                source_epsg,
                target_epsg,
            })
        }

        #[cfg(not(feature = "reproject"))]
        Err(SyncError::Reprojection(format!(
            "Reprojection from EPSG:{} to EPSG:{} requires the 'reproject' feature",
            source_epsg, target_epsg
        )))
    }

    pub fn source_epsg(&self) -> u32 {
        self.source_epsg
    }

    pub fn target_epsg(&self) -> u32 {
        self.target_epsg
    }

    pub fn is_identity(&self) -> bool {
        self.source_epsg == self.target_epsg
    }

    /// Transforme une géométrie, point par point, en conservant l'ordre
    pub fn transform_geometry(&self, geom: &Geometry) -> Result<Geometry, SyncError> {
        if self.is_identity() {
            return Ok(geom.clone());
        }

        #[cfg(feature = "reproject")]
        {
            match geom {
                Geometry::Point(p) => {
                    let (x, y) = self.transform_coord(p.0)?;
                    Ok(Geometry::Point(Point::new(x, y)))
                }
                Geometry::LineString(ls) => {
                    Ok(Geometry::LineString(self.transform_linestring(ls)?))
                }
                Geometry::Polygon(p) => Ok(Geometry::Polygon(self.transform_polygon(p)?)),
                Geometry::MultiLineString(mls) => {
                    let lines: Result<Vec<LineString>, SyncError> = mls
                        .0
                        .iter()
                        .map(|ls| self.transform_linestring(ls))
                        .collect();
                    Ok(Geometry::MultiLineString(MultiLineString::new(lines?)))
                }
                Geometry::MultiPolygon(mp) => {
                    let polys: Result<Vec<Polygon>, SyncError> =
                        mp.0.iter().map(|p| self.transform_polygon(p)).collect();
                    Ok(Geometry::MultiPolygon(MultiPolygon::new(polys?)))
                }
                other => Err(SyncError::Reprojection(format!(
                    "Unsupported geometry for reprojection: {:?}",
                    other
                ))),
            }
        }

        #[cfg(not(feature = "reproject"))]
        Ok(geom.clone())
    }

    #[cfg(feature = "reproject")]
    fn proj(&self) -> Result<&Proj, SyncError> {
        self.proj
            .as_ref()
            .ok_or_else(|| SyncError::Reprojection("projection not initialized".into()))
    }

    #[cfg(feature = "reproject")]
    fn transform_coord(&self, coord: Coord) -> Result<(f64, f64), SyncError> {
        self.proj()?
            .convert((coord.x, coord.y))
            .map_err(|e| SyncError::Reprojection(format!("Coordinate transformation failed: {}", e)))
    }

    /// Transformation batch d'une LineString
    #[cfg(feature = "reproject")]
    fn transform_linestring(&self, ls: &LineString) -> Result<LineString, SyncError> {
        let mut coords: Vec<(f64, f64)> = ls.0.iter().map(|c| (c.x, c.y)).collect();

        self.proj()?.convert_array(&mut coords).map_err(|e| {
            SyncError::Reprojection(format!("Batch coordinate transformation failed: {}", e))
        })?;

        Ok(LineString::new(
            coords.into_iter().map(|(x, y)| Coord { x, y }).collect(),
        ))
    }

    #[cfg(feature = "reproject")]
    fn transform_polygon(&self, p: &Polygon) -> Result<Polygon, SyncError> {
        let exterior = self.transform_linestring(p.exterior())?;
        let interiors: Result<Vec<LineString>, SyncError> = p
            .interiors()
            .iter()
            .map(|ls| self.transform_linestring(ls))
            .collect();
        Ok(Polygon::new(exterior, interiors?))
    }
}
