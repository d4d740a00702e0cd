//! Codec géométrique d'un run: parsing (E)WKT, reprojection, sérialisation Esri
//!
//! Un seul SRID source est admis par run: le premier SRID résolu (préfixe de
//! ligne ou SRID de repli) s'impose aux lignes suivantes, et un unique
//! [`Reprojector`] est construit à la première reprojection.

pub mod reproject;

pub use reproject::Reprojector;

use geo::Geometry;
use serde_json::Value;
use tracing::{debug, warn};
use wkt_esri::{validity, GeometryError, GeometryKind, ParsedCell, Shape, SpatialReference};

use crate::error::SyncError;
use crate::schema::TargetSchema;

/// Géométrie parsée avec son SRID résolu
#[derive(Debug, Clone, PartialEq)]
pub struct SourceGeometry {
    pub geometry: Geometry,
    pub srid: u32,
}

/// Codec géométrique lié au schéma cible d'un run
pub struct GeometryCodec {
    kind: GeometryKind,
    target: SpatialReference,
    fallback_srid: Option<u32>,
    run_srid: Option<u32>,
    reprojector: Option<Reprojector>,
    transformers_built: usize,
}

impl GeometryCodec {
    pub fn new(schema: &TargetSchema, fallback_srid: Option<u32>) -> Self {
        Self {
            kind: schema.geometry_kind(),
            target: schema.spatial_reference().unwrap_or_default(),
            fallback_srid,
            run_srid: None,
            reprojector: None,
            transformers_built: 0,
        }
    }

    /// SRID source établi pour le run
    pub fn run_srid(&self) -> Option<u32> {
        self.run_srid
    }

    /// Nombre de transformations construites depuis le début du run
    pub fn transformers_built(&self) -> usize {
        self.transformers_built
    }

    /// Parse une cellule (E)WKT
    ///
    /// Retourne `None` pour une cellule vide ou une géométrie `EMPTY`. Les
    /// défauts de validité sont journalisés sans rejeter la ligne.
    pub fn parse(&mut self, row: usize, cell: &str) -> Result<Option<SourceGeometry>, SyncError> {
        let parsed = match wkt_esri::parse(cell).map_err(|e| SyncError::geometry(row, e))? {
            ParsedCell::Empty { .. } => return Ok(None),
            ParsedCell::Geometry(parsed) => parsed,
        };

        let srid = self.resolve_srid(row, parsed.srid, cell)?;

        for issue in validity::check(&parsed.geometry) {
            warn!(row, srid, %issue, "Invalid geometry submitted as-is");
        }

        Ok(Some(SourceGeometry {
            geometry: parsed.geometry,
            srid,
        }))
    }

    fn resolve_srid(
        &mut self,
        row: usize,
        embedded: Option<u32>,
        cell: &str,
    ) -> Result<u32, SyncError> {
        let srid = match embedded.or(self.fallback_srid).or(self.run_srid) {
            Some(srid) => srid,
            None => {
                return Err(SyncError::geometry(
                    row,
                    GeometryError::MissingSrid(cell.chars().take(40).collect()),
                ))
            }
        };

        match self.run_srid {
            Some(expected) if expected != srid => Err(SyncError::MixedSrid {
                row,
                expected,
                found: srid,
            }),
            Some(_) => Ok(srid),
            None => {
                debug!(row, srid, "Source SRID established for run");
                self.run_srid = Some(srid);
                Ok(srid)
            }
        }
    }

    /// Reprojette vers la référence spatiale de la couche
    ///
    /// Identité quand les SRID coïncident ou quand la couche n'en déclare pas.
    pub fn project(&mut self, source: SourceGeometry) -> Result<SourceGeometry, SyncError> {
        let Some(target_epsg) = self.target.epsg() else {
            return Ok(source);
        };
        if source.srid == target_epsg {
            return Ok(source);
        }

        let stale = self
            .reprojector
            .as_ref()
            .map_or(true, |r| r.source_epsg() != source.srid);
        if stale {
            debug!(from = source.srid, to = target_epsg, "Building coordinate transformation");
            self.reprojector = Some(Reprojector::new(source.srid, target_epsg)?);
            self.transformers_built += 1;
        }

        let reprojector = self
            .reprojector
            .as_ref()
            .ok_or_else(|| SyncError::Reprojection("transformation unavailable".into()))?;

        Ok(SourceGeometry {
            geometry: reprojector.transform_geometry(&source.geometry)?,
            srid: target_epsg,
        })
    }

    /// Sérialise au format JSON Esri
    ///
    /// Sans géométrie, produit la forme vide du type de la couche. Retourne
    /// `None` pour une couche sans géométrie.
    pub fn serialize(
        &self,
        row: usize,
        geometry: Option<&SourceGeometry>,
    ) -> Result<Option<Value>, SyncError> {
        let shape = match geometry {
            Some(source) => Shape::from_geometry(&source.geometry).ok_or_else(|| {
                SyncError::geometry(
                    row,
                    GeometryError::UnsupportedType(format!("{:?}", source.geometry)),
                )
            })?,
            None => match Shape::empty(self.kind) {
                Some(empty) => empty,
                None => return Ok(None),
            },
        };

        if !self.kind.is_none() && shape.kind() != self.kind {
            warn!(row, shape = ?shape.kind(), layer = ?self.kind, "Geometry type differs from layer type");
        }

        let sr = match (self.target.epsg(), geometry) {
            (None, Some(source)) => SpatialReference::from_epsg(source.srid),
            _ => self.target,
        };

        Ok(Some(shape.to_esri_json(&sr)))
    }

    /// Parse, reprojette et sérialise une cellule
    pub fn encode(&mut self, row: usize, cell: &str) -> Result<Option<Value>, SyncError> {
        let geometry = match self.parse(row, cell)? {
            Some(source) => Some(self.project(source)?),
            None => None,
        };
        self.serialize(row, geometry.as_ref())
    }
}
