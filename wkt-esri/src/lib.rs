//! # wkt-esri
//!
//! Parsing de géométries (E)WKT et sérialisation au format JSON Esri
//! (`{"x","y"}`, `{"paths"}`, `{"rings"}`) attendu par les services d'entités.
//!
//! ## Features
//!
//! - Préfixe PostGIS `SRID=<n>;` optionnel
//! - POINT, LINESTRING, POLYGON, MULTIPOLYGON (MULTIPOINT refusé)
//! - Formes vides explicites pour les cellules vides
//! - Contrôle de validité consultatif (anneaux non fermés, auto-intersections)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wkt_esri::{parse, GeometryKind, ParsedCell, Shape, SpatialReference};
//!
//! match parse("SRID=2272;POINT(100 200)")? {
//!     ParsedCell::Empty { .. } => {}
//!     ParsedCell::Geometry(parsed) => {
//!         let shape = Shape::from_geometry(&parsed.geometry).unwrap();
//!         println!("{}", shape.to_esri_json(&SpatialReference::from_epsg(2272)));
//!     }
//! }
//! ```

pub mod error;
pub mod ewkt;
pub mod shape;
pub mod types;
pub mod validity;

pub use error::GeometryError;
pub use shape::Shape;
pub use types::{GeometryKind, ParsedWkt, SpatialReference, WktType};

/// Résultat du parsing d'une cellule de géométrie
#[derive(Debug, Clone)]
pub enum ParsedCell {
    /// Cellule vide ou géométrie `EMPTY` (SRID éventuellement présent)
    Empty { srid: Option<u32> },

    /// Géométrie parsée
    Geometry(ParsedWkt),
}

/// Parse une cellule CSV contenant une géométrie (E)WKT
///
/// # Errors
///
/// Retourne `GeometryError` si le préfixe SRID est mal formé, si le type est
/// inconnu ou non supporté, ou si le texte WKT est invalide.
pub fn parse(cell: &str) -> Result<ParsedCell, GeometryError> {
    if cell.trim().is_empty() {
        return Ok(ParsedCell::Empty { srid: None });
    }

    let (srid, body) = ewkt::split_srid(cell)?;
    if body.is_empty() || ewkt::is_empty_wkt(body) {
        return Ok(ParsedCell::Empty { srid });
    }

    ewkt::parse_ewkt(cell).map(ParsedCell::Geometry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_blank_cell() {
        assert!(matches!(parse("   "), Ok(ParsedCell::Empty { srid: None })));
        assert!(matches!(parse(""), Ok(ParsedCell::Empty { srid: None })));
    }

    #[test]
    fn test_parse_empty_with_srid() {
        assert!(matches!(
            parse("SRID=2272;POINT EMPTY"),
            Ok(ParsedCell::Empty { srid: Some(2272) })
        ));
    }

    #[test]
    fn test_parse_multipoint_refused() {
        assert!(matches!(
            parse("SRID=4326;MULTIPOINT((1 2),(3 4))"),
            Err(GeometryError::NotImplemented(_))
        ));
    }

    #[test]
    fn test_parse_geometry() {
        match parse("POLYGON((0 0,10 0,10 10,0 10,0 0))").unwrap() {
            ParsedCell::Geometry(parsed) => {
                assert_eq!(parsed.srid, None);
                assert_eq!(parsed.wkt_type, WktType::Polygon);
            }
            other => panic!("Expected geometry, got {:?}", other),
        }
    }
}
