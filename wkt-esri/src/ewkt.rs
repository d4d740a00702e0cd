//! Parser pour les cellules (E)WKT: `SRID=2272;POLYGON((...))` ou WKT nu

use geo::Geometry;
use tracing::{debug, trace};
use wkt::TryFromWkt;

use crate::types::{ParsedWkt, WktType};
use crate::GeometryError;

const SRID_PREFIX: &str = "SRID=";

/// Sépare le préfixe `SRID=<n>;` du corps WKT
///
/// Retourne `(None, corps)` si la cellule ne porte pas de préfixe.
pub fn split_srid(cell: &str) -> Result<(Option<u32>, &str), GeometryError> {
    let trimmed = cell.trim();

    let Some(rest) = strip_prefix_ignore_case(trimmed, SRID_PREFIX) else {
        return Ok((None, trimmed));
    };

    let Some((code, body)) = rest.split_once(';') else {
        return Err(GeometryError::InvalidSrid(crate::error::truncate(trimmed, 40)));
    };

    let srid = code
        .trim()
        .parse::<u32>()
        .map_err(|_| GeometryError::InvalidSrid(code.to_string()))?;

    Ok((Some(srid), body.trim()))
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

/// Détecte le type WKT par recherche de sous-chaîne
///
/// Les variantes MULTI sont testées avant leurs équivalents simples.
/// `MULTILINESTRING` est accepté via `LINESTRING`.
pub fn detect_type(body: &str) -> Result<WktType, GeometryError> {
    let upper = body.to_ascii_uppercase();

    if upper.contains("MULTIPOINT") {
        return Err(GeometryError::NotImplemented("MULTIPOINT".to_string()));
    }
    if upper.contains("MULTIPOLYGON") {
        return Ok(WktType::MultiPolygon);
    }
    if upper.contains("POLYGON") {
        return Ok(WktType::Polygon);
    }
    if upper.contains("LINESTRING") {
        return Ok(WktType::LineString);
    }
    if upper.contains("POINT") {
        return Ok(WktType::Point);
    }

    Err(GeometryError::UnsupportedType(crate::error::truncate(body, 40)))
}

/// Indique si le corps WKT est une géométrie vide (`POINT EMPTY`, ...)
pub fn is_empty_wkt(body: &str) -> bool {
    body.trim_end().to_ascii_uppercase().ends_with("EMPTY")
}

/// Parse une cellule (E)WKT non vide
///
/// Les cellules vides et les géométries `EMPTY` sont gérées par l'appelant
/// (voir [`crate::parse`]) car elles dépendent du type de la couche cible.
pub fn parse_ewkt(cell: &str) -> Result<ParsedWkt, GeometryError> {
    let (srid, body) = split_srid(cell)?;
    if srid.is_none() {
        debug!("No SRID prefix, SRID left to the caller");
    }
    let wkt_type = detect_type(body)?;
    trace!(?wkt_type, ?srid, "WKT type detected");

    // Le tokenizer wkt attend des mots-clés en majuscules
    let normalized = body.to_ascii_uppercase();
    let geometry = Geometry::<f64>::try_from_wkt_str(&normalized)
        .map_err(|e| GeometryError::invalid_wkt(body, e.to_string()))?;

    Ok(ParsedWkt {
        srid,
        wkt_type,
        geometry,
    })
}
