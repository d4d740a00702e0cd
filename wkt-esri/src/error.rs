//! Types d'erreurs pour le crate wkt-esri

use thiserror::Error;

/// Erreurs pouvant survenir lors du parsing d'une géométrie (E)WKT
#[derive(Debug, Error)]
pub enum GeometryError {
    /// Préfixe `SRID=<n>;` mal formé
    #[error("Invalid SRID prefix: {0}")]
    InvalidSrid(String),

    /// Aucun SRID dans la cellule et aucun SRID de repli connu
    #[error("No SRID in geometry and no fallback SRID supplied: {0}")]
    MissingSrid(String),

    /// Type WKT reconnu mais volontairement non supporté (MULTIPOINT)
    #[error("Geometry type not implemented: {0}")]
    NotImplemented(String),

    /// Type WKT inconnu
    #[error("Unsupported geometry type in: {0}")]
    UnsupportedType(String),

    /// Texte WKT invalide
    #[error("Invalid WKT ({reason}): {wkt}")]
    InvalidWkt { wkt: String, reason: String },
}

impl GeometryError {
    /// Crée une erreur de WKT invalide en tronquant le texte source
    pub fn invalid_wkt(wkt: &str, reason: impl Into<String>) -> Self {
        Self::InvalidWkt {
            wkt: truncate(wkt, 80),
            reason: reason.into(),
        }
    }
}

/// Tronque un texte pour les messages d'erreur (les polygones peuvent être énormes)
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
