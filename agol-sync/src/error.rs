//! Types d'erreurs pour le crate agol-sync
//!
//! Seules les erreurs de schéma, d'identité et d'épuisement des tentatives
//! remontent à l'appelant. Les échecs par lot ou par ligne sont absorbés et
//! résumés dans [`crate::report::SyncOutcome`].

use thiserror::Error;
use wkt_esri::GeometryError;

use crate::service::{EditKind, RawError};

/// Erreurs fatales d'une synchronisation
#[derive(Debug, Error)]
pub enum SyncError {
    /// En-tête CSV et champs de la couche cible divergents
    #[error("Schema mismatch: CSV-only fields {csv_only:?}, target-only fields {target_only:?}")]
    SchemaMismatch {
        csv_only: Vec<String>,
        target_only: Vec<String>,
    },

    /// Descripteur de schéma cible invalide
    #[error("Invalid target schema: {0}")]
    InvalidSchema(String),

    /// Géométrie illisible (détectée avant toute opération destructive)
    #[error("Geometry parse error on row {row}: {source}")]
    GeometryParse {
        row: usize,
        #[source]
        source: GeometryError,
    },

    /// SRID d'une ligne différent du SRID source établi pour le run
    #[error("Row {row} has SRID {found} but the run source SRID is {expected}")]
    MixedSrid { row: usize, expected: u32, found: u32 },

    /// Échec de construction ou d'application de la reprojection
    #[error("Reprojection failed: {0}")]
    Reprojection(String),

    /// Trois correspondances distantes ou plus pour une clé primaire
    #[error("Ambiguous match: {matches} remote rows where {key} = {value}")]
    AmbiguousMatch {
        key: String,
        value: String,
        matches: usize,
    },

    /// Plafond de tentatives atteint pour un lot
    #[error("Batch {batch} ({kind:?}, {rows} rows) failed after {attempts} attempts: {last}")]
    FatalSubmissionFailure {
        kind: EditKind,
        batch: usize,
        rows: usize,
        attempts: u32,
        last: String,
    },

    /// Couche vide après un append/upsert
    #[error("Remote layer is empty after sync ({submitted} records submitted)")]
    EmptyAfterSync { submitted: usize },

    /// Couche non vide après un truncate
    #[error("Truncate verification failed: {remaining} rows remain")]
    TruncateVerification { remaining: u64 },

    /// Appel distant hors soumission de lot non récupérable
    #[error("Feature service {operation} failed: {source}")]
    Service {
        operation: &'static str,
        #[source]
        source: RawError,
    },

    /// Erreur de lecture CSV
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Erreur d'I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration invalide
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// Crée une erreur de service avec contexte
    pub fn service(operation: &'static str, source: RawError) -> Self {
        Self::Service { operation, source }
    }

    /// Crée une erreur de géométrie avec le numéro de ligne
    pub fn geometry(row: usize, source: GeometryError) -> Self {
        Self::GeometryParse { row, source }
    }
}
