//! # agol-sync
//!
//! Synchronisation en masse d'un extrait CSV (géométries WKT) vers une couche
//! de service d'entités ArcGIS.
//!
//! ## Features
//!
//! - Réconciliation de l'en-tête CSV avec le schéma de la couche
//! - Typage des valeurs (dates, entiers, booléens) et nettoyage de colonnes
//! - Reprojection PROJ (feature `reproject`, activé par défaut)
//! - Modes `append` (non idempotent) et `upsert` par clé primaire
//! - Lots bornés, reprise classée (timeouts, 50x, annulations) et rejets CSV
//! - Vérification du nombre d'entités distantes en fin de run
//!
//! ## Usage CLI
//!
//! ```bash
//! # Vider la couche puis tout recharger
//! agol-sync sync --csv parcels.csv --layer-url https://.../FeatureServer/0 --truncate
//!
//! # Mettre à jour par clé primaire
//! agol-sync sync --csv parcels.csv --mode upsert --primary-key parcel_id
//!
//! # Contrôles de pré-vol uniquement
//! agol-sync check --csv parcels.csv --schema schema.json
//! ```

pub mod config;
pub mod deadletter;
pub mod error;
pub mod format;
pub mod geometry;
pub mod record;
pub mod report;
pub mod schema;
pub mod service;
pub mod source;
pub mod sync;

pub use config::{RetryPolicy, SyncConfig, SyncMode};
pub use deadletter::{CsvDeadLetter, DeadLetterSink, MemoryDeadLetter};
pub use error::SyncError;
pub use geometry::GeometryCodec;
pub use record::{FieldValue, NormalizedRecord};
pub use report::{SyncOutcome, SyncReport, SyncStatus};
pub use schema::{FieldType, SchemaDescriptor, TargetField, TargetSchema};
pub use service::{ArcGisClient, EditKind, FeatureService, ServiceConfig};
pub use source::{CsvExtract, SourceRow};
pub use sync::SyncOrchestrator;
