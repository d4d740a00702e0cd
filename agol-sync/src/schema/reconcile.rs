//! Réconciliation de l'en-tête CSV avec les champs de la couche cible
//!
//! Doit s'exécuter avant toute opération destructive (truncate).

use std::collections::BTreeSet;

use tracing::{debug, error};

use super::TargetSchema;
use crate::error::SyncError;

/// Colonnes d'identité générées par le service, tolérées d'un seul côté
pub const IDENTITY_FIELDS: &[&str] = &["objectid", "esri_oid"];

/// Compare deux ensembles de noms de champs
///
/// La différence symétrique est tolérée si et seulement si elle se réduit à
/// une unique colonne d'identité (`objectid` ou `esri_oid`).
pub fn reconcile<'a, 'b>(
    csv_header: impl IntoIterator<Item = &'a str>,
    target_fields: impl IntoIterator<Item = &'b str>,
) -> Result<(), SyncError> {
    let csv: BTreeSet<String> = csv_header.into_iter().map(normalize).collect();
    let target: BTreeSet<String> = target_fields.into_iter().map(normalize).collect();

    let csv_only: Vec<String> = csv.difference(&target).cloned().collect();
    let target_only: Vec<String> = target.difference(&csv).cloned().collect();

    if csv_only.is_empty() && target_only.is_empty() {
        return Ok(());
    }

    let difference: Vec<&String> = csv_only.iter().chain(target_only.iter()).collect();
    if let [single] = difference.as_slice() {
        if IDENTITY_FIELDS.contains(&single.as_str()) {
            debug!(field = %single, "Identity column present on one side only, tolerated");
            return Ok(());
        }
    }

    error!(?csv_only, ?target_only, "CSV header does not match target fields");
    Err(SyncError::SchemaMismatch {
        csv_only,
        target_only,
    })
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Réconciliateur lié au schéma d'un run
pub struct SchemaReconciler<'a> {
    schema: &'a TargetSchema,
}

impl<'a> SchemaReconciler<'a> {
    pub fn new(schema: &'a TargetSchema) -> Self {
        Self { schema }
    }

    /// Vérifie l'en-tête CSV contre le schéma cible
    pub fn check_header(&self, header: &[String]) -> Result<(), SyncError> {
        reconcile(header.iter().map(String::as_str), self.schema.field_names())
    }
}
