//! Résolution d'identité par clé primaire (mode upsert)
//!
//! L'identifiant local n'est jamais utilisé: chaque ligne est recherchée sur
//! le service par sa clé primaire et l'identifiant distant trouvé est ciblé.
//! Un doublon distant (deux correspondances) est supprimé avant la mise à jour.

use tracing::{debug, trace};

use super::batch::{Batch, BatchBuilder};
use super::retry::RetryClassifier;
use crate::error::SyncError;
use crate::record::{FieldValue, NormalizedRecord};
use crate::schema::{TargetSchema, IDENTITY_FIELDS};
use crate::service::{EditKind, FeatureService};

/// Décision pour une ligne
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Aucune correspondance distante
    Add,
    /// Une correspondance (ou deux: `duplicate_id` est alors supprimé)
    Update {
        remote_id: i64,
        duplicate_id: Option<i64>,
    },
}

/// Compteurs de résolution
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpsertReport {
    pub adds: usize,
    pub updates: usize,
    pub duplicates: usize,
}

impl UpsertReport {
    pub fn record(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Add => self.adds += 1,
            Resolution::Update { duplicate_id, .. } => {
                self.updates += 1;
                if duplicate_id.is_some() {
                    self.duplicates += 1;
                }
            }
        }
    }
}

/// Littéral SQL d'une valeur de clé
pub fn sql_literal(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Null => None,
        FieldValue::Text(s) => Some(format!("'{}'", s.replace('\'', "''"))),
        FieldValue::Integer(i) => Some(i.to_string()),
        FieldValue::Number(n) => Some(n.to_string()),
        FieldValue::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        FieldValue::Timestamp(ts) => Some(format!("timestamp '{}'", ts.format("%Y-%m-%d %H:%M:%S"))),
    }
}

/// Clause `where` de recherche par clé primaire
pub fn where_clause(primary_key: &str, value: &FieldValue) -> String {
    match sql_literal(value) {
        Some(literal) => format!("{} = {}", primary_key, literal),
        None => format!("{} IS NULL", primary_key),
    }
}

/// Rapprocheur de lignes par clé primaire
pub struct UpsertMatcher<'a, S: FeatureService + ?Sized> {
    service: &'a S,
    classifier: &'a RetryClassifier,
    primary_key: String,
    object_id_field: String,
}

impl<'a, S: FeatureService + ?Sized> UpsertMatcher<'a, S> {
    pub fn new(
        service: &'a S,
        classifier: &'a RetryClassifier,
        schema: &TargetSchema,
        primary_key: &str,
    ) -> Self {
        Self {
            service,
            classifier,
            primary_key: primary_key.trim().to_lowercase(),
            object_id_field: schema.object_id_field().to_string(),
        }
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Recherche la ligne sur le service
    ///
    /// # Errors
    /// `AmbiguousMatch` à partir de trois correspondances, `Service` si la
    /// requête échoue hors reprise.
    pub async fn resolve(&self, record: &NormalizedRecord) -> Result<Resolution, SyncError> {
        let value = record.get(&self.primary_key).unwrap_or(&FieldValue::Null);
        let clause = where_clause(&self.primary_key, value);

        let matches = self
            .classifier
            .with_retry("query", || self.service.query_by_filter(&clause))
            .await?;
        trace!(row = record.row, %clause, matches = matches.len(), "Primary key lookup");

        let remote_id = |i: usize| {
            matches[i].integer(&self.object_id_field).ok_or_else(|| {
                SyncError::InvalidSchema(format!(
                    "query result has no '{}' field",
                    self.object_id_field
                ))
            })
        };

        match matches.len() {
            0 => Ok(Resolution::Add),
            1 => Ok(Resolution::Update {
                remote_id: remote_id(0)?,
                duplicate_id: None,
            }),
            2 => {
                let resolution = Resolution::Update {
                    remote_id: remote_id(0)?,
                    duplicate_id: Some(remote_id(1)?),
                };
                debug!(row = record.row, %clause, ?resolution, "Duplicate remote row scheduled for deletion");
                Ok(resolution)
            }
            n => Err(SyncError::AmbiguousMatch {
                key: self.primary_key.clone(),
                value: value.to_string(),
                matches: n,
            }),
        }
    }

    /// Place l'enregistrement dans les lots selon la résolution
    ///
    /// Retourne les lots pleins émis au passage.
    pub fn stage(
        &self,
        builder: &mut BatchBuilder,
        record: NormalizedRecord,
        resolution: Resolution,
    ) -> Vec<Batch> {
        let mut emitted = Vec::new();
        let row = record.row;
        let record = self.strip_identity(record);

        match resolution {
            Resolution::Add => emitted.extend(builder.add(EditKind::Add, record)),
            Resolution::Update {
                remote_id,
                duplicate_id,
            } => {
                if let Some(duplicate) = duplicate_id {
                    let marker = NormalizedRecord::delete_marker(row, &self.object_id_field, duplicate);
                    emitted.extend(builder.add(EditKind::Delete, marker));
                }
                let target = record.targeting(&self.object_id_field, remote_id);
                emitted.extend(builder.add(EditKind::Update, target));
            }
        }

        emitted
    }

    fn strip_identity(&self, record: NormalizedRecord) -> NormalizedRecord {
        let mut fields: Vec<&str> = IDENTITY_FIELDS.to_vec();
        fields.push(&self.object_id_field);
        record.without_identity(&fields)
    }
}
