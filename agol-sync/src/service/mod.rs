//! Accès au service d'entités distant
//!
//! Le moteur ne dépend que du trait [`FeatureService`]; [`ArcGisClient`]
//! en est l'implémentation HTTP.

pub mod arcgis;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::record::NormalizedRecord;
use crate::schema::TargetSchema;

pub use arcgis::{ArcGisClient, ServiceConfig};

/// Type d'édition d'un lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditKind {
    Delete,
    Add,
    Update,
}

impl EditKind {
    /// Nom du paramètre `applyEdits` (`adds`, `updates`, `deletes`)
    pub fn param(self) -> &'static str {
        match self {
            EditKind::Add => "adds",
            EditKind::Update => "updates",
            EditKind::Delete => "deletes",
        }
    }

    /// Clé du tableau de résultats (`addResults`, ...)
    pub fn results_key(self) -> &'static str {
        match self {
            EditKind::Add => "addResults",
            EditKind::Update => "updateResults",
            EditKind::Delete => "deleteResults",
        }
    }
}

impl std::fmt::Display for EditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EditKind::Add => "add",
            EditKind::Update => "update",
            EditKind::Delete => "delete",
        })
    }
}

/// Erreur par ligne dans un résultat d'édition
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EditError {
    pub code: i64,
    #[serde(default)]
    pub description: String,
}

/// Résultat par ligne renvoyé par `applyEdits`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EditResult {
    #[serde(rename = "objectId", default)]
    pub object_id: Option<i64>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<EditError>,
}

impl EditResult {
    pub fn ok(object_id: i64) -> Self {
        Self {
            object_id: Some(object_id),
            success: true,
            error: None,
        }
    }

    pub fn failed(code: i64, description: &str) -> Self {
        Self {
            object_id: None,
            success: false,
            error: Some(EditError {
                code,
                description: description.to_string(),
            }),
        }
    }
}

/// Résultat brut d'une soumission: `None` quand le service ne renvoie rien
pub type RawResult = Option<Vec<EditResult>>;

/// Échec brut d'un appel distant (message classé par le [`crate::sync::RetryClassifier`])
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RawError {
    pub message: String,
}

impl RawError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Entité distante renvoyée par une requête
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RemoteFeature {
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl RemoteFeature {
    /// Valeur entière d'un attribut (recherche insensible à la casse)
    pub fn integer(&self, field: &str) -> Option<i64> {
        let value = self.attributes.get(field).or_else(|| {
            self.attributes
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(field))
                .map(|(_, v)| v)
        })?;

        match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Service d'entités distant
///
/// Les appels sont séquentiels: le service met lui-même les requêtes en file.
#[async_trait]
pub trait FeatureService: Send + Sync {
    /// Descripteur de schéma de la couche
    async fn schema(&self) -> Result<TargetSchema, RawError>;

    /// Soumet un lot homogène d'éditions
    async fn submit_edits(
        &self,
        kind: EditKind,
        records: &[NormalizedRecord],
    ) -> Result<RawResult, RawError>;

    /// Entités correspondant à une clause `where`
    async fn query_by_filter(&self, where_clause: &str) -> Result<Vec<RemoteFeature>, RawError>;

    /// Nombre total d'entités
    async fn count(&self) -> Result<u64, RawError>;

    /// Supprime toutes les entités
    async fn truncate(&self) -> Result<(), RawError>;
}
