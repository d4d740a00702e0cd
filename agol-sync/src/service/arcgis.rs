//! Client HTTP pour une couche de service d'entités ArcGIS (REST)
//!
//! Endpoints utilisés: `<layer>?f=json`, `<layer>/applyEdits`,
//! `<layer>/query`, `<layer>/deleteFeatures`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};
use wkt_esri::{GeometryKind, SpatialReference};

use super::{EditKind, EditResult, FeatureService, RawError, RawResult, RemoteFeature};
use crate::record::NormalizedRecord;
use crate::schema::{FieldType, SchemaDescriptor, TargetField, TargetSchema};

/// Configuration d'accès à la couche cible
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// URL de la couche (`.../FeatureServer/0`)
    pub layer_url: String,
    /// Jeton d'accès
    pub token: Option<String>,
    /// Timeout HTTP par requête
    pub timeout_secs: u64,
    /// Nom de la colonne géométrie côté CSV
    pub geometry_column: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            layer_url: String::new(),
            token: None,
            timeout_secs: 300,
            geometry_column: "shape".into(),
        }
    }
}

impl ServiceConfig {
    /// Charge la configuration depuis les variables d'environnement
    pub fn from_env() -> Self {
        Self {
            layer_url: std::env::var("AGOL_LAYER_URL").unwrap_or_default(),
            token: std::env::var("AGOL_TOKEN").ok().filter(|t| !t.is_empty()),
            timeout_secs: std::env::var("AGOL_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            geometry_column: std::env::var("AGOL_GEOMETRY_COLUMN")
                .map(|s| s.to_lowercase())
                .unwrap_or_else(|_| "shape".into()),
        }
    }
}

/// Champs calculés par le service à partir de la géométrie
const COMPUTED_FIELD_PREFIXES: &[&str] = &["shape__", "st_area(", "st_length("];

/// Client REST pour une couche d'entités
pub struct ArcGisClient {
    http: reqwest::Client,
    config: ServiceConfig,
}

impl ArcGisClient {
    /// Crée un client pour la couche configurée
    pub fn new(config: ServiceConfig) -> Result<Self> {
        if config.layer_url.is_empty() {
            anyhow::bail!("Feature layer URL is required (--layer-url or AGOL_LAYER_URL)");
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, config })
    }

    pub fn layer_url(&self) -> &str {
        self.config.layer_url.trim_end_matches('/')
    }

    fn endpoint(&self, operation: &str) -> String {
        format!("{}/{}", self.layer_url(), operation)
    }

    fn with_token<'a>(&'a self, mut form: Vec<(&'a str, String)>) -> Vec<(&'a str, String)> {
        form.push(("f", "json".to_string()));
        if let Some(token) = &self.config.token {
            form.push(("token", token.clone()));
        }
        form
    }

    async fn post_form(&self, operation: &str, form: Vec<(&str, String)>) -> Result<Value, RawError> {
        let url = self.endpoint(operation);
        trace!(url = %url, "POST");

        let resp = self
            .http
            .post(&url)
            .form(&self.with_token(form))
            .send()
            .await
            .map_err(transport_error)?;

        read_json(resp).await
    }

    fn descriptor_from_layer(&self, layer: LayerInfo) -> SchemaDescriptor {
        let mut fields: Vec<TargetField> = layer
            .fields
            .into_iter()
            .filter(|f| {
                let name = f.name.to_lowercase();
                !COMPUTED_FIELD_PREFIXES.iter().any(|p| name.starts_with(p))
            })
            .map(|f| TargetField {
                name: f.name.to_lowercase(),
                field_type: FieldType::from_esri(&f.field_type),
                nullable: f.nullable.unwrap_or(true),
            })
            .collect();

        let geometry_kind = layer
            .geometry_type
            .as_deref()
            .map(GeometryKind::from_esri)
            .unwrap_or_default();

        if !geometry_kind.is_none() && !fields.iter().any(|f| f.field_type == FieldType::Geometry) {
            fields.push(TargetField::new(&self.config.geometry_column, FieldType::Geometry));
        }

        let spatial_reference = layer
            .spatial_reference
            .or_else(|| layer.extent.and_then(|e| e.spatial_reference));

        SchemaDescriptor {
            fields,
            geometry_kind,
            spatial_reference,
            object_id_field: layer.object_id_field,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LayerField {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    nullable: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct LayerExtent {
    #[serde(rename = "spatialReference", default)]
    spatial_reference: Option<SpatialReference>,
}

#[derive(Debug, Deserialize)]
struct LayerInfo {
    #[serde(default)]
    fields: Vec<LayerField>,
    #[serde(rename = "geometryType", default)]
    geometry_type: Option<String>,
    #[serde(rename = "spatialReference", default)]
    spatial_reference: Option<SpatialReference>,
    #[serde(default)]
    extent: Option<LayerExtent>,
    #[serde(rename = "objectIdField", default)]
    object_id_field: Option<String>,
}

/// Convertit une erreur reqwest; les timeouts portent un message reconnaissable
fn transport_error(e: reqwest::Error) -> RawError {
    if e.is_timeout() {
        RawError::new(format!("The request has timed out: {}", e))
    } else {
        RawError::new(e.to_string())
    }
}

/// Lit une réponse JSON, en convertissant statut HTTP et `{"error": ...}` en `RawError`
async fn read_json(resp: reqwest::Response) -> Result<Value, RawError> {
    let status = resp.status();
    let body = resp.text().await.map_err(transport_error)?;

    // Le corps (page HTML d'un proxy, ...) reste hors du message classé
    if !status.is_success() {
        debug!(
            status = status.as_u16(),
            body = %body.chars().take(200).collect::<String>(),
            "HTTP error response"
        );
        return Err(RawError::new(format!("HTTP {}", status.as_u16())));
    }

    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    let value: Value = serde_json::from_str(&body)
        .map_err(|e| RawError::new(format!("Invalid JSON response: {}", e)))?;

    if let Some(error) = value.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error.get("message").and_then(Value::as_str).unwrap_or("");
        let details = error
            .get("details")
            .and_then(Value::as_array)
            .map(|d| d.iter().filter_map(Value::as_str).collect::<Vec<_>>().join("; "))
            .unwrap_or_default();
        return Err(RawError::new(
            format!("Error code {}: {} {}", code, message, details)
                .trim_end()
                .to_string(),
        ));
    }

    Ok(value)
}

#[async_trait]
impl FeatureService for ArcGisClient {
    async fn schema(&self) -> Result<TargetSchema, RawError> {
        let url = self.layer_url().to_string();
        let mut query = vec![("f", "json".to_string())];
        if let Some(token) = &self.config.token {
            query.push(("token", token.clone()));
        }

        let resp = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(transport_error)?;
        let value = read_json(resp).await?;

        let layer: LayerInfo = serde_json::from_value(value)
            .map_err(|e| RawError::new(format!("Invalid layer description: {}", e)))?;

        TargetSchema::new(self.descriptor_from_layer(layer))
            .map_err(|e| RawError::new(e.to_string()))
    }

    async fn submit_edits(
        &self,
        kind: EditKind,
        records: &[NormalizedRecord],
    ) -> Result<RawResult, RawError> {
        let payload = match kind {
            EditKind::Delete => Value::Array(
                records
                    .iter()
                    .filter_map(|r| r.object_id)
                    .map(Value::from)
                    .collect(),
            ),
            EditKind::Add | EditKind::Update => {
                Value::Array(records.iter().map(NormalizedRecord::to_feature_json).collect())
            }
        };

        debug!(kind = %kind, rows = records.len(), "applyEdits");
        let value = self
            .post_form(
                "applyEdits",
                vec![
                    (kind.param(), payload.to_string()),
                    ("rollbackOnFailure", "true".to_string()),
                ],
            )
            .await?;

        match value.get(kind.results_key()) {
            Some(Value::Array(_)) => {
                let results: Vec<EditResult> = serde_json::from_value(value[kind.results_key()].clone())
                    .map_err(|e| RawError::new(format!("Invalid edit results: {}", e)))?;
                Ok(Some(results))
            }
            _ => Ok(None),
        }
    }

    async fn query_by_filter(&self, where_clause: &str) -> Result<Vec<RemoteFeature>, RawError> {
        let value = self
            .post_form(
                "query",
                vec![
                    ("where", where_clause.to_string()),
                    ("outFields", "*".to_string()),
                    ("returnGeometry", "false".to_string()),
                ],
            )
            .await?;

        match value.get("features") {
            Some(features) => serde_json::from_value(features.clone())
                .map_err(|e| RawError::new(format!("Invalid query features: {}", e))),
            None => Err(RawError::new("Unable to perform query: no features in response")),
        }
    }

    async fn count(&self) -> Result<u64, RawError> {
        let value = self
            .post_form(
                "query",
                vec![
                    ("where", "1=1".to_string()),
                    ("returnCountOnly", "true".to_string()),
                ],
            )
            .await?;

        value
            .get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| RawError::new("Unable to perform query: no count in response"))
    }

    async fn truncate(&self) -> Result<(), RawError> {
        self.post_form(
            "deleteFeatures",
            vec![
                ("where", "1=1".to_string()),
                ("rollbackOnFailure", "true".to_string()),
            ],
        )
        .await?;
        Ok(())
    }
}
