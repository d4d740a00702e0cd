//! Schéma de la couche cible
//!
//! Le descripteur est chargé une fois par run puis figé. Les types de champs
//! sont consultés via un index `nom → champ` construit à la création.

pub mod reconcile;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use wkt_esri::{GeometryKind, SpatialReference};

use crate::error::SyncError;

pub use reconcile::{reconcile, SchemaReconciler, IDENTITY_FIELDS};

/// Type sémantique d'un champ cible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Numeric,
    Integer,
    Boolean,
    Date,
    Geometry,
}

impl FieldType {
    /// Convertit un type de champ Esri (`esriFieldTypeString`, ...)
    pub fn from_esri(esri_type: &str) -> Self {
        match esri_type {
            "esriFieldTypeDouble" | "esriFieldTypeSingle" => FieldType::Numeric,
            "esriFieldTypeInteger"
            | "esriFieldTypeSmallInteger"
            | "esriFieldTypeBigInteger"
            | "esriFieldTypeOID" => FieldType::Integer,
            "esriFieldTypeDate" | "esriFieldTypeDateOnly" | "esriFieldTypeTimestampOffset" => {
                FieldType::Date
            }
            "esriFieldTypeGeometry" => FieldType::Geometry,
            _ => FieldType::Text,
        }
    }
}

/// Champ de la couche cible
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetField {
    /// Nom du champ (en minuscules)
    pub name: String,

    /// Type sémantique
    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl TargetField {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.trim().to_lowercase(),
            field_type,
            nullable: true,
        }
    }
}

/// Descripteur brut tel que fourni par un fichier JSON
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchemaDescriptor {
    pub fields: Vec<TargetField>,

    #[serde(default)]
    pub geometry_kind: GeometryKind,

    #[serde(default)]
    pub spatial_reference: Option<SpatialReference>,

    #[serde(default)]
    pub object_id_field: Option<String>,
}

/// Schéma immuable de la couche cible
#[derive(Debug, Clone)]
pub struct TargetSchema {
    fields: Vec<TargetField>,
    index: HashMap<String, usize>,
    geometry_kind: GeometryKind,
    spatial_reference: Option<SpatialReference>,
    object_id_field: String,
}

impl TargetSchema {
    /// Construit le schéma et son index
    ///
    /// # Errors
    /// Retourne `InvalidSchema` si un nom de champ est dupliqué ou si plus
    /// d'un champ géométrie est déclaré.
    pub fn new(descriptor: SchemaDescriptor) -> Result<Self, SyncError> {
        let mut fields = Vec::with_capacity(descriptor.fields.len());
        let mut index = HashMap::with_capacity(descriptor.fields.len());

        for mut field in descriptor.fields {
            field.name = field.name.trim().to_lowercase();
            if index.insert(field.name.clone(), fields.len()).is_some() {
                return Err(SyncError::InvalidSchema(format!(
                    "duplicate field '{}'",
                    field.name
                )));
            }
            fields.push(field);
        }

        let geometry_fields = fields
            .iter()
            .filter(|f| f.field_type == FieldType::Geometry)
            .count();
        if geometry_fields > 1 {
            return Err(SyncError::InvalidSchema(format!(
                "{} geometry fields declared, at most one allowed",
                geometry_fields
            )));
        }

        let object_id_field = descriptor
            .object_id_field
            .map(|f| f.trim().to_lowercase())
            .unwrap_or_else(|| "objectid".to_string());

        Ok(Self {
            fields,
            index,
            geometry_kind: descriptor.geometry_kind,
            spatial_reference: descriptor.spatial_reference,
            object_id_field,
        })
    }

    /// Charge un descripteur depuis un fichier JSON
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read schema file: {}", path.display()))?;
        let descriptor: SchemaDescriptor =
            serde_json::from_str(&content).context("Failed to parse schema JSON")?;
        Ok(Self::new(descriptor)?)
    }

    pub fn fields(&self) -> &[TargetField] {
        &self.fields
    }

    /// Recherche un champ par nom (insensible à la casse)
    pub fn field(&self, name: &str) -> Option<&TargetField> {
        match self.index.get(name) {
            Some(&i) => Some(&self.fields[i]),
            None => self
                .index
                .get(&name.to_lowercase())
                .map(|&i| &self.fields[i]),
        }
    }

    /// Type sémantique d'un champ
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.field(name).map(|f| f.field_type)
    }

    /// Nom du champ géométrie, s'il existe
    pub fn geometry_field(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.field_type == FieldType::Geometry)
            .map(|f| f.name.as_str())
    }

    pub fn geometry_kind(&self) -> GeometryKind {
        self.geometry_kind
    }

    pub fn spatial_reference(&self) -> Option<SpatialReference> {
        self.spatial_reference
    }

    /// Nom du champ identifiant généré par le service
    pub fn object_id_field(&self) -> &str {
        &self.object_id_field
    }

    /// Noms de tous les champs, en minuscules
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(fields: Vec<TargetField>) -> SchemaDescriptor {
        SchemaDescriptor {
            fields,
            geometry_kind: GeometryKind::Point,
            spatial_reference: Some(SpatialReference::new(Some(102729), Some(2272))),
            object_id_field: Some("OBJECTID".to_string()),
        }
    }

    #[test]
    fn test_field_index_case_insensitive() {
        let schema = TargetSchema::new(descriptor(vec![
            TargetField::new("Parcel_ID", FieldType::Text),
            TargetField::new("recorded", FieldType::Date),
        ]))
        .unwrap();

        assert_eq!(schema.field_type("parcel_id"), Some(FieldType::Text));
        assert_eq!(schema.field_type("RECORDED"), Some(FieldType::Date));
        assert_eq!(schema.field_type("missing"), None);
        assert_eq!(schema.object_id_field(), "objectid");
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = TargetSchema::new(descriptor(vec![
            TargetField::new("a", FieldType::Text),
            TargetField::new("A", FieldType::Integer),
        ]));
        assert!(matches!(result, Err(SyncError::InvalidSchema(_))));
    }

    #[test]
    fn test_at_most_one_geometry_field() {
        let result = TargetSchema::new(descriptor(vec![
            TargetField::new("shape", FieldType::Geometry),
            TargetField::new("shape2", FieldType::Geometry),
        ]));
        assert!(matches!(result, Err(SyncError::InvalidSchema(_))));

        let schema = TargetSchema::new(descriptor(vec![
            TargetField::new("id", FieldType::Integer),
            TargetField::new("shape", FieldType::Geometry),
        ]))
        .unwrap();
        assert_eq!(schema.geometry_field(), Some("shape"));
    }

    #[test]
    fn test_esri_field_types() {
        assert_eq!(FieldType::from_esri("esriFieldTypeOID"), FieldType::Integer);
        assert_eq!(FieldType::from_esri("esriFieldTypeDouble"), FieldType::Numeric);
        assert_eq!(FieldType::from_esri("esriFieldTypeDate"), FieldType::Date);
        assert_eq!(FieldType::from_esri("esriFieldTypeGUID"), FieldType::Text);
    }

    #[test]
    fn test_descriptor_from_json() {
        let json = r#"{
            "fields": [
                {"name": "id", "type": "integer", "nullable": false},
                {"name": "shape", "type": "geometry"}
            ],
            "geometry_kind": "point",
            "spatial_reference": {"wkid": 102729, "latestWkid": 2272}
        }"#;
        let descriptor: SchemaDescriptor = serde_json::from_str(json).unwrap();
        let schema = TargetSchema::new(descriptor).unwrap();

        assert!(!schema.fields()[0].nullable);
        assert!(schema.fields()[1].nullable);
        assert_eq!(schema.geometry_kind(), GeometryKind::Point);
        assert_eq!(schema.spatial_reference().unwrap().epsg(), Some(2272));
    }
}
