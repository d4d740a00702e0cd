//! Enregistrement normalisé prêt à être soumis au service

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

/// Valeur typée d'un attribut
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Absence explicite de valeur (jamais une chaîne vide)
    Null,
    Text(String),
    Integer(i64),
    Number(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Représentation JSON attendue par le service (dates en epoch millisecondes)
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Integer(i) => json!(i),
            FieldValue::Number(n) if n.is_finite() => json!(n),
            FieldValue::Number(_) => Value::Null,
            FieldValue::Bool(b) => json!(b),
            FieldValue::Timestamp(ts) => json!(ts.timestamp_millis()),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Null => write!(f, "NULL"),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

/// Ligne CSV normalisée
///
/// Produite une seule fois par ligne source. Les ajustements d'identité
/// (upsert) produisent un nouvel enregistrement plutôt que de muter celui-ci.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    /// Numéro de ligne dans le CSV (1 = première ligne de données)
    pub row: usize,

    /// Attributs typés, par nom de champ en minuscules
    pub attributes: BTreeMap<String, FieldValue>,

    /// Géométrie sérialisée en JSON Esri
    pub geometry: Option<Value>,

    /// Identifiant distant ciblé (update / delete)
    pub object_id: Option<i64>,
}

impl NormalizedRecord {
    pub fn new(row: usize) -> Self {
        Self {
            row,
            attributes: BTreeMap::new(),
            geometry: None,
            object_id: None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.attributes.get(field)
    }

    /// Enregistrement de suppression pour un identifiant distant
    pub fn delete_marker(row: usize, object_id_field: &str, object_id: i64) -> Self {
        let mut record = Self::new(row);
        record
            .attributes
            .insert(object_id_field.to_string(), FieldValue::Integer(object_id));
        record.object_id = Some(object_id);
        record
    }

    /// Cible un enregistrement distant: l'identifiant local est remplacé
    pub fn targeting(mut self, object_id_field: &str, object_id: i64) -> Self {
        self.attributes
            .insert(object_id_field.to_string(), FieldValue::Integer(object_id));
        self.object_id = Some(object_id);
        self
    }

    /// Retire l'identifiant local (le service génère le sien à l'ajout)
    pub fn without_identity(mut self, identity_fields: &[&str]) -> Self {
        for field in identity_fields {
            self.attributes.remove(*field);
        }
        self.object_id = None;
        self
    }

    /// Attributs au format JSON
    pub fn attributes_json(&self) -> Value {
        let map: Map<String, Value> = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Value::Object(map)
    }

    /// Feature Esri `{"attributes": {...}, "geometry": {...}}`
    pub fn to_feature_json(&self) -> Value {
        let mut feature = Map::new();
        feature.insert("attributes".into(), self.attributes_json());
        if let Some(geometry) = &self.geometry {
            feature.insert("geometry".into(), geometry.clone());
        }
        Value::Object(feature)
    }
}
