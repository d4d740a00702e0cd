//! Service d'entités simulé pour les tests de workflow

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use agol_sync::service::{EditResult, RawError, RawResult, RemoteFeature};
use agol_sync::{
    EditKind, FeatureService, FieldType, NormalizedRecord, RetryPolicy, SchemaDescriptor,
    SyncConfig, SyncMode, TargetField, TargetSchema,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use wkt_esri::{GeometryKind, SpatialReference};

/// Réponse scriptée à une soumission
pub enum Scripted {
    /// Réponse renvoyée telle quelle, sans appliquer les éditions
    Respond(Result<RawResult, RawError>),
    /// Éditions appliquées, résultats par ligne imposés
    ApplyWith(Vec<EditResult>),
    /// Éditions appliquées, puis échec renvoyé (ex: timeout côté client)
    ApplyThenFail(RawError),
}

#[derive(Debug, Clone)]
pub struct StoredFeature {
    pub object_id: i64,
    pub feature: Value,
}

#[derive(Default)]
struct State {
    features: Vec<StoredFeature>,
    next_id: i64,
    submissions: Vec<(EditKind, usize)>,
    scripted: VecDeque<Scripted>,
    queries: Vec<String>,
    query_results: VecDeque<Vec<RemoteFeature>>,
    truncate_calls: usize,
    truncate_leaves: u64,
}

pub struct FakeService {
    schema: TargetSchema,
    state: Mutex<State>,
}

impl FakeService {
    pub fn new(schema: TargetSchema) -> Self {
        Self {
            schema,
            state: Mutex::new(State {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Pré-remplit la couche avec des entités aux identifiants donnés
    pub fn with_features(self, ids: &[i64]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for &id in ids {
                state.features.push(StoredFeature {
                    object_id: id,
                    feature: json!({"attributes": {"objectid": id}}),
                });
                state.next_id = state.next_id.max(id + 1);
            }
        }
        self
    }

    pub fn script(&self, response: Scripted) {
        self.state.lock().unwrap().scripted.push_back(response);
    }

    /// Résultat de la prochaine requête `where` (liste d'objectid)
    pub fn script_query(&self, object_ids: &[i64]) {
        let features = object_ids
            .iter()
            .map(|id| {
                let mut attributes = Map::new();
                attributes.insert("OBJECTID".into(), json!(id));
                RemoteFeature { attributes }
            })
            .collect();
        self.state.lock().unwrap().query_results.push_back(features);
    }

    /// Nombre d'entités restant après un truncate
    pub fn leave_after_truncate(&self, remaining: u64) {
        self.state.lock().unwrap().truncate_leaves = remaining;
    }

    pub fn submissions(&self) -> Vec<(EditKind, usize)> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn features(&self) -> Vec<StoredFeature> {
        self.state.lock().unwrap().features.clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn truncate_calls(&self) -> usize {
        self.state.lock().unwrap().truncate_calls
    }
}

fn apply(state: &mut State, kind: EditKind, records: &[NormalizedRecord]) -> Vec<EditResult> {
    records
        .iter()
        .map(|record| match kind {
            EditKind::Add => {
                let id = state.next_id;
                state.next_id += 1;
                state.features.push(StoredFeature {
                    object_id: id,
                    feature: record.to_feature_json(),
                });
                EditResult::ok(id)
            }
            EditKind::Update => {
                let id = record.object_id.unwrap_or(-1);
                match state.features.iter_mut().find(|f| f.object_id == id) {
                    Some(stored) => {
                        stored.feature = record.to_feature_json();
                        EditResult::ok(id)
                    }
                    None => EditResult::failed(1019, "Object is missing."),
                }
            }
            EditKind::Delete => {
                let id = record.object_id.unwrap_or(-1);
                let before = state.features.len();
                state.features.retain(|f| f.object_id != id);
                if state.features.len() < before {
                    EditResult::ok(id)
                } else {
                    EditResult::failed(1019, "Object is missing.")
                }
            }
        })
        .collect()
}

#[async_trait]
impl FeatureService for FakeService {
    async fn schema(&self) -> Result<TargetSchema, RawError> {
        Ok(self.schema.clone())
    }

    async fn submit_edits(
        &self,
        kind: EditKind,
        records: &[NormalizedRecord],
    ) -> Result<RawResult, RawError> {
        let mut state = self.state.lock().unwrap();
        state.submissions.push((kind, records.len()));

        let next = state.scripted.pop_front();
        match next {
            Some(Scripted::Respond(response)) => response,
            Some(Scripted::ApplyWith(results)) => {
                apply(&mut state, kind, records);
                Ok(Some(results))
            }
            Some(Scripted::ApplyThenFail(error)) => {
                apply(&mut state, kind, records);
                Err(error)
            }
            None => Ok(Some(apply(&mut state, kind, records))),
        }
    }

    async fn query_by_filter(&self, where_clause: &str) -> Result<Vec<RemoteFeature>, RawError> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(where_clause.to_string());
        Ok(state.query_results.pop_front().unwrap_or_default())
    }

    async fn count(&self) -> Result<u64, RawError> {
        Ok(self.state.lock().unwrap().features.len() as u64)
    }

    async fn truncate(&self) -> Result<(), RawError> {
        let mut state = self.state.lock().unwrap();
        state.truncate_calls += 1;
        let keep = state.truncate_leaves as usize;
        state.features.truncate(keep);
        Ok(())
    }
}

/// Couche de points `id`, `name`, `shape` en EPSG:2272
pub fn parcel_schema() -> TargetSchema {
    TargetSchema::new(SchemaDescriptor {
        fields: vec![
            TargetField::new("id", FieldType::Integer),
            TargetField::new("name", FieldType::Text),
            TargetField::new("shape", FieldType::Geometry),
        ],
        geometry_kind: GeometryKind::Point,
        spatial_reference: Some(SpatialReference::new(Some(102729), Some(2272))),
        object_id_field: Some("objectid".into()),
    })
    .unwrap()
}

/// Configuration de test: aucune attente entre les tentatives
pub fn config(mode: SyncMode, batch_size: usize) -> SyncConfig {
    SyncConfig {
        mode,
        batch_size,
        primary_key: (mode == SyncMode::Upsert).then(|| "id".to_string()),
        retry: RetryPolicy::immediate(),
        ..Default::default()
    }
}

/// CSV de `n` points valides
pub fn points_csv(n: usize) -> Vec<u8> {
    let mut csv = String::from("id,name,shape\n");
    for i in 1..=n {
        csv.push_str(&format!(
            "{},Parcel {},SRID=2272;POINT({} {})\n",
            i,
            i,
            1000 + i,
            2000 + i
        ));
    }
    csv.into_bytes()
}

pub fn timed_out() -> RawError {
    RawError::new("The request has timed out: operation timed out")
}
