//! Tests de workflow: orchestrateur complet contre un service simulé
//!
//! Toutes les politiques de reprise sont sans attente.

mod common;

use agol_sync::service::{EditResult, RawError};
use agol_sync::sync::preflight;
use agol_sync::{
    CsvDeadLetter, CsvExtract, EditKind, MemoryDeadLetter, SyncError, SyncMode, SyncOrchestrator,
};
use common::{config, parcel_schema, points_csv, timed_out, FakeService, Scripted};

fn extract(csv: &[u8]) -> CsvExtract {
    CsvExtract::from_bytes(csv).unwrap()
}

// ============================================================================
// Append
// ============================================================================

#[tokio::test]
async fn test_append_end_to_end() {
    let service = FakeService::new(parcel_schema());
    let config = config(SyncMode::Append, 1);
    let extract = extract(b"id,name,shape\n1,Alpha,SRID=2272;POINT(100 200)\n2,Beta,\n");
    let mut sink = MemoryDeadLetter::default();

    let outcome = SyncOrchestrator::new(&service, &config)
        .run(&extract, &mut sink)
        .await
        .unwrap();

    assert_eq!(service.submissions(), vec![(EditKind::Add, 1), (EditKind::Add, 1)]);
    assert_eq!(outcome.records_submitted, 2);
    assert_eq!(outcome.records_rejected, 0);
    assert_eq!(outcome.final_count, Some(2));
    assert!(!outcome.truncated);
    assert!(sink.entries.is_empty());

    let features = service.features();
    assert_eq!(features[0].feature["attributes"]["id"], 1);
    assert_eq!(features[0].feature["attributes"]["name"], "Alpha");
    assert_eq!(features[0].feature["geometry"]["x"], 100.0);
    assert_eq!(features[0].feature["geometry"]["spatialReference"]["latestWkid"], 2272);
    // Géométrie absente: point vide plutôt qu'une ligne rejetée
    assert_eq!(features[1].feature["geometry"]["x"], "NaN");
}

#[tokio::test]
async fn test_truncate_then_append() {
    let service = FakeService::new(parcel_schema()).with_features(&[1, 2, 3]);
    let mut config = config(SyncMode::Append, 500);
    config.truncate = true;
    let mut sink = MemoryDeadLetter::default();

    let outcome = SyncOrchestrator::new(&service, &config)
        .run(&extract(&points_csv(2)), &mut sink)
        .await
        .unwrap();

    assert_eq!(service.truncate_calls(), 1);
    assert!(outcome.truncated);
    assert_eq!(outcome.final_count, Some(2));
}

#[tokio::test]
async fn test_truncate_verification_failure() {
    let service = FakeService::new(parcel_schema()).with_features(&[1, 2, 3]);
    service.leave_after_truncate(2);
    let mut config = config(SyncMode::Append, 500);
    config.truncate = true;
    let mut sink = MemoryDeadLetter::default();

    let result = SyncOrchestrator::new(&service, &config)
        .run(&extract(&points_csv(2)), &mut sink)
        .await;

    assert!(matches!(
        result,
        Err(SyncError::TruncateVerification { remaining: 2 })
    ));
    assert!(service.submissions().is_empty());
}

#[tokio::test]
async fn test_empty_layer_after_sync_is_fatal() {
    let service = FakeService::new(parcel_schema());
    // Résultat positif mais rien n'est écrit côté service
    service.script(Scripted::Respond(Ok(Some(vec![EditResult::ok(1)]))));
    let config = config(SyncMode::Append, 500);
    let mut sink = MemoryDeadLetter::default();

    let result = SyncOrchestrator::new(&service, &config)
        .run(&extract(&points_csv(1)), &mut sink)
        .await;

    assert!(matches!(result, Err(SyncError::EmptyAfterSync { submitted: 1 })));
}

// ============================================================================
// Pré-vol: aucune opération destructive en cas d'erreur
// ============================================================================

#[tokio::test]
async fn test_schema_mismatch_before_truncate() {
    let service = FakeService::new(parcel_schema()).with_features(&[1]);
    let mut config = config(SyncMode::Append, 500);
    config.truncate = true;
    let mut sink = MemoryDeadLetter::default();

    let result = SyncOrchestrator::new(&service, &config)
        .run(
            &extract(b"id,name,owner,shape\n1,a,b,SRID=2272;POINT(1 2)\n"),
            &mut sink,
        )
        .await;

    match result {
        Err(SyncError::SchemaMismatch { csv_only, target_only }) => {
            assert_eq!(csv_only, vec!["owner"]);
            assert!(target_only.is_empty());
        }
        other => panic!("Expected SchemaMismatch, got {:?}", other),
    }
    assert_eq!(service.truncate_calls(), 0);
    assert_eq!(service.features().len(), 1);
}

#[tokio::test]
async fn test_geometry_error_before_truncate() {
    let service = FakeService::new(parcel_schema()).with_features(&[1]);
    let mut config = config(SyncMode::Append, 500);
    config.truncate = true;
    let mut sink = MemoryDeadLetter::default();

    // Pas de préfixe SRID et aucun SRID par défaut
    let result = SyncOrchestrator::new(&service, &config)
        .run(&extract(b"id,name,shape\n1,a,POINT(1 2)\n"), &mut sink)
        .await;

    assert!(matches!(result, Err(SyncError::GeometryParse { row: 1, .. })));
    assert_eq!(service.truncate_calls(), 0);
    assert!(service.submissions().is_empty());
}

#[test]
fn test_preflight_mixed_srid() {
    let config = config(SyncMode::Append, 500);
    let extract = extract(
        b"id,name,shape\n1,a,SRID=2272;POINT(1 2)\n2,b,SRID=4326;POINT(-75 40)\n",
    );

    let result = preflight(&config, &parcel_schema(), &extract);
    assert!(matches!(
        result,
        Err(SyncError::MixedSrid {
            row: 2,
            expected: 2272,
            found: 4326
        })
    ));
}

#[test]
fn test_preflight_upsert_requires_key_column() {
    let mut config = config(SyncMode::Upsert, 500);
    config.primary_key = Some("parcel_id".into());

    let result = preflight(&config, &parcel_schema(), &extract(&points_csv(1)));
    assert!(matches!(result, Err(SyncError::Config(_))));
}

// ============================================================================
// Annulations et résultats par ligne
// ============================================================================

#[tokio::test]
async fn test_silent_rollback_reaches_ceiling() {
    let service = FakeService::new(parcel_schema());
    for _ in 0..6 {
        service.script(Scripted::Respond(Ok(None)));
    }
    let config = config(SyncMode::Append, 500);
    let mut sink = MemoryDeadLetter::default();

    let result = SyncOrchestrator::new(&service, &config)
        .run(&extract(&points_csv(1)), &mut sink)
        .await;

    match result {
        Err(SyncError::FatalSubmissionFailure { kind, attempts, rows, .. }) => {
            assert_eq!(kind, EditKind::Add);
            assert_eq!(attempts, 5);
            assert_eq!(rows, 1);
        }
        other => panic!("Expected FatalSubmissionFailure, got {:?}", other),
    }
    assert_eq!(service.submissions().len(), 5);
}

#[tokio::test]
async fn test_explicit_rollback_twice_dead_letters_batch() {
    let service = FakeService::new(parcel_schema());
    let rolled_back = || {
        Scripted::Respond(Ok(Some(vec![
            EditResult::failed(1003, "Operation rolled back."),
            EditResult::failed(1003, "Operation rolled back."),
        ])))
    };
    service.script(rolled_back());
    service.script(rolled_back());
    let config = config(SyncMode::Append, 2);
    let mut sink = MemoryDeadLetter::default();

    let outcome = SyncOrchestrator::new(&service, &config)
        .run(&extract(&points_csv(3)), &mut sink)
        .await
        .unwrap();

    assert_eq!(
        service.submissions(),
        vec![(EditKind::Add, 2), (EditKind::Add, 2), (EditKind::Add, 1)]
    );
    assert_eq!(outcome.records_rejected, 2);
    assert_eq!(
        sink.entries.iter().map(|e| e.row).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert_eq!(outcome.final_count, Some(1));
}

#[tokio::test]
async fn test_row_level_results() {
    let service = FakeService::new(parcel_schema());
    service.script(Scripted::ApplyWith(vec![
        EditResult::ok(1),
        EditResult::failed(1000, "Ignored condition"),
        EditResult::failed(10500, "Invalid value for field"),
    ]));
    let config = config(SyncMode::Append, 500);
    let mut sink = MemoryDeadLetter::default();

    let outcome = SyncOrchestrator::new(&service, &config)
        .run(&extract(&points_csv(3)), &mut sink)
        .await
        .unwrap();

    // Code 1000 ignoré, seul le code 10500 rejette sa ligne
    assert_eq!(outcome.records_rejected, 1);
    assert_eq!(sink.entries.len(), 1);
    assert_eq!(sink.entries[0].row, 3);
    assert!(sink.entries[0].reason.contains("10500"));
    assert_eq!(outcome.rejected_rows[0].record.row, 3);
}

// ============================================================================
// Échecs transitoires
// ============================================================================

#[tokio::test]
async fn test_append_timeout_batch_landed() {
    let service = FakeService::new(parcel_schema());
    service.script(Scripted::ApplyThenFail(timed_out()));
    let config = config(SyncMode::Append, 500);
    let mut sink = MemoryDeadLetter::default();

    let outcome = SyncOrchestrator::new(&service, &config)
        .run(&extract(&points_csv(1)), &mut sink)
        .await
        .unwrap();

    // Le comptage confirme l'écriture: pas de resoumission
    assert_eq!(service.submissions().len(), 1);
    assert_eq!(outcome.final_count, Some(1));
}

#[tokio::test]
async fn test_append_timeout_batch_not_landed() {
    let service = FakeService::new(parcel_schema());
    service.script(Scripted::Respond(Err(timed_out())));
    let config = config(SyncMode::Append, 500);
    let mut sink = MemoryDeadLetter::default();

    let outcome = SyncOrchestrator::new(&service, &config)
        .run(&extract(&points_csv(1)), &mut sink)
        .await
        .unwrap();

    assert_eq!(service.submissions().len(), 2);
    assert_eq!(outcome.final_count, Some(1));
    assert_eq!(outcome.stats(EditKind::Add).attempts, 2);
}

#[tokio::test]
async fn test_upsert_timeout_assumed_accepted() {
    let service = FakeService::new(parcel_schema());
    service.script(Scripted::ApplyThenFail(timed_out()));
    let config = config(SyncMode::Upsert, 500);
    let mut sink = MemoryDeadLetter::default();

    let outcome = SyncOrchestrator::new(&service, &config)
        .run(&extract(&points_csv(1)), &mut sink)
        .await
        .unwrap();

    assert_eq!(service.submissions(), vec![(EditKind::Add, 1)]);
    assert_eq!(outcome.final_count, Some(1));
}

#[tokio::test]
async fn test_bad_gateway_reaches_ceiling() {
    let service = FakeService::new(parcel_schema());
    for _ in 0..5 {
        service.script(Scripted::Respond(Err(RawError::new("HTTP 502"))));
    }
    let config = config(SyncMode::Append, 500);
    let mut sink = MemoryDeadLetter::default();

    let result = SyncOrchestrator::new(&service, &config)
        .run(&extract(&points_csv(1)), &mut sink)
        .await;

    match result {
        Err(SyncError::FatalSubmissionFailure { attempts, last, .. }) => {
            assert_eq!(attempts, 5);
            assert_eq!(last, "HTTP 502");
        }
        other => panic!("Expected FatalSubmissionFailure, got {:?}", other),
    }
    assert_eq!(service.submissions().len(), 5);
}

#[tokio::test]
async fn test_unclassified_error_dead_letters_and_continues() {
    let service = FakeService::new(parcel_schema());
    service.script(Scripted::Respond(Err(RawError::new(
        "Error code 498: Invalid token.",
    ))));
    let config = config(SyncMode::Append, 1);
    let mut sink = MemoryDeadLetter::default();

    let outcome = SyncOrchestrator::new(&service, &config)
        .run(&extract(&points_csv(2)), &mut sink)
        .await
        .unwrap();

    assert_eq!(service.submissions().len(), 2);
    assert_eq!(outcome.records_rejected, 1);
    assert_eq!(sink.entries[0].row, 1);
    assert!(sink.entries[0].reason.contains("498"));
    assert_eq!(outcome.final_count, Some(1));
}

#[tokio::test]
async fn test_rejected_rows_written_to_csv() {
    let dir = tempfile::tempdir().unwrap();
    let service = FakeService::new(parcel_schema());
    service.script(Scripted::Respond(Err(RawError::new(
        "Error code 400: Cannot perform operation.",
    ))));
    let config = config(SyncMode::Append, 1);
    let mut sink = CsvDeadLetter::new(
        dir.path(),
        "https://services.arcgis.com/x/arcgis/rest/services/Parcels/FeatureServer/0",
        chrono::Local::now(),
    );

    SyncOrchestrator::new(&service, &config)
        .run(&extract(&points_csv(2)), &mut sink)
        .await
        .unwrap();

    assert_eq!(sink.written(), 1);
    let content = std::fs::read_to_string(sink.path()).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("row,kind,reason"));
    assert!(lines[1].starts_with("1,add,"));
}

// ============================================================================
// Upsert
// ============================================================================

#[tokio::test]
async fn test_upsert_add_and_update() {
    let service = FakeService::new(parcel_schema()).with_features(&[5]);
    service.script_query(&[5]);
    let config = config(SyncMode::Upsert, 500);
    let mut sink = MemoryDeadLetter::default();

    let outcome = SyncOrchestrator::new(&service, &config)
        .run(&extract(&points_csv(2)), &mut sink)
        .await
        .unwrap();

    assert_eq!(service.queries(), vec!["id = 1", "id = 2"]);
    assert_eq!(
        service.submissions(),
        vec![(EditKind::Add, 1), (EditKind::Update, 1)]
    );
    assert_eq!(outcome.final_count, Some(2));

    let updated = service
        .features()
        .into_iter()
        .find(|f| f.object_id == 5)
        .unwrap();
    assert_eq!(updated.feature["attributes"]["name"], "Parcel 1");
    assert_eq!(updated.feature["attributes"]["objectid"], 5);
}

#[tokio::test]
async fn test_upsert_duplicate_deleted_before_update() {
    let service = FakeService::new(parcel_schema()).with_features(&[10, 11]);
    service.script_query(&[10, 11]);
    let config = config(SyncMode::Upsert, 500);
    let mut sink = MemoryDeadLetter::default();

    let outcome = SyncOrchestrator::new(&service, &config)
        .run(&extract(&points_csv(1)), &mut sink)
        .await
        .unwrap();

    assert_eq!(
        service.submissions(),
        vec![(EditKind::Delete, 1), (EditKind::Update, 1)]
    );
    let remaining: Vec<i64> = service.features().iter().map(|f| f.object_id).collect();
    assert_eq!(remaining, vec![10]);
    assert_eq!(outcome.final_count, Some(1));
}

#[tokio::test]
async fn test_upsert_ambiguous_match() {
    let service = FakeService::new(parcel_schema()).with_features(&[1, 2, 3]);
    service.script_query(&[1, 2, 3]);
    let config = config(SyncMode::Upsert, 500);
    let mut sink = MemoryDeadLetter::default();

    let result = SyncOrchestrator::new(&service, &config)
        .run(&extract(&points_csv(1)), &mut sink)
        .await;

    match result {
        Err(SyncError::AmbiguousMatch { key, value, matches }) => {
            assert_eq!(key, "id");
            assert_eq!(value, "1");
            assert_eq!(matches, 3);
        }
        other => panic!("Expected AmbiguousMatch, got {:?}", other),
    }
    assert!(service.submissions().is_empty());
}
