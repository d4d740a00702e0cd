//! Orchestration d'une synchronisation complète
//!
//! Déroulé: schéma → pré-vol (réconciliation, formatage et géométries de
//! toutes les lignes) → truncate éventuel → lots → vérification du nombre
//! d'entités distantes. Les lots sont soumis un par un, chaque appel étant
//! attendu avant le suivant.

use tracing::{debug, error, info, warn};

use super::batch::{Batch, BatchBuilder};
use super::retry::{sleep, AfterBackoff, Disposition, RetryClassifier, RollbackSignal};
use super::upsert::{UpsertMatcher, UpsertReport};
use crate::config::{SyncConfig, SyncMode};
use crate::deadletter::DeadLetterSink;
use crate::error::SyncError;
use crate::format::RowFormatter;
use crate::geometry::GeometryCodec;
use crate::record::NormalizedRecord;
use crate::report::SyncOutcome;
use crate::schema::{SchemaReconciler, TargetSchema, IDENTITY_FIELDS};
use crate::service::{EditKind, FeatureService};
use crate::source::CsvExtract;

/// Pré-vol: réconcilie l'en-tête et normalise toutes les lignes
///
/// Aucune opération distante n'est faite; toute erreur ici est fatale et
/// survient avant un éventuel truncate.
pub fn preflight(
    config: &SyncConfig,
    schema: &TargetSchema,
    extract: &CsvExtract,
) -> Result<Vec<NormalizedRecord>, SyncError> {
    SchemaReconciler::new(schema).check_header(&extract.header)?;

    if config.mode == SyncMode::Upsert {
        let key = config
            .primary_key()
            .ok_or_else(|| SyncError::Config("upsert mode requires a primary key".into()))?;
        if !extract.header.iter().any(|h| *h == key) {
            return Err(SyncError::Config(format!(
                "primary key '{}' is not a CSV column",
                key
            )));
        }
    }

    let formatter = RowFormatter::new(schema, &config.clean_columns);
    let mut codec = GeometryCodec::new(schema, config.source_srid);

    let records = extract
        .rows
        .iter()
        .map(|row| formatter.format(row, &mut codec))
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        rows = records.len(),
        source_srid = ?codec.run_srid(),
        "Pre-flight checks passed"
    );
    Ok(records)
}

/// Orchestrateur d'un run
pub struct SyncOrchestrator<'a, S: FeatureService + ?Sized> {
    service: &'a S,
    config: &'a SyncConfig,
    classifier: RetryClassifier,
    schema: Option<TargetSchema>,
    /// Nombre d'entités distantes connu (append), `None` après une issue incertaine
    known_count: Option<u64>,
}

impl<'a, S: FeatureService + ?Sized> SyncOrchestrator<'a, S> {
    pub fn new(service: &'a S, config: &'a SyncConfig) -> Self {
        Self {
            service,
            config,
            classifier: RetryClassifier::new(&config.retry),
            schema: None,
            known_count: None,
        }
    }

    /// Utilise un schéma fourni plutôt que celui du service
    pub fn with_schema(mut self, schema: TargetSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Schéma cible (fourni, ou lu sur le service)
    pub async fn target_schema(&self) -> Result<TargetSchema, SyncError> {
        match &self.schema {
            Some(schema) => Ok(schema.clone()),
            None => {
                let schema = self
                    .classifier
                    .with_retry("schema", || self.service.schema())
                    .await?;
                debug!(
                    fields = schema.fields().len(),
                    geometry = ?schema.geometry_kind(),
                    "Target schema loaded from service"
                );
                Ok(schema)
            }
        }
    }

    /// Pré-vol: voir [`preflight`]
    pub fn prepare(
        &self,
        schema: &TargetSchema,
        extract: &CsvExtract,
    ) -> Result<Vec<NormalizedRecord>, SyncError> {
        preflight(self.config, schema, extract)
    }

    /// Exécute la synchronisation complète
    pub async fn run(
        &mut self,
        extract: &CsvExtract,
        sink: &mut dyn DeadLetterSink,
    ) -> Result<SyncOutcome, SyncError> {
        let mode = self.config.mode;
        info!(%mode, rows = extract.len(), truncate = self.config.truncate, "Starting sync");

        let schema = self.target_schema().await?;
        let records = self.prepare(&schema, extract)?;

        let mut outcome = SyncOutcome::default();

        if self.config.truncate {
            self.truncate().await?;
            outcome.truncated = true;
        }

        let mut batches = match mode {
            SyncMode::Append => self.stage_append(&schema, records),
            SyncMode::Upsert => self.stage_upsert(&schema, records).await?,
        };
        // Suppressions de doublons d'abord, puis ajouts et mises à jour
        batches.sort_by_key(|b| b.kind);

        let total = batches.len();
        for batch in batches {
            info!(
                batch = batch.sequence,
                total,
                kind = %batch.kind,
                rows = batch.len(),
                "Submitting batch"
            );
            self.submit_batch(batch, sink, &mut outcome).await?;
        }
        sink.flush()?;

        if outcome.records_submitted > 0 {
            let count = self.verify().await?;
            if count == 0 {
                error!(submitted = outcome.records_submitted, "Remote layer is empty after sync");
                return Err(SyncError::EmptyAfterSync {
                    submitted: outcome.records_submitted,
                });
            }
            outcome.final_count = Some(count);
        }

        info!(
            submitted = outcome.records_submitted,
            accepted = outcome.records_accepted(),
            rejected = outcome.records_rejected,
            final_count = ?outcome.final_count,
            "Sync complete"
        );
        Ok(outcome)
    }

    /// Vide la couche distante puis vérifie qu'elle est vide
    pub async fn truncate(&mut self) -> Result<(), SyncError> {
        info!("Truncating remote layer");
        self.classifier
            .with_retry("truncate", || self.service.truncate())
            .await?;

        let remaining = self.verify().await?;
        if remaining != 0 {
            error!(remaining, "Remote layer not empty after truncate");
            return Err(SyncError::TruncateVerification { remaining });
        }

        self.known_count = Some(0);
        Ok(())
    }

    /// Nombre d'entités distantes
    pub async fn verify(&self) -> Result<u64, SyncError> {
        let count = self
            .classifier
            .with_retry("count", || self.service.count())
            .await?;
        debug!(count, "Remote count");
        Ok(count)
    }

    fn primary_key(&self) -> Result<String, SyncError> {
        self.config
            .primary_key()
            .ok_or_else(|| SyncError::Config("upsert mode requires a primary key".into()))
    }

    fn identity_fields<'s>(&self, schema: &'s TargetSchema) -> Vec<&'s str> {
        let mut fields: Vec<&str> = IDENTITY_FIELDS.to_vec();
        fields.push(schema.object_id_field());
        fields
    }

    fn stage_append(&self, schema: &TargetSchema, records: Vec<NormalizedRecord>) -> Vec<Batch> {
        let identity = self.identity_fields(schema);
        let mut builder = BatchBuilder::new(self.config.batch_size);

        let mut batches: Vec<Batch> = records
            .into_iter()
            .filter_map(|record| builder.add(EditKind::Add, record.without_identity(&identity)))
            .collect();
        batches.extend(builder.finish());
        debug!(batches = builder.batches_emitted(), "Append batches staged");
        batches
    }

    async fn stage_upsert(
        &self,
        schema: &TargetSchema,
        records: Vec<NormalizedRecord>,
    ) -> Result<Vec<Batch>, SyncError> {
        let key = self.primary_key()?;
        let matcher = UpsertMatcher::new(self.service, &self.classifier, schema, &key);
        let mut builder = BatchBuilder::new(self.config.batch_size);
        let mut report = UpsertReport::default();
        let mut batches = Vec::new();

        let total = records.len();
        for (i, record) in records.into_iter().enumerate() {
            let resolution = matcher.resolve(&record).await?;
            report.record(resolution);
            batches.extend(matcher.stage(&mut builder, record, resolution));

            if (i + 1) % 1000 == 0 {
                info!(resolved = i + 1, total, "Resolving primary keys");
            }
        }
        batches.extend(builder.finish());

        info!(
            batches = builder.batches_emitted(),
            adds = report.adds,
            updates = report.updates,
            duplicates = report.duplicates,
            "Primary keys resolved"
        );
        Ok(batches)
    }

    async fn baseline(&mut self) -> Result<u64, SyncError> {
        match self.known_count {
            Some(count) => Ok(count),
            None => {
                let count = self.verify().await?;
                self.known_count = Some(count);
                Ok(count)
            }
        }
    }

    fn fatal(batch: &Batch, attempts: u32, last: String) -> SyncError {
        error!(
            batch = batch.sequence,
            kind = %batch.kind,
            attempts,
            last = %last,
            "Retry ceiling reached"
        );
        SyncError::FatalSubmissionFailure {
            kind: batch.kind,
            batch: batch.sequence,
            rows: batch.len(),
            attempts,
            last,
        }
    }

    /// Soumet un lot jusqu'à une issue définitive
    ///
    /// Les rejets sont absorbés (puits de rejets + bilan); seul le plafond de
    /// tentatives interrompt le run.
    async fn submit_batch(
        &mut self,
        batch: Batch,
        sink: &mut dyn DeadLetterSink,
        outcome: &mut SyncOutcome,
    ) -> Result<(), SyncError> {
        let mode = self.config.mode;
        let max_attempts = self.config.retry.max_attempts;
        let tracks_count = mode == SyncMode::Append && batch.kind == EditKind::Add;

        let mut attempts = 0u32;
        let mut explicit_rollbacks = 0u32;

        loop {
            let baseline = if tracks_count {
                Some(self.baseline().await?)
            } else {
                None
            };

            attempts += 1;
            let result = self.service.submit_edits(batch.kind, &batch.records).await;
            let disposition = self.classifier.classify(&result, mode);
            debug!(batch = batch.sequence, attempts, ?disposition, "Batch disposition");

            match disposition {
                Disposition::Accepted { rejected } => {
                    outcome.record_batch(batch.kind, batch.len(), attempts);
                    for (index, reason) in &rejected {
                        if let Some(record) = batch.records.get(*index) {
                            warn!(row = record.row, kind = %batch.kind, %reason, "Row rejected by service");
                            sink.write(record, batch.kind, reason)?;
                            outcome.record_rejected(record.clone(), batch.kind, reason);
                        }
                    }
                    let accepted = batch.len().saturating_sub(rejected.len()) as u64;
                    self.known_count = match batch.kind {
                        EditKind::Add => self.known_count.map(|c| c + accepted),
                        EditKind::Delete => self.known_count.map(|c| c.saturating_sub(accepted)),
                        EditKind::Update => self.known_count,
                    };
                    info!(batch = batch.sequence, accepted, rejected = rejected.len(), "Batch accepted");
                    return Ok(());
                }

                Disposition::RolledBack(RollbackSignal::Explicit) => {
                    explicit_rollbacks += 1;
                    if explicit_rollbacks >= 2 {
                        warn!(batch = batch.sequence, rows = ?batch.rows(), "Batch rolled back twice, dead-lettering its rows");
                        self.dead_letter_batch(&batch, attempts, "Batch rolled back twice (code 1003)", sink, outcome)?;
                        return Ok(());
                    }
                    if attempts >= max_attempts {
                        return Err(Self::fatal(&batch, attempts, "Batch rolled back (code 1003)".into()));
                    }
                    warn!(batch = batch.sequence, attempts, "Batch rolled back, resubmitting once");
                    sleep(self.classifier.policy().rollback_delay()).await;
                }

                Disposition::RolledBack(RollbackSignal::Silent) => {
                    if attempts >= max_attempts {
                        return Err(Self::fatal(&batch, attempts, "No result returned (silent rollback)".into()));
                    }
                    warn!(batch = batch.sequence, attempts, "No result returned, resubmitting");
                    sleep(self.classifier.policy().rollback_delay()).await;
                }

                Disposition::Retryable {
                    reason,
                    backoff,
                    then,
                } => {
                    let last = result
                        .err()
                        .map(|e| e.message)
                        .unwrap_or_else(|| reason.to_string());

                    if then == AfterBackoff::Resubmit && attempts >= max_attempts {
                        return Err(Self::fatal(&batch, attempts, last));
                    }
                    warn!(
                        batch = batch.sequence,
                        attempts,
                        %reason,
                        backoff_secs = backoff.as_secs(),
                        "Transient failure"
                    );
                    sleep(backoff).await;

                    match then {
                        AfterBackoff::AssumeAccepted => {
                            warn!(batch = batch.sequence, "Timeout in upsert mode, batch assumed accepted");
                            self.known_count = None;
                            outcome.record_batch(batch.kind, batch.len(), attempts);
                            return Ok(());
                        }
                        AfterBackoff::VerifyCount => {
                            let count = self.verify().await?;
                            let expected = baseline.unwrap_or(0) + batch.len() as u64;
                            if count >= expected {
                                info!(batch = batch.sequence, count, expected, "Batch landed despite timeout");
                                self.known_count = Some(count);
                                outcome.record_batch(batch.kind, batch.len(), attempts);
                                return Ok(());
                            }
                            self.known_count = Some(count);
                            if attempts >= max_attempts {
                                return Err(Self::fatal(&batch, attempts, last));
                            }
                            debug!(batch = batch.sequence, count, expected, "Batch not applied, resubmitting");
                        }
                        AfterBackoff::Resubmit => {}
                    }
                }

                Disposition::DeadLetter { reason } => {
                    warn!(batch = batch.sequence, %reason, "Unclassified failure, dead-lettering batch rows");
                    self.known_count = None;
                    self.dead_letter_batch(&batch, attempts, &reason, sink, outcome)?;
                    return Ok(());
                }
            }
        }
    }

    fn dead_letter_batch(
        &self,
        batch: &Batch,
        attempts: u32,
        reason: &str,
        sink: &mut dyn DeadLetterSink,
        outcome: &mut SyncOutcome,
    ) -> Result<(), SyncError> {
        outcome.record_batch(batch.kind, batch.len(), attempts);
        for record in &batch.records {
            sink.write(record, batch.kind, reason)?;
            outcome.record_rejected(record.clone(), batch.kind, reason);
        }
        Ok(())
    }
}
