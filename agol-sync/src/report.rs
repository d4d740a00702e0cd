//! Résultat et rapport d'une synchronisation
//!
//! [`SyncOutcome`] est renvoyé par l'orchestrateur; [`SyncReport`] en est la
//! vue affichable et sérialisable produite par le binaire.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use crate::config::SyncMode;
use crate::error::SyncError;
use crate::record::NormalizedRecord;
use crate::service::EditKind;

/// Ligne rejetée avec sa raison
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    pub record: NormalizedRecord,
    pub kind: EditKind,
    pub reason: String,
}

/// Statistiques par type d'édition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindStats {
    /// Lots soumis
    pub batches: usize,
    /// Lignes soumises
    pub submitted: usize,
    /// Lignes rejetées
    pub rejected: usize,
    /// Soumissions effectuées (reprises comprises)
    pub attempts: usize,
}

impl KindStats {
    pub fn accepted(&self) -> usize {
        self.submitted.saturating_sub(self.rejected)
    }
}

/// Bilan d'une synchronisation réussie
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub records_submitted: usize,
    pub records_rejected: usize,
    pub rejected_rows: Vec<RejectedRow>,
    pub by_kind: BTreeMap<EditKind, KindStats>,
    /// La couche a été vidée avant l'envoi
    pub truncated: bool,
    /// Nombre d'entités distantes à la vérification finale
    pub final_count: Option<u64>,
}

impl SyncOutcome {
    /// Enregistre un lot soumis
    pub fn record_batch(&mut self, kind: EditKind, rows: usize, attempts: u32) {
        self.records_submitted += rows;
        let stats = self.by_kind.entry(kind).or_default();
        stats.batches += 1;
        stats.submitted += rows;
        stats.attempts += attempts as usize;
    }

    /// Enregistre une ligne rejetée
    pub fn record_rejected(&mut self, record: NormalizedRecord, kind: EditKind, reason: &str) {
        self.records_rejected += 1;
        self.by_kind.entry(kind).or_default().rejected += 1;
        self.rejected_rows.push(RejectedRow {
            record,
            kind,
            reason: reason.to_string(),
        });
    }

    pub fn records_accepted(&self) -> usize {
        self.records_submitted.saturating_sub(self.records_rejected)
    }

    pub fn stats(&self, kind: EditKind) -> KindStats {
        self.by_kind.get(&kind).cloned().unwrap_or_default()
    }
}

/// Statut global du run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncStatus {
    /// Toutes les lignes acceptées
    Success,
    /// Run terminé avec des rejets
    PartialSuccess,
    /// Run interrompu, ou aucune ligne acceptée
    Failed,
}

/// Ligne rejetée, version rapport
#[derive(Debug, Clone, Serialize)]
pub struct RejectedSummary {
    pub row: usize,
    pub kind: EditKind,
    pub reason: String,
}

/// Rapport complet d'un run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// URL de la couche cible
    pub layer: String,
    pub mode: SyncMode,
    /// Durée du run
    pub duration_secs: f64,
    pub status: SyncStatus,

    /// Lignes lues dans le CSV
    pub records_read: usize,
    pub records_submitted: usize,
    pub records_rejected: usize,
    pub truncated: bool,
    pub final_count: Option<u64>,

    /// Statistiques par type d'édition
    pub by_kind: BTreeMap<EditKind, KindStats>,

    /// Lignes rejetées
    pub rejected: Vec<RejectedSummary>,

    /// Erreur fatale, le cas échéant
    pub error: Option<String>,
}

impl SyncReport {
    /// Crée un rapport vide pour une couche
    pub fn new(layer: &str, mode: SyncMode) -> Self {
        Self {
            layer: layer.to_string(),
            mode,
            duration_secs: 0.0,
            status: SyncStatus::Success,
            records_read: 0,
            records_submitted: 0,
            records_rejected: 0,
            truncated: false,
            final_count: None,
            by_kind: BTreeMap::new(),
            rejected: Vec::new(),
            error: None,
        }
    }

    /// Reporte le bilan d'un run réussi
    pub fn record_outcome(&mut self, outcome: &SyncOutcome) {
        self.records_submitted = outcome.records_submitted;
        self.records_rejected = outcome.records_rejected;
        self.truncated = outcome.truncated;
        self.final_count = outcome.final_count;
        self.by_kind = outcome.by_kind.clone();
        self.rejected = outcome
            .rejected_rows
            .iter()
            .map(|r| RejectedSummary {
                row: r.record.row,
                kind: r.kind,
                reason: r.reason.clone(),
            })
            .collect();
    }

    /// Enregistre l'erreur fatale d'un run
    pub fn record_failure(&mut self, error: &SyncError) {
        self.error = Some(error.to_string());
    }

    /// Définit la durée du run
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final
    pub fn finalize(&mut self) {
        let accepted = self.records_submitted.saturating_sub(self.records_rejected);

        self.status = if self.error.is_some() {
            SyncStatus::Failed
        } else if self.records_rejected > 0 && accepted > 0 {
            SyncStatus::PartialSuccess
        } else if self.records_rejected > 0 {
            SyncStatus::Failed
        } else {
            SyncStatus::Success
        };
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("SYNC REPORT - {} ({})", self.layer, self.mode);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        println!("\n--- SUMMARY ---");
        println!(
            "Records: {} read, {} submitted, {} rejected",
            self.records_read, self.records_submitted, self.records_rejected
        );
        if self.truncated {
            println!("Layer truncated before load");
        }
        if let Some(count) = self.final_count {
            println!("Remote count after sync: {}", count);
        }

        if !self.by_kind.is_empty() {
            println!("\n--- BY KIND ---");
            for (kind, stats) in &self.by_kind {
                println!(
                    "  {}: {} batches, {} submitted, {} accepted, {} rejected, {} attempts",
                    kind,
                    stats.batches,
                    stats.submitted,
                    stats.accepted(),
                    stats.rejected,
                    stats.attempts
                );
            }
        }

        if !self.rejected.is_empty() {
            println!("\n--- REJECTED ({}) ---", self.rejected.len());
            for r in self.rejected.iter().take(20) {
                println!("  [row {}] {} {}", r.row, r.kind, r.reason);
            }
            if self.rejected.len() > 20 {
                println!("  ... and {} more", self.rejected.len() - 20);
            }
        }

        if let Some(error) = &self.error {
            println!("\n--- FATAL ---");
            println!("  {}", error);
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}: {} submitted, {} rejected, status {:?}",
            self.layer, self.records_submitted, self.records_rejected, self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome_with_rejects(submitted: usize, rejected: usize) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        outcome.record_batch(EditKind::Add, submitted, 1);
        for row in 0..rejected {
            outcome.record_rejected(NormalizedRecord::new(row + 1), EditKind::Add, "Error code 1019");
        }
        outcome
    }

    #[test]
    fn test_outcome_counters() {
        let mut outcome = outcome_with_rejects(10, 2);
        outcome.record_batch(EditKind::Update, 3, 2);

        assert_eq!(outcome.records_submitted, 13);
        assert_eq!(outcome.records_rejected, 2);
        assert_eq!(outcome.records_accepted(), 11);
        assert_eq!(outcome.stats(EditKind::Add).accepted(), 8);
        assert_eq!(outcome.stats(EditKind::Update).attempts, 2);
        assert_eq!(outcome.stats(EditKind::Delete), KindStats::default());
    }

    #[test]
    fn test_finalize_success() {
        let mut report = SyncReport::new("layer", SyncMode::Append);
        report.record_outcome(&outcome_with_rejects(5, 0));
        report.finalize();
        assert_eq!(report.status, SyncStatus::Success);
    }

    #[test]
    fn test_finalize_partial_success() {
        let mut report = SyncReport::new("layer", SyncMode::Append);
        report.record_outcome(&outcome_with_rejects(5, 1));
        report.finalize();
        assert_eq!(report.status, SyncStatus::PartialSuccess);
        assert_eq!(report.rejected[0].row, 1);
    }

    #[test]
    fn test_finalize_failed() {
        let mut report = SyncReport::new("layer", SyncMode::Upsert);
        report.record_failure(&SyncError::EmptyAfterSync { submitted: 3 });
        report.finalize();
        assert_eq!(report.status, SyncStatus::Failed);

        let mut all_rejected = SyncReport::new("layer", SyncMode::Append);
        all_rejected.record_outcome(&outcome_with_rejects(2, 2));
        all_rejected.finalize();
        assert_eq!(all_rejected.status, SyncStatus::Failed);
    }

    #[test]
    fn test_save_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let mut report = SyncReport::new("Parcels_0", SyncMode::Append);
        report.record_outcome(&outcome_with_rejects(4, 1));
        report.finalize();
        report.save_to_file(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["records_submitted"], 4);
        assert_eq!(json["by_kind"]["add"]["rejected"], 1);
        assert_eq!(json["mode"], "append");

        assert!(report.summary().contains("4 submitted"));
    }
}
