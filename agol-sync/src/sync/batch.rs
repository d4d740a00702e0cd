//! Regroupement des enregistrements en lots homogènes

use std::collections::BTreeMap;

use tracing::debug;

use crate::record::NormalizedRecord;
use crate::service::EditKind;

/// Taille de lot par défaut
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Lot d'éditions d'un seul type
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub kind: EditKind,
    /// Numéro d'émission (1 = premier lot du run)
    pub sequence: usize,
    pub records: Vec<NormalizedRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Numéros de lignes source du lot
    pub fn rows(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.row).collect()
    }
}

/// Accumulateur par type d'édition
///
/// Chaque type a sa propre file; un lot est émis dès qu'une file atteint la
/// taille maximale, les restes sont émis par [`BatchBuilder::finish`].
#[derive(Debug)]
pub struct BatchBuilder {
    batch_size: usize,
    pending: BTreeMap<EditKind, Vec<NormalizedRecord>>,
    seen: BTreeMap<EditKind, usize>,
    emitted: usize,
}

impl BatchBuilder {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pending: BTreeMap::new(),
            seen: BTreeMap::new(),
            emitted: 0,
        }
    }

    /// Ajoute un enregistrement; retourne un lot plein le cas échéant
    pub fn add(&mut self, kind: EditKind, record: NormalizedRecord) -> Option<Batch> {
        *self.seen.entry(kind).or_default() += 1;

        let queue = self.pending.entry(kind).or_default();
        queue.push(record);

        if queue.len() >= self.batch_size {
            let records = std::mem::take(queue);
            Some(self.emit(kind, records))
        } else {
            None
        }
    }

    /// Émet les lots partiels restants (ordre: delete, add, update)
    pub fn finish(&mut self) -> Vec<Batch> {
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(kind, records)| self.emit(kind, records))
            .collect()
    }

    /// Enregistrements reçus pour un type
    pub fn seen(&self, kind: EditKind) -> usize {
        self.seen.get(&kind).copied().unwrap_or(0)
    }

    pub fn batches_emitted(&self) -> usize {
        self.emitted
    }

    fn emit(&mut self, kind: EditKind, records: Vec<NormalizedRecord>) -> Batch {
        self.emitted += 1;
        debug!(
            kind = %kind,
            batch = self.emitted,
            rows = records.len(),
            seen = self.seen(kind),
            "Batch ready"
        );
        Batch {
            kind,
            sequence: self.emitted,
            records,
        }
    }
}
