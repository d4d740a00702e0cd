//! Rejets: lignes refusées par le service ou abandonnées après échec
//!
//! Le fichier CSV n'est créé qu'au premier rejet.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::record::NormalizedRecord;
use crate::service::EditKind;

/// Destination des lignes rejetées (ajout seul)
pub trait DeadLetterSink {
    fn write(&mut self, record: &NormalizedRecord, kind: EditKind, reason: &str) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Nom court d'une couche à partir de son URL (`<service>_<index>`)
pub fn layer_slug(layer_url: &str) -> String {
    let segments: Vec<&str> = layer_url
        .trim_end_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    let slug = match segments
        .iter()
        .position(|s| s.eq_ignore_ascii_case("FeatureServer"))
    {
        Some(i) if i > 0 => match segments.get(i + 1) {
            Some(index) => format!("{}_{}", segments[i - 1], index),
            None => segments[i - 1].to_string(),
        },
        _ => segments.last().copied().unwrap_or("layer").to_string(),
    };

    slug.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Rejets écrits dans `<dir>/<layer>_rejected_<YYYYmmdd_HHMMSS>.csv`
pub struct CsvDeadLetter {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
    written: usize,
}

impl CsvDeadLetter {
    pub fn new(dir: &Path, layer_url: &str, started: DateTime<Local>) -> Self {
        let file_name = format!(
            "{}_rejected_{}.csv",
            layer_slug(layer_url),
            started.format("%Y%m%d_%H%M%S")
        );
        Self {
            path: dir.join(file_name),
            writer: None,
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> usize {
        self.written
    }

    fn writer(&mut self) -> io::Result<&mut csv::Writer<File>> {
        if self.writer.is_none() {
            if let Some(dir) = self.path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let mut writer = csv::Writer::from_path(&self.path)?;
            writer.write_record(["row", "kind", "reason", "attributes", "geometry"])?;
            info!(path = %self.path.display(), "Dead-letter file created");
            self.writer = Some(writer);
        }

        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "dead-letter writer unavailable"))
    }
}

impl DeadLetterSink for CsvDeadLetter {
    fn write(&mut self, record: &NormalizedRecord, kind: EditKind, reason: &str) -> io::Result<()> {
        let row = record.row.to_string();
        let kind = kind.to_string();
        let attributes = record.attributes_json().to_string();
        let geometry = record
            .geometry
            .as_ref()
            .map(|g| g.to_string())
            .unwrap_or_default();

        self.writer()?
            .write_record([
                row.as_str(),
                kind.as_str(),
                reason,
                attributes.as_str(),
                geometry.as_str(),
            ])?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for CsvDeadLetter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "Failed to flush dead-letter file");
        }
    }
}

/// Entrée de rejet conservée en mémoire
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetterEntry {
    pub row: usize,
    pub kind: EditKind,
    pub reason: String,
}

/// Rejets en mémoire (tests, dry-run)
#[derive(Debug, Default)]
pub struct MemoryDeadLetter {
    pub entries: Vec<DeadLetterEntry>,
}

impl DeadLetterSink for MemoryDeadLetter {
    fn write(&mut self, record: &NormalizedRecord, kind: EditKind, reason: &str) -> io::Result<()> {
        self.entries.push(DeadLetterEntry {
            row: record.row,
            kind,
            reason: reason.to_string(),
        });
        Ok(())
    }
}
