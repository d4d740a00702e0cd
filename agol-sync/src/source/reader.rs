//! Décodage et parsing du fichier CSV
//!
//! Le fichier est décodé en UTF-8; en cas d'octets invalides, il est relu en
//! windows-1252 (sur-ensemble de Latin-1).

use std::borrow::Cow;
use std::path::Path;

use tracing::{debug, warn};

use super::SourceRow;
use crate::error::SyncError;

/// Extrait CSV complet (en-tête + lignes)
#[derive(Debug, Clone, Default)]
pub struct CsvExtract {
    /// Noms de colonnes en minuscules, sans espaces superflus
    pub header: Vec<String>,
    pub rows: Vec<SourceRow>,
}

impl CsvExtract {
    /// Lit un fichier CSV
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        let data = std::fs::read(path)?;
        debug!(path = %path.display(), bytes = data.len(), "Reading CSV extract");
        Self::from_bytes(&data)
    }

    /// Parse un CSV en mémoire
    pub fn from_bytes(data: &[u8]) -> Result<Self, SyncError> {
        let text = decode(data);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(text.as_bytes());

        let header: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();

        if header.iter().all(String::is_empty) {
            return Err(SyncError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "CSV file has no header row",
            )));
        }

        let mut rows = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record?;
            let mut row = SourceRow::new(i + 1);
            for (name, value) in header.iter().zip(record.iter()) {
                row.values.insert(name.clone(), value.to_string());
            }
            rows.push(row);
        }

        debug!(columns = header.len(), rows = rows.len(), "CSV extract parsed");
        Ok(Self { header, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Décode en UTF-8 (BOM retiré), ou en windows-1252 à défaut
fn decode(data: &[u8]) -> Cow<'_, str> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);

    match encoding_rs::UTF_8.decode_without_bom_handling_and_without_replacement(data) {
        Some(text) => text,
        None => {
            warn!("CSV is not valid UTF-8, decoding as windows-1252");
            encoding_rs::WINDOWS_1252.decode_without_bom_handling(data).0
        }
    }
}
