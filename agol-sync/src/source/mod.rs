//! Lecture de l'extrait CSV source

pub mod reader;

use std::collections::HashMap;

pub use reader::CsvExtract;

/// Ligne brute du CSV: nom de colonne en minuscules → cellule
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRow {
    /// Numéro de ligne (1 = première ligne de données)
    pub row: usize,
    pub values: HashMap<String, String>,
}

impl SourceRow {
    pub fn new(row: usize) -> Self {
        Self {
            row,
            values: HashMap::new(),
        }
    }

    /// Construit une ligne à partir de paires (colonne, valeur)
    pub fn from_pairs<'a>(row: usize, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            row,
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.trim().to_lowercase(), v.to_string()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }
}
