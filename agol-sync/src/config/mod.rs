//! Configuration d'une synchronisation

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::sync::batch::DEFAULT_BATCH_SIZE;

/// Mode de synchronisation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Ajout pur (non idempotent: relancer duplique les lignes)
    #[default]
    Append,
    /// Ajout ou mise à jour par clé primaire
    Upsert,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SyncMode::Append => "append",
            SyncMode::Upsert => "upsert",
        })
    }
}

impl std::str::FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "append" => Ok(SyncMode::Append),
            "upsert" => Ok(SyncMode::Upsert),
            other => Err(format!("Unknown mode: {}. Use: append, upsert", other)),
        }
    }
}

/// Politique de reprise des soumissions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Nombre maximal de soumissions par lot
    pub max_attempts: u32,
    /// Attente après un timeout
    pub timeout_backoff_secs: u64,
    /// Attente après une requête ambiguë ou un 502/503
    pub gateway_backoff_secs: u64,
    /// Attente après un 504
    pub gateway_timeout_backoff_secs: u64,
    /// Attente avant de resoumettre un lot annulé
    pub rollback_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            timeout_backoff_secs: 60,
            gateway_backoff_secs: 20,
            gateway_timeout_backoff_secs: 60,
            rollback_delay_secs: 60,
        }
    }
}

impl RetryPolicy {
    /// Politique sans attente (tests)
    pub fn immediate() -> Self {
        Self {
            timeout_backoff_secs: 0,
            gateway_backoff_secs: 0,
            gateway_timeout_backoff_secs: 0,
            rollback_delay_secs: 0,
            ..Self::default()
        }
    }

    pub fn timeout_backoff(&self) -> Duration {
        Duration::from_secs(self.timeout_backoff_secs)
    }

    pub fn gateway_backoff(&self) -> Duration {
        Duration::from_secs(self.gateway_backoff_secs)
    }

    pub fn gateway_timeout_backoff(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_backoff_secs)
    }

    pub fn rollback_delay(&self) -> Duration {
        Duration::from_secs(self.rollback_delay_secs)
    }
}

/// Configuration principale d'un run
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// URL de la couche cible (prioritaire sur `AGOL_LAYER_URL`)
    pub layer_url: Option<String>,

    pub mode: SyncMode,

    /// Vider la couche avant l'envoi
    pub truncate: bool,

    /// Clé primaire (obligatoire en upsert)
    pub primary_key: Option<String>,

    /// Colonnes à nettoyer (non ASCII, `' " < >`)
    pub clean_columns: Vec<String>,

    pub batch_size: usize,

    /// SRID des géométries sans préfixe `SRID=`
    pub source_srid: Option<u32>,

    /// Nom de la colonne géométrie du CSV
    pub geometry_column: String,

    /// Répertoire des fichiers de rejets
    pub dead_letter_dir: PathBuf,

    /// Descripteur de schéma local (sinon lu sur le service)
    pub schema_file: Option<PathBuf>,

    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            layer_url: None,
            mode: SyncMode::Append,
            truncate: false,
            primary_key: None,
            clean_columns: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            source_srid: None,
            geometry_column: "shape".to_string(),
            dead_letter_dir: PathBuf::from("rejected"),
            schema_file: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Charge une configuration depuis un fichier JSON
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_json::from_str(&content).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Vérifie la cohérence de la configuration
    pub fn validate(&self) -> Result<()> {
        if self.mode == SyncMode::Upsert
            && self.primary_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            anyhow::bail!("Upsert mode requires a primary key");
        }
        if self.batch_size == 0 {
            anyhow::bail!("Batch size must be greater than zero");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        Ok(())
    }

    /// Clé primaire normalisée (minuscules)
    pub fn primary_key(&self) -> Option<String> {
        self.primary_key
            .as_deref()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
    }
}
