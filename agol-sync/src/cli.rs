//! Définition et implémentation des commandes CLI
//!
//! - `sync`: CSV → couche d'entités (append ou upsert, truncate optionnel)
//! - `check`: contrôles de pré-vol uniquement, sans écriture distante

use std::path::{Path, PathBuf};
use std::time::Instant;

use agol_sync::sync::preflight;
use agol_sync::{
    ArcGisClient, CsvDeadLetter, CsvExtract, ServiceConfig, SyncConfig, SyncMode,
    SyncOrchestrator, SyncReport, TargetSchema,
};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::info;

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronize a CSV extract into a feature layer.
    ///
    /// Append mode is not idempotent: rerunning it duplicates rows unless
    /// --truncate is also given.
    Sync(SyncArgs),

    /// Run pre-flight checks only (schema, value formatting, geometries)
    Check(SyncArgs),
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Path to the CSV extract
    #[arg(long)]
    pub csv: PathBuf,

    /// Feature layer URL (défaut : config, puis env AGOL_LAYER_URL)
    #[arg(long)]
    pub layer_url: Option<String>,

    /// Access token (défaut : env AGOL_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    /// JSON config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Sync mode: append, upsert
    #[arg(long)]
    pub mode: Option<SyncMode>,

    /// Delete every remote row before loading
    #[arg(long)]
    pub truncate: bool,

    /// Primary key column (required for upsert)
    #[arg(long)]
    pub primary_key: Option<String>,

    /// Maximum rows per edit batch (défaut : 500)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// SRID of geometries without a SRID= prefix
    #[arg(long)]
    pub srid: Option<u32>,

    /// Columns to clean (non-ASCII characters and ' " < > removed)
    #[arg(long = "clean", value_delimiter = ',')]
    pub clean: Vec<String>,

    /// Directory for rejected-rows CSV files
    #[arg(long)]
    pub dead_letter_dir: Option<PathBuf>,

    /// Local target-schema descriptor (JSON) instead of the layer metadata
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Write the JSON report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// HTTP timeout in seconds (défaut : env AGOL_TIMEOUT_SECS / 300)
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Construit la configuration: fichier, puis surcharges CLI
fn load_sync_config(args: &SyncArgs) -> Result<SyncConfig> {
    let mut config = match &args.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };
    apply_config_overrides(&mut config, args);
    config.validate()?;
    Ok(config)
}

fn apply_config_overrides(config: &mut SyncConfig, args: &SyncArgs) {
    if let Some(url) = &args.layer_url {
        config.layer_url = Some(url.clone());
    }
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if args.truncate {
        config.truncate = true;
    }
    if let Some(key) = &args.primary_key {
        config.primary_key = Some(key.clone());
    }
    if let Some(size) = args.batch_size {
        config.batch_size = size;
    }
    if let Some(srid) = args.srid {
        config.source_srid = Some(srid);
    }
    if !args.clean.is_empty() {
        config.clean_columns = args.clean.clone();
    }
    if let Some(dir) = &args.dead_letter_dir {
        config.dead_letter_dir = dir.clone();
    }
    if let Some(schema) = &args.schema {
        config.schema_file = Some(schema.clone());
    }
}

fn apply_service_overrides(service: &mut ServiceConfig, config: &SyncConfig, args: &SyncArgs) {
    if let Some(url) = &config.layer_url {
        service.layer_url = url.clone();
    }
    if let Some(token) = &args.token {
        service.token = Some(token.clone());
    }
    if let Some(timeout) = args.timeout {
        service.timeout_secs = timeout;
    }
    service.geometry_column = config.geometry_column.trim().to_lowercase();
}

fn load_extract(path: &Path) -> Result<CsvExtract> {
    CsvExtract::open(path).context(format!("Failed to read CSV: {}", path.display()))
}

/// Exécute la commande sync
pub async fn cmd_sync(args: &SyncArgs) -> Result<()> {
    let config = load_sync_config(args)?;

    let mut service_config = ServiceConfig::from_env();
    apply_service_overrides(&mut service_config, &config, args);

    let extract = load_extract(&args.csv)?;
    let client = ArcGisClient::new(service_config)?;
    let layer = client.layer_url().to_string();

    println!("=== Sync {} ===", config.mode);
    println!("CSV: {} ({} rows)", args.csv.display(), extract.len());
    println!("Layer: {}", layer);
    println!("Truncate: {}", config.truncate);
    println!("Batch size: {}", config.batch_size);
    if let Some(key) = config.primary_key() {
        println!("Primary key: {}", key);
    }

    let mut orchestrator = SyncOrchestrator::new(&client, &config);
    if let Some(path) = &config.schema_file {
        orchestrator = orchestrator.with_schema(TargetSchema::load(path)?);
    }

    let started = Instant::now();
    let mut sink = CsvDeadLetter::new(&config.dead_letter_dir, &layer, chrono::Local::now());
    let result = orchestrator.run(&extract, &mut sink).await;

    let mut report = SyncReport::new(&layer, config.mode);
    report.records_read = extract.len();
    match &result {
        Ok(outcome) => report.record_outcome(outcome),
        Err(e) => report.record_failure(e),
    }
    report.set_duration(started.elapsed());
    report.finalize();
    report.display();
    info!(summary = %report.summary(), "Sync finished");

    if sink.written() > 0 {
        println!("Rejected rows written to {}", sink.path().display());
    }
    if let Some(path) = &args.report {
        report.save_to_file(path)?;
        info!(path = %path.display(), "Report saved");
    }

    result.map(|_| ()).context("Sync failed")
}

/// Exécute la commande check
pub async fn cmd_check(args: &SyncArgs) -> Result<()> {
    let config = load_sync_config(args)?;
    let extract = load_extract(&args.csv)?;

    let schema = match &config.schema_file {
        Some(path) => TargetSchema::load(path)?,
        None => {
            let mut service_config = ServiceConfig::from_env();
            apply_service_overrides(&mut service_config, &config, args);
            let client = ArcGisClient::new(service_config)?;
            SyncOrchestrator::new(&client, &config)
                .target_schema()
                .await?
        }
    };

    let records = preflight(&config, &schema, &extract)?;
    println!(
        "Pre-flight OK: {} rows ready ({} fields, geometry {:?})",
        records.len(),
        schema.fields().len(),
        schema.geometry_kind()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Commands,
    }

    fn parse(args: &[&str]) -> SyncArgs {
        match TestCli::parse_from(args).command {
            Commands::Sync(a) | Commands::Check(a) => a,
        }
    }

    #[test]
    fn test_cli_overrides_config() {
        let args = parse(&[
            "agol-sync",
            "sync",
            "--csv",
            "data.csv",
            "--mode",
            "upsert",
            "--primary-key",
            "parcel_id",
            "--clean",
            "owner,address",
            "--batch-size",
            "100",
        ]);

        let mut config = SyncConfig::default();
        apply_config_overrides(&mut config, &args);

        assert_eq!(config.mode, SyncMode::Upsert);
        assert_eq!(config.primary_key(), Some("parcel_id".to_string()));
        assert_eq!(config.clean_columns, vec!["owner", "address"]);
        assert_eq!(config.batch_size, 100);
        assert!(!config.truncate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_service_overrides() {
        let args = parse(&["agol-sync", "check", "--csv", "x.csv", "--timeout", "30"]);
        let config = SyncConfig {
            layer_url: Some("https://host/FeatureServer/0".into()),
            ..Default::default()
        };

        let mut service = ServiceConfig::default();
        apply_service_overrides(&mut service, &config, &args);
        assert_eq!(service.layer_url, "https://host/FeatureServer/0");
        assert_eq!(service.timeout_secs, 30);
        assert_eq!(service.geometry_column, "shape");
    }
}
