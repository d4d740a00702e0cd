//! Point d'entrée CLI pour agol-sync

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant ou parent
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;

use cli::Commands;

/// Synchroniser un extrait CSV vers une couche d'entités ArcGIS
#[derive(Parser)]
#[command(name = "agol-sync")]
#[command(author, version)]
#[command(about = "Synchroniser un extrait CSV (WKT) vers une couche d'entités ArcGIS")]
#[command(long_about = "Chargement en masse d'un CSV vers un service d'entités: réconciliation du schéma, typage des valeurs, reprojection, lots avec reprise et fichier de rejets.\n\nLe mode append n'est pas idempotent; utilisez --truncate ou le mode upsert pour relancer sans doublons.")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match &cli.command {
        Commands::Sync(args) => {
            info!(csv = %args.csv.display(), "Sync vers la couche d'entités");
            cli::cmd_sync(args).await?;
        }
        Commands::Check(args) => {
            info!(csv = %args.csv.display(), "Contrôles de pré-vol");
            cli::cmd_check(args).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
