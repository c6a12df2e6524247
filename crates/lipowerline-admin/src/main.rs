use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use lipowerline_core::{
    db, run_import, ImportOptions, ImportRequest, ScenarioStatus, ScenarioType,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about = "LiPowerline import tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply embedded database migrations
    Migrate,
    /// Normalize a staged dataset into the canonical tables
    Normalize(NormalizeArgs),
}

#[derive(Args, Debug)]
struct NormalizeArgs {
    /// Dataset identifier written by the staging loader
    #[arg(long)]
    dataset_id: Uuid,
    /// TOML file with import options; flags below override its values
    #[arg(long)]
    options: Option<PathBuf>,
    /// Line code (codigo_linha)
    #[arg(long)]
    line: Option<String>,
    #[arg(long)]
    line_name: Option<String>,
    /// Nominal voltage in kV
    #[arg(long)]
    tensao: Option<f64>,
    #[arg(long)]
    concessionaria: Option<String>,
    #[arg(long)]
    regiao: Option<String>,
    /// Scenario description
    #[arg(long)]
    scenario: Option<String>,
    /// pre_manejo, pos_manejo or simulado
    #[arg(long)]
    scenario_type: Option<String>,
    /// ativo or arquivado
    #[arg(long)]
    scenario_status: Option<String>,
    /// Scenario reference date (YYYY-MM-DD)
    #[arg(long)]
    scenario_date: Option<NaiveDate>,
    /// Run the whole import, then roll it back
    #[arg(long)]
    dry_run: bool,
    /// Skip running embedded database migrations before importing
    #[arg(long)]
    skip_migrations: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Migrate => handle_migrate().await,
        Command::Normalize(args) => handle_normalize(args).await,
    }
}

async fn connect_pool() -> Result<db::DbPool> {
    dotenvy::dotenv().ok();

    let settings = db::DbSettings::from_env()?;
    db::connect_with(&settings).await
}

async fn handle_migrate() -> Result<()> {
    let pool = connect_pool().await?;
    db::run_migrations(&pool).await?;
    info!("Migrations applied");
    Ok(())
}

async fn handle_normalize(args: NormalizeArgs) -> Result<()> {
    let options = build_options(&args)?;
    options.validate()?;

    let pool = connect_pool().await?;

    if args.skip_migrations {
        info!("Skipping migrations at user request");
    } else {
        db::run_migrations(&pool).await?;
    }

    let receipt = run_import(
        &pool,
        ImportRequest {
            dataset_id: args.dataset_id,
            options,
            dry_run: args.dry_run,
        },
    )
    .await
    .with_context(|| format!("import of dataset {} failed", args.dataset_id))?;

    println!("{}", serde_json::to_string_pretty(&receipt)?);
    if receipt.dry_run {
        println!("Dry run: no changes were committed.");
    }

    Ok(())
}

fn build_options(args: &NormalizeArgs) -> Result<ImportOptions> {
    let mut options = match &args.options {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read options file {}", path.display()))?;
            ImportOptions::from_toml(&text)
                .with_context(|| format!("failed to parse options file {}", path.display()))?
        }
        None => ImportOptions::default(),
    };

    if let Some(line) = &args.line {
        options.line_code = line.clone();
    }
    if let Some(name) = &args.line_name {
        options.line_name = Some(name.clone());
    }
    if let Some(kv) = args.tensao {
        options.voltage_kv = Some(kv);
    }
    if let Some(operator) = &args.concessionaria {
        options.operator = Some(operator.clone());
    }
    if let Some(region) = &args.regiao {
        options.region = Some(region.clone());
    }
    if let Some(description) = &args.scenario {
        options.scenario_description = description.clone();
    }
    if let Some(value) = &args.scenario_type {
        options.scenario_type = ScenarioType::parse(value)?;
    }
    if let Some(value) = &args.scenario_status {
        options.scenario_status = ScenarioStatus::parse(value)?;
    }
    if let Some(date) = args.scenario_date {
        options.scenario_date = Some(date);
    }

    Ok(options)
}
