//! # Command Line Interface
//!
//! Operator commands over the configured store: schema migration, listing,
//! secret evaluation, and copying every record into another backend. Results
//! are written as JSON lines.

pub mod output;

use crate::config::{AppConfig, BackendKind};
use crate::domain::{DeletedMode, ListParams};
use crate::services::SecretService;
use crate::storage::{copy_all, create_pool, list_applied_migrations, run_db_migrations, Store};
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "keystash")]
#[command(about = "Keystash secrets storage tooling")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// TOML configuration file; `KEYSTASH__*` environment variables override it
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending database migrations and list the applied ones
    Migrate,

    /// List records of one collection
    List {
        #[arg(value_enum)]
        collection: Collection,

        /// Soft-delete filter: live, deleted or both
        #[arg(long, default_value = "live")]
        deleted: DeletedMode,

        /// Shell-style name pattern
        #[arg(long)]
        name: Option<String>,

        /// Sort key, `field` or `field:desc`; repeatable
        #[arg(long = "sort")]
        sort: Vec<String>,

        /// 1-based page number
        #[arg(long, requires = "page_size")]
        page: Option<u64>,

        #[arg(long)]
        page_size: Option<u64>,
    },

    /// Resolve a secret's value
    Eval {
        /// Secret ID
        id: i64,
    },

    /// Copy every record from the configured backend into another one
    Copy {
        /// Target backend: memory, database, key_value or file
        #[arg(long)]
        to: BackendKind,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Collection {
    Folders,
    Paths,
    Secrets,
}

impl Commands {
    fn list_params(
        deleted: DeletedMode,
        name: Option<String>,
        sort: &[String],
        page: Option<u64>,
        page_size: Option<u64>,
    ) -> ListParams {
        let mut params = ListParams::new().with_deleted(deleted);
        if let Some(pattern) = name {
            params = params.with_name(pattern);
        }
        for key in sort {
            params = match key.split_once(':') {
                Some((field, dir)) => params.sort_by(field, !dir.eq_ignore_ascii_case("desc")),
                None => params.sort_by(key.as_str(), true),
            };
        }
        if let Some(page_size) = page_size {
            params = params.paginate(page.unwrap_or(1), page_size);
        }
        params
    }
}

/// Parse arguments, load configuration, initialise logging and run
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }
    crate::observability::init_logging(&config.observability)?;
    crate::observability::log_config_info(&config);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(cli.command, &config, &mut out).await
}

/// Run one command against the configured store, writing results to `out`
pub async fn execute<W: Write>(
    command: Commands,
    config: &AppConfig,
    out: &mut W,
) -> anyhow::Result<()> {
    match command {
        Commands::Migrate => {
            let pool = create_pool(&config.storage.database).await?;
            run_db_migrations(&pool).await?;
            for migration in list_applied_migrations(&pool).await? {
                output::write_json_line(out, &migration)?;
            }
        }

        Commands::List { collection, deleted, name, sort, page, page_size } => {
            let params = Commands::list_params(deleted, name, &sort, page, page_size);
            let service = SecretService::new(Store::from_config(&config.storage).await?);
            match collection {
                Collection::Folders => {
                    output::write_json_lines(out, &service.list_folders(&params).await?)?
                }
                Collection::Paths => {
                    output::write_json_lines(out, &service.list_paths(&params).await?)?
                }
                Collection::Secrets => {
                    output::write_json_lines(out, &service.list_secrets(&params).await?)?
                }
            }
        }

        Commands::Eval { id } => {
            let service = SecretService::new(Store::from_config(&config.storage).await?);
            let value = service.evaluate_secret(id).await?;
            output::write_json_line(out, &json!({ "id": id, "value": value }))?;
        }

        Commands::Copy { to } => {
            if to == config.storage.backend {
                anyhow::bail!("Source and target backend are both '{}'", to);
            }
            let source = Store::from_config(&config.storage).await?;
            let mut target_config = config.storage.clone();
            target_config.backend = to;
            target_config.mirror = false;
            let target = Store::from_config(&target_config).await?;

            let report = copy_all(&source, &target).await?;
            info!(copied = report.copied(), failed = report.failed.len(), "Copy finished");
            for failure in &report.failed {
                output::write_json_line(
                    out,
                    &json!({ "entity": failure.entity, "id": failure.id, "error": failure.error }),
                )?;
            }
            output::write_json_line(
                out,
                &json!({
                    "from": source.backend(),
                    "to": target.backend(),
                    "folders": report.folders,
                    "paths": report.paths,
                    "secrets": report.secrets,
                    "failed": report.failed.len(),
                }),
            )?;
            if !report.is_complete() {
                anyhow::bail!("{} record(s) could not be copied", report.failed.len());
            }
        }
    }

    Ok(())
}
