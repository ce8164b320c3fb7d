mod files;
mod imports;
mod mapping;
mod runtime;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sfimport_core::{CategoryMappingMode, FileType, JobStatus, UpdateMode};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sfimport")]
#[command(about = "Storefront catalog import command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse a file and report valid and invalid records without importing
    Validate {
        /// Catalog file (.csv, .xml or .zip)
        file: PathBuf,
        /// Override the format inferred from the file extension
        #[arg(long = "type")]
        file_type: Option<FileType>,
    },
    /// Show the first records of a file and the detected variant families
    Preview {
        file: PathBuf,
        #[arg(long = "type")]
        file_type: Option<FileType>,
        /// Number of records to show
        #[arg(long, default_value = "10")]
        limit: usize,
        /// Print the preview as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the CSV import template
    Template,
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    #[command(flatten)]
    Service(ServiceCommands),
}

/// Commands that run against the database and the import queue.
#[derive(Debug, Subcommand)]
enum ServiceCommands {
    /// Import a file into a storefront and wait for the job to finish
    Import {
        file: PathBuf,
        #[arg(long)]
        storefront: i64,
        #[arg(long)]
        user: i64,
        #[arg(long = "type")]
        file_type: Option<FileType>,
        /// create_only, update_only or upsert
        #[arg(long, default_value = "upsert")]
        update_mode: UpdateMode,
        /// auto, manual or skip
        #[arg(long, default_value = "auto")]
        category_mode: CategoryMappingMode,
    },
    /// Download a catalog from an http(s) URL, import it and wait for the job
    ImportUrl {
        url: String,
        #[arg(long)]
        storefront: i64,
        #[arg(long)]
        user: i64,
        /// Override the format inferred from the URL or the response
        #[arg(long = "type")]
        file_type: Option<FileType>,
        #[arg(long, default_value = "upsert")]
        update_mode: UpdateMode,
        #[arg(long, default_value = "auto")]
        category_mode: CategoryMappingMode,
    },
    /// Show a job with its progress and error rows
    Status {
        #[arg(long)]
        job: i64,
    },
    /// List the jobs of a storefront, newest first
    Jobs {
        #[arg(long)]
        storefront: i64,
        /// Filter by status (pending, processing, completed, failed, cancelled)
        #[arg(long)]
        status: Option<JobStatus>,
        #[arg(long, default_value = "20")]
        limit: i64,
        #[arg(long, default_value = "0")]
        offset: i64,
    },
    /// Cancel a pending or processing job
    Cancel {
        #[arg(long)]
        job: i64,
    },
    /// Re-run a failed or cancelled job with the given file, or by fetching
    /// its source URL again when no file is given
    Retry {
        #[arg(long)]
        job: i64,
        file: Option<PathBuf>,
    },
    /// Category mapping management
    Categories {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// Attribute mapping review
    Attributes {
        #[command(subcommand)]
        command: AttributeCommands,
    },
}

#[derive(Debug, Subcommand)]
enum CategoryCommands {
    /// Pin an external category path to an internal category
    Pin {
        #[arg(long)]
        storefront: i64,
        #[arg(long)]
        path: String,
        #[arg(long)]
        category: i64,
    },
    /// List stored mappings of a storefront
    List {
        #[arg(long)]
        storefront: i64,
    },
    /// Suggest mappings for every external category in a file
    Analyze {
        file: PathBuf,
        #[arg(long)]
        storefront: i64,
        #[arg(long = "type")]
        file_type: Option<FileType>,
    },
}

#[derive(Debug, Subcommand)]
enum AttributeCommands {
    /// Show how each external attribute in a file would be mapped
    Analyze {
        file: PathBuf,
        #[arg(long = "type")]
        file_type: Option<FileType>,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
    /// Check database connectivity
    Ping,
}

fn init_tracing(default_level: &str) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        // File-only commands work without a database or configuration.
        Some(Commands::Validate { file, file_type }) => {
            init_tracing("warn")?;
            imports::run_validate(&file, file_type)
        }
        Some(Commands::Preview {
            file,
            file_type,
            limit,
            json,
        }) => {
            init_tracing("warn")?;
            imports::run_preview(&file, file_type, limit, json)
        }
        Some(Commands::Template) => {
            print!("{}", sfimport_pipeline::ImportService::csv_template());
            Ok(())
        }
        Some(Commands::Db { command }) => {
            let config = sfimport_core::load_app_config()?;
            init_tracing(&config.log_level)?;
            let pool = runtime::connect(&config).await?;
            run_db(&pool, &command).await
        }
        Some(Commands::Service(command)) => {
            let config = sfimport_core::load_app_config()?;
            init_tracing(&config.log_level)?;
            let pool = runtime::connect(&config).await?;
            let runtime = runtime::Runtime::build(&config, pool)?;
            let result = dispatch(&runtime, command).await;
            runtime.shutdown().await;
            result
        }
        None => {
            println!("sfimport: run with --help for available commands");
            Ok(())
        }
    }
}

async fn run_db(pool: &sqlx::PgPool, command: &DbCommands) -> anyhow::Result<()> {
    match command {
        DbCommands::Migrate => {
            let applied = sfimport_db::run_migrations(pool).await?;
            println!("applied {applied} migration(s)");
        }
        DbCommands::Ping => {
            sfimport_db::ping(pool).await?;
            println!("database reachable");
        }
    }
    Ok(())
}

async fn dispatch(runtime: &runtime::Runtime, command: ServiceCommands) -> anyhow::Result<()> {
    match command {
        ServiceCommands::Import {
            file,
            storefront,
            user,
            file_type,
            update_mode,
            category_mode,
        } => {
            let request = imports::ImportRequest {
                source: imports::CatalogSource::File(file),
                storefront_id: storefront,
                user_id: user,
                file_type,
                update_mode,
                category_mode,
            };
            imports::run_import(runtime, &request).await
        }
        ServiceCommands::ImportUrl {
            url,
            storefront,
            user,
            file_type,
            update_mode,
            category_mode,
        } => {
            let request = imports::ImportRequest {
                source: imports::CatalogSource::Url(url),
                storefront_id: storefront,
                user_id: user,
                file_type,
                update_mode,
                category_mode,
            };
            imports::run_import(runtime, &request).await
        }
        ServiceCommands::Status { job } => imports::run_status(runtime, job).await,
        ServiceCommands::Jobs {
            storefront,
            status,
            limit,
            offset,
        } => imports::run_jobs(runtime, storefront, status, limit, offset).await,
        ServiceCommands::Cancel { job } => imports::run_cancel(runtime, job).await,
        ServiceCommands::Retry { job, file } => {
            imports::run_retry(runtime, job, file.as_deref()).await
        }
        ServiceCommands::Categories { command } => match command {
            CategoryCommands::Pin {
                storefront,
                path,
                category,
            } => mapping::run_pin(runtime, storefront, &path, category).await,
            CategoryCommands::List { storefront } => mapping::run_list(runtime, storefront).await,
            CategoryCommands::Analyze {
                file,
                storefront,
                file_type,
            } => mapping::run_analyze_categories(runtime, storefront, &file, file_type).await,
        },
        ServiceCommands::Attributes { command } => match command {
            AttributeCommands::Analyze { file, file_type } => {
                mapping::run_analyze_attributes(runtime, &file, file_type).await
            }
        },
    }
}
