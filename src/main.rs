//! # Portal CLI (`portal`)
//!
//! The `portal` binary runs the search portal backend and its maintenance
//! tasks: schema setup, index synchronization, ad-hoc searches, and
//! analytics reports.
//!
//! ## Usage
//!
//! ```bash
//! portal --config ./config/portal.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `portal init` | Create the SQLite schema and the default admin user |
//! | `portal serve` | Start the HTTP API |
//! | `portal sync` | Rebuild the site index from the sites table |
//! | `portal search "<query>"` | Search the index (not recorded in analytics) |
//! | `portal index init` | Seed the site index with sample data |
//! | `portal index teardown` | Delete the site index |
//! | `portal index stats` | Print document counts for the site index |
//! | `portal analytics` | Print the analytics overview |
//! | `portal export --format csv` | Export raw analytics events |
//!
//! ## Examples
//!
//! ```bash
//! # First run
//! PORTAL_ADMIN_PASSWORD=changeme portal init
//!
//! # Filtered search
//! portal search "payroll" --filter "type = system"
//!
//! # Last 30 days of searches as CSV
//! portal export --format csv --days 30 --output ./analytics.csv
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portal_search::analytics::SqliteAnalytics;
use portal_search::auth::{self, ADMIN_PASSWORD_ENV, DEFAULT_ADMIN_PASSWORD};
use portal_search::config::{self, Config};
use portal_search::export::{self, ExportFormat};
use portal_search::index::{create_index_service, IndexService, TaskWait};
use portal_search::search::{self, QueryExecutor, SearchParams};
use portal_search::sites::{SiteSource, SiteStore};
use portal_search::sync::Synchronizer;
use portal_search::{db, migrate, server, stats};

/// Portal: search, suggestions and analytics for the internal search portal.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/portal.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "portal",
    about = "Search, suggestion and analytics backend for the internal search portal",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/portal.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and the default admin user.
    ///
    /// Idempotent. The admin password is read from `PORTAL_ADMIN_PASSWORD`.
    Init {
        #[arg(long, default_value = "admin")]
        admin_username: String,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Rebuild the site index from the sites table.
    Sync,

    /// Search the index.
    Search {
        query: String,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        offset: Option<usize>,

        /// Filter expression, e.g. `type = system`.
        #[arg(long)]
        filter: Option<String>,
    },

    /// Site index lifecycle.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Print the analytics overview.
    Analytics {
        /// Window size in days (defaults to `[analytics].default_days`).
        #[arg(long)]
        days: Option<u32>,

        /// Rows in the top and zero-result lists.
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Export raw analytics events.
    Export {
        #[arg(long, default_value = "json")]
        format: ExportFormat,

        #[arg(long)]
        days: Option<u32>,

        /// Output file; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Create the site index and load the sample documents.
    Init,
    /// Delete the site index.
    Teardown,
    /// Print index statistics.
    Stats,
}

struct Services {
    pool: sqlx::SqlitePool,
    index: Arc<dyn IndexService>,
    synchronizer: Synchronizer,
}

async fn connect_services(cfg: &Config) -> anyhow::Result<Services> {
    let pool = db::connect(&cfg.db).await?;
    migrate::run_migrations(&pool).await?;
    let index = create_index_service(&cfg.index)?;
    let sites: Arc<dyn SiteSource> = Arc::new(SiteStore::new(pool.clone()));
    let synchronizer = Synchronizer::new(
        index.clone(),
        sites,
        cfg.index.name.clone(),
        TaskWait::from_config(&cfg.index),
    );
    Ok(Services {
        pool,
        index,
        synchronizer,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portal_search=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init { admin_username } => {
            let pool = db::connect(&cfg.db).await?;
            migrate::run_migrations(&pool).await?;
            let password = std::env::var(ADMIN_PASSWORD_ENV)
                .ok()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_ADMIN_PASSWORD.to_string());
            let created =
                auth::ensure_admin(&pool, &admin_username, &password, cfg.auth.password_cost)
                    .await?;
            if created {
                println!("Created admin user '{}'.", admin_username);
            }
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Sync => {
            let services = connect_services(&cfg).await?;
            let count = services.synchronizer.full_resync().await?;
            println!(
                "Synchronized {} sites into index '{}'.",
                count,
                services.synchronizer.index_name()
            );
            services.pool.close().await;
        }
        Commands::Search {
            query,
            limit,
            offset,
            filter,
        } => {
            let index = create_index_service(&cfg.index)?;
            let executor = QueryExecutor::new(index, None, &cfg);
            let params = SearchParams {
                query: Some(query),
                limit,
                offset,
                filter,
                ..SearchParams::default()
            };
            let outcome = executor.execute_untracked(&params).await?;
            search::print_outcome(&outcome);
        }
        Commands::Index { action } => {
            let services = connect_services(&cfg).await?;
            let name = services.synchronizer.index_name().to_string();
            match action {
                IndexAction::Init => {
                    let report = services.synchronizer.initialize_with_sample_data().await?;
                    println!(
                        "Initialized index '{}' with {} sample documents (tasks {} and {}).",
                        report.index_name,
                        report.documents_added,
                        report.create_task.task_uid,
                        report.add_task.task_uid
                    );
                }
                IndexAction::Teardown => {
                    services.synchronizer.teardown().await?;
                    println!("Deleted index '{}'.", name);
                }
                IndexAction::Stats => {
                    let index_stats = services.index.get_stats(&name).await?;
                    stats::print_index_stats(&name, &index_stats);
                }
            }
            services.pool.close().await;
        }
        Commands::Analytics { days, limit } => {
            let pool = db::connect(&cfg.db).await?;
            migrate::run_migrations(&pool).await?;
            let analytics = SqliteAnalytics::new(pool.clone());
            let report = analytics
                .overview(
                    days.unwrap_or(cfg.analytics.default_days).max(1),
                    limit.unwrap_or(cfg.analytics.default_limit).max(1),
                )
                .await?;
            stats::print_overview(&report);
            pool.close().await;
        }
        Commands::Export {
            format,
            days,
            output,
        } => {
            let pool = db::connect(&cfg.db).await?;
            migrate::run_migrations(&pool).await?;
            let analytics = SqliteAnalytics::new(pool.clone());
            export::run_export(
                &analytics,
                format,
                days.unwrap_or(cfg.analytics.export_days).max(1),
                output.as_deref(),
            )
            .await?;
            pool.close().await;
        }
    }

    Ok(())
}
