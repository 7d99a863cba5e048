use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use site_access::authz::UserDirectory;
use site_access::db::SqliteStore;
use site_access::jwt::JwtConfig;
use site_access::models::project::ProjectCreateRequest;
use site_access::models::user::UserCreateRequest;

#[derive(Parser, Debug)]
#[command(author, version, about = "site-access operator tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Create a user (the first admin has to come from here)
    CreateUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: Option<String>,
        /// admin, owner, foreman/leader, worker/member
        #[arg(long, default_value = "member")]
        role: String,
        #[arg(long)]
        d1_user_id: Option<String>,
    },
    /// Register a project
    CreateProject {
        #[arg(long)]
        name: String,
        #[arg(long)]
        opportunity_id: Option<String>,
        /// Recorded as creator
        #[arg(long)]
        created_by: Option<Uuid>,
    },
    /// Mint a session token for an existing user
    IssueToken {
        #[arg(long)]
        user_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Try CWD first; in containers fall back to the crate-local `.env`.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::CreateUser {
            name,
            phone,
            role,
            d1_user_id,
        } => {
            let store = SqliteStore::new(get_pool().await?);
            let user = store
                .create_user(&UserCreateRequest {
                    name,
                    phone,
                    global_role: Some(role),
                    d1_user_id,
                })
                .await?;
            println!("{}\t{}\t{}", user.id, user.global_role, user.name);
        }
        Commands::CreateProject {
            name,
            opportunity_id,
            created_by,
        } => {
            let store = SqliteStore::new(get_pool().await?);
            let project = store
                .create_project(&ProjectCreateRequest { name, opportunity_id }, created_by)
                .await?;
            println!("{}\t{}", project.id, project.name);
        }
        Commands::IssueToken { user_id } => {
            let store = SqliteStore::new(get_pool().await?);
            let user = store
                .find_user(user_id)
                .await?
                .with_context(|| format!("user {user_id} not found"))?;
            if !user.is_active {
                anyhow::bail!("user {user_id} is deactivated");
            }

            let jwt = JwtConfig::from_env()?;
            println!("{}", jwt.encode(user.id, Uuid::new_v4())?);
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let options = SqliteConnectOptions::from_str(&database_url)
        .context("invalid DATABASE_URL")?
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    // no migrations table means nothing is applied yet
    let db_applied: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;
    let applied_versions: HashSet<i64> = if db_applied.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let version = migration.version;
        let status = if applied_versions.contains(&version) { "applied" } else { "pending" };
        let desc = migration.description.as_ref().trim();
        let name = if !desc.is_empty() { desc } else { "unknown" };
        println!("{:<8} {:<20} {}", status, version, name);
    }

    Ok(())
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // ./migrations when run from the repo root, else the crate-local folder
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}
