use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use tenant_authz::authz::provider;
use tenant_authz::models::assignment::AssignmentInput;
use tenant_authz::store::{role, user, AssignmentStore};
use tenant_authz::utils::hash_password;

#[derive(Parser, Debug)]
#[command(author, version, about = "tenant-authz admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Create a user and optionally assign roles by code
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        /// 0 is the platform tenant
        #[arg(long, default_value_t = 0)]
        tenant_id: u32,
        #[arg(long = "role")]
        roles: Vec<String>,
    },
    /// Print the compiled role to endpoint map as JSON
    CompilePolicies,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
        }
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
            username,
            password,
            tenant_id,
            roles,
        } => {
            let pool = get_pool().await?;
            create_user(&pool, &username, &password, tenant_id, &roles).await?;
        }
        Commands::CompilePolicies => {
            let pool = get_pool().await?;
            let compiled = provider::provide(&pool).await?;
            println!("{}", serde_json::to_string_pretty(&compiled)?);
        }
    }

    Ok(())
}

async fn create_user(
    pool: &SqlitePool,
    username: &str,
    password: &str,
    tenant_id: u32,
    role_codes: &[String],
) -> anyhow::Result<()> {
    let password_hash = hash_password(password)?;
    let created = user::create(pool, tenant_id, username, &password_hash).await?;
    println!("Created user {} (id {}) in tenant {}", created.username, created.id, tenant_id);

    if role_codes.is_empty() {
        return Ok(());
    }

    let role_ids = role::ids_by_codes(pool, tenant_id, role_codes).await?;
    if role_ids.len() != role_codes.len() {
        anyhow::bail!("some of the roles {:?} do not exist in tenant {}", role_codes, tenant_id);
    }

    let rows: Vec<AssignmentInput> = role_ids.into_iter().map(AssignmentInput::target).collect();
    AssignmentStore::user_roles()
        .replace(pool, created.id, tenant_id, &rows, None)
        .await?;
    println!("Assigned roles: {}", role_codes.join(", "));

    Ok(())
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let sanitized = sanitize_name(name);
    let filename = format!("{}_{}.sql", timestamp, sanitized);
    let path = Path::new("migrations").join(filename);

    if path.exists() {
        anyhow::bail!("migration already exists: {}", path.display());
    }

    fs::write(&path, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", path.display()))?;

    Ok(path)
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let table: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;

    let applied_versions: HashSet<i64> = if table.is_some() {
        sqlx::query_scalar::<_, i64>("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} Name", "Status", "Version");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) {
            "applied"
        } else {
            "pending"
        };
        let desc = migration.description.trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
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
