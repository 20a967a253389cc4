use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use mutanabbi::auth;
use mutanabbi::config;
use mutanabbi::db::{self, books::BookInput, users::NewUser, Pool};
use mutanabbi::model::{BookSource, BookstoreStatus, Role};

#[derive(Debug, Parser)]
#[command(author, version, about = "Administrative tasks for the marketplace database")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an admin account, or promote an existing account by email
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
    },
    /// Approve a pending bookstore
    ApproveBookstore {
        #[arg(long)]
        id: i64,
    },
    /// Import library books from a JSON array of book objects
    ImportLibrary {
        #[arg(long)]
        file: PathBuf,
    },
    /// Print an example configuration to stdout
    PrintExampleConfig,
}

/// Load the config and open the migrated database it points at.
async fn open_db(config_path: &Path) -> Result<Pool> {
    let cfg = config::load(Some(config_path))?;
    cfg.ensure_dirs()?;
    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;
    Ok(pool)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mutanabbi=info,mutanabbi_admin=info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    match args.command {
        Command::PrintExampleConfig => print!("{}", config::example()),
        Command::CreateAdmin {
            email,
            name,
            password,
        } => {
            let pool = open_db(&args.config).await?;
            let email = auth::normalize_email(&email)?;
            if let Some(existing) = db::users::get_by_email(&pool, &email).await? {
                db::users::set_role(&pool, existing.id, Role::Admin).await?;
                info!(user_id = existing.id, "existing account promoted to admin");
                return Ok(());
            }
            let name = auth::validate_name("name", &name)?;
            auth::validate_password(&password)?;
            let hash = auth::hash_password(&password)?;
            let user = db::users::create(
                &pool,
                NewUser {
                    name: &name,
                    email: &email,
                    password_hash: &hash,
                    role: Role::Admin,
                },
            )
            .await?;
            info!(user_id = user.id, "admin created");
        }
        Command::ApproveBookstore { id } => {
            let pool = open_db(&args.config).await?;
            let store = db::bookstores::set_status(&pool, id, BookstoreStatus::Approved).await?;
            info!(bookstore_id = store.id, name = %store.name, "bookstore approved");
        }
        Command::ImportLibrary { file } => {
            let pool = open_db(&args.config).await?;
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let books: Vec<BookInput> =
                serde_json::from_str(&raw).context("expected a JSON array of books")?;
            if books.is_empty() {
                bail!("{} contains no books", file.display());
            }
            let total = books.len();
            let mut imported = 0usize;
            for (idx, book) in books.into_iter().enumerate() {
                let title = book.title.clone();
                match book.validated() {
                    Ok(book) => {
                        db::books::create(&pool, None, BookSource::Library, &book).await?;
                        imported += 1;
                    }
                    Err(err) => warn!(idx, %title, %err, "skipping invalid book"),
                }
            }
            info!(imported, skipped = total - imported, "library import finished");
        }
    }

    Ok(())
}
