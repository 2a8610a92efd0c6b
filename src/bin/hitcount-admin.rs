use anyhow::Result;
use clap::{Parser, Subcommand};
use hitcount::config::{Config, DatabaseBackend};
use hitcount::hitcount::HitCountService;
use hitcount::storage::{PostgresStorage, SqliteStorage, Storage};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "hitcount-admin")]
#[command(about = "Hit counter admin management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage blacklisted IP addresses
    BlacklistIp {
        #[command(subcommand)]
        action: BlacklistAction,
    },
    /// Manage blacklisted user agents
    BlacklistAgent {
        #[command(subcommand)]
        action: BlacklistAction,
    },
    /// Manage blog posts
    Post {
        #[command(subcommand)]
        action: PostAction,
    },
    /// Clear the active flag on hits outside the active window
    Expire,
    /// Delete hits older than HITCOUNT_KEEP_HIT_IN_DATABASE_SECS
    Cleanup,
}

#[derive(Subcommand)]
enum BlacklistAction {
    /// Add an exact-match entry
    Add { value: String },
    /// Remove an entry
    Remove { value: String },
    /// List all entries
    List,
}

#[derive(Subcommand)]
enum PostAction {
    /// Create a post
    Create { title: String, content: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => Arc::new(
            SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
        ),
        DatabaseBackend::Postgres => Arc::new(
            PostgresStorage::new(&config.database.url, config.database.max_connections).await?,
        ),
    };

    // Ensure database is initialized
    storage.init().await?;

    match cli.command {
        Commands::BlacklistIp { action } => match action {
            BlacklistAction::Add { value } => {
                if storage.add_blacklisted_ip(&value).await? {
                    println!("✓ Blacklisted IP '{}'", value);
                } else {
                    println!("⚠ IP '{}' was already blacklisted", value);
                }
            }
            BlacklistAction::Remove { value } => {
                if storage.remove_blacklisted_ip(&value).await? {
                    println!("✓ Removed IP '{}' from the blacklist", value);
                } else {
                    println!("⚠ IP '{}' was not blacklisted", value);
                }
            }
            BlacklistAction::List => print_entries("Blacklisted IPs", storage.list_blacklisted_ips().await?),
        },
        Commands::BlacklistAgent { action } => match action {
            BlacklistAction::Add { value } => {
                if storage.add_blacklisted_user_agent(&value).await? {
                    println!("✓ Blacklisted user agent '{}'", value);
                } else {
                    println!("⚠ User agent '{}' was already blacklisted", value);
                }
            }
            BlacklistAction::Remove { value } => {
                if storage.remove_blacklisted_user_agent(&value).await? {
                    println!("✓ Removed user agent '{}' from the blacklist", value);
                } else {
                    println!("⚠ User agent '{}' was not blacklisted", value);
                }
            }
            BlacklistAction::List => print_entries(
                "Blacklisted user agents",
                storage.list_blacklisted_user_agents().await?,
            ),
        },
        Commands::Post { action } => match action {
            PostAction::Create { title, content } => {
                let post = storage.create_post(&title, &content).await?;
                println!("✓ Created post {} '{}'", post.id, post.title);
            }
        },
        Commands::Expire => {
            let service = HitCountService::new(Arc::clone(&storage), config.hitcount.clone());
            let expired = service.expire_hits().await?;
            println!("✓ Expired {} hit(s)", expired);
        }
        Commands::Cleanup => {
            let service = HitCountService::new(Arc::clone(&storage), config.hitcount.clone());
            let deleted = service.cleanup().await?;
            println!("✓ Deleted {} hit(s)", deleted);
        }
    }

    Ok(())
}

fn print_entries(title: &str, entries: Vec<String>) {
    if entries.is_empty() {
        println!("No entries found.");
        return;
    }

    println!("{}:", title);
    println!("{}", "-".repeat(80));
    for entry in entries {
        println!("{}", entry);
    }
}
