use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use feedshelf::categories::{OrderMap, TreeRow};
use feedshelf::config::{Config, SECRET_ENV};
use feedshelf::coordinator::PersistenceCoordinator;
use feedshelf::feed::{opml, FeedRecord};
use feedshelf::gate::{HttpGate, LocalGate, SessionGate};
use feedshelf::storage::{Database, DatabaseError};

/// Get the config directory path (~/.config/feedshelf/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedshelf"))
}

#[derive(Parser, Debug)]
#[command(name = "feedshelf", about = "Categorized feed list administration")]
struct Args {
    /// Config file (defaults to ~/.config/feedshelf/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the category tree
    Tree,

    /// Add a feed, or update the one with the same id
    Add {
        id: String,
        url: String,
        /// Slash-delimited category path, e.g. "News/Tech"
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        sub: bool,
    },

    /// Remove a feed
    Remove { id: String },

    /// Reorder the top-level groups
    MoveGroups {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Reorder the child groups of a group
    MoveChildren {
        parent: String,
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Reorder the feeds filed directly under a group
    MoveFeeds {
        parent: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Add every feed from an OPML file; folders become categories
    Import { file: PathBuf },

    /// Write the tree as OPML
    Export { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    // SEC-007: Set directory permissions on Unix (user-only access)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path).context("Failed to load configuration")?;

    let Some(secret) = config.resolve_secret(std::env::var(SECRET_ENV).ok()) else {
        eprintln!("Error: no admin secret configured.");
        eprintln!();
        eprintln!("Set {} or add to {}:", SECRET_ENV, config_path.display());
        eprintln!("  admin_secret = \"...\"");
        std::process::exit(1);
    };

    let gate = open_gate(&config, &config_dir, &secret).await?;
    let mut coordinator = PersistenceCoordinator::with_window(gate, secret, config.debounce());
    coordinator
        .load()
        .await
        .context("Failed to load the feed list")?;

    match args.command {
        Command::Tree => print_tree(&coordinator),
        Command::Add {
            id,
            url,
            category,
            title,
            sub,
        } => {
            let mut record = FeedRecord::new(id, url);
            record.category = category;
            record.custom_title = title;
            record.is_sub = sub;
            coordinator.upsert(record).await?;
            print_tree(&coordinator);
        }
        Command::Remove { id } => {
            coordinator.remove(&id).await?;
            print_tree(&coordinator);
        }
        Command::MoveGroups { names } => {
            coordinator.reorder_top_level(&names);
            finish_reorder(&mut coordinator).await?;
        }
        Command::MoveChildren { parent, names } => {
            coordinator.reorder_children(&parent, &names);
            finish_reorder(&mut coordinator).await?;
        }
        Command::MoveFeeds { parent, ids } => {
            coordinator.reorder_feeds(&parent, &ids);
            finish_reorder(&mut coordinator).await?;
        }
        Command::Import { file } => import(&mut coordinator, &file).await?,
        Command::Export { file } => {
            let tree = coordinator.tree();
            opml::export_to_file(&tree, coordinator.order_map(), &file)?;
            println!("Exported {} feeds to {}", tree.total_count(), file.display());
        }
    }

    Ok(())
}

/// Remote API when `api_base_url` is set, otherwise the local SQLite store.
async fn open_gate(
    config: &Config,
    config_dir: &std::path::Path,
    secret: &SecretString,
) -> Result<Arc<dyn SessionGate>> {
    if let Some(base_url) = &config.api_base_url {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(30))
            .build()?;
        let gate = HttpGate::new(client, base_url).context("Invalid api_base_url")?;
        tracing::info!(base_url = %base_url, "Using remote feed store");
        return Ok(Arc::new(gate));
    }

    let db_path = config_dir.join("feeds.db");
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: the feed database is locked by another process. Try again shortly.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };
    tracing::info!(path = %db_path.display(), "Using local feed store");
    let expected = SecretString::from(secret.expose_secret().to_owned());
    Ok(Arc::new(LocalGate::new(db, expected)))
}

/// Wait for the debounced write, then show the result.
async fn finish_reorder(coordinator: &mut PersistenceCoordinator) -> Result<()> {
    if let Err(e) = coordinator.settle().await {
        eprintln!("Reorder was not saved: {}", e);
        eprintln!("Showing the saved order:");
        print_tree(coordinator);
        std::process::exit(1);
    }
    print_tree(coordinator);
    Ok(())
}

async fn import(coordinator: &mut PersistenceCoordinator, file: &std::path::Path) -> Result<()> {
    // SEC-008: Canonicalize to resolve symlinks, then require a regular file
    let canonical = file
        .canonicalize()
        .with_context(|| format!("Failed to resolve import file: {}", file.display()))?;
    if !std::fs::metadata(&canonical)?.is_file() {
        anyhow::bail!("Import path must be a regular file");
    }
    let path_str = canonical
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in import path"))?;

    let records = opml::parse(path_str)
        .await
        .context("Failed to parse OPML file")?;
    if records.is_empty() {
        eprintln!("Warning: No valid feeds found in OPML file");
        return Ok(());
    }

    let total = records.len();
    let mut imported = 0;
    for record in records {
        let id = record.id.clone();
        match coordinator.upsert(record).await {
            Ok(()) => imported += 1,
            Err(e) => eprintln!("Skipped {}: {}", id, e),
        }
    }
    println!("Imported {} of {} feeds", imported, total);
    Ok(())
}

fn print_tree(coordinator: &PersistenceCoordinator) {
    let tree = coordinator.tree();
    let order_map: &OrderMap = coordinator.order_map();
    if tree.total_count() == 0 {
        println!("(no feeds)");
        return;
    }
    for row in tree.visible_rows(order_map) {
        match row {
            TreeRow::Group { depth, node } => {
                println!("{}{}/ ({})", "  ".repeat(depth), node.name, node.feed_count());
            }
            TreeRow::Feed { depth, record } => {
                let sub = if record.is_sub { " *" } else { "" };
                println!(
                    "{}{}  [{}]{}",
                    "  ".repeat(depth),
                    record.display_title(),
                    record.id,
                    sub
                );
            }
        }
    }
}
