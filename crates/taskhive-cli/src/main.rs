//! TaskHive CLI - add and inspect work items in a queue file.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use taskhive_core::{scheduler, ItemStatus, Priority, QueueStats, WorkItem, WorkerId};
use taskhive_store::{LockConfig, WorkQueue};

/// TaskHive CLI - Work queue management tool
#[derive(Parser)]
#[command(name = "taskhive")]
#[command(about = "Add and inspect TaskHive work items", long_about = None)]
struct Cli {
    /// Record store file
    #[arg(short, long, default_value = ".taskhive/queue.jsonl")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append a new ready item
    Add {
        /// Short summary of the work
        #[arg(short, long)]
        title: String,

        /// Full instructions for the agent
        #[arg(short, long, default_value = "")]
        description: String,

        /// critical, high, medium, or low
        #[arg(short, long, default_value = "medium")]
        priority: Priority,

        /// Item that must complete first (repeatable)
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,

        /// Item blocking this one (repeatable)
        #[arg(long = "blocked-by")]
        blocked_by: Vec<String>,

        /// Attempts before the item is marked failed
        #[arg(long)]
        max_retries: Option<u32>,

        /// Explicit item id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// List items
    List {
        /// Only show items with this status
        #[arg(long)]
        status: Option<ItemStatus>,
    },

    /// Show one item
    Show {
        /// Item ID
        id: String,
    },

    /// Print queue counters
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let worker = WorkerId::new(format!("cli-{}", std::process::id()));
    let queue = WorkQueue::open(cli.store, worker, LockConfig::default());
    debug!(store = %queue.path().display(), "Opened queue");

    match cli.command {
        Commands::Add {
            title,
            description,
            priority,
            depends_on,
            blocked_by,
            max_retries,
            id,
        } => {
            let mut item = WorkItem::new(title, description).with_priority(priority);
            if let Some(id) = id {
                item = item.with_id(id);
            }
            if let Some(max_retries) = max_retries {
                item = item.with_max_retries(max_retries);
            }
            for dep in depends_on {
                item = item.with_dependency(dep);
            }
            for blocker in blocked_by {
                item = item.with_blocker(blocker);
            }
            let id = queue.enqueue(item).await?;
            println!("{}", id);
        }
        Commands::List { status } => {
            list_items(&queue, status)?;
        }
        Commands::Show { id } => {
            show_item(&queue, &id)?;
        }
        Commands::Stats { json } => {
            let stats = QueueStats::from_items(&queue.snapshot()?);
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&stats);
            }
        }
    }

    Ok(())
}

fn list_items(
    queue: &WorkQueue,
    status: Option<ItemStatus>,
) -> Result<(), Box<dyn std::error::Error>> {
    let items: Vec<WorkItem> = queue
        .snapshot()?
        .into_iter()
        .filter(|item| status.map_or(true, |s| item.status == s))
        .collect();

    println!("Items ({}):", items.len());
    println!(
        "{:<36}  {:<11}  {:<8}  {:<7}  {}",
        "ID", "STATUS", "PRIORITY", "RETRY", "TITLE"
    );
    println!("{}", "-".repeat(90));

    for item in items {
        let retries = format!("{}/{}", item.retry_count, item.max_retries);
        println!(
            "{:<36}  {:<11}  {:<8}  {:<7}  {}",
            item.id.as_str(),
            item.status.as_str(),
            item.priority.as_str(),
            retries,
            item.title
        );
    }

    Ok(())
}

fn show_item(queue: &WorkQueue, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let items = queue.snapshot()?;
    let item = items
        .iter()
        .find(|item| item.id.as_str() == id)
        .ok_or_else(|| format!("Work item not found: {}", id))?;

    println!("{}", serde_json::to_string_pretty(item)?);

    if item.status == ItemStatus::Ready {
        let unmet = scheduler::unmet_prerequisites(item, &items);
        if !unmet.is_empty() {
            let ids: Vec<&str> = unmet.iter().map(|id| id.as_str()).collect();
            println!("Waiting on: {}", ids.join(", "));
        }
    }
    if let Some(completed_at) = item.completed_at {
        println!("Completed:  {}", format_timestamp(completed_at));
    }

    Ok(())
}

fn print_stats(stats: &QueueStats) {
    println!("  Total:       {}", stats.total);
    println!("  Ready:       {} ({} claimable)", stats.ready, stats.claimable);
    println!("  In progress: {}", stats.in_progress);
    println!("  Completed:   {}", stats.completed);
    println!("  Failed:      {}", stats.failed);
    if stats.is_drained() {
        println!("  Queue is drained.");
    }
}

fn format_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}
