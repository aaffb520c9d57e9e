use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use bookmark_stage::clock::SystemClock;
use bookmark_stage::codec::Format;
use bookmark_stage::config::{default_data_dir, StageConfig};
use bookmark_stage::engine::{ExportOutcome, NothingToSync, PushOutcome, StageEngine};
use bookmark_stage::host::{detect_default_bookmarks, BookmarkHost, ChromiumHost, DetachedHost, HostFlavor};
use bookmark_stage::kv::FileStore;
use bookmark_stage::progress;
use bookmark_stage::resolver::FolderResolver;
use bookmark_stage::scheduler::{self, SchedulerConfig};
use bookmark_stage::tree::NodeId;

#[derive(Parser)]
#[command(name = "bookmark-stage")]
#[command(about = "Stage browser bookmarks, export/import them, and push them back without duplicates", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (JSON). Defaults to <data dir>/config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Where the stage and metadata are kept
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Chromium profile `Bookmarks` file to read from and push into
    #[arg(long, global = true)]
    bookmarks: Option<PathBuf>,

    /// Host browser family: chromium or firefox
    #[arg(long, global = true)]
    flavor: Option<HostFlavor>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture every bookmark in the live tree into the stage (replaces it)
    Pull,

    /// Add staged bookmarks missing from the live tree into one folder
    Push {
        /// Destination folder title
        #[arg(short, long)]
        folder: Option<String>,

        /// Dry run - show what would be added without making changes
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Replace the stage with a .json or .html bookmark file
    Import {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Write the stage to a file
    Export {
        /// Output format: json or html
        #[arg(long, default_value = "json")]
        format: Format,

        /// Output file. Defaults to bookmarks_<date>.<ext>
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show what is staged and how old it is
    Status,

    /// Drop the stage if it is older than the TTL
    Expire,

    /// Run periodic maintenance until Ctrl+C
    Maintain {
        /// Minutes between runs (60-1440)
        #[arg(long)]
        interval_minutes: Option<u64>,
    },
}

impl Commands {
    fn needs_host(&self) -> bool {
        matches!(self, Commands::Pull | Commands::Push { .. })
    }
}

fn load_config(cli: &Cli) -> Result<StageConfig> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.data_dir.clone().unwrap_or_else(default_data_dir).join("config.json"));

    let mut config = StageConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(file) = &cli.bookmarks {
        config.bookmarks_file = Some(file.clone());
    }
    if let Some(flavor) = cli.flavor {
        config.host_flavor = flavor;
    }
    if let Commands::Maintain {
        interval_minutes: Some(minutes),
    } = &cli.command
    {
        config.maintenance_interval_minutes = *minutes;
    }

    config.validate()?;
    Ok(config)
}

fn build_engine(config: &StageConfig, needs_host: bool) -> Result<StageEngine> {
    let host: Arc<dyn BookmarkHost> = if needs_host {
        match config.bookmarks_file.clone().or_else(detect_default_bookmarks) {
            Some(path) => Arc::new(ChromiumHost::open(&path).with_context(|| format!("Failed to open {:?}", path))?),
            None => Arc::new(DetachedHost::new(
                "no Chromium bookmarks file found; pass --bookmarks",
            )),
        }
    } else {
        Arc::new(DetachedHost::new("this command does not use the live tree"))
    };

    let store = Arc::new(FileStore::new(&config.data_dir));
    let resolver =
        FolderResolver::new(config.default_parent.clone().map(NodeId::new)).with_flavor(config.host_flavor);

    Ok(StageEngine::new(host, store, Arc::new(SystemClock))
        .with_resolver(resolver)
        .with_folder_title(config.folder_title.clone())
        .with_ttl(config.ttl())
        .with_progress(true))
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis)
        .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let config = load_config(&cli)?;
    let engine = build_engine(&config, cli.command.needs_host())?;
    engine.initialize().await?;

    match cli.command {
        Commands::Pull => {
            let spinner = progress::create_spinner("Reading bookmarks...");
            match engine.capture_pull().await {
                Ok(outcome) => {
                    progress::finish_with_success(&spinner, &format!("Staged {} bookmarks", outcome.count));
                }
                Err(e) => {
                    progress::finish_with_error(&spinner, "Capture failed");
                    return Err(e.into());
                }
            }
        }

        Commands::Push { folder, dry_run } => {
            if dry_run {
                info!("🏃 Dry run mode - no changes will be made");
                let pending = engine.pending_push().await?;
                println!("\n📊 Push Preview:");
                println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
                for record in &pending {
                    println!("  + {} <{}>", record.title, record.url);
                }
                println!("  ─────────────────────────────────────────");
                println!("  {} bookmarks would be added", pending.len());
                println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
                return Ok(());
            }

            match engine.push(folder.as_deref()).await? {
                PushOutcome::NothingToSync(NothingToSync::EmptyStage) => {
                    println!("📭 Nothing staged. Run `pull` or `import` first.");
                }
                PushOutcome::NothingToSync(NothingToSync::AllPresent) => {
                    println!("✅ Nothing to sync, every staged bookmark is already present.");
                }
                PushOutcome::Applied { container, added, failed } => {
                    println!("✅ Added {} bookmarks to folder {}", added, container);
                    if !failed.is_empty() {
                        println!("⚠️  {} bookmarks failed:", failed.len());
                        for failure in &failed {
                            println!("   {} ({})", failure.url, failure.error);
                        }
                    }
                }
            }
        }

        Commands::Import { file } => {
            let format = Format::from_path(&file).with_context(|| {
                format!("Unsupported file type {:?}: use .json, .html or .htm", file)
            })?;
            let payload = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {:?}", file))?;

            let outcome = engine.import(&payload, format).await?;
            println!(
                "✅ Imported {} bookmarks ({} skipped, {} duplicates)",
                outcome.imported, outcome.skipped, outcome.duplicates
            );
        }

        Commands::Export { format, output } => match engine.export(format).await? {
            ExportOutcome::EmptyStage => {
                println!("📭 Nothing staged to export.");
            }
            ExportOutcome::Exported { payload, count } => {
                let path = output.unwrap_or_else(|| {
                    PathBuf::from(format!(
                        "bookmarks_{}.{}",
                        chrono::Local::now().format("%Y-%m-%d"),
                        format.extension()
                    ))
                });
                tokio::fs::write(&path, payload)
                    .await
                    .with_context(|| format!("Failed to write {:?}", path))?;
                println!("✅ Exported {} bookmarks to {}", count, path.display());
            }
        },

        Commands::Status => {
            let status = engine.status().await?;
            println!("\n📊 Stage Status:");
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            match &status.snapshot {
                Some(snapshot) => {
                    println!("  Staged:   {} bookmarks", snapshot.count);
                    println!("  Captured: {}", format_millis(snapshot.captured_at));
                    if status.expired {
                        println!("  ⚠️  Older than {} h, will be expired", config.ttl_hours);
                    }
                }
                None => println!("  Staged:   nothing"),
            }
            if let Some(meta) = &status.metadata {
                println!("  Version:  {}", meta.version);
                println!("  Syncs:    {}", meta.total_syncs);
                if let Some(last) = meta.last_maintenance {
                    println!("  Last maintenance: {}", format_millis(last));
                }
            }
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
        }

        Commands::Expire => {
            if engine.expire_if_stale().await? {
                println!("🗑️  Stale stage removed.");
            } else {
                println!("✅ Stage is fresh (or empty), nothing removed.");
            }
        }

        Commands::Maintain { .. } => {
            let config = SchedulerConfig::new(config.maintenance_interval_minutes, true);
            scheduler::start_scheduler(Arc::new(engine), config).await?;
        }
    }

    Ok(())
}
