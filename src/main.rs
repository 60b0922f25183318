use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use booth_cropper::crop::detection::NullDetector;
use booth_cropper::handler::handle_records;
use booth_cropper::message::{BatchImages, OneOrMany};
use booth_cropper::pipeline::naming::{public_url, queue_key};
use booth_cropper::sink::{Persistence, RpcClient, RpcConfig};
use booth_cropper::state::data::ImageCategory;
use booth_cropper::state::library::Catalog;
use booth_cropper::store::{LocalStore, ObjectStore};
use booth_cropper::{BatchMessage, Orchestrator, PipelineConfig};

/// Extensions picked up by `enqueue`
const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "gif"];

#[derive(Parser)]
#[command(
    name = "booth-cropper",
    version,
    about = "Crop uploaded booth photos into thumbnail, product and article derivatives",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one batch message end to end against a local store
    Process {
        /// Message file (JSON record body)
        #[arg(short, long)]
        message: PathBuf,

        /// Pipeline config (JSON); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Root directory of the object store
        #[arg(short, long, default_value = "store")]
        store: PathBuf,

        /// SQLite catalog receiving the published URLs
        #[arg(long, conflicts_with = "rpc_url")]
        catalog: Option<PathBuf>,

        /// Base URL of the update RPC endpoint
        #[arg(long, env = "BOOTH_RPC_URL", requires_all = ["rpc_function", "rpc_key"])]
        rpc_url: Option<String>,

        /// Name of the update RPC function
        #[arg(long, env = "BOOTH_RPC_FUNCTION")]
        rpc_function: Option<String>,

        /// API key sent with RPC calls
        #[arg(long, env = "BOOTH_RPC_KEY", hide_env_values = true)]
        rpc_key: Option<String>,
    },

    /// Copy a folder of images into the queue and print the batch message
    Enqueue {
        /// Folder to scan recursively
        #[arg(short, long)]
        folder: PathBuf,

        #[arg(short, long)]
        booth_id: i64,

        #[arg(long, value_enum, default_value_t = CategoryArg::Product)]
        category: CategoryArg,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long, default_value = "store")]
        store: PathBuf,
    },

    /// Print the catalog's stored URLs for a booth
    Urls {
        #[arg(short, long)]
        booth_id: i64,

        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CategoryArg {
    Thumbnail,
    Article,
    Product,
}

impl From<CategoryArg> for ImageCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Thumbnail => ImageCategory::Thumbnail,
            CategoryArg::Article => ImageCategory::Article,
            CategoryArg::Product => ImageCategory::Product,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Respect RUST_LOG; default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            message,
            config,
            store,
            catalog,
            rpc_url,
            rpc_function,
            rpc_key,
        } => {
            let persistence: Arc<dyn Persistence> = match (rpc_url, rpc_function, rpc_key) {
                (Some(base_url), Some(function), Some(api_key)) => {
                    Arc::new(RpcClient::new(RpcConfig {
                        base_url,
                        function,
                        api_key,
                    }))
                }
                _ => Arc::new(open_catalog(catalog)?),
            };
            cmd_process(&message, config.as_deref(), store, persistence).await
        }
        Commands::Enqueue {
            folder,
            booth_id,
            category,
            config,
            store,
        } => cmd_enqueue(&folder, booth_id, category.into(), config.as_deref(), store).await,
        Commands::Urls { booth_id, catalog } => cmd_urls(booth_id, catalog),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn open_catalog(path: Option<PathBuf>) -> Result<Catalog> {
    let catalog = match path {
        Some(path) => Catalog::open(path),
        None => Catalog::open_default(),
    };
    catalog.context("failed to open catalog")
}

async fn cmd_process(
    message: &Path,
    config: Option<&Path>,
    store: PathBuf,
    persistence: Arc<dyn Persistence>,
) -> Result<()> {
    let config = load_config(config)?;
    let body = tokio::fs::read_to_string(message)
        .await
        .with_context(|| format!("failed to read message {}", message.display()))?;

    info!(store = %store.display(), "Processing message {}", message.display());
    let orchestrator = Orchestrator::new(
        config,
        Arc::new(LocalStore::new(store)),
        Arc::new(NullDetector),
        persistence,
    );

    let responses = handle_records(&orchestrator, std::slice::from_ref(&body)).await;
    for response in &responses {
        println!("{}", serde_json::to_string_pretty(&response.body)?);
    }

    if responses.iter().any(|r| !r.is_success()) {
        bail!("record processing failed");
    }
    Ok(())
}

async fn cmd_enqueue(
    folder: &Path,
    booth_id: i64,
    category: ImageCategory,
    config: Option<&Path>,
    store: PathBuf,
) -> Result<()> {
    let config = load_config(config)?;
    let store = LocalStore::new(store);
    let mut urls = Vec::new();

    info!("Scanning folder: {}", folder.display());

    for entry in WalkDir::new(folder)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let is_image = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));
        if !is_image {
            continue;
        }

        let filename = entry.file_name().to_string_lossy().to_string();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        let key = queue_key(&config.storage, &filename);
        store
            .put(&key, bytes)
            .await
            .with_context(|| format!("failed to enqueue {filename}"))?;
        urls.push(public_url(&config.storage, &key));
    }

    if urls.is_empty() {
        bail!("no images found in {}", folder.display());
    }
    info!(count = urls.len(), %category, "Images enqueued");

    let mut images = BatchImages::default();
    match category {
        ImageCategory::Thumbnail => {
            if urls.len() > 1 {
                warn!(skipped = urls.len() - 1, "Only one thumbnail per booth, using the first");
            }
            images.thumbnail = urls.into_iter().next();
        }
        ImageCategory::Article => images.article = Some(OneOrMany::from(urls)),
        ImageCategory::Product => images.product = Some(OneOrMany::from(urls)),
    }

    let message = BatchMessage { booth_id, images };
    println!("{}", serde_json::to_string_pretty(&message)?);
    Ok(())
}

fn cmd_urls(booth_id: i64, catalog: Option<PathBuf>) -> Result<()> {
    let catalog = open_catalog(catalog)?;
    let urls = catalog
        .booth_urls(booth_id)
        .context("failed to read catalog")?;

    match catalog.last_updated(booth_id).context("failed to read catalog")? {
        Some(at) => info!(booth_id, updated_at = %at.to_rfc3339(), "Stored URLs"),
        None => info!(booth_id, "Booth has no stored URLs"),
    }

    println!("{}", serde_json::to_string_pretty(&urls)?);
    Ok(())
}
