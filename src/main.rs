mod db;
mod entities;
mod error;
mod gallery;
mod models;
mod routes;
mod state;
mod storage;
mod thumbnail;
mod validation;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gallery::GalleryService;
use state::AppState;
use storage::{LocalDisk, Storage};
use thumbnail::{ThumbnailConfig, ThumbnailGenerator};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Database path
    #[arg(short, long, env = "DATABASE_PATH", default_value = "gallery.db")]
    db_path: String,

    /// Root directory for uploaded originals and thumbnails
    #[arg(short, long, env = "STORAGE_DIR", default_value = "./storage")]
    storage_dir: PathBuf,

    /// Longest side of generated thumbnails, in pixels
    #[arg(long, env = "THUMBNAIL_SIZE", default_value_t = 300)]
    thumbnail_size: u32,

    /// Regenerate every thumbnail before serving
    #[arg(long)]
    rebuild_thumbnails: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gallery_server=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    let port = args.port;

    // Ensure storage directory exists
    tokio::fs::create_dir_all(&args.storage_dir).await?;

    tracing::info!("Initializing database at {}", args.db_path);
    let db = db::init_pool(&args.db_path).await?;

    let storage: Arc<dyn Storage> = Arc::new(LocalDisk::new(&args.storage_dir, "/storage"));
    let thumbnails = ThumbnailGenerator::new(
        storage.clone(),
        ThumbnailConfig {
            max_dimension: args.thumbnail_size,
        },
    );
    let gallery = GalleryService::new(db, storage, thumbnails);

    if args.rebuild_thumbnails {
        gallery.rebuild_thumbnails().await?;
    }

    let state = AppState::new(gallery);
    let app = routes::router(state, &args.storage_dir);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("Gallery listening on http://localhost:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
