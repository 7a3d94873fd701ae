use std::net::SocketAddr;
use std::path::PathBuf;

use axum_range_static::{RangeStatic, SendOptions};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Serve a directory over HTTP with range request support.
#[derive(Debug, Parser)]
struct Args {
    /// Directory to serve.
    #[arg(default_value = ".")]
    root: PathBuf,

    /// JSON file with serving options; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Serve and list dotfiles.
    #[arg(long)]
    hidden: bool,

    /// Serve the index file for directory paths.
    #[arg(long)]
    format: bool,

    /// Render listings for directory paths.
    #[arg(long)]
    directory: bool,

    /// Cache-Control max-age in seconds.
    #[arg(long)]
    maxage: Option<u64>,

    #[arg(long)]
    immutable: bool,

    /// Only ever answer the first requested range.
    #[arg(long)]
    no_multipart: bool,
}

impl Args {
    fn options(&self) -> std::io::Result<SendOptions> {
        let mut options = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                serde_json::from_str(&text)?
            }
            None => SendOptions::default(),
        };
        options.root = self.root.clone();
        options.hidden |= self.hidden;
        options.format |= self.format;
        options.directory |= self.directory;
        options.immutable |= self.immutable;
        options.multipart &= !self.no_multipart;
        if let Some(maxage) = self.maxage {
            options.maxage = maxage;
        }
        Ok(options)
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let files = RangeStatic::new(args.options()?)?;
    tracing::info!(root = %files.options().root.display(), "serving directory");

    let app: axum::Router = files.router();

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
