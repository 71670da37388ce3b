//! Emotion detection server binary.
//!
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use emotion_server::{app, config::init_logger, config::DetectorOpts, detector::EmotionDetector};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address to serve the capture page and detection endpoint on
    #[clap(long, default_value = "127.0.0.1:8000")]
    server_address: String,

    /// Directory with the static assets of the capture page
    #[clap(long)]
    static_dir: Option<PathBuf>,

    /// Log at debug level unless `RUST_LOG` says otherwise
    #[clap(long)]
    debug: bool,

    #[clap(flatten)]
    detector: DetectorOpts,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logger(args.debug);

    // The detector lives as long as the server; failing to load the models aborts startup
    let detector: Arc<dyn EmotionDetector> = Arc::new(args.detector.build_detector().await?);

    let static_dir = args
        .static_dir
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("static"));

    let app = app(detector, static_dir);

    // Serve HTTP server
    let addr: SocketAddr = args.server_address.parse()?;
    log::info!("Serving on http://{addr}");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
