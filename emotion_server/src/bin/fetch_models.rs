//! Download the pretrained models into the cache directory ahead of time.
//!
use anyhow::Result;
use clap::Parser;
use emotion_server::{
    config::init_logger,
    utils::{model_cache_dir, resolve_cached_model, EMOTION_FERPLUS, ULTRAFACE_320, ULTRAFACE_640},
};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Also fetch the 640x480 face model
    #[clap(long)]
    all_variants: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logger(false);

    let mut sources = vec![ULTRAFACE_320, EMOTION_FERPLUS];
    if args.all_variants {
        sources.push(ULTRAFACE_640);
    }

    let cache_dir = model_cache_dir()?;
    let client = reqwest::Client::new();
    for source in sources {
        let path = resolve_cached_model(&client, &source, &cache_dir).await?;
        log::info!("{} available at {}", source.file_name, path.display());
    }

    Ok(())
}
