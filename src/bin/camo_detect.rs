use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use camo_spotter::acquisition::ImageFile;
use camo_spotter::client::{AnalysisClient, ClientConfig, DEFAULT_ENDPOINT};
use camo_spotter::presenter::{annotate, preview_image, render, render_text};
use camo_spotter::session::{Notice, Session};

/// Detect camouflaged animals in a photo.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Image to analyze
    #[arg(value_name = "IMAGE")]
    image: PathBuf,
    /// Analysis service endpoint
    #[arg(long, env = "CAMO_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,
    /// Write the annotated detection map to this file
    #[arg(long, short, value_name = "FILE")]
    output: Option<PathBuf>,
    /// Print the rendered view as JSON instead of text
    #[arg(long)]
    json: bool,
    /// Request timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout: u64,
    /// Retries after a network failure
    #[arg(long, default_value_t = 0)]
    retries: u32,
}

fn report(notice: Option<Notice>) {
    if let Some(notice) = notice {
        eprintln!("{}: {}", notice.title, notice.description);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let client = AnalysisClient::new(ClientConfig {
        endpoint: args.endpoint,
        timeout: Duration::from_secs(args.timeout),
        max_retries: args.retries,
    })?;

    let mut session = Session::new();
    let file = ImageFile::from_path(&args.image)
        .with_context(|| format!("Failed to read {}", args.image.display()))?;
    let notice = session.select_file(file)?;
    if session.image().is_none() {
        report(notice);
        bail!("{} was not accepted", args.image.display());
    }

    info!("Analyzing via {}", client.endpoint());
    let notice = session.analyze_with(&client).await?;
    report(notice);

    let (Some(upload), Some(result)) = (session.image(), session.result()) else {
        bail!("analysis failed");
    };
    let view = render(result, &upload.preview);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{}", render_text(&view));
    }

    if let Some(path) = args.output {
        let preview = preview_image(&view).context("Failed to decode image")?;
        annotate(&preview, &view)
            .save(&path)
            .with_context(|| format!("Failed to save {}", path.display()))?;
        info!("Detection map written to {}", path.display());
    }

    Ok(())
}
