//! CLI entry point for the book downloader.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use book_downloader_core::session::SessionTimeouts;
use book_downloader_core::{
    ArchiveSession, BookDownloader, Endpoints, GoogleDriveUploader, load_config,
};
use clap::Parser;
use tracing::{debug, info, warn};

mod cli;
mod progress;

use cli::Args;
use progress::ConsoleObserver;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = load_config(args.config.as_deref())?;
    if loaded.loaded_from_file {
        info!(path = ?loaded.path, "Loaded config file");
    }
    let mut config = loaded.config;
    args.apply_to(&mut config);
    debug!(?config, "Effective configuration");

    let endpoints = Endpoints::new(args.base_url.as_str());
    let url = match &args.url {
        Some(url) => url.trim().to_string(),
        None => prompt_for_url()?,
    };
    let prefix = endpoints.details_prefix();
    if !url.starts_with(&prefix) {
        bail!("Invalid URL. URL must start with \"{prefix}\"");
    }

    let timeouts: SessionTimeouts = config.timeouts();
    let session = ArchiveSession::new(timeouts).context("Failed to create HTTP session")?;
    let create_pdf = config.create_pdf;
    let upload = config.upload_to_drive;
    let drive_token = config.drive_access_token.clone();

    let mut downloader = BookDownloader::new(Arc::new(session), endpoints, config);
    if upload {
        match drive_token.map(|token| GoogleDriveUploader::new(token, timeouts)) {
            Some(Ok(uploader)) => downloader = downloader.with_uploader(Arc::new(uploader)),
            Some(Err(e)) => warn!(error = %e, "Google Drive upload disabled"),
            None => warn!("Google Drive upload requested but no access token is configured"),
        }
    }

    let observer = ConsoleObserver::new(args.quiet);
    let outcome = downloader.download_book(&url, &observer).await;
    observer.finish().await;
    let report = outcome?;

    info!(
        book = %report.book_id,
        pages = report.pages,
        failed = report.failed_pages.len(),
        returned = report.returned,
        "Download complete"
    );

    if !args.quiet {
        println!("Download complete!");
        match (&report.link, &report.pdf) {
            (Some(link), _) => println!("Shareable link: {link}"),
            (None, Some(pdf)) => println!("PDF: {}", pdf.display()),
            (None, None) if create_pdf => {}
            (None, None) => println!("Images saved in directory: {}", report.directory.display()),
        }
    }

    Ok(())
}

fn prompt_for_url() -> Result<String> {
    print!("Enter archive.org book URL: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read the book URL")?;
    Ok(line.trim().to_string())
}
