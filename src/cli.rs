//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use book_downloader_core::Config;

/// Download a borrowable archive.org book as a PDF.
///
/// Logs in with the configured account, borrows the book, downloads every
/// page, assembles them into a PDF and returns the loan.
#[derive(Parser, Debug)]
#[command(name = "book-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Book details URL (https://archive.org/details/...); prompted for when omitted
    pub url: Option<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/book-downloader/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Image downscale factor, 0 for full resolution (0-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub resolution: Option<u8>,

    /// Maximum concurrent page downloads (1-100)
    #[arg(short = 't', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub threads: Option<u8>,

    /// Maximum requests per page before it is given up (1-10)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_retries: Option<u8>,

    /// Directory for page folders and PDFs
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Keep the page images instead of creating a PDF
    #[arg(long)]
    pub no_pdf: bool,

    /// Write metadata.json next to the page images
    #[arg(long)]
    pub save_metadata: bool,

    /// Upload the PDF to Google Drive and print a shareable link
    #[arg(long)]
    pub upload: bool,

    /// Site base URL
    #[arg(long, hide = true, default_value = "https://archive.org")]
    pub base_url: String,
}

impl Args {
    /// Applies command-line overrides on top of the loaded configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(resolution) = self.resolution {
            config.resolution = resolution;
        }
        if let Some(threads) = self.threads {
            config.thread_count = usize::from(threads);
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = u32::from(max_retries);
        }
        if let Some(output_dir) = &self.output_dir {
            config.output_dir.clone_from(output_dir);
        }
        if self.no_pdf {
            config.create_pdf = false;
        }
        if self.save_metadata {
            config.save_metadata = true;
        }
        if self.upload {
            config.upload_to_drive = true;
        }
    }
}
