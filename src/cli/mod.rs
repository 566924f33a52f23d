use crate::config::Config;
use crate::core::{AlbumArtAdjustment, Ffmpeg, Pipeline};
use crate::logging::{LogSettings, LoggingContext};
use crate::sources::default_registry;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "music-downloader")]
#[command(about = "Download tracks and tag them with metadata and album art")]
#[command(version)]
pub struct Cli {
    /// URLs to download
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// How to make album art square
    #[arg(short = 'c', long, value_enum, alias = "album_art_adjustment")]
    pub album_art_adjustment: Option<AlbumArtAdjustment>,

    /// Output path template, e.g. "%(artist)s - %(title)s/%(title)s.%(ext)s"
    #[arg(short = 'o', long, alias = "output_template")]
    pub output_template: Option<String>,

    /// Configuration file to use instead of the per-user one
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Configuration file values with command line flags layered on top.
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(adjustment) = self.album_art_adjustment {
            config.album_art_adjustment = adjustment;
        }
        if let Some(template) = &self.output_template {
            config.output_template = template.clone();
        }
        if let Some(log_file) = &self.log_file {
            config.log_file = Some(log_file.clone());
        }

        Ok(config)
    }

    /// Runs the batch. Every URL is attempted; the exit code is a failure if
    /// any of them failed.
    pub async fn run(&self) -> Result<ExitCode> {
        let config = self.resolve_config()?;
        let logging = LoggingContext::new(&LogSettings {
            filter: config.log_filter.clone(),
            verbose: self.verbose,
            file: config.log_file.clone(),
        })?;

        tracing::dispatcher::with_default(logging.dispatch(), || {
            info!("Starting music-downloader v{}", env!("CARGO_PKG_VERSION"));
            info!("Output template: {}", config.output_template);
        });

        let registry = default_registry(&config)?;
        let muxer = Ffmpeg::new(config.ffmpeg_path.clone(), config.tag_bitrate.clone());
        let pipeline = Pipeline::new(registry, Box::new(muxer), config.options());

        let report = pipeline.run_batch(&self.urls, &logging).await;
        for (url, err) in &report.failed {
            eprintln!("Failed: {}: {}", url, err.chain());
        }

        Ok(if report.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}
