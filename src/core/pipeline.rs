use crate::config::Options;
use crate::core::artwork::{self, adjust_album_art};
use crate::core::error::{Error, Result};
use crate::core::muxer::Muxer;
use crate::core::registry::SourceRegistry;
use crate::core::schema::MetadataKey;
use crate::core::track::{MetadataValue, Track};
use crate::logging::LoggingContext;
use crate::utils::sanitize_url;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Runs image work off the async workers, keeping the caller's log dispatcher.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|dispatch| dispatch.clone());
    tokio::task::spawn_blocking(move || tracing::dispatcher::with_default(&dispatch, work))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

/// Drives each URL from source lookup to a tagged audio file.
///
/// Every stage takes the [`Track`] by value and hands it back on success, so
/// exactly one stage owns a track at any time. A failing stage drops the
/// track, which also removes any temporary album art it still holds.
pub struct Pipeline {
    registry: SourceRegistry,
    muxer: Box<dyn Muxer>,
    options: Options,
}

impl Pipeline {
    pub fn new(registry: SourceRegistry, muxer: Box<dyn Muxer>, options: Options) -> Self {
        Self {
            registry,
            muxer,
            options,
        }
    }

    pub fn resolve(&self, url: &str) -> Result<Track> {
        let url = sanitize_url(url);
        let source = self.registry.identify(&url)?;
        debug!("Resolved {} to source {}", url, source.name());
        Ok(Track::new(url, source))
    }

    pub async fn fetch_metadata(&self, mut track: Track) -> Result<Track> {
        let source = track.source().clone();
        let fetched = source
            .get_metadata(&track)
            .await
            .map_err(|e| Error::metadata_retrieval(track.url(), e))?;

        if let Some(album_art) = fetched.album_art {
            track.set_artwork(album_art);
        }
        let merged = track.metadata.merge(&fetched.fields);
        debug!("Merged {} canonical metadata fields", merged);
        if track.set_raw_source_metadata(fetched.fields).is_err() {
            warn!("Raw source metadata was already recorded, keeping the first copy");
        }

        info!("Identified URL as {}", track);
        Ok(track)
    }

    pub async fn download(&self, track: Track) -> Result<Track> {
        let source = track.source().clone();
        let options = self.options.for_source(source.field_map());

        info!("Downloading and saving track...");
        let path = source.save_track(&track, &options).await?;
        if !path.is_file() {
            return Err(Error::DownloadPathUnknown {
                url: track.url().to_string(),
            });
        }

        info!("Saved file as {}", path.display());
        if let Err(path) = track.set_filepath(path) {
            warn!("Track already had a file, ignoring {}", path.display());
        }
        Ok(track)
    }

    /// Moves the temporary album art next to the audio file as `cover.png`.
    pub async fn materialize_album_art(&self, mut track: Track) -> Result<Track> {
        let Some(artwork) = track.take_artwork() else {
            warn!("Track has no album art to save");
            return Ok(track);
        };
        let audio = track
            .filepath()
            .ok_or_else(|| Error::DownloadPathUnknown {
                url: track.url().to_string(),
            })?
            .to_path_buf();

        let cover = run_blocking(move || artwork::materialize_album_art(artwork, &audio)).await?;
        info!("Saved track album art as {}", cover.display());
        track.metadata.set(MetadataKey::AlbumArt, MetadataValue::Path(cover));
        Ok(track)
    }

    pub async fn apply_metadata(&self, track: Track) -> Result<Track> {
        let audio = track
            .filepath()
            .ok_or_else(|| Error::DownloadPathUnknown {
                url: track.url().to_string(),
            })?
            .to_path_buf();

        info!("Applying metadata to track...");
        self.muxer.write_tags(&audio, &track.metadata).await?;
        info!("Applied text metadata to track");

        let cover = match track.metadata.path(MetadataKey::AlbumArt) {
            Some(cover) if cover.is_file() => cover.to_path_buf(),
            Some(cover) => {
                warn!("Album art {} does not exist, skipping cover", cover.display());
                return Ok(track);
            }
            None => return Ok(track),
        };

        let adjustment = self.options.album_art_adjustment;
        let adjust_target = cover.clone();
        run_blocking(move || adjust_album_art(&adjust_target, adjustment)).await?;
        info!("Adjusted album art with adjustment {}", adjustment);

        self.muxer.embed_cover(&audio, &cover).await?;
        info!("Applied album art metadata to track");
        Ok(track)
    }

    /// Runs every stage for one URL.
    pub async fn process(&self, url: &str) -> Result<Track> {
        info!("Processing URL...");
        let track = self.resolve(url)?;
        let track = self.fetch_metadata(track).await?;
        let track = self.download(track).await?;
        let track = self.materialize_album_art(track).await?;
        self.apply_metadata(track).await
    }

    /// Processes `urls` one after another. A failing URL is logged and
    /// recorded, then the batch moves on.
    pub async fn run_batch<I, S>(&self, urls: I, logging: &LoggingContext) -> BatchReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let urls: Vec<String> = urls.into_iter().map(|url| url.as_ref().to_string()).collect();
        self.run_urls(urls)
            .with_subscriber(logging.dispatch().clone())
            .await
    }

    async fn run_urls(&self, urls: Vec<String>) -> BatchReport {
        let mut report = BatchReport::default();

        for url in urls {
            let span = info_span!("track", url = %url);
            match self.process(&url).instrument(span).await {
                Ok(track) => {
                    info!(url = %url, "Successfully processed track {}", track);
                    report.succeeded.push(url);
                }
                Err(e) => {
                    error!(url = %url, "Exception encountered when processing URL: {}", e.chain());
                    report.failed.push((url, e));
                }
            }
        }

        info!(
            "Processed {} URL(s): {} succeeded, {} failed",
            report.total(),
            report.succeeded.len(),
            report.failed.len()
        );
        report
    }
}

/// Per-URL outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, Error)>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}
