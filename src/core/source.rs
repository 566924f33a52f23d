use crate::config::Options;
use crate::core::error::Result;
use crate::core::schema::{FieldMap, RawMetadata};
use crate::core::track::Track;
use async_trait::async_trait;
use std::path::PathBuf;
use tempfile::TempPath;

/// Metadata returned by a [`Source`], already normalized into the canonical schema.
#[derive(Debug, Default)]
pub struct SourceMetadata {
    pub fields: RawMetadata,
    /// Locally retrieved cover image. Its path is also reported under `album_art`.
    pub album_art: Option<TempPath>,
}

/// A provider that can describe and download the media behind a URL.
///
/// Implementations own a [`FieldMap`] describing how their native metadata
/// fields map onto the canonical schema.
#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &'static str;

    fn field_map(&self) -> &FieldMap;

    async fn get_metadata(&self, track: &Track) -> anyhow::Result<SourceMetadata>;

    /// Downloads the track and returns the path of the finished audio file.
    ///
    /// `options.output_template` is already expressed in this source's field names.
    async fn save_track(&self, track: &Track, options: &Options) -> Result<PathBuf>;
}
