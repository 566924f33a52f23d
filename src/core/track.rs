use crate::core::schema::{MetadataKey, RawMetadata};
use crate::core::source::Source;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tempfile::TempPath;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    Text(String),
    Path(PathBuf),
}

impl MetadataValue {
    fn from_raw(key: MetadataKey, value: &Value) -> Option<Self> {
        let text = match value {
            Value::Null => return None,
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };

        Some(if key.is_path() {
            MetadataValue::Path(PathBuf::from(text))
        } else {
            MetadataValue::Text(text)
        })
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Text(text) => f.write_str(text),
            MetadataValue::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Canonical track metadata.
///
/// Always holds exactly the keys of [`MetadataKey::ALL`]; a key is either set
/// or absent, and there is no way to add a key outside the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    values: BTreeMap<MetadataKey, Option<MetadataValue>>,
}

impl Default for TrackMetadata {
    fn default() -> Self {
        Self {
            values: MetadataKey::ALL.into_iter().map(|key| (key, None)).collect(),
        }
    }
}

impl TrackMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> impl Iterator<Item = MetadataKey> + '_ {
        self.values.keys().copied()
    }

    pub fn get(&self, key: MetadataKey) -> Option<&MetadataValue> {
        self.values.get(&key).and_then(Option::as_ref)
    }

    pub fn text(&self, key: MetadataKey) -> Option<&str> {
        match self.get(key) {
            Some(MetadataValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn path(&self, key: MetadataKey) -> Option<&Path> {
        match self.get(key) {
            Some(MetadataValue::Path(path)) => Some(path),
            _ => None,
        }
    }

    pub fn set(&mut self, key: MetadataKey, value: MetadataValue) {
        self.values.insert(key, Some(value));
    }

    /// Copies every canonical key present in `raw` and returns how many were
    /// taken. Keys that are missing or null in `raw` keep their current value,
    /// and non-canonical keys are ignored.
    pub fn merge(&mut self, raw: &RawMetadata) -> usize {
        let mut merged = 0;
        for key in MetadataKey::ALL {
            if let Some(value) = raw
                .get(key.as_str())
                .and_then(|value| MetadataValue::from_raw(key, value))
            {
                self.set(key, value);
                merged += 1;
            }
        }
        merged
    }

    /// Only the keys that currently hold a value.
    pub fn present(&self) -> impl Iterator<Item = (MetadataKey, &MetadataValue)> {
        self.values
            .iter()
            .filter_map(|(key, value)| value.as_ref().map(|value| (*key, value)))
    }
}

/// One piece of media moving through the download pipeline.
pub struct Track {
    url: String,
    source: Arc<dyn Source>,
    raw_source_metadata: OnceLock<RawMetadata>,
    filepath: OnceLock<PathBuf>,
    artwork: Option<TempPath>,
    pub metadata: TrackMetadata,
}

impl Track {
    pub fn new(url: impl Into<String>, source: Arc<dyn Source>) -> Self {
        Self {
            url: url.into(),
            source,
            raw_source_metadata: OnceLock::new(),
            filepath: OnceLock::new(),
            artwork: None,
            metadata: TrackMetadata::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    pub fn raw_source_metadata(&self) -> Option<&RawMetadata> {
        self.raw_source_metadata.get()
    }

    /// Records what the source reported. Returns the mapping back if the
    /// track already has raw metadata.
    pub fn set_raw_source_metadata(&self, raw: RawMetadata) -> Result<(), RawMetadata> {
        self.raw_source_metadata.set(raw)
    }

    pub fn filepath(&self) -> Option<&Path> {
        self.filepath.get().map(PathBuf::as_path)
    }

    /// Records where the downloaded audio landed. Returns the path back if it
    /// was already set.
    pub fn set_filepath(&self, path: PathBuf) -> Result<(), PathBuf> {
        self.filepath.set(path)
    }

    /// Hands the temporary album art file over to the track. The file is
    /// deleted when the track is dropped unless it is taken back first.
    pub fn set_artwork(&mut self, artwork: TempPath) {
        self.artwork = Some(artwork);
    }

    pub fn take_artwork(&mut self) -> Option<TempPath> {
        self.artwork.take()
    }

    /// Canonical metadata restricted to the keys that are set.
    pub fn present_metadata(&self) -> impl Iterator<Item = (MetadataKey, &MetadataValue)> {
        self.metadata.present()
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let artist = self.metadata.text(MetadataKey::Artist).unwrap_or("Unknown");
        let title = self.metadata.text(MetadataKey::Title).unwrap_or("Unknown");
        write!(f, "{} – {}", artist, title)
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("url", &self.url)
            .field("source", &self.source.name())
            .field("filepath", &self.filepath.get())
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawMetadata {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_new_metadata_has_every_key_unset() {
        let metadata = TrackMetadata::new();
        assert_eq!(metadata.keys().collect::<Vec<_>>(), MetadataKey::ALL.to_vec());
        assert_eq!(metadata.present().count(), 0);
    }

    #[test]
    fn test_merge_ignores_unknown_keys() {
        let mut metadata = TrackMetadata::new();
        let merged = metadata.merge(&raw(json!({
            "title": "Song",
            "uploader": "Someone",
            "ext": "mp3",
        })));

        assert_eq!(merged, 1);
        assert_eq!(metadata.text(MetadataKey::Title), Some("Song"));
        assert_eq!(metadata.keys().count(), MetadataKey::ALL.len());
    }

    #[test]
    fn test_merge_is_additive() {
        let mut metadata = TrackMetadata::new();
        metadata.merge(&raw(json!({ "title": "Song", "artist": "Band" })));
        metadata.merge(&raw(json!({ "title": "Other Song", "artist": null })));

        assert_eq!(metadata.text(MetadataKey::Title), Some("Other Song"));
        assert_eq!(metadata.text(MetadataKey::Artist), Some("Band"));
    }

    #[test]
    fn test_merge_types_values() {
        let mut metadata = TrackMetadata::new();
        metadata.merge(&raw(json!({ "album_art": "/tmp/cover", "disc": 1 })));

        assert_eq!(metadata.path(MetadataKey::AlbumArt), Some(Path::new("/tmp/cover")));
        assert_eq!(metadata.text(MetadataKey::Disc), Some("1"));
    }
}
