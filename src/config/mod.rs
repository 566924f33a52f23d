use crate::core::artwork::AlbumArtAdjustment;
use crate::core::schema::FieldMap;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

const CONFIG_DIR_NAME: &str = "music-downloader";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output_template: String,
    pub album_art_adjustment: AlbumArtAdjustment,
    pub yt_dlp_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub audio_format: String,
    pub audio_quality: String,
    /// Bitrate forced when ffmpeg rewrites tags.
    pub tag_bitrate: String,
    pub user_agent: String,
    /// Timeout in seconds for album art requests.
    pub timeout: u64,
    pub log_filter: String,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_template: default_output_template(),
            album_art_adjustment: AlbumArtAdjustment::Fit,
            yt_dlp_path: PathBuf::from("yt-dlp"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            audio_format: "mp3".to_string(),
            audio_quality: "192".to_string(),
            tag_bitrate: "320k".to_string(),
            user_agent: format!("music-downloader/{}", env!("CARGO_PKG_VERSION")),
            timeout: 30,
            log_filter: "info".to_string(),
            log_file: None,
        }
    }
}

impl Config {
    /// Loads the configuration from `path`, or from the per-user config file
    /// when no path is given. A missing per-user file yields the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn options(&self) -> Options {
        Options {
            album_art_adjustment: self.album_art_adjustment,
            output_template: self.output_template.clone(),
        }
    }
}

/// Per-invocation settings shared read-only by every track in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub album_art_adjustment: AlbumArtAdjustment,
    /// Output path template using canonical `%(field)s` placeholders.
    pub output_template: String,
}

impl Default for Options {
    fn default() -> Self {
        Config::default().options()
    }
}

impl Options {
    /// A copy whose output template speaks the field names of `fields`.
    pub fn for_source(&self, fields: &FieldMap) -> Options {
        Options {
            album_art_adjustment: self.album_art_adjustment,
            output_template: fields.remap_template(&self.output_template),
        }
    }
}

/// `<music dir>/%(artist)s - %(title)s/%(title)s.%(ext)s`, where the music
/// dir is the platform audio directory, `~/Music`, or the working directory.
pub fn default_output_template() -> String {
    let music_dir = dirs::audio_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Music")))
        .unwrap_or_else(|| PathBuf::from("."));

    format!(
        "{}{sep}%(artist)s - %(title)s{sep}%(title)s.%(ext)s",
        music_dir.display(),
        sep = MAIN_SEPARATOR
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_config_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "album_art_adjustment = \"crop\"").unwrap();
        writeln!(file, "output_template = \"/srv/music/%(title)s.%(ext)s\"").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.album_art_adjustment, AlbumArtAdjustment::Crop);
        assert_eq!(config.output_template, "/srv/music/%(title)s.%(ext)s");
        assert_eq!(config.tag_bitrate, "320k");
        assert_eq!(config.yt_dlp_path, PathBuf::from("yt-dlp"));
    }

    #[test]
    fn test_invalid_config_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "album_art_adjustment = \"stretch\"").unwrap();
        assert!(Config::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_default_template_uses_canonical_placeholders() {
        let template = default_output_template();
        assert!(template.ends_with(&format!(
            "%(artist)s - %(title)s{}%(title)s.%(ext)s",
            MAIN_SEPARATOR
        )));
    }
}
