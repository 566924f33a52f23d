use crate::config::{Config, Options};
use crate::core::error::{Error, Result};
use crate::core::schema::{FieldMap, FieldRule, MetadataKey, RawMetadata};
use crate::core::source::{Source, SourceMetadata};
use crate::core::track::Track;
use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Date format of yt-dlp's `upload_date` field.
pub const UPLOAD_DATE_FORMAT: &str = "%Y%m%d";

/// yt-dlp fields behind each canonical key. Everything is treated as a single
/// release, hence the constant track and disc numbers.
pub fn yt_dlp_field_map() -> Result<FieldMap> {
    FieldMap::new(vec![
        (MetadataKey::Artist, FieldRule::direct("uploader")),
        (MetadataKey::Album, FieldRule::direct("title")),
        (MetadataKey::AlbumArtist, FieldRule::direct("uploader")),
        (MetadataKey::Date, FieldRule::date("upload_date", UPLOAD_DATE_FORMAT)),
        (MetadataKey::Title, FieldRule::direct("title")),
        (MetadataKey::Track, FieldRule::literal("1/1")),
        (MetadataKey::Disc, FieldRule::literal("1/1")),
    ])
}

/// Source backed by the `yt-dlp` executable, which understands most media sites.
pub struct YtDlpSource {
    client: reqwest::Client,
    binary: PathBuf,
    audio_format: String,
    audio_quality: String,
    fields: FieldMap,
}

impl YtDlpSource {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(std::time::Duration::from_secs(config.timeout))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            binary: config.yt_dlp_path.clone(),
            audio_format: config.audio_format.clone(),
            audio_quality: config.audio_quality.clone(),
            fields: yt_dlp_field_map()?,
        })
    }

    pub fn download_args(&self, url: &str, output_template: &str) -> Vec<String> {
        vec![
            "--format".to_string(),
            "bestaudio".to_string(),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            self.audio_format.clone(),
            "--audio-quality".to_string(),
            self.audio_quality.clone(),
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            // --print implies --simulate, which would skip the download
            "--no-simulate".to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            "--output".to_string(),
            output_template.to_string(),
            "--".to_string(),
            url.to_string(),
        ]
    }

    async fn dump_info(&self, url: &str) -> anyhow::Result<RawMetadata> {
        let output = Command::new(&self.binary)
            .args(["--dump-single-json", "--no-playlist", "--skip-download", "--", url])
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.binary.display()))?;

        if !output.status.success() {
            anyhow::bail!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        match serde_json::from_slice::<Value>(&output.stdout)? {
            Value::Object(info) => Ok(info),
            other => anyhow::bail!("Expected a JSON object from yt-dlp, got {}", other),
        }
    }

    async fn fetch_thumbnail(&self, thumbnail_url: &str) -> anyhow::Result<TempPath> {
        let response = self
            .client
            .get(thumbnail_url)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("Failed to fetch album art from {}", thumbnail_url))?;

        let (handle, path) = tempfile::Builder::new()
            .prefix("music-downloader-art-")
            .tempfile()?
            .into_parts();
        let mut file = tokio::fs::File::from_std(handle);
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!("Fetched {} bytes of album art into {}", written, path.display());
        Ok(path)
    }
}

#[async_trait]
impl Source for YtDlpSource {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn field_map(&self) -> &FieldMap {
        &self.fields
    }

    async fn get_metadata(&self, track: &Track) -> anyhow::Result<SourceMetadata> {
        let mut info = self.dump_info(track.url()).await?;

        let album_art = match info.get("thumbnail").and_then(Value::as_str) {
            Some(thumbnail_url) => {
                let thumbnail_url = thumbnail_url.to_string();
                let temp = self.fetch_thumbnail(&thumbnail_url).await?;
                info.insert(
                    MetadataKey::AlbumArt.as_str().to_string(),
                    Value::String(temp.to_string_lossy().into_owned()),
                );
                Some(temp)
            }
            None => {
                warn!("No thumbnail reported for {}", track.url());
                None
            }
        };

        let fields = self.fields.normalize(&info)?;
        Ok(SourceMetadata { fields, album_art })
    }

    async fn save_track(&self, track: &Track, options: &Options) -> Result<PathBuf> {
        let args = self.download_args(track.url(), &options.output_template);
        info!("Downloading with output template {}", options.output_template);

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                Error::download(
                    track.url(),
                    anyhow::Error::new(e).context(format!("Failed to run {}", self.binary.display())),
                )
            })?;

        if !output.status.success() {
            return Err(Error::ExternalTool {
                tool: self.binary.display().to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match downloaded_path(&stdout) {
            Some(path) if path.is_file() => Ok(path),
            _ => Err(Error::DownloadPathUnknown {
                url: track.url().to_string(),
            }),
        }
    }
}

/// The final file path yt-dlp printed, which is the last non-empty line of stdout.
pub fn downloaded_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_map_normalizes_yt_dlp_info() {
        let info = json!({
            "title": "Never Gonna Give You Up",
            "uploader": "Rick Astley",
            "upload_date": "20091025",
            "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg",
        });
        let normalized = yt_dlp_field_map()
            .unwrap()
            .normalize(info.as_object().unwrap())
            .unwrap();

        assert_eq!(normalized["artist"], "Rick Astley");
        assert_eq!(normalized["album_artist"], "Rick Astley");
        assert_eq!(normalized["album"], "Never Gonna Give You Up");
        assert_eq!(normalized["date"], "2009-10-25");
        assert_eq!(normalized["track"], "1/1");
        assert_eq!(normalized["disc"], "1/1");
        assert!(!normalized.contains_key("genre"));
    }

    #[test]
    fn test_template_is_remapped_to_yt_dlp_fields() {
        let map = yt_dlp_field_map().unwrap();
        assert_eq!(
            map.remap_template("Music/%(album_artist)s/%(album)s/%(title)s.%(ext)s"),
            "Music/%(uploader)s/%(title)s/%(title)s.%(ext)s"
        );
    }

    #[test]
    fn test_download_args() {
        let source = YtDlpSource::new(&Config::default()).unwrap();
        let args = source.download_args("https://youtu.be/abc", "%(title)s.%(ext)s");

        assert!(args.windows(2).any(|w| w == ["--audio-format", "mp3"]));
        assert!(args.windows(2).any(|w| w == ["--print", "after_move:filepath"]));
        assert!(args.windows(2).any(|w| w == ["--output", "%(title)s.%(ext)s"]));
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/abc"));
    }

    #[tokio::test]
    async fn test_fetch_thumbnail_streams_into_temp_file() {
        use tokio::io::AsyncReadExt;
        use tokio::net::TcpListener;

        let body = b"not really a jpeg".to_vec();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let served = body.clone();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await.unwrap();
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                served.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&served).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        let mut source = YtDlpSource::new(&Config::default()).unwrap();
        source.client = reqwest::Client::builder().no_proxy().build().unwrap();
        let temp = source
            .fetch_thumbnail(&format!("http://{}/thumb.jpg", addr))
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&temp).await.unwrap(), body);
        let path = temp.to_path_buf();
        drop(temp);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_failing_yt_dlp_is_an_external_tool_error() {
        let config = Config {
            yt_dlp_path: PathBuf::from("false"),
            ..Config::default()
        };
        let source = std::sync::Arc::new(YtDlpSource::new(&config).unwrap());
        let track = Track::new("https://youtu.be/abc", source.clone());

        let err = source
            .save_track(&track, &config.options())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExternalTool { ref tool, .. } if tool == "false"));
    }

    #[test]
    fn test_downloaded_path() {
        assert_eq!(
            downloaded_path("/music/a - b/b.mp3\n\n"),
            Some(PathBuf::from("/music/a - b/b.mp3"))
        );
        assert_eq!(downloaded_path("  \n"), None);
    }
}
