use crate::core::error::{Error, Result};
use crate::core::track::TrackMetadata;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Writes tags and cover art into finished audio files.
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Rewrites the text tags of `audio` without re-encoding it.
    async fn write_tags(&self, audio: &Path, metadata: &TrackMetadata) -> Result<()>;

    /// Embeds `cover` as the front cover of `audio`.
    async fn embed_cover(&self, audio: &Path, cover: &Path) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    binary: PathBuf,
    audio_bitrate: String,
}

impl Ffmpeg {
    pub fn new(binary: impl Into<PathBuf>, audio_bitrate: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            audio_bitrate: audio_bitrate.into(),
        }
    }

    pub fn tag_args(&self, audio: &Path, output: &Path, metadata: &TrackMetadata) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-i".into(),
            audio.into(),
            "-c".into(),
            "copy".into(),
            "-b:a".into(),
            self.audio_bitrate.clone().into(),
        ];

        for (key, value) in metadata.present() {
            if key.is_path() {
                continue;
            }
            args.push("-metadata".into());
            args.push(format!("{}={}", key, value).into());
        }

        args.push(output.into());
        args
    }

    pub fn cover_args(&self, audio: &Path, cover: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        args.extend(["-hide_banner", "-loglevel", "error", "-y"].map(OsString::from));
        args.push("-i".into());
        args.push(audio.into());
        args.push("-i".into());
        args.push(cover.into());
        args.extend(
            [
                "-map", "0:a",
                "-map", "1:v",
                "-c:a", "copy",
                "-c:v", "copy",
                "-id3v2_version", "3",
                "-metadata:s:v", "comment=Cover (front)",
                "-disposition:v", "attached_pic",
            ]
            .map(OsString::from),
        );
        args.push(output.into());
        args
    }

    async fn run_replacing(&self, audio: &Path, args: Vec<OsString>, output: &Path) -> Result<()> {
        debug!("Running {} {:?}", self.binary.display(), args);
        let result = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await;

        let out = match result {
            Ok(out) => out,
            Err(e) => {
                let _ = tokio::fs::remove_file(output).await;
                return Err(e.into());
            }
        };

        if !out.status.success() {
            let _ = tokio::fs::remove_file(output).await;
            return Err(Error::ExternalTool {
                tool: self.binary.display().to_string(),
                status: out.status,
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }

        tokio::fs::rename(output, audio).await?;
        Ok(())
    }
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new("ffmpeg", "320k")
    }
}

/// Sibling path ffmpeg writes to before it replaces `audio`.
pub fn temp_output_path(audio: &Path) -> PathBuf {
    match audio.extension() {
        Some(ext) => {
            let mut ext_with_temp = OsString::from("temp.");
            ext_with_temp.push(ext);
            audio.with_extension(ext_with_temp)
        }
        None => audio.with_extension("temp"),
    }
}

#[async_trait]
impl Muxer for Ffmpeg {
    async fn write_tags(&self, audio: &Path, metadata: &TrackMetadata) -> Result<()> {
        let output = temp_output_path(audio);
        let args = self.tag_args(audio, &output, metadata);
        self.run_replacing(audio, args, &output).await
    }

    async fn embed_cover(&self, audio: &Path, cover: &Path) -> Result<()> {
        let output = temp_output_path(audio);
        let args = self.cover_args(audio, cover, &output);
        self.run_replacing(audio, args, &output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::MetadataKey;
    use crate::core::track::MetadataValue;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_temp_output_path() {
        assert_eq!(temp_output_path(Path::new("/m/song.mp3")), PathBuf::from("/m/song.temp.mp3"));
        assert_eq!(temp_output_path(Path::new("/m/song")), PathBuf::from("/m/song.temp"));
    }

    #[test]
    fn test_tag_args_skip_unset_and_path_values() {
        let mut metadata = TrackMetadata::new();
        metadata.set(MetadataKey::Title, MetadataValue::Text("Song".into()));
        metadata.set(MetadataKey::Track, MetadataValue::Text("1/1".into()));
        metadata.set(MetadataKey::AlbumArt, MetadataValue::Path("/m/cover.png".into()));

        let ffmpeg = Ffmpeg::default();
        let args = strings(&ffmpeg.tag_args(Path::new("in.mp3"), Path::new("out.mp3"), &metadata));

        assert!(args.windows(2).any(|w| w == ["-b:a", "320k"]));
        assert!(args.windows(2).any(|w| w == ["-metadata", "title=Song"]));
        assert!(args.windows(2).any(|w| w == ["-metadata", "track=1/1"]));
        assert!(!args.iter().any(|a| a.starts_with("album_art=")));
        assert!(!args.iter().any(|a| a.starts_with("artist=")));
        assert_eq!(args.last().map(String::as_str), Some("out.mp3"));
    }

    #[tokio::test]
    async fn test_failing_ffmpeg_keeps_the_original_audio() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("song.mp3");
        std::fs::write(&audio, b"audio").unwrap();
        std::fs::write(temp_output_path(&audio), b"partial").unwrap();

        let mut metadata = TrackMetadata::new();
        metadata.set(MetadataKey::Title, MetadataValue::Text("Song".into()));

        let err = Ffmpeg::new("false", "320k")
            .write_tags(&audio, &metadata)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ExternalTool { ref tool, .. } if tool == "false"));
        assert_eq!(std::fs::read(&audio).unwrap(), b"audio");
        assert!(!temp_output_path(&audio).exists());
    }

    #[test]
    fn test_cover_args_copy_streams() {
        let args = strings(&Ffmpeg::default().cover_args(
            Path::new("in.mp3"),
            Path::new("cover.png"),
            Path::new("out.mp3"),
        ));

        assert!(args.windows(2).any(|w| w == ["-c:a", "copy"]));
        assert!(args.windows(2).any(|w| w == ["-c:v", "copy"]));
        assert!(args.windows(2).any(|w| w == ["-metadata:s:v", "comment=Cover (front)"]));
        assert!(args.windows(2).any(|w| w == ["-disposition:v", "attached_pic"]));
    }
}
