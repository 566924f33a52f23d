use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("metadata retrieval failed for URL: {url}")]
    MetadataRetrieval {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("could not determine filepath of downloaded track: {url}")]
    DownloadPathUnknown { url: String },

    #[error("download failed for URL: {url}")]
    Download {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    ExternalTool {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error("invalid field map: {0}")]
    FieldMap(String),

    #[error("no album art file at {0}")]
    MissingAlbumArt(PathBuf),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("value of `{key}` is not a date in format `{format}`: {value:?}")]
    InvalidDate {
        key: String,
        value: String,
        format: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("value of `{key}` is not a string: {value}")]
    NotAString { key: String, value: String },
}

impl Error {
    pub fn metadata_retrieval(url: impl Into<String>, source: anyhow::Error) -> Self {
        Error::MetadataRetrieval {
            url: url.into(),
            source: source.into(),
        }
    }

    pub fn download(url: impl Into<String>, source: anyhow::Error) -> Self {
        Error::Download {
            url: url.into(),
            source: source.into(),
        }
    }

    /// Renders the error followed by every cause in its `source()` chain.
    pub fn chain(&self) -> String {
        let mut rendered = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            rendered.push_str(": ");
            rendered.push_str(&err.to_string());
            cause = err.source();
        }
        rendered
    }
}
