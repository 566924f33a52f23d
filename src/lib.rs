pub mod cli;
pub mod config;
pub mod core;
pub mod logging;
pub mod sources;
pub mod utils;

pub use config::{Config, Options};
pub use self::core::{Error, MetadataKey, Pipeline, Source, SourceRegistry, Track, TrackMetadata};
pub use sources::YtDlpSource;
