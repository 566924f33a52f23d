pub mod artwork;
pub mod error;
pub mod muxer;
pub mod pipeline;
pub mod registry;
pub mod schema;
pub mod source;
pub mod track;

pub use artwork::AlbumArtAdjustment;
pub use error::{Error, NormalizeError, Result};
pub use muxer::{Ffmpeg, Muxer};
pub use pipeline::{BatchReport, Pipeline};
pub use registry::SourceRegistry;
pub use schema::{FieldMap, FieldRule, MetadataKey, RawMetadata};
pub use source::{Source, SourceMetadata};
pub use track::{MetadataValue, Track, TrackMetadata};
