pub mod yt_dlp;

pub use yt_dlp::YtDlpSource;

use crate::config::Config;
use crate::core::registry::SourceRegistry;
use std::sync::Arc;

/// Hosts routed to yt-dlp explicitly. Everything else reaches it through the
/// wildcard entry anyway.
pub const YT_DLP_HOSTS: [&str; 4] = ["youtube.com", "music.youtube.com", "youtu.be", "soundcloud.com"];

/// Registry with the built-in sources, yt-dlp doubling as the fallback.
pub fn default_registry(config: &Config) -> anyhow::Result<SourceRegistry> {
    let yt_dlp = Arc::new(YtDlpSource::new(config)?);

    let mut registry = SourceRegistry::new();
    registry.register_default(yt_dlp.clone());
    for host in YT_DLP_HOSTS {
        registry.register(host, yt_dlp.clone());
    }

    Ok(registry)
}
