use crate::core::error::{Error, Result};
use crate::core::source::Source;
use crate::utils::sanitize_url;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Host used for the fallback entry.
pub const WILDCARD_HOST: &str = "*";

/// Maps URL hosts to the source that handles them.
#[derive(Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn Source>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `source` for an exact host such as `youtube.com`.
    pub fn register(&mut self, host: &str, source: Arc<dyn Source>) {
        self.sources.insert(normalize_host(host), source);
    }

    /// Registers the source used for every host without an explicit entry.
    pub fn register_default(&mut self, source: Arc<dyn Source>) {
        self.sources.insert(WILDCARD_HOST.to_string(), source);
    }

    pub fn identify(&self, url: &str) -> Result<Arc<dyn Source>> {
        let url = sanitize_url(url);
        if url.is_empty() {
            return Err(Error::UnknownSource("source URL empty".to_string()));
        }

        let host = host_of(&url);
        self.sources
            .get(&host)
            .or_else(|| self.sources.get(WILDCARD_HOST))
            .cloned()
            .ok_or_else(|| Error::UnknownSource(format!("no source registered for host {:?}", host)))
    }
}

/// Extracts the lookup host of an already sanitized URL.
///
/// URLs that do not open with a `scheme://` delimiter get an `http://`
/// prefix so they parse; the scheme does not influence the host.
/// Unparseable URLs yield an empty host.
pub fn host_of(url: &str) -> String {
    let parseable = if has_scheme(url) {
        url.to_string()
    } else {
        format!("http://{}", url)
    };

    Url::parse(&parseable)
        .ok()
        .and_then(|parsed| parsed.host_str().map(normalize_host))
        .unwrap_or_default()
}

/// True when `url` opens with `scheme://`; a `://` later in the query does not count.
fn has_scheme(url: &str) -> bool {
    url.split_once("://").is_some_and(|(scheme, _)| {
        scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

fn normalize_host(host: &str) -> String {
    let host = host.to_lowercase();
    match host.strip_prefix("www.") {
        Some(stripped) => stripped.to_string(),
        None => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), "youtube.com");
        assert_eq!(host_of("https://music.youtube.com/watch?v=X"), "music.youtube.com");
        assert_eq!(host_of("youtu.be/dQw4w9WgXcQ"), "youtu.be");
        assert_eq!(host_of("HTTPS://SoundCloud.com/artist/track"), "soundcloud.com");
    }

    #[test]
    fn test_host_of_schemeless_url_with_embedded_url() {
        assert_eq!(host_of("youtube.com/redirect?u=https://x.org"), "youtube.com");
        assert_eq!(host_of("www.youtube.com/watch?next=//cdn.site"), "youtube.com");
    }

    #[test]
    fn test_www_is_stripped_only_as_a_prefix() {
        assert_eq!(host_of("https://web.site/"), "web.site");
        assert_eq!(host_of("https://www.www.site/"), "www.site");
    }
}
