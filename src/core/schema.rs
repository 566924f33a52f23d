//! Canonical metadata schema and per-provider field maps.
//!
//! Canonical keys follow the FFmpeg tag names listed at
//! <https://wiki.multimedia.cx/index.php/FFmpeg_Metadata>. Every provider
//! describes how its native fields land on those keys with a [`FieldMap`],
//! which drives both metadata normalization and output template remapping.

use crate::core::error::{Error, NormalizeError, Result};
use chrono::NaiveDate;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Raw key/value metadata as reported by a provider.
pub type RawMetadata = Map<String, Value>;

/// Output format of every normalized date.
pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataKey {
    Album,
    AlbumArtist,
    AlbumArt,
    Artist,
    Disc,
    Genre,
    Synopsis,
    Title,
    Track,
    Date,
}

impl MetadataKey {
    pub const ALL: [MetadataKey; 10] = [
        MetadataKey::Album,
        MetadataKey::AlbumArtist,
        MetadataKey::AlbumArt,
        MetadataKey::Artist,
        MetadataKey::Disc,
        MetadataKey::Genre,
        MetadataKey::Synopsis,
        MetadataKey::Title,
        MetadataKey::Track,
        MetadataKey::Date,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetadataKey::Album => "album",
            MetadataKey::AlbumArtist => "album_artist",
            MetadataKey::AlbumArt => "album_art",
            MetadataKey::Artist => "artist",
            MetadataKey::Disc => "disc",
            MetadataKey::Genre => "genre",
            MetadataKey::Synopsis => "synopsis",
            MetadataKey::Title => "title",
            MetadataKey::Track => "track",
            MetadataKey::Date => "date",
        }
    }

    /// Keys whose values are local file paths rather than tag text.
    pub fn is_path(self) -> bool {
        matches!(self, MetadataKey::AlbumArt)
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MetadataKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| Error::FieldMap(format!("`{}` is not a canonical metadata key", s)))
    }
}

/// How one canonical key is filled from a provider's raw metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRule {
    /// Copy `raw[key]`, falling back to `default` when the provider omits it.
    Direct { key: String, default: Option<Value> },
    /// Constant value regardless of what the provider reports.
    Literal(Value),
    /// Parse `raw[key]` with `format` and store it as `YYYY-MM-DD`.
    Date { key: String, format: String },
}

impl FieldRule {
    pub fn direct(key: impl Into<String>) -> Self {
        FieldRule::Direct {
            key: key.into(),
            default: None,
        }
    }

    pub fn direct_or(key: impl Into<String>, default: impl Into<Value>) -> Self {
        FieldRule::Direct {
            key: key.into(),
            default: Some(default.into()),
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        FieldRule::Literal(value.into())
    }

    pub fn date(key: impl Into<String>, format: impl Into<String>) -> Self {
        FieldRule::Date {
            key: key.into(),
            format: format.into(),
        }
    }

    /// The provider-native field this rule reads, if any.
    pub fn provider_key(&self) -> Option<&str> {
        match self {
            FieldRule::Direct { key, .. } | FieldRule::Date { key, .. } => Some(key),
            FieldRule::Literal(_) => None,
        }
    }
}

/// Ordered mapping from canonical keys to provider rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    rules: Vec<(MetadataKey, FieldRule)>,
}

impl FieldMap {
    /// Builds a map, rejecting duplicate canonical keys and provider keys that
    /// would themselves read as template placeholders.
    pub fn new(rules: Vec<(MetadataKey, FieldRule)>) -> Result<Self> {
        for (i, (canonical, rule)) in rules.iter().enumerate() {
            if rules[..i].iter().any(|(seen, _)| seen == canonical) {
                return Err(Error::FieldMap(format!(
                    "canonical key `{}` is mapped twice",
                    canonical
                )));
            }
            if let Some(key) = rule.provider_key() {
                if key.is_empty() || key.contains("%(") || key.contains(')') {
                    return Err(Error::FieldMap(format!(
                        "provider key {:?} for `{}` is not a plain field name",
                        key, canonical
                    )));
                }
            }
        }

        Ok(Self { rules })
    }

    pub fn rules(&self) -> impl Iterator<Item = (MetadataKey, &FieldRule)> {
        self.rules.iter().map(|(key, rule)| (*key, rule))
    }

    pub fn get(&self, key: MetadataKey) -> Option<&FieldRule> {
        self.rules
            .iter()
            .find(|(canonical, _)| *canonical == key)
            .map(|(_, rule)| rule)
    }

    /// Translates `raw` into the canonical schema.
    ///
    /// The result starts as a copy of `raw`, so provider fields the map does
    /// not mention stay available. Rules are applied in table order.
    pub fn normalize(&self, raw: &RawMetadata) -> Result<RawMetadata> {
        let mut normalized = raw.clone();

        for (canonical, rule) in &self.rules {
            match rule {
                FieldRule::Literal(value) => {
                    normalized.insert(canonical.as_str().to_string(), value.clone());
                }
                FieldRule::Direct { key, default } => {
                    if let Some(value) = normalized.get(key).filter(|value| !value.is_null()).cloned() {
                        normalized.insert(canonical.as_str().to_string(), value);
                    } else if let Some(default) = default {
                        normalized.insert(canonical.as_str().to_string(), default.clone());
                    }
                }
                FieldRule::Date { key, format } => {
                    // A missing date stays missing; only a present one must parse.
                    if let Some(value) = normalized.get(key).filter(|value| !value.is_null()) {
                        let date = convert_date(key, value, format)?;
                        normalized.insert(canonical.as_str().to_string(), Value::String(date));
                    }
                }
            }
        }

        Ok(normalized)
    }

    /// Rewrites canonical placeholders in `template` into provider placeholders.
    ///
    /// `%(artist)s` becomes `%(uploader)s` when artist maps to uploader, and any
    /// conversion specifier after the closing parenthesis is kept. Placeholders
    /// for literal rules and for keys the map does not know are left untouched.
    pub fn remap_template(&self, template: &str) -> String {
        placeholder_regex()
            .replace_all(template, |caps: &Captures| {
                let name = &caps["key"];
                let spec = &caps["spec"];
                let Ok(canonical) = name.parse::<MetadataKey>() else {
                    return caps[0].to_string();
                };

                match self.get(canonical) {
                    Some(rule) => match rule.provider_key() {
                        Some(provider) => format!("%({}){}", provider, spec),
                        None => {
                            tracing::warn!(
                                "Template placeholder %({}){} maps to a constant and cannot be resolved by the downloader",
                                name,
                                spec
                            );
                            caps[0].to_string()
                        }
                    },
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"%\((?P<key>[^()%]+)\)(?P<spec>[-#0+ ]*\d*(?:\.\d+)?[diouxXeEfFgGcrsaBjhlqDSU])")
            .expect("placeholder pattern is valid")
    })
}

fn convert_date(key: &str, value: &Value, format: &str) -> std::result::Result<String, NormalizeError> {
    let text = match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        other => {
            return Err(NormalizeError::NotAString {
                key: key.to_string(),
                value: other.to_string(),
            })
        }
    };

    NaiveDate::parse_from_str(&text, format)
        .map(|date| date.format(CANONICAL_DATE_FORMAT).to_string())
        .map_err(|source| NormalizeError::InvalidDate {
            key: key.to_string(),
            value: text,
            format: format.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_map() -> FieldMap {
        FieldMap::new(vec![
            (MetadataKey::Artist, FieldRule::direct("uploader")),
            (MetadataKey::Album, FieldRule::direct("title")),
            (MetadataKey::Genre, FieldRule::direct_or("categories", "Unknown")),
            (MetadataKey::Date, FieldRule::date("upload_date", "%Y%m%d")),
            (MetadataKey::Title, FieldRule::direct("title")),
            (MetadataKey::Track, FieldRule::literal("1/1")),
        ])
        .unwrap()
    }

    fn raw(value: Value) -> RawMetadata {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_normalize_copies_and_defaults() {
        let normalized = sample_map()
            .normalize(&raw(json!({
                "uploader": "Rick Astley",
                "title": "Never Gonna Give You Up",
                "upload_date": "20091025",
                "view_count": 10,
            })))
            .unwrap();

        assert_eq!(normalized["artist"], "Rick Astley");
        assert_eq!(normalized["album"], "Never Gonna Give You Up");
        assert_eq!(normalized["genre"], "Unknown");
        assert_eq!(normalized["date"], "2009-10-25");
        assert_eq!(normalized["track"], "1/1");
        // Unmapped provider fields survive normalization.
        assert_eq!(normalized["view_count"], 10);
    }

    #[test]
    fn test_null_provider_value_takes_the_default() {
        let normalized = sample_map()
            .normalize(&raw(json!({ "title": "Song", "categories": null })))
            .unwrap();
        assert_eq!(normalized["genre"], "Unknown");

        let mut metadata = crate::core::track::TrackMetadata::new();
        metadata.merge(&normalized);
        assert_eq!(metadata.text(MetadataKey::Genre), Some("Unknown"));
    }

    #[test]
    fn test_missing_date_is_left_absent() {
        let normalized = sample_map()
            .normalize(&raw(json!({ "title": "Song" })))
            .unwrap();
        assert!(!normalized.contains_key("date"));
    }

    #[test]
    fn test_malformed_date_is_an_error() {
        let err = sample_map()
            .normalize(&raw(json!({ "upload_date": "25/10/2009" })))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Normalize(NormalizeError::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_remap_template() {
        let map = sample_map();
        assert_eq!(
            map.remap_template("/music/%(artist)s - %(title)s/%(title)s.%(ext)s"),
            "/music/%(uploader)s - %(title)s/%(title)s.%(ext)s"
        );
        assert_eq!(map.remap_template("%(date)s"), "%(upload_date)s");
        // Literal entries have no provider field to point at.
        assert_eq!(map.remap_template("%(track)s"), "%(track)s");
        assert_eq!(map.remap_template("%(artist)02d"), "%(uploader)02d");
    }

    #[test]
    fn test_remap_is_single_pass() {
        // A replacement that produces another canonical placeholder must not be rewritten again.
        let map = FieldMap::new(vec![
            (MetadataKey::Artist, FieldRule::direct("title")),
            (MetadataKey::Title, FieldRule::direct("fulltitle")),
        ])
        .unwrap();
        assert_eq!(map.remap_template("%(artist)s/%(title)s"), "%(title)s/%(fulltitle)s");
    }

    #[test]
    fn test_field_map_rejects_invalid_tables() {
        assert!(FieldMap::new(vec![
            (MetadataKey::Artist, FieldRule::direct("uploader")),
            (MetadataKey::Artist, FieldRule::direct("creator")),
        ])
        .is_err());
        assert!(FieldMap::new(vec![(MetadataKey::Title, FieldRule::direct("%(title)s"))]).is_err());
    }

    #[test]
    fn test_metadata_key_from_str() {
        assert_eq!("album_artist".parse::<MetadataKey>().unwrap(), MetadataKey::AlbumArtist);
        assert!("ext".parse::<MetadataKey>().is_err());
    }
}
