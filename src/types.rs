//! Core types for mediathek-dl

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// One catalog entry.
///
/// Records are created in bulk during ingestion and are immutable
/// afterwards; a catalog refresh replaces the entire set. The catalog
/// itself assigns no stable identifier, so every record carries a
/// [fingerprint](ShowRecord::fingerprint) derived from its identifying
/// fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShowRecord {
    /// Deterministic digest over {channel, topic, title, size, start}
    pub hash: String,
    /// Broadcasting channel, e.g. `ARD`
    pub channel: String,
    /// Series or collection the show belongs to
    pub topic: String,
    /// Show title
    pub title: String,
    /// Free-text description
    pub description: String,
    /// Regional availability note
    pub region: String,
    /// Website URL for the show
    pub website: String,
    /// Published size of the standard-quality asset
    pub size: i64,
    /// Broadcast start, normalized to UTC
    pub start: DateTime<Utc>,
    /// Show length
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// Age at ingestion time (now − start); fixed once, never re-derived
    #[serde(with = "duration_secs")]
    pub age: Duration,
    /// Whether the catalog flags this entry as new
    pub new: bool,
    /// Standard-quality media URL
    pub url: String,
    /// Small-quality media URL, if that tier exists
    pub url_small: Option<String>,
    /// HD media URL, if that tier exists
    pub url_hd: Option<String>,
    /// Subtitle document URL, if published
    pub url_subtitles: Option<String>,
}

impl ShowRecord {
    /// Compute the de-duplication fingerprint for a show.
    ///
    /// Two records agreeing on channel, topic, title, size and start epoch
    /// always produce the same digest, even across independent catalog
    /// refreshes. Field values are length-prefixed before hashing so
    /// adjacent fields cannot collide by concatenation.
    pub fn fingerprint(
        channel: &str,
        topic: &str,
        title: &str,
        size: i64,
        start: DateTime<Utc>,
    ) -> String {
        let mut hasher = Sha256::new();
        for field in [
            channel,
            topic,
            title,
            &size.to_string(),
            &start.timestamp().to_string(),
        ] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        let digest = hasher.finalize();
        digest[..8].iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Short human identifier used in log lines.
    pub fn label(&self) -> String {
        format!(
            "{:?} [{}, {:?}, {}, {}]",
            self.title,
            self.channel,
            self.topic,
            self.start.to_rfc3339(),
            self.hash
        )
    }
}

/// Serialize a [`chrono::Duration`] as its decimal seconds in textual form,
/// matching the JSON dump format.
pub(crate) mod duration_secs {
    use chrono::Duration;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.num_seconds().to_string())
    }
}

/// One of the three media quality tiers a show may publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    /// The standard asset (`url`)
    Standard,
    /// The high-definition asset (`url_hd`)
    Hd,
    /// The small asset (`url_small`)
    Small,
}

impl Quality {
    /// The show's URL for this tier, if the tier is available.
    pub fn url<'a>(&self, show: &'a ShowRecord) -> Option<&'a str> {
        match self {
            Quality::Standard => Some(show.url.as_str()),
            Quality::Hd => show.url_hd.as_deref(),
            Quality::Small => show.url_small.as_deref(),
        }
    }
}

/// Ordered quality preference: the fetcher tries each tier in order and
/// falls through when a tier's URL is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityPreference(pub [Quality; 3]);

impl QualityPreference {
    /// Prefer the best available version.
    pub fn high() -> Self {
        Self([Quality::Hd, Quality::Standard, Quality::Small])
    }

    /// Prefer the smallest available version.
    pub fn low() -> Self {
        Self([Quality::Small, Quality::Standard, Quality::Hd])
    }

    /// The default middle-quality preference.
    pub fn standard() -> Self {
        Self([Quality::Standard, Quality::Hd, Quality::Small])
    }

    /// The first tier with an available URL, together with that URL.
    pub fn pick<'a>(&self, show: &'a ShowRecord) -> Option<(Quality, &'a str)> {
        self.0
            .iter()
            .find_map(|quality| quality.url(show).map(|url| (*quality, url)))
    }

    /// The most-preferred tier, which drives adaptive-manifest variant
    /// selection.
    pub fn leading(&self) -> Quality {
        self.0[0]
    }
}

/// Metadata about one ingested catalog.
///
/// A snapshot is foreign if its `version` tag differs from the running
/// crate version, and stale if `published_at` is older than the configured
/// freshness window. Either condition forces a full re-ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSnapshot {
    /// Publication timestamp of the source list (UTC variant)
    pub published_at: DateTime<Utc>,
    /// Identifier of the published source list
    pub list_id: String,
    /// Version of the upstream crawler that produced the list
    pub crawler_version: String,
    /// Agent string of the upstream crawler
    pub crawler_agent: String,
    /// Version tag of the ingesting software
    pub version: String,
    /// When this snapshot was ingested locally
    pub ingested_at: DateTime<Utc>,
}

/// One history ledger entry: a downloaded fingerprint plus a denormalized
/// copy of the show's descriptive fields for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// Show fingerprint, unique within the ledger
    pub hash: String,
    /// Channel at download time
    pub channel: String,
    /// Topic at download time
    pub topic: String,
    /// Title at download time
    pub title: String,
    /// Published size
    pub size: i64,
    /// Broadcast start
    pub start: DateTime<Utc>,
    /// Show length
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    /// When the show was downloaded (or marked)
    pub downloaded_at: DateTime<Utc>,
}
