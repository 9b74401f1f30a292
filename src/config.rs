//! Configuration for mediathek-dl
//!
//! [`Settings`] carries everything the library needs for one run. All
//! fields have sensible defaults; a config file may override them and
//! explicit CLI flags override the file (the merge happens in the binary,
//! the library only sees the final value). Invalid values are rejected by
//! [`Settings::validate`] before any catalog work begins.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default catalog mirror list.
///
/// See <https://res.mediathekview.de/akt.xml> for the published list.
pub const DEFAULT_MIRRORS: &[&str] = &[
    "https://verteiler1.mediathekview.de/Filmliste-akt.xz",
    "https://verteiler2.mediathekview.de/Filmliste-akt.xz",
    "https://verteiler3.mediathekview.de/Filmliste-akt.xz",
    "https://verteiler4.mediathekview.de/Filmliste-akt.xz",
    "https://verteiler5.mediathekview.de/Filmliste-akt.xz",
    "https://verteiler6.mediathekview.de/Filmliste-akt.xz",
    "https://liste.mediathekview.de/Filmliste-akt.xz",
];

/// Default destination template for downloaded files.
pub const DEFAULT_TARGET: &str = "{dir}/{channel}/{topic}/{start} {title}{ext}";

/// Run configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    /// Working directory holding the catalog store and history ledger
    pub dir: PathBuf,

    /// Destination path template; may reference `{dir}`, `{filename}`,
    /// `{ext}`, `{date}`, `{time}` and any show field
    pub target: String,

    /// Re-ingest the catalog if the current one is older than this many hours
    pub refresh_after_hours: i64,

    /// Include shows whose start time lies in the future
    pub include_future: bool,

    /// Skip subtitle retrieval even when a show publishes subtitles
    pub no_subtitles: bool,

    /// Download shows regardless of the history ledger and do not mark them
    pub oblivious: bool,

    /// Record matching shows in the ledger without downloading anything
    pub mark_only: bool,

    /// Limit for the `list` command
    pub count: usize,

    /// Catalog mirror URLs; retries are bounded by this list's length
    pub mirrors: Vec<String>,

    /// Delay between catalog mirror attempts
    #[serde(with = "secs")]
    pub retry_delay: Duration,

    /// Bounded wait for the store/ledger lock before giving up
    #[serde(with = "secs")]
    pub lock_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            target: DEFAULT_TARGET.to_string(),
            refresh_after_hours: 3,
            include_future: false,
            no_subtitles: false,
            oblivious: false,
            mark_only: false,
            count: 50,
            mirrors: DEFAULT_MIRRORS.iter().map(|s| s.to_string()).collect(),
            retry_delay: Duration::from_secs(5),
            lock_timeout: Duration::from_secs(10),
        }
    }
}

impl Settings {
    /// Reject impossible values before any catalog work begins.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_after_hours < 0 {
            return Err(Error::config(
                "refresh window must not be negative",
                "refresh_after_hours",
            ));
        }
        if self.mirrors.is_empty() {
            return Err(Error::config("at least one mirror is required", "mirrors"));
        }
        if !self.target.contains("{filename}") && !self.target.contains("{ext}") {
            // Without either placeholder every download of a show would
            // land on the same literal path.
            if !self.target.contains('{') {
                return Err(Error::config(
                    "target template contains no placeholders",
                    "target",
                ));
            }
        }
        Ok(())
    }

    /// Path of the SQLite file holding catalog store and history ledger.
    pub fn database_path(&self) -> PathBuf {
        self.dir.join(".mediathek-dl.db")
    }
}

mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn default_refresh_window_is_three_hours() {
        assert_eq!(Settings::default().refresh_after_hours, 3);
    }

    #[test]
    fn rejects_negative_refresh_window() {
        let settings = Settings {
            refresh_after_hours: -1,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_empty_mirror_list() {
        let settings = Settings {
            mirrors: vec![],
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_placeholderless_target() {
        let settings = Settings {
            target: "/fixed/path".into(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        let err = serde_json::from_str::<Settings>(r#"{"no_such_key": true}"#);
        assert!(err.is_err());
    }

    #[test]
    fn config_file_values_override_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"count": 10, "include_future": true}"#).unwrap();
        assert_eq!(settings.count, 10);
        assert!(settings.include_future);
        assert_eq!(settings.refresh_after_hours, 3);
    }
}
