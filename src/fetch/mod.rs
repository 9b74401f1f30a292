//! Media retrieval
//!
//! One fetch handles one show end to end: pick the URL for the preferred
//! quality tier, download into a scratch directory, resolve adaptive
//! manifests into a single playable file, convert subtitles, and move the
//! results to their templated destination. The scratch directory is
//! dropped on every exit path.

use crate::error::{Error, Result};
use crate::source;
use crate::types::{QualityPreference, ShowRecord};
use std::path::{Path, PathBuf};
use url::Url;

mod hls;
mod subtitles;
pub mod target;

/// Extensions handled as direct progressive downloads.
const DIRECT_EXTENSIONS: [&str; 3] = [".mp4", ".flv", ".mp3"];

/// Per-show fetch result.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The media file reached its destination.
    Saved(PathBuf),
    /// The show was skipped after download (e.g. the final move failed);
    /// the batch continues and history stays unmarked.
    Skipped(String),
}

/// Downloads one show at a time into a templated destination tree.
pub struct MediaFetcher {
    client: reqwest::Client,
    dir: PathBuf,
    target_template: String,
    fetch_subtitles: bool,
}

impl MediaFetcher {
    /// Create a fetcher saving below `dir` using the given destination
    /// template.
    pub fn new(
        client: reqwest::Client,
        dir: PathBuf,
        target_template: String,
        fetch_subtitles: bool,
    ) -> Self {
        Self {
            client,
            dir,
            target_template,
            fetch_subtitles,
        }
    }

    /// Retrieve one show's media (and subtitles, when published and
    /// enabled) to its destination.
    ///
    /// Errors abort only this show; the caller decides whether the batch
    /// continues. History is never touched here.
    pub async fn fetch(
        &self,
        show: &ShowRecord,
        preference: QualityPreference,
    ) -> Result<FetchOutcome> {
        let (quality, media_url) = preference.pick(show).ok_or_else(|| {
            Error::InvalidCatalog(format!("no media url for {}", show.label()))
        })?;
        tracing::debug!(show = %show.label(), ?quality, url = media_url, "downloading");

        let scratch = tempfile::Builder::new()
            .prefix(".tmp")
            .tempdir_in(&self.dir)?;

        let media_url = Url::parse(media_url)?;
        let (stem, extension) = split_name(&media_url);
        let downloaded = scratch.path().join(format!("{stem}{extension}"));
        source::download(&self.client, media_url.as_str(), &downloaded).await?;

        let (finished, extension) = if DIRECT_EXTENSIONS.contains(&extension.as_str()) {
            (downloaded, extension)
        } else if extension == ".m3u8" {
            let assembled = hls::assemble(
                &self.client,
                scratch.path(),
                &media_url,
                &downloaded,
                preference.leading(),
            )
            .await?;
            (assembled, ".ts".to_string())
        } else {
            return Err(Error::UnsupportedFormat { extension });
        };

        let destination = target::render(&self.target_template, &self.dir, show, &stem, &extension)?;
        if let Err(e) = target::place(&finished, &destination) {
            tracing::warn!(show = %show.label(), error = %e, "skipped, could not move to target");
            return Ok(FetchOutcome::Skipped(e.to_string()));
        }
        tracing::info!(show = %show.label(), destination = %destination.display(), "saved");

        if self.fetch_subtitles {
            if let Some(subtitles_url) = show.url_subtitles.as_deref() {
                self.save_subtitles(show, subtitles_url, scratch.path(), &stem)
                    .await?;
            }
        }

        Ok(FetchOutcome::Saved(destination))
    }

    /// Download and convert the show's subtitles, placing the SRT file via
    /// the same destination template as the media.
    async fn save_subtitles(
        &self,
        show: &ShowRecord,
        url: &str,
        scratch: &Path,
        stem: &str,
    ) -> Result<()> {
        let xml_path = scratch.join("subtitles.xml");
        source::download(&self.client, url, &xml_path).await?;

        let xml = tokio::fs::read_to_string(&xml_path).await?;
        let srt = subtitles::convert_to_srt(&xml)?;
        let srt_path = scratch.join("subtitles.srt");
        tokio::fs::write(&srt_path, srt).await?;

        let destination = target::render(&self.target_template, &self.dir, show, stem, ".srt")?;
        if let Err(e) = target::place(&srt_path, &destination) {
            tracing::warn!(show = %show.label(), error = %e, "could not move subtitles to target");
        }
        Ok(())
    }
}

/// Split a media URL's final path segment into stem and dotted extension
/// (empty when there is none).
fn split_name(url: &Url) -> (String, String) {
    let name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => {
            (stem.to_string(), format!(".{extension}"))
        }
        _ => (name.to_string(), String::new()),
    }
}
