//! Adaptive-manifest resolution and segment reassembly.
//!
//! A master manifest lists bitrate variants on `#EXT-X-STREAM-INF` lines;
//! the URL on the following line belongs to that variant. Variant and
//! segment URLs may be relative and resolve against the manifest's own
//! URL.

use crate::error::{Error, Result};
use crate::source;
use crate::types::Quality;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use url::Url;

/// One stream variant from a master manifest.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Variant {
    pub bandwidth: u64,
    pub codecs: Option<String>,
    pub url: Url,
}

impl Variant {
    /// A variant is audio-only when every declared codec is an `mp4a`
    /// audio codec. Variants without a codec declaration count as video.
    fn is_audio_only(&self) -> bool {
        match &self.codecs {
            Some(codecs) => codecs
                .split(',')
                .all(|codec| codec.trim().starts_with("mp4a")),
            None => false,
        }
    }
}

/// Split one `#EXT-X-STREAM-INF` attribute list into key/value pairs,
/// honoring quoted values. Keys are lowercased, quotes stripped.
fn attributes(line: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = line;
    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim().to_ascii_lowercase();
        rest = &rest[eq + 1..];
        let value = if let Some(tail) = rest.strip_prefix('"') {
            let end = tail.find('"').unwrap_or(tail.len());
            let value = &tail[..end];
            rest = tail.get(end + 1..).unwrap_or("");
            value.to_string()
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            let value = rest[..end].trim().to_string();
            rest = rest.get(end..).unwrap_or("");
            value
        };
        rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
        pairs.push((key, value));
    }
    pairs
}

/// Parse a master manifest into its eligible variants: audio-only streams
/// and streams without a bandwidth are discarded, the rest are returned
/// sorted by bandwidth ascending.
pub(crate) fn parse_master(base: &Url, manifest: &str) -> Result<Vec<Variant>> {
    let mut variants = Vec::new();
    let mut pending: Option<(Option<u64>, Option<String>)> = None;

    for line in manifest.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(attrs) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            let mut bandwidth = None;
            let mut codecs = None;
            for (key, value) in attributes(attrs) {
                match key.as_str() {
                    "bandwidth" => bandwidth = value.parse().ok(),
                    "codecs" => codecs = Some(value),
                    _ => {}
                }
            }
            pending = Some((bandwidth, codecs));
        } else if !line.starts_with('#') {
            if let Some((bandwidth, codecs)) = pending.take() {
                let variant = Variant {
                    bandwidth: match bandwidth {
                        Some(b) => b,
                        None => continue,
                    },
                    codecs,
                    url: base.join(line)?,
                };
                if !variant.is_audio_only() {
                    variants.push(variant);
                }
            }
        }
    }

    variants.sort_by_key(|v| v.bandwidth);
    Ok(variants)
}

/// Pick a variant for the leading quality tier: highest bandwidth for HD,
/// lowest for small, the median index otherwise.
pub(crate) fn select_variant(variants: &[Variant], leading: Quality) -> Result<&Variant> {
    if variants.is_empty() {
        return Err(Error::NoStreamVariants);
    }
    let index = match leading {
        Quality::Hd => variants.len() - 1,
        Quality::Small => 0,
        Quality::Standard => variants.len() / 2,
    };
    Ok(&variants[index])
}

/// Parse a variant manifest's segment list. Every non-directive line is a
/// segment URL, resolved against the base.
pub(crate) fn parse_segments(base: &Url, manifest: &str) -> Result<Vec<Url>> {
    manifest
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| base.join(line).map_err(Error::from))
        .collect()
}

/// Resolve a master manifest and reassemble the selected variant into one
/// `.ts` file inside `scratch`.
///
/// Segments are fetched sequentially in manifest order and appended to the
/// output; each segment file is deleted right after it is appended, so
/// scratch usage stays near one segment plus the output.
pub(crate) async fn assemble(
    client: &reqwest::Client,
    scratch: &Path,
    base: &Url,
    master_path: &Path,
    leading: Quality,
) -> Result<PathBuf> {
    let master = tokio::fs::read_to_string(master_path).await?;
    let variants = parse_master(base, &master)?;
    let variant = select_variant(&variants, leading)?;
    tracing::debug!(
        bandwidth = variant.bandwidth,
        available = variants.len(),
        "selected stream variant"
    );

    let variant_path = scratch.join("variant.m3u8");
    source::download(client, variant.url.as_str(), &variant_path).await?;
    let segments = parse_segments(&variant.url, &tokio::fs::read_to_string(&variant_path).await?)?;
    tracing::debug!(segments = segments.len(), "downloading stream segments");

    let output_path = scratch.join("assembled.ts");
    let mut output = tokio::fs::File::create(&output_path).await?;
    for (index, segment) in segments.iter().enumerate() {
        let segment_path = scratch.join(format!("segment-{index:05}"));
        source::download(client, segment.as_str(), &segment_path).await?;

        let bytes = tokio::fs::read(&segment_path).await?;
        output.write_all(&bytes).await?;
        tokio::fs::remove_file(&segment_path).await?;
    }
    output.flush().await?;

    Ok(output_path)
}
