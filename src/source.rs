//! Remote catalog source
//!
//! The catalog is published on several mirrors. A fetch shuffles the
//! mirror list once and walks it: an HTTP-level failure sleeps for a fixed
//! delay and moves on to the next mirror, so a failed mirror is never
//! retried within one fetch. Retries are bounded by the length of the
//! mirror list, never unbounded.

use crate::error::{Error, Result};
use rand::seq::SliceRandom;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Retried bulk downloader for the compressed catalog payload.
pub struct RemoteSource {
    client: reqwest::Client,
    mirrors: Vec<String>,
    retry_delay: Duration,
}

impl RemoteSource {
    /// Create a source over the given mirror list.
    pub fn new(client: reqwest::Client, mirrors: Vec<String>, retry_delay: Duration) -> Self {
        Self {
            client,
            mirrors,
            retry_delay,
        }
    }

    /// Download the compressed catalog to `dest`, returning the transfer
    /// size. Exhausting the mirror list is fatal for this ingestion
    /// attempt.
    pub async fn fetch_catalog(&self, dest: &Path) -> Result<u64> {
        let mut order = self.mirrors.clone();
        order.shuffle(&mut rand::thread_rng());

        let attempts = order.len();
        for (attempt, mirror) in order.iter().enumerate() {
            let remaining = attempts - attempt - 1;

            tracing::debug!(url = %mirror, "opening catalog");
            match download(&self.client, mirror, dest).await {
                Ok(size) => return Ok(size),
                Err(e) if e.is_transient() && remaining > 0 => {
                    tracing::debug!(
                        error = %e,
                        remaining,
                        "catalog download failed, trying another mirror"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) if e.is_transient() => {
                    tracing::error!(error = %e, "catalog download failed, no more retries");
                    return Err(Error::MirrorsExhausted { attempts });
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::MirrorsExhausted { attempts })
    }
}

/// Stream a URL to a file, returning the number of bytes written.
pub(crate) async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> Result<u64> {
    let mut response = client.get(url).send().await?.error_for_status()?;

    if let Some(total) = response.content_length() {
        tracing::trace!(url, total, "transfer started");
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    tracing::trace!(url, written, "transfer finished");
    Ok(written)
}
