//! Model artifact loading
//!
//! Artifacts are fetched once at construction time, from an `http(s)://` or
//! `file://` URL or a plain filesystem path, and optionally validated
//! against a SHA-256 checksum.

use crate::error::{PowerModelError, Result};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Artifacts larger than this are rejected
pub const MAX_ARTIFACT_BYTES: usize = 64 * 1024 * 1024;

/// Resolved location of a model artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    Remote(Url),
    File(PathBuf),
}

impl ArtifactSource {
    /// Classify a configured location string
    pub fn parse(location: &str) -> Result<Self> {
        match Url::parse(location) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(ArtifactSource::Remote(url)),
                "file" => url.to_file_path().map(ArtifactSource::File).map_err(|_| {
                    PowerModelError::UnsupportedSource(location.to_string())
                }),
                other => Err(PowerModelError::UnsupportedSource(format!(
                    "scheme '{}' in {}",
                    other, location
                ))),
            },
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Ok(ArtifactSource::File(PathBuf::from(location)))
            }
            Err(e) => Err(PowerModelError::UnsupportedSource(format!("{}: {}", location, e))),
        }
    }
}

/// Load the artifact at `location`, verifying `checksum` when given.
///
/// Remote fetches give up after `fetch_timeout`, covering connect and body.
pub async fn load_artifact(
    location: &str,
    checksum: Option<&str>,
    fetch_timeout: Duration,
) -> Result<Vec<u8>> {
    let bytes = match ArtifactSource::parse(location)? {
        ArtifactSource::Remote(url) => fetch_remote(url, fetch_timeout).await?,
        ArtifactSource::File(path) => {
            debug!(path = %path.display(), "Reading model artifact from disk");
            let read_err = |source| PowerModelError::ArtifactRead {
                location: location.to_string(),
                source,
            };
            let size = tokio::fs::metadata(&path).await.map_err(read_err)?.len();
            check_size(size)?;
            tokio::fs::read(&path).await.map_err(read_err)?
        }
    };

    if let Some(expected) = checksum {
        let actual = compute_checksum(&bytes);
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(PowerModelError::ChecksumMismatch {
                location: location.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
        debug!(checksum = %actual, "Model artifact checksum validated");
    }

    info!(location = %location, size = bytes.len(), "Model artifact loaded");
    Ok(bytes)
}

fn check_size(size: u64) -> Result<()> {
    if size > MAX_ARTIFACT_BYTES as u64 {
        return Err(PowerModelError::InvalidArtifact(format!(
            "artifact size {} exceeds maximum {}",
            size, MAX_ARTIFACT_BYTES
        )));
    }
    Ok(())
}

async fn fetch_remote(url: Url, fetch_timeout: Duration) -> Result<Vec<u8>> {
    let location = url.to_string();
    let fetch_err = |e: &dyn std::fmt::Display| PowerModelError::ArtifactFetch {
        location: location.clone(),
        reason: e.to_string(),
    };

    debug!(url = %location, timeout_secs = fetch_timeout.as_secs_f64(), "Downloading model artifact");
    let client = reqwest::Client::builder()
        .connect_timeout(fetch_timeout)
        .timeout(fetch_timeout)
        .build()
        .map_err(|e| fetch_err(&e))?;

    let mut response = client.get(url).send().await.map_err(|e| fetch_err(&e))?;
    if !response.status().is_success() {
        return Err(fetch_err(&format!("HTTP {}", response.status())));
    }
    if let Some(length) = response.content_length() {
        check_size(length)?;
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| fetch_err(&e))? {
        body.extend_from_slice(&chunk);
        check_size(body.len() as u64)?;
    }
    Ok(body)
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
