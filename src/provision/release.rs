// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::ProvisionError;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// A downloadable release file and where its checksums are published
#[derive(Debug, Clone, Copy)]
pub struct ReleaseAsset {
    pub name: &'static str,
    pub url: &'static str,
    pub checksums_url: &'static str,
}

/// Find the hex digest for `asset` in a `sha256sum` style manifest
pub fn parse_checksum(manifest: &str, asset: &str) -> Option<String> {
    manifest.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let digest = parts.next()?;
        let name = parts.next()?.trim_start_matches('*');

        (name == asset && digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()))
            .then(|| digest.to_ascii_lowercase())
    })
}

/// Download `asset` to `dest`, verifying its SHA-256 checksum.
///
/// Data is written to `<dest>.partial` first and only renamed into place once
/// the checksum matches.
pub async fn fetch_release<C: HttpClient>(
    client: &C,
    tool: &str,
    asset: &ReleaseAsset,
    dest: &Path,
    reporter: &SharedProgressReporter,
) -> Result<(), ProvisionError> {
    let expected = fetch_expected_checksum(client, asset).await?;

    let partial = partial_path(dest);
    let result = stream_to_file(client, tool, asset.url, &partial, reporter).await;

    let actual = match result {
        Ok(digest) => digest,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
    };

    if actual != expected {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(ProvisionError::ChecksumMismatch {
            asset: asset.name.to_string(),
            expected,
            actual,
        });
    }

    tokio::fs::rename(&partial, dest)
        .await
        .map_err(|e| ProvisionError::FileWriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;

    debug!(asset = asset.name, dest = %dest.display(), "release asset verified");
    Ok(())
}

async fn fetch_expected_checksum<C: HttpClient>(
    client: &C,
    asset: &ReleaseAsset,
) -> Result<String, ProvisionError> {
    let url = asset.checksums_url;
    let (status, manifest) =
        client
            .get_text(url)
            .await
            .map_err(|e| ProvisionError::HttpFailed {
                url: url.to_string(),
                source: e,
            })?;

    if status >= 400 {
        return Err(ProvisionError::HttpStatus {
            url: url.to_string(),
            status,
        });
    }

    parse_checksum(&manifest, asset.name).ok_or_else(|| ProvisionError::ChecksumMissing {
        asset: asset.name.to_string(),
        url: url.to_string(),
    })
}

/// Stream the body of `url` into `path`, returning its hex SHA-256
async fn stream_to_file<C: HttpClient>(
    client: &C,
    tool: &str,
    url: &str,
    path: &Path,
    reporter: &SharedProgressReporter,
) -> Result<String, ProvisionError> {
    let response = client
        .get_stream(url)
        .await
        .map_err(|e| ProvisionError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status >= 400 {
        return Err(ProvisionError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    let write_error = |e: std::io::Error| ProvisionError::FileWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = File::create(path).await.map_err(write_error)?;
    let mut hasher = Sha256::new();
    let mut bytes_downloaded: u64 = 0;
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| ProvisionError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk).await.map_err(write_error)?;
        hasher.update(&chunk);
        bytes_downloaded += chunk.len() as u64;

        reporter.report(ProgressEvent::InstallProgress {
            tool: tool.to_string(),
            bytes_downloaded,
            total_bytes: response.content_length,
        });
    }

    file.flush().await.map_err(write_error)?;

    Ok(format!("{:x}", hasher.finalize()))
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    dest.with_file_name(name)
}
