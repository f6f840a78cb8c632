// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use tracing::{info, warn};
use url::Url;

use crate::download::Downloader;
use crate::error::SyncError;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::reconcile::{EpisodePattern, new_episodes};
use crate::remote::{RemoteLister, Uploader};
use crate::workspace::{create_placeholders, scan_working_dir};

/// Options for playlist synchronization
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Keep uploading when a single transfer fails
    pub continue_on_error: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            continue_on_error: true,
        }
    }
}

/// Result of a sync run
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    /// Episodes found on the remote host at the start of the run
    pub existing: Vec<String>,
    /// Episodes uploaded during this run, in upload order
    pub uploaded: Vec<String>,
    /// Failed uploads (episode, error message)
    pub failed_uploads: Vec<(String, String)>,
    /// Whether the downloader exited cleanly
    pub downloader_succeeded: bool,
}

/// The collaborators of one run
pub struct SyncContext<'a, L, D, U> {
    pub lister: &'a L,
    pub downloader: &'a D,
    pub uploader: &'a U,
    pub reporter: SharedProgressReporter,
}

/// Bring the remote archive up to date with the playlist.
///
/// 1. Lists the episodes already archived on the remote host
/// 2. Creates a placeholder for each of them in `working_dir`
/// 3. Runs the downloader, which skips the placeholders
/// 4. Uploads every file in `working_dir` that is not already archived
pub async fn sync_playlist<L, D, U>(
    ctx: &SyncContext<'_, L, D, U>,
    playlist: &Url,
    pattern: &EpisodePattern,
    working_dir: &Path,
    options: &SyncOptions,
) -> Result<SyncResult, SyncError>
where
    L: RemoteLister,
    D: Downloader,
    U: Uploader,
{
    let reporter = &ctx.reporter;

    let (host, remote_path) = ctx.lister.describe();
    reporter.report(ProgressEvent::ListingRemote {
        host,
        path: remote_path,
    });

    let existing = ctx.lister.list(pattern).await?;
    reporter.report(ProgressEvent::RemoteListed {
        existing_count: existing.len(),
    });

    create_placeholders(working_dir, &existing, |episode| {
        reporter.report(ProgressEvent::PlaceholderCreated {
            episode: episode.to_string(),
        });
    })?;

    reporter.report(ProgressEvent::DownloadStarted {
        playlist_url: playlist.to_string(),
    });
    let outcome = ctx.downloader.download(playlist, working_dir).await?;
    reporter.report(ProgressEvent::DownloadFinished {
        success: outcome.success,
        exit_code: outcome.exit_code,
    });

    let scan = scan_working_dir(working_dir)?;
    let to_upload = new_episodes(&scan.entries, &existing);
    info!(
        new = to_upload.len(),
        ignored = scan.ignored_artifacts,
        "working directory scanned"
    );
    reporter.report(ProgressEvent::WorkingDirectoryScanned {
        new_episodes: to_upload.len(),
        ignored_artifacts: scan.ignored_artifacts,
    });

    let total = to_upload.len();
    let mut uploaded = Vec::with_capacity(total);
    let mut failed_uploads = Vec::new();

    for (index, episode) in to_upload.into_iter().enumerate() {
        reporter.report(ProgressEvent::UploadStarting {
            episode: episode.clone(),
            index,
            total,
        });

        match ctx.uploader.upload(&working_dir.join(&episode)).await {
            Ok(()) => {
                reporter.report(ProgressEvent::UploadCompleted {
                    episode: episode.clone(),
                });
                uploaded.push(episode);
            }
            Err(e) => {
                warn!(%episode, error = %e, "upload failed");
                reporter.report(ProgressEvent::UploadFailed {
                    episode: episode.clone(),
                    error: e.to_string(),
                });

                if !options.continue_on_error {
                    return Err(SyncError::UploadFailed { episode, source: e });
                }
                failed_uploads.push((episode, e.to_string()));
            }
        }
    }

    reporter.report(ProgressEvent::SyncCompleted {
        existing_count: existing.len(),
        uploaded_count: uploaded.len(),
        failed_count: failed_uploads.len(),
    });

    Ok(SyncResult {
        existing,
        uploaded,
        failed_uploads,
        downloader_succeeded: outcome.success,
    })
}
