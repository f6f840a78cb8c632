// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::Arc;

/// Events emitted during a synchronization run for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A required tool is missing and is being installed
    InstallingTool { tool: String },

    /// Bytes received while fetching a tool release
    InstallProgress {
        tool: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// A tool was installed into the application directory
    ToolInstalled { tool: String, path: PathBuf },

    /// The per-run working directory exists
    WorkingDirectoryCreated { path: PathBuf },

    /// The remote archive is being listed
    ListingRemote { host: String, path: String },

    /// The remote archive listing was parsed
    RemoteListed { existing_count: usize },

    /// A zero-byte placeholder was created for an archived episode
    PlaceholderCreated { episode: String },

    /// The downloader is running against the playlist
    DownloadStarted { playlist_url: String },

    /// The downloader exited
    DownloadFinished {
        success: bool,
        exit_code: Option<i32>,
    },

    /// The working directory was scanned after downloading
    WorkingDirectoryScanned {
        new_episodes: usize,
        ignored_artifacts: usize,
    },

    /// An upload is starting
    UploadStarting {
        episode: String,
        /// Index of this episode in the upload queue
        index: usize,
        total: usize,
    },

    /// An upload completed successfully
    UploadCompleted { episode: String },

    /// An upload failed
    UploadFailed { episode: String, error: String },

    /// The run completed
    SyncCompleted {
        existing_count: usize,
        uploaded_count: usize,
        failed_count: usize,
    },
}

/// Trait for reporting progress events during synchronization.
///
/// Implementations can use this to print progress lines, draw progress bars,
/// or collect events in tests.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter, used for quiet mode
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

/// Final summary line for the number of uploaded episodes
pub fn summary_message(uploaded: usize) -> String {
    match uploaded {
        0 => "No new episodes in playlist to upload.".to_string(),
        1 => "Successfully uploaded 1 new/missing episode!".to_string(),
        n => format!("Successfully uploaded {n} new/missing episodes!"),
    }
}
