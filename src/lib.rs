// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod config;
pub mod download;
pub mod error;
pub mod http;
pub mod logging;
pub mod progress;
pub mod provision;
pub mod reconcile;
pub mod remote;
pub mod sync;
pub mod workspace;

// Re-export main types for convenience
pub use config::{Config, Credential, PlaylistConfig, RawConfig, RemoteConfig};
pub use download::{DownloadOutcome, Downloader, YtDlp};
pub use error::{
    ConfigError, DownloadError, ProvisionError, RemoteError, StartupError, SyncError,
    WorkspaceError,
};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use progress::{
    NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter, summary_message,
};
pub use provision::{ProvisionedTools, Provisioner, Tool, prepare};
pub use reconcile::{EpisodePattern, new_episodes};
pub use remote::{ConnectionParams, RemoteLister, SshRemote, Uploader};
pub use sync::{SyncContext, SyncOptions, SyncResult, sync_playlist};
pub use workspace::{WorkingDirectory, WorkspaceScan};
