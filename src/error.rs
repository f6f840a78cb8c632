// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while resolving the run configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("SSH_HOST is not set")]
    MissingHost,

    #[error("SSH_USER is not set")]
    MissingUser,

    #[error("SSH_PORT '{0}' is not a valid port")]
    InvalidPort(String),

    #[error("Neither SSH_KEY nor SSH_PASSWORD is set")]
    MissingCredential,

    #[error("Both SSH_KEY and SSH_PASSWORD are set, specify only one")]
    AmbiguousCredential,

    #[error("Failed to resolve SSH key path {path}: {source}")]
    InvalidKeyPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("PREFERRED_FORMAT '{0}' is not a valid file extension")]
    InvalidFormat(String),

    #[error("Could not determine the application directory, set APP_DIR")]
    NoAppDirectory,
}

/// Errors that can occur while making sure the external tools are available
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No checksum for {asset} in {url}")]
    ChecksumMissing { asset: String, url: String },

    #[error("Checksum mismatch for {asset}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        asset: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to run {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    CommandFailed { program: String, status: String },

    #[error("{tool} is still not available after installation")]
    StillMissing { tool: String },
}

/// Errors that can occur when talking to the remote archive host
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Failed to run {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Listing {path} on {host} failed ({status}): {stderr}")]
    ListingFailed {
        host: String,
        path: String,
        status: String,
        stderr: String,
    },

    #[error("Remote listing is not valid UTF-8: {0}")]
    InvalidListing(#[from] std::string::FromUtf8Error),

    #[error("Uploading {file} failed ({status})")]
    UploadFailed { file: PathBuf, status: String },
}

/// Errors that can occur in the local working directory
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Failed to create working directory: {0}")]
    CreateFailed(#[source] std::io::Error),

    #[error("Refusing to create placeholder for unsafe name '{0}'")]
    UnsafeName(String),

    #[error("Failed to create placeholder {path}: {source}")]
    PlaceholderFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the playlist downloader
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Failed to run downloader {program}: {source}")]
    SpawnFailed {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level errors for a synchronization run
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Working directory error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("Upload of '{episode}' failed: {source}")]
    UploadFailed {
        episode: String,
        #[source]
        source: RemoteError,
    },
}

/// Errors raised before a run may touch the network
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to provide required tools: {0}")]
    Provision(#[from] ProvisionError),
}
