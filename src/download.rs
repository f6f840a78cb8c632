// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};
use url::Url;

use crate::error::DownloadError;

/// How a downloader run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
}

/// Fetches playlist items into a directory, skipping files that already exist
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download every item of `playlist` into `dir`.
    ///
    /// Per-item failures are not errors; only being unable to run at all is.
    async fn download(&self, playlist: &Url, dir: &Path) -> Result<DownloadOutcome, DownloadError>;
}

/// Downloader backed by a yt-dlp binary
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
    ffmpeg_dir: PathBuf,
    format: String,
    output_template: Option<String>,
    quiet: bool,
}

impl YtDlp {
    pub fn new(binary: PathBuf, ffmpeg_dir: PathBuf, format: impl Into<String>) -> Self {
        Self {
            binary,
            ffmpeg_dir,
            format: format.into(),
            output_template: None,
            quiet: false,
        }
    }

    pub fn with_output_template(mut self, template: Option<String>) -> Self {
        self.output_template = template;
        self
    }

    /// Discard the tool's own output
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// `bestvideo[ext=F]+bestaudio[ext=F]/best[ext=F]`
    pub fn format_selector(&self) -> String {
        let ext = &self.format;
        format!("bestvideo[ext={ext}]+bestaudio[ext={ext}]/best[ext={ext}]")
    }

    pub fn args(&self, playlist: &Url) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            self.format_selector().into(),
            "--ffmpeg-location".into(),
            self.ffmpeg_dir.as_os_str().to_os_string(),
            "--ignore-errors".into(),
        ];

        if let Some(template) = &self.output_template {
            args.push("-o".into());
            args.push(template.into());
        }

        args.push(playlist.as_str().into());
        args
    }
}

#[async_trait]
impl Downloader for YtDlp {
    async fn download(&self, playlist: &Url, dir: &Path) -> Result<DownloadOutcome, DownloadError> {
        let args = self.args(playlist);
        debug!(binary = %self.binary.display(), ?args, dir = %dir.display(), "running downloader");

        let mut command = Command::new(&self.binary);
        command
            .args(&args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if self.quiet {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let status = command
            .status()
            .await
            .map_err(|e| DownloadError::SpawnFailed {
                program: self.binary.clone(),
                source: e,
            })?;

        if !status.success() {
            warn!(%status, "downloader reported failures, continuing with what was fetched");
        }

        Ok(DownloadOutcome {
            success: status.success(),
            exit_code: status.code(),
        })
    }
}
