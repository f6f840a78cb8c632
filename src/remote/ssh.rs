// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tracing::debug;

use super::connection::{ConnectionParams, Invocation, sh_quote};
use super::{RemoteLister, Uploader};
use crate::config::RemoteConfig;
use crate::error::RemoteError;
use crate::reconcile::EpisodePattern;

/// Remote archive reached with the system `ssh`/`scp` clients
#[derive(Clone)]
pub struct SshRemote {
    params: ConnectionParams,
    path: String,
    /// Show scp's own output
    verbose_transfers: bool,
}

impl SshRemote {
    pub fn new(config: &RemoteConfig, verbose_transfers: bool) -> Self {
        Self {
            params: ConnectionParams::new(config),
            path: config.path.clone(),
            verbose_transfers,
        }
    }

    /// Run other executables in place of `ssh` and `scp`
    pub fn with_programs(mut self, ssh: impl Into<String>, scp: impl Into<String>) -> Self {
        self.params = self.params.with_programs(ssh, scp);
        self
    }

    /// The ssh invocation used for listing the archive
    pub fn listing_invocation(&self) -> Invocation {
        self.params
            .ssh(&format!("ls -1 -- {}", sh_quote(&self.path)))
    }

    /// The scp invocation used for uploading one file
    pub fn upload_invocation(&self, local_file: &Path) -> Invocation {
        self.params.scp(local_file, &self.path)
    }
}

#[async_trait]
impl RemoteLister for SshRemote {
    async fn list(&self, pattern: &EpisodePattern) -> Result<Vec<String>, RemoteError> {
        let invocation = self.listing_invocation();
        debug!(?invocation, "listing remote archive");

        let program = invocation.program.clone();
        let output = invocation
            .into_command()
            .output()
            .await
            .map_err(|e| RemoteError::SpawnFailed { program, source: e })?;

        if !output.status.success() {
            return Err(RemoteError::ListingFailed {
                host: self.params.host().to_string(),
                path: self.path.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8(output.stdout)?;
        let episodes = pattern.parse_listing(&stdout);
        debug!(
            count = episodes.len(),
            skipped = stdout.lines().count() - episodes.len(),
            "parsed remote listing"
        );

        Ok(episodes)
    }

    fn describe(&self) -> (String, String) {
        (self.params.destination(), self.path.clone())
    }
}

#[async_trait]
impl Uploader for SshRemote {
    async fn upload(&self, local_file: &Path) -> Result<(), RemoteError> {
        let invocation = self.upload_invocation(local_file);
        debug!(?invocation, "uploading episode");

        let program = invocation.program.clone();
        let mut command = invocation.into_command();
        if !self.verbose_transfers {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let status = command
            .status()
            .await
            .map_err(|e| RemoteError::SpawnFailed { program, source: e })?;

        if status.success() {
            Ok(())
        } else {
            Err(RemoteError::UploadFailed {
                file: local_file.to_path_buf(),
                status: status.to_string(),
            })
        }
    }
}
