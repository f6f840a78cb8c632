// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod release;

use std::fmt;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

use crate::config::{Config, Credential, RawConfig};
use crate::error::{ProvisionError, StartupError};
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

pub use release::{ReleaseAsset, fetch_release, parse_checksum};

const YTDLP_RELEASE: ReleaseAsset = ReleaseAsset {
    name: "yt-dlp",
    url: "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp",
    checksums_url: "https://github.com/yt-dlp/yt-dlp/releases/latest/download/SHA2-256SUMS",
};

const FFMPEG_RELEASE: ReleaseAsset = ReleaseAsset {
    name: "ffmpeg-master-latest-linux64-gpl.tar.xz",
    url: "https://github.com/yt-dlp/FFmpeg-Builds/releases/download/latest/ffmpeg-master-latest-linux64-gpl.tar.xz",
    checksums_url: "https://github.com/yt-dlp/FFmpeg-Builds/releases/download/latest/checksums.sha256",
};

/// Binaries extracted from the transcoder archive
const FFMPEG_BINARIES: &[&str] = &["ffmpeg", "ffprobe", "ffplay"];

/// External tools a run depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Playlist downloader
    Downloader,
    /// Muxer used by the downloader to merge audio and video
    Transcoder,
    /// Feeds the password to ssh and scp
    SshPass,
}

impl Tool {
    /// Executable file name
    pub fn binary(&self) -> &'static str {
        match self {
            Tool::Downloader => "yt-dlp",
            Tool::Transcoder => "ffmpeg",
            Tool::SshPass => "sshpass",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

/// Paths of the tools the downloader step needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedTools {
    pub downloader: PathBuf,
    pub transcoder: PathBuf,
}

impl ProvisionedTools {
    /// Directory passed to the downloader as ffmpeg location
    pub fn transcoder_dir(&self) -> PathBuf {
        self.transcoder
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

/// Makes sure the external tools are present, installing them if not
pub struct Provisioner<C> {
    client: C,
    bin_dir: PathBuf,
    reporter: SharedProgressReporter,
    system_lookup: bool,
}

impl<C: HttpClient> Provisioner<C> {
    pub fn new(client: C, bin_dir: PathBuf, reporter: SharedProgressReporter) -> Self {
        Self {
            client,
            bin_dir,
            reporter,
            system_lookup: true,
        }
    }

    /// Only consider the application's own `bin` directory
    pub fn without_system_lookup(mut self) -> Self {
        self.system_lookup = false;
        self
    }

    /// Locate `tool`: the application's `bin` directory first, then `PATH`
    pub fn resolve(&self, tool: Tool) -> Option<PathBuf> {
        let local = self.bin_dir.join(tool.binary());
        if local.is_file() {
            return Some(local);
        }

        if self.system_lookup {
            return which::which(tool.binary()).ok();
        }

        None
    }

    pub fn is_installed(&self, tool: Tool) -> bool {
        self.resolve(tool).is_some()
    }

    /// Install `tool` and return the path it can be run from
    pub async fn install(&self, tool: Tool) -> Result<PathBuf, ProvisionError> {
        self.reporter.report(ProgressEvent::InstallingTool {
            tool: tool.to_string(),
        });

        std::fs::create_dir_all(&self.bin_dir).map_err(|e| {
            ProvisionError::CreateDirectoryFailed {
                path: self.bin_dir.clone(),
                source: e,
            }
        })?;

        match tool {
            Tool::Downloader => self.install_downloader().await?,
            Tool::Transcoder => self.install_transcoder().await?,
            Tool::SshPass => install_sshpass().await?,
        }

        let path = self
            .resolve(tool)
            .ok_or_else(|| ProvisionError::StillMissing {
                tool: tool.to_string(),
            })?;

        self.reporter.report(ProgressEvent::ToolInstalled {
            tool: tool.to_string(),
            path: path.clone(),
        });

        Ok(path)
    }

    /// Resolve `tool`, installing it first when it cannot be found
    pub async fn ensure(&self, tool: Tool) -> Result<PathBuf, ProvisionError> {
        match self.resolve(tool) {
            Some(path) => {
                debug!(%tool, path = %path.display(), "tool already installed");
                Ok(path)
            }
            None => self.install(tool).await,
        }
    }

    /// Everything a run with `credential` needs
    pub async fn ensure_all(
        &self,
        credential: &Credential,
    ) -> Result<ProvisionedTools, ProvisionError> {
        let downloader = self.ensure(Tool::Downloader).await?;
        let transcoder = self.ensure(Tool::Transcoder).await?;

        if matches!(credential, Credential::Password(_)) {
            self.ensure(Tool::SshPass).await?;
        }

        Ok(ProvisionedTools {
            downloader,
            transcoder,
        })
    }

    async fn install_downloader(&self) -> Result<(), ProvisionError> {
        let dest = self.bin_dir.join(Tool::Downloader.binary());
        fetch_release(
            &self.client,
            Tool::Downloader.binary(),
            &YTDLP_RELEASE,
            &dest,
            &self.reporter,
        )
        .await?;

        make_executable(&dest)
    }

    async fn install_transcoder(&self) -> Result<(), ProvisionError> {
        let scratch = tempfile::tempdir().map_err(|e| ProvisionError::CreateDirectoryFailed {
            path: std::env::temp_dir(),
            source: e,
        })?;
        let archive = scratch.path().join(FFMPEG_RELEASE.name);

        fetch_release(
            &self.client,
            Tool::Transcoder.binary(),
            &FFMPEG_RELEASE,
            &archive,
            &self.reporter,
        )
        .await?;

        let mut tar = Command::new("tar");
        tar.arg("--extract")
            .arg("--file")
            .arg(&archive)
            .arg("--directory")
            .arg(&self.bin_dir)
            .arg("--strip-components=2")
            .arg("--wildcards")
            .args(FFMPEG_BINARIES.iter().map(|binary| format!("*/bin/{binary}")));
        run_checked("tar", tar).await?;

        for binary in FFMPEG_BINARIES {
            make_executable(&self.bin_dir.join(binary))?;
        }

        Ok(())
    }
}

/// Resolve `raw` and make sure every tool the resulting run needs is present.
///
/// `client` is only handed to the provisioner once the configuration is valid,
/// so an invalid configuration never causes a download.
pub async fn prepare<C: HttpClient>(
    raw: RawConfig,
    client: C,
    reporter: SharedProgressReporter,
) -> Result<(Config, ProvisionedTools), StartupError> {
    let config = Config::resolve(raw)?;

    let tools = Provisioner::new(client, config.bin_dir(), reporter)
        .ensure_all(&config.remote.credential)
        .await?;

    Ok((config, tools))
}

async fn install_sshpass() -> Result<(), ProvisionError> {
    let mut update = Command::new("sudo");
    update.args(["apt-get", "update"]);
    run_checked("apt-get update", update).await?;

    let mut install = Command::new("sudo");
    install.args(["apt-get", "install", "-y", "sshpass"]);
    run_checked("apt-get install", install).await
}

async fn run_checked(program: &str, mut command: Command) -> Result<(), ProvisionError> {
    debug!(?command, "running installer command");

    let status = command
        .status()
        .await
        .map_err(|e| ProvisionError::SpawnFailed {
            program: program.to_string(),
            source: e,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(ProvisionError::CommandFailed {
            program: program.to_string(),
            status: status.to_string(),
        })
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), ProvisionError> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|e| {
        ProvisionError::FileWriteFailed {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), ProvisionError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ByteStream, HttpResponse};
    use crate::progress::{NoopReporter, ProgressReporter};
    use async_trait::async_trait;
    use bytes::Bytes;
    use sha2::{Digest, Sha256};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    #[derive(Clone)]
    struct MockHttpClient {
        asset: Vec<u8>,
        manifest: String,
    }

    impl MockHttpClient {
        fn serving(asset: &[u8]) -> Self {
            let digest = format!("{:x}", Sha256::digest(asset));
            Self {
                asset: asset.to_vec(),
                manifest: format!("{digest}  yt-dlp\n{digest}  yt-dlp.exe\n"),
            }
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get_text(&self, _url: &str) -> Result<(u16, String), reqwest::Error> {
            Ok((200, self.manifest.clone()))
        }

        async fn get_stream(&self, _url: &str) -> Result<HttpResponse, reqwest::Error> {
            let data = self.asset.clone();
            let len = data.len() as u64;

            let stream: ByteStream =
                Box::pin(futures::stream::once(async move { Ok(Bytes::from(data)) }));

            Ok(HttpResponse {
                status: 200,
                content_length: Some(len),
                body: stream,
            })
        }
    }

    /// Records every request and fails it
    struct CountingHttpClient {
        requests: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl HttpClient for CountingHttpClient {
        async fn get_text(&self, url: &str) -> Result<(u16, String), reqwest::Error> {
            self.requests.lock().unwrap().push(url.to_string());
            Ok((404, String::new()))
        }

        async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
            self.requests.lock().unwrap().push(url.to_string());
            Ok(HttpResponse {
                status: 404,
                content_length: None,
                body: Box::pin(futures::stream::empty()),
            })
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl ProgressReporter for RecordingReporter {
        fn report(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn provisioner(client: MockHttpClient, bin_dir: &Path) -> Provisioner<MockHttpClient> {
        Provisioner::new(client, bin_dir.to_path_buf(), NoopReporter::shared())
            .without_system_lookup()
    }

    #[test]
    fn resolve_prefers_application_bin_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("yt-dlp"), b"#!/bin/sh\n").unwrap();

        let provisioner = provisioner(MockHttpClient::serving(b""), dir.path());

        assert_eq!(
            provisioner.resolve(Tool::Downloader),
            Some(dir.path().join("yt-dlp"))
        );
        assert!(provisioner.is_installed(Tool::Downloader));
        assert!(!provisioner.is_installed(Tool::Transcoder));
    }

    #[test]
    fn transcoder_dir_is_parent_of_ffmpeg() {
        let tools = ProvisionedTools {
            downloader: PathBuf::from("/app/bin/yt-dlp"),
            transcoder: PathBuf::from("/usr/bin/ffmpeg"),
        };

        assert_eq!(tools.transcoder_dir(), PathBuf::from("/usr/bin"));
    }

    #[tokio::test]
    async fn installs_downloader_after_verifying_checksum() {
        let dir = tempdir().unwrap();
        let bin_dir = dir.path().join("bin");
        let reporter = Arc::new(RecordingReporter::default());

        let provisioner = Provisioner::new(
            MockHttpClient::serving(b"#!/usr/bin/env python3\n"),
            bin_dir.clone(),
            reporter.clone(),
        )
        .without_system_lookup();

        let path = provisioner.install(Tool::Downloader).await.unwrap();

        assert_eq!(path, bin_dir.join("yt-dlp"));
        assert_eq!(std::fs::read(&path).unwrap(), b"#!/usr/bin/env python3\n");
        assert!(!bin_dir.join("yt-dlp.partial").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }

        let events = reporter.events.lock().unwrap();
        assert!(matches!(
            events.first(),
            Some(ProgressEvent::InstallingTool { tool }) if tool == "yt-dlp"
        ));
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::ToolInstalled { tool, .. }) if tool == "yt-dlp"
        ));
    }

    #[tokio::test]
    async fn checksum_mismatch_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient {
            asset: b"tampered".to_vec(),
            manifest: format!("{:x}  yt-dlp\n", Sha256::digest(b"original")),
        };

        let provisioner = provisioner(client, dir.path());
        let result = provisioner.install(Tool::Downloader).await;

        assert!(matches!(
            result,
            Err(ProvisionError::ChecksumMismatch { .. })
        ));
        assert!(!dir.path().join("yt-dlp").exists());
        assert!(!dir.path().join("yt-dlp.partial").exists());
    }

    #[tokio::test]
    async fn missing_checksum_is_an_error() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient {
            asset: b"binary".to_vec(),
            manifest: String::new(),
        };

        let result = provisioner(client, dir.path())
            .install(Tool::Downloader)
            .await;

        assert!(matches!(result, Err(ProvisionError::ChecksumMissing { .. })));
    }

    #[tokio::test]
    async fn ensure_skips_installed_tools() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("yt-dlp"), b"local").unwrap();
        std::fs::write(dir.path().join("ffmpeg"), b"local").unwrap();

        // An empty manifest would make any install attempt fail
        let client = MockHttpClient {
            asset: Vec::new(),
            manifest: String::new(),
        };

        let tools = provisioner(client, dir.path())
            .ensure_all(&Credential::Key(PathBuf::from("/k")))
            .await
            .unwrap();

        assert_eq!(tools.downloader, dir.path().join("yt-dlp"));
        assert_eq!(tools.transcoder, dir.path().join("ffmpeg"));
        assert_eq!(tools.transcoder_dir(), dir.path());
    }

    #[tokio::test]
    async fn invalid_configuration_stops_before_any_download() {
        let dir = tempdir().unwrap();
        let app_dir = dir.path().join("app");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let reporter = Arc::new(RecordingReporter::default());

        let raw = RawConfig {
            ssh_host: Some("archive.example.com".to_string()),
            ssh_user: Some("archiver".to_string()),
            app_dir: Some(app_dir.clone()),
            ..Default::default()
        };

        let client = CountingHttpClient {
            requests: requests.clone(),
        };
        let result = prepare(raw, client, reporter.clone()).await;

        assert!(matches!(
            result,
            Err(StartupError::Config(crate::error::ConfigError::MissingCredential))
        ));
        assert!(requests.lock().unwrap().is_empty());
        assert!(reporter.events.lock().unwrap().is_empty());
        assert!(!app_dir.exists());
    }

    #[tokio::test]
    async fn prepare_uses_tools_from_the_app_dir() {
        let dir = tempdir().unwrap();
        let bin_dir = dir.path().join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        std::fs::write(bin_dir.join("yt-dlp"), b"local").unwrap();
        std::fs::write(bin_dir.join("ffmpeg"), b"local").unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let raw = RawConfig {
            ssh_host: Some("archive.example.com".to_string()),
            ssh_user: Some("archiver".to_string()),
            ssh_key: Some(PathBuf::from("/keys/id")),
            app_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        let client = CountingHttpClient {
            requests: requests.clone(),
        };
        let (config, tools) = prepare(raw, client, NoopReporter::shared()).await.unwrap();

        assert_eq!(config.bin_dir(), bin_dir);
        assert_eq!(tools.downloader, bin_dir.join("yt-dlp"));
        assert!(requests.lock().unwrap().is_empty());
    }
}
