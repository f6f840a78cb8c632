// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_PLAYLIST_ID: &str = "PL7siVIUmPpIG-m0oTKne3eaSixyUzGFPs";
pub const DEFAULT_FORMAT: &str = "webm";
pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_TITLE_PREFIX: &str = "Die Geschichte des Drachenlord";

const APP_DIR_NAME: &str = ".playlist-sync";
const PLAYLIST_BASE_URL: &str = "https://www.youtube.com/playlist";

/// Unvalidated settings as collected from flags and environment variables.
///
/// Every field is optional so that validation (and its exit code) stays
/// under our control instead of the argument parser's.
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    pub playlist_id: Option<String>,
    pub format: Option<String>,
    pub title_prefix: Option<String>,
    pub output_template: Option<String>,
    pub ssh_host: Option<String>,
    pub ssh_port: Option<String>,
    pub ssh_user: Option<String>,
    pub ssh_key: Option<PathBuf>,
    pub ssh_password: Option<String>,
    pub scp_path: Option<String>,
    pub app_dir: Option<PathBuf>,
}

/// How we authenticate against the remote host
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Absolute path to a private key file
    Key(PathBuf),
    /// Password handed to sshpass
    Password(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Key(path) => f.debug_tuple("Key").field(path).finish(),
            Credential::Password(_) => f.write_str("Password(<redacted>)"),
        }
    }
}

/// What to fetch and how the archived files are named
#[derive(Debug, Clone)]
pub struct PlaylistConfig {
    pub playlist_id: String,
    pub format: String,
    pub title_prefix: String,
    pub output_template: Option<String>,
}

impl PlaylistConfig {
    /// Public URL of the playlist
    pub fn url(&self) -> Url {
        Url::parse_with_params(PLAYLIST_BASE_URL, &[("list", self.playlist_id.as_str())])
            .expect("valid playlist URL")
    }
}

/// Where the archive lives
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub credential: Credential,
    /// Directory on the remote host holding the archived episodes
    pub path: String,
}

/// Fully resolved, immutable configuration for one run
#[derive(Debug, Clone)]
pub struct Config {
    pub playlist: PlaylistConfig,
    pub remote: RemoteConfig,
    /// Application directory, its `bin` subdirectory holds installed tools
    pub app_dir: PathBuf,
}

impl Config {
    /// Validate raw settings, filling in defaults.
    ///
    /// Nothing here touches the network; a failure means the run must stop
    /// before any remote action.
    pub fn resolve(raw: RawConfig) -> Result<Self, ConfigError> {
        let playlist_id = non_empty(raw.playlist_id)
            .unwrap_or_else(|| DEFAULT_PLAYLIST_ID.to_string());

        let format = non_empty(raw.format).unwrap_or_else(|| DEFAULT_FORMAT.to_string());
        if !format.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::InvalidFormat(format));
        }

        let title_prefix =
            non_empty(raw.title_prefix).unwrap_or_else(|| DEFAULT_TITLE_PREFIX.to_string());

        let host = non_empty(raw.ssh_host).ok_or(ConfigError::MissingHost)?;
        let user = non_empty(raw.ssh_user).ok_or(ConfigError::MissingUser)?;
        let port = parse_port(raw.ssh_port.as_deref())?;
        let credential = resolve_credential(raw.ssh_key, non_empty(raw.ssh_password))?;

        let path = non_empty(raw.scp_path).unwrap_or_else(|| playlist_id.clone());

        let app_dir = match raw.app_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .map(|home| home.join(APP_DIR_NAME))
                .ok_or(ConfigError::NoAppDirectory)?,
        };

        Ok(Config {
            playlist: PlaylistConfig {
                playlist_id,
                format,
                title_prefix,
                output_template: non_empty(raw.output_template),
            },
            remote: RemoteConfig {
                host,
                port,
                user,
                credential,
                path,
            },
            app_dir,
        })
    }

    /// Directory holding locally installed tool binaries
    pub fn bin_dir(&self) -> PathBuf {
        self.app_dir.join("bin")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_port(value: Option<&str>) -> Result<u16, ConfigError> {
    match value.map(str::trim) {
        None | Some("") => Ok(DEFAULT_SSH_PORT),
        Some(raw) => match raw.parse::<u16>() {
            Ok(port) if port != 0 => Ok(port),
            _ => Err(ConfigError::InvalidPort(raw.to_string())),
        },
    }
}

fn resolve_credential(
    key: Option<PathBuf>,
    password: Option<String>,
) -> Result<Credential, ConfigError> {
    let key = key.filter(|k| !k.as_os_str().is_empty());

    match (key, password) {
        (Some(_), Some(_)) => Err(ConfigError::AmbiguousCredential),
        (None, None) => Err(ConfigError::MissingCredential),
        (Some(key), None) => Ok(Credential::Key(absolute_key_path(&key)?)),
        (None, Some(password)) => Ok(Credential::Password(password)),
    }
}

fn absolute_key_path(path: &Path) -> Result<PathBuf, ConfigError> {
    std::path::absolute(path).map_err(|e| ConfigError::InvalidKeyPath {
        path: path.to_path_buf(),
        source: e,
    })
}
