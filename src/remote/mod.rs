// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod connection;
mod ssh;

use std::path::Path;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::reconcile::EpisodePattern;

pub use connection::{ConnectionParams, Invocation, sh_quote};
pub use ssh::SshRemote;

/// Lists the episodes already archived on the remote host
#[async_trait]
pub trait RemoteLister: Send + Sync {
    /// Ordered episode names matching `pattern`.
    ///
    /// Connection or listing failures are errors, never an empty list.
    async fn list(&self, pattern: &EpisodePattern) -> Result<Vec<String>, RemoteError>;

    /// Human readable location, used for progress output
    fn describe(&self) -> (String, String);
}

/// Copies freshly downloaded episodes to the remote host
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, local_file: &Path) -> Result<(), RemoteError>;
}
