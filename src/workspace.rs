// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Component, Path, PathBuf};

use regex::Regex;
use tempfile::TempDir;

use crate::error::WorkspaceError;

const WORKDIR_PREFIX: &str = "playlist-sync-";

/// Suffixes of files the downloader leaves behind for unfinished items
const ARTIFACT_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp"];

/// Single-format streams (`<name>.f248.webm`) left over when merging failed
const FORMAT_STREAM_PATTERN: &str = r"\.f\d+\.[^.]+$";

/// Fresh, exclusive directory for one run
#[derive(Debug)]
pub struct WorkingDirectory {
    dir: TempDir,
}

/// Contents of the working directory after downloading
#[derive(Debug, Clone, Default)]
pub struct WorkspaceScan {
    /// Regular file names, sorted
    pub entries: Vec<String>,
    /// Number of unfinished download artifacts that were skipped
    pub ignored_artifacts: usize,
}

impl WorkingDirectory {
    /// Create a new working directory below the system temp dir
    pub fn create() -> Result<Self, WorkspaceError> {
        let dir = tempfile::Builder::new()
            .prefix(WORKDIR_PREFIX)
            .tempdir()
            .map_err(WorkspaceError::CreateFailed)?;

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Keep the directory on disk after the run and return its path
    pub fn keep(self) -> PathBuf {
        self.dir.keep()
    }
}

/// Create one zero-byte placeholder per archived episode.
///
/// `on_created` is called with every name after its file exists.
pub fn create_placeholders(
    dir: &Path,
    episodes: &[String],
    mut on_created: impl FnMut(&str),
) -> Result<(), WorkspaceError> {
    for episode in episodes {
        if !is_plain_file_name(episode) {
            return Err(WorkspaceError::UnsafeName(episode.clone()));
        }

        let path = dir.join(episode);
        std::fs::File::create(&path)
            .map_err(|e| WorkspaceError::PlaceholderFailed { path, source: e })?;

        on_created(episode);
    }

    Ok(())
}

/// List the regular files of the working directory.
///
/// Subdirectories and the downloader's in-progress artifacts are skipped.
pub fn scan_working_dir(dir: &Path) -> Result<WorkspaceScan, WorkspaceError> {
    let read_error = |e: std::io::Error| WorkspaceError::ReadDirectoryFailed {
        path: dir.to_path_buf(),
        source: e,
    };

    let format_stream = Regex::new(FORMAT_STREAM_PATTERN).expect("valid stream pattern");
    let mut scan = WorkspaceScan::default();

    for entry in std::fs::read_dir(dir).map_err(read_error)? {
        let entry = entry.map_err(read_error)?;

        if !entry.file_type().map_err(read_error)?.is_file() {
            continue;
        }

        // Names that are not valid UTF-8 cannot match an archived episode
        let Some(filename) = entry.file_name().to_str().map(String::from) else {
            continue;
        };

        if is_download_artifact(&filename, &format_stream) {
            scan.ignored_artifacts += 1;
            continue;
        }

        scan.entries.push(filename);
    }

    scan.entries.sort();
    Ok(scan)
}

fn is_download_artifact(filename: &str, format_stream: &Regex) -> bool {
    ARTIFACT_SUFFIXES
        .iter()
        .any(|suffix| filename.ends_with(suffix))
        || filename.contains(".part-Frag")
        || format_stream.is_match(filename)
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(first)), None) if first == name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn working_directories_are_distinct() {
        let first = WorkingDirectory::create().unwrap();
        let second = WorkingDirectory::create().unwrap();

        assert_ne!(first.path(), second.path());
        assert!(first.path().is_dir());
        assert!(
            first
                .path()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(WORKDIR_PREFIX)
        );
    }

    #[test]
    fn working_directory_is_removed_on_drop() {
        let workdir = WorkingDirectory::create().unwrap();
        let path = workdir.path().to_path_buf();

        drop(workdir);
        assert!(!path.exists());
    }

    #[test]
    fn kept_working_directory_survives() {
        let workdir = WorkingDirectory::create().unwrap();
        let path = workdir.keep();

        assert!(path.is_dir());
        std::fs::remove_dir_all(&path).unwrap();
    }

    #[test]
    fn placeholders_are_empty_files_with_exact_names() {
        let dir = tempdir().unwrap();
        let episodes = names(&[
            "Die Geschichte des Drachenlord Ep1.webm",
            "Die Geschichte des Drachenlord Ep2 [x].webm",
        ]);

        let mut created = Vec::new();
        create_placeholders(dir.path(), &episodes, |name| created.push(name.to_string()))
            .unwrap();

        assert_eq!(created, episodes);
        for episode in &episodes {
            let metadata = std::fs::metadata(dir.path().join(episode)).unwrap();
            assert!(metadata.is_file());
            assert_eq!(metadata.len(), 0);
        }
    }

    #[test]
    fn duplicate_placeholders_are_tolerated() {
        let dir = tempdir().unwrap();
        let episodes = names(&["A.webm", "A.webm"]);

        create_placeholders(dir.path(), &episodes, |_| {}).unwrap();
        assert_eq!(scan_working_dir(dir.path()).unwrap().entries, names(&["A.webm"]));
    }

    #[test]
    fn unsafe_placeholder_names_are_rejected() {
        let dir = tempdir().unwrap();

        for name in ["", ".", "..", "../escape.webm", "sub/dir.webm", "/abs.webm"] {
            let result = create_placeholders(dir.path(), &names(&[name]), |_| {});
            assert!(
                matches!(result, Err(WorkspaceError::UnsafeName(_))),
                "name {name:?} should be rejected"
            );
        }
    }

    #[test]
    fn scan_lists_files_sorted() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.webm"), b"video").unwrap();
        std::fs::write(dir.path().join("a.webm"), b"").unwrap();

        let scan = scan_working_dir(dir.path()).unwrap();
        assert_eq!(scan.entries, names(&["a.webm", "b.webm"]));
        assert_eq!(scan.ignored_artifacts, 0);
    }

    #[test]
    fn scan_skips_artifacts_and_directories() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("done.webm"), b"video").unwrap();
        std::fs::write(dir.path().join("half.webm.part"), b"vi").unwrap();
        std::fs::write(dir.path().join("half.webm.ytdl"), b"{}").unwrap();
        std::fs::write(dir.path().join("half.f248.webm.part-Frag3"), b"v").unwrap();
        std::fs::write(dir.path().join("Ep2 [abc].f248.webm"), b"video").unwrap();
        std::fs::write(dir.path().join("Ep2 [abc].f251.webm"), b"audio").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let scan = scan_working_dir(dir.path()).unwrap();
        assert_eq!(scan.entries, names(&["done.webm"]));
        assert_eq!(scan.ignored_artifacts, 5);
    }

    #[test]
    fn merged_files_with_format_like_titles_are_kept() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("Ep3 f248 remastered.webm"), b"video").unwrap();
        std::fs::write(dir.path().join("Ep4 v1.f.webm"), b"video").unwrap();

        let scan = scan_working_dir(dir.path()).unwrap();
        assert_eq!(
            scan.entries,
            names(&["Ep3 f248 remastered.webm", "Ep4 v1.f.webm"])
        );
        assert_eq!(scan.ignored_artifacts, 0);
    }

    #[test]
    fn scan_of_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("gone");

        assert!(matches!(
            scan_working_dir(&missing),
            Err(WorkspaceError::ReadDirectoryFailed { .. })
        ));
    }
}
