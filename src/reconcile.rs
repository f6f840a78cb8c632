// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;

use regex::Regex;

/// Matches archived episode file names: `<title prefix><anything>.<format>`
#[derive(Debug, Clone)]
pub struct EpisodePattern {
    regex: Regex,
    extension: String,
}

impl EpisodePattern {
    pub fn new(title_prefix: &str, format: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!(
            r"^{}.*\.{}$",
            regex::escape(title_prefix),
            regex::escape(format)
        ))?;

        Ok(Self {
            regex,
            extension: format!(".{format}"),
        })
    }

    /// Extract the episode name from one line of a remote listing
    pub fn extract(&self, line: &str) -> Option<String> {
        let line = line.trim_end();
        if !line.contains(&self.extension) {
            return None;
        }

        self.regex.find(line).map(|m| m.as_str().to_string())
    }

    /// Turn raw listing output into the ordered existing set.
    ///
    /// Non-matching lines are dropped. Duplicates are kept.
    pub fn parse_listing(&self, output: &str) -> Vec<String> {
        output.lines().filter_map(|line| self.extract(line)).collect()
    }
}

/// Entries of the working directory that are not already archived.
///
/// Keeps the order of `entries`. Calling it again with the same inputs gives
/// the same result.
pub fn new_episodes(entries: &[String], existing: &[String]) -> Vec<String> {
    let existing: HashSet<&str> = existing.iter().map(String::as_str).collect();

    entries
        .iter()
        .filter(|entry| !existing.contains(entry.as_str()))
        .cloned()
        .collect()
}
