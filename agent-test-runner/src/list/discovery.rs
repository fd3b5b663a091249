// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{config::DiscoveryConfig, errors::DiscoveryError};
use camino::{Utf8Path, Utf8PathBuf};
use globset::{GlobBuilder, GlobMatcher};
use std::collections::HashMap;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Files of interest found in a workspace.
#[derive(Debug, Default)]
pub(super) struct WorkspaceFiles {
    /// Definition files, in path order.
    pub(super) definitions: Vec<Utf8PathBuf>,

    /// Test-set files keyed by file name, each list in path order.
    test_sets: HashMap<String, Vec<Utf8PathBuf>>,
}

impl WorkspaceFiles {
    /// Returns the test-set files with the given file name.
    pub(super) fn test_sets_named(&self, file_name: &str) -> &[Utf8PathBuf] {
        self.test_sets
            .get(file_name)
            .map_or(&[][..], |paths| paths.as_slice())
    }
}

/// Walks `root` once, collecting definition and test-set files.
///
/// Errors for entries below the root are pushed onto `errors` and the walk continues. An error
/// reading the root itself is returned.
pub(super) fn scan_workspace(
    root: &Utf8Path,
    config: &DiscoveryConfig,
    errors: &mut Vec<DiscoveryError>,
) -> Result<WorkspaceFiles, DiscoveryError> {
    let matcher = definition_matcher(&config.definition_pattern)?;
    let mut files = WorkspaceFiles::default();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_ignored_dir(entry, &config.ignore_dirs));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) if error.depth() == 0 => {
                return Err(DiscoveryError::WalkWorkspace {
                    root: root.to_owned(),
                    error,
                });
            }
            Err(error) => {
                warn!("skipping unreadable entry while scanning {root}: {error}");
                errors.push(DiscoveryError::WalkWorkspace {
                    root: root.to_owned(),
                    error,
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = match Utf8PathBuf::try_from(entry.into_path()) {
            Ok(path) => path,
            Err(error) => {
                errors.push(DiscoveryError::NonUtf8Path {
                    path: error.into_path_buf(),
                });
                continue;
            }
        };

        let relative = path.strip_prefix(root).unwrap_or(path.as_path());
        if matcher.is_match(relative.as_std_path()) {
            debug!("found definition file {relative}");
            files.definitions.push(path);
        } else if let Some(file_name) = path.file_name()
            && file_name.ends_with(&config.test_set_suffix)
        {
            files
                .test_sets
                .entry(file_name.to_owned())
                .or_default()
                .push(path);
        }
    }

    Ok(files)
}

fn definition_matcher(pattern: &str) -> Result<GlobMatcher, DiscoveryError> {
    let glob = GlobBuilder::new(pattern)
        // `*` shouldn't cross directory boundaries; `**` still does.
        .literal_separator(true)
        .build()
        .map_err(|error| DiscoveryError::InvalidPattern {
            pattern: pattern.to_owned(),
            error,
        })?;
    Ok(glob.compile_matcher())
}

fn is_ignored_dir(entry: &DirEntry, ignore_dirs: &[String]) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let Some(name) = entry.file_name().to_str() else {
        return false;
    };
    name.starts_with('.') || ignore_dirs.iter().any(|ignored| ignored == name)
}
