// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for discovering agent test definitions.
//!
//! The main entry point is [`parse_all_definitions`], which walks a workspace for definition files,
//! resolves their test sets, and returns a [`DefinitionList`].

mod definition;
mod discovery;
mod xml;

pub use definition::*;

use crate::{config::DiscoveryConfig, errors::DiscoveryError, helpers::plural};
use camino::Utf8Path;
use discovery::{WorkspaceFiles, scan_workspace};
use tracing::{debug, info, warn};

/// The definitions found in a workspace, along with errors for files that were skipped.
#[derive(Debug, Default)]
pub struct DefinitionList {
    definitions: Vec<TestDefinition>,
    errors: Vec<DiscoveryError>,
}

impl DefinitionList {
    /// Creates a new `DefinitionList` from already-parsed definitions.
    pub fn new(definitions: Vec<TestDefinition>) -> Self {
        Self {
            definitions,
            errors: Vec::new(),
        }
    }

    /// Returns the definitions, in path order.
    pub fn definitions(&self) -> &[TestDefinition] {
        &self.definitions
    }

    /// Returns errors for files that were skipped or only partially read.
    pub fn errors(&self) -> &[DiscoveryError] {
        &self.errors
    }

    /// Returns the total number of test cases across all definitions.
    pub fn case_count(&self) -> usize {
        self.definitions
            .iter()
            .map(|definition| definition.test_cases.len())
            .sum()
    }

    /// Splits this list into definitions and errors.
    pub fn into_parts(self) -> (Vec<TestDefinition>, Vec<DiscoveryError>) {
        (self.definitions, self.errors)
    }
}

/// Scans `workspace_root` for test definitions and resolves their cases.
///
/// Each definition file yields one [`TestDefinition`]. A file that can't be read or parsed is
/// skipped, and a test set that can't be read or parsed leaves its definition with no cases; in both
/// cases the error is recorded in [`DefinitionList::errors`]. A definition whose test set isn't
/// found has no cases and no error.
///
/// Returns an error only if the workspace itself can't be scanned.
pub fn parse_all_definitions(
    workspace_root: &Utf8Path,
    config: &DiscoveryConfig,
) -> Result<DefinitionList, DiscoveryError> {
    let mut errors = Vec::new();
    let files = scan_workspace(workspace_root, config, &mut errors)?;
    let suffix = definition_suffix(&config.definition_pattern);

    let mut definitions = Vec::with_capacity(files.definitions.len());
    for path in &files.definitions {
        let record = match read_file(path).and_then(|contents| {
            parse_definition(path, &contents, suffix).map_err(DiscoveryError::from)
        }) {
            Ok(record) => record,
            Err(error) => {
                warn!("skipping definition {path}: {error}");
                errors.push(error);
                continue;
            }
        };

        definitions.push(resolve_cases(record, &files, config, &mut errors));
    }

    let list = DefinitionList {
        definitions,
        errors,
    };
    info!(
        "discovered {} test {} ({} {}, {} {})",
        list.definitions.len(),
        plural::definitions_str(list.definitions.len()),
        list.case_count(),
        plural::test_cases_str(list.case_count()),
        list.errors.len(),
        plural::errors_str(list.errors.len()),
    );
    Ok(list)
}

fn resolve_cases(
    mut record: DefinitionRecord,
    files: &WorkspaceFiles,
    config: &DiscoveryConfig,
    errors: &mut Vec<DiscoveryError>,
) -> TestDefinition {
    match std::mem::replace(&mut record.case_source, CaseSource::Absent) {
        CaseSource::TestSet { test_set_name } => {
            let file_name = config.test_set_file_name(&test_set_name);
            let candidates = files.test_sets_named(&file_name);
            let Some(test_set_path) = candidates.first() else {
                debug!(
                    "no test set file `{file_name}` found for definition `{}`",
                    record.name
                );
                return TestDefinition::from_record(record, None, Vec::new());
            };
            if candidates.len() > 1 {
                warn!(
                    "found {} test set files named `{file_name}`, using {test_set_path}",
                    candidates.len()
                );
            }

            let cases = match read_file(test_set_path).and_then(|contents| {
                parse_test_set(test_set_path, &contents).map_err(DiscoveryError::from)
            }) {
                Ok(cases) => cases,
                Err(error) => {
                    warn!("ignoring test set for `{}`: {error}", record.name);
                    errors.push(error);
                    Vec::new()
                }
            };
            TestDefinition::from_record(record, Some(test_set_path.clone()), cases)
        }
        CaseSource::Inline { cases } => TestDefinition::from_record(record, None, cases),
        CaseSource::Absent => TestDefinition::from_record(record, None, Vec::new()),
    }
}

fn read_file(path: &Utf8Path) -> Result<String, DiscoveryError> {
    std::fs::read_to_string(path).map_err(|error| DiscoveryError::ReadFile {
        path: path.to_owned(),
        error,
    })
}

/// Returns the fixed file-name suffix of a definition pattern such as
/// `**/*.aiEvaluationDefinition-meta.xml`.
fn definition_suffix(pattern: &str) -> &str {
    let file_pattern = pattern.rsplit('/').next().unwrap_or(pattern);
    file_pattern.trim_start_matches('*')
}
