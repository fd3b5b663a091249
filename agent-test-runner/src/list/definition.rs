// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::xml::{XmlElement, parse_document};
use crate::errors::{ParseDefinitionError, ParseDefinitionErrorKind};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use tracing::warn;

const DEFINITION_ROOT: &str = "AiEvaluationDefinition";
const UNKNOWN_UTTERANCE: &str = "unknown";

/// A position within a file: the path and a zero-based line number.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SourceLocation {
    /// The file.
    pub path: Utf8PathBuf,

    /// The zero-based line number.
    pub line: usize,
}

impl SourceLocation {
    /// Creates a new `SourceLocation`.
    pub fn new(path: impl Into<Utf8PathBuf>, line: usize) -> Self {
        Self {
            path: path.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Editors display one-based line numbers.
        write!(f, "{}:{}", self.path, self.line + 1)
    }
}

/// A single test case within a definition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestCase {
    /// The test case's number, unique within its test set.
    pub number: u64,

    /// The utterance sent to the agent.
    pub utterance: String,

    /// Where the case's `<number>` tag is.
    pub location: SourceLocation,

    /// Expectations declared for this case, if any.
    pub expectations: Vec<Expectation>,
}

/// An expectation declared for a test case.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Expectation {
    /// The expectation name, for example `expectedTopic`.
    pub name: String,

    /// The expected value.
    pub expected_value: String,
}

/// Where a definition's test cases come from.
///
/// Earlier definition files point at a companion test-set file; later ones list their cases
/// inline.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CaseSource {
    /// Cases are read from the test-set file named by `test_set_name`.
    TestSet {
        /// The test set name from `<testSetName>`.
        test_set_name: String,
    },

    /// Cases are listed inline in the definition file.
    Inline {
        /// The inline cases.
        cases: Vec<TestCase>,
    },

    /// The definition declares no cases.
    Absent,
}

/// A definition file, validated but with its test set not yet resolved.
///
/// Returned by [`parse_definition`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DefinitionRecord {
    /// The definition's name.
    pub name: String,

    /// The subject (agent) the definition tests.
    pub subject_name: Option<String>,

    /// The subject type, typically `AGENT`.
    pub subject_type: Option<String>,

    /// The subject version.
    pub subject_version: Option<String>,

    /// A free-form description.
    pub description: Option<String>,

    /// The definition file.
    pub location: SourceLocation,

    /// Where the cases come from.
    pub case_source: CaseSource,
}

/// A fully resolved test definition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestDefinition {
    /// The definition's name. Groups in the test tree are keyed by this name.
    pub name: String,

    /// The subject (agent) the definition tests.
    pub subject_name: Option<String>,

    /// The subject type, typically `AGENT`.
    pub subject_type: Option<String>,

    /// The subject version.
    pub subject_version: Option<String>,

    /// A free-form description.
    pub description: Option<String>,

    /// The definition file.
    pub location: SourceLocation,

    /// The test-set file the cases were read from, if any.
    pub test_set_path: Option<Utf8PathBuf>,

    /// The test cases, in file order.
    pub test_cases: Vec<TestCase>,
}

impl TestDefinition {
    pub(super) fn from_record(
        record: DefinitionRecord,
        test_set_path: Option<Utf8PathBuf>,
        test_cases: Vec<TestCase>,
    ) -> Self {
        let DefinitionRecord {
            name,
            subject_name,
            subject_type,
            subject_version,
            description,
            location,
            case_source: _,
        } = record;

        Self {
            name,
            subject_name,
            subject_type,
            subject_version,
            description,
            location,
            test_set_path,
            test_cases,
        }
    }
}

/// Parses a definition file.
///
/// `suffix` is stripped from the file name to derive a name when the file has no `<name>`
/// element.
pub fn parse_definition(
    path: &Utf8Path,
    contents: &str,
    suffix: &str,
) -> Result<DefinitionRecord, ParseDefinitionError> {
    let root = parse_document(contents).map_err(|kind| ParseDefinitionError::new(path, kind))?;
    if root.name != DEFINITION_ROOT {
        return Err(ParseDefinitionError::new(
            path,
            ParseDefinitionErrorKind::UnexpectedRoot {
                expected: DEFINITION_ROOT,
                actual: root.name,
            },
        ));
    }

    let name = match root.child_text("name") {
        Some(name) => name.to_owned(),
        None => name_from_path(path, suffix),
    };

    let inline_cases = extract_cases(path, &root);
    let case_source = match root.child_text("testSetName") {
        Some(test_set_name) => {
            if !inline_cases.is_empty() {
                warn!(
                    "definition {path} names test set `{test_set_name}` and also has inline \
                     test cases; using the test set"
                );
            }
            CaseSource::TestSet {
                test_set_name: test_set_name.to_owned(),
            }
        }
        None if !inline_cases.is_empty() => CaseSource::Inline {
            cases: inline_cases,
        },
        None => CaseSource::Absent,
    };

    Ok(DefinitionRecord {
        name,
        subject_name: root.child_text("subjectName").map(str::to_owned),
        subject_type: root.child_text("subjectType").map(str::to_owned),
        subject_version: root.child_text("subjectVersion").map(str::to_owned),
        description: root.child_text("description").map(str::to_owned),
        location: SourceLocation::new(path, 0),
        case_source,
    })
}

/// Parses a test-set file into its cases, in file order.
///
/// Cases whose `<number>` is missing or isn't a non-negative integer are skipped.
pub fn parse_test_set(path: &Utf8Path, contents: &str) -> Result<Vec<TestCase>, ParseDefinitionError> {
    let root = parse_document(contents).map_err(|kind| ParseDefinitionError::new(path, kind))?;
    Ok(extract_cases(path, &root))
}

fn extract_cases(path: &Utf8Path, root: &XmlElement) -> Vec<TestCase> {
    root.children_named("testCase")
        .filter_map(|case| extract_case(path, case))
        .collect()
}

fn extract_case(path: &Utf8Path, case: &XmlElement) -> Option<TestCase> {
    let Some(number_elem) = case.child("number") else {
        warn!(
            "{}: test case has no <number>, skipping",
            SourceLocation::new(path, case.line)
        );
        return None;
    };
    let number = match number_elem.text().parse::<u64>() {
        Ok(number) => number,
        Err(_) => {
            warn!(
                "{}: test case number `{}` is not a valid number, skipping",
                SourceLocation::new(path, number_elem.line),
                number_elem.text(),
            );
            return None;
        }
    };

    // Older test sets put the utterance directly under <testCase>.
    let utterance = case
        .child("inputs")
        .and_then(|inputs| inputs.child_text("utterance"))
        .or_else(|| case.child_text("utterance"))
        .unwrap_or(UNKNOWN_UTTERANCE)
        .to_owned();

    let expectations = case
        .children_named("expectation")
        .filter_map(|expectation| {
            let name = expectation.child_text("name")?;
            Some(Expectation {
                name: name.to_owned(),
                expected_value: expectation
                    .child_text("expectedValue")
                    .unwrap_or_default()
                    .to_owned(),
            })
        })
        .collect();

    Some(TestCase {
        number,
        utterance,
        location: SourceLocation::new(path, number_elem.line),
        expectations,
    })
}

fn name_from_path(path: &Utf8Path, suffix: &str) -> String {
    let file_name = path.file_name().unwrap_or(path.as_str());
    file_name
        .strip_suffix(suffix)
        .unwrap_or(file_name)
        .to_owned()
}
