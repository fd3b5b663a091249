// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use agent_test_runner::{
    config::{AgentTestConfig, DiscoveryConfig},
    errors::DiscoveryError,
    list::parse_all_definitions,
    outline::{TestOutlineProvider, TreeChange},
    tree::{NodeId, TestTree},
};
use color_eyre::eyre::{Result, ensure};
use pretty_assertions::assert_eq;

#[test]
fn parse_sample_workspace() -> Result<()> {
    test_init();

    let workspace = sample_workspace()?;
    let list = parse_all_definitions(workspace.path(), &DiscoveryConfig::default())?;
    ensure!(list.errors().is_empty(), "no errors: {:?}", list.errors());

    let names: Vec<_> = list.definitions().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Greeting", "Orders"]);

    let greeting = &list.definitions()[0];
    assert_eq!(greeting.description.as_deref(), Some("Greets the user"));
    assert_eq!(greeting.subject_name.as_deref(), Some("Support_Agent"));
    assert_eq!(
        greeting.test_set_path.as_ref().map(|path| path.ends_with(GREETING_TEST_SET_PATH)),
        Some(true)
    );
    let cases: Vec<_> = greeting
        .test_cases
        .iter()
        .map(|case| (case.number, case.utterance.as_str(), case.location.line))
        .collect();
    assert_eq!(cases, vec![(1, "hi there", 11), (2, "good morning", 21)]);
    assert_eq!(greeting.test_cases[0].expectations[0].name, "topic_sequence_match");

    let orders = &list.definitions()[1];
    assert_eq!(orders.test_set_path, None);
    assert_eq!(orders.test_cases.len(), 1);
    assert_eq!(orders.test_cases[0].utterance, "where is my order");
    assert_eq!(orders.test_cases[0].location.line, 8);
    assert_eq!(list.case_count(), 3);

    Ok(())
}

#[test]
fn missing_test_set_yields_no_cases() -> Result<()> {
    test_init();

    let workspace = camino_tempfile::tempdir()?;
    write_file(workspace.path(), GREETING_DEFINITION_PATH, GREETING_DEFINITION)?;

    let list = parse_all_definitions(workspace.path(), &DiscoveryConfig::default())?;
    ensure!(list.errors().is_empty(), "a missing test set is not an error");
    assert_eq!(list.definitions().len(), 1);
    assert!(list.definitions()[0].test_cases.is_empty());

    Ok(())
}

#[test]
fn malformed_files_are_skipped() -> Result<()> {
    test_init();

    let workspace = sample_workspace()?;
    write_file(
        workspace.path(),
        "force-app/main/default/aiEvaluationDefinitions/Broken.aiEvaluationDefinition-meta.xml",
        "<AiEvaluationDefinition><name>Broken</name>",
    )?;
    write_file(
        workspace.path(),
        "force-app/main/default/aiEvaluationDefinitions/Other.aiEvaluationDefinition-meta.xml",
        "<Flow><name>Other</name></Flow>",
    )?;

    let list = parse_all_definitions(workspace.path(), &DiscoveryConfig::default())?;
    let names: Vec<_> = list.definitions().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Greeting", "Orders"]);
    assert_eq!(list.errors().len(), 2);
    for error in list.errors() {
        ensure!(
            matches!(error, DiscoveryError::Parse(_)),
            "unexpected error: {error:?}"
        );
    }

    Ok(())
}

#[test]
fn malformed_test_set_keeps_definition() -> Result<()> {
    test_init();

    let workspace = camino_tempfile::tempdir()?;
    write_file(workspace.path(), GREETING_DEFINITION_PATH, GREETING_DEFINITION)?;
    write_file(workspace.path(), GREETING_TEST_SET_PATH, "<AiEvaluationTestSet><testCase>")?;

    let list = parse_all_definitions(workspace.path(), &DiscoveryConfig::default())?;
    assert_eq!(list.definitions().len(), 1);
    assert!(list.definitions()[0].test_cases.is_empty());
    assert_eq!(list.errors().len(), 1);

    Ok(())
}

#[test]
fn workspace_config_changes_discovery() -> Result<()> {
    test_init();

    let workspace = sample_workspace()?;
    write_file(
        workspace.path(),
        AgentTestConfig::CONFIG_PATH,
        "[discovery]\ndefinition-pattern = \"**/Orders.aiEvaluationDefinition-meta.xml\"\n",
    )?;

    let config = AgentTestConfig::from_sources(workspace.path(), None)?;
    let list = parse_all_definitions(workspace.path(), config.discovery())?;
    let names: Vec<_> = list.definitions().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Orders"]);

    Ok(())
}

#[test]
fn tree_from_sample_workspace() -> Result<()> {
    test_init();

    let workspace = sample_workspace()?;
    let list = parse_all_definitions(workspace.path(), &DiscoveryConfig::default())?;
    let mut tree = TestTree::new();
    tree.rebuild(list.definitions());

    let roots: Vec<_> = tree.children(None).iter().map(|e| e.id()).collect();
    assert_eq!(roots, vec![NodeId::group("Greeting"), NodeId::group("Orders")]);

    let greeting = tree.group("Greeting").expect("Greeting group");
    let full_names: Vec<_> = greeting.children().iter().map(|c| c.full_name()).collect();
    assert_eq!(full_names, vec!["Greeting.#1", "Greeting.#2"]);

    let test_set = workspace.path().join(GREETING_TEST_SET_PATH);
    assert_eq!(tree.group_for_file(&test_set), Some("Greeting"));

    Ok(())
}

#[tokio::test]
async fn outline_refresh_notifies_once() -> Result<()> {
    test_init();

    let workspace = sample_workspace()?;
    let outline = TestOutlineProvider::new(workspace.path(), DiscoveryConfig::default());
    let mut changes = outline.subscribe();

    let summary = outline.refresh().await?;
    assert_eq!(summary.group_count, 2);
    assert_eq!(summary.case_count, 3);
    assert_eq!(summary.error_count, 0);

    assert_eq!(
        changes.try_recv()?,
        TreeChange::Rebuilt {
            generation: summary.generation
        }
    );
    ensure!(changes.try_recv().is_err(), "exactly one notification");

    Ok(())
}
