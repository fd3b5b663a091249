// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use agent_test_metadata::{ExpectationVerdict, RunResults, RunStatus};
use agent_test_runner::{
    config::DiscoveryConfig,
    errors::{ConfigurationError, RemoteJobError, RunError},
    list::DefinitionList,
    outline::TestOutlineProvider,
    runner::{
        AgentTestRunner, AgentTestRunnerBuilder, ReconcileOutcome, RunEvent, RunEventKind,
        RunOutcome,
    },
    tree::{NodeId, Outcome},
};
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::{Result, bail, ensure};
use pretty_assertions::assert_eq;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

struct Harness {
    _workspace: Utf8TempDir,
    outline: Arc<TestOutlineProvider>,
    ui: Arc<RecordingUi>,
    log: Arc<RecordingLog>,
    runner: AgentTestRunner,
    events: UnboundedReceiver<RunEvent>,
}

impl Harness {
    async fn new(resolver: StaticResolver, service: ScriptedService) -> Result<Self> {
        Self::with_outline(resolver, service, |_| ()).await
    }

    async fn with_outline(
        resolver: StaticResolver,
        service: ScriptedService,
        configure: impl FnOnce(&mut AgentTestRunnerBuilder),
    ) -> Result<Self> {
        test_init();

        let workspace = sample_workspace()?;
        let outline = Arc::new(TestOutlineProvider::new(
            workspace.path(),
            DiscoveryConfig::default(),
        ));
        outline.refresh().await?;

        let ui = Arc::new(RecordingUi::default());
        let log = Arc::new(RecordingLog::default());
        let (sender, events) = unbounded_channel();
        let mut builder = AgentTestRunnerBuilder::default();
        builder.set_event_sender(sender);
        configure(&mut builder);
        let runner = builder.build(
            outline.clone(),
            Arc::new(resolver),
            Arc::new(service),
            ui.clone(),
            log.clone(),
        );

        Ok(Self {
            _workspace: workspace,
            outline,
            ui,
            log,
            runner,
            events,
        })
    }

    fn outcome(&self, node: &NodeId) -> Option<Outcome> {
        self.outline
            .with_tree(|tree| tree.find(node).map(|entry| entry.outcome()))
    }

    fn event_kinds(&mut self) -> Vec<RunEventKind> {
        let mut kinds = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            kinds.push(event.kind);
        }
        kinds
    }
}

fn greeting() -> NodeId {
    NodeId::group("Greeting")
}

fn greeting_case(number: u64) -> NodeId {
    NodeId::case("Greeting", format!("#{number}"))
}

#[tokio::test]
async fn completed_run_with_one_failure() -> Result<()> {
    let service = ScriptedService::with_updates(vec![
        Ok(RunResults::new(RunStatus::New)),
        Ok(RunResults::new(RunStatus::InProgress)),
        Ok(completed(vec![
            case_result(1, ExpectationVerdict::Failure),
            case_result(2, ExpectationVerdict::Pass),
        ])),
    ]);
    let mut harness = Harness::new(StaticResolver::connected(), service).await?;

    let outcome = harness.runner.run_group("Greeting").await;
    let (passed, failed, reconcile) = match outcome {
        RunOutcome::Completed {
            passed,
            failed,
            reconcile,
            ..
        } => (passed, failed, reconcile),
        other => bail!("expected a completed run, got {other:?}"),
    };
    assert_eq!((passed, failed), (1, 1));
    assert_eq!(
        reconcile,
        ReconcileOutcome::Applied {
            updated: 2,
            missing_cases: Vec::new()
        }
    );

    assert_eq!(harness.outcome(&greeting_case(1)), Some(Outcome::Error));
    assert_eq!(harness.outcome(&greeting_case(2)), Some(Outcome::Completed));
    assert_eq!(harness.outcome(&greeting()), Some(Outcome::Error));
    assert_eq!(
        harness.outcome(&NodeId::group("Orders")),
        Some(Outcome::NotRun),
        "other groups are untouched"
    );

    let (passing, failing) = harness.outline.with_tree(|tree| {
        let group = tree.group("Greeting").expect("group exists");
        (group.passing, group.failing)
    });
    assert_eq!((passing, failing), (1, 1));

    ensure!(harness.log.contains("Test Case #1 FAIL"), "report is logged");
    ensure!(harness.log.contains("Greeting: 2 test cases, 1 passed, 1 failed"));
    assert_eq!(
        harness.ui.infos.lock().unwrap().clone(),
        vec!["Greeting: 2 test cases, 1 passed, 1 failed"]
    );
    ensure!(harness.runner.cached_results("Greeting").is_some());
    assert_eq!(harness.ui.progress_total(), 100);

    let kinds = harness.event_kinds();
    assert_eq!(kinds.first(), Some(&RunEventKind::Starting));
    let progress: Vec<_> = kinds
        .iter()
        .filter_map(|kind| match kind {
            RunEventKind::Progress { status, percent, .. } => Some((*status, *percent)),
            _ => None,
        })
        .collect();
    assert_eq!(
        progress,
        vec![(RunStatus::New, 10), (RunStatus::InProgress, 20)]
    );
    ensure!(matches!(
        kinds.last(),
        Some(RunEventKind::Finished {
            status: RunStatus::Completed,
            passed: 1,
            failed: 1,
            ..
        })
    ));

    Ok(())
}

#[tokio::test]
async fn completed_run_without_every_case() -> Result<()> {
    let service = ScriptedService::with_updates(vec![
        Ok(RunResults::new(RunStatus::InProgress)),
        Ok(completed(vec![case_result(1, ExpectationVerdict::Pass)])),
    ]);
    let harness = Harness::new(StaticResolver::connected(), service).await?;

    let outcome = harness.runner.run_group("Greeting").await;
    ensure!(
        matches!(outcome, RunOutcome::Completed { passed: 1, failed: 0, .. }),
        "unexpected outcome: {outcome:?}"
    );

    assert_eq!(harness.outcome(&greeting_case(1)), Some(Outcome::Completed));
    assert_eq!(harness.outcome(&greeting_case(2)), Some(Outcome::NotRun));
    assert_eq!(harness.outcome(&greeting()), Some(Outcome::Completed));

    Ok(())
}

#[tokio::test]
async fn terminated_run_marks_group_only() -> Result<()> {
    let service = ScriptedService::with_updates(vec![
        Ok(RunResults::new(RunStatus::InProgress)),
        Ok(RunResults::new(RunStatus::Terminated)),
    ]);
    let harness = Harness::new(StaticResolver::connected(), service).await?;

    let outcome = harness.runner.run_group("Greeting").await;
    ensure!(
        matches!(
            outcome,
            RunOutcome::Failed(RunError::Job(RemoteJobError::Unsuccessful {
                status: RunStatus::Terminated,
                ..
            }))
        ),
        "unexpected outcome: {outcome:?}"
    );

    assert_eq!(harness.outcome(&greeting()), Some(Outcome::Error));
    assert_eq!(harness.outcome(&greeting_case(1)), Some(Outcome::InProgress));
    assert_eq!(harness.outcome(&greeting_case(2)), Some(Outcome::InProgress));
    ensure!(harness.log.contains("ended with status TERMINATED"));
    assert_eq!(harness.ui.errors.lock().unwrap().len(), 1);
    ensure!(harness.runner.cached_results("Greeting").is_none());

    Ok(())
}

#[tokio::test]
async fn missing_target_org_never_starts() -> Result<()> {
    let service = ScriptedService::with_updates(Vec::new());
    let started = service.clone();
    let mut harness = Harness::new(
        StaticResolver(Err(ConfigurationError::NoTargetOrg)),
        service,
    )
    .await?;

    let outcome = harness.runner.run_group("Greeting").await;
    ensure!(
        matches!(
            outcome,
            RunOutcome::Failed(RunError::Configuration(ConfigurationError::NoTargetOrg))
        ),
        "unexpected outcome: {outcome:?}"
    );
    ensure!(started.started().is_empty(), "no run was started");
    assert_eq!(harness.outcome(&greeting()), Some(Outcome::Error));
    assert_eq!(harness.outcome(&greeting_case(1)), Some(Outcome::NotRun));
    ensure!(harness.log.contains("no target org"));
    assert_eq!(harness.ui.errors.lock().unwrap().len(), 1);
    assert_eq!(harness.ui.progress_total(), 0, "no polling happened");

    let kinds = harness.event_kinds();
    ensure!(matches!(kinds.last(), Some(RunEventKind::StartFailed { .. })));

    Ok(())
}

#[tokio::test]
async fn rejected_start_marks_group_error() -> Result<()> {
    let service = ScriptedService::failing_start("definition is not deployed");
    let harness = Harness::new(StaticResolver::connected(), service).await?;

    let outcome = harness.runner.run_group("Greeting").await;
    ensure!(
        matches!(outcome, RunOutcome::Failed(RunError::Start(_))),
        "unexpected outcome: {outcome:?}"
    );
    assert_eq!(harness.outcome(&greeting()), Some(Outcome::Error));
    ensure!(harness.log.contains("definition is not deployed"));

    Ok(())
}

#[tokio::test]
async fn missing_group_does_not_panic() -> Result<()> {
    let service = ScriptedService::with_updates(vec![Ok(completed(vec![case_result(
        1,
        ExpectationVerdict::Pass,
    )]))]);
    let harness = Harness::new(StaticResolver::connected(), service).await?;

    let outcome = harness.runner.run_group("NotInTheTree").await;
    let reconcile = match outcome {
        RunOutcome::Completed { reconcile, .. } => reconcile,
        other => bail!("expected a completed run, got {other:?}"),
    };
    assert_eq!(reconcile, ReconcileOutcome::GroupMissing);

    Ok(())
}

#[tokio::test]
async fn rebuild_during_run_is_stale() -> Result<()> {
    // The hook needs the outline, which only exists once the harness is built.
    let outline_slot: Arc<std::sync::Mutex<Option<Arc<TestOutlineProvider>>>> =
        Arc::default();
    let hook_slot = outline_slot.clone();
    let service = ScriptedService::with_updates(vec![Ok(completed(vec![
        case_result(1, ExpectationVerdict::Pass),
        case_result(2, ExpectationVerdict::Pass),
    ]))])
    .on_poll(move || {
        if let Some(outline) = hook_slot.lock().unwrap().as_ref() {
            outline.rebuild(DefinitionList::new(Vec::new()));
        }
    });
    let harness = Harness::new(StaticResolver::connected(), service).await?;
    *outline_slot.lock().unwrap() = Some(harness.outline.clone());

    let outcome = harness.runner.run_group("Greeting").await;
    let reconcile = match outcome {
        RunOutcome::Completed { reconcile, .. } => reconcile,
        other => bail!("expected a completed run, got {other:?}"),
    };
    ensure!(
        matches!(reconcile, ReconcileOutcome::StaleTree { captured, current } if current > captured),
        "unexpected reconcile outcome: {reconcile:?}"
    );
    // The rebuilt tree is empty, so nothing could have been updated.
    assert_eq!(harness.outcome(&greeting()), None);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn poll_timeout_marks_group_error() -> Result<()> {
    let service = ScriptedService::hanging(vec![Ok(RunResults::new(RunStatus::InProgress))]);
    let harness = Harness::with_outline(StaticResolver::connected(), service, |builder| {
        builder.set_poll_timeout(Duration::from_secs(60));
    })
    .await?;

    let outcome = harness.runner.run_group("Greeting").await;
    ensure!(
        matches!(
            &outcome,
            RunOutcome::Failed(RunError::Job(RemoteJobError::TimedOut { timeout, .. }))
                if *timeout == Duration::from_secs(60)
        ),
        "unexpected outcome: {outcome:?}"
    );
    assert_eq!(harness.outcome(&greeting()), Some(Outcome::Error));
    ensure!(harness.log.contains("did not finish within 1m"));
    assert_eq!(harness.ui.progress_total(), 100);

    Ok(())
}

#[tokio::test]
async fn stream_ending_early_is_an_error() -> Result<()> {
    let service = ScriptedService::with_updates(vec![Ok(RunResults::new(RunStatus::InProgress))]);
    let harness = Harness::new(StaticResolver::connected(), service).await?;

    let outcome = harness.runner.run_group("Greeting").await;
    ensure!(
        matches!(
            outcome,
            RunOutcome::Failed(RunError::Job(RemoteJobError::StreamEnded { .. }))
        ),
        "unexpected outcome: {outcome:?}"
    );
    assert_eq!(harness.outcome(&greeting()), Some(Outcome::Error));

    Ok(())
}

#[tokio::test]
async fn transport_error_is_reported() -> Result<()> {
    let service = ScriptedService::with_updates(vec![Err("connection reset".to_owned())]);
    let harness = Harness::new(StaticResolver::connected(), service).await?;

    let outcome = harness.runner.run_group("Greeting").await;
    ensure!(
        matches!(
            outcome,
            RunOutcome::Failed(RunError::Job(RemoteJobError::Transport { .. }))
        ),
        "unexpected outcome: {outcome:?}"
    );
    ensure!(harness.log.contains("connection reset"), "cause is logged");

    Ok(())
}

#[tokio::test]
async fn run_all_runs_groups_in_order() -> Result<()> {
    let service = ScriptedService::with_updates(vec![Ok(completed(vec![case_result(
        1,
        ExpectationVerdict::Pass,
    )]))]);
    let started = service.clone();
    let harness = Harness::new(StaticResolver::connected(), service).await?;

    let outcomes = harness.runner.run_all().await;
    let names: Vec<_> = outcomes.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["Greeting", "Orders"]);
    assert_eq!(started.started(), vec!["Greeting", "Orders"]);
    ensure!(outcomes.iter().all(|(_, outcome)| outcome.is_completed()));

    assert_eq!(
        harness.outcome(&NodeId::case("Orders", "#1")),
        Some(Outcome::Completed)
    );
    assert_eq!(harness.outcome(&NodeId::group("Orders")), Some(Outcome::Completed));

    Ok(())
}

#[tokio::test]
async fn go_to_test_uses_cached_results() -> Result<()> {
    let service = ScriptedService::with_updates(vec![Ok(completed(vec![
        case_result(1, ExpectationVerdict::Pass),
        case_result(2, ExpectationVerdict::Pass),
    ]))]);
    let started = service.clone();
    let harness = Harness::new(StaticResolver::connected(), service).await?;

    // Before any run: reveal only.
    harness.runner.go_to_test(&greeting_case(2))?;
    assert_eq!(harness.log.cleared(), 0);
    {
        let revealed = harness.ui.revealed.lock().unwrap();
        assert_eq!(revealed.len(), 1);
        assert_eq!(revealed[0].line, 21);
    }

    harness.runner.run_group("Greeting").await;
    assert_eq!(started.started().len(), 1);

    harness.runner.go_to_test(&greeting_case(1))?;
    assert_eq!(harness.log.cleared(), 1);
    let lines = harness.log.lines();
    ensure!(lines.iter().any(|line| line == "Test Case #2 PASS"));
    ensure!(lines.iter().any(|line| line == "    Expected: Greeting"));
    assert_eq!(started.started().len(), 1, "no network call");

    let error = harness
        .runner
        .go_to_test(&NodeId::case("Greeting", "#9"))
        .expect_err("unknown node");
    assert_eq!(error.to_string(), "test node `Greeting.#9` not found");

    Ok(())
}
