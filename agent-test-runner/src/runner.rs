// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The agent test runner.
//!
//! The main structure in this module is [`AgentTestRunner`]. A run goes through these states:
//!
//! ```text
//! NotStarted -> Starting -> New -> InProgress* -> Completed | Error
//! ```
//!
//! Starting resolves a connection, creates a client and starts the remote run. Polling then
//! consumes a finite stream of snapshots until one is terminal, bounded by the poll timeout.
//! While the run is in flight the group and its cases show the latest remote status. Results are applied to the tree through [`TestOutlineProvider`], checked against the tree
//! generation captured when the run started.

mod client;
mod events;
mod reconcile;

pub use client::*;
pub use events::*;
pub use reconcile::ReconcileOutcome;

use crate::{
    errors::{CommandError, DisplayErrorChain, RemoteJobError, RunError},
    host::{LogSink, ProgressReporter, UiHost},
    outline::TestOutlineProvider,
    reporter,
    stopwatch::StopwatchStart,
    tree::{Generation, NodeId, TestGroupNode},
};
use agent_test_metadata::{RunId, RunResults, RunStatus, StartRunResponse};
use debug_ignore::DebugIgnore;
use futures::prelude::*;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// The default overall time to wait for a run to finish.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(5 * 60 * 60);

const PROGRESS_STEP: u8 = 10;

/// Agent test runner options.
#[derive(Debug, Default)]
pub struct AgentTestRunnerBuilder {
    poll_timeout: Option<Duration>,
    show_log_on_run: bool,
    event_sender: Option<UnboundedSender<RunEvent>>,
}

impl AgentTestRunnerBuilder {
    /// Sets the overall time to wait for a run to reach a terminal status.
    pub fn set_poll_timeout(&mut self, poll_timeout: Duration) -> &mut Self {
        self.poll_timeout = Some(poll_timeout);
        self
    }

    /// Sets whether the log sink is brought to the front when a run starts.
    pub fn set_show_log_on_run(&mut self, show_log_on_run: bool) -> &mut Self {
        self.show_log_on_run = show_log_on_run;
        self
    }

    /// Sets a channel that receives a [`RunEvent`] for every step of every run.
    pub fn set_event_sender(&mut self, sender: UnboundedSender<RunEvent>) -> &mut Self {
        self.event_sender = Some(sender);
        self
    }

    /// Creates a new agent test runner.
    pub fn build(
        self,
        outline: Arc<TestOutlineProvider>,
        resolver: Arc<dyn ConnectionResolver>,
        service: Arc<dyn AgentTestService>,
        ui: Arc<dyn UiHost>,
        log: Arc<dyn LogSink>,
    ) -> AgentTestRunner {
        AgentTestRunner {
            outline,
            resolver: DebugIgnore(resolver),
            service: DebugIgnore(service),
            ui: DebugIgnore(ui),
            log: DebugIgnore(log),
            poll_timeout: self.poll_timeout.unwrap_or(DEFAULT_POLL_TIMEOUT),
            show_log_on_run: self.show_log_on_run,
            event_sender: self.event_sender,
            results: Mutex::new(HashMap::new()),
        }
    }
}

/// The result of a single run.
#[derive(Debug)]
pub enum RunOutcome {
    /// The run completed and its results were handed to the tree.
    Completed {
        /// The ID of the run.
        run_id: RunId,

        /// The number of cases that passed.
        passed: usize,

        /// The number of cases that failed.
        failed: usize,

        /// What happened when the results were applied.
        reconcile: ReconcileOutcome,
    },

    /// The run couldn't be started, or didn't complete.
    Failed(RunError),
}

impl RunOutcome {
    /// Returns true if the run completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

/// Starts agent test runs and reconciles their results onto the tree.
///
/// Runs aren't cancellable, and concurrent runs of the same group race: the last one to finish
/// wins.
#[derive(Debug)]
pub struct AgentTestRunner {
    outline: Arc<TestOutlineProvider>,
    resolver: DebugIgnore<Arc<dyn ConnectionResolver>>,
    service: DebugIgnore<Arc<dyn AgentTestService>>,
    ui: DebugIgnore<Arc<dyn UiHost>>,
    log: DebugIgnore<Arc<dyn LogSink>>,
    poll_timeout: Duration,
    show_log_on_run: bool,
    event_sender: Option<UnboundedSender<RunEvent>>,
    // Group name -> results of the last completed run.
    results: Mutex<HashMap<String, RunResults>>,
}

impl AgentTestRunner {
    /// Returns the overall poll timeout.
    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// Runs every group in the tree, one after the other, in tree order.
    pub async fn run_all(&self) -> Vec<(String, RunOutcome)> {
        let group_names: Vec<String> = self.outline.with_tree(|tree| {
            tree.groups()
                .map(|group| group.name().to_owned())
                .collect()
        });

        let mut outcomes = Vec::with_capacity(group_names.len());
        for group_name in group_names {
            let outcome = self.run_group(&group_name).await;
            outcomes.push((group_name, outcome));
        }
        outcomes
    }

    /// Runs a single group.
    ///
    /// Failures are reported to the log sink and as an error notification, and are also returned
    /// as [`RunOutcome::Failed`].
    pub async fn run_group(&self, group_name: &str) -> RunOutcome {
        let ctx = RunContext {
            runner: self,
            group_name,
            generation: self.outline.generation(),
            stopwatch: StopwatchStart::now(),
        };
        ctx.emit(RunEventKind::Starting);
        if self.show_log_on_run {
            self.log.show();
        }

        let (client, response) = match self.start(group_name).await {
            Ok(started) => started,
            Err(error) => {
                let _ = ctx.update_group(reconcile::mark_failed);
                self.outline.refresh_view();
                self.report_error(&error);
                ctx.emit(RunEventKind::start_failed(&error));
                return RunOutcome::Failed(error);
            }
        };

        let run_id = response.run_id;
        info!("started agent test run {run_id} for {group_name}");
        let _ = ctx.update_group(|group| reconcile::mark_running(group, response.status));
        self.outline.refresh_view();
        self.log.append_line(&reporter::started_line(group_name, &run_id));
        ctx.emit(RunEventKind::Started {
            run_id: run_id.clone(),
            status: response.status,
        });

        let mut progress = self.ui.begin_progress(&reporter::progress_title(group_name));
        let mut percent = 0;
        let polled = tokio::time::timeout(
            self.poll_timeout,
            ctx.poll_to_end(&*client, &run_id, &mut *progress, &mut percent),
        )
        .await
        .unwrap_or_else(|_| {
            Err(RemoteJobError::TimedOut {
                run_id: run_id.clone(),
                timeout: self.poll_timeout,
            })
        });
        progress.report(100 - percent, "Done");

        let results = match polled {
            Ok(results) => results,
            Err(error) => {
                let _ = ctx.update_group(reconcile::mark_failed);
                self.outline.refresh_view();
                let error = RunError::from(error);
                self.report_error(&error);
                ctx.emit(RunEventKind::Failed {
                    run_id,
                    message: DisplayErrorChain::new(&error).to_string(),
                });
                return RunOutcome::Failed(error);
            }
        };

        let reconcile = ctx
            .update_group(|group| reconcile::apply_results(group, &results))
            .unwrap_or_else(|miss| miss);
        self.outline.refresh_view();
        ctx.emit(RunEventKind::Reconciled {
            run_id: run_id.clone(),
            outcome: reconcile.clone(),
        });

        let passed = results.passed_count();
        let failed = results.failed_count();
        ctx.emit(RunEventKind::Finished {
            run_id: run_id.clone(),
            status: results.status,
            passed,
            failed,
        });

        if results.status != RunStatus::Completed {
            for line in reporter::unsuccessful_lines(group_name, &results) {
                self.log.append_line(&line);
            }
            let error = RunError::from(RemoteJobError::Unsuccessful {
                run_id,
                status: results.status,
                message: results.error_message.clone(),
                passed,
                failed,
            });
            self.ui.show_error_message(&error.to_string());
            return RunOutcome::Failed(error);
        }

        for line in reporter::report_lines(group_name, &results) {
            self.log.append_line(&line);
        }
        self.ui
            .show_information_message(&reporter::summary_line(group_name, &results));
        self.lock_results()
            .insert(group_name.to_owned(), results);

        RunOutcome::Completed {
            run_id,
            passed,
            failed,
            reconcile,
        }
    }

    /// Reveals a node's definition and, if its group has cached results, writes them to the log
    /// sink.
    ///
    /// This never contacts the remote service.
    pub fn go_to_test(&self, node: &NodeId) -> Result<(), CommandError> {
        let location = self
            .outline
            .with_tree(|tree| tree.find(node).map(|entry| entry.location().cloned()))
            .ok_or_else(|| CommandError::NodeNotFound(node.clone()))?;
        let Some(location) = location else {
            // The placeholder has nowhere to go.
            return Ok(());
        };
        self.ui.reveal(&location);

        if let Some(group_name) = node.group_name()
            && let Some(results) = self.cached_results(group_name)
        {
            self.log.clear();
            for line in reporter::report_lines(group_name, &results) {
                self.log.append_line(&line);
            }
            self.log.show();
        }
        Ok(())
    }

    /// Returns the results of the last completed run of a group.
    pub fn cached_results(&self, group_name: &str) -> Option<RunResults> {
        self.lock_results().get(group_name).cloned()
    }

    // ---
    // Helper methods
    // ---

    async fn start(
        &self,
        group_name: &str,
    ) -> Result<(Box<dyn AgentTestClient>, StartRunResponse), RunError> {
        let connection = self.resolver.resolve_target_connection().await?;
        debug!("resolved connection to {}", connection.target_org);
        let client = self.service.client(&connection)?;
        let response = client.start(group_name).await?;
        Ok((client, response))
    }

    fn report_error(&self, error: &RunError) {
        warn!("{}", DisplayErrorChain::new(error));
        self.log
            .append_line(&DisplayErrorChain::new(error).to_string());
        self.ui.show_error_message(&error.to_string());
    }

    fn lock_results(&self) -> std::sync::MutexGuard<'_, HashMap<String, RunResults>> {
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// State for a single in-flight run.
struct RunContext<'a> {
    runner: &'a AgentTestRunner,
    group_name: &'a str,
    generation: Generation,
    stopwatch: StopwatchStart,
}

impl RunContext<'_> {
    /// Consumes poll updates until a terminal snapshot arrives.
    async fn poll_to_end(
        &self,
        client: &dyn AgentTestClient,
        run_id: &RunId,
        progress: &mut dyn ProgressReporter,
        percent: &mut u8,
    ) -> Result<RunResults, RemoteJobError> {
        let options = PollOptions {
            timeout: self.runner.poll_timeout,
        };
        let mut updates = client.poll(run_id, options);
        let mut last_status = None;
        while let Some(update) = updates.next().await {
            let update = update?;
            if update.status.is_terminal() {
                return Ok(update);
            }

            if last_status != Some(update.status) {
                last_status = Some(update.status);
                let _ = self.update_group(|group| reconcile::mark_running(group, update.status));
                self.runner.outline.refresh_view();
            }

            let increment = PROGRESS_STEP.min(100 - *percent);
            *percent += increment;
            progress.report(increment, &reporter::progress_message(update.status));
            self.emit(RunEventKind::Progress {
                run_id: run_id.clone(),
                status: update.status,
                percent: *percent,
            });
        }

        Err(RemoteJobError::StreamEnded {
            run_id: run_id.clone(),
        })
    }

    /// Applies `f` to this run's group, unless the tree changed since the run started.
    fn update_group<T>(
        &self,
        f: impl FnOnce(&mut TestGroupNode) -> T,
    ) -> Result<T, ReconcileOutcome> {
        self.runner
            .outline
            .update_group(self.generation, self.group_name, f)
            .map_err(|miss| {
                let outcome = ReconcileOutcome::from_miss(miss);
                debug!("not updating {}: {outcome:?}", self.group_name);
                outcome
            })
    }

    fn emit(&self, kind: RunEventKind) {
        let Some(sender) = &self.runner.event_sender else {
            return;
        };
        let snapshot = self.stopwatch.snapshot();
        // The receiver going away isn't an error for the run.
        let _ = sender.send(RunEvent {
            timestamp: snapshot.timestamp,
            elapsed: snapshot.elapsed,
            group_name: self.group_name.to_owned(),
            kind,
        });
    }
}
