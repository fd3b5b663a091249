// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use agent_test_metadata::{
    ExpectationResult, ExpectationVerdict, RunId, RunResults, RunStatus, StartRunResponse,
    TestCaseInputs, TestCaseResult,
};
use agent_test_runner::{
    errors::{BoxedError, ConfigurationError, RemoteJobError, RemoteStartError},
    host::{Disposable, LogSink, OrgOpener, ProgressReporter, UiHost},
    list::SourceLocation,
    runner::{AgentTestClient, AgentTestService, Connection, ConnectionResolver, PollOptions},
};
use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use futures::{future::BoxFuture, prelude::*, stream::BoxStream};
use indoc::indoc;
use std::sync::{
    Arc, Mutex, Once,
    atomic::{AtomicUsize, Ordering},
};

pub(crate) fn test_init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        // Ignore errors: another test binary may have installed a subscriber already.
        let _ = color_eyre::install();
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

pub(crate) const GREETING_DEFINITION: &str = indoc! {r#"
    <?xml version="1.0" encoding="UTF-8"?>
    <AiEvaluationDefinition xmlns="http://soap.sforce.com/2006/04/metadata">
        <description>Greets the user</description>
        <name>Greeting</name>
        <subjectName>Support_Agent</subjectName>
        <subjectType>AGENT</subjectType>
        <testSetName>greeting</testSetName>
    </AiEvaluationDefinition>
"#};

pub(crate) const GREETING_TEST_SET: &str = indoc! {r#"
    <?xml version="1.0" encoding="UTF-8"?>
    <AiEvaluationTestSet xmlns="http://soap.sforce.com/2006/04/metadata">
        <subjectType>AGENT</subjectType>
        <testCase>
            <expectation>
                <expectedValue>Greeting</expectedValue>
                <name>topic_sequence_match</name>
            </expectation>
            <inputs>
                <utterance>hi there</utterance>
            </inputs>
            <number>1</number>
        </testCase>
        <testCase>
            <expectation>
                <expectedValue>Greeting</expectedValue>
                <name>topic_sequence_match</name>
            </expectation>
            <inputs>
                <utterance>good morning</utterance>
            </inputs>
            <number>2</number>
        </testCase>
    </AiEvaluationTestSet>
"#};

pub(crate) const ORDERS_DEFINITION: &str = indoc! {r#"
    <?xml version="1.0" encoding="UTF-8"?>
    <AiEvaluationDefinition xmlns="http://soap.sforce.com/2006/04/metadata">
        <name>Orders</name>
        <subjectName>Support_Agent</subjectName>
        <testCase>
            <inputs>
                <utterance>where is my order</utterance>
            </inputs>
            <number>1</number>
        </testCase>
    </AiEvaluationDefinition>
"#};

pub(crate) const GREETING_DEFINITION_PATH: &str =
    "force-app/main/default/aiEvaluationDefinitions/Greeting.aiEvaluationDefinition-meta.xml";
pub(crate) const GREETING_TEST_SET_PATH: &str =
    "force-app/main/default/aiEvaluationTestSets/greeting.aiEvaluationTestSet-meta.xml";
pub(crate) const ORDERS_DEFINITION_PATH: &str =
    "force-app/main/default/aiEvaluationDefinitions/Orders.aiEvaluationDefinition-meta.xml";

pub(crate) fn write_file(root: &Utf8Path, relative: &str, contents: &str) -> Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}

/// Creates a workspace with the Greeting (test set) and Orders (inline) definitions.
pub(crate) fn sample_workspace() -> Result<Utf8TempDir> {
    let dir = camino_tempfile::tempdir()?;
    write_file(dir.path(), GREETING_DEFINITION_PATH, GREETING_DEFINITION)?;
    write_file(dir.path(), GREETING_TEST_SET_PATH, GREETING_TEST_SET)?;
    write_file(dir.path(), ORDERS_DEFINITION_PATH, ORDERS_DEFINITION)?;
    Ok(dir)
}

// ---
// Run results
// ---

pub(crate) fn case_result(number: u64, verdict: ExpectationVerdict) -> TestCaseResult {
    TestCaseResult {
        test_number: number,
        inputs: TestCaseInputs {
            utterance: format!("utterance {number}"),
        },
        test_results: vec![ExpectationResult {
            name: "topic_sequence_match".to_owned(),
            result: verdict,
            expected_value: "Greeting".to_owned(),
            actual_value: match verdict {
                ExpectationVerdict::Pass => "Greeting".to_owned(),
                ExpectationVerdict::Failure => "Escalation".to_owned(),
            },
            score: Some(match verdict {
                ExpectationVerdict::Pass => 1.0,
                ExpectationVerdict::Failure => 0.0,
            }),
            error_message: None,
        }],
    }
}

pub(crate) fn completed(cases: Vec<TestCaseResult>) -> RunResults {
    let mut results = RunResults::new(RunStatus::Completed);
    results.test_cases = cases;
    results
}

// ---
// Host
// ---

#[derive(Debug, Default)]
pub(crate) struct RecordingLog {
    lines: Mutex<Vec<String>>,
    shown: AtomicUsize,
    cleared: AtomicUsize,
}

impl RecordingLog {
    pub(crate) fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub(crate) fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }

    pub(crate) fn cleared(&self) -> usize {
        self.cleared.load(Ordering::SeqCst)
    }
}

impl LogSink for RecordingLog {
    fn clear(&self) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
        self.lines.lock().unwrap().clear();
    }

    fn show(&self) {
        self.shown.fetch_add(1, Ordering::SeqCst);
    }

    fn append_line(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_owned());
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingUi {
    pub(crate) core_version: Option<String>,
    pub(crate) quick_pick_answer: Mutex<Option<String>>,
    pub(crate) quick_pick_items: Mutex<Vec<String>>,
    pub(crate) infos: Mutex<Vec<String>>,
    pub(crate) errors: Mutex<Vec<String>>,
    pub(crate) revealed: Mutex<Vec<SourceLocation>>,
    pub(crate) executed: Mutex<Vec<String>>,
    pub(crate) registered: Mutex<Vec<&'static str>>,
    pub(crate) disposed: Arc<AtomicUsize>,
    pub(crate) progress: Arc<Mutex<Vec<u8>>>,
}

impl RecordingUi {
    pub(crate) fn with_core_version(version: &str) -> Self {
        Self {
            core_version: Some(version.to_owned()),
            ..Self::default()
        }
    }

    pub(crate) fn progress_total(&self) -> u32 {
        self.progress.lock().unwrap().iter().map(|&p| u32::from(p)).sum()
    }
}

struct RecordingProgress(Arc<Mutex<Vec<u8>>>);

impl ProgressReporter for RecordingProgress {
    fn report(&mut self, increment: u8, _message: &str) {
        self.0.lock().unwrap().push(increment);
    }
}

struct CountingDisposable(Arc<AtomicUsize>);

impl Disposable for CountingDisposable {
    fn dispose(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl UiHost for RecordingUi {
    fn show_information_message(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_owned());
    }

    fn show_error_message(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_owned());
    }

    fn begin_progress(&self, _title: &str) -> Box<dyn ProgressReporter> {
        Box::new(RecordingProgress(self.progress.clone()))
    }

    fn show_quick_pick<'a>(
        &'a self,
        items: Vec<String>,
        _placeholder: &'a str,
    ) -> BoxFuture<'a, Option<String>> {
        *self.quick_pick_items.lock().unwrap() = items;
        let answer = self.quick_pick_answer.lock().unwrap().clone();
        future::ready(answer).boxed()
    }

    fn reveal(&self, location: &SourceLocation) {
        self.revealed.lock().unwrap().push(location.clone());
    }

    fn execute_command(&self, command: &str) {
        self.executed.lock().unwrap().push(command.to_owned());
    }

    fn register_command(&self, command: &'static str) -> Box<dyn Disposable> {
        self.registered.lock().unwrap().push(command);
        Box::new(CountingDisposable(self.disposed.clone()))
    }

    fn extension_version(&self, _extension_id: &str) -> Option<String> {
        self.core_version.clone()
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingOpener {
    pub(crate) opened: Mutex<Vec<String>>,
}

impl OrgOpener for RecordingOpener {
    fn open_agent<'a>(&'a self, agent_name: &'a str) -> BoxFuture<'a, Result<(), BoxedError>> {
        self.opened.lock().unwrap().push(agent_name.to_owned());
        future::ready(Ok(())).boxed()
    }
}

// ---
// Remote service
// ---

pub(crate) struct StaticResolver(pub(crate) Result<Connection, ConfigurationError>);

impl StaticResolver {
    pub(crate) fn connected() -> Self {
        Self(Ok(Connection {
            target_org: "agent-scratch".to_owned(),
            instance_url: "https://example.my.salesforce.com".to_owned(),
        }))
    }
}

impl ConnectionResolver for StaticResolver {
    fn resolve_target_connection(&self) -> BoxFuture<'_, Result<Connection, ConfigurationError>> {
        future::ready(self.0.clone()).boxed()
    }
}

type PollHook = Arc<dyn Fn() + Send + Sync>;

/// A service whose runs follow a fixed script.
#[derive(Clone, Default)]
pub(crate) struct ScriptedService {
    start_error: Option<String>,
    updates: Vec<Result<RunResults, String>>,
    hang: bool,
    on_poll: Option<PollHook>,
    pub(crate) started: Arc<Mutex<Vec<String>>>,
}

impl ScriptedService {
    /// Accepts every run, then yields `updates` in order.
    pub(crate) fn with_updates(updates: Vec<Result<RunResults, String>>) -> Self {
        Self {
            updates,
            ..Self::default()
        }
    }

    /// Rejects every run.
    pub(crate) fn failing_start(message: &str) -> Self {
        Self {
            start_error: Some(message.to_owned()),
            ..Self::default()
        }
    }

    /// Yields `updates`, then never yields again.
    pub(crate) fn hanging(updates: Vec<Result<RunResults, String>>) -> Self {
        Self {
            updates,
            hang: true,
            ..Self::default()
        }
    }

    /// Calls `hook` when a run starts polling.
    pub(crate) fn on_poll(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_poll = Some(Arc::new(hook));
        self
    }

    pub(crate) fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

impl AgentTestService for ScriptedService {
    fn client(&self, _connection: &Connection) -> Result<Box<dyn AgentTestClient>, RemoteStartError> {
        Ok(Box::new(ScriptedClient(self.clone())))
    }
}

struct ScriptedClient(ScriptedService);

impl AgentTestClient for ScriptedClient {
    fn start<'a>(
        &'a self,
        group_name: &'a str,
    ) -> BoxFuture<'a, Result<StartRunResponse, RemoteStartError>> {
        let script = &self.0;
        script.started.lock().unwrap().push(group_name.to_owned());
        let result = match &script.start_error {
            Some(message) => Err(RemoteStartError::new(group_name, message.clone())),
            None => Ok(StartRunResponse {
                run_id: RunId::new(format!("4KBSM000000{group_name}")),
                status: RunStatus::New,
            }),
        };
        future::ready(result).boxed()
    }

    fn poll<'a>(
        &'a self,
        run_id: &'a RunId,
        _options: PollOptions,
    ) -> BoxStream<'a, Result<RunResults, RemoteJobError>> {
        let script = &self.0;
        if let Some(hook) = &script.on_poll {
            hook();
        }
        let updates = script.updates.clone().into_iter().map(move |update| {
            update.map_err(|message| RemoteJobError::transport(run_id.clone(), message))
        });
        let updates = stream::iter(updates);
        if script.hang {
            updates.chain(stream::pending()).boxed()
        } else {
            updates.boxed()
        }
    }
}
