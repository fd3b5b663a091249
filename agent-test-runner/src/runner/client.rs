// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::{ConfigurationError, RemoteJobError, RemoteStartError};
use agent_test_metadata::{RunId, RunResults, StartRunResponse};
use futures::{future::BoxFuture, stream::BoxStream};
use std::time::Duration;

/// An authenticated connection to a target org.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Connection {
    /// The username or alias of the org.
    pub target_org: String,

    /// The org's instance URL.
    pub instance_url: String,
}

/// Resolves the connection for the configured target org.
pub trait ConnectionResolver: Send + Sync {
    /// Returns a connection to the configured target org.
    fn resolve_target_connection(&self) -> BoxFuture<'_, Result<Connection, ConfigurationError>>;
}

/// Options for [`AgentTestClient::poll`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PollOptions {
    /// How long the run is expected to take at most.
    ///
    /// Clients may use this as a hint. The runner enforces it independently.
    pub timeout: Duration,
}

/// Creates clients for the remote agent test service.
pub trait AgentTestService: Send + Sync {
    /// Creates a client bound to `connection`.
    fn client(&self, connection: &Connection) -> Result<Box<dyn AgentTestClient>, RemoteStartError>;
}

/// A client for the remote agent test service.
pub trait AgentTestClient: Send + Sync {
    /// Starts running the test definition named `group_name`.
    fn start<'a>(
        &'a self,
        group_name: &'a str,
    ) -> BoxFuture<'a, Result<StartRunResponse, RemoteStartError>>;

    /// Polls a run until it reaches a terminal status.
    ///
    /// Each item is a snapshot of the run: intermediate snapshots carry `NEW` or `IN_PROGRESS` and
    /// usually no case results, and the last snapshot carries a terminal status. The stream ends
    /// after the terminal snapshot. The interval between polls is up to the client.
    fn poll<'a>(
        &'a self,
        run_id: &'a RunId,
        options: PollOptions,
    ) -> BoxStream<'a, Result<RunResults, RemoteJobError>>;
}
