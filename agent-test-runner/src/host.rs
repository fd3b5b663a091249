// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces to the editor hosting the extension.
//!
//! Nothing in this crate talks to an editor directly. Instead, the editor implements the traits in
//! this module and passes them in when the extension is activated.

use crate::{errors::BoxedError, list::SourceLocation};
use futures::future::BoxFuture;

/// An append-only text sink that run output is written to.
pub trait LogSink: Send + Sync {
    /// Removes all previously written lines.
    fn clear(&self);

    /// Brings the sink to the front.
    fn show(&self);

    /// Appends a single line.
    fn append_line(&self, line: &str);
}

/// A handle to an in-progress indicator, created by [`UiHost::begin_progress`].
///
/// The indicator is removed when the handle is dropped.
pub trait ProgressReporter: Send {
    /// Advances the indicator by `increment` percent and updates its message.
    fn report(&mut self, increment: u8, message: &str);
}

/// A registration that can be undone.
pub trait Disposable: Send {
    /// Undoes the registration.
    fn dispose(&mut self);
}

/// User-facing facilities provided by the editor.
pub trait UiHost: Send + Sync {
    /// Shows an informational notification.
    fn show_information_message(&self, message: &str);

    /// Shows an error notification.
    fn show_error_message(&self, message: &str);

    /// Starts a progress indicator with the given title.
    fn begin_progress(&self, title: &str) -> Box<dyn ProgressReporter>;

    /// Asks the user to pick one of `items`. Resolves to `None` if the prompt was dismissed.
    fn show_quick_pick<'a>(
        &'a self,
        items: Vec<String>,
        placeholder: &'a str,
    ) -> BoxFuture<'a, Option<String>>;

    /// Opens the file at `location` and moves the cursor to it.
    fn reveal(&self, location: &SourceLocation);

    /// Executes an editor command by ID.
    fn execute_command(&self, command: &str);

    /// Registers an editor command by ID, so the editor routes it to this extension.
    fn register_command(&self, command: &'static str) -> Box<dyn Disposable>;

    /// Returns the version string of another installed extension, or `None` if it isn't installed.
    fn extension_version(&self, extension_id: &str) -> Option<String>;
}

/// Opens an agent's page in the target org.
pub trait OrgOpener: Send + Sync {
    /// Opens the agent with the given API name.
    fn open_agent<'a>(&'a self, agent_name: &'a str) -> BoxFuture<'a, Result<(), BoxedError>>;
}
