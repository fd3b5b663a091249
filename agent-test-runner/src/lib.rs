// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for discovering, displaying and running agent tests.
//!
//! The basic flow is:
//!
//! 1. [`list::parse_all_definitions`] scans a workspace for test definitions and their test sets.
//! 2. [`tree::TestTree`] turns those definitions into groups and cases.
//! 3. [`outline::TestOutlineProvider`] exposes the tree to the host's tree view.
//! 4. [`runner::AgentTestRunner`] starts remote runs, polls them and reconciles the results back
//!    onto the tree.
//!
//! [`extension::AgentTestExtension`] owns all of the above for the lifetime of the host session.

pub mod config;
pub mod errors;
pub mod extension;
mod helpers;
pub mod host;
pub mod list;
pub mod outline;
pub mod reporter;
pub mod runner;
mod stopwatch;
pub mod tree;
