// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parley integration tests.
//!
//! Provides in-memory adapters and a session harness for fast,
//! deterministic, CI-runnable tests without a hosted backend.
//!
//! # Components
//!
//! - [`MemoryStore`] - Data store and change feed kept in memory
//! - [`MockFunctions`] - Scripted probes, upload targets and sends
//! - [`MockObjectStorage`] - Object storage recording every upload
//! - [`MockCapture`] - Capture device replaying a canned recording
//! - [`TestHarness`] - A full messaging session over the mocks

pub mod harness;
pub mod memory_store;
pub mod mock_capture;
pub mod mock_functions;
pub mod mock_storage;

pub use harness::{conversation, instance, TestHarness, TestHarnessBuilder, TEST_ORG, TEST_USER};
pub use memory_store::{FetchGate, MemoryStore};
pub use mock_capture::{CaptureEvent, MockCapture};
pub use mock_functions::{DispatchScript, FunctionCall, MockFunctions, ProbeScript, TargetScript};
pub use mock_storage::{MockObjectStorage, StoredObject};
