// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits for the hosted backend and local devices.
//!
//! Backend adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod capture;
pub mod functions;
pub mod object_storage;
pub mod store;

pub use adapter::PluginAdapter;
pub use capture::AudioCapture;
pub use functions::FunctionEndpoint;
pub use object_storage::ObjectStorage;
pub use store::{ChangeFeed, DataStore};
