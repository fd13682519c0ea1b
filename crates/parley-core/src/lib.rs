// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley messaging pipeline.
//!
//! This crate provides the error taxonomy, domain types and adapter traits
//! shared by the backend adapters, the pipeline and the CLI.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ParleyError;
pub use types::{
    AdapterType, ConnectivityStatus, ConversationId, DeliveryStatus, HealthStatus, InstanceId,
    MessageId, OrganizationId, UserId,
};

pub use traits::{
    AudioCapture, ChangeFeed, DataStore, FunctionEndpoint, ObjectStorage, PluginAdapter,
};
