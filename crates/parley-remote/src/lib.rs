// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapters for the hosted backend: REST data store, remote functions,
//! direct object uploads, and the realtime change stream.
//!
//! Backend payloads are decoded into typed row and response structs here;
//! nothing untyped crosses into the pipeline.

pub mod client;
pub mod functions;
pub mod realtime;
pub mod rows;
pub mod storage;
pub mod store;

pub use client::BackendClient;
pub use functions::HttpFunctions;
pub use realtime::RealtimeFeed;
pub use storage::HttpObjectStorage;
pub use store::RestDataStore;
