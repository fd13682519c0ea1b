// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Audio capture device that replays a canned recording.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use parley_core::{AudioCapture, ParleyError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Started(String),
    Stopped,
    Cancelled,
}

pub struct MockCapture {
    formats: Vec<String>,
    recording: Mutex<Vec<u8>>,
    events: Mutex<Vec<CaptureEvent>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockCapture {
    /// A device that can encode `formats`; the recording starts out empty.
    pub fn new(formats: &[&str]) -> Self {
        Self {
            formats: formats.iter().map(|f| f.to_string()).collect(),
            recording: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Bytes returned by the next `stop`.
    pub fn set_recording(&self, bytes: Vec<u8>) {
        *lock(&self.recording) = bytes;
    }

    pub fn events(&self) -> Vec<CaptureEvent> {
        lock(&self.events).clone()
    }
}

#[async_trait]
impl AudioCapture for MockCapture {
    fn supported_formats(&self) -> Vec<String> {
        self.formats.clone()
    }

    async fn start(&self, mime_type: &str) -> Result<(), ParleyError> {
        if !self.formats.iter().any(|f| f == mime_type) {
            return Err(ParleyError::Capture(format!(
                "device cannot encode {mime_type}"
            )));
        }
        lock(&self.events).push(CaptureEvent::Started(mime_type.to_string()));
        Ok(())
    }

    async fn stop(&self) -> Result<Vec<u8>, ParleyError> {
        lock(&self.events).push(CaptureEvent::Stopped);
        Ok(std::mem::take(&mut *lock(&self.recording)))
    }

    fn cancel(&self) {
        lock(&self.events).push(CaptureEvent::Cancelled);
        lock(&self.recording).clear();
    }
}
