// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session-wide outbound cooldown.
//!
//! One timestamp covers every send of the session, whatever its type or
//! conversation. The check and the write happen under one synchronous lock,
//! so two concurrent sends can never both pass.

use std::sync::Mutex;
use std::time::Duration;

use parley_core::ParleyError;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::metrics;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected { retry_after: Duration },
}

#[derive(Debug)]
pub struct AdmissionController {
    cooldown: Duration,
    last_accepted: Mutex<Option<Instant>>,
}

impl AdmissionController {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_accepted: Mutex::new(None),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    fn lock_last(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.last_accepted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn evaluate(&self, last: Option<Instant>, now: Instant) -> Admission {
        if let Some(prev) = last {
            let elapsed = now.saturating_duration_since(prev);
            if elapsed < self.cooldown {
                return Admission::Rejected {
                    retry_after: self.cooldown - elapsed,
                };
            }
        }
        Admission::Admitted
    }

    /// Admits iff at least one cooldown has passed since the last admitted
    /// send, and records `now` as the new slot. Slots are never refunded.
    pub fn try_admit(&self, now: Instant) -> Admission {
        let mut last = self.lock_last();
        let admission = self.evaluate(*last, now);
        if admission == Admission::Admitted {
            *last = Some(now);
        }
        admission
    }

    /// What [`try_admit`](Self::try_admit) would answer at `now`, without
    /// taking the slot.
    pub fn peek(&self, now: Instant) -> Admission {
        self.evaluate(*self.lock_last(), now)
    }

    /// [`try_admit`](Self::try_admit) at the current instant, as a `Result`.
    pub fn admit(&self) -> Result<(), ParleyError> {
        match self.try_admit(Instant::now()) {
            Admission::Admitted => {
                debug!("send admitted");
                Ok(())
            }
            Admission::Rejected { retry_after } => Err(self.rejected(retry_after)),
        }
    }

    /// Fails fast when a send right now would be rejected. Nothing is reserved,
    /// so a later [`admit`](Self::admit) still decides.
    pub fn check(&self) -> Result<(), ParleyError> {
        match self.peek(Instant::now()) {
            Admission::Admitted => Ok(()),
            Admission::Rejected { retry_after } => Err(self.rejected(retry_after)),
        }
    }

    fn rejected(&self, retry_after: Duration) -> ParleyError {
        warn!(
            retry_after_ms = retry_after.as_millis() as u64,
            "send rejected by cooldown"
        );
        metrics::record_admission_rejection();
        ParleyError::AdmissionRejected {
            retry_after,
            cooldown: self.cooldown,
        }
    }
}
