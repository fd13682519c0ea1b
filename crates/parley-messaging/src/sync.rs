// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message thread synchronization for the active conversation.
//!
//! Two triggers, one code path: the poll interval and change-feed events both
//! call [`MessageSync::refresh`], which refetches the whole thread and replaces
//! the published snapshot. Nothing is patched incrementally, so overlapping
//! refreshes converge on whichever result lands last.
//!
//! Every activation bumps an epoch. A fetch that started under an older epoch
//! is discarded when it completes, so a slow response for the previous
//! conversation can never overwrite the current one.
//!
//! Failed pulls and failed mark-read calls are published as a [`SyncNotice`]
//! on a second channel. The last good snapshot stays visible; the next
//! successful pull clears the notice.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parley_core::types::{ChangeEvent, Conversation, Message};
use parley_core::{ConversationId, DataStore, OrganizationId, ParleyError};
use tokio::sync::{mpsc, watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The visible thread of the active conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot {
    pub conversation_id: ConversationId,
    pub epoch: u64,
    pub messages: Vec<Message>,
    pub fetched_at: DateTime<Utc>,
}

/// A non-blocking problem of the background sync, shown next to the thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncNotice {
    pub conversation_id: ConversationId,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Activation {
    epoch: u64,
    conversation: Option<ConversationId>,
    unread_at_activation: u32,
    read_marked: bool,
}

pub struct MessageSync {
    store: Arc<dyn DataStore>,
    org: OrganizationId,
    activation: Mutex<Activation>,
    snapshot: watch::Sender<Option<ThreadSnapshot>>,
    notice: watch::Sender<Option<SyncNotice>>,
    invalidated: Notify,
}

impl MessageSync {
    pub fn new(store: Arc<dyn DataStore>, org: OrganizationId) -> Self {
        let (snapshot, _rx) = watch::channel(None);
        let (notice, _rx) = watch::channel(None);
        Self {
            store,
            org,
            activation: Mutex::new(Activation::default()),
            snapshot,
            notice,
            invalidated: Notify::new(),
        }
    }

    fn activation(&self) -> std::sync::MutexGuard<'_, Activation> {
        self.activation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ThreadSnapshot>> {
        self.snapshot.subscribe()
    }

    pub fn current(&self) -> Option<ThreadSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe_notices(&self) -> watch::Receiver<Option<SyncNotice>> {
        self.notice.subscribe()
    }

    pub fn current_notice(&self) -> Option<SyncNotice> {
        self.notice.borrow().clone()
    }

    fn publish_notice(&self, conversation: &ConversationId, message: String) {
        self.notice.send_replace(Some(SyncNotice {
            conversation_id: conversation.clone(),
            message,
            at: Utc::now(),
        }));
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.activation().epoch == epoch
    }

    pub fn active_conversation(&self) -> Option<ConversationId> {
        self.activation().conversation.clone()
    }

    /// Makes `conversation` the active thread and clears the visible snapshot.
    pub fn activate(&self, conversation: &Conversation) -> u64 {
        let epoch = {
            let mut act = self.activation();
            act.epoch += 1;
            act.conversation = Some(conversation.id.clone());
            act.unread_at_activation = conversation.unread_count;
            act.read_marked = false;
            act.epoch
        };
        self.snapshot.send_replace(None);
        self.notice.send_replace(None);
        info!(conversation = %conversation.id, epoch, "conversation activated");
        self.invalidate();
        epoch
    }

    /// Clears the active thread; pending fetches are discarded on arrival.
    pub fn deactivate(&self) {
        {
            let mut act = self.activation();
            act.epoch += 1;
            act.conversation = None;
        }
        self.snapshot.send_replace(None);
        self.notice.send_replace(None);
    }

    /// Asks the running sync loop for an immediate refresh.
    pub fn invalidate(&self) {
        self.invalidated.notify_one();
    }

    /// Refetches the active thread and publishes it wholesale.
    ///
    /// Returns `None` when nothing is active or the activation changed while
    /// the fetch was in flight. Mark-read goes out at most once per
    /// activation, however many pulls overlap.
    pub async fn refresh(&self) -> Result<Option<ThreadSnapshot>, ParleyError> {
        let (epoch, conversation, wants_read) = {
            let act = self.activation();
            let Some(conversation) = act.conversation.clone() else {
                return Ok(None);
            };
            let wants_read = !act.read_marked && act.unread_at_activation > 0;
            (act.epoch, conversation, wants_read)
        };

        let messages = match self.store.list_messages(&self.org, &conversation).await {
            Ok(messages) => messages,
            Err(e) => {
                if self.is_current(epoch) {
                    self.publish_notice(&conversation, e.notice());
                }
                return Err(e);
            }
        };

        let (snapshot, mark_read) = {
            let mut act = self.activation();
            if act.epoch != epoch {
                debug!(conversation = %conversation, epoch, "stale fetch discarded");
                return Ok(None);
            }
            let snapshot = ThreadSnapshot {
                conversation_id: conversation.clone(),
                epoch,
                messages,
                fetched_at: Utc::now(),
            };
            self.snapshot.send_replace(Some(snapshot.clone()));
            self.notice.send_replace(None);
            // Another pull may have claimed it while this one was in flight.
            let mark_read = wants_read && !act.read_marked;
            if mark_read {
                act.read_marked = true;
            }
            (snapshot, mark_read)
        };
        debug!(conversation = %conversation, messages = snapshot.messages.len(), "thread refreshed");

        if mark_read {
            match self.store.mark_conversation_read(&self.org, &conversation).await {
                Ok(()) => debug!(conversation = %conversation, "conversation marked read"),
                Err(e) => {
                    warn!(conversation = %conversation, error = %e, "failed to mark conversation read");
                    if self.is_current(epoch) {
                        self.publish_notice(
                            &conversation,
                            format!("Could not mark the conversation read. {}", e.notice()),
                        );
                    }
                }
            }
        }
        Ok(Some(snapshot))
    }

    /// Drives refreshes from the poll interval, invalidations and the change
    /// feed until `cancel` fires. A closed feed degrades to polling only.
    pub async fn run(
        self: Arc<Self>,
        poll_interval: Duration,
        mut feed: Option<mpsc::Receiver<ChangeEvent>>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let trigger = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => "poll",
                _ = self.invalidated.notified() => "invalidated",
                event = next_event(&mut feed) => match event {
                    Some(event) if event.touches_messages() && event.organization_id == self.org => "push",
                    Some(_) => continue,
                    None => {
                        warn!("change feed closed, continuing with polling only");
                        feed = None;
                        continue;
                    }
                },
            };
            if let Err(e) = self.refresh().await {
                warn!(trigger, error = %e, "thread refresh failed");
            }
        }
        debug!("sync loop stopped");
    }
}

async fn next_event(feed: &mut Option<mpsc::Receiver<ChangeEvent>>) -> Option<ChangeEvent> {
    match feed {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
