//! Session orchestration: ties the store, REST use-cases, and channel
//! events into one mutable state machine driven by the main loop.
//!
//! All I/O is spawned; results come back as [`SessionMsg`] values over the
//! session's mpsc channel and are folded in by [`Session::handle_message`].
//! The session itself is synchronous, which keeps every reconciliation
//! decision (optimistic finalize, stale hydration, unread counting) in
//! single-threaded code that unit tests can drive directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::channel::{self, ChannelNotice, DispatchContext, DispatchOutcome};
use crate::model::{ChatError, ConversationKey, Message, MessageId, UserRef, ValidationError};
use crate::repo::MessageStore;
use crate::state::notifications::{NoticeLevel, NotificationQueue};
use crate::state::presence::PresenceRoster;
use crate::timeline::{self, ReadRangeTracker, TimelineItem};
use crate::usecase::{self, ChatApi, MediaUpload, MessageDraft, MessageEdit};
use crate::view_state::{ConversationView, RestoreOutcome, ViewMemory};
use crate::wire::{AuthAction, AuthFailureReason, ServerEvent};

/// Results of spawned I/O, folded back into the session.
#[derive(Debug)]
pub enum SessionMsg {
    /// A conversation fetch finished.
    Hydrated {
        /// Generation at spawn time; stale generations are dropped.
        generation: u64,
        /// The fetched conversation.
        conversation: ConversationKey,
        /// Fetched page or the failure.
        result: Result<Vec<Message>, ChatError>,
    },
    /// An optimistic send resolved.
    SendResolved {
        /// The optimistic entry's temp id.
        temp_id: MessageId,
        /// Confirmed message or the failure.
        result: Result<Message, ChatError>,
    },
    /// An edit/delete/pin/read call resolved.
    MutationResolved {
        /// Updated message (`None` for skipped receipts) or the failure.
        result: Result<Option<Message>, ChatError>,
    },
}

/// Coarse connection health for the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHealth {
    /// First connect still in progress.
    Connecting,
    /// Channel up.
    Online,
    /// Channel down, reconnecting.
    Offline,
    /// Credential rejected; user must log in again.
    AuthRequired,
    /// Reconnect budget spent; restart required.
    Exhausted,
}

/// One authenticated client session.
pub struct Session {
    store: MessageStore,
    api: Arc<dyn ChatApi>,
    local_user: UserRef,
    open: ConversationKey,
    unread: HashMap<ConversationKey, u32>,
    presence: PresenceRoster,
    notifications: NotificationQueue,
    read_tracker: ReadRangeTracker,
    view_memory: ViewMemory,
    drafts: HashMap<MessageId, MessageDraft>,
    connection: ConnectionHealth,
    temp_seq: u64,
    hydration_generation: u64,
    hydration_task: Option<JoinHandle<()>>,
    msg_tx: mpsc::Sender<SessionMsg>,
    page_size: u32,
}

impl Session {
    /// New session opened on the shared conversation.
    pub fn new(
        api: Arc<dyn ChatApi>,
        local_user: UserRef,
        msg_tx: mpsc::Sender<SessionMsg>,
        page_size: u32,
        anchor_deadline: Duration,
    ) -> Self {
        Self {
            store: MessageStore::new(),
            api,
            local_user,
            open: ConversationKey::Shared,
            unread: HashMap::new(),
            presence: PresenceRoster::new(),
            notifications: NotificationQueue::new(),
            read_tracker: ReadRangeTracker::new(),
            view_memory: ViewMemory::with_anchor_deadline(anchor_deadline),
            drafts: HashMap::new(),
            connection: ConnectionHealth::Connecting,
            temp_seq: 0,
            hydration_generation: 0,
            hydration_task: None,
            msg_tx,
            page_size,
        }
    }

    // ===== Read access =====

    /// The authoritative store.
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Conversation currently on screen.
    pub fn open(&self) -> &ConversationKey {
        &self.open
    }

    /// The authenticated user.
    pub fn local_user(&self) -> &UserRef {
        &self.local_user
    }

    /// Unread count of a conversation.
    pub fn unread(&self, key: &ConversationKey) -> u32 {
        self.unread.get(key).copied().unwrap_or(0)
    }

    /// Total unread across every background conversation.
    pub fn unread_total(&self) -> u32 {
        self.unread.values().sum()
    }

    /// Connection health for the status line.
    pub fn connection(&self) -> ConnectionHealth {
        self.connection
    }

    /// Presence roster.
    pub fn presence(&self) -> &PresenceRoster {
        &self.presence
    }

    /// Transient notices.
    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    /// Expire stale notices.
    pub fn tick(&mut self, now: Instant) {
        self.notifications.expire(now);
    }

    /// Pinned messages of the open conversation, in timeline order.
    pub fn pinned_messages(&self) -> Vec<Message> {
        timeline::pinned(&self.store.messages(&self.open))
    }

    // ===== Conversation switching =====

    /// Switch to another conversation.
    ///
    /// Captures the departing view, clears the target's unread counter and
    /// kicks off hydration. Returns an immediate restore outcome when one
    /// is known; otherwise the caller polls [`Self::poll_restore`].
    pub fn open_conversation(
        &mut self,
        now: Instant,
        key: ConversationKey,
        departing: Option<ConversationView>,
    ) -> Option<RestoreOutcome> {
        if let Some(view) = departing {
            let previous = self.open.clone();
            self.view_memory.capture(now, &previous, view);
        }
        self.open = key.clone();
        self.unread.remove(&key);
        self.hydrate_open();
        self.view_memory.begin_restore(now, &key)
    }

    /// Throttled capture of the current reading position.
    pub fn capture_view(&mut self, now: Instant, view: ConversationView) {
        let open = self.open.clone();
        self.view_memory.capture_throttled(now, &open, view);
    }

    /// Advance a pending scroll restore.
    pub fn poll_restore<F>(&mut self, now: Instant, locate: F) -> Option<RestoreOutcome>
    where
        F: Fn(&MessageId) -> Option<usize>,
    {
        self.view_memory.poll_restore(now, locate)
    }

    /// Re-fetch the open conversation (initial open, reconnect catch-up).
    pub fn hydrate_open(&mut self) {
        self.hydration_generation += 1;
        if let Some(task) = self.hydration_task.take() {
            task.abort();
        }
        let generation = self.hydration_generation;
        let api = Arc::clone(&self.api);
        let tx = self.msg_tx.clone();
        let conversation = self.open.clone();
        let limit = self.page_size;
        self.hydration_task = Some(tokio::spawn(async move {
            let result = api.fetch_messages(&conversation, 1, limit).await;
            let _ = tx
                .send(SessionMsg::Hydrated {
                    generation,
                    conversation,
                    result,
                })
                .await;
        }));
    }

    // ===== Outbound operations =====

    /// Send a message to the open conversation.
    ///
    /// Validation failures return synchronously and nothing is spawned. On
    /// success the optimistic entry is visible immediately and the temp id
    /// is returned.
    pub fn send(
        &mut self,
        content: Option<String>,
        media: Option<MediaUpload>,
    ) -> Result<MessageId, ValidationError> {
        let draft = MessageDraft {
            conversation: self.open.clone(),
            content,
            media,
        };
        usecase::validate_draft(&draft)?;

        self.temp_seq += 1;
        let temp_id = MessageId::temp(self.temp_seq);
        let receiver = self
            .open
            .peer()
            .map(|peer| UserRef::new(peer.clone(), peer.to_string()));
        let optimistic = Message::optimistic(
            temp_id.clone(),
            self.open.clone(),
            self.local_user.clone(),
            receiver,
            draft.content.clone(),
            draft.media.as_ref().and_then(MediaUpload::placeholder),
        );
        self.store.add_optimistic(&self.open, optimistic);
        self.drafts.insert(temp_id.clone(), draft.clone());
        self.spawn_send(temp_id.clone(), draft);
        Ok(temp_id)
    }

    /// Re-issue a failed send. Returns whether a retry was started.
    pub fn retry_send(&mut self, temp_id: &MessageId) -> bool {
        if self.store.retry(temp_id).is_none() {
            return false;
        }
        let Some(draft) = self.drafts.get(temp_id).cloned() else {
            // Draft lost (should not happen while the entry exists); give up.
            self.store.fail(temp_id);
            return false;
        };
        self.spawn_send(temp_id.clone(), draft);
        true
    }

    /// Edit a message. Validation failures return synchronously.
    pub fn edit_message(&self, id: MessageId, edit: MessageEdit) -> Result<(), ValidationError> {
        usecase::validate_edit(&edit)?;
        let api = Arc::clone(&self.api);
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let result = usecase::edit(api.as_ref(), &id, &edit).await.map(Some);
            let _ = tx.send(SessionMsg::MutationResolved { result }).await;
        });
        Ok(())
    }

    /// Soft-delete a message.
    pub fn delete_message(&self, id: MessageId) {
        let api = Arc::clone(&self.api);
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let result = usecase::delete(api.as_ref(), &id).await.map(Some);
            let _ = tx.send(SessionMsg::MutationResolved { result }).await;
        });
    }

    /// Pin or unpin a message.
    pub fn set_pinned(&self, id: MessageId, pinned: bool) {
        let api = Arc::clone(&self.api);
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let result = usecase::set_pinned(api.as_ref(), &id, pinned).await.map(Some);
            let _ = tx.send(SessionMsg::MutationResolved { result }).await;
        });
    }

    /// Report the rows currently on screen; spawns read receipts for
    /// everything newly seen.
    pub fn report_visible_range(&mut self, items: &[TimelineItem], range: std::ops::Range<usize>) {
        let due = self
            .read_tracker
            .collect(items, range, &self.local_user.id);
        if due.is_empty() {
            return;
        }
        let open_list = self.store.messages(&self.open);
        for id in due {
            let Some(message) = open_list.iter().find(|m| m.id() == &id).cloned() else {
                continue;
            };
            let api = Arc::clone(&self.api);
            let tx = self.msg_tx.clone();
            let local = self.local_user.id.clone();
            tokio::spawn(async move {
                let result = usecase::mark_read(api.as_ref(), &local, &message).await;
                let _ = tx.send(SessionMsg::MutationResolved { result }).await;
            });
        }
    }

    // ===== Inbound: spawned-I/O results =====

    /// Fold one spawned-I/O result into the session.
    pub fn handle_message(&mut self, now: Instant, msg: SessionMsg) {
        match msg {
            SessionMsg::Hydrated {
                generation,
                conversation,
                result,
            } => {
                if generation != self.hydration_generation {
                    info!(generation, "stale hydration result dropped");
                    return;
                }
                match result {
                    Ok(list) => self.store.set_messages(&conversation, list),
                    Err(e) => {
                        self.note_error(now, &e, format!("could not load messages: {e}"));
                    }
                }
            }
            SessionMsg::SendResolved { temp_id, result } => match result {
                Ok(confirmed) => {
                    self.drafts.remove(&temp_id);
                    self.store.finalize(&temp_id, confirmed);
                }
                Err(e) => {
                    warn!(%temp_id, error = %e, "send failed");
                    self.store.fail(&temp_id);
                    let hint = if e.offers_retry() { " (press r to retry)" } else { "" };
                    self.note_error(now, &e, format!("send failed: {e}{hint}"));
                }
            },
            SessionMsg::MutationResolved { result } => match result {
                Ok(Some(updated)) => {
                    let id = updated.id().clone();
                    self.store.update(&id, updated);
                }
                Ok(None) => {}
                Err(e) => {
                    self.note_error(now, &e, format!("operation failed: {e}"));
                }
            },
        }
    }

    // ===== Inbound: channel notices =====

    /// Fold one channel notice into the session.
    pub fn handle_channel(&mut self, now: Instant, notice: ChannelNotice) {
        match notice {
            ChannelNotice::Connected => {
                let was_offline = self.connection != ConnectionHealth::Connecting;
                self.connection = ConnectionHealth::Online;
                if was_offline {
                    self.notifications.push(now, NoticeLevel::Info, "reconnected");
                    // Events missed while offline are not replayed; re-fetch.
                    self.hydrate_open();
                }
            }
            ChannelNotice::Event(event) => self.handle_event(now, event),
            ChannelNotice::Disconnected { attempt, .. } => {
                self.connection = ConnectionHealth::Offline;
                if attempt == 1 {
                    self.notifications
                        .push(now, NoticeLevel::Warn, "connection lost, retrying");
                }
            }
            ChannelNotice::AuthRejected(reason) => self.handle_auth_failure(now, reason),
            ChannelNotice::ReconnectFailed => {
                self.connection = ConnectionHealth::Exhausted;
                self.notifications
                    .push(now, NoticeLevel::Error, "connection lost for good; restart to reconnect");
            }
        }
    }

    fn handle_event(&mut self, now: Instant, event: ServerEvent) {
        let ctx = DispatchContext {
            local_user: self.local_user.id.clone(),
            open_conversation: Some(self.open.clone()),
        };
        match channel::apply(&mut self.store, &ctx, event) {
            DispatchOutcome::Applied { unread: Some(key) } => {
                *self.unread.entry(key).or_insert(0) += 1;
            }
            DispatchOutcome::Applied { unread: None } => {}
            DispatchOutcome::Deferred(event) => match event {
                ServerEvent::PresenceList(users) => self.presence.apply_list(&users),
                ServerEvent::PresenceChanged { user_id, status } => {
                    self.presence.apply_change(&user_id, &status);
                }
                ServerEvent::SendAck {
                    error: Some(error), ..
                } => {
                    self.notifications
                        .push(now, NoticeLevel::Warn, format!("send rejected: {error}"));
                }
                ServerEvent::SendAck { .. } => {}
                ServerEvent::AuthError(reason) => self.handle_auth_failure(now, reason),
                // Message events are never deferred.
                other => warn!(?other, "unexpected deferred event"),
            },
        }
    }

    fn handle_auth_failure(&mut self, now: Instant, reason: AuthFailureReason) {
        match reason.action() {
            AuthAction::Relogin => {
                self.connection = ConnectionHealth::AuthRequired;
                self.notifications
                    .push(now, NoticeLevel::Error, "session expired, please log in again");
            }
            AuthAction::Fatal => {
                self.connection = ConnectionHealth::Exhausted;
                self.notifications
                    .push(now, NoticeLevel::Error, "account no longer exists");
            }
        }
    }

    fn note_error(&mut self, now: Instant, error: &ChatError, text: String) {
        if error.clears_credential() {
            self.connection = ConnectionHealth::AuthRequired;
        }
        let level = if error.clears_credential() {
            NoticeLevel::Error
        } else {
            NoticeLevel::Warn
        };
        self.notifications.push(now, level, text);
    }

    fn spawn_send(&self, temp_id: MessageId, draft: MessageDraft) {
        let api = Arc::clone(&self.api);
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let result = usecase::send(api.as_ref(), &draft).await;
            let _ = tx.send(SessionMsg::SendResolved { temp_id, result }).await;
        });
    }
}

// ===== Tests =====
