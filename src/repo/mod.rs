//! Message repository: the single authoritative store of timelines.
//!
//! One ordered message list per conversation plus a pending-operation table
//! for optimistic sends. All mutation goes through named methods so the
//! invariants live in one place:
//!
//! - ids are unique within a conversation at all times (dedup on insert);
//! - a temporary id stays in the pending table until exactly one of
//!   finalize/fail resolves it;
//! - when a confirmed twin of an optimistic send arrives first (channel echo
//!   winning the race), the temp entry is dropped, never duplicated;
//! - soft-deleted messages keep their list position, only the payload is
//!   redacted.
//!
//! Mutations are synchronous and total: absent ids are no-ops, nothing
//! panics. Reads hand out `Arc`s that stay referentially stable until the
//! conversation actually changes, and a revision watch channel notifies
//! subscribers after every effective mutation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::debug;

use crate::model::{ConversationKey, Lifecycle, Message, MessageId, UserId};

/// Authoritative per-conversation message store.
#[derive(Debug)]
pub struct MessageStore {
    conversations: HashMap<ConversationKey, Arc<Vec<Message>>>,
    pending: HashMap<MessageId, ConversationKey>,
    revision: u64,
    revision_tx: watch::Sender<u64>,
    empty: Arc<Vec<Message>>,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            conversations: HashMap::new(),
            pending: HashMap::new(),
            revision: 0,
            revision_tx,
            empty: Arc::new(Vec::new()),
        }
    }

    /// Subscribe to revision bumps. The value is the revision counter;
    /// every effective mutation advances it exactly once.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }

    /// Current revision counter.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Ordered messages of one conversation.
    ///
    /// Returns the same `Arc` as the previous call when the conversation has
    /// not changed in between, so downstream layers can memoize on pointer
    /// identity.
    pub fn messages(&self, key: &ConversationKey) -> Arc<Vec<Message>> {
        self.conversations
            .get(key)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.empty))
    }

    /// Whether a conversation currently holds the given id.
    pub fn contains(&self, key: &ConversationKey, id: &MessageId) -> bool {
        self.conversations
            .get(key)
            .is_some_and(|list| list.iter().any(|m| m.id() == id))
    }

    /// Whether a temp id is still awaiting finalize/fail.
    pub fn is_pending(&self, temp_id: &MessageId) -> bool {
        self.pending.contains_key(temp_id)
    }

    // ===== Hydration =====

    /// Replace a conversation's list wholesale (post-fetch hydration).
    ///
    /// Every entry is marked confirmed; pending operations that belonged to
    /// this conversation are dropped, since their optimistic entries no
    /// longer exist.
    pub fn set_messages(&mut self, key: &ConversationKey, mut list: Vec<Message>) {
        for message in &mut list {
            message.set_lifecycle(Lifecycle::Confirmed);
        }
        self.pending.retain(|_, pending_key| pending_key != key);
        self.conversations.insert(key.clone(), Arc::new(list));
        self.bump();
    }

    // ===== Inserts =====

    /// Insert a confirmed message if its id is absent.
    ///
    /// Idempotent merge point for channel-delivered events: a second
    /// delivery of the same id is a no-op. Returns whether the list changed.
    pub fn add_confirmed(&mut self, key: &ConversationKey, message: Message) -> bool {
        if self.contains(key, message.id()) {
            debug!(id = %message.id(), "duplicate confirmed insert ignored");
            return false;
        }
        let list = self.list_mut(key);
        let at = list.partition_point(|m| m.created_at() <= message.created_at());
        list.insert(at, message);
        self.bump();
        true
    }

    /// Append an optimistic entry and register it in the pending table.
    pub fn add_optimistic(&mut self, key: &ConversationKey, message: Message) {
        debug_assert!(message.id().is_local(), "optimistic entries carry temp ids");
        self.pending.insert(message.id().clone(), key.clone());
        self.list_mut(key).push(message);
        self.bump();
    }

    // ===== Pending resolution =====

    /// Resolve an optimistic send with the server-confirmed message.
    ///
    /// If a confirmed entry with the same server id already exists (the
    /// channel echo won the race), the temp entry is dropped; otherwise the
    /// temp entry is replaced in place, preserving its position. Identity
    /// wins, not arrival order.
    pub fn finalize(&mut self, temp_id: &MessageId, confirmed: Message) {
        let Some(key) = self.pending.remove(temp_id) else {
            debug!(%temp_id, "finalize for unknown pending entry ignored");
            return;
        };
        let echo_arrived = self.contains(&key, confirmed.id());
        let list = self.list_mut(&key);
        let Some(position) = list.iter().position(|m| m.id() == temp_id) else {
            self.bump();
            return;
        };
        if echo_arrived {
            list.remove(position);
        } else {
            list[position] = confirmed;
        }
        self.bump();
    }

    /// Mark an optimistic send as failed, in place and still visible, and
    /// drop it from the pending table so a later finalize cannot race it.
    pub fn fail(&mut self, temp_id: &MessageId) {
        let Some(key) = self.pending.remove(temp_id) else {
            return;
        };
        let list = self.list_mut(&key);
        if let Some(message) = list.iter_mut().find(|m| m.id() == temp_id) {
            message.set_lifecycle(Lifecycle::Failed);
        }
        self.bump();
    }

    /// Move a failed entry back to optimistic for a retry.
    ///
    /// Returns a clone of the entry so the caller can re-issue the REST
    /// call; `None` when no failed entry with this id exists.
    pub fn retry(&mut self, temp_id: &MessageId) -> Option<Message> {
        let (key, snapshot) = self.conversations.iter_mut().find_map(|(key, list)| {
            let list = Arc::make_mut(list);
            let message = list
                .iter_mut()
                .find(|m| m.id() == temp_id && m.lifecycle() == Lifecycle::Failed)?;
            message.set_lifecycle(Lifecycle::Optimistic);
            Some((key.clone(), message.clone()))
        })?;
        self.pending.insert(temp_id.clone(), key);
        self.bump();
        Some(snapshot)
    }

    // ===== Id-addressed mutations (conversation-independent) =====

    /// Overwrite the entry for `id` with a newer server DTO, wherever it
    /// currently lives. Position is preserved.
    pub fn update(&mut self, id: &MessageId, newer: Message) {
        let mut changed = false;
        for list in self.conversations.values_mut() {
            let list = Arc::make_mut(list);
            if let Some(message) = list.iter_mut().find(|m| m.id() == id) {
                message.apply_update(newer.clone());
                changed = true;
            }
        }
        if changed {
            self.bump();
        }
    }

    /// Hard-remove an entry. Soft deletes go through [`Self::mark_deleted`].
    pub fn remove(&mut self, id: &MessageId) {
        let mut changed = false;
        for list in self.conversations.values_mut() {
            let list = Arc::make_mut(list);
            let before = list.len();
            list.retain(|m| m.id() != id);
            changed |= list.len() != before;
        }
        if changed {
            self.bump();
        }
    }

    /// Soft delete: redact the payload, keep the entry and its position.
    pub fn mark_deleted(&mut self, id: &MessageId) {
        let now = Utc::now();
        let mut changed = false;
        for list in self.conversations.values_mut() {
            let list = Arc::make_mut(list);
            if let Some(message) = list.iter_mut().find(|m| m.id() == id) {
                message.redact(now);
                changed = true;
            }
        }
        if changed {
            self.bump();
        }
    }

    /// Record one reader's receipt. The sender's own receipt is ignored by
    /// the message itself.
    pub fn mark_read(&mut self, id: &MessageId, reader: &UserId) {
        let mut changed = false;
        for list in self.conversations.values_mut() {
            let list = Arc::make_mut(list);
            if let Some(message) = list.iter_mut().find(|m| m.id() == id) {
                changed |= message.add_reader(reader.clone());
            }
        }
        if changed {
            self.bump();
        }
    }

    /// Toggle the pinned flag for an id.
    pub fn set_pinned(&mut self, id: &MessageId, pinned: bool) {
        let mut changed = false;
        for list in self.conversations.values_mut() {
            let list = Arc::make_mut(list);
            if let Some(message) = list.iter_mut().find(|m| m.id() == id) {
                changed |= message.set_pinned(pinned);
            }
        }
        if changed {
            self.bump();
        }
    }

    // ===== Internals =====

    fn list_mut(&mut self, key: &ConversationKey) -> &mut Vec<Message> {
        Arc::make_mut(
            self.conversations
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Vec::new())),
        )
    }

    fn bump(&mut self) {
        self.revision += 1;
        let _ = self.revision_tx.send_replace(self.revision);
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserRef;

    fn user(id: &str) -> UserRef {
        UserRef::new(UserId::new(id).expect("valid user id"), format!("name-{id}"))
    }

    fn confirmed(id: &str, text: &str, minute: u32) -> Message {
        let ts = format!("2026-03-01T12:{minute:02}:00Z")
            .parse()
            .expect("valid timestamp");
        Message::confirmed(
            MessageId::new(id).expect("valid message id"),
            ConversationKey::Shared,
            user("u-2"),
            None,
            Some(text.to_string()),
            None,
            ts,
            ts,
        )
    }

    fn optimistic(seq: u64, text: &str) -> Message {
        Message::optimistic(
            MessageId::temp(seq),
            ConversationKey::Shared,
            user("u-1"),
            None,
            Some(text.to_string()),
            None,
        )
    }

    fn id(raw: &str) -> MessageId {
        MessageId::new(raw).expect("valid message id")
    }

    #[test]
    fn set_messages_replaces_wholesale_and_confirms() {
        let mut store = MessageStore::new();
        store.add_optimistic(&ConversationKey::Shared, optimistic(1, "draft"));

        store.set_messages(
            &ConversationKey::Shared,
            vec![confirmed("m-1", "a", 0), confirmed("m-2", "b", 1)],
        );

        let list = store.messages(&ConversationKey::Shared);
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|m| m.lifecycle() == Lifecycle::Confirmed));
        assert!(
            !store.is_pending(&MessageId::temp(1)),
            "hydration drops pending entries for the conversation"
        );
    }

    #[test]
    fn add_confirmed_is_idempotent_by_id() {
        let mut store = MessageStore::new();
        assert!(store.add_confirmed(&ConversationKey::Shared, confirmed("m-1", "a", 0)));
        assert!(!store.add_confirmed(&ConversationKey::Shared, confirmed("m-1", "again", 0)));

        let list = store.messages(&ConversationKey::Shared);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].content(), Some("a"), "first insert wins");
    }

    #[test]
    fn add_confirmed_inserts_in_timestamp_order() {
        let mut store = MessageStore::new();
        store.add_confirmed(&ConversationKey::Shared, confirmed("m-1", "a", 0));
        store.add_confirmed(&ConversationKey::Shared, confirmed("m-3", "c", 10));
        store.add_confirmed(&ConversationKey::Shared, confirmed("m-2", "b", 5));

        let list = store.messages(&ConversationKey::Shared);
        let ids: Vec<&str> = list.iter().map(|m| m.id().as_str()).collect();
        assert_eq!(ids, vec!["m-1", "m-2", "m-3"]);
    }

    #[test]
    fn finalize_replaces_temp_in_place_when_rest_wins() {
        let mut store = MessageStore::new();
        store.set_messages(
            &ConversationKey::Shared,
            vec![confirmed("m-1", "a", 0), confirmed("m-2", "b", 1)],
        );
        store.add_optimistic(&ConversationKey::Shared, optimistic(1, "hello"));

        store.finalize(&MessageId::temp(1), confirmed("m-3", "hello", 2));

        let list = store.messages(&ConversationKey::Shared);
        let ids: Vec<_> = list.iter().map(|m| m.id().as_str()).collect();
        assert_eq!(ids, vec!["m-1", "m-2", "m-3"]);
        assert!(!store.is_pending(&MessageId::temp(1)));
    }

    #[test]
    fn finalize_drops_temp_when_channel_echo_won() {
        let mut store = MessageStore::new();
        store.set_messages(&ConversationKey::Shared, vec![confirmed("m-1", "a", 0)]);
        store.add_optimistic(&ConversationKey::Shared, optimistic(1, "hello"));

        // Channel echo lands before the REST response.
        store.add_confirmed(&ConversationKey::Shared, confirmed("m-3", "hello", 2));
        store.finalize(&MessageId::temp(1), confirmed("m-3", "hello", 2));

        let list = store.messages(&ConversationKey::Shared);
        let m3_count = list.iter().filter(|m| m.id() == &id("m-3")).count();
        assert_eq!(m3_count, 1, "exactly one entry for the server id");
        assert!(!list.iter().any(|m| m.id().is_local()), "temp entry dropped");
    }

    #[test]
    fn finalize_for_unknown_temp_is_a_noop() {
        let mut store = MessageStore::new();
        store.set_messages(&ConversationKey::Shared, vec![confirmed("m-1", "a", 0)]);
        let revision = store.revision();

        store.finalize(&MessageId::temp(99), confirmed("m-9", "x", 3));

        assert_eq!(store.revision(), revision, "no-op must not bump revision");
    }

    #[test]
    fn fail_keeps_entry_visible_with_failed_lifecycle() {
        let mut store = MessageStore::new();
        store.add_optimistic(&ConversationKey::Shared, optimistic(1, "hello"));

        store.fail(&MessageId::temp(1));

        let list = store.messages(&ConversationKey::Shared);
        assert_eq!(list.len(), 1, "failed entry is not removed");
        assert_eq!(list[0].lifecycle(), Lifecycle::Failed);
        assert!(!store.is_pending(&MessageId::temp(1)));
    }

    #[test]
    fn retry_moves_failed_back_to_optimistic() {
        let mut store = MessageStore::new();
        store.add_optimistic(&ConversationKey::Shared, optimistic(1, "hello"));
        store.fail(&MessageId::temp(1));

        let snapshot = store.retry(&MessageId::temp(1)).expect("retry should find entry");

        assert_eq!(snapshot.content(), Some("hello"));
        assert!(store.is_pending(&MessageId::temp(1)));
        let list = store.messages(&ConversationKey::Shared);
        assert_eq!(list[0].lifecycle(), Lifecycle::Optimistic);
    }

    #[test]
    fn retry_of_non_failed_entry_returns_none() {
        let mut store = MessageStore::new();
        store.add_optimistic(&ConversationKey::Shared, optimistic(1, "hello"));
        assert!(store.retry(&MessageId::temp(1)).is_none());
    }

    #[test]
    fn soft_delete_retains_position_and_length() {
        let mut store = MessageStore::new();
        store.set_messages(
            &ConversationKey::Shared,
            vec![
                confirmed("m-1", "a", 0),
                confirmed("m-2", "b", 1),
                confirmed("m-3", "c", 2),
            ],
        );

        store.mark_deleted(&id("m-2"));

        let list = store.messages(&ConversationKey::Shared);
        assert_eq!(list.len(), 3, "length unchanged");
        assert_eq!(list[1].id(), &id("m-2"), "position unchanged");
        assert!(list[1].is_deleted());
        assert_eq!(list[1].content(), None, "content redacted");
        assert_eq!(list[1].media(), None, "media cleared");
    }

    #[test]
    fn mark_read_is_idempotent_and_skips_sender() {
        let mut store = MessageStore::new();
        store.set_messages(&ConversationKey::Shared, vec![confirmed("m-1", "a", 0)]);
        let reader = UserId::new("u-9").expect("valid");
        let sender = UserId::new("u-2").expect("valid");

        store.mark_read(&id("m-1"), &reader);
        let after_first = store.revision();
        store.mark_read(&id("m-1"), &reader);
        store.mark_read(&id("m-1"), &sender);

        assert_eq!(store.revision(), after_first, "repeat receipts do not bump");
        let list = store.messages(&ConversationKey::Shared);
        assert!(list[0].is_read_by(&reader));
        assert!(!list[0].is_read_by(&sender));
    }

    #[test]
    fn set_pinned_toggles_by_id() {
        let mut store = MessageStore::new();
        store.set_messages(&ConversationKey::Shared, vec![confirmed("m-1", "a", 0)]);

        store.set_pinned(&id("m-1"), true);
        assert!(store.messages(&ConversationKey::Shared)[0].is_pinned());

        store.set_pinned(&id("m-1"), false);
        assert!(!store.messages(&ConversationKey::Shared)[0].is_pinned());
    }

    #[test]
    fn update_applies_wherever_the_id_lives() {
        let mut store = MessageStore::new();
        store.set_messages(&ConversationKey::Shared, vec![confirmed("m-1", "old", 0)]);

        let mut newer = confirmed("m-1", "new", 0);
        newer = newer.with_flags(true, false, false);
        store.update(&id("m-1"), newer);

        let list = store.messages(&ConversationKey::Shared);
        assert_eq!(list[0].content(), Some("new"));
        assert!(list[0].is_edited());
    }

    #[test]
    fn absent_id_mutations_are_total_noops() {
        let mut store = MessageStore::new();
        store.set_messages(&ConversationKey::Shared, vec![confirmed("m-1", "a", 0)]);
        let revision = store.revision();

        store.mark_deleted(&id("m-404"));
        store.set_pinned(&id("m-404"), true);
        store.mark_read(&id("m-404"), &UserId::new("u-9").expect("valid"));
        store.remove(&id("m-404"));
        store.fail(&MessageId::temp(404));

        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn reads_are_referentially_stable_until_mutation() {
        let mut store = MessageStore::new();
        store.set_messages(&ConversationKey::Shared, vec![confirmed("m-1", "a", 0)]);

        let first = store.messages(&ConversationKey::Shared);
        let second = store.messages(&ConversationKey::Shared);
        assert!(Arc::ptr_eq(&first, &second), "unchanged reads share the Arc");

        store.add_confirmed(&ConversationKey::Shared, confirmed("m-2", "b", 1));
        let third = store.messages(&ConversationKey::Shared);
        assert!(!Arc::ptr_eq(&first, &third), "mutation produces a new Arc");
    }

    #[test]
    fn revision_watch_notifies_subscribers() {
        let mut store = MessageStore::new();
        let rx = store.subscribe();

        store.add_confirmed(&ConversationKey::Shared, confirmed("m-1", "a", 0));

        assert_eq!(*rx.borrow(), store.revision());
        assert!(store.revision() > 0);
    }
}
