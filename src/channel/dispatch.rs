//! Pure event dispatch: server events applied to the message store.
//!
//! Keeps the socket task free of domain logic. Everything the store can
//! absorb is applied here; session-level events (presence, acks, auth
//! rejections) are handed back untouched for the caller to route.

use tracing::warn;

use crate::model::{ConversationKey, MessageId, UserId};
use crate::repo::MessageStore;
use crate::wire::{conversation_of, normalize_message, ServerEvent};

/// Local-session facts the dispatcher needs to judge an event.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    /// The authenticated user.
    pub local_user: UserId,
    /// Conversation currently on screen, if any.
    pub open_conversation: Option<ConversationKey>,
}

/// What happened to an event.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The store absorbed the event. `unread` names the conversation whose
    /// unread counter should grow, when the message arrived off-screen from
    /// someone else.
    Applied {
        /// Conversation to bump the unread counter for.
        unread: Option<ConversationKey>,
    },
    /// Not a store event; the session routes it (presence, acks, auth).
    Deferred(ServerEvent),
}

/// Apply one server event to the store.
///
/// Malformed payloads are logged and swallowed: a bad frame must never
/// take down the session.
pub fn apply(
    store: &mut MessageStore,
    ctx: &DispatchContext,
    event: ServerEvent,
) -> DispatchOutcome {
    let applied = DispatchOutcome::Applied { unread: None };
    match event {
        ServerEvent::NewMessage(dto) => {
            let message = match normalize_message(&dto, &ctx.local_user) {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, id = %dto.id, "dropping unnormalizable message event");
                    return applied;
                }
            };
            let key = match conversation_of(&dto, &ctx.local_user) {
                Ok(key) => key,
                Err(e) => {
                    warn!(error = %e, id = %dto.id, "message event without conversation");
                    return applied;
                }
            };
            let own = message.sender().id == ctx.local_user;
            let on_screen = ctx.open_conversation.as_ref() == Some(&key);
            let inserted = store.add_confirmed(&key, message);
            let unread = (inserted && !own && !on_screen).then_some(key);
            DispatchOutcome::Applied { unread }
        }
        ServerEvent::MessageUpdated(dto) => {
            match normalize_message(&dto, &ctx.local_user) {
                Ok(newer) => {
                    let id = newer.id().clone();
                    store.update(&id, newer);
                }
                Err(e) => {
                    warn!(error = %e, id = %dto.id, "dropping unnormalizable update event");
                }
            }
            applied
        }
        ServerEvent::MessagePinned {
            message_id,
            is_pinned,
        } => {
            if let Ok(id) = MessageId::new(message_id) {
                store.set_pinned(&id, is_pinned);
            }
            applied
        }
        ServerEvent::MessageRead {
            message_id,
            read_by,
        } => {
            if let Ok(id) = MessageId::new(message_id) {
                for reader in read_by.iter().filter_map(|r| UserId::new(r.clone()).ok()) {
                    store.mark_read(&id, &reader);
                }
            }
            applied
        }
        other @ (ServerEvent::PresenceList(_)
        | ServerEvent::PresenceChanged { .. }
        | ServerEvent::SendAck { .. }
        | ServerEvent::AuthError(_)) => DispatchOutcome::Deferred(other),
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{MessageDto, UserDto};

    fn ctx(open: Option<ConversationKey>) -> DispatchContext {
        DispatchContext {
            local_user: UserId::new("u-1").expect("valid"),
            open_conversation: open,
        }
    }

    fn dto(id: &str, sender: &str) -> MessageDto {
        MessageDto {
            id: id.to_string(),
            sender: UserDto {
                id: sender.to_string(),
                username: Some(format!("name-{sender}")),
                avatar: None,
                status: None,
            },
            receiver: None,
            content: Some("hello".to_string()),
            media_url: None,
            media_type: None,
            media_duration: None,
            created_at: "2026-03-01T12:00:00Z".parse().expect("valid timestamp"),
            updated_at: None,
            is_edited: false,
            is_deleted: false,
            is_pinned: false,
            is_private: false,
            read_by: vec![],
        }
    }

    fn unread_of(outcome: DispatchOutcome) -> Option<ConversationKey> {
        match outcome {
            DispatchOutcome::Applied { unread } => unread,
            DispatchOutcome::Deferred(event) => panic!("unexpected deferral: {event:?}"),
        }
    }

    #[test]
    fn new_message_lands_in_store() {
        let mut store = MessageStore::new();
        let outcome = apply(
            &mut store,
            &ctx(Some(ConversationKey::Shared)),
            ServerEvent::NewMessage(dto("m-1", "u-2")),
        );

        assert!(unread_of(outcome).is_none(), "on-screen arrival is read");
        let list = store.messages(&ConversationKey::Shared);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id().as_str(), "m-1");
    }

    #[test]
    fn off_screen_message_requests_unread_bump() {
        let mut store = MessageStore::new();
        let mut d = dto("m-1", "u-2");
        d.is_private = true;
        let outcome = apply(
            &mut store,
            &ctx(Some(ConversationKey::Shared)),
            ServerEvent::NewMessage(d),
        );

        let peer = UserId::new("u-2").expect("valid");
        assert_eq!(unread_of(outcome), Some(ConversationKey::Private(peer)));
    }

    #[test]
    fn own_echo_never_bumps_unread() {
        let mut store = MessageStore::new();
        let outcome = apply(
            &mut store,
            &ctx(None),
            ServerEvent::NewMessage(dto("m-1", "u-1")),
        );
        assert!(unread_of(outcome).is_none());
    }

    #[test]
    fn duplicate_delivery_does_not_bump_unread_twice() {
        let mut store = MessageStore::new();
        let context = ctx(None);
        let first = apply(
            &mut store,
            &context,
            ServerEvent::NewMessage(dto("m-1", "u-2")),
        );
        let second = apply(
            &mut store,
            &context,
            ServerEvent::NewMessage(dto("m-1", "u-2")),
        );

        assert!(unread_of(first).is_some());
        assert!(unread_of(second).is_none(), "dedup swallows the repeat");
        assert_eq!(store.messages(&ConversationKey::Shared).len(), 1);
    }

    #[test]
    fn update_event_applies_edit_in_place() {
        let mut store = MessageStore::new();
        let context = ctx(None);
        apply(
            &mut store,
            &context,
            ServerEvent::NewMessage(dto("m-1", "u-2")),
        );

        let mut edited = dto("m-1", "u-2");
        edited.content = Some("edited".to_string());
        edited.is_edited = true;
        apply(&mut store, &context, ServerEvent::MessageUpdated(edited));

        let list = store.messages(&ConversationKey::Shared);
        assert_eq!(list[0].content(), Some("edited"));
        assert!(list[0].is_edited());
    }

    #[test]
    fn deletion_arrives_as_update_and_redacts() {
        let mut store = MessageStore::new();
        let context = ctx(None);
        apply(
            &mut store,
            &context,
            ServerEvent::NewMessage(dto("m-1", "u-2")),
        );

        let mut deleted = dto("m-1", "u-2");
        deleted.is_deleted = true;
        apply(&mut store, &context, ServerEvent::MessageUpdated(deleted));

        let list = store.messages(&ConversationKey::Shared);
        assert_eq!(list.len(), 1, "soft delete keeps the entry");
        assert!(list[0].is_deleted());
        assert_eq!(list[0].content(), None);
    }

    #[test]
    fn pin_and_read_events_mutate_by_id() {
        let mut store = MessageStore::new();
        let context = ctx(None);
        apply(
            &mut store,
            &context,
            ServerEvent::NewMessage(dto("m-1", "u-2")),
        );

        apply(
            &mut store,
            &context,
            ServerEvent::MessagePinned {
                message_id: "m-1".to_string(),
                is_pinned: true,
            },
        );
        apply(
            &mut store,
            &context,
            ServerEvent::MessageRead {
                message_id: "m-1".to_string(),
                read_by: vec!["u-9".to_string()],
            },
        );

        let list = store.messages(&ConversationKey::Shared);
        assert!(list[0].is_pinned());
        assert!(list[0].is_read_by(&UserId::new("u-9").expect("valid")));
    }

    #[test]
    fn presence_and_acks_are_deferred() {
        let mut store = MessageStore::new();
        let context = ctx(None);
        let outcome = apply(
            &mut store,
            &context,
            ServerEvent::PresenceChanged {
                user_id: "u-2".to_string(),
                status: "online".to_string(),
            },
        );
        assert!(matches!(outcome, DispatchOutcome::Deferred(_)));
        assert_eq!(store.revision(), 0, "deferred events leave the store alone");
    }

    #[test]
    fn malformed_message_event_is_swallowed() {
        let mut store = MessageStore::new();
        let mut bad = dto("m-1", "u-2");
        bad.media_url = Some("https://cdn.example/x".to_string()); // no media type
        let outcome = apply(&mut store, &ctx(None), ServerEvent::NewMessage(bad));

        assert!(unread_of(outcome).is_none());
        assert!(store.messages(&ConversationKey::Shared).is_empty());
    }
}
