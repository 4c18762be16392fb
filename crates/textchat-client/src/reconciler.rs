//! Chat Reconciler.
//!
//! Merges fetched history, realtime events and the local user's own sends
//! into one visible message list. The list never holds two entries with the
//! same id and is kept sorted by `created_at`, then `id`.

use tracing::debug;

use textchat_shared::{ChatMessage, RealtimeEvent, UserId};

#[derive(Debug, Clone)]
pub struct ChatReconciler {
    local_user: UserId,
    messages: Vec<ChatMessage>,
}

impl ChatReconciler {
    /// Seed from a history page (oldest to newest).
    pub fn new(local_user: UserId, history: Vec<ChatMessage>) -> Self {
        let mut reconciler = Self {
            local_user,
            messages: Vec::with_capacity(history.len()),
        };
        reconciler.merge_history(history);
        reconciler
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn local_user(&self) -> &UserId {
        &self.local_user
    }

    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.position(id).map(|i| &self.messages[i])
    }

    /// Fold one realtime event into the list. Returns whether it changed.
    pub fn apply(&mut self, event: RealtimeEvent) -> bool {
        match event {
            RealtimeEvent::NewMessage(message) => {
                // Own sends were already recorded from the send response.
                if message.sender_id == self.local_user || self.position(&message.id).is_some() {
                    debug!(id = %message.id, "ignoring redundant new_message");
                    return false;
                }
                self.insert_sorted(message);
                true
            }
            RealtimeEvent::MessageEdited(message) => match self.position(&message.id) {
                Some(i) => {
                    self.messages.remove(i);
                    self.insert_sorted(message);
                    true
                }
                None => {
                    debug!(id = %message.id, "edit for a message outside the loaded window");
                    false
                }
            },
            RealtimeEvent::MessageDeleted(deleted) => match self.position(&deleted.message_id) {
                Some(i) => {
                    self.messages.remove(i);
                    true
                }
                None => false,
            },
        }
    }

    /// Record the server's copy of a message the local user just sent.
    pub fn record_sent(&mut self, message: ChatMessage) {
        self.upsert(message);
    }

    /// Merge an older (or overlapping) history page.
    pub fn merge_history(&mut self, page: Vec<ChatMessage>) {
        for message in page {
            self.upsert(message);
        }
    }

    fn upsert(&mut self, message: ChatMessage) {
        if let Some(i) = self.position(&message.id) {
            self.messages.remove(i);
        }
        self.insert_sorted(message);
    }

    fn insert_sorted(&mut self, message: ChatMessage) {
        let at = self
            .messages
            .partition_point(|m| ChatMessage::chronological(m, &message).is_lt());
        self.messages.insert(at, message);
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use textchat_shared::{DeletedMessage, MessageType};

    use super::*;

    const ME: i64 = 1;
    const THEM: i64 = 2;

    fn msg(id: &str, sender: i64, secs: i64) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            conversation_id: "c1".into(),
            sender_id: UserId::from(sender),
            content: format!("content of {id}"),
            kind: MessageType::Text,
            file_url: None,
            file_name: None,
            file_size: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + Duration::seconds(secs),
            updated_at: None,
            edited: false,
            sender: None,
        }
    }

    fn ids(r: &ChatReconciler) -> Vec<&str> {
        r.messages().iter().map(|m| m.id.as_str()).collect()
    }

    fn reconciler(history: Vec<ChatMessage>) -> ChatReconciler {
        ChatReconciler::new(UserId::from(ME), history)
    }

    #[test]
    fn remote_message_is_appended_in_order() {
        let mut r = reconciler(vec![msg("m1", ME, 1), msg("m2", THEM, 2)]);
        assert!(r.apply(RealtimeEvent::NewMessage(msg("m3", THEM, 3))));
        assert_eq!(ids(&r), ["m1", "m2", "m3"]);
    }

    #[test]
    fn duplicate_new_message_is_ignored() {
        let mut r = reconciler(vec![msg("m1", THEM, 1), msg("m2", THEM, 2)]);
        assert!(!r.apply(RealtimeEvent::NewMessage(msg("m2", THEM, 2))));
        assert_eq!(ids(&r), ["m1", "m2"]);
    }

    #[test]
    fn echo_of_own_send_is_ignored() {
        let mut r = reconciler(vec![msg("m1", THEM, 1)]);
        r.record_sent(msg("m2", ME, 2));
        assert!(!r.apply(RealtimeEvent::NewMessage(msg("m2", ME, 2))));
        // Own messages only ever come from the send response.
        assert!(!r.apply(RealtimeEvent::NewMessage(msg("m9", ME, 9))));
        assert_eq!(ids(&r), ["m1", "m2"]);
    }

    #[test]
    fn late_arrival_is_placed_by_time() {
        let mut r = reconciler(vec![msg("m1", THEM, 1), msg("m3", THEM, 3)]);
        r.apply(RealtimeEvent::NewMessage(msg("m2", THEM, 2)));
        assert_eq!(ids(&r), ["m1", "m2", "m3"]);
    }

    #[test]
    fn same_timestamp_orders_by_id() {
        let r = reconciler(vec![msg("b", THEM, 1), msg("a", THEM, 1), msg("c", THEM, 0)]);
        assert_eq!(ids(&r), ["c", "a", "b"]);
    }

    #[test]
    fn edit_replaces_in_place() {
        let mut r = reconciler(vec![msg("m1", THEM, 1), msg("m2", THEM, 2)]);
        let mut edited = msg("m1", THEM, 1);
        edited.content = "fixed typo".into();
        edited.edited = true;

        assert!(r.apply(RealtimeEvent::MessageEdited(edited)));
        assert_eq!(ids(&r), ["m1", "m2"]);
        let m1 = r.get("m1").unwrap();
        assert_eq!(m1.content, "fixed typo");
        assert!(m1.edited);
    }

    #[test]
    fn edit_outside_window_is_dropped() {
        let mut r = reconciler(vec![msg("m1", THEM, 1)]);
        assert!(!r.apply(RealtimeEvent::MessageEdited(msg("m0", THEM, 0))));
        assert_eq!(ids(&r), ["m1"]);
    }

    #[test]
    fn delete_removes_and_missing_delete_is_noop() {
        let mut r = reconciler(vec![msg("m1", THEM, 1), msg("m2", THEM, 2)]);
        let before = r.messages().to_vec();

        assert!(!r.apply(RealtimeEvent::MessageDeleted(DeletedMessage {
            message_id: "nope".into()
        })));
        assert_eq!(r.messages(), before.as_slice());

        assert!(r.apply(RealtimeEvent::MessageDeleted(DeletedMessage {
            message_id: "m1".into()
        })));
        assert_eq!(ids(&r), ["m2"]);
    }

    #[test]
    fn older_page_merges_without_duplicates() {
        let mut r = reconciler(vec![msg("m3", THEM, 3), msg("m4", THEM, 4)]);
        r.merge_history(vec![msg("m1", THEM, 1), msg("m2", ME, 2), msg("m3", THEM, 3)]);
        assert_eq!(ids(&r), ["m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn duplicate_ids_in_seed_collapse() {
        let r = reconciler(vec![msg("m1", THEM, 1), msg("m1", THEM, 1)]);
        assert_eq!(r.len(), 1);
    }
}
