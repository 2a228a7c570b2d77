//! Message reconciler
//!
//! Applies gateway message events and the one-shot history fetch to an
//! ordered, duplicate-free message list for the active channel. Every
//! operation is idempotent: replaying an event after its first application
//! changes nothing.

use chrono::{DateTime, Utc};
use potato_core::{ChannelId, GatewayEvent, Message, MessageEvent, MessageId, Result};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// Loading status of the message view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadState {
    /// No channel active
    #[default]
    Idle,
    /// Channel active, history fetch in flight
    Loading,
    Loaded,
}

/// Ordered message list for the single active channel.
///
/// Messages are kept oldest first. Updates edit in place; creates append;
/// deletes remove.
#[derive(Debug, Default)]
pub struct MessageReconciler {
    channel: Option<ChannelId>,
    messages: Vec<Message>,
    load_state: LoadState,
    /// Deletes for unknown ids seen while loading; filtered out of the seed
    pending_deletes: HashSet<MessageId>,
    /// Bumped on every channel switch so late history results can be told apart
    generation: u64,
}

impl MessageReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_channel(&self) -> Option<&ChannelId> {
        self.channel.as_ref()
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    /// Identifies the current activation; pass it back to [`Self::seed`]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| &m.id == id)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Switch to a channel (or none). Switching away clears everything and
    /// waits for a new seed. Returns `false` if the channel was already active.
    pub fn activate(&mut self, channel: Option<ChannelId>) -> bool {
        if self.channel == channel {
            return false;
        }
        self.clear();
        self.load_state = if channel.is_some() {
            LoadState::Loading
        } else {
            LoadState::Idle
        };
        self.channel = channel;
        self.generation += 1;
        true
    }

    /// Drop all messages and return to the not-yet-loaded state
    pub fn clear(&mut self) {
        self.messages.clear();
        self.pending_deletes.clear();
        self.load_state = LoadState::Idle;
    }

    /// Seed from the history fetch, which lists messages newest first.
    ///
    /// The list is reversed into oldest-first order. Messages created over the
    /// gateway while the fetch was in flight are kept (their live copy wins
    /// over the fetched one); ids deleted meanwhile are dropped. A view is
    /// seeded at most once per activation: results from an earlier
    /// `generation`, or arriving after the view already loaded, are ignored.
    pub fn seed(&mut self, generation: u64, newest_first: Vec<Message>) -> bool {
        if !self.accepts_history(generation) {
            debug!("Ignoring stale history (generation {})", generation);
            return false;
        }

        let mut live = std::mem::take(&mut self.messages);
        let mut seen = HashSet::with_capacity(newest_first.len());
        let mut seeded = Vec::with_capacity(newest_first.len() + live.len());

        for message in newest_first.into_iter().rev() {
            if self.pending_deletes.contains(&message.id) || !seen.insert(message.id.clone()) {
                continue;
            }
            match live.iter().position(|m| m.id == message.id) {
                Some(pos) => seeded.push(live.remove(pos)),
                None => seeded.push(message),
            }
        }
        seeded.extend(live);

        debug!("Seeded view with {} messages", seeded.len());
        self.messages = seeded;
        self.pending_deletes.clear();
        self.load_state = LoadState::Loaded;
        true
    }

    /// Finish loading without a seed (the history fetch failed)
    pub fn mark_loaded(&mut self, generation: u64) -> bool {
        if !self.accepts_history(generation) {
            return false;
        }
        self.pending_deletes.clear();
        self.load_state = LoadState::Loaded;
        true
    }

    fn accepts_history(&self, generation: u64) -> bool {
        generation == self.generation && self.load_state == LoadState::Loading
    }

    /// Apply a gateway event. Returns whether the list changed.
    ///
    /// Non-message events are ignored; a message event whose payload has the
    /// wrong shape is an error.
    pub fn apply(&mut self, event: &GatewayEvent) -> Result<bool> {
        let changed = match MessageEvent::parse(event)? {
            Some(MessageEvent::Create(message)) => self.insert(message),
            Some(MessageEvent::Update { id, content }) => self.update(&id, &content),
            Some(MessageEvent::Delete { id }) => self.remove(&id),
            None => false,
        };
        Ok(changed)
    }

    /// Append a new message unless its id is already known or it belongs to
    /// another channel
    pub fn insert(&mut self, message: Message) -> bool {
        if self.channel.as_ref() != Some(&message.channel_id) {
            debug!(
                "Ignoring message {} for inactive channel {}",
                message.id, message.channel_id
            );
            return false;
        }
        if self.contains(&message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Replace a message's content and stamp it as edited now
    pub fn update(&mut self, id: &MessageId, content: &str) -> bool {
        self.update_at(id, content, Utc::now())
    }

    /// Replace a message's content and stamp it as edited at `edited_at`.
    /// Unknown ids and repeats of an already applied edit are no-ops.
    pub fn update_at(&mut self, id: &MessageId, content: &str, edited_at: DateTime<Utc>) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| &m.id == id) else {
            return false;
        };
        if message.content == content && message.edited_at.is_some() {
            return false;
        }
        message.content = content.to_string();
        message.edited_at = Some(edited_at);
        true
    }

    /// Remove a message; unknown ids are a no-op
    pub fn remove(&mut self, id: &MessageId) -> bool {
        match self.messages.iter().position(|m| &m.id == id) {
            Some(pos) => {
                self.messages.remove(pos);
                true
            }
            None => {
                if self.load_state == LoadState::Loading {
                    self.pending_deletes.insert(id.clone());
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use potato_core::event_types;
    use serde_json::json;

    fn channel() -> ChannelId {
        ChannelId::from("c1")
    }

    fn message(id: &str, minute: u32) -> Message {
        Message {
            id: MessageId::from(id),
            channel_id: channel(),
            author_id: "u1".into(),
            content: format!("message {}", id),
            thread_id: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap(),
            edited_at: None,
        }
    }

    fn loaded() -> MessageReconciler {
        let mut reconciler = MessageReconciler::new();
        reconciler.activate(Some(channel()));
        reconciler.seed(reconciler.generation(), Vec::new());
        reconciler
    }

    fn ids(reconciler: &MessageReconciler) -> Vec<&str> {
        reconciler.messages().iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_seed_reverses_newest_first_history() {
        let mut reconciler = MessageReconciler::new();
        reconciler.activate(Some(channel()));
        assert_eq!(reconciler.load_state(), LoadState::Loading);

        let history = vec![message("m3", 3), message("m2", 2), message("m1", 1)];
        assert!(reconciler.seed(reconciler.generation(), history));

        assert_eq!(ids(&reconciler), vec!["m1", "m2", "m3"]);
        assert_eq!(reconciler.load_state(), LoadState::Loaded);
    }

    #[test]
    fn test_duplicate_creates_do_not_grow_the_list() {
        let mut reconciler = loaded();
        let creates = ["a", "b", "a", "c", "b", "a", "c"];

        for (i, id) in creates.iter().enumerate() {
            reconciler.insert(message(id, i as u32));
        }

        assert_eq!(reconciler.len(), 3);
        assert_eq!(ids(&reconciler), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_update_is_idempotent() {
        let mut reconciler = loaded();
        reconciler.insert(message("m1", 0));
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();

        assert!(reconciler.update_at(&"m1".into(), "hi there", first));
        let after_once = reconciler.messages().to_vec();

        assert!(!reconciler.update_at(&"m1".into(), "hi there", first + Duration::minutes(5)));
        assert_eq!(reconciler.messages(), after_once.as_slice());
        assert_eq!(reconciler.messages()[0].edited_at, Some(first));
    }

    #[test]
    fn test_update_keeps_position() {
        let mut reconciler = loaded();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            reconciler.insert(message(id, i as u32));
        }

        assert!(reconciler.update(&"b".into(), "edited"));
        assert_eq!(ids(&reconciler), vec!["a", "b", "c"]);
        assert!(reconciler.get(&"b".into()).unwrap().is_edited());
    }

    #[test]
    fn test_delete_replay_is_noop() {
        let mut reconciler = loaded();
        reconciler.insert(message("a", 0));
        reconciler.insert(message("b", 1));

        assert!(reconciler.remove(&"a".into()));
        assert!(!reconciler.remove(&"a".into()));
        assert_eq!(ids(&reconciler), vec!["b"]);
    }

    #[test]
    fn test_unknown_ids_never_change_the_list() {
        let mut reconciler = loaded();
        reconciler.insert(message("a", 0));
        let before = reconciler.messages().to_vec();

        assert!(!reconciler.update(&"ghost".into(), "boo"));
        assert!(!reconciler.remove(&"ghost".into()));
        assert_eq!(reconciler.messages(), before.as_slice());
    }

    #[test]
    fn test_creates_for_other_channels_are_ignored() {
        let mut reconciler = loaded();
        let mut other = message("x", 0);
        other.channel_id = ChannelId::from("c2");

        assert!(!reconciler.insert(other));
        assert!(reconciler.is_empty());

        let mut idle = MessageReconciler::new();
        assert!(!idle.insert(message("a", 0)));
    }

    #[test]
    fn test_switching_channel_clears() {
        let mut reconciler = loaded();
        reconciler.insert(message("a", 0));

        assert!(!reconciler.activate(Some(channel())));
        assert_eq!(reconciler.len(), 1);

        assert!(reconciler.activate(Some(ChannelId::from("c2"))));
        assert!(reconciler.is_empty());
        assert_eq!(reconciler.load_state(), LoadState::Loading);

        assert!(reconciler.activate(None));
        assert_eq!(reconciler.load_state(), LoadState::Idle);
        assert_eq!(reconciler.active_channel(), None);
    }

    #[test]
    fn test_stale_seed_is_ignored() {
        let mut reconciler = MessageReconciler::new();
        reconciler.activate(Some(channel()));
        let first = reconciler.generation();
        reconciler.activate(Some(ChannelId::from("c2")));

        assert!(!reconciler.seed(first, vec![message("m1", 1)]));
        assert!(reconciler.is_empty());
        assert_eq!(reconciler.load_state(), LoadState::Loading);
    }

    #[test]
    fn test_view_is_seeded_once_per_activation() {
        let mut reconciler = MessageReconciler::new();
        reconciler.activate(Some(channel()));
        let first = reconciler.generation();
        reconciler.activate(Some(ChannelId::from("c2")));
        reconciler.activate(Some(channel()));
        let current = reconciler.generation();
        assert_ne!(first, current);

        // History fetched for the earlier activation of the same channel
        assert!(!reconciler.seed(first, vec![message("m1", 1)]));
        assert!(reconciler.seed(current, vec![message("m1", 1)]));

        assert!(reconciler.remove(&"m1".into()));
        assert!(!reconciler.seed(current, vec![message("m1", 1)]));
        assert!(!reconciler.mark_loaded(current));
        assert!(reconciler.is_empty());
    }

    #[test]
    fn test_events_during_loading_survive_seed() {
        let mut reconciler = MessageReconciler::new();
        reconciler.activate(Some(channel()));

        // Arrive over the gateway before the history fetch returns
        reconciler.insert(message("m3", 3));
        reconciler.update(&"m3".into(), "fresh");
        reconciler.remove(&"m1".into());
        reconciler.insert(message("m4", 4));

        let mut stale_m3 = message("m3", 3);
        stale_m3.content = "stale".to_string();
        let generation = reconciler.generation();
        reconciler.seed(generation, vec![stale_m3, message("m2", 2), message("m1", 1)]);

        assert_eq!(ids(&reconciler), vec!["m2", "m3", "m4"]);
        assert_eq!(reconciler.get(&"m3".into()).unwrap().content, "fresh");
    }

    #[test]
    fn test_mark_loaded_after_failed_fetch() {
        let mut reconciler = MessageReconciler::new();
        reconciler.activate(Some(channel()));
        let generation = reconciler.generation();
        assert!(!reconciler.mark_loaded(generation + 1));
        assert_eq!(reconciler.load_state(), LoadState::Loading);
        assert!(reconciler.mark_loaded(generation));
        assert_eq!(reconciler.load_state(), LoadState::Loaded);
    }

    #[test]
    fn test_apply_gateway_events() {
        let mut reconciler = loaded();
        let create = GatewayEvent::new(
            event_types::MESSAGE_CREATE,
            json!({
                "id": "m1",
                "channelId": "c1",
                "authorId": "u1",
                "content": "hi",
                "createdAt": "2024-01-01T00:00:00Z",
            }),
        );
        let update = GatewayEvent::new(
            event_types::MESSAGE_UPDATE,
            json!({ "id": "m1", "content": "hi there" }),
        );
        let delete = GatewayEvent::new(event_types::MESSAGE_DELETE, json!({ "id": "m1" }));
        let typing = GatewayEvent::new(event_types::TYPING_START, json!({ "user_id": "u2" }));

        assert!(reconciler.apply(&create).unwrap());
        assert!(!reconciler.apply(&create).unwrap());
        assert!(!reconciler.apply(&typing).unwrap());

        assert!(reconciler.apply(&update).unwrap());
        assert!(!reconciler.apply(&update).unwrap());
        assert_eq!(reconciler.messages()[0].content, "hi there");
        assert!(reconciler.messages()[0].is_edited());

        assert!(reconciler.apply(&delete).unwrap());
        assert!(!reconciler.apply(&delete).unwrap());
        assert!(reconciler.is_empty());

        let malformed = GatewayEvent::new(event_types::MESSAGE_UPDATE, json!({"id":"m1"}));
        assert!(reconciler.apply(&malformed).is_err());
    }
}
