//! Per-room chat with an in-memory history ring
//!
//! Each room keeps its most recent messages (capped) and replays them to
//! joining clients. Nothing is persisted; when the last chat client
//! leaves a room, its history is dropped with it.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use relaycast_core::{ClientId, RoomId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::debug;

/// Messages a room remembers and replays on join
pub const HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub client_id: ClientId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    #[must_use]
    pub fn new(client_id: ClientId, text: String) -> Self {
        Self {
            client_id,
            text,
            timestamp: Utc::now(),
        }
    }
}

struct ChatSubscriber {
    client_id: ClientId,
    sender: mpsc::UnboundedSender<ChatMessage>,
}

/// Chat fan-out and history for all rooms
pub struct ChatChannel {
    history: DashMap<RoomId, VecDeque<ChatMessage>>,
    subscribers: DashMap<RoomId, Vec<ChatSubscriber>>,
}

impl ChatChannel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: DashMap::new(),
            subscribers: DashMap::new(),
        }
    }

    /// Register a chat client. Returns its id, the receiving half of its
    /// message channel, and the room history oldest-first.
    pub fn join(&self, room_id: &RoomId) -> (ClientId, mpsc::UnboundedReceiver<ChatMessage>, Vec<ChatMessage>) {
        let client_id = ClientId::new();
        let (tx, rx) = mpsc::unbounded_channel();

        self.subscribers
            .entry(room_id.clone())
            .or_default()
            .push(ChatSubscriber {
                client_id: client_id.clone(),
                sender: tx,
            });

        let replay = self.history(room_id);

        debug!(
            room_id = %room_id,
            client_id = %client_id,
            replayed = replay.len(),
            "Chat client joined"
        );

        (client_id, rx, replay)
    }

    /// Append a message to the room's ring and fan it out to every
    /// subscriber, the sender included.
    pub fn say(&self, room_id: &RoomId, client_id: &ClientId, text: String) -> ChatMessage {
        let message = ChatMessage::new(client_id.clone(), text);

        {
            let mut ring = self.history.entry(room_id.clone()).or_default();
            ring.push_back(message.clone());
            while ring.len() > HISTORY_LIMIT {
                ring.pop_front();
            }
        }

        if let Some(mut subscribers) = self.subscribers.get_mut(room_id) {
            let mut failed: Vec<ClientId> = Vec::new();
            for subscriber in subscribers.iter() {
                if subscriber.sender.send(message.clone()).is_err() {
                    failed.push(subscriber.client_id.clone());
                }
            }
            if !failed.is_empty() {
                subscribers.retain(|s| !failed.contains(&s.client_id));
            }
        }

        message
    }

    /// Remove a chat client. The room's history is dropped together with
    /// its last subscriber.
    pub fn leave(&self, room_id: &RoomId, client_id: &ClientId) {
        let emptied = {
            let Some(mut subscribers) = self.subscribers.get_mut(room_id) else {
                return;
            };
            subscribers.retain(|s| s.client_id != *client_id);
            subscribers.is_empty()
        };

        if emptied {
            self.subscribers.remove(room_id);
            self.history.remove(room_id);
            debug!(room_id = %room_id, "Last chat client left, history dropped");
        }
    }

    /// Room history snapshot, oldest first
    #[must_use]
    pub fn history(&self, room_id: &RoomId) -> Vec<ChatMessage> {
        self.history
            .get(room_id)
            .map_or_else(Vec::new, |ring| ring.iter().cloned().collect())
    }

    #[must_use]
    pub fn subscriber_count(&self, room_id: &RoomId) -> usize {
        self.subscribers.get(room_id).map_or(0, |subs| subs.len())
    }
}

impl Default for ChatChannel {
    fn default() -> Self {
        Self::new()
    }
}
