//! Per-room signaling hub
//!
//! Owns every signaling connection, assigns roles, and routes messages.
//! One subscriber per connected client; point-to-point kinds are relayed
//! to their `to` recipient, broadcast kinds go to the whole room.
//! Delivery is best-effort: an unroutable target is dropped silently and
//! subscribers whose channel has closed are pruned on the next send.

use crate::message::{Role, SignalingMessage};
use dashmap::DashMap;
use relaycast_core::{ClientId, RoomId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// A connected signaling client
pub struct Subscriber {
    pub client_id: ClientId,
    pub role: Role,
    sender: mpsc::UnboundedSender<SignalingMessage>,
}

/// Routes signaling messages between clients in the same room
pub struct SignalingHub {
    /// Room ID -> list of subscribers in that room
    rooms: Arc<DashMap<RoomId, Vec<Subscriber>>>,
    /// Client ID -> room it belongs to (for reverse lookup)
    connections: Arc<DashMap<ClientId, RoomId>>,
}

impl SignalingHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            connections: Arc::new(DashMap::new()),
        }
    }

    /// Register a new client in a room and assign its role.
    ///
    /// The first joiner of a room with no live broadcaster becomes the
    /// Broadcaster; everyone else is a Viewer. Returns the generated
    /// client id, the assigned role, and the receiving half of the
    /// client's message channel.
    ///
    /// Side effects: the broadcaster is told about a joining viewer via
    /// `new_viewer`, and the updated `viewer_count` is broadcast to the
    /// whole room.
    pub fn join(&self, room_id: &RoomId) -> (ClientId, Role, mpsc::UnboundedReceiver<SignalingMessage>) {
        let client_id = ClientId::new();
        let (tx, rx) = mpsc::unbounded_channel();

        let role = {
            let mut subscribers = self.rooms.entry(room_id.clone()).or_default();

            let has_live_broadcaster = subscribers
                .iter()
                .any(|s| s.role.is_broadcaster() && !s.sender.is_closed());

            let role = if has_live_broadcaster {
                Role::Viewer
            } else {
                Role::Broadcaster
            };

            subscribers.push(Subscriber {
                client_id: client_id.clone(),
                role,
                sender: tx,
            });
            role
        };

        self.connections.insert(client_id.clone(), room_id.clone());

        debug!(
            room_id = %room_id,
            client_id = %client_id,
            role = %role,
            "Client joined room"
        );

        if role == Role::Viewer {
            if let Some(broadcaster) = self.broadcaster_id(room_id) {
                self.send_to(
                    room_id,
                    &broadcaster,
                    SignalingMessage::NewViewer {
                        viewer_id: client_id.clone(),
                    },
                );
            }
        }

        self.broadcast(
            room_id,
            &SignalingMessage::ViewerCount {
                count: self.viewer_count(room_id),
            },
        );

        (client_id, role, rx)
    }

    /// Remove a client from a room.
    ///
    /// A leaving broadcaster ends the broadcast: every remaining client
    /// receives `broadcast_ended` followed by a zeroed `viewer_count`.
    /// A leaving viewer only triggers a `viewer_count` update.
    pub fn leave(&self, room_id: &RoomId, client_id: &ClientId) {
        let removed_role = {
            let Some(mut subscribers) = self.rooms.get_mut(room_id) else {
                self.connections.remove(client_id);
                return;
            };

            let before = subscribers.len();
            let mut role = None;
            subscribers.retain(|s| {
                if s.client_id == *client_id {
                    role = Some(s.role);
                    false
                } else {
                    true
                }
            });

            if subscribers.len() == before {
                drop(subscribers);
                self.connections.remove(client_id);
                return;
            }

            if subscribers.is_empty() {
                // Drop the mutable ref before removing the entry
                drop(subscribers);
                self.rooms.remove(room_id);
            }
            role
        };

        self.connections.remove(client_id);

        debug!(room_id = %room_id, client_id = %client_id, "Client left room");

        if removed_role == Some(Role::Broadcaster) {
            self.broadcast(room_id, &SignalingMessage::BroadcastEnded);
        }
        self.broadcast(
            room_id,
            &SignalingMessage::ViewerCount {
                count: self.viewer_count(room_id),
            },
        );
    }

    /// Relay a point-to-point message to its `to` recipient.
    ///
    /// The claimed `from` is overwritten with the real sender id before
    /// delivery. Returns false when the target is unknown or gone; the
    /// message is dropped in that case.
    pub fn relay(&self, room_id: &RoomId, sender: &ClientId, mut message: SignalingMessage) -> bool {
        message.set_from(sender.clone());

        let Some(target) = message.target().cloned() else {
            trace!(
                room_id = %room_id,
                message_type = message.message_type(),
                "Relay called with a broadcast-kind message, ignoring"
            );
            return false;
        };

        let delivered = self.send_to(room_id, &target, message);
        if !delivered {
            trace!(
                room_id = %room_id,
                target = %target,
                "Dropping message for unknown target"
            );
        }
        delivered
    }

    /// Send a message to one client in a room. Returns false if the
    /// client is not subscribed or its channel has closed.
    pub fn send_to(&self, room_id: &RoomId, client_id: &ClientId, message: SignalingMessage) -> bool {
        let Some(mut subscribers) = self.rooms.get_mut(room_id) else {
            return false;
        };

        let Some(subscriber) = subscribers.iter().find(|s| s.client_id == *client_id) else {
            return false;
        };

        if subscriber.sender.send(message).is_ok() {
            true
        } else {
            // Receiver dropped without a clean leave, prune it
            subscribers.retain(|s| s.client_id != *client_id);
            false
        }
    }

    /// Broadcast a message to every client in a room.
    ///
    /// Subscribers whose channel has closed are pruned afterwards.
    /// Returns the number of clients the message was delivered to.
    pub fn broadcast(&self, room_id: &RoomId, message: &SignalingMessage) -> usize {
        let Some(mut subscribers) = self.rooms.get_mut(room_id) else {
            return 0;
        };

        let mut failed: Vec<ClientId> = Vec::new();
        let mut delivered = 0;

        for subscriber in subscribers.iter() {
            if subscriber.sender.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                failed.push(subscriber.client_id.clone());
            }
        }

        if !failed.is_empty() {
            subscribers.retain(|s| !failed.contains(&s.client_id));
        }

        delivered
    }

    /// Number of viewers watching a live broadcast.
    ///
    /// Zero when the room has no live broadcaster, whatever the number
    /// of connected clients: the count measures the audience of an
    /// active broadcast, not raw connections.
    #[must_use]
    pub fn viewer_count(&self, room_id: &RoomId) -> usize {
        self.rooms.get(room_id).map_or(0, |subscribers| {
            let live = subscribers
                .iter()
                .any(|s| s.role.is_broadcaster() && !s.sender.is_closed());
            if live {
                subscribers.iter().filter(|s| s.role == Role::Viewer).count()
            } else {
                0
            }
        })
    }

    /// Ids of every viewer currently in a room
    #[must_use]
    pub fn viewer_ids(&self, room_id: &RoomId) -> Vec<ClientId> {
        self.rooms.get(room_id).map_or_else(Vec::new, |subscribers| {
            subscribers
                .iter()
                .filter(|s| s.role == Role::Viewer)
                .map(|s| s.client_id.clone())
                .collect()
        })
    }

    /// Whether the room has a broadcaster whose channel is still open
    #[must_use]
    pub fn has_live_broadcaster(&self, room_id: &RoomId) -> bool {
        self.rooms.get(room_id).is_some_and(|subscribers| {
            subscribers
                .iter()
                .any(|s| s.role.is_broadcaster() && !s.sender.is_closed())
        })
    }

    /// Id of the room's live broadcaster, if any
    #[must_use]
    pub fn broadcaster_id(&self, room_id: &RoomId) -> Option<ClientId> {
        self.rooms.get(room_id).and_then(|subscribers| {
            subscribers
                .iter()
                .find(|s| s.role.is_broadcaster() && !s.sender.is_closed())
                .map(|s| s.client_id.clone())
        })
    }

    /// Room a client is connected to, if any
    #[must_use]
    pub fn room_of(&self, client_id: &ClientId) -> Option<RoomId> {
        self.connections.get(client_id).map(|r| r.clone())
    }

    /// Total number of connected clients across all rooms
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of rooms with at least one subscriber
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for SignalingHub {
    fn default() -> Self {
        Self::new()
    }
}
