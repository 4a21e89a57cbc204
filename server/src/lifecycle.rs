//! Connection lifecycle: turns connect, input and disconnect events into
//! registry mutations and the matching client notifications.

use crate::error::RegistryError;
use crate::network::Outbox;
use crate::registry::SessionRegistry;
use log::debug;
use shared::{InputState, Packet, Player, PlayerId};
use std::sync::Arc;

pub struct LifecycleHandler {
    registry: Arc<SessionRegistry>,
    outbox: Outbox,
}

impl LifecycleHandler {
    pub fn new(registry: Arc<SessionRegistry>, outbox: Outbox) -> Self {
        Self { registry, outbox }
    }

    /// Creates the player, sends the newcomer everyone (itself included) and
    /// announces the newcomer to everyone else.
    ///
    /// Both notifications are queued under the registry write lock, ahead of
    /// any tick snapshot that includes the new player.
    pub async fn on_connect(&self, id: PlayerId) -> Result<Player, RegistryError> {
        let outbox = &self.outbox;
        self.registry
            .create_with(id, |player, players| {
                outbox.send_to(
                    id,
                    Packet::CurrentState {
                        players: players.clone(),
                    },
                );
                outbox.broadcast(
                    Packet::PlayerJoined {
                        player: player.clone(),
                    },
                    Some(id),
                );
                player.clone()
            })
            .await
    }

    /// Applies the input and acknowledges it to the sender. Input for a
    /// player that is already gone is dropped.
    pub async fn on_input(&self, id: PlayerId, sequence: u32, input: &InputState) {
        match self.registry.apply_input(id, sequence, input).await {
            Some(ack) => self.outbox.send_to(
                id,
                Packet::StateAck {
                    x: ack.x,
                    y: ack.y,
                    last_processed_input: ack.last_processed_input,
                },
            ),
            None => debug!("Dropping input {} for unknown player {}", sequence, id),
        }
    }

    /// Removes the player and tells the remaining clients. Returns false, and
    /// sends nothing, if the player was already removed.
    pub async fn on_disconnect(&self, id: PlayerId) -> bool {
        if self.registry.remove(id).await.is_none() {
            return false;
        }

        self.outbox.broadcast(Packet::PlayerLeft { id }, Some(id));
        true
    }
}
