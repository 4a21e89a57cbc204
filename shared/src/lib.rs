use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const PLAYER_SPEED: f32 = 5.0;
pub const ARENA_WIDTH: f32 = 800.0;
pub const ARENA_HEIGHT: f32 = 600.0;
pub const SPAWN_MARGIN: f32 = 50.0;
pub const TICK_INTERVAL_MS: u64 = 100;
pub const PROTOCOL_VERSION: u32 = 1;
pub const PLAYER_COLORS: [&str; 6] = [
    "#FF0000", "#0000FF", "#00FF00", "#FFFF00", "#FF00FF", "#00FFFF",
];

/// Connection-scoped player identifier, allocated by the transport layer.
pub type PlayerId = u32;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Input {
        sequence: u32,
        input: InputState,
    },
    Heartbeat,
    Disconnect,

    Connected {
        client_id: PlayerId,
    },
    CurrentState {
        players: HashMap<PlayerId, Player>,
    },
    PlayerJoined {
        player: Player,
    },
    StateAck {
        x: f32,
        y: f32,
        last_processed_input: u32,
    },
    TickSnapshot {
        players: HashMap<PlayerId, PlayerSnapshot>,
    },
    PlayerLeft {
        id: PlayerId,
    },
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub color: String,
    pub last_processed_input: u32,
}

impl Player {
    pub fn new(id: PlayerId, x: f32, y: f32, color: impl Into<String>) -> Self {
        Self {
            id,
            x,
            y,
            vel_x: 0.0,
            vel_y: 0.0,
            color: color.into(),
            last_processed_input: 0,
        }
    }

    /// Broadcast view of this player. Omits `last_processed_input`, which
    /// only the owning client receives through `StateAck`.
    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            x: self.x,
            y: self.y,
            vel_x: self.vel_x,
            vel_y: self.vel_y,
            color: self.color.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub color: String,
}

/// Directional keys held during one client input sample.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl InputState {
    /// Per-step displacement for these keys.
    ///
    /// Opposing keys resolve to the one evaluated last: `right` over `left`
    /// and `down` over `up`.
    pub fn velocity(&self, speed: f32) -> (f32, f32) {
        let mut vel_x = 0.0;
        let mut vel_y = 0.0;

        if self.left {
            vel_x = -speed;
        }
        if self.right {
            vel_x = speed;
        }
        if self.up {
            vel_y = -speed;
        }
        if self.down {
            vel_y = speed;
        }

        (vel_x, vel_y)
    }
}

/// Applies one input sample to the player: moves by one step, clamps the
/// position to the arena and records `sequence` as the last processed input.
///
/// The sequence number is stored unconditionally; stale or repeated numbers
/// are not rejected.
pub fn apply_input(player: &mut Player, sequence: u32, input: &InputState) {
    let (vel_x, vel_y) = input.velocity(PLAYER_SPEED);

    player.x += vel_x;
    player.y += vel_y;

    player.vel_x = vel_x;
    player.vel_y = vel_y;

    clamp_to_arena(player);

    player.last_processed_input = sequence;
}

pub fn clamp_to_arena(player: &mut Player) {
    player.x = player.x.clamp(0.0, ARENA_WIDTH);
    player.y = player.y.clamp(0.0, ARENA_HEIGHT);
}

/// Wire index of `Packet::Input`
const INPUT_VARIANT: u32 = 1;

/// Decodes a datagram into a packet.
///
/// An `Input` whose key bytes are missing or not valid booleans still
/// decodes: each unreadable key counts as released. Anything else that fails
/// to decode yields `None`.
pub fn decode_packet(bytes: &[u8]) -> Option<Packet> {
    match bincode::deserialize::<Packet>(bytes) {
        Ok(packet) => Some(packet),
        Err(_) => decode_partial_input(bytes),
    }
}

fn decode_partial_input(bytes: &[u8]) -> Option<Packet> {
    let variant = u32::from_le_bytes(bytes.get(0..4)?.try_into().ok()?);
    if variant != INPUT_VARIANT {
        return None;
    }
    let sequence = u32::from_le_bytes(bytes.get(4..8)?.try_into().ok()?);

    let held = |key: usize| bytes.get(8 + key) == Some(&1);
    Some(Packet::Input {
        sequence,
        input: InputState {
            up: held(0),
            down: held(1),
            left: held(2),
            right: held(3),
        },
    })
}
