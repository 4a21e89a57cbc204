//! Authoritative player registry shared by input handling and the tick loop
//!
//! All player state lives behind one lock. Input application takes the write
//! lock for the duration of a single sample, so a snapshot taken under the
//! read lock always sees a player either fully before or fully after any
//! input, never halfway.

use crate::error::RegistryError;
use log::info;
use rand::Rng;
use shared::{
    apply_input, InputState, Player, PlayerId, PlayerSnapshot, ARENA_HEIGHT, ARENA_WIDTH,
    PLAYER_COLORS, SPAWN_MARGIN,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Position and sequence echoed back to the client that sent an input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateAck {
    pub x: f32,
    pub y: f32,
    pub last_processed_input: u32,
}

#[derive(Debug, Default)]
struct Players {
    by_id: HashMap<PlayerId, Player>,
    /// Total players ever created; picks the next palette color.
    color_counter: usize,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: RwLock<Players>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a player at a random spawn point with the next palette color.
    pub async fn create(&self, id: PlayerId) -> Result<Player, RegistryError> {
        self.create_with(id, |player, _| player.clone()).await
    }

    /// Like `create`, but hands the new player and the full player map to `f`
    /// before the write lock is released. Nothing `f` queues can be overtaken
    /// by a snapshot that already contains the new player.
    pub async fn create_with<R>(
        &self,
        id: PlayerId,
        f: impl FnOnce(&Player, &HashMap<PlayerId, Player>) -> R,
    ) -> Result<R, RegistryError> {
        let (spawn_x, spawn_y) = random_spawn();

        let mut players = self.inner.write().await;
        if players.by_id.contains_key(&id) {
            return Err(RegistryError::DuplicatePlayer(id));
        }

        let color = PLAYER_COLORS[players.color_counter % PLAYER_COLORS.len()];
        players.color_counter += 1;

        let player = Player::new(id, spawn_x, spawn_y, color);
        info!(
            "Added player {} at ({}, {}) with color {}",
            id, player.x, player.y, player.color
        );
        players.by_id.insert(id, player.clone());

        Ok(f(&player, &players.by_id))
    }

    pub async fn get(&self, id: PlayerId) -> Option<Player> {
        self.inner.read().await.by_id.get(&id).cloned()
    }

    pub async fn remove(&self, id: PlayerId) -> Option<Player> {
        let removed = self.inner.write().await.by_id.remove(&id);
        if removed.is_some() {
            info!("Removed player {}", id);
        }
        removed
    }

    /// Applies one input sample to the player and returns the acknowledgment
    /// for its sender. Returns `None` when the player is no longer registered.
    pub async fn apply_input(
        &self,
        id: PlayerId,
        sequence: u32,
        input: &InputState,
    ) -> Option<StateAck> {
        let mut players = self.inner.write().await;
        let player = players.by_id.get_mut(&id)?;

        apply_input(player, sequence, input);

        Some(StateAck {
            x: player.x,
            y: player.y,
            last_processed_input: player.last_processed_input,
        })
    }

    /// Full records, as handed to a newly connected client.
    pub async fn players(&self) -> HashMap<PlayerId, Player> {
        self.inner.read().await.by_id.clone()
    }

    /// Broadcast view of every player, taken under a single read lock.
    pub async fn snapshot_all(&self) -> HashMap<PlayerId, PlayerSnapshot> {
        self.snapshot_with(|players| players).await
    }

    /// Hands a snapshot to `f` while the read lock is still held, so whatever
    /// `f` queues is ordered before any later mutation's notifications.
    pub async fn snapshot_with<R>(
        &self,
        f: impl FnOnce(HashMap<PlayerId, PlayerSnapshot>) -> R,
    ) -> R {
        let players = self.inner.read().await;
        let snapshot = players
            .by_id
            .iter()
            .map(|(id, player)| (*id, player.snapshot()))
            .collect();
        f(snapshot)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.by_id.is_empty()
    }
}

fn random_spawn() -> (f32, f32) {
    let mut rng = rand::thread_rng();
    let max_x = (ARENA_WIDTH - 2.0 * SPAWN_MARGIN) as u32;
    let max_y = (ARENA_HEIGHT - 2.0 * SPAWN_MARGIN) as u32;

    let x = rng.gen_range(0..=max_x) as f32 + SPAWN_MARGIN;
    let y = rng.gen_range(0..=max_y) as f32 + SPAWN_MARGIN;
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::PLAYER_SPEED;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn left() -> InputState {
        InputState {
            left: true,
            ..InputState::default()
        }
    }

    #[tokio::test]
    async fn test_create_registers_player() {
        let registry = SessionRegistry::new();
        let player = registry.create(1).await.unwrap();

        assert_eq!(player.id, 1);
        assert_eq!(player.last_processed_input, 0);
        assert_eq!((player.vel_x, player.vel_y), (0.0, 0.0));
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get(1).await, Some(player));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let registry = SessionRegistry::new();
        registry.create(3).await.unwrap();

        assert!(matches!(
            registry.create(3).await,
            Err(RegistryError::DuplicatePlayer(3))
        ));
        assert_err!(registry.create(3).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_create_with_sees_new_player_in_map() {
        let registry = SessionRegistry::new();
        registry.create(1).await.unwrap();

        let (id, ids) = registry
            .create_with(2, |player, players| {
                let mut ids: Vec<PlayerId> = players.keys().copied().collect();
                ids.sort_unstable();
                (player.id, ids)
            })
            .await
            .unwrap();

        assert_eq!(id, 2);
        assert_eq!(ids, vec![1, 2]);
        assert!(registry.create_with(2, |_, _| ()).await.is_err());
    }

    #[tokio::test]
    async fn test_spawn_inside_margin() {
        let registry = SessionRegistry::new();

        for id in 1..=200 {
            let player = registry.create(id).await.unwrap();
            assert!((50.0..=750.0).contains(&player.x), "x = {}", player.x);
            assert!((50.0..=550.0).contains(&player.y), "y = {}", player.y);
            assert_eq!(player.x.fract(), 0.0);
            assert_eq!(player.y.fract(), 0.0);
        }
    }

    #[tokio::test]
    async fn test_colors_cycle_round_robin() {
        let registry = SessionRegistry::new();
        let mut colors = Vec::new();

        for id in 1..=8 {
            colors.push(registry.create(id).await.unwrap().color);
        }

        assert_eq!(&colors[..6], &PLAYER_COLORS.map(String::from)[..]);
        assert_eq!(colors[6], PLAYER_COLORS[0]);
        assert_eq!(colors[7], PLAYER_COLORS[1]);
    }

    #[tokio::test]
    async fn test_color_counter_survives_removal() {
        let registry = SessionRegistry::new();
        registry.create(1).await.unwrap();
        registry.remove(1).await;

        let second = registry.create(2).await.unwrap();
        assert_eq!(second.color, PLAYER_COLORS[1]);
    }

    #[tokio::test]
    async fn test_remove_player() {
        let registry = SessionRegistry::new();
        assert_ok!(registry.create(1).await);

        assert!(registry.remove(1).await.is_some());
        assert!(registry.remove(1).await.is_none());
        assert!(registry.get(1).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_apply_input_returns_ack() {
        let registry = SessionRegistry::new();
        let start = registry.create(1).await.unwrap();

        let ack = registry.apply_input(1, 42, &left()).await.unwrap();
        let expected_x = (start.x - PLAYER_SPEED).max(0.0);

        assert_eq!(ack.x, expected_x);
        assert_eq!(ack.y, start.y);
        assert_eq!(ack.last_processed_input, 42);

        let stored = registry.get(1).await.unwrap();
        assert_eq!(stored.x, expected_x);
        assert_eq!(stored.vel_x, -PLAYER_SPEED);
        assert_eq!(stored.last_processed_input, 42);
    }

    #[tokio::test]
    async fn test_apply_input_for_unknown_player_is_ignored() {
        let registry = SessionRegistry::new();
        assert!(registry.apply_input(9, 1, &left()).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_snapshot_of_empty_registry() {
        let registry = SessionRegistry::new();
        assert!(registry.snapshot_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_matches_players() {
        let registry = SessionRegistry::new();
        registry.create(1).await.unwrap();
        registry.create(2).await.unwrap();
        registry.apply_input(2, 5, &left()).await;

        let players = registry.players().await;
        let snapshot = registry.snapshot_all().await;

        assert_eq!(snapshot.len(), 2);
        for (id, view) in &snapshot {
            assert_eq!(&players[id].snapshot(), view);
        }
    }

    #[tokio::test]
    async fn test_concurrent_inputs_keep_records_consistent() {
        let registry = Arc::new(SessionRegistry::new());
        for id in 1..=4 {
            registry.create(id).await.unwrap();
        }

        let mut handles = Vec::new();
        for id in 1..=4 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                for sequence in 1..=200 {
                    registry.apply_input(id, sequence, &left()).await;
                }
            }));
        }
        for _ in 0..20 {
            let snapshot = registry.snapshot_all().await;
            for view in snapshot.values() {
                assert!((0.0..=ARENA_WIDTH).contains(&view.x));
            }
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for (_, player) in registry.players().await {
            assert_eq!(player.x, 0.0);
            assert_eq!(player.last_processed_input, 200);
        }
    }
}
