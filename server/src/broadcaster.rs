//! Fixed-rate broadcast of the full registry snapshot

use crate::network::Outbox;
use crate::registry::SessionRegistry;
use log::{debug, info};
use shared::Packet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// Ticks between periodic debug summaries
const SUMMARY_EVERY: u64 = 50;

pub struct TickBroadcaster {
    registry: Arc<SessionRegistry>,
    outbox: Outbox,
    period: Duration,
    tick: u64,
}

impl TickBroadcaster {
    pub fn new(registry: Arc<SessionRegistry>, outbox: Outbox, period: Duration) -> Self {
        Self {
            registry,
            outbox,
            period,
            tick: 0,
        }
    }

    /// Snapshots every player and queues one broadcast, even when nobody is
    /// connected. Returns the number of players in the snapshot.
    pub async fn tick(&mut self) -> usize {
        let outbox = &self.outbox;
        let count = self
            .registry
            .snapshot_with(|players| {
                let count = players.len();
                outbox.broadcast(Packet::TickSnapshot { players }, None);
                count
            })
            .await;
        self.tick += 1;

        if self.tick % SUMMARY_EVERY == 0 {
            debug!("Tick {}: {} players", self.tick, count);
        }

        count
    }

    pub async fn run(mut self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Broadcasting snapshots every {}ms", self.period.as_millis());

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::GameMessage;
    use shared::InputState;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn broadcaster(
        registry: Arc<SessionRegistry>,
        period: Duration,
    ) -> (TickBroadcaster, mpsc::UnboundedReceiver<GameMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TickBroadcaster::new(registry, Outbox::new(tx), period), rx)
    }

    #[tokio::test]
    async fn test_empty_registry_still_broadcasts() {
        let (mut broadcaster, mut rx) =
            broadcaster(Arc::new(SessionRegistry::new()), Duration::from_millis(100));

        assert_eq!(broadcaster.tick().await, 0);

        match rx.try_recv().unwrap() {
            GameMessage::BroadcastPacket {
                packet: Packet::TickSnapshot { players },
                exclude,
            } => {
                assert!(players.is_empty());
                assert_eq!(exclude, None);
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_snapshot_reflects_latest_input() {
        let registry = Arc::new(SessionRegistry::new());
        registry.create(1).await.unwrap();
        registry.create(2).await.unwrap();
        let input = InputState {
            right: true,
            ..InputState::default()
        };
        registry.apply_input(2, 4, &input).await;

        let (mut broadcaster, mut rx) =
            broadcaster(Arc::clone(&registry), Duration::from_millis(100));
        assert_eq!(broadcaster.tick().await, 2);

        let stored = registry.get(2).await.unwrap();
        match rx.try_recv().unwrap() {
            GameMessage::BroadcastPacket {
                packet: Packet::TickSnapshot { players },
                ..
            } => {
                assert_eq!(players.len(), 2);
                assert_eq!(players[&2], stored.snapshot());
                assert_eq!(players[&2].vel_x, shared::PLAYER_SPEED);
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_departed_player_absent_from_next_tick() {
        let registry = Arc::new(SessionRegistry::new());
        registry.create(1).await.unwrap();
        registry.create(2).await.unwrap();

        let (mut broadcaster, mut rx) =
            broadcaster(Arc::clone(&registry), Duration::from_millis(100));
        registry.remove(1).await;
        broadcaster.tick().await;

        match rx.try_recv().unwrap() {
            GameMessage::BroadcastPacket {
                packet: Packet::TickSnapshot { players },
                ..
            } => {
                assert!(!players.contains_key(&1));
                assert!(players.contains_key(&2));
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_fires_repeatedly() {
        let (broadcaster, mut rx) =
            broadcaster(Arc::new(SessionRegistry::new()), Duration::from_millis(10));
        let handle = tokio::spawn(broadcaster.run());

        for _ in 0..3 {
            let message = timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(
                message,
                GameMessage::BroadcastPacket {
                    packet: Packet::TickSnapshot { .. },
                    exclude: None
                }
            ));
        }

        handle.abort();
    }
}
