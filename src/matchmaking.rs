use std::collections::VecDeque;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Two waiting players paired up, plus the seed both of them will play.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomFormed {
    pub room_id: u64,
    pub players: [PlayerId; 2],
    pub seed: u64,
}

/// First come, first paired.
pub struct MatchQueue {
    waiting: VecDeque<PlayerId>,
    rng: StdRng,
    next_room_id: u64,
}

impl Default for MatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchQueue {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Queue whose room seeds are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            waiting: VecDeque::new(),
            rng,
            next_room_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    pub fn contains(&self, player: &PlayerId) -> bool {
        self.waiting.contains(player)
    }

    /// Adds `player` to the back of the line. Once two players wait, the two
    /// oldest leave together. Enqueuing a player who already waits is a no-op.
    pub fn enqueue(&mut self, player: PlayerId) -> Option<RoomFormed> {
        if self.contains(&player) {
            tracing::warn!(%player, "already waiting for a match");
            return None;
        }
        self.waiting.push_back(player);
        if self.waiting.len() < 2 {
            return None;
        }
        let first = self.waiting.pop_front()?;
        let second = self.waiting.pop_front()?;
        let room = RoomFormed {
            room_id: self.next_room_id,
            players: [first, second],
            seed: self.rng.gen_range(0..=u64::MAX),
        };
        self.next_room_id += 1;
        tracing::info!(
            room = room.room_id,
            first = %room.players[0],
            second = %room.players[1],
            "room formed"
        );
        Some(room)
    }

    /// Takes `player` out of the line. Returns false if they were not
    /// waiting, including when they were already matched.
    pub fn cancel(&mut self, player: &PlayerId) -> bool {
        let Some(index) = self.waiting.iter().position(|p| p == player) else {
            return false;
        };
        self.waiting.remove(index);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_in_arrival_order() {
        let mut queue = MatchQueue::with_seed(1);
        assert_eq!(queue.enqueue("p1".into()), None);
        let room = queue.enqueue("p2".into()).expect("room formed");
        assert_eq!(room.players, [PlayerId::from("p1"), PlayerId::from("p2")]);
        assert!(queue.is_empty());

        assert_eq!(queue.enqueue("p3".into()), None);
        assert_eq!(queue.len(), 1);
        let next = queue.enqueue("p4".into()).expect("second room");
        assert_eq!(next.players, [PlayerId::from("p3"), PlayerId::from("p4")]);
        assert_ne!(next.room_id, room.room_id);
    }

    #[test]
    fn cancel_removes_only_waiting_players() {
        let mut queue = MatchQueue::with_seed(2);
        queue.enqueue("a".into());
        assert!(queue.cancel(&"a".into()));
        assert!(!queue.cancel(&"a".into()));
        assert_eq!(queue.enqueue("b".into()), None);

        queue.enqueue("c".into()).expect("b and c pair");
        assert!(!queue.cancel(&"b".into()));
    }

    #[test]
    fn duplicate_enqueue_does_not_self_match() {
        let mut queue = MatchQueue::with_seed(3);
        queue.enqueue("solo".into());
        assert_eq!(queue.enqueue("solo".into()), None);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn seeds_are_reproducible_per_queue_seed() {
        let mut a = MatchQueue::with_seed(99);
        let mut b = MatchQueue::with_seed(99);
        a.enqueue("x".into());
        b.enqueue("x".into());
        let ra = a.enqueue("y".into()).unwrap();
        let rb = b.enqueue("y".into()).unwrap();
        assert_eq!(ra.seed, rb.seed);
    }
}
