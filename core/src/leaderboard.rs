use rkyv::Archive;

use crate::game_id::GameId;
use crate::host::{HostError, KvStore};
use crate::keys::{self, KEY_TTL};

#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub username: String,
    pub total_words_solved: u64,
}

/// Per-game solved-word counts kept in one hash, field = username.
pub struct Leaderboard<'a, S> {
    store: &'a S,
    key: String,
}

impl<'a, S: KvStore> Leaderboard<'a, S> {
    pub fn new(store: &'a S, game_id: &GameId) -> Self {
        Self {
            store,
            key: game_id.key(keys::LEADERBOARD),
        }
    }

    /// Unconditional atomic increment. Call exactly once per accepted word.
    /// The hash's ttl is renewed so a first win never leaves it unbounded.
    pub async fn record_win(&self, username: &str) -> Result<u64, HostError> {
        let total = self.store.increment_field(&self.key, username, 1).await?;
        self.store.expire(&self.key, KEY_TTL).await?;
        Ok(total.max(0) as u64)
    }

    pub async fn ranked(&self) -> Result<Vec<LeaderboardEntry>, HostError> {
        let fields = self.store.get_all_fields(&self.key).await?;
        Ok(rank_entries(fields))
    }

    pub async fn total_for(&self, username: &str) -> Result<u64, HostError> {
        let fields = self.store.get_all_fields(&self.key).await?;
        Ok(fields
            .iter()
            .find(|(field, _)| field == username)
            .and_then(|(_, value)| value.parse::<u64>().ok())
            .unwrap_or(0))
    }

    pub async fn remove(&self, username: &str) -> Result<(), HostError> {
        self.store.delete_field(&self.key, username).await
    }

    pub async fn restore(&self, entries: &[LeaderboardEntry]) -> Result<(), HostError> {
        for entry in entries {
            self.store
                .set_field(&self.key, &entry.username, &entry.total_words_solved.to_string())
                .await?;
        }
        if !entries.is_empty() {
            self.store.expire(&self.key, KEY_TTL).await?;
        }
        Ok(())
    }
}

/// Highest count first; equal counts keep the order players first scored.
pub fn rank_entries(fields: Vec<(String, String)>) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = fields
        .into_iter()
        .filter_map(|(username, value)| {
            let total_words_solved = value.trim().parse::<u64>().ok()?;
            Some(LeaderboardEntry {
                username,
                total_words_solved,
            })
        })
        .collect();
    entries.sort_by(|a, b| b.total_words_solved.cmp(&a.total_words_solved));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ManualClock, MemoryStore};

    fn entry(username: &str, total: u64) -> LeaderboardEntry {
        LeaderboardEntry {
            username: username.to_string(),
            total_words_solved: total,
        }
    }

    #[tokio::test]
    async fn record_win_counts_up() {
        let store = MemoryStore::new(ManualClock::new(0));
        let game_id = GameId::parse("g1g1g1g1g1").unwrap();
        let board = Leaderboard::new(&store, &game_id);
        assert_eq!(board.record_win("alice").await.unwrap(), 1);
        assert_eq!(board.record_win("alice").await.unwrap(), 2);
        assert_eq!(board.ranked().await.unwrap(), vec![entry("alice", 2)]);
        assert_eq!(board.total_for("alice").await.unwrap(), 2);
        assert_eq!(board.total_for("bob").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn first_win_gives_the_hash_a_ttl() {
        let clock = ManualClock::new(0);
        let store = MemoryStore::new(clock.clone());
        let game_id = GameId::parse("g3g3g3g3g3").unwrap();
        let board = Leaderboard::new(&store, &game_id);
        let key = game_id.key(keys::LEADERBOARD);
        board.record_win("alice").await.unwrap();
        assert_eq!(store.ttl_ms(&key), Some(KEY_TTL.as_millis() as i64));

        clock.advance(1_000);
        board.record_win("bob").await.unwrap();
        assert_eq!(store.ttl_ms(&key), Some(KEY_TTL.as_millis() as i64));
    }

    #[tokio::test]
    async fn remove_and_restore() {
        let store = MemoryStore::new(ManualClock::new(0));
        let game_id = GameId::parse("g2g2g2g2g2").unwrap();
        let board = Leaderboard::new(&store, &game_id);
        board.record_win("alice").await.unwrap();
        board.record_win("bob").await.unwrap();
        board.remove("alice").await.unwrap();
        assert_eq!(board.ranked().await.unwrap(), vec![entry("bob", 1)]);

        board.remove("bob").await.unwrap();
        board
            .restore(&[entry("carol", 4), entry("dave", 7)])
            .await
            .unwrap();
        assert_eq!(
            board.ranked().await.unwrap(),
            vec![entry("dave", 7), entry("carol", 4)]
        );
    }

    #[test]
    fn ties_keep_first_scorer_ahead() {
        let fields = vec![
            ("bob".to_string(), "2".to_string()),
            ("alice".to_string(), "3".to_string()),
            ("carol".to_string(), "2".to_string()),
            ("mallory".to_string(), "lots".to_string()),
        ];
        assert_eq!(
            rank_entries(fields),
            vec![entry("alice", 3), entry("bob", 2), entry("carol", 2)]
        );
    }

    #[test]
    fn entry_json_uses_camel_case() {
        let json = serde_json::to_string(&entry("alice", 2)).unwrap();
        assert_eq!(json, r#"{"username":"alice","totalWordsSolved":2}"#);
    }
}
