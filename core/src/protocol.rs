use rkyv::{Archive, Deserialize, Serialize};

use crate::answer::{AnsweredWord, SubmitOutcome};
use crate::config::ConfigForm;
use crate::leaderboard::LeaderboardEntry;

/// What viewers see of a round. Target words stay on the server until revealed.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct RoundView {
    pub seq: u64,
    pub scrambled_letters: String,
    pub expire_at_ms: i64,
    pub word_lengths: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum GameEvent {
    WordSubmitted { username: String, word: String },
    RoundRotated { round: RoundView },
    RoundExpiredRevealAnswer { words: Vec<String> },
    HintAvailable { hint: String },
    WordPoolRefreshed { word_count: u32 },
    LeaderboardRefreshed,
    StatusLine { message: String },
    GameEnded,
}

/// Envelope for everything published on a game's channel.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub game_id: String,
    pub seq: u64,
    pub origin: Option<String>,
    pub event: GameEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub game_id: String,
    pub title: String,
    pub round: Option<RoundView>,
    pub answered: Vec<AnsweredWord>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub status_messages: Vec<String>,
    pub total_words_solved: u64,
    pub event_seq: u64,
    pub hint: Option<String>,
    pub ended: bool,
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
pub enum AdminMsg {
    Create { form: ConfigForm },
    ReplaceWords { words: String },
    RemovePlayer { username: String },
    EndGame,
    DeleteGame,
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
pub enum ClientMsg {
    Submit { candidate: String, seen_letters: String },
    RequestFeed,
    Ping { nonce: Option<u64> },
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
pub enum ServerMsg {
    Welcome {
        game_id: String,
        username: String,
        session: String,
        snapshot: Option<GameSnapshot>,
    },
    Event { message: ChannelMessage },
    Outcome {
        candidate: String,
        round_seq: u64,
        outcome: SubmitOutcome,
        total_words_solved: u64,
    },
    Resync { snapshot: GameSnapshot },
    Feed { messages: Vec<String> },
    AdminAck { game_id: String, action: String },
    Pong { nonce: Option<u64> },
    Error { code: String, message: String },
}
