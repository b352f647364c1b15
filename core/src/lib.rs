pub mod answer;
pub mod catalog;
pub mod client;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod game_id;
pub mod host;
pub mod keys;
pub mod leaderboard;
pub mod memory;
pub mod protocol;
pub mod round;
pub mod session;

pub use answer::{AnsweredSet, AnsweredWord, SubmitOutcome};
pub use client::{Applied, ClientGame};
pub use codec::{decode, encode};
pub use config::{ConfigError, ConfigForm, GameConfig, WordsPerRound};
pub use engine::{Caller, GameEngine, RoundPhase, SubmitReply};
pub use error::GameError;
pub use game_id::{is_valid_game_id, GameId, GameIdError, GAME_ID_ALPHABET, GAME_ID_LEN};
pub use host::{Archive, ArchiveRecord, Host, HostError, Job, JobId, JobTable, KvStore, Realtime, Scheduler};
pub use leaderboard::LeaderboardEntry;
pub use protocol::{AdminMsg, ChannelMessage, ClientMsg, GameEvent, GameSnapshot, RoundView, ServerMsg};
pub use round::Round;
pub use session::{PlayerSession, SessionAction};
