//! Per-game state machine. Every operation re-reads the persisted state, so a
//! fresh engine over the same host picks up where another one stopped.

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::answer::{normalize_candidate, validate_submission, AnsweredSet, SubmitOutcome};
use crate::codec::{from_json, to_json};
use crate::config::{parse_word_list, validate_pool, GameConfig, WordsPerRound, STATUS_FEED_CAP};
use crate::error::GameError;
use crate::feed::{self, StatusFeed};
use crate::game_id::GameId;
use crate::host::{Archive, ArchiveRecord, Host, Job, JobId, KvStore, Realtime, Scheduler};
use crate::keys::{self, KEY_TTL};
use crate::leaderboard::{Leaderboard, LeaderboardEntry};
use crate::protocol::{ChannelMessage, GameEvent, GameSnapshot, RoundView};
use crate::round::{generate_round, Round};

/// Delay before an end of game that failed to archive is tried again.
pub const END_GAME_RETRY_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Idle,
    RoundActive,
    RoundRotating,
    Ended,
}

/// Who is asking. Built by the transport from its own identity source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub username: String,
    pub moderator: bool,
}

impl Caller {
    pub fn player(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            moderator: false,
        }
    }

    pub fn moderator(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            moderator: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReply {
    pub outcome: SubmitOutcome,
    /// Round the submission was judged against.
    pub round_seq: u64,
    pub total_words_solved: u64,
}

pub struct GameEngine<H: Host> {
    host: H,
    game_id: GameId,
    rng: SmallRng,
    phase: RoundPhase,
}

impl<H: Host> GameEngine<H> {
    pub fn new(host: H, game_id: GameId, seed: u64) -> Self {
        Self {
            host,
            game_id,
            rng: SmallRng::seed_from_u64(seed),
            phase: RoundPhase::Idle,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Re-derives the phase from storage after a restart.
    pub async fn refresh_phase(&mut self) -> Result<RoundPhase, GameError> {
        if self.read(keys::GAME_ENDED).await?.is_some() {
            self.phase = RoundPhase::Ended;
        } else if self.load_round().await?.is_some() {
            self.phase = RoundPhase::RoundActive;
        } else {
            self.phase = RoundPhase::Idle;
        }
        Ok(self.phase)
    }

    pub async fn create(&mut self, config: GameConfig) -> Result<RoundView, GameError> {
        if self.read(keys::WORDS).await?.is_some() && !self.is_ended().await? {
            return Err(GameError::AlreadyExists);
        }
        validate_pool(&config.word_pool, config.words_per_round)?;

        let previous_seq = self.load_round().await?.map(|round| round.seq).unwrap_or(0);
        self.cancel_all_jobs().await?;
        self.purge_keys(false).await?;

        let now = self.host.now_ms();
        let round = generate_round(&config, previous_seq + 1, now, &mut self.rng);
        if !round.is_playable() {
            return Err(GameError::Misconfigured);
        }

        if let Err(err) = self.start_game(&config, &round, now).await {
            self.phase = RoundPhase::Idle;
            return Err(self.roll_back_create(err).await);
        }

        self.phase = RoundPhase::RoundActive;
        let view = round.view();
        self.publish(
            None,
            GameEvent::RoundRotated {
                round: view.clone(),
            },
        )
        .await?;
        self.push_status(feed::game_started_line(&config.title)).await?;
        self.push_status(feed::new_round_line(round.target_words.len()))
            .await?;
        Ok(view)
    }

    /// Replaces the round numbered `expected_seq` with a fresh one. Returns
    /// false without touching anything when that round is no longer current.
    pub async fn rotate(&mut self, expected_seq: u64) -> Result<bool, GameError> {
        if self.phase == RoundPhase::RoundRotating || self.is_ended().await? {
            return Ok(false);
        }
        let current = match self.load_round().await? {
            Some(round) if round.seq == expected_seq => round,
            _ => return Ok(false),
        };
        self.phase = RoundPhase::RoundRotating;
        let result = self.rotate_from(current).await;
        if self.phase == RoundPhase::RoundRotating {
            self.phase = RoundPhase::RoundActive;
        }
        result.map(|_| true)
    }

    async fn rotate_from(&mut self, current: Round) -> Result<(), GameError> {
        let config = self.load_config().await?;
        self.cancel_job(keys::CHANGE_LETTERS_JOB_ID).await?;
        self.cancel_job(keys::SHOW_HINT_JOB_ID).await?;

        let answered = self.load_answered().await?;
        if current.is_playable() {
            self.publish(
                None,
                GameEvent::RoundExpiredRevealAnswer {
                    words: current.target_words.clone(),
                },
            )
            .await?;
            if !answered.is_complete(&current) {
                self.push_status(feed::reveal_line(&current.target_words))
                    .await?;
            }
        }

        let now = self.host.now_ms();
        let next = generate_round(&config, current.seq + 1, now, &mut self.rng);
        if !next.is_playable() {
            return Err(GameError::Misconfigured);
        }
        self.put_json(keys::WORDS_AND_LETTERS, &next).await?;
        self.put_json(keys::ANSWERED_WORDS, &AnsweredSet::new())
            .await?;
        self.refresh_ttls().await?;

        self.publish(None, GameEvent::RoundRotated { round: next.view() })
            .await?;
        self.push_status(feed::new_round_line(next.target_words.len()))
            .await?;
        self.schedule_round_jobs(&config, &next).await
    }

    pub async fn submit(
        &mut self,
        username: &str,
        origin: Option<&str>,
        candidate: &str,
        seen_letters: &str,
    ) -> Result<SubmitReply, GameError> {
        if self.is_ended().await? {
            return Err(GameError::GameEnded);
        }
        let round = self.load_round().await?.ok_or(GameError::NotFound)?;
        if !round.is_playable() {
            return Err(GameError::Misconfigured);
        }

        if round.is_expired(self.host.now_ms()) {
            // the timer is late; play on with fresh letters
            self.rotate(round.seq).await?;
            let round_seq = self
                .load_round()
                .await?
                .map(|next| next.seq)
                .unwrap_or(round.seq);
            return Ok(SubmitReply {
                outcome: SubmitOutcome::Stale,
                round_seq,
                total_words_solved: self.leaderboard_store().total_for(username).await?,
            });
        }

        let mut answered = self.load_answered().await?;
        let outcome = validate_submission(candidate, seen_letters, &round, &answered);
        let SubmitOutcome::Accepted { round_complete } = outcome else {
            return Ok(SubmitReply {
                outcome,
                round_seq: round.seq,
                total_words_solved: self.leaderboard_store().total_for(username).await?,
            });
        };

        let word = normalize_candidate(candidate);
        answered.record(&word, username);
        self.put_json(keys::ANSWERED_WORDS, &answered).await?;
        let total_words_solved = self.leaderboard_store().record_win(username).await?;
        self.publish(
            origin,
            GameEvent::WordSubmitted {
                username: username.to_string(),
                word: word.clone(),
            },
        )
        .await?;
        self.push_status(feed::word_found_line(username, &word))
            .await?;
        if round_complete {
            self.rotate(round.seq).await?;
        }
        Ok(SubmitReply {
            outcome,
            round_seq: round.seq,
            total_words_solved,
        })
    }

    /// Runs a fired job. Returns whether it changed anything.
    pub async fn handle_job(&mut self, job: &Job) -> Result<bool, GameError> {
        if job.game_id() != &self.game_id {
            return Ok(false);
        }
        match job {
            Job::ChangeLetters { round_seq, .. } => self.rotate(*round_seq).await,
            Job::ShowHint { round_seq, .. } => self.show_hint(*round_seq).await,
            Job::EndGame { .. } => self.end_game().await,
        }
    }

    async fn show_hint(&mut self, round_seq: u64) -> Result<bool, GameError> {
        if self.is_ended().await? {
            return Ok(false);
        }
        let round = match self.load_round().await? {
            Some(round) if round.seq == round_seq => round,
            _ => return Ok(false),
        };
        self.delete(keys::SHOW_HINT_JOB_ID).await?;
        let answered = self.load_answered().await?;
        if !answered.is_empty() {
            return Ok(false);
        }
        let Some(hint) = round.hint(&answered) else {
            return Ok(false);
        };
        self.publish(None, GameEvent::HintAvailable { hint: hint.clone() })
            .await?;
        self.push_status(feed::hint_line(&hint)).await?;
        Ok(true)
    }

    /// Archives the pool and final standings, then freezes the game.
    pub async fn end_game(&mut self) -> Result<bool, GameError> {
        if self.is_ended().await? {
            return Ok(false);
        }
        let config = self.load_config().await?;
        if self.phase == RoundPhase::Ended {
            return Ok(false);
        }
        let leaderboard = self.leaderboard_store().ranked().await?;
        let record = ArchiveRecord {
            game_id: self.game_id.clone(),
            title: config.title.clone(),
            words: config.word_pool.clone(),
            words_per_round: config.words_per_round.count() as u32,
            minutes_to_solve: config.round_duration_minutes,
            total_game_duration_hours: config.total_game_duration_hours,
            hint_enabled: config.hint_enabled,
            leaderboard,
            archived_at_ms: self.host.now_ms(),
        };
        if let Err(err) = self.host.archive().publish(&record).await {
            self.retry_end_game().await?;
            return Err(err.into());
        }
        self.put(keys::GAME_ENDED, "true").await?;
        self.phase = RoundPhase::Ended;
        // jobs that survive a failed cancel find the game ended and do nothing
        self.cancel_all_jobs().await?;
        self.refresh_ttls().await?;
        self.publish(None, GameEvent::GameEnded).await?;
        self.push_status(feed::game_ended_line()).await?;
        Ok(true)
    }

    /// Swaps the word pool and starts a round drawn from it.
    pub async fn replace_words(&mut self, caller: &Caller, words: &str) -> Result<usize, GameError> {
        if !caller.moderator {
            return Err(GameError::NotModerator);
        }
        if self.is_ended().await? {
            return Err(GameError::GameEnded);
        }
        let config = self.load_config().await?;
        let pool = parse_word_list(words)?;
        validate_pool(&pool, config.words_per_round)?;
        self.put(keys::WORDS, &pool.join(",")).await?;

        let word_count = pool.len();
        self.publish(
            None,
            GameEvent::WordPoolRefreshed {
                word_count: word_count as u32,
            },
        )
        .await?;
        self.push_status(feed::pool_refreshed_line(word_count))
            .await?;
        if let Some(round) = self.load_round().await? {
            self.rotate(round.seq).await?;
        }
        Ok(word_count)
    }

    pub async fn remove_player(&mut self, caller: &Caller, username: &str) -> Result<(), GameError> {
        if !caller.moderator {
            return Err(GameError::NotModerator);
        }
        self.leaderboard_store().remove(username).await?;
        self.publish(None, GameEvent::LeaderboardRefreshed).await
    }

    /// Cancels every outstanding job and drops all keys of the game.
    pub async fn delete_game(&mut self) -> Result<(), GameError> {
        self.cancel_all_jobs().await?;
        self.purge_keys(true).await?;
        self.phase = RoundPhase::Idle;
        Ok(())
    }

    pub async fn snapshot(&mut self, username: &str) -> Result<GameSnapshot, GameError> {
        let config = self.load_config().await?;
        let ended = self.is_ended().await?;
        let round = if ended { None } else { self.load_round().await? };
        let answered = self.load_answered().await?;
        let leaderboard = self.leaderboard().await?;
        let total_words_solved = leaderboard
            .iter()
            .find(|entry| entry.username == username)
            .map(|entry| entry.total_words_solved)
            .unwrap_or(0);
        let now = self.host.now_ms();
        let hint = round.as_ref().and_then(|round| {
            let hint_at = round.expire_at_ms - config.round_duration_ms() + config.hint_delay_ms();
            if config.hint_enabled && answered.is_empty() && now >= hint_at {
                round.hint(&answered)
            } else {
                None
            }
        });
        Ok(GameSnapshot {
            game_id: self.game_id.to_string(),
            title: config.title,
            round: round.as_ref().map(Round::view),
            answered: if ended {
                Vec::new()
            } else {
                answered.into_entries()
            },
            leaderboard,
            status_messages: self.status_messages().await?,
            total_words_solved,
            event_seq: self.event_seq().await?,
            hint,
            ended,
        })
    }

    /// Ranked standings. When the live game is gone the archived standings
    /// are restored first.
    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, GameError> {
        let board = self.leaderboard_store();
        let ranked = board.ranked().await?;
        if !ranked.is_empty() || self.read(keys::WORDS).await?.is_some() {
            return Ok(ranked);
        }
        let Some(record) = self.host.archive().latest(&self.game_id).await? else {
            return Ok(ranked);
        };
        board.restore(&record.leaderboard).await?;
        Ok(record.leaderboard)
    }

    pub async fn status_messages(&self) -> Result<Vec<String>, GameError> {
        Ok(self
            .read_json::<Vec<String>>(keys::STATUS_MESSAGES)
            .await?
            .unwrap_or_default())
    }

    pub async fn event_seq(&self) -> Result<u64, GameError> {
        match self.read(keys::EVENT_SEQ).await? {
            Some(raw) => raw.parse().map_err(|_| corrupt(keys::EVENT_SEQ)),
            None => Ok(0),
        }
    }

    /// Reads the persisted configuration, falling back to the archive once
    /// the live keys have expired. An archived game is always ended.
    pub async fn load_config(&mut self) -> Result<GameConfig, GameError> {
        if let Some(words) = self.read(keys::WORDS).await? {
            return self.config_from_keys(&words).await;
        }
        let Some(record) = self.host.archive().latest(&self.game_id).await? else {
            return Err(GameError::NotFound);
        };
        self.phase = RoundPhase::Ended;
        Ok(GameConfig {
            game_id: self.game_id.clone(),
            title: record.title,
            word_pool: record.words,
            round_duration_minutes: record.minutes_to_solve,
            words_per_round: WordsPerRound::from_count(record.words_per_round)
                .unwrap_or(WordsPerRound::One),
            total_game_duration_hours: record.total_game_duration_hours,
            hint_enabled: record.hint_enabled,
        })
    }

    async fn config_from_keys(&self, words: &str) -> Result<GameConfig, GameError> {
        // an emptied pool loads fine and fails when a round is drawn
        let word_pool = if words.trim().is_empty() {
            Vec::new()
        } else {
            parse_word_list(words).map_err(|_| corrupt(keys::WORDS))?
        };
        let words_per_round = self
            .read_number(keys::WORDS_COUNT)
            .await?
            .and_then(WordsPerRound::from_count)
            .ok_or_else(|| corrupt(keys::WORDS_COUNT))?;
        let round_duration_minutes = self
            .read_number(keys::MINUTES_TO_SOLVE)
            .await?
            .filter(|minutes| *minutes > 0)
            .ok_or_else(|| corrupt(keys::MINUTES_TO_SOLVE))?;
        let total_game_duration_hours = self
            .read_number(keys::TOTAL_GAME_DURATION_HOURS)
            .await?
            .ok_or_else(|| corrupt(keys::TOTAL_GAME_DURATION_HOURS))?;
        let hint_enabled = self.read(keys::HINT_ENABLED).await?.as_deref() == Some("true");
        let title = self.read(keys::TITLE).await?.unwrap_or_default();
        Ok(GameConfig {
            game_id: self.game_id.clone(),
            title,
            word_pool,
            round_duration_minutes,
            words_per_round,
            total_game_duration_hours,
            hint_enabled,
        })
    }

    async fn start_game(&self, config: &GameConfig, round: &Round, now: i64) -> Result<(), GameError> {
        self.persist_config(config).await?;
        self.put_json(keys::WORDS_AND_LETTERS, round).await?;
        self.put_json(keys::ANSWERED_WORDS, &AnsweredSet::new()).await?;
        self.put_json(keys::STATUS_MESSAGES, &Vec::<String>::new())
            .await?;
        self.schedule_round_jobs(config, round).await?;
        let end_job = self
            .host
            .scheduler()
            .schedule_once(
                now + config.game_duration_ms(),
                Job::EndGame {
                    game_id: self.game_id.clone(),
                },
            )
            .await?;
        self.put(keys::END_GAME_JOB_ID, end_job.as_str()).await
    }

    /// Undoes a half-created game. Cleanup failures are reported alongside
    /// the original error.
    async fn roll_back_create(&self, err: GameError) -> GameError {
        let cancelled = self.cancel_all_jobs().await;
        let purged = self.purge_keys(false).await;
        match cancelled.and(purged) {
            Ok(()) => err,
            Err(cleanup) => GameError::RollbackFailed {
                error: Box::new(err),
                cleanup: Box::new(cleanup),
            },
        }
    }

    /// Replaces the end-of-game job with one a little later, so a failed
    /// archive write is retried instead of leaving the game without an end.
    async fn retry_end_game(&self) -> Result<(), GameError> {
        self.cancel_job(keys::END_GAME_JOB_ID).await?;
        let retry = self
            .host
            .scheduler()
            .schedule_once(
                self.host.now_ms() + END_GAME_RETRY_MS,
                Job::EndGame {
                    game_id: self.game_id.clone(),
                },
            )
            .await?;
        self.put(keys::END_GAME_JOB_ID, retry.as_str()).await
    }

    async fn persist_config(&self, config: &GameConfig) -> Result<(), GameError> {
        self.put(keys::WORDS, &config.word_pool.join(",")).await?;
        self.put(keys::TITLE, &config.title).await?;
        self.put(keys::WORDS_COUNT, &config.words_per_round.count().to_string())
            .await?;
        self.put(
            keys::MINUTES_TO_SOLVE,
            &config.round_duration_minutes.to_string(),
        )
        .await?;
        self.put(
            keys::TOTAL_GAME_DURATION_HOURS,
            &config.total_game_duration_hours.to_string(),
        )
        .await?;
        self.put(keys::HINT_ENABLED, if config.hint_enabled { "true" } else { "false" })
            .await
    }

    async fn schedule_round_jobs(&self, config: &GameConfig, round: &Round) -> Result<(), GameError> {
        let scheduler = self.host.scheduler();
        let every = Duration::from_secs(config.round_duration_secs());
        let change = scheduler
            .schedule_recurring(
                every,
                round.expire_at_ms,
                Job::ChangeLetters {
                    game_id: self.game_id.clone(),
                    round_seq: round.seq,
                },
            )
            .await?;
        self.put(keys::CHANGE_LETTERS_JOB_ID, change.as_str())
            .await?;
        if config.hint_enabled {
            let round_start = round.expire_at_ms - config.round_duration_ms();
            let hint = scheduler
                .schedule_once(
                    round_start + config.hint_delay_ms(),
                    Job::ShowHint {
                        game_id: self.game_id.clone(),
                        round_seq: round.seq,
                    },
                )
                .await?;
            self.put(keys::SHOW_HINT_JOB_ID, hint.as_str()).await?;
        }
        Ok(())
    }

    async fn cancel_job(&self, id_key: &str) -> Result<(), GameError> {
        if let Some(id) = self.read(id_key).await? {
            self.host.scheduler().cancel(&JobId::new(id)).await?;
            self.delete(id_key).await?;
        }
        Ok(())
    }

    async fn cancel_all_jobs(&self) -> Result<(), GameError> {
        for id_key in keys::JOB_ID_KEYS {
            self.cancel_job(id_key).await?;
        }
        Ok(())
    }

    /// Deletes the game's keys. The event counter survives unless
    /// `everything` is set so connected clients keep accepting messages.
    async fn purge_keys(&self, everything: bool) -> Result<(), GameError> {
        for name in keys::ALL {
            if *name == keys::EVENT_SEQ && !everything {
                continue;
            }
            self.delete(name).await?;
        }
        Ok(())
    }

    async fn refresh_ttls(&self) -> Result<(), GameError> {
        let store = self.host.store();
        for name in keys::ALL {
            store.expire(&self.game_id.key(name), KEY_TTL).await?;
        }
        Ok(())
    }

    async fn is_ended(&self) -> Result<bool, GameError> {
        if self.phase == RoundPhase::Ended {
            return Ok(true);
        }
        Ok(self.read(keys::GAME_ENDED).await?.as_deref() == Some("true"))
    }

    async fn load_round(&self) -> Result<Option<Round>, GameError> {
        self.read_json(keys::WORDS_AND_LETTERS).await
    }

    async fn load_answered(&self) -> Result<AnsweredSet, GameError> {
        Ok(self
            .read_json(keys::ANSWERED_WORDS)
            .await?
            .unwrap_or_default())
    }

    /// Appends to the persisted feed and broadcasts the line.
    pub async fn push_status(&self, message: String) -> Result<(), GameError> {
        let mut status = StatusFeed::from_messages(STATUS_FEED_CAP, self.status_messages().await?);
        status.push(message.clone());
        self.put_json(keys::STATUS_MESSAGES, &status.to_vec())
            .await?;
        self.publish(None, GameEvent::StatusLine { message }).await
    }

    async fn publish(&self, origin: Option<&str>, event: GameEvent) -> Result<(), GameError> {
        let seq = self.event_seq().await? + 1;
        self.put(keys::EVENT_SEQ, &seq.to_string()).await?;
        let message = ChannelMessage {
            game_id: self.game_id.to_string(),
            seq,
            origin: origin.map(str::to_string),
            event,
        };
        self.host
            .realtime()
            .publish(&self.game_id.channel(), &message)
            .await?;
        Ok(())
    }

    fn leaderboard_store(&self) -> Leaderboard<'_, H::Store> {
        Leaderboard::new(self.host.store(), &self.game_id)
    }

    async fn read(&self, name: &str) -> Result<Option<String>, GameError> {
        Ok(self.host.store().get(&self.game_id.key(name)).await?)
    }

    async fn read_number(&self, name: &str) -> Result<Option<u32>, GameError> {
        match self.read(name).await? {
            Some(raw) => raw.trim().parse().map(Some).map_err(|_| corrupt(name)),
            None => Ok(None),
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<Option<T>, GameError> {
        match self.read(name).await? {
            Some(raw) => from_json(&raw).map(Some).map_err(|_| corrupt(name)),
            None => Ok(None),
        }
    }

    async fn put(&self, name: &str, value: &str) -> Result<(), GameError> {
        self.host
            .store()
            .set(&self.game_id.key(name), value, Some(KEY_TTL))
            .await?;
        Ok(())
    }

    async fn put_json<T: serde::Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), GameError> {
        let raw = to_json(value).map_err(|_| corrupt(name))?;
        self.put(name, &raw).await
    }

    async fn delete(&self, name: &str) -> Result<(), GameError> {
        self.host.store().delete(&self.game_id.key(name)).await?;
        Ok(())
    }
}

fn corrupt(name: &str) -> GameError {
    GameError::Corrupt {
        key: name.to_string(),
    }
}
