//! Viewer-side game state, fed by server messages.

use crate::answer::{AnsweredWord, SubmitOutcome};
use crate::config::STATUS_FEED_CAP;
use crate::feed::StatusFeed;
use crate::leaderboard::LeaderboardEntry;
use crate::protocol::{ChannelMessage, ClientMsg, GameEvent, GameSnapshot, RoundView, ServerMsg};
use crate::session::PlayerSession;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// Duplicate, out of order or for another game.
    Ignored,
    Applied,
    /// State was updated but the message was our own echo, so no notice.
    Suppressed,
}

#[derive(Clone, Debug)]
pub struct ClientGame {
    game_id: String,
    username: String,
    session: String,
    title: String,
    player: Option<PlayerSession>,
    round: Option<RoundView>,
    feed: StatusFeed,
    leaderboard: Vec<LeaderboardEntry>,
    answered: Vec<AnsweredWord>,
    hint: Option<String>,
    revealed: Vec<String>,
    last_event_seq: u64,
    ended: bool,
    needs_resync: bool,
    notices: Vec<String>,
}

impl ClientGame {
    pub fn new(game_id: &str, username: &str, session: &str) -> Self {
        Self {
            game_id: game_id.to_string(),
            username: username.to_string(),
            session: session.to_string(),
            title: String::new(),
            player: None,
            round: None,
            feed: StatusFeed::new(STATUS_FEED_CAP),
            leaderboard: Vec::new(),
            answered: Vec::new(),
            hint: None,
            revealed: Vec::new(),
            last_event_seq: 0,
            ended: false,
            needs_resync: false,
            notices: Vec::new(),
        }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn player(&self) -> Option<&PlayerSession> {
        self.player.as_ref()
    }

    pub fn player_mut(&mut self) -> Option<&mut PlayerSession> {
        self.player.as_mut()
    }

    pub fn round(&self) -> Option<&RoundView> {
        self.round.as_ref()
    }

    pub fn feed(&self) -> &StatusFeed {
        &self.feed
    }

    pub fn leaderboard(&self) -> &[LeaderboardEntry] {
        &self.leaderboard
    }

    pub fn answered(&self) -> &[AnsweredWord] {
        &self.answered
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    /// Target words of the last finished round.
    pub fn revealed(&self) -> &[String] {
        &self.revealed
    }

    pub fn last_event_seq(&self) -> u64 {
        self.last_event_seq
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Set when the server announced a change only a fresh snapshot can show.
    pub fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    pub fn apply_snapshot(&mut self, snapshot: &GameSnapshot, now_ms: i64) {
        self.title = snapshot.title.clone();
        self.round = snapshot.round.clone();
        self.answered = snapshot.answered.clone();
        self.leaderboard = snapshot.leaderboard.clone();
        self.feed = StatusFeed::from_messages(STATUS_FEED_CAP, snapshot.status_messages.clone());
        self.hint = snapshot.hint.clone();
        self.last_event_seq = snapshot.event_seq;
        self.ended = snapshot.ended;
        self.needs_resync = false;
        self.player = match &snapshot.round {
            Some(round) if !snapshot.ended => Some(PlayerSession::from_round(
                &self.username,
                round,
                snapshot.total_words_solved,
                now_ms,
            )),
            _ => None,
        };
    }

    pub fn apply_message(&mut self, message: &ChannelMessage, now_ms: i64) -> Applied {
        if message.game_id != self.game_id || message.seq <= self.last_event_seq {
            return Applied::Ignored;
        }
        self.last_event_seq = message.seq;
        let own = message.origin.as_deref() == Some(self.session.as_str());

        match &message.event {
            GameEvent::WordSubmitted { username, word } => {
                if !self.answered.iter().any(|entry| entry.word == *word) {
                    self.answered.push(AnsweredWord {
                        word: word.clone(),
                        username: username.clone(),
                    });
                }
                let total = self.bump_leaderboard(username);
                if *username == self.username && !own {
                    // same player from another tab
                    if let Some(player) = self.player.as_mut() {
                        player.set_total_words_solved(total);
                    }
                }
                if !own {
                    self.notices.push(format!("{username} found {word}!"));
                }
            }
            GameEvent::RoundRotated { round } => {
                self.answered.clear();
                self.hint = None;
                match self.player.as_mut() {
                    Some(player) => {
                        player.resync(round, now_ms);
                    }
                    None if !self.ended => {
                        let total = self.own_total();
                        self.player = Some(PlayerSession::from_round(&self.username, round, total, now_ms));
                    }
                    None => {}
                }
                self.round = Some(round.clone());
            }
            GameEvent::RoundExpiredRevealAnswer { words } => {
                self.revealed = words.clone();
            }
            GameEvent::HintAvailable { hint } => {
                self.hint = Some(hint.clone());
            }
            GameEvent::WordPoolRefreshed { word_count } => {
                self.notices
                    .push(format!("The word list now has {word_count} words."));
            }
            GameEvent::LeaderboardRefreshed => {
                self.needs_resync = true;
            }
            GameEvent::StatusLine { message } => {
                self.feed.push(message.clone());
            }
            GameEvent::GameEnded => {
                self.ended = true;
                self.round = None;
                self.player = None;
                self.hint = None;
            }
        }

        if own {
            Applied::Suppressed
        } else {
            Applied::Applied
        }
    }

    /// Applies the server's verdict on one of our own submissions.
    pub fn apply_outcome(
        &mut self,
        round_seq: u64,
        outcome: &SubmitOutcome,
        total_words_solved: u64,
        now_ms: i64,
    ) {
        self.notices.push(outcome.message());
        let round = self.round.clone();
        let Some(player) = self.player.as_mut() else {
            return;
        };
        match outcome {
            SubmitOutcome::Accepted { .. } => {
                let next = total_words_solved.max(player.total_words_solved() + 1);
                player.set_total_words_solved(next);
                if player.round_seq() == round_seq {
                    player.reset();
                }
            }
            SubmitOutcome::Stale => {
                if let Some(round) = round {
                    player.resync(&round, now_ms);
                }
            }
            SubmitOutcome::Invalid | SubmitOutcome::AlreadyAnswered { .. } => {
                player.set_total_words_solved(total_words_solved);
                if player.round_seq() == round_seq {
                    player.reset();
                }
            }
        }
    }

    pub fn apply_server_msg(&mut self, msg: &ServerMsg, now_ms: i64) -> Applied {
        match msg {
            ServerMsg::Welcome {
                session, snapshot, ..
            } => {
                self.session = session.clone();
                if let Some(snapshot) = snapshot {
                    self.apply_snapshot(snapshot, now_ms);
                }
                Applied::Applied
            }
            ServerMsg::Event { message } => self.apply_message(message, now_ms),
            ServerMsg::Outcome {
                round_seq,
                outcome,
                total_words_solved,
                ..
            } => {
                self.apply_outcome(*round_seq, outcome, *total_words_solved, now_ms);
                Applied::Applied
            }
            ServerMsg::Resync { snapshot } => {
                self.apply_snapshot(snapshot, now_ms);
                Applied::Applied
            }
            ServerMsg::Feed { messages } => {
                self.feed = StatusFeed::from_messages(STATUS_FEED_CAP, messages.clone());
                Applied::Applied
            }
            ServerMsg::Error { message, .. } => {
                self.notices.push(message.clone());
                Applied::Applied
            }
            ServerMsg::AdminAck { .. } | ServerMsg::Pong { .. } => Applied::Ignored,
        }
    }

    /// The submit message for the currently staged letters, if any.
    pub fn submit_request(&self) -> Option<ClientMsg> {
        let player = self.player.as_ref()?;
        let candidate = player.candidate();
        if candidate.is_empty() {
            return None;
        }
        Some(ClientMsg::Submit {
            candidate,
            seen_letters: player.scrambled_letters().to_string(),
        })
    }

    fn own_total(&self) -> u64 {
        self.leaderboard
            .iter()
            .find(|entry| entry.username == self.username)
            .map(|entry| entry.total_words_solved)
            .unwrap_or(0)
    }

    fn bump_leaderboard(&mut self, username: &str) -> u64 {
        let total = match self
            .leaderboard
            .iter_mut()
            .find(|entry| entry.username == username)
        {
            Some(entry) => {
                entry.total_words_solved += 1;
                entry.total_words_solved
            }
            None => {
                self.leaderboard.push(LeaderboardEntry {
                    username: username.to_string(),
                    total_words_solved: 1,
                });
                1
            }
        };
        self.leaderboard
            .sort_by(|a, b| b.total_words_solved.cmp(&a.total_words_solved));
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(seq: u64, letters: &str) -> RoundView {
        RoundView {
            seq,
            scrambled_letters: letters.to_string(),
            expire_at_ms: 60_000,
            word_lengths: vec![letters.len() as u32],
        }
    }

    fn message(seq: u64, origin: Option<&str>, event: GameEvent) -> ChannelMessage {
        ChannelMessage {
            game_id: "ClientGame".to_string(),
            seq,
            origin: origin.map(str::to_string),
            event,
        }
    }

    fn snapshot() -> GameSnapshot {
        GameSnapshot {
            game_id: "ClientGame".to_string(),
            title: "Test".to_string(),
            round: Some(view(1, "TAC")),
            answered: Vec::new(),
            leaderboard: Vec::new(),
            status_messages: vec!["hello".to_string()],
            total_words_solved: 0,
            event_seq: 4,
            hint: None,
            ended: false,
        }
    }

    fn joined() -> ClientGame {
        let mut game = ClientGame::new("ClientGame", "alice", "sessAAAA");
        game.apply_snapshot(&snapshot(), 0);
        game
    }

    #[test]
    fn duplicate_and_old_seqs_are_ignored() {
        let mut game = joined();
        let line = |seq| {
            message(
                seq,
                None,
                GameEvent::StatusLine {
                    message: format!("line {seq}"),
                },
            )
        };
        assert_eq!(game.apply_message(&line(3), 0), Applied::Ignored);
        assert_eq!(game.apply_message(&line(5), 0), Applied::Applied);
        assert_eq!(game.apply_message(&line(5), 0), Applied::Ignored);
        assert_eq!(game.feed().to_vec(), vec!["hello", "line 5"]);
        assert_eq!(game.last_event_seq(), 5);
    }

    #[test]
    fn own_echo_updates_state_without_notice() {
        let mut game = joined();
        let found = |seq, origin| {
            message(
                seq,
                origin,
                GameEvent::WordSubmitted {
                    username: "alice".to_string(),
                    word: "CAT".to_string(),
                },
            )
        };
        assert_eq!(game.apply_message(&found(5, Some("sessAAAA")), 0), Applied::Suppressed);
        assert!(game.take_notices().is_empty());
        assert_eq!(game.answered().len(), 1);
        assert_eq!(game.leaderboard()[0].total_words_solved, 1);

        assert_eq!(game.apply_message(&found(6, Some("sessBBBB")), 0), Applied::Applied);
        assert_eq!(game.take_notices(), vec!["alice found CAT!"]);
        assert_eq!(game.player().unwrap().total_words_solved(), 2);
    }

    #[test]
    fn rotation_resyncs_the_player() {
        let mut game = joined();
        game.player_mut().unwrap().select_letter(0);
        game.apply_message(
            &message(5, None, GameEvent::RoundRotated { round: view(2, "GOD") }),
            0,
        );
        let player = game.player().unwrap();
        assert_eq!(player.round_seq(), 2);
        assert_eq!(player.available(), &['G', 'O', 'D']);
        assert!(game.submit_request().is_none());
    }

    #[test]
    fn outcomes_update_the_total() {
        let mut game = joined();
        {
            let player = game.player_mut().unwrap();
            player.select_letter(2);
            player.select_letter(1);
            player.select_letter(0);
        }
        match game.submit_request() {
            Some(ClientMsg::Submit {
                candidate,
                seen_letters,
            }) => {
                assert_eq!(candidate, "CAT");
                assert_eq!(seen_letters, "TAC");
            }
            other => panic!("unexpected request {other:?}"),
        }
        game.apply_outcome(1, &SubmitOutcome::Accepted { round_complete: false }, 1, 0);
        assert_eq!(game.player().unwrap().total_words_solved(), 1);
        assert!(game.player().unwrap().staged().is_empty());
        assert_eq!(game.take_notices(), vec!["That's a correct word, congratulations!"]);
    }

    #[test]
    fn game_end_drops_the_player() {
        let mut game = joined();
        game.apply_message(&message(5, None, GameEvent::GameEnded), 0);
        assert!(game.is_ended());
        assert!(game.player().is_none());
        game.apply_message(
            &message(6, None, GameEvent::RoundRotated { round: view(2, "GOD") }),
            0,
        );
        assert!(game.player().is_none());
    }

    #[test]
    fn leaderboard_refresh_requests_resync() {
        let mut game = joined();
        game.apply_message(&message(5, None, GameEvent::LeaderboardRefreshed), 0);
        assert!(game.needs_resync());
        game.apply_server_msg(&ServerMsg::Resync { snapshot: snapshot() }, 0);
        assert!(!game.needs_resync());
    }
}
