use rand::Rng;

use crate::protocol::RoundView;
use crate::round::{has_distinct_letters, scramble_letters};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionAction {
    Select(usize),
    Deselect(usize),
    Reset,
    Shuffle,
    Tick,
}

/// One viewer's letter tiles for the current round.
///
/// Letters only move between `available` and `staged`; together they always
/// hold exactly the letters of the round's scramble.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerSession {
    pub username: String,
    round_seq: u64,
    scrambled_letters: String,
    available: Vec<char>,
    staged: Vec<char>,
    remaining_secs: u32,
    total_words_solved: u64,
}

impl PlayerSession {
    pub fn from_round(username: &str, round: &RoundView, total_words_solved: u64, now_ms: i64) -> Self {
        Self {
            username: username.to_string(),
            round_seq: round.seq,
            scrambled_letters: round.scrambled_letters.clone(),
            available: round.scrambled_letters.chars().collect(),
            staged: Vec::new(),
            remaining_secs: remaining_secs(round.expire_at_ms, now_ms),
            total_words_solved,
        }
    }

    pub fn round_seq(&self) -> u64 {
        self.round_seq
    }

    pub fn scrambled_letters(&self) -> &str {
        &self.scrambled_letters
    }

    pub fn available(&self) -> &[char] {
        &self.available
    }

    pub fn staged(&self) -> &[char] {
        &self.staged
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn total_words_solved(&self) -> u64 {
        self.total_words_solved
    }

    pub fn set_total_words_solved(&mut self, total: u64) {
        self.total_words_solved = self.total_words_solved.max(total);
    }

    /// The word currently assembled from staged letters.
    pub fn candidate(&self) -> String {
        self.staged.iter().collect()
    }

    pub fn select_letter(&mut self, index: usize) -> bool {
        if index >= self.available.len() {
            return false;
        }
        let ch = self.available.remove(index);
        self.staged.push(ch);
        true
    }

    pub fn deselect_letter(&mut self, index: usize) -> bool {
        if index >= self.staged.len() {
            return false;
        }
        let ch = self.staged.remove(index);
        self.available.push(ch);
        true
    }

    pub fn reset(&mut self) -> bool {
        if self.staged.is_empty() {
            return false;
        }
        self.available.append(&mut self.staged);
        true
    }

    /// Reorders available tiles; the staged candidate is untouched.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        if !has_distinct_letters(&self.available) {
            return false;
        }
        self.available = scramble_letters(&self.available, rng);
        true
    }

    pub fn tick(&mut self) -> bool {
        if self.remaining_secs == 0 {
            return false;
        }
        self.remaining_secs -= 1;
        true
    }

    /// Replaces both pools with the letters of `round`.
    pub fn resync(&mut self, round: &RoundView, now_ms: i64) -> bool {
        let changed = round.seq != self.round_seq || round.scrambled_letters != self.scrambled_letters;
        self.round_seq = round.seq;
        self.scrambled_letters = round.scrambled_letters.clone();
        self.available = round.scrambled_letters.chars().collect();
        self.staged.clear();
        self.remaining_secs = remaining_secs(round.expire_at_ms, now_ms);
        changed
    }

    pub fn apply<R: Rng + ?Sized>(&mut self, action: SessionAction, rng: &mut R) -> bool {
        match action {
            SessionAction::Select(index) => self.select_letter(index),
            SessionAction::Deselect(index) => self.deselect_letter(index),
            SessionAction::Reset => self.reset(),
            SessionAction::Shuffle => self.shuffle(rng),
            SessionAction::Tick => self.tick(),
        }
    }
}

pub fn remaining_secs(expire_at_ms: i64, now_ms: i64) -> u32 {
    let left = (expire_at_ms - now_ms).max(0) as u64;
    left.div_ceil(1000).min(u64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn view(letters: &str) -> RoundView {
        RoundView {
            seq: 1,
            scrambled_letters: letters.to_string(),
            expire_at_ms: 10_500,
            word_lengths: vec![letters.chars().count() as u32],
        }
    }

    fn multiset(session: &PlayerSession) -> Vec<char> {
        let mut all: Vec<char> = session.available().iter().chain(session.staged()).copied().collect();
        all.sort_unstable();
        all
    }

    #[test]
    fn letters_are_conserved() {
        let round = view("NATSELYK");
        let mut expected: Vec<char> = round.scrambled_letters.chars().collect();
        expected.sort_unstable();
        let mut session = PlayerSession::from_round("alice", &round, 0, 0);
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..2_000 {
            let action = match rng.random_range(0..5) {
                0 => SessionAction::Select(rng.random_range(0..12)),
                1 => SessionAction::Deselect(rng.random_range(0..12)),
                2 => SessionAction::Reset,
                3 => SessionAction::Shuffle,
                _ => SessionAction::Tick,
            };
            session.apply(action, &mut rng);
            assert_eq!(multiset(&session), expected);
        }
    }

    #[test]
    fn select_and_deselect_move_letters() {
        let mut session = PlayerSession::from_round("alice", &view("TAC"), 0, 0);
        assert!(session.select_letter(2));
        assert!(session.select_letter(1));
        assert!(session.select_letter(0));
        assert_eq!(session.candidate(), "CAT");
        assert!(session.available().is_empty());
        assert!(!session.select_letter(0));
        assert!(session.deselect_letter(0));
        assert_eq!(session.candidate(), "AT");
        assert_eq!(session.available(), &['C']);
        assert!(!session.deselect_letter(5));
    }

    #[test]
    fn reset_appends_staged_letters() {
        let mut session = PlayerSession::from_round("alice", &view("DOG"), 0, 0);
        session.select_letter(0);
        assert!(session.reset());
        assert_eq!(session.available(), &['O', 'G', 'D']);
        assert!(!session.reset());
    }

    #[test]
    fn shuffle_changes_order_but_not_candidate() {
        let mut session = PlayerSession::from_round("alice", &view("ABCDE"), 0, 0);
        session.select_letter(0);
        let before = session.available().to_vec();
        let mut rng = SmallRng::seed_from_u64(9);
        assert!(session.shuffle(&mut rng));
        assert_ne!(session.available(), before.as_slice());
        assert_eq!(session.candidate(), "A");

        let mut uniform = PlayerSession::from_round("bob", &view("ZZZ"), 0, 0);
        assert!(!uniform.shuffle(&mut rng));
    }

    #[test]
    fn countdown_clamps_at_zero() {
        let mut session = PlayerSession::from_round("alice", &view("AB"), 0, 9_000);
        assert_eq!(session.remaining_secs(), 2);
        assert!(session.tick());
        assert!(session.tick());
        assert!(!session.tick());
        assert_eq!(session.remaining_secs(), 0);
        assert_eq!(remaining_secs(1_000, 5_000), 0);
    }

    #[test]
    fn resync_replaces_pools() {
        let mut session = PlayerSession::from_round("alice", &view("TAC"), 3, 0);
        session.select_letter(0);
        let next = RoundView {
            seq: 2,
            scrambled_letters: "GOD".to_string(),
            expire_at_ms: 60_000,
            word_lengths: vec![3],
        };
        assert!(session.resync(&next, 0));
        assert_eq!(session.round_seq(), 2);
        assert!(session.staged().is_empty());
        assert_eq!(session.available(), &['G', 'O', 'D']);
        assert_eq!(session.remaining_secs(), 60);
        assert_eq!(session.total_words_solved(), 3);
    }
}
