use rkyv::Archive;

use crate::round::Round;

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
pub struct AnsweredWord {
    pub word: String,
    pub username: String,
}

/// Words claimed in the current round, first claimant wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct AnsweredSet {
    entries: Vec<AnsweredWord>,
}

impl AnsweredSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[AnsweredWord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.claimed_by(word).is_some()
    }

    pub fn claimed_by(&self, word: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.word == word)
            .map(|entry| entry.username.as_str())
    }

    /// Returns false when the word was already claimed.
    pub fn record(&mut self, word: &str, username: &str) -> bool {
        if self.contains(word) {
            return false;
        }
        self.entries.push(AnsweredWord {
            word: word.to_string(),
            username: username.to_string(),
        });
        true
    }

    pub fn is_complete(&self, round: &Round) -> bool {
        round.is_playable() && round.target_words.iter().all(|word| self.contains(word))
    }

    pub fn into_entries(self) -> Vec<AnsweredWord> {
        self.entries
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Archive, rkyv::Serialize, rkyv::Deserialize,
)]
pub enum SubmitOutcome {
    /// The player was looking at an older scramble; resync, no score change.
    Stale,
    Invalid,
    AlreadyAnswered { by: String },
    Accepted { round_complete: bool },
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted { .. })
    }

    pub fn message(&self) -> String {
        match self {
            SubmitOutcome::Stale => "The letters changed, try again with the new round.".to_string(),
            SubmitOutcome::Invalid => "Sorry, that's not a valid word!".to_string(),
            SubmitOutcome::AlreadyAnswered { by } => format!("{by} already found that word."),
            SubmitOutcome::Accepted { .. } => "That's a correct word, congratulations!".to_string(),
        }
    }
}

pub fn normalize_candidate(candidate: &str) -> String {
    candidate.trim().to_uppercase()
}

/// Decides a submission against the authoritative round without touching it.
/// `seen_letters` is the scramble the player was shown when they submitted.
pub fn validate_submission(
    candidate: &str,
    seen_letters: &str,
    round: &Round,
    answered: &AnsweredSet,
) -> SubmitOutcome {
    if seen_letters != round.scrambled_letters {
        return SubmitOutcome::Stale;
    }
    let word = normalize_candidate(candidate);
    if !round.is_target(&word) {
        return SubmitOutcome::Invalid;
    }
    if let Some(by) = answered.claimed_by(&word) {
        return SubmitOutcome::AlreadyAnswered { by: by.to_string() };
    }
    let round_complete = round
        .target_words
        .iter()
        .all(|target| *target == word || answered.contains(target));
    SubmitOutcome::Accepted { round_complete }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round() -> Round {
        Round {
            seq: 1,
            target_words: vec!["CAT".to_string(), "DOG".to_string()],
            scrambled_letters: "GODTAC".to_string(),
            expire_at_ms: 60_000,
        }
    }

    fn submit(candidate: &str, username: &str, round: &Round, answered: &mut AnsweredSet) -> SubmitOutcome {
        let outcome = validate_submission(candidate, &round.scrambled_letters, round, answered);
        if outcome.is_accepted() {
            answered.record(&normalize_candidate(candidate), username);
        }
        outcome
    }

    #[test]
    fn first_claimant_wins_and_completion_is_reported() {
        let round = round();
        let mut answered = AnsweredSet::new();
        assert_eq!(
            submit("CAT", "alice", &round, &mut answered),
            SubmitOutcome::Accepted {
                round_complete: false
            }
        );
        assert_eq!(
            submit("CAT", "bob", &round, &mut answered),
            SubmitOutcome::AlreadyAnswered {
                by: "alice".to_string()
            }
        );
        assert_eq!(
            submit("DOG", "bob", &round, &mut answered),
            SubmitOutcome::Accepted {
                round_complete: true
            }
        );
        assert!(answered.is_complete(&round));
    }

    #[test]
    fn every_word_is_credited_once() {
        let round = round();
        let mut answered = AnsweredSet::new();
        let attempts = [
            ("dog", "carol"),
            ("cat", "alice"),
            ("DOG", "alice"),
            (" Cat ", "bob"),
            ("cat", "carol"),
        ];
        let accepted: Vec<_> = attempts
            .iter()
            .filter(|(word, user)| submit(word, user, &round, &mut answered).is_accepted())
            .collect();
        assert_eq!(accepted.len(), 2);
        assert_eq!(answered.claimed_by("DOG"), Some("carol"));
        assert_eq!(answered.claimed_by("CAT"), Some("alice"));
    }

    #[test]
    fn stale_letters_win_over_everything() {
        let round = round();
        let answered = AnsweredSet::new();
        assert_eq!(
            validate_submission("CAT", "OLDLETTERS", &round, &answered),
            SubmitOutcome::Stale
        );
    }

    #[test]
    fn invalid_words_do_not_mutate() {
        let round = round();
        let mut answered = AnsweredSet::new();
        assert_eq!(submit("TAG", "alice", &round, &mut answered), SubmitOutcome::Invalid);
        assert!(answered.is_empty());
    }

    #[test]
    fn record_refuses_duplicates() {
        let mut answered = AnsweredSet::new();
        assert!(answered.record("CAT", "alice"));
        assert!(!answered.record("CAT", "bob"));
        assert_eq!(answered.len(), 1);
        assert_eq!(answered.claimed_by("CAT"), Some("alice"));
    }

    #[test]
    fn answered_set_persists_as_plain_array() {
        let mut answered = AnsweredSet::new();
        answered.record("CAT", "alice");
        let json = serde_json::to_string(&answered).unwrap();
        assert_eq!(json, r#"[{"word":"CAT","username":"alice"}]"#);
    }

    #[test]
    fn messages_name_the_claimant() {
        let outcome = SubmitOutcome::AlreadyAnswered {
            by: "alice".to_string(),
        };
        assert_eq!(outcome.message(), "alice already found that word.");
    }
}
