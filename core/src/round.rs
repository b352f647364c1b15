use rand::seq::SliceRandom;
use rand::Rng;

use crate::answer::AnsweredSet;
use crate::config::GameConfig;
use crate::protocol::RoundView;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub seq: u64,
    pub target_words: Vec<String>,
    pub scrambled_letters: String,
    pub expire_at_ms: i64,
}

impl Round {
    /// Placeholder for a game with nothing to play. Never activated.
    pub fn empty(seq: u64, now_ms: i64) -> Self {
        Self {
            seq,
            target_words: Vec::new(),
            scrambled_letters: String::new(),
            expire_at_ms: now_ms,
        }
    }

    pub fn is_playable(&self) -> bool {
        !self.target_words.is_empty()
    }

    pub fn unshuffled(&self) -> String {
        self.target_words.concat()
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expire_at_ms
    }

    pub fn is_target(&self, word: &str) -> bool {
        self.target_words.iter().any(|target| target == word)
    }

    pub fn view(&self) -> RoundView {
        RoundView {
            seq: self.seq,
            scrambled_letters: self.scrambled_letters.clone(),
            expire_at_ms: self.expire_at_ms,
            word_lengths: self
                .target_words
                .iter()
                .map(|word| word.chars().count() as u32)
                .collect(),
        }
    }

    /// First letter of every unclaimed word, the rest blanked: `K____ S___`.
    pub fn hint(&self, answered: &AnsweredSet) -> Option<String> {
        let parts: Vec<String> = self
            .target_words
            .iter()
            .filter(|word| !answered.contains(word))
            .filter_map(|word| {
                let mut chars = word.chars();
                let first = chars.next()?;
                let mut masked = String::with_capacity(word.len());
                masked.push(first);
                masked.extend(chars.map(|_| '_'));
                Some(masked)
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

pub fn generate_round<R: Rng + ?Sized>(
    config: &GameConfig,
    seq: u64,
    now_ms: i64,
    rng: &mut R,
) -> Round {
    let pool = &config.word_pool;
    if pool.is_empty() {
        return Round::empty(seq, now_ms);
    }
    let wanted = config.words_per_round.count().min(pool.len());
    let target_words: Vec<String> = pick_distinct_indices(pool.len(), wanted, rng)
        .into_iter()
        .map(|idx| pool[idx].to_uppercase())
        .collect();
    let letters: Vec<char> = target_words.concat().chars().collect();
    let scrambled = scramble_letters(&letters, rng);
    Round {
        seq,
        target_words,
        scrambled_letters: scrambled.into_iter().collect(),
        expire_at_ms: now_ms + config.round_duration_ms(),
    }
}

fn pick_distinct_indices<R: Rng + ?Sized>(len: usize, wanted: usize, rng: &mut R) -> Vec<usize> {
    let wanted = wanted.min(len);
    let mut picked = Vec::with_capacity(wanted);
    while picked.len() < wanted {
        let idx = rng.random_range(0..len);
        if !picked.contains(&idx) {
            picked.push(idx);
        }
    }
    picked
}

pub fn has_distinct_letters(letters: &[char]) -> bool {
    match letters.first() {
        Some(first) => letters.iter().any(|ch| ch != first),
        None => false,
    }
}

/// Shuffles until the order differs from `letters`. With fewer than two
/// distinct letters no other order exists and the input is returned.
pub fn scramble_letters<R: Rng + ?Sized>(letters: &[char], rng: &mut R) -> Vec<char> {
    let mut shuffled = letters.to_vec();
    if !has_distinct_letters(letters) {
        return shuffled;
    }
    loop {
        shuffled.shuffle(rng);
        if shuffled != letters {
            return shuffled;
        }
    }
}

/// Whether `word` can be spelled from the multiset `letters`.
pub fn can_spell(word: &str, letters: &str) -> bool {
    let mut pool: Vec<char> = letters.chars().collect();
    for ch in word.chars() {
        match pool.iter().position(|candidate| *candidate == ch) {
            Some(idx) => {
                pool.swap_remove(idx);
            }
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WordsPerRound;
    use crate::game_id::GameId;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn config(words: &[&str], words_per_round: WordsPerRound) -> GameConfig {
        GameConfig {
            game_id: GameId::parse("RoundTest1").unwrap(),
            title: "test".to_string(),
            word_pool: words.iter().map(|w| w.to_string()).collect(),
            round_duration_minutes: 2,
            words_per_round,
            total_game_duration_hours: 1,
            hint_enabled: false,
        }
    }

    fn sorted(value: &str) -> Vec<char> {
        let mut chars: Vec<char> = value.chars().collect();
        chars.sort_unstable();
        chars
    }

    #[test]
    fn two_word_round_is_a_real_permutation() {
        let config = config(&["APPLE", "MANGO"], WordsPerRound::Two);
        for seed in 0..200 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let round = generate_round(&config, 1, 1_000, &mut rng);
            assert_eq!(round.target_words.len(), 2);
            assert_ne!(round.target_words[0], round.target_words[1]);
            assert_eq!(sorted(&round.scrambled_letters), sorted("APPLEMANGO"));
            assert_ne!(round.scrambled_letters, round.unshuffled());
            assert_ne!(round.scrambled_letters, "APPLEMANGO");
        }
    }

    #[test]
    fn scramble_never_equals_answer() {
        let config = config(&["AB", "ABA", "KYLE", "STAN"], WordsPerRound::One);
        for seed in 0..500 {
            let mut rng = SmallRng::seed_from_u64(seed);
            let round = generate_round(&config, 1, 0, &mut rng);
            assert_ne!(round.scrambled_letters, round.unshuffled());
        }
    }

    #[test]
    fn uniform_letters_are_returned_as_is() {
        let config = config(&["AAA"], WordsPerRound::One);
        let mut rng = SmallRng::seed_from_u64(3);
        let round = generate_round(&config, 1, 0, &mut rng);
        assert_eq!(round.scrambled_letters, "AAA");
    }

    #[test]
    fn expiry_and_case() {
        let config = config(&["kenny"], WordsPerRound::One);
        let mut rng = SmallRng::seed_from_u64(11);
        let round = generate_round(&config, 4, 10_000, &mut rng);
        assert_eq!(round.seq, 4);
        assert_eq!(round.target_words, vec!["KENNY"]);
        assert_eq!(round.expire_at_ms, 10_000 + 120_000);
        assert!(!round.is_expired(129_999));
        assert!(round.is_expired(130_000));
    }

    #[test]
    fn small_pool_is_clamped_instead_of_looping() {
        let config = config(&["STAN"], WordsPerRound::Two);
        let mut rng = SmallRng::seed_from_u64(5);
        let round = generate_round(&config, 1, 0, &mut rng);
        assert_eq!(round.target_words, vec!["STAN"]);
    }

    #[test]
    fn empty_pool_gives_unplayable_round() {
        let config = config(&[], WordsPerRound::One);
        let mut rng = SmallRng::seed_from_u64(1);
        let round = generate_round(&config, 9, 500, &mut rng);
        assert!(!round.is_playable());
        assert_eq!(round, Round::empty(9, 500));
    }

    #[test]
    fn hint_masks_unclaimed_words() {
        let round = Round {
            seq: 1,
            target_words: vec!["KYLE".to_string(), "STAN".to_string()],
            scrambled_letters: "NATSELYK".to_string(),
            expire_at_ms: 0,
        };
        let mut answered = AnsweredSet::new();
        assert_eq!(round.hint(&answered).as_deref(), Some("K___ S___"));
        answered.record("KYLE", "alice");
        assert_eq!(round.hint(&answered).as_deref(), Some("S___"));
        answered.record("STAN", "bob");
        assert_eq!(round.hint(&answered), None);
    }

    #[test]
    fn view_hides_targets() {
        let round = Round {
            seq: 2,
            target_words: vec!["CAT".to_string(), "HORSE".to_string()],
            scrambled_letters: "TACESROH".to_string(),
            expire_at_ms: 50,
        };
        let view = round.view();
        assert_eq!(view.word_lengths, vec![3, 5]);
        assert_eq!(view.scrambled_letters, "TACESROH");
    }

    #[test]
    fn can_spell_respects_counts() {
        assert!(can_spell("APPLE", "LEPPAOGNAM"));
        assert!(!can_spell("APPLE", "APLE"));
        assert!(can_spell("", "ABC"));
    }
}
