use std::fmt;

use rkyv::{Archive, Deserialize, Serialize};

use crate::game_id::GameId;

pub const STATUS_FEED_CAP: usize = 10;

pub const MINUTES_TO_SOLVE_MIN: u32 = 1;
pub const MINUTES_TO_SOLVE_MAX: u32 = 24 * 60;
pub const MINUTES_TO_SOLVE_DEFAULT: u32 = 5;

pub const GAME_DURATION_HOURS_MIN: u32 = 1;
// keys live for 30 days, so a game may not outlast them
pub const GAME_DURATION_HOURS_MAX: u32 = 30 * 24;
pub const GAME_DURATION_HOURS_DEFAULT: u32 = 7 * 24;

pub const DEFAULT_TITLE: &str = "Unscramble Game";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordsPerRound {
    One,
    Two,
}

impl WordsPerRound {
    pub fn from_count(count: u32) -> Option<Self> {
        match count {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            _ => None,
        }
    }

    pub fn count(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    pub game_id: GameId,
    pub title: String,
    pub word_pool: Vec<String>,
    pub round_duration_minutes: u32,
    pub words_per_round: WordsPerRound,
    pub total_game_duration_hours: u32,
    pub hint_enabled: bool,
}

impl GameConfig {
    pub fn round_duration_secs(&self) -> u64 {
        u64::from(self.round_duration_minutes) * 60
    }

    pub fn round_duration_ms(&self) -> i64 {
        self.round_duration_secs() as i64 * 1000
    }

    pub fn hint_delay_ms(&self) -> i64 {
        self.round_duration_ms() / 2
    }

    pub fn game_duration_ms(&self) -> i64 {
        i64::from(self.total_game_duration_hours) * 60 * 60 * 1000
    }
}

/// Raw moderator form input. Everything arrives as text and is checked by
/// [`ConfigForm::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct ConfigForm {
    pub title: String,
    pub words: String,
    pub minutes_to_solve: String,
    pub words_per_round: String,
    pub total_game_duration_hours: String,
    pub hint_enabled: bool,
}

impl Default for ConfigForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            words: String::new(),
            minutes_to_solve: MINUTES_TO_SOLVE_DEFAULT.to_string(),
            words_per_round: "2".to_string(),
            total_game_duration_hours: GAME_DURATION_HOURS_DEFAULT.to_string(),
            hint_enabled: true,
        }
    }
}

impl ConfigForm {
    pub fn validate(&self, game_id: &GameId) -> Result<GameConfig, ConfigError> {
        let word_pool = parse_word_list(&self.words)?;
        let words_per_round = parse_words_per_round(&self.words_per_round)?;
        validate_pool(&word_pool, words_per_round)?;
        let round_duration_minutes = parse_bounded(
            "minutes_to_solve",
            &self.minutes_to_solve,
            MINUTES_TO_SOLVE_MIN,
            MINUTES_TO_SOLVE_MAX,
        )?;
        let total_game_duration_hours = parse_bounded(
            "total_game_duration_hours",
            &self.total_game_duration_hours,
            GAME_DURATION_HOURS_MIN,
            GAME_DURATION_HOURS_MAX,
        )?;
        let title = match self.title.trim() {
            "" => DEFAULT_TITLE.to_string(),
            title => title.to_string(),
        };
        Ok(GameConfig {
            game_id: game_id.clone(),
            title,
            word_pool,
            round_duration_minutes,
            words_per_round,
            total_game_duration_hours,
            hint_enabled: self.hint_enabled,
        })
    }
}

/// Splits a comma separated list, upper-cases each word and drops repeats
/// while keeping first-seen order. Blank entries are skipped.
pub fn parse_word_list(raw: &str) -> Result<Vec<String>, ConfigError> {
    let mut words: Vec<String> = Vec::new();
    for entry in raw.split(',') {
        let word = entry.trim();
        if word.is_empty() {
            continue;
        }
        if !word.chars().all(char::is_alphabetic) {
            return Err(ConfigError::InvalidWord {
                word: word.to_string(),
            });
        }
        let word = word.to_uppercase();
        if !words.contains(&word) {
            words.push(word);
        }
    }
    if words.is_empty() {
        return Err(ConfigError::EmptyWordPool);
    }
    Ok(words)
}

pub fn validate_pool(words: &[String], words_per_round: WordsPerRound) -> Result<(), ConfigError> {
    if words.is_empty() {
        return Err(ConfigError::EmptyWordPool);
    }
    let needed = words_per_round.count();
    if words.len() < needed {
        return Err(ConfigError::NotEnoughWords {
            needed,
            found: words.len(),
        });
    }
    Ok(())
}

fn parse_words_per_round(raw: &str) -> Result<WordsPerRound, ConfigError> {
    let value = raw.trim();
    value
        .parse::<u32>()
        .ok()
        .and_then(WordsPerRound::from_count)
        .ok_or_else(|| ConfigError::InvalidWordsPerRound {
            value: value.to_string(),
        })
}

fn parse_bounded(field: &'static str, raw: &str, min: u32, max: u32) -> Result<u32, ConfigError> {
    let trimmed = raw.trim();
    let value = trimmed
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidNumber {
            field,
            value: trimmed.to_string(),
        })?;
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EmptyWordPool,
    InvalidWord { word: String },
    NotEnoughWords { needed: usize, found: usize },
    InvalidNumber { field: &'static str, value: String },
    OutOfRange { field: &'static str, value: u32, min: u32, max: u32 },
    InvalidWordsPerRound { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyWordPool => write!(f, "the word list is empty"),
            ConfigError::InvalidWord { word } => {
                write!(f, "'{word}' must contain letters only")
            }
            ConfigError::NotEnoughWords { needed, found } => {
                write!(f, "need at least {needed} distinct words, got {found}")
            }
            ConfigError::InvalidNumber { field, value } => {
                write!(f, "{field} must be a whole number, got '{value}'")
            }
            ConfigError::OutOfRange {
                field,
                value,
                min,
                max,
            } => write!(f, "{field} must be between {min} and {max}, got {value}"),
            ConfigError::InvalidWordsPerRound { value } => {
                write!(f, "words per round must be 1 or 2, got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
