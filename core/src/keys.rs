//! Per-game storage key names. Every key is stored as `{game_id}:{name}`.

use std::time::Duration;

pub const KEY_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

pub const WORDS: &str = "words";
pub const TITLE: &str = "title";
pub const WORDS_COUNT: &str = "wordsCount";
pub const MINUTES_TO_SOLVE: &str = "minutesToSolve";
pub const TOTAL_GAME_DURATION_HOURS: &str = "totalGameDurationHours";
pub const HINT_ENABLED: &str = "hintEnabled";
pub const WORDS_AND_LETTERS: &str = "wordsAndLetters";
pub const ANSWERED_WORDS: &str = "answeredWords";
pub const STATUS_MESSAGES: &str = "statusMessages";
pub const LEADERBOARD: &str = "leaderboard";
pub const CHANGE_LETTERS_JOB_ID: &str = "changeLettersJobId";
pub const SHOW_HINT_JOB_ID: &str = "showHintJobId";
pub const END_GAME_JOB_ID: &str = "endGameJobId";
pub const EVENT_SEQ: &str = "eventSeq";
pub const GAME_ENDED: &str = "gameEnded";

pub const JOB_ID_KEYS: &[&str] = &[CHANGE_LETTERS_JOB_ID, SHOW_HINT_JOB_ID, END_GAME_JOB_ID];

pub const ALL: &[&str] = &[
    WORDS,
    TITLE,
    WORDS_COUNT,
    MINUTES_TO_SOLVE,
    TOTAL_GAME_DURATION_HOURS,
    HINT_ENABLED,
    WORDS_AND_LETTERS,
    ANSWERED_WORDS,
    STATUS_MESSAGES,
    LEADERBOARD,
    CHANGE_LETTERS_JOB_ID,
    SHOW_HINT_JOB_ID,
    END_GAME_JOB_ID,
    EVENT_SEQ,
    GAME_ENDED,
];
