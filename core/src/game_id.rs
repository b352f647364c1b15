use std::fmt;

use rand::Rng;

pub const GAME_ID_LEN: usize = 10;
pub const SESSION_ID_LEN: usize = 8;
pub const GAME_ID_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub fn is_valid_game_id(value: &str) -> bool {
    if value.len() != GAME_ID_LEN {
        return false;
    }
    value.chars().all(|ch| GAME_ID_ALPHABET.contains(ch))
}

/// Random string over the game id alphabet. Also used for session ids.
pub fn random_id<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    let alphabet = GAME_ID_ALPHABET.as_bytes();
    let mut id = String::with_capacity(len);
    for _ in 0..len {
        let idx = rng.random_range(0..alphabet.len());
        id.push(alphabet[idx] as char);
    }
    id
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GameId(String);

impl GameId {
    pub fn parse(value: &str) -> Result<Self, GameIdError> {
        if value.len() != GAME_ID_LEN {
            return Err(GameIdError::InvalidLength {
                expected: GAME_ID_LEN,
                found: value.len(),
            });
        }
        for (idx, ch) in value.chars().enumerate() {
            if !GAME_ID_ALPHABET.contains(ch) {
                return Err(GameIdError::InvalidCharacter { ch, index: idx });
            }
        }
        Ok(Self(value.to_string()))
    }

    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(random_id(rng, GAME_ID_LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key namespaced under this game.
    pub fn key(&self, name: &str) -> String {
        format!("{}:{}", self.0, name)
    }

    /// Realtime channel carrying this game's events.
    pub fn channel(&self) -> String {
        format!("game:{}", self.0)
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for GameId {
    type Err = GameIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for GameId {
    type Error = GameIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<GameId> for String {
    fn from(value: GameId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameIdError {
    InvalidLength { expected: usize, found: usize },
    InvalidCharacter { ch: char, index: usize },
}

impl fmt::Display for GameIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameIdError::InvalidLength { expected, found } => {
                write!(f, "game id must be {expected} chars, got {found}")
            }
            GameIdError::InvalidCharacter { ch, index } => {
                write!(f, "invalid character '{ch}' at position {index}")
            }
        }
    }
}

impl std::error::Error for GameIdError {}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn parse_rejects_bad_ids() {
        assert_eq!(
            GameId::parse("short"),
            Err(GameIdError::InvalidLength {
                expected: GAME_ID_LEN,
                found: 5
            })
        );
        assert_eq!(
            GameId::parse("abcde-ghij"),
            Err(GameIdError::InvalidCharacter { ch: '-', index: 5 })
        );
    }

    #[test]
    fn generated_ids_are_valid() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..32 {
            let id = GameId::generate(&mut rng);
            assert!(is_valid_game_id(id.as_str()));
        }
    }

    #[test]
    fn keys_and_channel_are_namespaced() {
        let id = GameId::parse("g1g1g1g1g1").unwrap();
        assert_eq!(id.key("words"), "g1g1g1g1g1:words");
        assert_eq!(id.channel(), "game:g1g1g1g1g1");
    }

    #[test]
    fn serde_round_trip_validates() {
        let id = GameId::parse("AbCdEfGh12").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"AbCdEfGh12\"");
        assert!(serde_json::from_str::<GameId>("\"nope\"").is_err());
    }
}
