use super::*;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use tokio::time::Instant;
use unscramble_core::config::parse_word_list;
use unscramble_core::round::can_spell;
use unscramble_core::session::{PlayerSession, SessionAction};
use unscramble_core::{Applied, ClientGame, RoundView};

#[derive(clap::Subcommand)]
pub(super) enum BotCommand {
    /// Joins a game as a player and guesses from a word list.
    Run {
        #[arg(long, env = "GAME_WS_BASE_URL", default_value = "ws://localhost:8787/ws")]
        base_url: String,
        game_id: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long, default_value = DEFAULT_WORD_LIST_SLUG)]
        word_list: String,
        /// Comma separated dictionary, used instead of a built-in list.
        #[arg(long)]
        words: Option<String>,
        #[arg(long, default_value_t = 60)]
        duration_secs: u64,
        #[arg(long, default_value_t = 1500)]
        think_min_ms: u64,
        #[arg(long, default_value_t = 6000)]
        think_max_ms: u64,
        /// Chance of submitting a scrambled guess instead of a real word.
        #[arg(long, default_value_t = 0.1)]
        miss_rate: f64,
        #[arg(long)]
        seed: Option<u64>,
    },
}

pub(super) async fn run(command: BotCommand) -> CliResult {
    match command {
        BotCommand::Run {
            base_url,
            game_id,
            username,
            word_list,
            words,
            duration_secs,
            think_min_ms,
            think_max_ms,
            miss_rate,
            seed,
        } => {
            let dictionary = match words {
                Some(raw) => Dictionary::new(parse_word_list(&raw)?),
                None => match word_list_by_slug(&word_list) {
                    Some(entry) => Dictionary::new(entry.words.iter().map(|w| w.to_string()).collect()),
                    None => return Err(err_msg(format!("unknown word list: {word_list}"))),
                },
            };
            let config = BotRunConfig {
                duration: Duration::from_secs(duration_secs),
                think_min_ms,
                think_max_ms: think_max_ms.max(think_min_ms),
                miss_rate: miss_rate.clamp(0.0, 1.0),
            };
            let seed = seed.unwrap_or_else(|| rand::rng().random());
            let username = username.unwrap_or_else(|| format!("bot-{}", seed % 10_000));
            run_bot(&base_url, &game_id, &username, dictionary, config, seed).await
        }
    }
}

#[derive(Clone, Copy)]
struct BotRunConfig {
    duration: Duration,
    think_min_ms: u64,
    think_max_ms: u64,
    miss_rate: f64,
}

/// Words the bot knows. Guesses are filtered against the visible round, so
/// the bot never sees the target words.
#[derive(Clone, Debug)]
pub(crate) struct Dictionary {
    words: Vec<String>,
}

impl Dictionary {
    pub(crate) fn new(words: Vec<String>) -> Self {
        let mut seen = HashSet::new();
        let words = words
            .into_iter()
            .map(|word| word.trim().to_uppercase())
            .filter(|word| !word.is_empty() && seen.insert(word.clone()))
            .collect();
        Self { words }
    }

    /// Words that fit the round's letters and one of its word lengths and
    /// that nobody has found or tried yet.
    pub(crate) fn guesses<'a>(
        &'a self,
        round: &RoundView,
        ruled_out: &HashSet<String>,
    ) -> Vec<&'a str> {
        self.words
            .iter()
            .filter(|word| round.word_lengths.contains(&(word.chars().count() as u32)))
            .filter(|word| can_spell(word, &round.scrambled_letters))
            .filter(|word| !ruled_out.contains(word.as_str()))
            .map(String::as_str)
            .collect()
    }
}

/// Stages `word` tile by tile, the way a player taps letters. Returns false
/// when the available tiles cannot spell it.
pub(crate) fn stage_word<R: Rng + ?Sized>(player: &mut PlayerSession, word: &str, rng: &mut R) -> bool {
    player.apply(SessionAction::Reset, rng);
    player.apply(SessionAction::Shuffle, rng);
    for ch in word.chars() {
        let Some(index) = player.available().iter().position(|tile| *tile == ch) else {
            player.reset();
            return false;
        };
        player.apply(SessionAction::Select(index), rng);
    }
    true
}

/// Stages a full-length jumble of the tiles, which is almost never a word.
fn stage_miss<R: Rng + ?Sized>(player: &mut PlayerSession, rng: &mut R) -> bool {
    player.apply(SessionAction::Reset, rng);
    player.apply(SessionAction::Shuffle, rng);
    let mut staged = false;
    while player.apply(SessionAction::Select(0), rng) {
        staged = true;
    }
    staged
}

#[derive(Debug, Default)]
struct BotStats {
    submitted: u32,
    accepted: u32,
    rejected: u32,
    stale: u32,
}

async fn run_bot(
    base_url: &str,
    game_id: &str,
    username: &str,
    dictionary: Dictionary,
    config: BotRunConfig,
    seed: u64,
) -> CliResult {
    let game_id = GameId::parse(game_id)?;
    let session = generate_session();
    let url = build_player_url(base_url, game_id.as_str(), username, &session)?;
    let (mut ws, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
    println!("{username} joined {game_id} (seed {seed})");

    let mut rng = StdRng::seed_from_u64(seed);
    let mut game = ClientGame::new(game_id.as_str(), username, &session);
    let mut tried: HashSet<String> = HashSet::new();
    let mut tried_round = 0u64;
    let mut stats = BotStats::default();
    let deadline = Instant::now() + config.duration;
    let mut next_guess = Instant::now() + think_time(&config);

    loop {
        if Instant::now() >= deadline || game.is_ended() {
            break;
        }
        tokio::select! {
            msg = recv_server_msg(&mut ws) => {
                let msg = msg?;
                let now = now_ms();
                match &msg {
                    ServerMsg::Outcome { candidate, outcome, .. } => {
                        if outcome.is_accepted() {
                            stats.accepted += 1;
                        } else if matches!(outcome, unscramble_core::SubmitOutcome::Stale) {
                            stats.stale += 1;
                        } else {
                            stats.rejected += 1;
                        }
                        println!("{candidate}: {}", outcome.message());
                    }
                    ServerMsg::Error { code, message } => {
                        eprintln!("server error {code}: {message}");
                    }
                    _ => {}
                }
                if game.apply_server_msg(&msg, now) == Applied::Applied {
                    for notice in game.take_notices() {
                        println!("  {notice}");
                    }
                }
            }
            _ = tokio::time::sleep_until(next_guess) => {
                next_guess = Instant::now() + think_time(&config);
                let Some(round) = game.round().cloned() else {
                    continue;
                };
                if round.seq != tried_round {
                    tried.clear();
                    tried_round = round.seq;
                }
                for entry in game.answered() {
                    tried.insert(entry.word.clone());
                }
                let miss = rng.random_bool(config.miss_rate);
                let guess = dictionary.guesses(&round, &tried).choose(&mut rng).map(|word| word.to_string());
                let Some(player) = game.player_mut() else {
                    continue;
                };
                let staged = match (&guess, miss) {
                    (Some(word), false) => stage_word(player, word, &mut rng),
                    _ => stage_miss(player, &mut rng),
                };
                if !staged {
                    continue;
                }
                if let Some(word) = &guess {
                    if !miss {
                        tried.insert(word.clone());
                    }
                }
                if let Some(request) = game.submit_request() {
                    send_client_msg(&mut ws, &request).await?;
                    stats.submitted += 1;
                }
            }
        }
    }

    let _ = ws.close(None).await;
    println!(
        "{username}: submitted {} accepted {} rejected {} stale {}",
        stats.submitted, stats.accepted, stats.rejected, stats.stale
    );
    Ok(())
}

fn think_time(config: &BotRunConfig) -> Duration {
    Duration::from_millis(random_between(config.think_min_ms, config.think_max_ms))
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(letters: &str, lengths: &[u32]) -> RoundView {
        RoundView {
            seq: 1,
            scrambled_letters: letters.to_string(),
            expire_at_ms: 60_000,
            word_lengths: lengths.to_vec(),
        }
    }

    #[test]
    fn guesses_fit_letters_and_lengths() {
        let dictionary = Dictionary::new(vec![
            "kiwi".to_string(),
            "PEAR".to_string(),
            "APPLE".to_string(),
            "PEAR".to_string(),
        ]);
        let round = round("RKWIAIEP", &[4, 4]);
        let guesses = dictionary.guesses(&round, &HashSet::new());
        assert_eq!(guesses, vec!["KIWI", "PEAR"]);

        let ruled_out: HashSet<String> = ["KIWI".to_string()].into_iter().collect();
        assert_eq!(dictionary.guesses(&round, &ruled_out), vec!["PEAR"]);
    }

    #[test]
    fn staging_spells_the_word_from_tiles() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut player = PlayerSession::from_round("bot", &round("RKWIAIEP", &[4, 4]), 0, 0);
        assert!(stage_word(&mut player, "PEAR", &mut rng));
        assert_eq!(player.candidate(), "PEAR");
        assert_eq!(player.available().len(), 4);

        assert!(!stage_word(&mut player, "MANGO", &mut rng));
        assert!(player.staged().is_empty());
    }

    #[test]
    fn a_miss_uses_every_tile() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut player = PlayerSession::from_round("bot", &round("ABCD", &[2, 2]), 0, 0);
        assert!(stage_miss(&mut player, &mut rng));
        assert_eq!(player.candidate().len(), 4);
        assert!(player.available().is_empty());
    }
}
