use super::*;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use unscramble_core::memory::MemoryHost;
use unscramble_core::{ClientGame, GameEngine, RoundPhase};

use crate::bot::{stage_word, Dictionary};

const START_MS: i64 = 1_700_000_000_000;

#[derive(clap::Args)]
pub(super) struct LocalArgs {
    #[arg(long, default_value = DEFAULT_WORD_LIST_SLUG)]
    word_list: String,
    #[arg(long, default_value_t = 2)]
    words_per_round: u32,
    #[arg(long, default_value_t = 1)]
    minutes_to_solve: u32,
    #[arg(long, default_value_t = 1)]
    hours: u32,
    #[arg(long, default_value_t = 3)]
    players: usize,
    /// Simulated seconds per step.
    #[arg(long, default_value_t = 5)]
    step_secs: u32,
    /// Chance that a player guesses during a step.
    #[arg(long, default_value_t = 0.15)]
    guess_rate: f64,
    #[arg(long)]
    seed: Option<u64>,
    /// Prints every status line as it is published.
    #[arg(long)]
    verbose: bool,
}

struct LocalPlayer {
    name: String,
    session: String,
    client: Rc<RefCell<ClientGame>>,
}

pub(super) async fn run(args: LocalArgs) -> CliResult {
    let Some(entry) = word_list_by_slug(&args.word_list) else {
        list_word_lists();
        return Err(err_msg(format!("unknown word list: {}", args.word_list)));
    };
    let seed = args.seed.unwrap_or_else(|| rand::rng().random());
    let mut rng = StdRng::seed_from_u64(seed);
    let game_id = GameId::generate(&mut rng);
    let form = ConfigForm {
        title: entry.title.to_string(),
        words: entry.joined(),
        minutes_to_solve: args.minutes_to_solve.to_string(),
        words_per_round: args.words_per_round.to_string(),
        total_game_duration_hours: args.hours.to_string(),
        hint_enabled: true,
    };
    let config = form.validate(&game_id)?;
    let dictionary = Dictionary::new(config.word_pool.clone());

    let host = MemoryHost::new(START_MS);
    let players: Vec<LocalPlayer> = (0..args.players.max(1))
        .map(|index| {
            let name = format!("player{}", index + 1);
            let session = random_id(&mut rng, SESSION_ID_LEN);
            let client = Rc::new(RefCell::new(ClientGame::new(game_id.as_str(), &name, &session)));
            let subscriber = client.clone();
            let clock = host.clock.clone();
            host.realtime.subscribe(&game_id.channel(), move |message| {
                subscriber.borrow_mut().apply_message(message, clock.now_ms());
            });
            LocalPlayer {
                name,
                session,
                client,
            }
        })
        .collect();
    if args.verbose {
        host.realtime.subscribe(&game_id.channel(), |message| {
            if let unscramble_core::GameEvent::StatusLine { message } = &message.event {
                println!("  | {message}");
            }
        });
    }

    println!("game {game_id} (seed {seed}): {}", config.title);
    let mut engine = GameEngine::new(host.clone(), game_id.clone(), seed);
    engine.create(config).await?;
    for player in &players {
        let snapshot = engine.snapshot(&player.name).await?;
        player.client.borrow_mut().apply_snapshot(&snapshot, host.clock.now_ms());
    }

    let step_ms = i64::from(args.step_secs.max(1)) * 1000;
    let guess_rate = args.guess_rate.clamp(0.0, 1.0);
    let mut submitted = 0u32;
    while engine.phase() != RoundPhase::Ended {
        let now = host.clock.advance(step_ms);
        for job in host.scheduler.take_due(now) {
            engine.handle_job(&job).await?;
        }
        if engine.phase() == RoundPhase::Ended {
            break;
        }
        for player in &players {
            if !rng.random_bool(guess_rate) {
                continue;
            }
            let Some(request) = stage_guess(player, &dictionary, &mut rng) else {
                continue;
            };
            let ClientMsg::Submit {
                candidate,
                seen_letters,
            } = request
            else {
                continue;
            };
            let reply = engine
                .submit(&player.name, Some(&player.session), &candidate, &seen_letters)
                .await?;
            submitted += 1;
            player.client.borrow_mut().apply_outcome(
                reply.round_seq,
                &reply.outcome,
                reply.total_words_solved,
                host.clock.now_ms(),
            );
        }
    }

    println!("game over after {submitted} submissions");
    println!("leaderboard:");
    for entry in engine.leaderboard().await? {
        println!("  {:<12} {}", entry.username, entry.total_words_solved);
    }
    // what a connected viewer ended up with, rebuilt from channel events alone
    let viewer = players[0].client.borrow();
    let feed = viewer.feed();
    if feed.is_empty() {
        println!("{} saw no status lines", viewer.username());
    } else {
        println!("status feed as {} saw it:", viewer.username());
        for line in feed.messages() {
            println!("  {line}");
        }
    }
    Ok(())
}

/// Picks a word the player has not seen answered yet and stages it.
fn stage_guess(player: &LocalPlayer, dictionary: &Dictionary, rng: &mut StdRng) -> Option<ClientMsg> {
    let mut client = player.client.borrow_mut();
    let round = client.round().cloned()?;
    let answered: HashSet<String> = client
        .answered()
        .iter()
        .map(|entry| entry.word.clone())
        .collect();
    let guesses = dictionary.guesses(&round, &answered);
    let word = guesses.choose(rng)?.to_string();
    let staged = stage_word(client.player_mut()?, &word, rng);
    if !staged {
        return None;
    }
    client.submit_request()
}
