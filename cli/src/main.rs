use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use unscramble_core::catalog::{
    default_word_list, word_list_by_slug, DEFAULT_WORD_LIST_SLUG, WORD_LIST_CATALOG,
};
use unscramble_core::codec::{decode, encode};
use unscramble_core::config::{
    ConfigForm, GAME_DURATION_HOURS_DEFAULT, MINUTES_TO_SOLVE_DEFAULT,
};
use unscramble_core::game_id::{random_id, SESSION_ID_LEN};
use unscramble_core::{AdminMsg, ClientMsg, GameId, ServerMsg};
use url::Url;

mod bot;
mod local;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "unscramble-cli", version, about = "Admin and test tools for unscramble games")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Games {
        #[command(subcommand)]
        command: GameCommand,
    },
    /// Lists the built-in word lists.
    WordLists,
    Bot {
        #[command(subcommand)]
        command: bot::BotCommand,
    },
    /// Plays a game against the in-memory host with a simulated clock.
    Local(local::LocalArgs),
}

#[derive(clap::Args, Clone)]
struct AdminArgs {
    #[arg(long, env = "GAME_WS_BASE_URL", default_value = "ws://localhost:8787/ws")]
    base_url: String,
    #[arg(long, env = "GAME_ADMIN_TOKEN")]
    admin_token: String,
}

#[derive(Subcommand)]
enum GameCommand {
    Create {
        #[command(flatten)]
        admin: AdminArgs,
        #[arg(long)]
        game_id: Option<String>,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = DEFAULT_WORD_LIST_SLUG, conflicts_with = "words")]
        word_list: String,
        /// Comma separated words, used instead of a built-in list.
        #[arg(long)]
        words: Option<String>,
        #[arg(long, default_value_t = MINUTES_TO_SOLVE_DEFAULT)]
        minutes_to_solve: u32,
        #[arg(long, default_value_t = 2)]
        words_per_round: u32,
        #[arg(long, default_value_t = GAME_DURATION_HOURS_DEFAULT)]
        hours: u32,
        #[arg(long)]
        no_hint: bool,
        #[arg(long)]
        no_connect: bool,
    },
    ReplaceWords {
        #[command(flatten)]
        admin: AdminArgs,
        game_id: String,
        /// Comma separated words.
        words: String,
    },
    RemovePlayer {
        #[command(flatten)]
        admin: AdminArgs,
        game_id: String,
        username: String,
    },
    End {
        #[command(flatten)]
        admin: AdminArgs,
        game_id: String,
    },
    Delete {
        #[command(flatten)]
        admin: AdminArgs,
        game_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Games { command } => run_game_command(command).await,
        Commands::WordLists => {
            list_word_lists();
            Ok(())
        }
        Commands::Bot { command } => bot::run(command).await,
        Commands::Local(args) => local::run(args).await,
    };
    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run_game_command(command: GameCommand) -> CliResult {
    match command {
        GameCommand::Create {
            admin,
            game_id,
            title,
            word_list,
            words,
            minutes_to_solve,
            words_per_round,
            hours,
            no_hint,
            no_connect,
        } => {
            let game_id = match game_id {
                Some(id) => GameId::parse(&id)?,
                None => GameId::generate(&mut rand::rng()),
            };
            let words = match words {
                Some(words) => words,
                None => match word_list_by_slug(&word_list) {
                    Some(entry) => entry.joined(),
                    None => {
                        list_word_lists();
                        return Err(err_msg(format!("unknown word list: {word_list}")));
                    }
                },
            };
            let form = ConfigForm {
                title,
                words,
                minutes_to_solve: minutes_to_solve.to_string(),
                words_per_round: words_per_round.to_string(),
                total_game_duration_hours: hours.to_string(),
                hint_enabled: !no_hint,
            };
            // catch form mistakes before touching the server
            form.validate(&game_id)?;

            let admin_url = build_admin_url(&admin.base_url, game_id.as_str(), &admin.admin_token)?;
            let join_url = build_join_url(&admin.base_url, game_id.as_str())?;
            println!("game_id: {game_id}");
            println!("join_url: {join_url}");
            if no_connect {
                println!("admin_url: {admin_url}");
                return Ok(());
            }
            send_admin(&admin, game_id.as_str(), AdminMsg::Create { form }).await
        }
        GameCommand::ReplaceWords {
            admin,
            game_id,
            words,
        } => send_admin(&admin, &game_id, AdminMsg::ReplaceWords { words }).await,
        GameCommand::RemovePlayer {
            admin,
            game_id,
            username,
        } => send_admin(&admin, &game_id, AdminMsg::RemovePlayer { username }).await,
        GameCommand::End { admin, game_id } => send_admin(&admin, &game_id, AdminMsg::EndGame).await,
        GameCommand::Delete { admin, game_id } => {
            send_admin(&admin, &game_id, AdminMsg::DeleteGame).await
        }
    }
}

fn list_word_lists() {
    let default_slug = default_word_list().slug;
    println!("available word lists:");
    for entry in WORD_LIST_CATALOG {
        let marker = if entry.slug == default_slug { " [default]" } else { "" };
        println!(
            "  {} ({}, {} words): {}{marker}",
            entry.slug,
            entry.label,
            entry.words.len(),
            entry.title
        );
    }
}

async fn send_admin(admin: &AdminArgs, game_id: &str, msg: AdminMsg) -> CliResult {
    let game_id = GameId::parse(game_id)?;
    let admin_url = build_admin_url(&admin.base_url, game_id.as_str(), &admin.admin_token)?;
    let (mut ws, _response) = tokio_tungstenite::connect_async(admin_url.as_str()).await?;

    send_admin_msg(&mut ws, &msg).await?;
    loop {
        let reply = timeout(REPLY_TIMEOUT, recv_server_msg(&mut ws))
            .await
            .map_err(|_| err_msg("timed out waiting for the server"))??;
        match reply {
            ServerMsg::Welcome { .. } => continue,
            ServerMsg::AdminAck { game_id, action } => {
                println!("{action}: {game_id}");
                break;
            }
            ServerMsg::Error { code, message } => {
                return Err(err_msg(format!("server error {code}: {message}")));
            }
            other => println!("server: {other:?}"),
        }
    }
    let _ = ws.close(None).await;
    Ok(())
}

async fn send_admin_msg(ws: &mut WsStream, msg: &AdminMsg) -> CliResult {
    let Some(payload) = encode(msg) else {
        return Err(err_msg("failed to encode admin message"));
    };
    ws.send(Message::Binary(payload.into())).await?;
    Ok(())
}

pub(crate) async fn send_client_msg(ws: &mut WsStream, msg: &ClientMsg) -> CliResult {
    let Some(payload) = encode(msg) else {
        return Err(err_msg("failed to encode client message"));
    };
    ws.send(Message::Binary(payload.into())).await?;
    Ok(())
}

/// Reads frames until one decodes as a server message.
pub(crate) async fn recv_server_msg(ws: &mut WsStream) -> CliResult<ServerMsg> {
    while let Some(message) = ws.next().await {
        match message? {
            Message::Binary(bytes) => {
                if let Some(msg) = decode::<ServerMsg>(&bytes) {
                    return Ok(msg);
                }
            }
            Message::Text(text) => return Err(err_msg(format!("unexpected text frame: {text}"))),
            Message::Close(frame) => return Err(err_msg(format!("server closed: {frame:?}"))),
            _ => {}
        }
    }
    Err(err_msg("connection closed"))
}

pub(crate) fn build_admin_url(base_url: &str, game_id: &str, token: &str) -> Result<Url, url::ParseError> {
    let mut url = game_url(base_url, game_id)?;
    url.query_pairs_mut().append_pair("admin_token", token);
    Ok(url)
}

pub(crate) fn build_join_url(base_url: &str, game_id: &str) -> Result<Url, url::ParseError> {
    let mut url = game_url(base_url, game_id)?;
    url.set_query(None);
    Ok(url)
}

pub(crate) fn build_player_url(
    base_url: &str,
    game_id: &str,
    username: &str,
    session: &str,
) -> Result<Url, url::ParseError> {
    let mut url = build_join_url(base_url, game_id)?;
    url.query_pairs_mut()
        .append_pair("username", username)
        .append_pair("session", session);
    Ok(url)
}

fn game_url(base_url: &str, game_id: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base_url)?;
    let base_path = url.path().trim_end_matches('/');
    let path = format!("{}/{}", base_path, game_id);
    url.set_path(&path);
    Ok(url)
}

pub(crate) fn generate_session() -> String {
    random_id(&mut rand::rng(), SESSION_ID_LEN)
}

pub(crate) fn random_between(min: u64, max: u64) -> u64 {
    if max <= min {
        return min;
    }
    rand::rng().random_range(min..=max)
}

pub(crate) fn err_msg(msg: impl Into<String>) -> Box<dyn std::error::Error> {
    msg.into().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_url_appends_game_and_token() {
        let url = build_admin_url("ws://localhost:8787/ws/", "AbCdEfGhJk", "secret").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8787/ws/AbCdEfGhJk?admin_token=secret");
    }

    #[test]
    fn join_url_drops_query() {
        let url = build_join_url("wss://example.com/ws?x=1", "AbCdEfGhJk").unwrap();
        assert_eq!(url.as_str(), "wss://example.com/ws/AbCdEfGhJk");
    }

    #[test]
    fn player_url_carries_identity() {
        let url = build_player_url("ws://localhost:8787/ws", "AbCdEfGhJk", "bot 1", "abcd1234").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:8787/ws/AbCdEfGhJk?username=bot+1&session=abcd1234"
        );
    }

    #[test]
    fn sessions_have_the_expected_shape() {
        let session = generate_session();
        assert_eq!(session.len(), SESSION_ID_LEN);
        assert!(session.chars().all(|ch| ch.is_ascii_alphanumeric()));
    }
}
