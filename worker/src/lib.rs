mod host;

use std::rc::Rc;

use futures_util::lock::{Mutex, MutexGuard};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use unscramble_core::codec::{decode, encode};
use unscramble_core::game_id::{random_id, SESSION_ID_LEN};
use unscramble_core::{
    is_valid_game_id, AdminMsg, Caller, ClientMsg, ConfigForm, GameEngine, GameError, GameId, Host,
    ServerMsg, GAME_ID_LEN,
};
use worker::*;

use crate::host::{now_ms, WorkerHost};

const DEFAULT_GAME_PATH_PREFIX: &str = "/ws/";
const GAME_ID_KEY: &str = "__game_id";
const MAX_USERNAME_LEN: usize = 32;
const ADMIN_NAME: &str = "moderator";

#[event(fetch)]
pub async fn main(req: Request, env: Env, _ctx: Context) -> Result<Response> {
    let path = req.path();
    let prefix = game_path_prefix(&env);
    let game_id = match extract_game_id(&path, &prefix) {
        Some(game_id) => game_id,
        None => return Response::error("not found", 404),
    };

    if !is_valid_game_id(game_id) {
        return Response::error("invalid game id", 400);
    }

    let namespace = env.durable_object("GAMES")?;
    let stub = namespace.get_by_name(game_id)?;

    stub.fetch_with_request(req).await
}

fn game_path_prefix(env: &Env) -> String {
    let raw = env
        .var("GAME_PATH_PREFIX")
        .ok()
        .map(|value| value.to_string())
        .unwrap_or_else(|| DEFAULT_GAME_PATH_PREFIX.to_string());
    normalize_game_path_prefix(&raw)
}

fn normalize_game_path_prefix(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DEFAULT_GAME_PATH_PREFIX.to_string();
    }
    let mut value = trimmed.to_string();
    if !value.starts_with('/') {
        value.insert(0, '/');
    }
    if !value.ends_with('/') {
        value.push('/');
    }
    value
}

fn extract_game_id<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let game = path.strip_prefix(prefix)?;
    if game.is_empty() || game.contains('/') {
        return None;
    }
    if game.len() != GAME_ID_LEN {
        return None;
    }
    Some(game)
}

struct ConnectParams {
    username: Option<String>,
    session: Option<String>,
    admin_token: Option<String>,
}

fn connect_params(req: &Request) -> Result<ConnectParams> {
    let url = req.url()?;
    let mut params = ConnectParams {
        username: None,
        session: None,
        admin_token: None,
    };
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "username" => params.username = Some(value.trim().to_string()),
            "session" => params.session = Some(value.into_owned()),
            "admin_token" => params.admin_token = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok(params)
}

fn valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.chars().count() <= MAX_USERNAME_LEN
        && name.chars().all(|ch| !ch.is_control())
}

fn is_valid_session(session: &str) -> bool {
    session.chars().all(|ch| ch.is_ascii_alphanumeric())
}

fn tag_value<'a>(tags: &'a [String], prefix: &str) -> Option<&'a str> {
    tags.iter().find_map(|tag| tag.strip_prefix(prefix))
}

fn is_admin_from_tags(tags: &[String]) -> bool {
    tags.iter().any(|tag| tag == "admin")
}

fn random_seed() -> u64 {
    let noise = (js_sys::Math::random() * u32::MAX as f64) as u64;
    (noise << 32) ^ now_ms() as u64
}

fn error_msg(err: &GameError) -> ServerMsg {
    ServerMsg::Error {
        code: err.code().to_string(),
        message: err.to_string(),
    }
}

#[durable_object]
pub struct Game {
    state: Rc<State>,
    env: Env,
    engine: Mutex<Option<GameEngine<WorkerHost>>>,
}

impl DurableObject for Game {
    fn new(state: State, env: Env) -> Self {
        Self {
            state: Rc::new(state),
            env,
            engine: Mutex::new(None),
        }
    }

    async fn fetch(&self, req: Request) -> Result<Response> {
        let is_websocket = req
            .headers()
            .get("Upgrade")?
            .map(|h| h.to_ascii_lowercase() == "websocket")
            .unwrap_or(false);
        if !is_websocket {
            return Response::error("expected websocket", 400);
        }

        let params = connect_params(&req)?;
        let is_admin = match &params.admin_token {
            Some(token) => {
                let expected = self.admin_token()?;
                if *token != expected {
                    return Response::error("invalid admin token", 403);
                }
                true
            }
            None => false,
        };

        let path = req.path();
        let prefix = game_path_prefix(&self.env);
        let Some(game_id) = extract_game_id(&path, &prefix).and_then(|id| GameId::parse(id).ok())
        else {
            return Response::error("invalid game id", 400);
        };
        self.remember_game_id(&game_id).await?;

        let username = if is_admin {
            ADMIN_NAME.to_string()
        } else {
            match params.username {
                Some(name) if valid_username(&name) => name,
                _ => return Response::error("missing or invalid username", 400),
            }
        };
        let session = params
            .session
            .filter(|session| session.len() == SESSION_ID_LEN && is_valid_session(session))
            .unwrap_or_else(|| {
                let mut rng = SmallRng::seed_from_u64(random_seed());
                random_id(&mut rng, SESSION_ID_LEN)
            });

        let snapshot = {
            let mut guard = self.engine().await?;
            match guard.as_mut() {
                Some(engine) => match engine.snapshot(&username).await {
                    Ok(snapshot) => Some(snapshot),
                    Err(GameError::NotFound) => None,
                    Err(err) => {
                        console_error!("snapshot for {} failed: {}", game_id, err);
                        None
                    }
                },
                None => None,
            }
        };
        if snapshot.is_none() && !is_admin {
            return Response::error("game not found", 404);
        }

        let pair = WebSocketPair::new()?;
        let server = pair.server;
        let session_tag = format!("session:{session}");
        if is_admin {
            let tags = ["admin", session_tag.as_str()];
            self.state.accept_websocket_with_tags(&server, &tags);
        } else {
            let channel = game_id.channel();
            let user_tag = format!("user:{username}");
            let tags = [channel.as_str(), user_tag.as_str(), session_tag.as_str()];
            self.state.accept_websocket_with_tags(&server, &tags);
        }

        let welcome = ServerMsg::Welcome {
            game_id: game_id.to_string(),
            username,
            session,
            snapshot,
        };
        let _ = self.send_server_msg(&server, &welcome);

        Response::from_websocket(pair.client)
    }

    async fn websocket_message(
        &self,
        ws: WebSocket,
        message: WebSocketIncomingMessage,
    ) -> Result<()> {
        let bytes = match message {
            WebSocketIncomingMessage::Binary(bytes) => bytes,
            WebSocketIncomingMessage::String(_) => return Ok(()),
        };

        let tags = self.state.get_tags(&ws);
        if is_admin_from_tags(&tags) {
            if let Some(msg) = decode::<AdminMsg>(&bytes) {
                return self.handle_admin(&ws, msg).await;
            }
            return Ok(());
        }

        let (Some(username), Some(session)) = (tag_value(&tags, "user:"), tag_value(&tags, "session:"))
        else {
            return Ok(());
        };
        let Some(msg) = decode::<ClientMsg>(&bytes) else {
            return Ok(());
        };

        match msg {
            ClientMsg::Submit {
                candidate,
                seen_letters,
            } => {
                self.handle_submit(&ws, username, session, &candidate, &seen_letters)
                    .await?;
            }
            ClientMsg::RequestFeed => {
                let mut guard = self.engine().await?;
                if let Some(engine) = guard.as_mut() {
                    match engine.status_messages().await {
                        Ok(messages) => {
                            let _ = self.send_server_msg(&ws, &ServerMsg::Feed { messages });
                        }
                        Err(err) => {
                            let _ = self.send_server_msg(&ws, &error_msg(&err));
                        }
                    }
                }
            }
            ClientMsg::Ping { nonce } => {
                let response = ServerMsg::Pong { nonce };
                let _ = self.send_server_msg(&ws, &response);
            }
        }

        Ok(())
    }

    async fn websocket_close(
        &self,
        _ws: WebSocket,
        _code: usize,
        _reason: String,
        _was_clean: bool,
    ) -> Result<()> {
        Ok(())
    }

    async fn websocket_error(&self, _ws: WebSocket, error: Error) -> Result<()> {
        console_error!("websocket error: {}", error);
        Ok(())
    }

    async fn alarm(&self) -> Result<Response> {
        let mut guard = self.engine().await?;
        let Some(engine) = guard.as_mut() else {
            return Response::ok("idle");
        };

        let now = now_ms();
        let due = match engine.host().scheduler().take_due(now).await {
            Ok(due) => due,
            Err(err) => {
                console_error!("loading jobs for {} failed: {}", engine.game_id(), err);
                return Response::error(err.to_string(), 500);
            }
        };
        for job in due {
            match engine.handle_job(&job).await {
                Ok(acted) => {
                    console_log!(
                        "job {} for {} ran at {} (changed: {})",
                        job.name(),
                        job.game_id(),
                        now,
                        acted
                    );
                }
                Err(err) => {
                    console_error!("job {} for {} failed: {}", job.name(), job.game_id(), err);
                }
            }
        }
        Response::ok("ran")
    }
}

impl Game {
    fn admin_token(&self) -> Result<String> {
        Ok(self.env.var("ADMIN_TOKEN")?.to_string())
    }

    async fn remember_game_id(&self, game_id: &GameId) -> Result<()> {
        let storage = self.state.storage();
        let stored: Option<String> = storage.get(GAME_ID_KEY).await?;
        if stored.as_deref() != Some(game_id.as_str()) {
            storage.put(GAME_ID_KEY, game_id.as_str()).await?;
        }
        Ok(())
    }

    /// Locks the engine, building it on first use once the object knows
    /// which game it serves. Held for a whole handler so updates to one game
    /// never interleave.
    async fn engine(&self) -> Result<MutexGuard<'_, Option<GameEngine<WorkerHost>>>> {
        let mut guard = self.engine.lock().await;
        if guard.is_none() {
            let stored: Option<String> = self.state.storage().get(GAME_ID_KEY).await?;
            if let Some(game_id) = stored.and_then(|raw| GameId::parse(&raw).ok()) {
                let host = WorkerHost::new(self.state.clone(), self.env.clone());
                let mut engine = GameEngine::new(host, game_id, random_seed());
                if let Err(err) = engine.refresh_phase().await {
                    console_error!("restoring {} failed: {}", engine.game_id(), err);
                }
                *guard = Some(engine);
            }
        }
        Ok(guard)
    }

    async fn handle_submit(
        &self,
        ws: &WebSocket,
        username: &str,
        session: &str,
        candidate: &str,
        seen_letters: &str,
    ) -> Result<()> {
        let mut guard = self.engine().await?;
        let Some(engine) = guard.as_mut() else {
            return Ok(());
        };
        let response = match engine
            .submit(username, Some(session), candidate, seen_letters)
            .await
        {
            Ok(reply) => ServerMsg::Outcome {
                candidate: candidate.to_string(),
                round_seq: reply.round_seq,
                outcome: reply.outcome,
                total_words_solved: reply.total_words_solved,
            },
            Err(err) => {
                if matches!(err, GameError::Host(_) | GameError::Corrupt { .. }) {
                    console_error!("submit to {} failed: {}", engine.game_id(), err);
                }
                error_msg(&err)
            }
        };
        let _ = self.send_server_msg(ws, &response);
        Ok(())
    }

    async fn handle_admin(&self, ws: &WebSocket, msg: AdminMsg) -> Result<()> {
        let mut guard = self.engine().await?;
        let Some(engine) = guard.as_mut() else {
            let _ = self.send_server_msg(ws, &error_msg(&GameError::NotFound));
            return Ok(());
        };
        let moderator = Caller::moderator(ADMIN_NAME);
        let game_id = engine.game_id().clone();

        let result: std::result::Result<&str, GameError> = match msg {
            AdminMsg::Create { form } => self.create_game(engine, &form).await.map(|_| "create"),
            AdminMsg::ReplaceWords { words } => engine
                .replace_words(&moderator, &words)
                .await
                .map(|count| {
                    console_log!("game {} word list replaced ({} words)", game_id, count);
                    "replace_words"
                }),
            AdminMsg::RemovePlayer { username } => {
                match engine.remove_player(&moderator, &username).await {
                    Ok(()) => {
                        self.resync_players(engine).await;
                        Ok("remove_player")
                    }
                    Err(err) => Err(err),
                }
            }
            AdminMsg::EndGame => engine.end_game().await.map(|ended| {
                if ended {
                    console_log!("game {} ended by moderator", game_id);
                }
                "end_game"
            }),
            AdminMsg::DeleteGame => match engine.delete_game().await {
                Ok(()) => {
                    console_log!("game {} deleted", game_id);
                    self.close_players(&game_id);
                    Ok("delete_game")
                }
                Err(err) => Err(err),
            },
        };

        let response = match result {
            Ok(action) => ServerMsg::AdminAck {
                game_id: game_id.to_string(),
                action: action.to_string(),
            },
            Err(err) => {
                console_error!("admin request for {} failed: {}", game_id, err);
                error_msg(&err)
            }
        };
        let _ = self.send_server_msg(ws, &response);
        Ok(())
    }

    async fn create_game(
        &self,
        engine: &mut GameEngine<WorkerHost>,
        form: &ConfigForm,
    ) -> std::result::Result<(), GameError> {
        let config = form.validate(engine.game_id())?;
        let words = config.word_pool.len();
        let title = config.title.clone();
        let round = engine.create(config).await?;
        console_log!(
            "game {} created: \"{}\" with {} words, round {} expires at {}",
            engine.game_id(),
            title,
            words,
            round.seq,
            round.expire_at_ms
        );
        Ok(())
    }

    /// Sends every connected player a fresh snapshot of their own view.
    async fn resync_players(&self, engine: &mut GameEngine<WorkerHost>) {
        let channel = engine.game_id().channel();
        for socket in self.state.get_websockets_with_tag(&channel) {
            let tags = self.state.get_tags(&socket);
            let Some(username) = tag_value(&tags, "user:") else {
                continue;
            };
            match engine.snapshot(username).await {
                Ok(snapshot) => {
                    let _ = self.send_server_msg(&socket, &ServerMsg::Resync { snapshot });
                }
                Err(err) => {
                    console_error!("resync for {} failed: {}", username, err);
                }
            }
        }
    }

    fn close_players(&self, game_id: &GameId) {
        let msg = error_msg(&GameError::NotFound);
        for socket in self.state.get_websockets_with_tag(&game_id.channel()) {
            let _ = self.send_server_msg(&socket, &msg);
            let _ = socket.close(None, Some("game deleted"));
        }
    }

    fn send_server_msg(&self, ws: &WebSocket, msg: &ServerMsg) -> Result<()> {
        let Some(bytes) = encode(msg) else {
            return Ok(());
        };
        ws.send_with_bytes(bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_normalized() {
        assert_eq!(normalize_game_path_prefix(""), "/ws/");
        assert_eq!(normalize_game_path_prefix("games"), "/games/");
        assert_eq!(normalize_game_path_prefix("/play/"), "/play/");
    }

    #[test]
    fn game_id_is_taken_from_the_path() {
        assert_eq!(extract_game_id("/ws/AbCdE12345", "/ws/"), Some("AbCdE12345"));
        assert_eq!(extract_game_id("/ws/short", "/ws/"), None);
        assert_eq!(extract_game_id("/ws/AbCdE12345/x", "/ws/"), None);
        assert_eq!(extract_game_id("/other/AbCdE12345", "/ws/"), None);
    }

    #[test]
    fn usernames_and_tags() {
        assert!(valid_username("alice"));
        assert!(!valid_username(""));
        assert!(!valid_username(&"x".repeat(33)));
        let tags = vec!["game:AbCdE12345".to_string(), "user:bob".to_string()];
        assert_eq!(tag_value(&tags, "user:"), Some("bob"));
        assert!(!is_admin_from_tags(&tags));
    }
}
