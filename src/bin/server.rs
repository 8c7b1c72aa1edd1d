#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
use anyhow::Context;
#[cfg(not(target_arch = "wasm32"))]
use clap::Parser;
#[cfg(not(target_arch = "wasm32"))]
use duotris::matchmaking::{MatchQueue, PlayerId, RoomFormed};
#[cfg(not(target_arch = "wasm32"))]
use duotris::protocol::{self, ClientMessage, ServerMessage};
#[cfg(not(target_arch = "wasm32"))]
use duotris::room::Room;
#[cfg(not(target_arch = "wasm32"))]
use duotris::session::Action;
#[cfg(not(target_arch = "wasm32"))]
use duotris::GameConfig;
#[cfg(not(target_arch = "wasm32"))]
use futures::{SinkExt, StreamExt};
#[cfg(not(target_arch = "wasm32"))]
use std::collections::HashMap;
#[cfg(not(target_arch = "wasm32"))]
use std::path::PathBuf;
#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};
#[cfg(not(target_arch = "wasm32"))]
use tokio::net::TcpListener;
#[cfg(not(target_arch = "wasm32"))]
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
#[cfg(not(target_arch = "wasm32"))]
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Match server: pairs WebSocket clients and runs their rooms.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Parser, Debug, Clone)]
struct Opts {
    /// Address to listen for websocket connections
    #[arg(long, default_value = "127.0.0.1:9000")]
    listen: String,
    /// Optional path to a game config JSON shared by every room
    #[arg(long)]
    config: Option<PathBuf>,
    /// Room simulation step in milliseconds
    #[arg(long, default_value_t = 16)]
    tick_ms: u64,
}

/// What a connection task receives.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug)]
enum Outgoing {
    Message(ServerMessage),
    Joined(UnboundedSender<RoomInput>),
    Left,
}

#[cfg(not(target_arch = "wasm32"))]
type Outbound = UnboundedSender<Outgoing>;

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug)]
enum LobbyCommand {
    Join { player: PlayerId, outbound: Outbound },
    Cancel { player: PlayerId },
    Leave { player: PlayerId },
    RoomClosed { players: [PlayerId; 2] },
}

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug)]
enum RoomInput {
    Action { player: PlayerId, action: Action },
    Disconnect { player: PlayerId },
}

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .compact()
        .init();

    let opts = Opts::parse();
    let config = match opts.config.as_ref() {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            GameConfig::from_json(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => GameConfig::default(),
    };
    let tick = Duration::from_millis(opts.tick_ms.max(1));

    let (lobby_tx, lobby_rx) = unbounded_channel();
    tokio::spawn(run_lobby(lobby_rx, lobby_tx.clone(), config, tick));

    let listener = TcpListener::bind(&opts.listen).await?;
    tracing::info!(listen = %opts.listen, "match server listening");

    loop {
        let (stream, addr) = listener.accept().await?;
        tracing::debug!(%addr, "ws connected");
        let lobby = lobby_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_conn(stream, lobby).await {
                tracing::warn!(%addr, error = ?e, "connection error");
            }
        });
    }
}

#[cfg(not(target_arch = "wasm32"))]
async fn handle_conn(stream: tokio::net::TcpStream, lobby: UnboundedSender<LobbyCommand>) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (out_tx, mut out_rx) = unbounded_channel::<Outgoing>();

    let mut player: Option<PlayerId> = None;
    let mut room: Option<UnboundedSender<RoomInput>> = None;

    loop {
        tokio::select! {
            Some(out) = out_rx.recv() => {
                match out {
                    Outgoing::Message(msg) => {
                        ws_tx.send(Message::Text(msg.to_json()?)).await?;
                    }
                    Outgoing::Joined(input) => room = Some(input),
                    Outgoing::Left => room = None,
                }
            }
            msg = ws_rx.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(t))) => t,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                };
                let parsed = match ClientMessage::from_json(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        reply_error(&out_tx, format!("invalid message: {e}"));
                        continue;
                    }
                };
                match parsed {
                    ClientMessage::RequestMatch { player_id } => {
                        if room.is_some() {
                            reply_error(&out_tx, "already in a match");
                            continue;
                        }
                        if let Some(previous) = player.replace(player_id.clone()) {
                            if previous != player_id {
                                let _ = lobby.send(LobbyCommand::Leave { player: previous });
                            }
                        }
                        let _ = lobby.send(LobbyCommand::Join { player: player_id, outbound: out_tx.clone() });
                    }
                    ClientMessage::CancelMatch => match player.clone() {
                        Some(player) if room.is_none() => {
                            let _ = lobby.send(LobbyCommand::Cancel { player });
                        }
                        _ => reply_error(&out_tx, "not waiting for a match"),
                    },
                    ClientMessage::Action { action } => match (player.clone(), room.as_ref()) {
                        (Some(player), Some(input)) => {
                            let _ = input.send(RoomInput::Action { player, action });
                        }
                        _ => reply_error(&out_tx, "not in a match"),
                    },
                }
            }
        }
    }

    // The lobby routes this to the room if the player was already paired,
    // even when `Joined` never made it through `out_rx`.
    if let Some(player) = player {
        let _ = lobby.send(LobbyCommand::Leave { player });
    }
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
fn reply_error(out: &Outbound, message: impl Into<String>) {
    let _ = out.send(Outgoing::Message(ServerMessage::Error { message: message.into() }));
}

/// A room the lobby has paired and wired up, ready to run.
#[cfg(not(target_arch = "wasm32"))]
struct RoomLaunch {
    formed: RoomFormed,
    outbound: [Outbound; 2],
    inputs: UnboundedReceiver<RoomInput>,
}

/// Lobby bookkeeping. Players are either waiting in the queue with their
/// connection, or playing, in which case the lobby holds their room's input
/// so a connection that drops at any point still reaches the room.
#[cfg(not(target_arch = "wasm32"))]
struct Lobby {
    queue: MatchQueue,
    waiting: HashMap<PlayerId, Outbound>,
    playing: HashMap<PlayerId, UnboundedSender<RoomInput>>,
}

#[cfg(not(target_arch = "wasm32"))]
impl Lobby {
    fn new(queue: MatchQueue) -> Self {
        Self {
            queue,
            waiting: HashMap::new(),
            playing: HashMap::new(),
        }
    }

    fn handle(&mut self, command: LobbyCommand) -> Option<RoomLaunch> {
        match command {
            LobbyCommand::Join { player, outbound } => self.join(player, outbound),
            LobbyCommand::Cancel { player } => {
                self.queue.cancel(&player);
                if let Some(out) = self.waiting.remove(&player) {
                    let _ = out.send(Outgoing::Message(ServerMessage::Cancelled));
                }
                None
            }
            LobbyCommand::Leave { player } => {
                self.queue.cancel(&player);
                self.waiting.remove(&player);
                if let Some(input) = self.playing.get(&player) {
                    let _ = input.send(RoomInput::Disconnect { player });
                }
                None
            }
            LobbyCommand::RoomClosed { players } => {
                for player in &players {
                    self.playing.remove(player);
                }
                None
            }
        }
    }

    fn join(&mut self, player: PlayerId, outbound: Outbound) -> Option<RoomLaunch> {
        if self.playing.contains_key(&player) || self.waiting.contains_key(&player) {
            reply_error(&outbound, format!("player id {player} is in use"));
            return None;
        }
        self.waiting.insert(player.clone(), outbound.clone());
        let _ = outbound.send(Outgoing::Message(ServerMessage::Queued));
        let formed = self.queue.enqueue(player)?;
        let [a, b] = formed.players.clone();
        let (Some(out_a), Some(out_b)) = (self.waiting.remove(&a), self.waiting.remove(&b)) else {
            tracing::error!(room = formed.room_id, "paired a player with no connection");
            return None;
        };
        let (input_tx, inputs) = unbounded_channel::<RoomInput>();
        for out in [&out_a, &out_b] {
            let _ = out.send(Outgoing::Joined(input_tx.clone()));
        }
        self.playing.insert(a, input_tx.clone());
        self.playing.insert(b, input_tx);
        Some(RoomLaunch {
            formed,
            outbound: [out_a, out_b],
            inputs,
        })
    }
}

#[cfg(not(target_arch = "wasm32"))]
async fn run_lobby(
    mut commands: UnboundedReceiver<LobbyCommand>,
    lobby_tx: UnboundedSender<LobbyCommand>,
    config: GameConfig,
    tick: Duration,
) {
    let mut lobby = Lobby::new(MatchQueue::new());
    while let Some(command) = commands.recv().await {
        if let Some(launch) = lobby.handle(command) {
            tokio::spawn(run_room(launch, config.clone(), tick, lobby_tx.clone()));
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
async fn run_room(launch: RoomLaunch, config: GameConfig, tick: Duration, lobby: UnboundedSender<LobbyCommand>) {
    let RoomLaunch {
        formed,
        outbound,
        mut inputs,
    } = launch;
    let players = formed.players.clone();
    let room_id = formed.room_id;
    let (mut room, mut events) = match Room::new(formed, config) {
        Ok(created) => created,
        Err(e) => {
            tracing::error!(room = room_id, error = %e, "could not open room");
            for out in &outbound {
                reply_error(out, e.to_string());
            }
            let _ = lobby.send(LobbyCommand::RoomClosed { players });
            return;
        }
    };
    let routes: HashMap<PlayerId, Outbound> = players.iter().cloned().zip(outbound.iter().cloned()).collect();

    room.start();
    let mut last_seq: [Option<u64>; 2] = [None, None];
    let mut ticker = tokio::time::interval(tick);
    let mut last = Instant::now();

    loop {
        while let Ok(Some(event)) = events.try_next() {
            for (to, msg) in protocol::route(event) {
                if let Some(out) = routes.get(&to) {
                    let _ = out.send(Outgoing::Message(msg));
                }
            }
        }
        for (idx, player) in players.iter().enumerate() {
            let Some(snapshot) = room.local_snapshot(player) else {
                continue;
            };
            if last_seq[idx] != Some(snapshot.seq) {
                last_seq[idx] = Some(snapshot.seq);
                let _ = outbound[idx].send(Outgoing::Message(ServerMessage::State { snapshot }));
            }
        }
        if room.is_finished() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {
                let now = Instant::now();
                room.advance(now.duration_since(last).as_secs_f32() * 1000.0);
                last = now;
            }
            input = inputs.recv() => match input {
                Some(RoomInput::Action { player, action }) => {
                    if matches!(action, Action::Start | Action::Restart | Action::PauseToggle) {
                        if let Some(out) = routes.get(&player) {
                            reply_error(out, format!("{action} is not allowed in a match"));
                        }
                    } else {
                        room.apply(&player, action);
                    }
                }
                Some(RoomInput::Disconnect { player }) => room.disconnect(&player),
                None => break,
            },
        }
    }

    tracing::info!(room = room_id, result = ?room.result(), "room closed");
    for out in &outbound {
        let _ = out.send(Outgoing::Left);
    }
    let _ = lobby.send(LobbyCommand::RoomClosed { players });
}
