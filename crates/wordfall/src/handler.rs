//! Per-connection handler: handshake, then message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Split the connection; a writer task owns the send half
//!   2. Receive Handshake → validate version → send HandshakeAck
//!   3. Loop: receive envelopes → dispatch to the registry
//!   4. On exit, leave the current room
//!
//! Everything sent to the client, whether a direct reply or a room event,
//! goes through one unbounded channel into the writer task, which stamps
//! the envelope sequence numbers. Replies and events therefore share a
//! single ordered stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use wordfall_protocol::{
    ClientMessage, Codec, Envelope, ErrorReason, JsonCodec, PlayerId, ProtocolError, RoomCode,
    ServerMessage,
};
use wordfall_room::{LeaderboardSink, RoomError, RoomRequest};
use wordfall_transport::{Connection, ConnectionReceiver, ConnectionSender};

use crate::server::{PROTOCOL_VERSION, ServerState};
use crate::WordfallError;

/// Longest display name kept, in characters.
const MAX_NAME_CHARS: usize = 20;

/// Default and maximum `getLeaderboard` page sizes.
const LEADERBOARD_DEFAULT_LIMIT: usize = 10;
const LEADERBOARD_MAX_LIMIT: usize = 100;

/// How long the writer gets to flush after the handler is done.
const WRITER_FLUSH: Duration = Duration::from_secs(1);

type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// Drop guard that takes the player out of their room when the handler
/// exits, even by panic. `Drop` is synchronous, so the leave runs on a
/// spawned task.
struct SeatGuard<S: LeaderboardSink> {
    player_id: PlayerId,
    state: Arc<ServerState<S>>,
    armed: bool,
}

impl<S: LeaderboardSink> SeatGuard<S> {
    /// Leaves the room inline and disarms the guard.
    async fn release(mut self) {
        self.armed = false;
        leave_quietly(&self.state, self.player_id).await;
    }
}

impl<S: LeaderboardSink> Drop for SeatGuard<S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let player_id = self.player_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            leave_quietly(&state, player_id).await;
        });
    }
}

async fn leave_quietly<S: LeaderboardSink>(state: &ServerState<S>, player_id: PlayerId) {
    match state.rooms.leave(player_id).await {
        Ok(remaining) => tracing::debug!(%player_id, remaining, "left room on disconnect"),
        Err(RoomError::NotInRoom(_)) => {}
        Err(e) => tracing::warn!(%player_id, error = %e, "leave on disconnect failed"),
    }
}

enum Flow {
    Continue,
    Close,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C, S>(conn: C, state: Arc<ServerState<S>>) -> Result<(), WordfallError>
where
    C: Connection,
    S: LeaderboardSink,
{
    let conn_id = conn.id();
    let peer = conn.peer_addr();
    tracing::debug!(%conn_id, %peer, "handling new connection");

    let (sink, mut stream) = conn.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(sink, rx, state.codec, state.started()));

    let result = match perform_handshake(&mut stream, &tx, &state).await {
        Ok(player_id) => {
            tracing::info!(%conn_id, %player_id, "player connected");
            let guard = SeatGuard {
                player_id,
                state: Arc::clone(&state),
                armed: true,
            };
            message_loop(&mut stream, &tx, &state, player_id).await;
            guard.release().await;
            tracing::info!(%conn_id, %player_id, "player disconnected");
            Ok(())
        }
        Err(e) => Err(e),
    };

    // The room dropped its clone of the outbox on leave, so the writer
    // drains what is queued and closes the socket.
    drop(tx);
    let abort = writer.abort_handle();
    if tokio::time::timeout(WRITER_FLUSH, writer).await.is_err() {
        abort.abort();
    }
    result
}

/// Receives the handshake and answers it. Anything but a handshake with
/// the current version is refused.
async fn perform_handshake<R, S>(
    stream: &mut R,
    tx: &Outbox,
    state: &ServerState<S>,
) -> Result<PlayerId, WordfallError>
where
    R: ConnectionReceiver,
    S: LeaderboardSink,
{
    let data = match tokio::time::timeout(state.handshake_timeout, stream.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage("connection closed before handshake".into()).into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let envelope: Envelope<ClientMessage> = match state.codec.decode(&data) {
        Ok(envelope) => envelope,
        Err(e) => {
            send(tx, bad_request(format!("invalid handshake: {e}")));
            return Err(e.into());
        }
    };

    let version = match envelope.payload {
        ClientMessage::Handshake { version } => version,
        _ => {
            send(tx, bad_request("expected handshake"));
            return Err(ProtocolError::InvalidMessage("first message must be a handshake".into()).into());
        }
    };

    if version != PROTOCOL_VERSION {
        send(
            tx,
            bad_request(format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}")),
        );
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    let player_id = state.rooms.allocate_player_id();
    send(
        tx,
        ServerMessage::HandshakeAck {
            player_id,
            server_time: state.elapsed_ms(),
        },
    );
    Ok(player_id)
}

async fn message_loop<R, S>(stream: &mut R, tx: &Outbox, state: &ServerState<S>, player_id: PlayerId)
where
    R: ConnectionReceiver,
    S: LeaderboardSink,
{
    loop {
        let data = match tokio::time::timeout(state.idle_timeout, stream.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::debug!(%player_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%player_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%player_id, "connection idle, closing");
                break;
            }
        };

        let envelope: Envelope<ClientMessage> = match state.codec.decode(&data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(%player_id, error = %e, "failed to decode envelope");
                send(tx, bad_request(format!("invalid message: {e}")));
                continue;
            }
        };

        if let Flow::Close = handle_message(envelope.payload, tx, state, player_id).await {
            break;
        }
    }
}

async fn handle_message<S: LeaderboardSink>(
    message: ClientMessage,
    tx: &Outbox,
    state: &ServerState<S>,
    player_id: PlayerId,
) -> Flow {
    match message {
        ClientMessage::Handshake { .. } => {
            send(tx, bad_request("already connected"));
        }
        ClientMessage::Heartbeat { client_time } => {
            send(
                tx,
                ServerMessage::HeartbeatAck {
                    client_time,
                    server_time: state.elapsed_ms(),
                },
            );
        }
        ClientMessage::CreateRoom { mode, difficulty, name } => {
            let result = create_room(tx, state, player_id, mode, difficulty, display_name(&name)).await;
            report(tx, result);
        }
        ClientMessage::JoinRoom { room, name } => match RoomCode::parse(&room) {
            Ok(code) => {
                let result = state
                    .rooms
                    .join(&code, player_id, display_name(&name), tx.clone())
                    .await;
                report(tx, result);
            }
            Err(e) => send(tx, bad_request(e.to_string())),
        },
        ClientMessage::StartGame => {
            report(tx, state.rooms.route(player_id, RoomRequest::StartGame).await);
        }
        ClientMessage::Input { word } => {
            report(tx, state.rooms.route(player_id, RoomRequest::Input { word }).await);
        }
        ClientMessage::RequestRematch => {
            report(tx, state.rooms.route(player_id, RoomRequest::RequestRematch).await);
        }
        ClientMessage::LeaveRoom => {
            report(tx, state.rooms.leave(player_id).await.map(|_| ()));
        }
        ClientMessage::GetLeaderboard { limit } => {
            let limit = limit
                .unwrap_or(LEADERBOARD_DEFAULT_LIMIT)
                .min(LEADERBOARD_MAX_LIMIT);
            match state.leaderboard.top(limit).await {
                Ok(entries) => send(tx, ServerMessage::Leaderboard { entries }),
                Err(e) => {
                    tracing::warn!(%player_id, error = %e, "leaderboard read failed");
                    send(
                        tx,
                        ServerMessage::Error {
                            code: 503,
                            reason: ErrorReason::Unavailable,
                            message: "leaderboard unavailable".into(),
                        },
                    );
                }
            }
        }
        ClientMessage::Disconnect { reason } => {
            tracing::info!(%player_id, %reason, "client disconnected");
            return Flow::Close;
        }
    }
    Flow::Continue
}

/// Creates a room and seats its creator. A room whose creator could not
/// join is torn down again.
async fn create_room<S: LeaderboardSink>(
    tx: &Outbox,
    state: &ServerState<S>,
    player_id: PlayerId,
    mode: wordfall_protocol::Mode,
    difficulty: wordfall_protocol::Difficulty,
    name: String,
) -> Result<(), RoomError> {
    if let Some(room) = state.rooms.player_room(player_id).await {
        return Err(RoomError::AlreadyInRoom { player: player_id, room });
    }

    let code = state.rooms.create(mode, difficulty).await?;
    send(tx, ServerMessage::RoomCreated { room: code.clone() });
    if let Err(e) = state.rooms.join(&code, player_id, name, tx.clone()).await {
        state.rooms.remove(&code).await;
        return Err(e);
    }
    tracing::info!(room = %code, %player_id, %mode, %difficulty, "room created");
    Ok(())
}

/// Sends a rejection back to the requester only.
fn report(tx: &Outbox, result: Result<(), RoomError>) {
    if let Err(e) = result {
        send(tx, e.to_message());
    }
}

fn send(tx: &Outbox, message: ServerMessage) {
    // Fails only once the writer has stopped, i.e. the socket is gone.
    let _ = tx.send(message);
}

fn bad_request(message: impl Into<String>) -> ServerMessage {
    ServerMessage::Error {
        code: 400,
        reason: ErrorReason::BadRequest,
        message: message.into(),
    }
}

/// Trims, drops control characters and caps the length of a
/// player-chosen name. Blank names become `"Player"`.
fn display_name(raw: &str) -> String {
    let name: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_CHARS)
        .collect();
    let name = name.trim_end();
    if name.is_empty() {
        "Player".to_string()
    } else {
        name.to_string()
    }
}

/// Owns the send half. Wraps each message in an envelope with the next
/// sequence number and the channel the message asks for.
async fn write_loop<W: ConnectionSender>(
    mut sink: W,
    mut rx: mpsc::UnboundedReceiver<ServerMessage>,
    codec: JsonCodec,
    started: Instant,
) {
    let mut seq: u64 = 0;
    while let Some(message) = rx.recv().await {
        seq += 1;
        let envelope = Envelope {
            seq,
            timestamp: started.elapsed().as_millis() as u64,
            channel: message.channel(),
            payload: message,
        };
        let text = match codec.encode(&envelope).map(String::from_utf8) {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "encoded envelope is not UTF-8");
                continue;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to encode envelope");
                continue;
            }
        };
        if let Err(e) = sink.send_text(text).await {
            tracing::debug!(error = %e, "send failed, stopping writer");
            return;
        }
    }
    let _ = sink.close().await;
}
