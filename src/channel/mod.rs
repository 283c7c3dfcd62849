//! Push-channel adapter: WebSocket transport behind typed channels.
//!
//! A spawned task owns the socket. Outbound intents arrive as
//! [`ChannelCommand`]s, inbound traffic is surfaced as [`ChannelNotice`]s;
//! nothing else in the crate touches the transport. The task reconnects on
//! transport drops under [`ReconnectPolicy`] and replays the presence
//! handshake plus every room subscription after each reconnect. Auth
//! rejections are terminal: the server said the credential is bad, so
//! retrying the same handshake is pointless.

mod connection;
mod dispatch;

pub use connection::{
    ConnectionEvent, ConnectionState, ConnectionStateMachine, InvalidTransition, ReconnectPolicy,
};
pub use dispatch::{apply, DispatchContext, DispatchOutcome};

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::model::UserRef;
use crate::wire::{AuthFailureReason, ClientEvent, ServerEvent};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Credential bundle for the presence handshake.
#[derive(Debug, Clone)]
pub struct ChannelIdentity {
    /// The authenticated local user.
    pub user: UserRef,
    /// Bearer credential presented on every handshake.
    pub token: String,
}

/// Everything needed to run the channel task.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Handshake identity.
    pub identity: ChannelIdentity,
    /// Reconnect schedule.
    pub policy: ReconnectPolicy,
}

/// Outbound intents accepted by the channel task.
#[derive(Debug, Clone)]
pub enum ChannelCommand {
    /// Subscribe to a room; remembered and replayed across reconnects.
    JoinRoom(String),
    /// Text-only send over the socket (the REST path is the primary one).
    SendText {
        /// Private peer, absent for the shared room.
        receiver_id: Option<String>,
        /// Text content.
        content: String,
    },
    /// Close the socket and end the task.
    Shutdown,
}

/// Inbound notifications emitted by the channel task.
#[derive(Debug)]
pub enum ChannelNotice {
    /// Socket up, handshake sent, rooms replayed.
    Connected,
    /// A typed server event.
    Event(ServerEvent),
    /// Transport dropped; a reconnect is scheduled.
    Disconnected {
        /// 1-based count of consecutive failures.
        attempt: u32,
        /// Backoff before the next dial.
        retry_in: Duration,
    },
    /// The server rejected the handshake credential. Terminal.
    AuthRejected(AuthFailureReason),
    /// The reconnect budget is spent. Terminal.
    ReconnectFailed,
}

/// Cheap cloneable handle for issuing commands to the channel task.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    commands: mpsc::Sender<ChannelCommand>,
}

impl ChannelHandle {
    /// Subscribe to a room. Returns `false` when the task is gone.
    pub async fn join_room(&self, room: impl Into<String>) -> bool {
        self.commands
            .send(ChannelCommand::JoinRoom(room.into()))
            .await
            .is_ok()
    }

    /// Send a text message over the socket.
    pub async fn send_text(&self, receiver_id: Option<String>, content: String) -> bool {
        self.commands
            .send(ChannelCommand::SendText {
                receiver_id,
                content,
            })
            .await
            .is_ok()
    }

    /// Ask the task to close the socket and exit.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(ChannelCommand::Shutdown).await;
    }
}

/// Spawn the channel task.
///
/// Returns the command handle, the notice stream, and the task handle so
/// the caller can await or abort it.
pub fn spawn(
    config: ChannelConfig,
) -> (
    ChannelHandle,
    mpsc::Receiver<ChannelNotice>,
    JoinHandle<()>,
) {
    let (command_tx, command_rx) = mpsc::channel(64);
    let (notice_tx, notice_rx) = mpsc::channel(256);
    let task = tokio::spawn(run(config, command_rx, notice_tx));
    (
        ChannelHandle {
            commands: command_tx,
        },
        notice_rx,
        task,
    )
}

/// Rooms this session has subscribed to, in join order, deduplicated.
/// Replayed after every reconnect.
#[derive(Debug, Default)]
struct RoomLedger {
    rooms: Vec<String>,
}

impl RoomLedger {
    /// Record a subscription; returns `false` when already present.
    fn record(&mut self, room: &str) -> bool {
        if self.rooms.iter().any(|r| r == room) {
            return false;
        }
        self.rooms.push(room.to_string());
        true
    }

    fn rooms(&self) -> &[String] {
        &self.rooms
    }
}

/// Why the inner socket loop ended.
enum LoopEnd {
    /// Transport dropped; eligible for reconnect.
    TransportDropped,
    /// Terminal: auth rejection or shutdown.
    Finished,
}

async fn run(
    config: ChannelConfig,
    mut commands: mpsc::Receiver<ChannelCommand>,
    notices: mpsc::Sender<ChannelNotice>,
) {
    let mut ledger = RoomLedger::default();
    ledger.record("general");
    let mut machine = ConnectionStateMachine::default();
    let mut failures: u32 = 0;

    loop {
        let _ = machine.apply(ConnectionEvent::DialStarted);
        match connect_async(&config.url).await {
            Ok((socket, _)) => {
                failures = 0;
                match serve_socket(
                    socket,
                    &config,
                    &mut machine,
                    &mut ledger,
                    &mut commands,
                    &notices,
                )
                .await
                {
                    LoopEnd::TransportDropped => {}
                    LoopEnd::Finished => return,
                }
            }
            Err(e) => {
                warn!(error = %e, url = %config.url, "channel dial failed");
                let _ = machine.apply(ConnectionEvent::Dropped);
            }
        }

        if config.policy.is_exhausted(failures) {
            info!(failures, "reconnect budget exhausted");
            let _ = notices.send(ChannelNotice::ReconnectFailed).await;
            return;
        }
        let retry_in = config.policy.delay_for_attempt(failures);
        failures += 1;
        if notices
            .send(ChannelNotice::Disconnected {
                attempt: failures,
                retry_in,
            })
            .await
            .is_err()
        {
            return;
        }
        if !backoff_wait(retry_in, &mut commands, &mut ledger).await {
            return;
        }
    }
}

/// Drive one live socket until it drops or the task finishes.
async fn serve_socket(
    socket: Socket,
    config: &ChannelConfig,
    machine: &mut ConnectionStateMachine,
    ledger: &mut RoomLedger,
    commands: &mut mpsc::Receiver<ChannelCommand>,
    notices: &mpsc::Sender<ChannelNotice>,
) -> LoopEnd {
    let (mut sink, mut stream) = socket.split();

    // Handshake, then replay every room subscription.
    let announce = ClientEvent::PresenceAnnounce {
        id: config.identity.user.id.to_string(),
        username: config.identity.user.username.clone(),
        avatar: config.identity.user.avatar_url.clone(),
        token: config.identity.token.clone(),
    };
    if sink.send(WsMessage::text(announce.to_frame())).await.is_err() {
        let _ = machine.apply(ConnectionEvent::Dropped);
        return LoopEnd::TransportDropped;
    }
    let _ = machine.apply(ConnectionEvent::HandshakeAccepted);
    for room in ledger.rooms() {
        let frame = ClientEvent::JoinRoom { room: room.clone() }.to_frame();
        if sink.send(WsMessage::text(frame)).await.is_err() {
            let _ = machine.apply(ConnectionEvent::Dropped);
            return LoopEnd::TransportDropped;
        }
    }
    let _ = machine.apply(ConnectionEvent::RoomJoined);
    info!(url = %config.url, rooms = ledger.rooms().len(), "channel connected");
    if notices.send(ChannelNotice::Connected).await.is_err() {
        return LoopEnd::Finished;
    }

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match ServerEvent::parse(text.as_str()) {
                    Ok(ServerEvent::AuthError(reason)) => {
                        warn!(?reason, "channel credential rejected");
                        let _ = notices.send(ChannelNotice::AuthRejected(reason)).await;
                        return LoopEnd::Finished;
                    }
                    Ok(event) => {
                        if notices.send(ChannelNotice::Event(event)).await.is_err() {
                            return LoopEnd::Finished;
                        }
                    }
                    Err(e) => debug!(error = %e, "unparseable channel frame dropped"),
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    let _ = machine.apply(ConnectionEvent::Dropped);
                    return LoopEnd::TransportDropped;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "channel transport error");
                    let _ = machine.apply(ConnectionEvent::Dropped);
                    return LoopEnd::TransportDropped;
                }
            },
            command = commands.recv() => match command {
                Some(ChannelCommand::JoinRoom(room)) => {
                    let new = ledger.record(&room);
                    if new {
                        let frame = ClientEvent::JoinRoom { room }.to_frame();
                        if sink.send(WsMessage::text(frame)).await.is_err() {
                            let _ = machine.apply(ConnectionEvent::Dropped);
                            return LoopEnd::TransportDropped;
                        }
                    }
                }
                Some(ChannelCommand::SendText { receiver_id, content }) => {
                    let frame = ClientEvent::SendMessage { receiver_id, content }.to_frame();
                    if sink.send(WsMessage::text(frame)).await.is_err() {
                        let _ = machine.apply(ConnectionEvent::Dropped);
                        return LoopEnd::TransportDropped;
                    }
                }
                Some(ChannelCommand::Shutdown) | None => {
                    let _ = sink.close().await;
                    let _ = machine.apply(ConnectionEvent::Dropped);
                    return LoopEnd::Finished;
                }
            },
        }
    }
}

/// Sleep out a backoff window while still absorbing commands, so room
/// subscriptions made while offline are replayed on the next connect.
/// Returns `false` when the task should exit.
async fn backoff_wait(
    retry_in: Duration,
    commands: &mut mpsc::Receiver<ChannelCommand>,
    ledger: &mut RoomLedger,
) -> bool {
    let deadline = tokio::time::sleep(retry_in);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            () = &mut deadline => return true,
            command = commands.recv() => match command {
                Some(ChannelCommand::JoinRoom(room)) => {
                    ledger.record(&room);
                }
                Some(ChannelCommand::SendText { .. }) => {
                    debug!("send while disconnected dropped");
                }
                Some(ChannelCommand::Shutdown) | None => return false,
            },
        }
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_ledger_deduplicates_and_keeps_join_order() {
        let mut ledger = RoomLedger::default();
        assert!(ledger.record("general"));
        assert!(ledger.record("u-2"));
        assert!(!ledger.record("general"));
        assert_eq!(ledger.rooms(), ["general", "u-2"]);
    }

    #[tokio::test]
    async fn backoff_wait_records_joins_made_while_offline() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut ledger = RoomLedger::default();
        tx.send(ChannelCommand::JoinRoom("u-7".to_string()))
            .await
            .expect("send");

        let keep_going = backoff_wait(Duration::from_millis(10), &mut rx, &mut ledger).await;

        assert!(keep_going);
        assert_eq!(ledger.rooms(), ["u-7"]);
    }

    #[tokio::test]
    async fn backoff_wait_honors_shutdown() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut ledger = RoomLedger::default();
        tx.send(ChannelCommand::Shutdown).await.expect("send");

        let keep_going = backoff_wait(Duration::from_secs(60), &mut rx, &mut ledger).await;
        assert!(!keep_going);
    }
}
