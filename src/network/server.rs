//! WebSocket Game Server
//!
//! Accept loop, WebSocket upgrade, and the per-connection pumps that
//! bridge the transport to the session engine. Each connection gets a
//! reader task and a writer task; both are terminal on first failure
//! and only ever move their player toward dead.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async_with_config, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::game::court::SessionDriver;
use crate::game::player::Player;
use crate::game::queue::{QueueError, WaitQueue};
use crate::network::protocol::{ClientMessage, ServerMessage};
use crate::{
    MAX_MESSAGE_SIZE, OUTBOUND_QUEUE_DEPTH, PING_PERIOD, PONG_WAIT, TICK_PERIOD,
    WAIT_QUEUE_CAPACITY, WRITE_WAIT,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Wait queue capacity.
    pub queue_capacity: usize,
    /// Session driver tick period.
    pub tick_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            queue_capacity: WAIT_QUEUE_CAPACITY,
            tick_period: TICK_PERIOD,
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind the listen socket.
    #[error("failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket handshake or transport failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A write exceeded its deadline.
    #[error("write timed out")]
    WriteTimeout,
}

/// The game server: owns the wait queue and feeds it connections.
pub struct GameServer {
    config: ServerConfig,
    queue: Arc<WaitQueue>,
}

impl GameServer {
    /// Create a server from its configuration.
    pub fn new(config: ServerConfig) -> Self {
        let queue = Arc::new(WaitQueue::new(config.queue_capacity));
        Self { config, queue }
    }

    /// The wait queue this server feeds.
    pub fn queue(&self) -> Arc<WaitQueue> {
        Arc::clone(&self.queue)
    }

    /// Run the server: spawn the session driver and the wait-queue
    /// reaper, then accept connections until the task is dropped.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("rally server listening on {}", self.config.bind_addr);

        SessionDriver::new(Arc::clone(&self.queue), self.config.tick_period).spawn();
        WaitQueue::spawn_reaper(Arc::clone(&self.queue));

        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("accept error: {e}");
                    continue;
                }
            };

            debug!("new connection from {addr}");
            let queue = Arc::clone(&self.queue);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, queue).await {
                    warn!("connection from {addr} dropped: {e}");
                }
            });
        }
    }
}

/// Upgrade a fresh TCP connection and register it with the engine.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    queue: Arc<WaitQueue>,
) -> Result<(), ServerError> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(MAX_MESSAGE_SIZE),
        ..Default::default()
    };
    let ws_stream = accept_async_with_config(stream, Some(ws_config)).await?;

    if let Err(e) = add_player(ws_stream, addr, &queue) {
        warn!("rejecting {addr}: {e}");
    }
    Ok(())
}

/// Register a freshly upgraded connection with the session engine.
///
/// Creates the player, spawns its reader and writer pumps, and places
/// it on the wait queue. Fails only when the queue is full; the
/// rejected player's connection is closed before returning, so the
/// client simply never receives a seat.
pub fn add_player(
    ws_stream: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    queue: &WaitQueue,
) -> Result<(), QueueError> {
    let (ws_sender, ws_receiver) = ws_stream.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
    let player = Arc::new(Player::new(outbound_tx));

    info!(player = %player.id, %addr, "player connected");

    tokio::spawn(read_pump(Arc::clone(&player), ws_receiver));
    tokio::spawn(write_pump(Arc::clone(&player), ws_sender, outbound_rx));

    if let Err(e) = queue.enqueue(Arc::clone(&player)) {
        warn!(player = %player.id, error = %e, "wait queue rejected player");
        player.close();
        return Err(e);
    }
    Ok(())
}

/// Inbound half of the connection pump.
///
/// Every read carries the inactivity deadline; any frame - a pong
/// included - refreshes it. Exits on the first failure, leaving the
/// player dead. It never un-sets dead and never retries.
async fn read_pump(player: Arc<Player>, mut ws_receiver: SplitStream<WebSocketStream<TcpStream>>) {
    loop {
        let frame = match timeout(PONG_WAIT, ws_receiver.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                debug!(player = %player.id, error = %e, "read failed");
                break;
            }
            Ok(None) => {
                debug!(player = %player.id, "connection closed by peer");
                break;
            }
            Err(_) => {
                debug!(player = %player.id, "read deadline expired");
                break;
            }
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => {
                debug!(player = %player.id, "close frame received");
                break;
            }
            // Pings are answered by the transport; pongs and other
            // control frames only refresh the deadline.
            _ => continue,
        };

        match ClientMessage::parse(&text) {
            Ok(ClientMessage::Lost) => {
                debug!(player = %player.id, "player reports lost point");
                player.mark_lost();
            }
            Ok(ClientMessage::NetExchange(raw)) => {
                debug!(player = %player.id, payload = %raw, "net exchange received");
                player.store_handoff(raw);
            }
            Err(e) => {
                // Unknown tokens are logged and ignored, not fatal.
                debug!(player = %player.id, error = %e, "ignoring message");
            }
        }
    }

    player.mark_dead();
}

/// Outbound half of the connection pump.
///
/// Drains the player's outbound queue and keeps the connection alive
/// with periodic pings. Exits on queue closure (with a Close frame) or
/// on the first failed write; either way the player ends up dead.
async fn write_pump(
    player: Arc<Player>,
    mut ws_sender: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut outbound_rx: mpsc::Receiver<ServerMessage>,
) {
    let mut pings = interval(PING_PERIOD);
    pings.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            message = outbound_rx.recv() => {
                match message {
                    Some(message) => {
                        if let Err(e) =
                            write_frame(&mut ws_sender, Message::Text(message.to_string())).await
                        {
                            debug!(player = %player.id, error = %e, "write failed");
                            break;
                        }
                    }
                    // Queue closed: the engine let go of this player.
                    None => {
                        let _ = write_frame(&mut ws_sender, Message::Close(None)).await;
                        break;
                    }
                }
            }
            _ = pings.tick() => {
                if let Err(e) = write_frame(&mut ws_sender, Message::Ping(Vec::new())).await {
                    debug!(player = %player.id, error = %e, "ping failed");
                    break;
                }
            }
        }
    }

    player.mark_dead();
}

/// Send one frame under the write deadline.
async fn write_frame(
    ws_sender: &mut SplitSink<WebSocketStream<TcpStream>, Message>,
    frame: Message,
) -> Result<(), ServerError> {
    match timeout(WRITE_WAIT, ws_sender.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ServerError::WebSocket(e)),
        Err(_) => Err(ServerError::WriteTimeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::player::PlayerState;
    use tokio_tungstenite::{accept_async, connect_async};

    #[test]
    fn server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.queue_capacity, WAIT_QUEUE_CAPACITY);
        assert_eq!(config.tick_period, TICK_PERIOD);
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[tokio::test]
    async fn server_creation() {
        let server = GameServer::new(ServerConfig::default());
        assert!(server.queue().is_empty());
    }

    /// Accept one WebSocket connection and hand it to `add_player`,
    /// reporting the registration outcome.
    async fn accept_one(
        listener: TcpListener,
        queue: Arc<WaitQueue>,
    ) -> Result<(), QueueError> {
        let (stream, peer) = listener.accept().await.unwrap();
        let ws_stream = accept_async(stream).await.unwrap();
        add_player(ws_stream, peer, &queue)
    }

    #[tokio::test]
    async fn add_player_enqueues_and_reads_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let queue = Arc::new(WaitQueue::new(4));
        let accept = tokio::spawn(accept_one(listener, Arc::clone(&queue)));

        let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        accept.await.unwrap().unwrap();

        let player = queue.dequeue().expect("player should be enqueued");
        assert_eq!(player.state(), PlayerState::Waiting);

        client.send(Message::Text("L".to_string())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(player.state(), PlayerState::Lost);

        client
            .send(Message::Text("N,300,30,5".to_string()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(player.pending_handoff().as_deref(), Some("N,300,30,5"));
    }

    #[tokio::test]
    async fn unknown_tokens_are_ignored() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let queue = Arc::new(WaitQueue::new(4));
        let accept = tokio::spawn(accept_one(listener, Arc::clone(&queue)));

        let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        accept.await.unwrap().unwrap();
        let player = queue.dequeue().unwrap();

        client.send(Message::Text("Z,1,2".to_string())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Not fatal: the player is still alive and untouched.
        assert_eq!(player.state(), PlayerState::Waiting);
        assert!(player.pending_handoff().is_none());
    }

    #[tokio::test]
    async fn full_queue_rejects_and_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let queue = Arc::new(WaitQueue::new(0));
        let accept = tokio::spawn(accept_one(listener, Arc::clone(&queue)));

        let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        assert_eq!(accept.await.unwrap(), Err(QueueError::CapacityExceeded));

        // The writer pump says goodbye with a Close frame.
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(_)) => break,
            }
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn disconnect_marks_player_dead() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let queue = Arc::new(WaitQueue::new(4));
        let accept = tokio::spawn(accept_one(listener, Arc::clone(&queue)));

        let (client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        accept.await.unwrap().unwrap();
        let player = queue.dequeue().unwrap();

        drop(client);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(player.state(), PlayerState::Dead);
    }
}
