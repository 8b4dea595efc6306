//! Per-connection state machine.
//!
//! A [`ConnectionSession`] owns one socket for exactly as long as it is open.
//! It turns everything that can happen to the connection (an inbound message,
//! an outbound message queued by someone else, an idle timeout, shutdown, the
//! socket going away) into a single ordered stream of [`SessionEvent`]s. The
//! role specific drivers, [`ServerSession`] and [`ClientSession`], consume that
//! stream and apply the auth handshake and heartbeat rules.
//!
//! Messages of one connection are processed strictly in arrival order.
//! Closing a session stops its idle monitor and abandons any pending write.

use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::network::{Connection, FrameCodec, MessageWriter};
use crate::protocol::Message;
use crate::{AppError, AppResult};

pub use auth::{
    AuthDecision, AuthState, ClientAuth, ClientAuthEvent, ServerAuth, CONFIRM_PAYLOAD,
};
pub use client::ClientSession;
pub use heartbeat::{ClientHeartbeat, HeartbeatVerdict, ServerHeartbeat};
pub use idle::{IdleKind, IdleMonitor, IdleTimeouts};
pub use server::{ServerSession, ServerSessionContext};

mod auth;
mod client;
mod heartbeat;
mod idle;
mod server;

/// Bytes waiting for the socket above which a session stops taking more work.
pub const PENDING_HIGH_WATER: usize = 64 * 1024;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_connection_id() -> u64 {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The peer closed the socket between two frames.
    PeerClosed,
    /// Local shutdown was requested.
    Shutdown,
    /// Transport, framing or liveness failure.
    Failed(AppError),
}

impl SessionEnd {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, SessionEnd::Shutdown)
    }
}

impl Display for SessionEnd {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEnd::PeerClosed => write!(f, "closed by peer"),
            SessionEnd::Shutdown => write!(f, "shutdown"),
            SessionEnd::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

#[derive(Debug)]
pub enum SessionEvent {
    Inbound(Message),
    Outbound(Message),
    Idle(Vec<IdleKind>),
    AuthDeadline,
    Closed(SessionEnd),
}

#[derive(Debug)]
pub struct ConnectionSession {
    connection_id: u64,
    peer: SocketAddr,
    connection: Connection<OwnedReadHalf>,
    writer: MessageWriter<OwnedWriteHalf>,
    idle: IdleMonitor,
}

impl ConnectionSession {
    pub fn new(
        connection_id: u64,
        socket: TcpStream,
        codec: FrameCodec,
        buffer_size: usize,
        timeouts: IdleTimeouts,
    ) -> AppResult<Self> {
        let peer = socket.peer_addr()?;
        let (reader, writer) = socket.into_split();
        Ok(ConnectionSession {
            connection_id,
            peer,
            connection: Connection::new(reader, codec.clone(), buffer_size),
            writer: MessageWriter::new(writer, codec),
            idle: IdleMonitor::new(timeouts, Instant::now()),
        })
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    ///
    /// Waits for the next thing that happens to this connection.
    ///
    /// Queued bytes are written from in here, so a peer that stops reading
    /// never keeps shutdown, idle or auth deadlines from firing. While more than
    /// [`PENDING_HIGH_WATER`] bytes wait for the socket, neither inbound frames
    /// nor `outbound` are polled.
    ///
    /// `outbound` is only polled when given, which lets a driver hold back
    /// application traffic until the handshake is done. `auth_deadline`, when
    /// set, produces [`SessionEvent::AuthDeadline`] once reached.
    ///
    pub async fn next_event(
        &mut self,
        mut outbound: Option<&mut mpsc::Receiver<Message>>,
        shutdown: &CancellationToken,
        auth_deadline: Option<Instant>,
    ) -> SessionEvent {
        loop {
            let idle_deadline = self.idle.next_deadline();
            let flushing = self.writer.has_pending();
            let accepting = self.writer.pending_len() < PENDING_HIGH_WATER;
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return SessionEvent::Closed(SessionEnd::Shutdown),
                res = self.writer.write_pending(), if flushing => match res {
                    Ok(()) => self.idle.record_write(Instant::now()),
                    Err(e) => return SessionEvent::Closed(SessionEnd::Failed(e)),
                },
                res = self.connection.read_frame(), if accepting => return match res {
                    Ok(Some(message)) => {
                        self.idle.record_read(Instant::now());
                        trace!(connection_id = self.connection_id, %message, "inbound");
                        SessionEvent::Inbound(message)
                    }
                    // peer closed the connection gracefully
                    Ok(None) => SessionEvent::Closed(SessionEnd::PeerClosed),
                    Err(e) => SessionEvent::Closed(SessionEnd::Failed(e)),
                },
                Some(message) = recv_from(outbound.as_deref_mut()), if accepting => {
                    return SessionEvent::Outbound(message)
                }
                _ = wait_until(idle_deadline) => {
                    return SessionEvent::Idle(self.idle.poll(Instant::now()))
                }
                _ = wait_until(auth_deadline) => return SessionEvent::AuthDeadline,
            }
        }
    }

    /// Queues one message behind everything not yet written. Write activity is
    /// recorded once the bytes reached the socket, see [`next_event`].
    ///
    /// [`next_event`]: ConnectionSession::next_event
    pub fn write(&mut self, message: &Message) -> AppResult<()> {
        self.writer.queue(message)?;
        trace!(connection_id = self.connection_id, %message, "outbound");
        Ok(())
    }

    /// Like [`write`](ConnectionSession::write), but a message that can not be
    /// encoded (e.g. larger than the frame limit) is logged and skipped instead
    /// of failing the connection.
    pub fn write_or_drop(&mut self, message: &Message) {
        if let Err(e) = self.write(message) {
            warn!(
                connection_id = self.connection_id,
                %message,
                "drop outbound message: {}", e
            );
        }
    }

    /// Stops the idle monitor and shuts the socket down, no event fires afterwards.
    pub async fn close(&mut self) {
        self.idle.stop();
        if let Err(e) = self.writer.shutdown().await {
            debug!(
                connection_id = self.connection_id,
                "shutdown socket error: {}", e
            );
        }
    }
}

async fn recv_from(outbound: Option<&mut mpsc::Receiver<Message>>) -> Option<Message> {
    match outbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
