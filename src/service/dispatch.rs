// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::protocol::{Command, Message};
use crate::session::SessionEnd;

pub const UPLOAD_DATA_BACK_PAYLOAD: &str = "This is upload data back msg";
pub const PUSH_PAYLOAD: &str = "This is a push msg";

///
/// Application side of a session.
///
/// `dispatch` sees every authenticated, non heartbeat message. The returned
/// messages are queued behind each other in order, a reply that can not be
/// encoded is logged and skipped. `on_closed` is called once when the session
/// ends, after the session logged the close itself.
///
pub trait Dispatcher: Send + Sync + 'static {
    fn dispatch(&self, client_id: &str, command: Command, payload: &str) -> Vec<Message>;

    fn on_closed(&self, _client_id: Option<&str>, _reason: &SessionEnd) {}
}

/// Server dispatcher acknowledging uploads and pushing one message back.
#[derive(Debug, Default, Clone, Copy)]
pub struct UploadAckDispatcher;

impl Dispatcher for UploadAckDispatcher {
    fn dispatch(&self, client_id: &str, command: Command, payload: &str) -> Vec<Message> {
        match command {
            Command::PushData | Command::Other(_) => {
                info!(client_id, %command, payload, "upload received");
                vec![
                    Message::new(client_id, Command::UploadDataBack, UPLOAD_DATA_BACK_PAYLOAD),
                    Message::new(client_id, Command::PushData, PUSH_PAYLOAD),
                ]
            }
            Command::PushDataBack | Command::UploadDataBack => {
                debug!(client_id, %command, payload, "acknowledgement from client");
                Vec::new()
            }
            Command::Auth | Command::AuthBack | Command::Ping | Command::Pong => {
                warn!(client_id, %command, "handshake command reached application dispatch");
                Vec::new()
            }
        }
    }
}

/// Client dispatcher that only logs what the server delivers.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDispatcher;

impl Dispatcher for LoggingDispatcher {
    fn dispatch(&self, client_id: &str, command: Command, payload: &str) -> Vec<Message> {
        info!(client_id, %command, payload, "message delivered");
        Vec::new()
    }

    fn on_closed(&self, client_id: Option<&str>, reason: &SessionEnd) {
        debug!(?client_id, %reason, "connection closed");
    }
}

/// Forwards every delivered message to a channel, replying nothing.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<Message>,
}

impl ChannelDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelDispatcher { tx }, rx)
    }
}

impl Dispatcher for ChannelDispatcher {
    fn dispatch(&self, client_id: &str, command: Command, payload: &str) -> Vec<Message> {
        if self
            .tx
            .send(Message::new(client_id, command, payload))
            .is_err()
        {
            debug!(client_id, %command, "delivery receiver dropped");
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    use super::*;
    use crate::AppError;

    struct EventCount(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for EventCount {
        fn on_event(&self, _event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn count_events(f: impl FnOnce()) -> usize {
        let count = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(EventCount(count.clone()));
        tracing::subscriber::with_default(subscriber, f);
        count.load(Ordering::Relaxed)
    }

    #[test]
    fn server_close_is_left_to_the_session_log() {
        let dispatcher = UploadAckDispatcher;
        assert_eq!(
            count_events(|| {
                dispatcher.on_closed(Some("c1"), &SessionEnd::PeerClosed);
                dispatcher.on_closed(None, &SessionEnd::Failed(AppError::HeartbeatExceeded(3)));
            }),
            0
        );
        assert_eq!(
            count_events(|| {
                dispatcher.dispatch("c1", Command::PushData, "x");
            }),
            1
        );
    }

    #[test]
    fn upload_is_acknowledged_then_pushed() {
        let replies = UploadAckDispatcher.dispatch("123456789", Command::PushData, "This is upload data");
        assert_eq!(
            replies,
            vec![
                Message::new("123456789", Command::UploadDataBack, UPLOAD_DATA_BACK_PAYLOAD),
                Message::new("123456789", Command::PushData, PUSH_PAYLOAD),
            ]
        );
    }

    #[test]
    fn acknowledgements_get_no_reply() {
        assert!(UploadAckDispatcher
            .dispatch("c1", Command::PushDataBack, "ok")
            .is_empty());
    }

    #[test]
    fn channel_dispatcher_forwards() {
        let (dispatcher, mut rx) = ChannelDispatcher::new();
        assert!(dispatcher.dispatch("c1", Command::PushData, "x").is_empty());
        let delivered = rx.try_recv().unwrap();
        assert_eq!(delivered, Message::new("c1", Command::PushData, "x"));
    }
}
