#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use longlink::network::{Connection, FrameCodec, MessageWriter};
use longlink::protocol::Message;
use longlink::service::{AppConfig, AppResult, ConnectionRegistry, Dispatcher, Server};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default config listening on an ephemeral port.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.network.port = 0;
    config
}

/// A port nobody listens on right now.
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Arc<ConnectionRegistry>,
    pub shutdown: CancellationToken,
    pub task: JoinHandle<AppResult<()>>,
}

impl TestServer {
    pub async fn start(config: AppConfig, dispatcher: Arc<dyn Dispatcher>) -> TestServer {
        let shutdown = CancellationToken::new();
        let server = Server::bind(Arc::new(config), dispatcher, shutdown.clone())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let registry = server.registry();
        let task = tokio::spawn(async move { server.run().await });
        TestServer {
            addr,
            registry,
            shutdown,
            task,
        }
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        self.task.await.unwrap().unwrap();
    }
}

/// Speaks the wire protocol by hand, without any of the session logic.
pub struct RawClient {
    connection: Connection<OwnedReadHalf>,
    writer: MessageWriter<OwnedWriteHalf>,
}

impl RawClient {
    pub async fn connect(addr: SocketAddr) -> RawClient {
        let socket = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = socket.into_split();
        let codec = FrameCodec::default();
        RawClient {
            connection: Connection::new(reader, codec.clone(), 4096),
            writer: MessageWriter::new(writer, codec),
        }
    }

    pub async fn send(&mut self, message: &Message) {
        self.writer.write_message(message).await.unwrap();
    }

    pub async fn recv(&mut self) -> AppResult<Option<Message>> {
        self.connection.read_frame().await
    }

    /// Next message, failing the test if none arrives within five seconds.
    pub async fn expect_message(&mut self) -> Message {
        tokio::time::timeout(Duration::from_secs(5), self.recv())
            .await
            .expect("no message within 5s")
            .unwrap()
            .expect("connection closed")
    }

    pub async fn authenticate(&mut self, client_id: &str) -> Message {
        self.send(&Message::auth(client_id)).await;
        self.expect_message().await
    }
}

/// Polls `condition` every 10ms for at most five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 5s");
}
