use std::sync::Arc;
use std::time::Duration;

use longlink::protocol::{Command, Message};
use longlink::service::{
    setup_local_tracing, AppConfig, ChannelDispatcher, Client, ClientHandle, ClientState,
    UploadAckDispatcher, PUSH_PAYLOAD, UPLOAD_DATA_BACK_PAYLOAD,
};
use rstest::{fixture, rstest};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

mod common;
use common::{eventually, free_port, test_config, TestServer};

#[fixture]
#[once]
fn setup() {
    setup_local_tracing().ok();
}

fn client_config(port: u16) -> AppConfig {
    let mut config = AppConfig::default();
    config.network.port = port;
    config
}

fn start_client(
    config: AppConfig,
) -> (ClientHandle, mpsc::UnboundedReceiver<Message>, JoinHandle<()>) {
    let (dispatcher, delivered) = ChannelDispatcher::new();
    let (client, handle) = Client::new(
        Arc::new(config),
        Arc::new(dispatcher),
        CancellationToken::new(),
    );
    (handle, delivered, client.spawn())
}

async fn next_delivery(delivered: &mut mpsc::UnboundedReceiver<Message>) -> Message {
    timeout(Duration::from_secs(30), delivered.recv())
        .await
        .expect("nothing delivered within 30s")
        .expect("dispatcher dropped")
}

#[rstest]
#[tokio::test]
async fn client_authenticates_and_exchanges_messages(_setup: ()) {
    let server = TestServer::start(test_config(), Arc::new(UploadAckDispatcher)).await;
    let (handle, mut delivered, task) = start_client(client_config(server.addr.port()));

    // the confirmation upload sent right after AUTH_BACK is answered
    assert_eq!(
        next_delivery(&mut delivered).await,
        Message::new("123456789", Command::UploadDataBack, UPLOAD_DATA_BACK_PAYLOAD)
    );
    assert_eq!(
        next_delivery(&mut delivered).await,
        Message::new("123456789", Command::PushData, PUSH_PAYLOAD)
    );
    assert_eq!(handle.state(), ClientState::Connected);
    assert_eq!(handle.stats().sessions_established(), 1);
    assert!(server.registry.get("123456789").is_some());

    handle
        .send_payload(Command::PushData, "hello from the console")
        .await
        .unwrap();
    assert_eq!(next_delivery(&mut delivered).await.command(), Command::UploadDataBack);
    assert_eq!(next_delivery(&mut delivered).await.command(), Command::PushData);

    // push initiated by the server side application
    server
        .registry
        .get("123456789")
        .unwrap()
        .send(Message::new("123456789", Command::PushData, "server push"))
        .await
        .unwrap();
    assert_eq!(next_delivery(&mut delivered).await.payload(), "server push");

    handle.shutdown();
    task.await.unwrap();
    assert_eq!(handle.state(), ClientState::Stopped);
    assert!(handle
        .send_payload(Command::PushData, "after shutdown")
        .await
        .is_err());

    server.stop().await;
}

#[rstest]
#[tokio::test]
async fn messages_sent_while_disconnected_wait_for_the_session(_setup: ()) {
    let port = free_port().await;
    let mut config = client_config(port);
    config.client.reconnect_delay_seconds = 1;
    let (handle, mut delivered, task) = start_client(config);

    handle
        .send_payload(Command::PushData, "queued early")
        .await
        .unwrap();

    let mut server_config = test_config();
    server_config.network.port = port;
    let server = TestServer::start(server_config, Arc::new(UploadAckDispatcher)).await;

    // confirmation upload first, then the queued one
    for _ in 0..2 {
        assert_eq!(next_delivery(&mut delivered).await.command(), Command::UploadDataBack);
        assert_eq!(next_delivery(&mut delivered).await.command(), Command::PushData);
    }
    assert_eq!(handle.stats().sessions_established(), 1);

    handle.shutdown();
    task.await.unwrap();
    server.stop().await;
}

#[rstest]
#[tokio::test]
async fn oversized_message_is_skipped_without_reconnecting(_setup: ()) {
    let server = TestServer::start(test_config(), Arc::new(UploadAckDispatcher)).await;
    let (handle, mut delivered, task) = start_client(client_config(server.addr.port()));
    // answers to the confirmation upload
    for _ in 0..2 {
        next_delivery(&mut delivered).await;
    }

    // twice the default frame limit
    handle
        .send_payload(Command::PushData, "x".repeat(2 * 1024 * 1024))
        .await
        .unwrap();
    handle
        .send_payload(Command::PushData, "after the big one")
        .await
        .unwrap();
    assert_eq!(next_delivery(&mut delivered).await.command(), Command::UploadDataBack);
    assert_eq!(next_delivery(&mut delivered).await.command(), Command::PushData);

    assert_eq!(handle.state(), ClientState::Connected);
    assert_eq!(handle.stats().sessions_established(), 1);
    assert_eq!(handle.stats().connect_attempts(), 1);

    handle.shutdown();
    task.await.unwrap();
    server.stop().await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn reconnects_once_per_delay_without_limit(_setup: ()) {
    let port = free_port().await;
    let (handle, _delivered, task) = start_client(client_config(port));

    // attempts at 0, 10, 20 and 30 seconds
    sleep(Duration::from_secs(35)).await;
    assert_eq!(handle.stats().connect_attempts(), 4);
    assert_eq!(handle.stats().sessions_established(), 0);
    assert_eq!(handle.state(), ClientState::Disconnected);

    handle.shutdown();
    task.await.unwrap();
    assert_eq!(handle.state(), ClientState::Stopped);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn lost_connection_is_reestablished_after_delay(_setup: ()) {
    let port = free_port().await;
    let (handle, mut delivered, task) = start_client(client_config(port));

    // first attempt fails, the server shows up before the second one
    sleep(Duration::from_secs(5)).await;
    let mut server_config = test_config();
    server_config.network.port = port;
    let server = TestServer::start(server_config, Arc::new(UploadAckDispatcher)).await;

    assert_eq!(next_delivery(&mut delivered).await.command(), Command::UploadDataBack);
    assert_eq!(next_delivery(&mut delivered).await.command(), Command::PushData);
    assert_eq!(handle.stats().connect_attempts(), 2);
    assert_eq!(handle.stats().sessions_established(), 1);

    // the session ends with the server, the next attempt waits a full delay
    server.stop().await;
    eventually(|| handle.state() == ClientState::Disconnected).await;
    sleep(Duration::from_secs(5)).await;
    assert_eq!(handle.stats().connect_attempts(), 2);
    sleep(Duration::from_secs(10)).await;
    assert_eq!(handle.stats().connect_attempts(), 3);
    assert_eq!(handle.stats().sessions_established(), 1);

    handle.shutdown();
    task.await.unwrap();
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn client_heartbeat_keeps_the_connection_alive(_setup: ()) {
    let server = TestServer::start(test_config(), Arc::new(UploadAckDispatcher)).await;
    let (handle, mut delivered, task) = start_client(client_config(server.addr.port()));
    next_delivery(&mut delivered).await;
    next_delivery(&mut delivered).await;
    assert_eq!(handle.stats().heartbeats_sent(), 0);

    // read and write idle both fire at 20s, one ping each
    sleep(Duration::from_secs(25)).await;
    assert_eq!(handle.stats().heartbeats_sent(), 2);

    // far beyond three server read idle periods
    sleep(Duration::from_secs(200)).await;
    assert!(handle.stats().heartbeats_sent() > 2);
    assert_eq!(handle.stats().connect_attempts(), 1);
    assert_eq!(handle.state(), ClientState::Connected);
    assert!(server.registry.get("123456789").is_some());

    handle.shutdown();
    task.await.unwrap();
    server.stop().await;
}
