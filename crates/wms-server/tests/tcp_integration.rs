//! Real sockets: a listener on an ephemeral port driven by a plain TcpStream.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use wms_core::{encode_request, FrameVariant};
use wms_server::application::dispatch::{Dispatcher, Warehouse};
use wms_server::infrastructure::network::connection_manager::{
    bind_listener, run_listener, ServerContext,
};

struct TestServer {
    addr: SocketAddr,
    ctx: Arc<ServerContext>,
    running: Arc<AtomicBool>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

async fn start(variant: FrameVariant, max_connections: usize, idle: Duration) -> TestServer {
    let listener = bind_listener(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(Warehouse::with_defaults())));
    let ctx = Arc::new(ServerContext::new(dispatcher, max_connections, idle));
    let running = Arc::new(AtomicBool::new(true));

    tokio::spawn(run_listener(
        listener,
        variant,
        Arc::clone(&ctx),
        Arc::clone(&running),
    ));

    TestServer { addr, ctx, running }
}

async fn read_n(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    tokio::time::timeout(Duration::from_secs(2), stream.read_exact(&mut buf))
        .await
        .expect("response in time")
        .expect("read");
    buf
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_control_all_stock_on_empty_warehouse() {
    // Arrange
    let server = start(FrameVariant::Control, 4, Duration::from_secs(5)).await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();

    // Act
    client
        .write_all(&encode_request(FrameVariant::Control, "AI", &[]))
        .await
        .unwrap();
    let response = read_n(&mut client, 24).await;

    // Assert
    let mut expected = b"AI\x00".to_vec();
    expected.extend_from_slice(&[0u8; 20]);
    expected.push(b'\n');
    assert_eq!(response, expected);
}

#[tokio::test]
async fn test_data_request_all_answers_all_update() {
    let server = start(FrameVariant::Data, 4, Duration::from_secs(5)).await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();

    client
        .write_all(&encode_request(FrameVariant::Data, "RA", &[]))
        .await
        .unwrap();
    let response = read_n(&mut client, 18).await;

    assert_eq!(&response[..3], b"AU\x00");
    assert!(response[3..17].iter().all(|&b| b == 0));
    assert_eq!(response[17], b'\n');
}

#[tokio::test]
async fn test_bad_terminator_gets_no_reply_and_connection_survives() {
    // Arrange
    let server = start(FrameVariant::Control, 4, Duration::from_secs(5)).await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();
    let mut bad = encode_request(FrameVariant::Control, "AI", &[]);
    *bad.last_mut().unwrap() = b'X';

    // Act
    client.write_all(&bad).await.unwrap();
    client
        .write_all(&encode_request(FrameVariant::Control, "CR", &[]))
        .await
        .unwrap();

    // Assert: the first bytes back belong to CR, not AI.
    assert_eq!(read_n(&mut client, 4).await, b"CR\x00\n".to_vec());
}

#[tokio::test]
async fn test_several_requests_on_one_connection() {
    let server = start(FrameVariant::Control, 4, Duration::from_secs(5)).await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();

    client
        .write_all(&encode_request(FrameVariant::Control, "RE", &4u32.to_be_bytes()))
        .await
        .unwrap();
    let received = read_n(&mut client, 8).await;
    client
        .write_all(&encode_request(FrameVariant::Control, "CU", &[]))
        .await
        .unwrap();
    let cumulative = read_n(&mut client, 12).await;

    assert_eq!(&received[..3], b"RE\x00");
    assert_eq!(&cumulative[3..7], &4u32.to_be_bytes());
    assert_eq!(&cumulative[7..11], &0u32.to_be_bytes());
}

#[tokio::test]
async fn test_registry_entry_removed_when_client_disconnects() {
    // Arrange
    let server = start(FrameVariant::Control, 4, Duration::from_secs(5)).await;
    let client = TcpStream::connect(server.addr).await.unwrap();
    let ctx = Arc::clone(&server.ctx);
    wait_until(|| ctx.registry.len() == 1).await;

    // Act
    drop(client);

    // Assert
    wait_until(|| ctx.registry.is_empty()).await;
}

#[tokio::test]
async fn test_idle_connection_is_closed_by_server() {
    let server = start(FrameVariant::Control, 4, Duration::from_millis(100)).await;
    let mut client = TcpStream::connect(server.addr).await.unwrap();

    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
        .await
        .expect("server closes in time")
        .unwrap_or(0);

    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_connection_beyond_limit_is_closed() {
    // Arrange
    let server = start(FrameVariant::Control, 1, Duration::from_secs(5)).await;
    let _first = TcpStream::connect(server.addr).await.unwrap();
    let ctx = Arc::clone(&server.ctx);
    wait_until(|| ctx.registry.len() == 1).await;

    // Act
    let mut second = TcpStream::connect(server.addr).await.unwrap();
    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(2), second.read(&mut buf))
        .await
        .expect("server closes in time")
        .unwrap_or(0);

    // Assert
    assert_eq!(n, 0);
    assert_eq!(ctx.registry.len(), 1);
}
