//! One console connection: write a request frame, read its response frame.
//!
//! Response payloads can contain `0x0A`, so the reader never scans for the
//! terminator.  It reads the 3-byte header (command + status), asks
//! [`response_payload_len`] how much payload that command carries, then reads
//! exactly that many bytes plus the terminator.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use wms_core::protocol::codec::{read_u16, read_u32};
use wms_core::protocol::{decode_response, response_payload_len, COMMAND_LEN};
use wms_core::{encode_request, FrameError, FrameVariant, ResponseFrame, StatusCode};

/// How long a request waits for its response by default.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors on the console side of a connection.
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response: {0}")]
    Frame(#[from] FrameError),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("connection closed by server")]
    Closed,

    #[error("not connected")]
    NotConnected,
}

/// A decoded response plus typed accessors for its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleResponse {
    pub frame: ResponseFrame,
}

impl ConsoleResponse {
    pub fn is_success(&self) -> bool {
        self.frame.status.is_success()
    }

    pub fn status(&self) -> StatusCode {
        self.frame.status
    }

    /// The payload as consecutive big-endian `u32` values.
    pub fn u32_values(&self) -> Result<Vec<u32>, FrameError> {
        (0..self.frame.payload.len() / 4)
            .map(|i| read_u32(&self.frame.payload, i * 4))
            .collect()
    }

    /// The payload as consecutive big-endian `u16` values.
    pub fn u16_values(&self) -> Result<Vec<u16>, FrameError> {
        (0..self.frame.payload.len() / 2)
            .map(|i| read_u16(&self.frame.payload, i * 2))
            .collect()
    }
}

/// A connected console speaking one frame variant.
#[derive(Debug)]
pub struct ConsoleConnection {
    stream: TcpStream,
    addr: SocketAddr,
    variant: FrameVariant,
    read_timeout: Duration,
}

impl ConsoleConnection {
    /// Connects to a server port that speaks `variant` frames.
    ///
    /// # Errors
    ///
    /// [`ConsoleError::ConnectFailed`] if the TCP connection cannot be made.
    pub async fn connect(addr: SocketAddr, variant: FrameVariant) -> Result<Self, ConsoleError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ConsoleError::ConnectFailed { addr, source })?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            addr,
            variant,
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn variant(&self) -> FrameVariant {
        self.variant
    }

    /// Sends one request and waits for its response.
    ///
    /// # Errors
    ///
    /// I/O failures, a closed connection, a timeout, or a malformed response.
    /// Any of these leaves unread bytes of unknown length on the stream, so
    /// the connection is unusable afterwards.
    pub async fn request(
        &mut self,
        command: &str,
        payload: &[u8],
    ) -> Result<ConsoleResponse, ConsoleError> {
        let bytes = encode_request(self.variant, command, payload);
        self.stream.write_all(&bytes).await?;
        debug!(variant = %self.variant, command, "request sent");

        let limit = self.read_timeout;
        match timeout(limit, self.read_response()).await {
            Ok(result) => result,
            Err(_) => Err(ConsoleError::Timeout(limit)),
        }
    }

    async fn read_response(&mut self) -> Result<ConsoleResponse, ConsoleError> {
        let mut header = [0u8; COMMAND_LEN + 1];
        read_exact_or_closed(&mut self.stream, &mut header).await?;

        let status_byte = header[COMMAND_LEN];
        let status = StatusCode::try_from(status_byte)
            .map_err(|_| FrameError::UnknownStatus(status_byte))?;
        let command: String = header[..COMMAND_LEN]
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect();
        let payload_len = response_payload_len(self.variant, &command, status);

        let mut frame = header.to_vec();
        frame.resize(header.len() + payload_len + 1, 0);
        read_exact_or_closed(&mut self.stream, &mut frame[header.len()..]).await?;

        let frame = decode_response(self.variant, &frame)?;
        debug!(command = %frame.command, status = ?frame.status, "response received");
        Ok(ConsoleResponse { frame })
    }
}

async fn read_exact_or_closed(stream: &mut TcpStream, buf: &mut [u8]) -> Result<(), ConsoleError> {
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ConsoleError::Closed),
        Err(e) => Err(ConsoleError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accepts one connection, reads one request of `request_len` bytes and
    /// writes `reply`.
    async fn one_shot_server(request_len: usize, reply: Vec<u8>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; request_len];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&reply).await.unwrap();
            // Hold the socket open until the client is done.
            let _ = stream.read(&mut [0u8; 1]).await;
        });
        addr
    }

    #[tokio::test]
    async fn test_request_reads_payload_containing_newline() {
        // Arrange: receiving stock of 10 encodes as 00 00 00 0A.
        let reply = [b"RS\x00".as_slice(), &10u32.to_be_bytes(), b"\n"].concat();
        let addr = one_shot_server(7, reply).await;
        let mut conn = ConsoleConnection::connect(addr, FrameVariant::Control)
            .await
            .unwrap();

        // Act
        let resp = conn.request("RS", &[]).await.unwrap();

        // Assert
        assert!(resp.is_success());
        assert_eq!(resp.u32_values().unwrap(), vec![10]);
    }

    #[tokio::test]
    async fn test_error_status_has_no_payload() {
        let addr = one_shot_server(7, b"SH\x01\n".to_vec()).await;
        let mut conn = ConsoleConnection::connect(addr, FrameVariant::Control)
            .await
            .unwrap();

        let resp = conn.request("SH", &[1]).await.unwrap();

        assert_eq!(resp.status(), StatusCode::Failure);
        assert!(resp.frame.payload.is_empty());
    }

    #[tokio::test]
    async fn test_data_all_update_reads_fourteen_bytes() {
        let mut reply = b"AU\x00".to_vec();
        reply.extend_from_slice(&[0, 1, 0, 2, 0, 3, 0, 4, 0, 5, 0, 6, 0, 7]);
        reply.push(b'\n');
        let addr = one_shot_server(17, reply).await;
        let mut conn = ConsoleConnection::connect(addr, FrameVariant::Data)
            .await
            .unwrap();

        let resp = conn.request("RA", &[]).await.unwrap();

        assert_eq!(resp.frame.command, "AU");
        assert_eq!(resp.u16_values().unwrap(), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        let mut conn = ConsoleConnection::connect(addr, FrameVariant::Control)
            .await
            .unwrap()
            .with_read_timeout(Duration::from_millis(50));

        let result = conn.request("AI", &[]).await;

        assert!(matches!(result, Err(ConsoleError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = ConsoleConnection::connect(addr, FrameVariant::Control).await;

        assert!(matches!(result, Err(ConsoleError::ConnectFailed { .. })));
    }
}
