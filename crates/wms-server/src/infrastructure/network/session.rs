//! Per-connection frame loop.
//!
//! A session owns one stream and repeats:
//!
//! ```text
//! read exactly one request frame (under the idle timeout)
//!   → decode_request       (framing fault: log, drop, keep reading)
//!   → FrameHandler::handle (always yields a response)
//!   → encode_response → write_all
//! ```
//!
//! Requests have a fixed length per variant, so the loop never scans for the
//! terminator; it simply fills a buffer of `variant.request_len()` bytes.
//!
//! The loop is generic over the stream type so tests can drive it with
//! `tokio_test::io::Builder` or an in-memory `tokio::io::duplex` pipe.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, error, warn};

use wms_core::{decode_request, encode_response, FrameVariant, StatusCode};

use crate::application::dispatch::FrameHandler;

/// Why a session ended without an I/O error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// EOF at a frame boundary.
    PeerClosed,
    /// Nothing arrived for the whole idle timeout.
    IdleTimeout,
    /// EOF in the middle of a frame.
    IncompleteFrame { received: usize },
}

/// Runs the frame loop until the peer closes, goes idle, or the stream fails.
///
/// `frames` is incremented once per answered request.
///
/// # Errors
///
/// Returns the underlying I/O error if a read or write fails.
pub async fn run_session<S, H>(
    stream: &mut S,
    variant: FrameVariant,
    idle_timeout: Duration,
    handler: &H,
    frames: &AtomicU64,
) -> io::Result<SessionEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: FrameHandler + ?Sized,
{
    let mut buf = vec![0u8; variant.request_len()];

    loop {
        let filled = match timeout(idle_timeout, read_frame(stream, &mut buf)).await {
            Ok(result) => result?,
            Err(_) => return Ok(SessionEnd::IdleTimeout),
        };
        if filled == 0 {
            return Ok(SessionEnd::PeerClosed);
        }
        if filled < buf.len() {
            return Ok(SessionEnd::IncompleteFrame { received: filled });
        }

        let request = match decode_request(variant, &buf) {
            Ok(request) => request,
            Err(e) => {
                warn!(%variant, "dropping malformed frame: {e}");
                continue;
            }
        };
        debug!(%variant, command = %request.command, "frame received");

        let response = handler.handle(variant, request).await;
        let bytes = match encode_response(
            variant,
            &response.command,
            response.status,
            &response.payload,
        ) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(%variant, command = %response.command, "cannot encode response: {e}");
                encode_response(variant, &response.command, StatusCode::InternalError, &[])
                    .map_err(io::Error::other)?
            }
        };

        stream.write_all(&bytes).await?;
        stream.flush().await?;
        frames.fetch_add(1, Ordering::Relaxed);
    }
}

/// Reads until `buf` is full or the stream reaches EOF.
///
/// Returns the number of bytes filled; 0 means EOF before the first byte.
async fn read_frame<S>(stream: &mut S, buf: &mut [u8]) -> io::Result<usize>
where
    S: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatch::MockFrameHandler;
    use wms_core::{encode_request, ResponseFrame};

    fn echo_success_handler(times: usize) -> MockFrameHandler {
        let mut handler = MockFrameHandler::new();
        handler
            .expect_handle()
            .times(times)
            .returning(|_, frame| ResponseFrame::success(frame.command, Vec::new()));
        handler
    }

    #[tokio::test]
    async fn test_valid_frame_is_answered_then_peer_closes() {
        // Arrange
        let mut stream = tokio_test::io::Builder::new()
            .read(&encode_request(FrameVariant::Control, "CA", &[]))
            .write(b"CA\x00\n")
            .build();
        let handler = echo_success_handler(1);
        let frames = AtomicU64::new(0);

        // Act
        let end = run_session(
            &mut stream,
            FrameVariant::Control,
            Duration::from_secs(5),
            &handler,
            &frames,
        )
        .await
        .expect("session");

        // Assert
        assert_eq!(end, SessionEnd::PeerClosed);
        assert_eq!(frames.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_bad_terminator_is_dropped_and_next_frame_answered() {
        // Arrange: the first frame ends in 0x00 instead of '\n'.
        let mut bad = encode_request(FrameVariant::Control, "AI", &[]);
        *bad.last_mut().unwrap() = 0x00;
        let mut stream = tokio_test::io::Builder::new()
            .read(&bad)
            .read(&encode_request(FrameVariant::Control, "CR", &[]))
            .write(b"CR\x00\n")
            .build();
        let handler = echo_success_handler(1);
        let frames = AtomicU64::new(0);

        // Act
        let end = run_session(
            &mut stream,
            FrameVariant::Control,
            Duration::from_secs(5),
            &handler,
            &frames,
        )
        .await
        .expect("session");

        // Assert
        assert_eq!(end, SessionEnd::PeerClosed);
        assert_eq!(frames.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_frame_split_across_reads_is_reassembled() {
        let frame = encode_request(FrameVariant::Data, "RA", &[]);
        let mut stream = tokio_test::io::Builder::new()
            .read(&frame[..5])
            .read(&frame[5..])
            .write(b"RA\x00\n")
            .build();
        let handler = echo_success_handler(1);
        let frames = AtomicU64::new(0);

        let end = run_session(
            &mut stream,
            FrameVariant::Data,
            Duration::from_secs(5),
            &handler,
            &frames,
        )
        .await
        .expect("session");

        assert_eq!(end, SessionEnd::PeerClosed);
    }

    #[tokio::test]
    async fn test_eof_mid_frame_reports_incomplete() {
        let mut stream = tokio_test::io::Builder::new().read(b"AI\x00").build();
        let handler = echo_success_handler(0);
        let frames = AtomicU64::new(0);

        let end = run_session(
            &mut stream,
            FrameVariant::Control,
            Duration::from_secs(5),
            &handler,
            &frames,
        )
        .await
        .expect("session");

        assert_eq!(end, SessionEnd::IncompleteFrame { received: 3 });
        assert_eq!(frames.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_oversized_handler_payload_becomes_internal_error() {
        // Arrange
        let mut stream = tokio_test::io::Builder::new()
            .read(&encode_request(FrameVariant::Control, "AI", &[]))
            .write(b"AI\xFF\n")
            .build();
        let mut handler = MockFrameHandler::new();
        handler
            .expect_handle()
            .returning(|_, frame| ResponseFrame::success(frame.command, vec![0; 64]));
        let frames = AtomicU64::new(0);

        // Act
        let end = run_session(
            &mut stream,
            FrameVariant::Control,
            Duration::from_secs(5),
            &handler,
            &frames,
        )
        .await
        .expect("session");

        // Assert
        assert_eq!(end, SessionEnd::PeerClosed);
    }

    #[tokio::test]
    async fn test_idle_connection_times_out() {
        // Arrange: keep the client half open but silent.
        let (_client, mut server) = tokio::io::duplex(64);
        let handler = echo_success_handler(0);
        let frames = AtomicU64::new(0);

        // Act
        let end = run_session(
            &mut server,
            FrameVariant::Control,
            Duration::from_millis(50),
            &handler,
            &frames,
        )
        .await
        .expect("session");

        // Assert
        assert_eq!(end, SessionEnd::IdleTimeout);
    }
}
