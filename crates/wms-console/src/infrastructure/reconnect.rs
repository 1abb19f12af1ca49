//! Reconnecting console with exponential back-off.
//!
//! After a failed connect or a lost connection the console waits 1 s, then
//! 2 s, 4 s … up to 30 s between attempts.  The first successful exchange
//! resets the delay.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{info, warn};

use wms_core::FrameVariant;

use crate::infrastructure::connection::{ConsoleConnection, ConsoleError, ConsoleResponse};

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Doubling delay with an upper bound.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Returns the delay to wait now and doubles the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

/// A console that (re)connects on demand.
#[derive(Debug)]
pub struct ReconnectingConsole {
    addr: SocketAddr,
    variant: FrameVariant,
    backoff: Backoff,
    conn: Option<ConsoleConnection>,
}

impl ReconnectingConsole {
    pub fn new(addr: SocketAddr, variant: FrameVariant) -> Self {
        Self {
            addr,
            variant,
            backoff: Backoff::default(),
            conn: None,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn variant(&self) -> FrameVariant {
        self.variant
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Sends one request, connecting first if needed.
    ///
    /// Any failed exchange drops the connection, since the stream may still
    /// hold part of the bad response; the next call reconnects.  The caller
    /// decides how long to wait via [`ReconnectingConsole::next_delay`].
    ///
    /// # Errors
    ///
    /// Whatever the connect or the exchange failed with.
    pub async fn request(
        &mut self,
        command: &str,
        payload: &[u8],
    ) -> Result<ConsoleResponse, ConsoleError> {
        if self.conn.is_none() {
            let conn = ConsoleConnection::connect(self.addr, self.variant).await?;
            info!(addr = %self.addr, variant = %self.variant, "console connected");
            self.conn = Some(conn);
        }
        let conn = self.conn.as_mut().ok_or(ConsoleError::NotConnected)?;

        match conn.request(command, payload).await {
            Ok(response) => {
                self.backoff.reset();
                Ok(response)
            }
            Err(e) => {
                warn!(addr = %self.addr, "console connection dropped: {e}");
                self.conn = None;
                Err(e)
            }
        }
    }

    /// Delay before the next attempt after a failure.
    pub fn next_delay(&mut self) -> Duration {
        self.backoff.next_delay()
    }
}
