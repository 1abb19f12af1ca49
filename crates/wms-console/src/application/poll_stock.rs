//! Periodic all-stock polling.
//!
//! Control consoles send `AI` (five u32 stocks); data consoles send `RA` and
//! receive `AU` (five u16 stocks plus received/shipped totals).  Either way
//! the decoded [`StockSnapshot`] is authoritative: the console shows what
//! the server said, never a locally computed value.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use wms_core::{FrameError, FrameVariant, SectorId};

use crate::infrastructure::connection::ConsoleResponse;
use crate::infrastructure::reconnect::ReconnectingConsole;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Stock of every sector, in `SectorId::ALL` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StockSnapshot {
    pub stocks: [u32; 5],
    /// Only the data-frame `AU` reply carries the totals.
    pub totals: Option<(u32, u32)>,
}

impl StockSnapshot {
    pub fn stock(&self, id: SectorId) -> u32 {
        self.stocks[id.index()]
    }

    /// Decodes an `AI` or `AU` payload.
    pub fn from_response(
        variant: FrameVariant,
        response: &ConsoleResponse,
    ) -> Result<Self, FrameError> {
        let values: Vec<u32> = match variant {
            FrameVariant::Control => response.u32_values()?,
            FrameVariant::Data => response
                .u16_values()?
                .into_iter()
                .map(u32::from)
                .collect(),
        };
        let needed = if variant == FrameVariant::Data { 7 } else { 5 };
        if values.len() < needed {
            return Err(FrameError::PayloadTooShort {
                offset: 0,
                needed,
                available: values.len(),
            });
        }

        let mut stocks = [0u32; 5];
        stocks.copy_from_slice(&values[..5]);
        let totals = (variant == FrameVariant::Data).then(|| (values[5], values[6]));
        Ok(Self { stocks, totals })
    }
}

impl std::fmt::Display for StockSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, id) in SectorId::ALL.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{id}={}", self.stock(*id))?;
        }
        if let Some((received, shipped)) = self.totals {
            write!(f, " received={received} shipped={shipped}")?;
        }
        Ok(())
    }
}

/// The all-stock query code for a variant.
pub fn all_stock_command(variant: FrameVariant) -> &'static str {
    match variant {
        FrameVariant::Control => "AI",
        FrameVariant::Data => "RA",
    }
}

/// Asks for all stock once.
pub async fn query_all_stock(
    console: &mut ReconnectingConsole,
) -> Result<Option<StockSnapshot>, crate::infrastructure::connection::ConsoleError> {
    let variant = console.variant();
    let response = console.request(all_stock_command(variant), &[]).await?;
    if !response.is_success() {
        warn!(status = ?response.status(), "all-stock query refused");
        return Ok(None);
    }
    Ok(Some(StockSnapshot::from_response(variant, &response)?))
}

/// Polls every `interval` until `running` is cleared, passing each snapshot
/// to `on_snapshot`.  Failed attempts wait the back-off delay instead.
pub async fn poll_all_stock<F>(
    console: &mut ReconnectingConsole,
    interval: Duration,
    running: Arc<AtomicBool>,
    mut on_snapshot: F,
) where
    F: FnMut(StockSnapshot),
{
    while running.load(Ordering::Relaxed) {
        let delay = match query_all_stock(console).await {
            Ok(Some(snapshot)) => {
                info!("stock: {snapshot}");
                on_snapshot(snapshot);
                interval
            }
            Ok(None) => interval,
            Err(e) => {
                let delay = console.next_delay();
                warn!("stock poll failed: {e}; retrying in {delay:?}");
                delay
            }
        };
        if running.load(Ordering::Relaxed) {
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wms_core::{ResponseFrame, StatusCode};

    fn response(payload: Vec<u8>) -> ConsoleResponse {
        ConsoleResponse {
            frame: ResponseFrame {
                command: "AI".into(),
                status: StatusCode::Success,
                payload,
            },
        }
    }

    #[test]
    fn test_control_snapshot_decodes_five_u32() {
        let payload: Vec<u8> = [1u32, 2, 3, 0, 9]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();

        let snap = StockSnapshot::from_response(FrameVariant::Control, &response(payload)).unwrap();

        assert_eq!(snap.stocks, [1, 2, 3, 0, 9]);
        assert_eq!(snap.totals, None);
        assert_eq!(snap.stock(SectorId::Shipping), 9);
    }

    #[test]
    fn test_data_snapshot_includes_totals() {
        let payload: Vec<u8> = [0u16, 1, 1, 1, 0, 3, 0]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();

        let snap = StockSnapshot::from_response(FrameVariant::Data, &response(payload)).unwrap();

        assert_eq!(snap.stocks, [0, 1, 1, 1, 0]);
        assert_eq!(snap.totals, Some((3, 0)));
    }

    #[test]
    fn test_short_payload_is_rejected() {
        let result = StockSnapshot::from_response(FrameVariant::Control, &response(vec![0; 8]));
        assert!(matches!(result, Err(FrameError::PayloadTooShort { .. })));
    }

    #[test]
    fn test_display_lists_every_sector() {
        let snap = StockSnapshot {
            stocks: [1, 0, 0, 0, 2],
            totals: None,
        };
        let text = snap.to_string();
        assert!(text.starts_with("receiving=1"));
        assert!(text.ends_with("shipping=2"));
    }
}
