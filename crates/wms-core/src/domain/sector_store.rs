//! The sector store: all five sectors and the cumulative counters behind one
//! lock.
//!
//! # How the locking works (for beginners)
//!
//! Every public method locks the store exactly once and then works on a plain
//! `&mut StoreState`.  Compound operations (classify, ship, multi-unit
//! receive) call the same private primitives on that `&mut` view instead of
//! re-entering the public API, so they never need a reentrant lock and a
//! concurrent reader can never see a half-finished operation.
//!
//! # Two-phase transfers
//!
//! Moving one unit between sectors is a [`Reservation`]: the unit is first
//! taken out of the source sector, then either committed into the target or
//! handed back.  The hand-back lives in `Drop`, so every exit path that does
//! not reach `commit` (an error, an early return, a panic) restores the
//! source.

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::sector::{ItemColor, Sector, SectorId, SectorStatus, StockError};
use crate::domain::sensor::ColorSensor;

/// Shelf capacity of each color storage sector unless configured otherwise.
pub const DEFAULT_STORAGE_CAPACITY: u32 = 3;

// ── Public value types ────────────────────────────────────────────────────────

/// Received/shipped totals for one color.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorCounters {
    pub received: u32,
    pub shipped: u32,
}

/// Lifetime totals.  Only clear commands ever lower them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativeCounters {
    pub total_received: u32,
    pub total_shipped: u32,
    pub red: ColorCounters,
    pub green: ColorCounters,
    pub yellow: ColorCounters,
}

impl CumulativeCounters {
    /// Per-color breakdown; all zero for [`ItemColor::Unknown`].
    pub fn color(&self, color: ItemColor) -> ColorCounters {
        match color {
            ItemColor::Red => self.red,
            ItemColor::Green => self.green,
            ItemColor::Yellow => self.yellow,
            ItemColor::Unknown => ColorCounters::default(),
        }
    }

    fn color_mut(&mut self, color: ItemColor) -> Option<&mut ColorCounters> {
        match color {
            ItemColor::Red => Some(&mut self.red),
            ItemColor::Green => Some(&mut self.green),
            ItemColor::Yellow => Some(&mut self.yellow),
            ItemColor::Unknown => None,
        }
    }

    fn reset_received(&mut self) {
        self.total_received = 0;
        for c in [&mut self.red, &mut self.green, &mut self.yellow] {
            c.received = 0;
        }
    }

    fn reset_shipped(&mut self) {
        self.total_shipped = 0;
        for c in [&mut self.red, &mut self.green, &mut self.yellow] {
            c.shipped = 0;
        }
    }
}

/// Which sectors a clear command empties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    Receiving,
    Storage,
    Shipping,
    All,
}

/// Read-only copy of one sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorView {
    pub id: SectorId,
    pub stock: u32,
    pub capacity: u32,
    pub status: SectorStatus,
}

impl From<&Sector> for SectorView {
    fn from(s: &Sector) -> Self {
        Self {
            id: s.id(),
            stock: s.stock(),
            capacity: s.capacity(),
            status: s.status(),
        }
    }
}

/// Consistent point-in-time copy of the whole store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseSnapshot {
    /// In [`SectorId::ALL`] order.
    pub sectors: [SectorView; 5],
    pub counters: CumulativeCounters,
}

impl WarehouseSnapshot {
    pub fn sector(&self, id: SectorId) -> &SectorView {
        &self.sectors[id.index()]
    }

    pub fn stock(&self, id: SectorId) -> u32 {
        self.sector(id).stock
    }
}

/// Outcome of a multi-unit receive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveReport {
    /// RECEIVING stock after the receive (and any auto-classification).
    pub receiving_stock: u32,
    pub placed_red: u32,
    pub placed_green: u32,
    pub placed_yellow: u32,
}

impl ReceiveReport {
    pub fn placed_total(&self) -> u32 {
        self.placed_red + self.placed_green + self.placed_yellow
    }

    fn record(&mut self, color: ItemColor) {
        match color {
            ItemColor::Red => self.placed_red += 1,
            ItemColor::Green => self.placed_green += 1,
            ItemColor::Yellow => self.placed_yellow += 1,
            ItemColor::Unknown => {}
        }
    }
}

// ── Store state ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct StoreState {
    sectors: [Sector; 5],
    counters: CumulativeCounters,
}

impl StoreState {
    fn new(storage_capacity: u32) -> Self {
        Self {
            sectors: SectorId::ALL.map(|id| {
                let capacity = if id.is_storage() { storage_capacity } else { 0 };
                Sector::new(id, capacity)
            }),
            counters: CumulativeCounters::default(),
        }
    }

    fn sector(&self, id: SectorId) -> &Sector {
        &self.sectors[id.index()]
    }

    fn sector_mut(&mut self, id: SectorId) -> &mut Sector {
        &mut self.sectors[id.index()]
    }

    fn snapshot(&self) -> WarehouseSnapshot {
        WarehouseSnapshot {
            sectors: SectorId::ALL.map(|id| SectorView::from(self.sector(id))),
            counters: self.counters,
        }
    }

    fn classify(&mut self, color: ItemColor) -> Result<(), StockError> {
        let target = color.storage_sector().ok_or(StockError::UnclassifiedItem)?;

        let receiving = self.sector(SectorId::Receiving);
        if receiving.stock() == 0 {
            return Err(StockError::InsufficientStock {
                sector: SectorId::Receiving,
                stock: 0,
                qty: 1,
            });
        }
        let storage = self.sector(target);
        if !storage.is_available_for_storage() {
            return Err(StockError::CapacityExceeded {
                sector: target,
                capacity: storage.capacity(),
                stock: storage.stock(),
                qty: 1,
            });
        }

        Reservation::reserve(self, SectorId::Receiving, target)?.commit()?;
        if let Some(c) = self.counters.color_mut(color) {
            c.received = c.received.saturating_add(1);
        }
        Ok(())
    }

    fn ship_one(&mut self, color: ItemColor) -> Result<(), StockError> {
        let source = color.storage_sector().ok_or(StockError::UnclassifiedItem)?;

        Reservation::reserve(self, source, SectorId::Shipping)?.commit()?;
        self.counters.total_shipped = self.counters.total_shipped.saturating_add(1);
        if let Some(c) = self.counters.color_mut(color) {
            c.shipped = c.shipped.saturating_add(1);
        }
        Ok(())
    }

    fn any_storage_available(&self) -> bool {
        ItemColor::STORED
            .iter()
            .filter_map(|c| c.storage_sector())
            .any(|id| self.sector(id).is_available_for_storage())
    }
}

// ── Reservation ───────────────────────────────────────────────────────────────

/// One unit taken out of `source`, on its way to `target`.
///
/// Dropping a reservation without a successful [`Reservation::commit`] puts
/// the unit back into `source`.
struct Reservation<'a> {
    state: &'a mut StoreState,
    source: SectorId,
    target: SectorId,
    committed: bool,
}

impl<'a> Reservation<'a> {
    fn reserve(
        state: &'a mut StoreState,
        source: SectorId,
        target: SectorId,
    ) -> Result<Self, StockError> {
        state.sector_mut(source).remove_stock(1)?;
        Ok(Self {
            state,
            source,
            target,
            committed: false,
        })
    }

    fn commit(mut self) -> Result<(), StockError> {
        self.state.sector_mut(self.target).add_stock(1)?;
        self.committed = true;
        debug!(from = %self.source, to = %self.target, "transfer committed");
        Ok(())
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        // The unit was just removed from `source`, so there is room for it.
        let _ = self.state.sector_mut(self.source).add_stock(1);
        debug!(from = %self.source, to = %self.target, "transfer compensated");
    }
}

// ── SectorStore ───────────────────────────────────────────────────────────────

/// Thread-safe owner of all sector stock and counters.
///
/// Shared between connection tasks behind an `Arc`.
#[derive(Debug)]
pub struct SectorStore {
    inner: Mutex<StoreState>,
}

impl Default for SectorStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORAGE_CAPACITY)
    }
}

impl SectorStore {
    /// Creates the five sectors.  RECEIVING and SHIPPING are unbounded; each
    /// color storage sector holds `storage_capacity` units.
    pub fn new(storage_capacity: u32) -> Self {
        Self {
            inner: Mutex::new(StoreState::new(storage_capacity)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StockError> {
        self.inner.lock().map_err(|_| StockError::Poisoned)
    }

    /// Adds `qty` units to `sector`; returns the new stock.
    pub fn add_stock(&self, sector: SectorId, qty: u32) -> Result<u32, StockError> {
        self.lock()?.sector_mut(sector).add_stock(qty)
    }

    /// Removes `qty` units from `sector`; returns the new stock.
    pub fn remove_stock(&self, sector: SectorId, qty: u32) -> Result<u32, StockError> {
        self.lock()?.sector_mut(sector).remove_stock(qty)
    }

    /// Moves one unit from RECEIVING to the storage sector for `color`.
    ///
    /// # Errors
    ///
    /// - [`StockError::UnclassifiedItem`] for [`ItemColor::Unknown`].
    /// - [`StockError::InsufficientStock`] if RECEIVING is empty.
    /// - [`StockError::CapacityExceeded`] if the target shelf is full.
    ///
    /// On any error both sectors are exactly as they were before the call.
    pub fn classify_and_store(&self, color: ItemColor) -> Result<(), StockError> {
        self.lock()?.classify(color)
    }

    /// Moves one unit from the storage sector for `color` to SHIPPING.
    pub fn ship_from_storage(&self, color: ItemColor) -> Result<(), StockError> {
        self.lock()?.ship_one(color)
    }

    /// Ships several units of each color at once, all or nothing.
    pub fn ship_items(&self, red: u32, green: u32, yellow: u32) -> Result<(), StockError> {
        let mut state = self.lock()?;
        let order = [
            (ItemColor::Red, red),
            (ItemColor::Green, green),
            (ItemColor::Yellow, yellow),
        ];

        for (color, qty) in order {
            if let Some(id) = color.storage_sector() {
                let stock = state.sector(id).stock();
                if stock < qty {
                    return Err(StockError::InsufficientStock {
                        sector: id,
                        stock,
                        qty,
                    });
                }
            }
        }

        let saved = state.clone();
        for (color, qty) in order {
            for _ in 0..qty {
                if let Err(e) = state.ship_one(color) {
                    *state = saved;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Adds `qty` units to RECEIVING and, when `auto_classify` is set, sorts
    /// each unit into storage by the color `sensor` reports.
    ///
    /// Units whose color is unknown, or whose shelf is full, stay in
    /// RECEIVING.  The lock is held for the whole loop.
    pub fn receive_items(
        &self,
        qty: u32,
        sensor: &dyn ColorSensor,
        auto_classify: bool,
    ) -> Result<ReceiveReport, StockError> {
        let mut state = self.lock()?;
        state.sector_mut(SectorId::Receiving).add_stock(qty)?;
        state.counters.total_received = state.counters.total_received.saturating_add(qty);

        let mut report = ReceiveReport::default();
        if auto_classify {
            for _ in 0..qty {
                if !state.any_storage_available() {
                    break;
                }
                let color = sensor.detect();
                match state.classify(color) {
                    Ok(()) => report.record(color),
                    Err(e) => debug!(?color, error = %e, "unit left in receiving"),
                }
            }
        }

        report.receiving_stock = state.sector(SectorId::Receiving).stock();
        Ok(report)
    }

    /// Empties the sectors named by `scope` and resets the matching counters.
    pub fn clear(&self, scope: ClearScope) -> Result<(), StockError> {
        let mut state = self.lock()?;
        let sectors: &[SectorId] = match scope {
            ClearScope::Receiving => &[SectorId::Receiving],
            ClearScope::Storage => &[
                SectorId::RedStorage,
                SectorId::GreenStorage,
                SectorId::YellowStorage,
            ],
            ClearScope::Shipping => &[SectorId::Shipping],
            ClearScope::All => &SectorId::ALL,
        };
        for &id in sectors {
            state.sector_mut(id).clear();
        }

        match scope {
            ClearScope::Receiving => state.counters.reset_received(),
            ClearScope::Storage => {}
            ClearScope::Shipping => state.counters.reset_shipped(),
            ClearScope::All => state.counters = CumulativeCounters::default(),
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Result<WarehouseSnapshot, StockError> {
        Ok(self.lock()?.snapshot())
    }

    pub fn stock(&self, sector: SectorId) -> Result<u32, StockError> {
        Ok(self.lock()?.sector(sector).stock())
    }

    pub fn counters(&self) -> Result<CumulativeCounters, StockError> {
        Ok(self.lock()?.counters)
    }
}
