//! Sector domain entity.
//!
//! A sector is one of the five fixed zones of the warehouse.  Each has a
//! capacity (0 means unbounded), a current stock, and a status derived from
//! the stock movements applied to it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity of one of the five warehouse sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SectorId {
    Receiving,
    RedStorage,
    GreenStorage,
    YellowStorage,
    Shipping,
}

impl SectorId {
    /// All sectors in wire order: RECEIVING, RED, GREEN, YELLOW, SHIPPING.
    pub const ALL: [SectorId; 5] = [
        SectorId::Receiving,
        SectorId::RedStorage,
        SectorId::GreenStorage,
        SectorId::YellowStorage,
        SectorId::Shipping,
    ];

    /// Position in [`SectorId::ALL`]; also the index into the store's table.
    pub const fn index(self) -> usize {
        match self {
            SectorId::Receiving => 0,
            SectorId::RedStorage => 1,
            SectorId::GreenStorage => 2,
            SectorId::YellowStorage => 3,
            SectorId::Shipping => 4,
        }
    }

    /// Decodes a robot position byte (0..=4).
    pub fn from_position(byte: u8) -> Option<SectorId> {
        SectorId::ALL.get(byte as usize).copied()
    }

    pub const fn name(self) -> &'static str {
        match self {
            SectorId::Receiving => "receiving",
            SectorId::RedStorage => "red_storage",
            SectorId::GreenStorage => "green_storage",
            SectorId::YellowStorage => "yellow_storage",
            SectorId::Shipping => "shipping",
        }
    }

    /// `true` for the three color storage sectors.
    pub const fn is_storage(self) -> bool {
        matches!(
            self,
            SectorId::RedStorage | SectorId::GreenStorage | SectorId::YellowStorage
        )
    }
}

impl std::fmt::Display for SectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Color reported by the classification sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemColor {
    Unknown,
    Red,
    Green,
    Yellow,
}

impl ItemColor {
    /// The three colors that map to a storage sector.
    pub const STORED: [ItemColor; 3] = [ItemColor::Red, ItemColor::Green, ItemColor::Yellow];

    /// Storage sector for this color; `None` for [`ItemColor::Unknown`].
    pub const fn storage_sector(self) -> Option<SectorId> {
        match self {
            ItemColor::Red => Some(SectorId::RedStorage),
            ItemColor::Green => Some(SectorId::GreenStorage),
            ItemColor::Yellow => Some(SectorId::YellowStorage),
            ItemColor::Unknown => None,
        }
    }

    /// Wire code: 0x01 red, 0x02 green, 0x03 yellow.
    pub const fn code(self) -> u8 {
        match self {
            ItemColor::Unknown => 0x00,
            ItemColor::Red => 0x01,
            ItemColor::Green => 0x02,
            ItemColor::Yellow => 0x03,
        }
    }
}

impl TryFrom<u8> for ItemColor {
    type Error = ();

    /// Only the three storable colors have a wire code; anything else
    /// (including 0x00) is rejected.
    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(ItemColor::Red),
            0x02 => Ok(ItemColor::Green),
            0x03 => Ok(ItemColor::Yellow),
            _ => Err(()),
        }
    }
}

/// Lifecycle status of a sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectorStatus {
    Available,
    Processing,
    Full,
    /// Never produced by the current operations; kept across add/remove until
    /// stock drops to zero.
    Unavailable,
}

/// Errors returned by stock operations.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum StockError {
    #[error("{sector}: capacity {capacity} exceeded (stock {stock}, adding {qty})")]
    CapacityExceeded {
        sector: SectorId,
        capacity: u32,
        stock: u32,
        qty: u32,
    },

    #[error("{sector}: insufficient stock (stock {stock}, removing {qty})")]
    InsufficientStock { sector: SectorId, stock: u32, qty: u32 },

    #[error("item color could not be classified")]
    UnclassifiedItem,

    #[error("{sector}: stock counter would overflow")]
    CounterOverflow { sector: SectorId },

    /// The store's lock was poisoned by a panicking holder.
    #[error("sector store lock poisoned")]
    Poisoned,
}

impl StockError {
    /// `true` for faults that are not a business rule rejection.
    pub fn is_internal(&self) -> bool {
        matches!(self, StockError::Poisoned)
    }
}

/// One warehouse sector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sector {
    id: SectorId,
    capacity: u32,
    stock: u32,
    status: SectorStatus,
}

impl Sector {
    /// Creates an empty sector.  `capacity == 0` means unbounded.
    pub fn new(id: SectorId, capacity: u32) -> Self {
        Self {
            id,
            capacity,
            stock: 0,
            status: SectorStatus::Available,
        }
    }

    pub fn id(&self) -> SectorId {
        self.id
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn stock(&self) -> u32 {
        self.stock
    }

    pub fn status(&self) -> SectorStatus {
        self.status
    }

    pub fn is_bounded(&self) -> bool {
        self.capacity > 0
    }

    /// `true` if one more unit fits.
    pub fn is_available_for_storage(&self) -> bool {
        self.status != SectorStatus::Full && (!self.is_bounded() || self.stock < self.capacity)
    }

    /// Adds `qty` units and returns the new stock.
    ///
    /// # Errors
    ///
    /// [`StockError::CapacityExceeded`] if the sector is bounded and the
    /// result would exceed capacity; [`StockError::CounterOverflow`] if the
    /// count would not fit in a `u32`.  No mutation happens on error.
    pub fn add_stock(&mut self, qty: u32) -> Result<u32, StockError> {
        let new_stock = self
            .stock
            .checked_add(qty)
            .ok_or(StockError::CounterOverflow { sector: self.id })?;

        if self.is_bounded() && new_stock > self.capacity {
            return Err(StockError::CapacityExceeded {
                sector: self.id,
                capacity: self.capacity,
                stock: self.stock,
                qty,
            });
        }

        self.stock = new_stock;
        if self.is_bounded() && new_stock == self.capacity {
            self.status = SectorStatus::Full;
        } else if self.status == SectorStatus::Available && new_stock > 0 {
            self.status = SectorStatus::Processing;
        }
        Ok(new_stock)
    }

    /// Removes `qty` units and returns the new stock.
    ///
    /// # Errors
    ///
    /// [`StockError::InsufficientStock`] if fewer than `qty` units are present.
    pub fn remove_stock(&mut self, qty: u32) -> Result<u32, StockError> {
        let new_stock = self
            .stock
            .checked_sub(qty)
            .ok_or(StockError::InsufficientStock {
                sector: self.id,
                stock: self.stock,
                qty,
            })?;

        self.stock = new_stock;
        if new_stock == 0 {
            self.status = SectorStatus::Available;
        } else if self.status == SectorStatus::Full && new_stock < self.capacity {
            self.status = SectorStatus::Processing;
        }
        Ok(new_stock)
    }

    /// Resets the sector to empty and available.
    pub fn clear(&mut self) {
        self.stock = 0;
        self.status = SectorStatus::Available;
    }

    /// Forces a status, e.g. an operator-disabled sector in tests.
    #[cfg(test)]
    pub(crate) fn set_status(&mut self, status: SectorStatus) {
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_status_consistent(sector: &Sector) {
        assert_eq!(
            sector.status() == SectorStatus::Full,
            sector.is_bounded() && sector.stock() == sector.capacity(),
            "FULL must match stock == capacity for {sector:?}"
        );
        if sector.status() == SectorStatus::Available {
            assert_eq!(sector.stock(), 0, "AVAILABLE implies empty for {sector:?}");
        }
    }

    #[test]
    fn test_third_add_fills_bounded_sector_and_fourth_fails() {
        // Arrange
        let mut red = Sector::new(SectorId::RedStorage, 3);

        // Act / Assert
        assert_eq!(red.add_stock(1), Ok(1));
        assert_eq!(red.status(), SectorStatus::Processing);
        assert_eq!(red.add_stock(1), Ok(2));
        assert_eq!(red.add_stock(1), Ok(3));
        assert_eq!(red.status(), SectorStatus::Full);

        let fourth = red.add_stock(1);
        assert!(matches!(fourth, Err(StockError::CapacityExceeded { .. })));
        assert_eq!(red.stock(), 3);
        assert_eq!(red.status(), SectorStatus::Full);
    }

    #[test]
    fn test_remove_from_full_becomes_processing_then_available() {
        let mut red = Sector::new(SectorId::RedStorage, 2);
        red.add_stock(2).unwrap();

        assert_eq!(red.remove_stock(1), Ok(1));
        assert_eq!(red.status(), SectorStatus::Processing);
        assert_eq!(red.remove_stock(1), Ok(0));
        assert_eq!(red.status(), SectorStatus::Available);
    }

    #[test]
    fn test_remove_more_than_stock_fails_without_mutation() {
        let mut shipping = Sector::new(SectorId::Shipping, 0);
        shipping.add_stock(1).unwrap();

        let result = shipping.remove_stock(2);

        assert_eq!(
            result,
            Err(StockError::InsufficientStock {
                sector: SectorId::Shipping,
                stock: 1,
                qty: 2
            })
        );
        assert_eq!(shipping.stock(), 1);
    }

    #[test]
    fn test_unbounded_sector_is_never_full() {
        let mut receiving = Sector::new(SectorId::Receiving, 0);
        receiving.add_stock(10_000).unwrap();
        assert_eq!(receiving.status(), SectorStatus::Processing);
        assert!(receiving.is_available_for_storage());
    }

    #[test]
    fn test_add_overflow_is_rejected() {
        let mut receiving = Sector::new(SectorId::Receiving, 0);
        receiving.add_stock(u32::MAX).unwrap();
        assert_eq!(
            receiving.add_stock(1),
            Err(StockError::CounterOverflow {
                sector: SectorId::Receiving
            })
        );
    }

    #[test]
    fn test_unavailable_is_kept_until_empty() {
        let mut green = Sector::new(SectorId::GreenStorage, 3);
        green.set_status(SectorStatus::Unavailable);

        green.add_stock(1).unwrap();
        assert_eq!(green.status(), SectorStatus::Unavailable);

        green.remove_stock(1).unwrap();
        assert_eq!(green.status(), SectorStatus::Available);
    }

    #[test]
    fn test_capacity_and_status_invariants_hold_over_mixed_sequence() {
        // Deterministic pseudo-random walk of adds and removes.
        let mut yellow = Sector::new(SectorId::YellowStorage, 3);
        let mut seed: u32 = 0x2545_F491;
        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let qty = seed % 3;
            let _ = if seed & 0x100 == 0 {
                yellow.add_stock(qty)
            } else {
                yellow.remove_stock(qty)
            };
            assert!(yellow.stock() <= yellow.capacity());
            assert_status_consistent(&yellow);
        }
    }

    #[test]
    fn test_color_codes() {
        assert_eq!(ItemColor::try_from(0x02), Ok(ItemColor::Green));
        assert!(ItemColor::try_from(0x00).is_err());
        assert!(ItemColor::try_from(0x04).is_err());
        assert_eq!(ItemColor::Unknown.storage_sector(), None);
        assert_eq!(
            ItemColor::Yellow.storage_sector(),
            Some(SectorId::YellowStorage)
        );
    }

    #[test]
    fn test_position_byte_maps_to_sector() {
        assert_eq!(SectorId::from_position(0), Some(SectorId::Receiving));
        assert_eq!(SectorId::from_position(4), Some(SectorId::Shipping));
        assert_eq!(SectorId::from_position(5), None);
    }
}
