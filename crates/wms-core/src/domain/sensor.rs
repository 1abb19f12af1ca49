//! Simulated color sensor used when receiving items.
//!
//! There is no hardware behind this: a sensor is anything that answers
//! "what color is the next item?".  The store asks once per unit while it
//! holds its lock, so implementations must not block.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::sector::ItemColor;

/// Source of item colors for auto-classification.
pub trait ColorSensor: Send + Sync {
    /// Reports the color of the next item on the conveyor.
    fn detect(&self) -> ItemColor;
}

/// Cycles RED → GREEN → YELLOW → RED … across calls.
#[derive(Debug, Default)]
pub struct CyclingColorSensor {
    next: AtomicUsize,
}

impl CyclingColorSensor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ColorSensor for CyclingColorSensor {
    fn detect(&self) -> ItemColor {
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        ItemColor::STORED[i % ItemColor::STORED.len()]
    }
}

/// Always reports the same color.
#[derive(Debug, Clone, Copy)]
pub struct FixedColorSensor(pub ItemColor);

impl ColorSensor for FixedColorSensor {
    fn detect(&self) -> ItemColor {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycling_sensor_repeats_red_green_yellow() {
        let sensor = CyclingColorSensor::new();
        let seen: Vec<ItemColor> = (0..4).map(|_| sensor.detect()).collect();
        assert_eq!(
            seen,
            vec![
                ItemColor::Red,
                ItemColor::Green,
                ItemColor::Yellow,
                ItemColor::Red
            ]
        );
    }

    #[test]
    fn test_fixed_sensor() {
        assert_eq!(FixedColorSensor(ItemColor::Unknown).detect(), ItemColor::Unknown);
    }
}
