//! Command identifiers for both frame layouts.
//!
//! Each layout has its own closed set of two-letter codes.  The same letters
//! can mean different things per layout (`SI` is "shipping stock" on the
//! control port and "ship items" on the data port), so the sets are kept as
//! two separate enums rather than one table.

/// Commands accepted on the control (7-byte) port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    ReceivingStock,
    ShippingStock,
    ColorStock,
    AllStock,
    Cumulative,
    ReceiveItems,
    ShipItem,
    SortItem,
    ClearReceiving,
    ClearStorage,
    ClearShipping,
    ClearAll,
    RobotMove,
    ConveyorTest,
    AgvServoTest,
    StorageMotorTest,
}

impl ControlCommand {
    pub const ALL: [ControlCommand; 16] = [
        ControlCommand::ReceivingStock,
        ControlCommand::ShippingStock,
        ControlCommand::ColorStock,
        ControlCommand::AllStock,
        ControlCommand::Cumulative,
        ControlCommand::ReceiveItems,
        ControlCommand::ShipItem,
        ControlCommand::SortItem,
        ControlCommand::ClearReceiving,
        ControlCommand::ClearStorage,
        ControlCommand::ClearShipping,
        ControlCommand::ClearAll,
        ControlCommand::RobotMove,
        ControlCommand::ConveyorTest,
        ControlCommand::AgvServoTest,
        ControlCommand::StorageMotorTest,
    ];

    /// The two-letter wire code.
    pub const fn code(self) -> &'static str {
        match self {
            ControlCommand::ReceivingStock => "RS",
            ControlCommand::ShippingStock => "SI",
            ControlCommand::ColorStock => "CI",
            ControlCommand::AllStock => "AI",
            ControlCommand::Cumulative => "CU",
            ControlCommand::ReceiveItems => "RE",
            ControlCommand::ShipItem => "SH",
            ControlCommand::SortItem => "SO",
            ControlCommand::ClearReceiving => "CR",
            ControlCommand::ClearStorage => "CS",
            ControlCommand::ClearShipping => "CH",
            ControlCommand::ClearAll => "CA",
            ControlCommand::RobotMove => "RM",
            ControlCommand::ConveyorTest => "CB",
            ControlCommand::AgvServoTest => "AS",
            ControlCommand::StorageMotorTest => "SM",
        }
    }

    /// Length of the success payload in the response.
    pub const fn response_payload_len(self) -> usize {
        match self {
            ControlCommand::ReceivingStock
            | ControlCommand::ShippingStock
            | ControlCommand::ColorStock
            | ControlCommand::ReceiveItems => 4,
            ControlCommand::AllStock => 20,
            ControlCommand::Cumulative => 8,
            _ => 0,
        }
    }
}

impl TryFrom<&str> for ControlCommand {
    type Error = ();

    fn try_from(code: &str) -> Result<Self, ()> {
        ControlCommand::ALL
            .into_iter()
            .find(|c| c.code() == code)
            .ok_or(())
    }
}

/// Commands accepted on the data (17-byte) port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataCommand {
    ReceiveItems,
    ShipItems,
    RequestAll,
    RegionalCounters,
    ReturnHome,
    RobotMove,
}

/// Code the server answers a `RA` request with.
pub const ALL_UPDATE_CODE: &str = "AU";

impl DataCommand {
    pub const ALL: [DataCommand; 6] = [
        DataCommand::ReceiveItems,
        DataCommand::ShipItems,
        DataCommand::RequestAll,
        DataCommand::RegionalCounters,
        DataCommand::ReturnHome,
        DataCommand::RobotMove,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            DataCommand::ReceiveItems => "RI",
            DataCommand::ShipItems => "SI",
            DataCommand::RequestAll => "RA",
            DataCommand::RegionalCounters => "RC",
            DataCommand::ReturnHome => "RH",
            DataCommand::RobotMove => "RM",
        }
    }

    /// The command code echoed in the response.  Only `RA` differs.
    pub const fn response_code(self) -> &'static str {
        match self {
            DataCommand::RequestAll => ALL_UPDATE_CODE,
            other => other.code(),
        }
    }

    pub const fn response_payload_len(self) -> usize {
        match self {
            DataCommand::RequestAll => 14,
            DataCommand::RegionalCounters => 12,
            _ => 0,
        }
    }
}

impl TryFrom<&str> for DataCommand {
    type Error = ();

    fn try_from(code: &str) -> Result<Self, ()> {
        DataCommand::ALL
            .into_iter()
            .find(|c| c.code() == code)
            .ok_or(())
    }
}
