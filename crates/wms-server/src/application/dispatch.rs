//! Dispatcher: decoded request frame → warehouse operation → response frame.
//!
//! # Flow
//!
//! ```text
//! RequestFrame ──parse──► Request ──execute──► payload bytes ──► ResponseFrame
//!      │                     │                      │
//!      └─ unknown code       └─ bad payload         └─ StockError / robot refusal
//!         INVALID_CMD           INVALID_DATA           FAILURE (or INTERNAL_ERROR)
//! ```
//!
//! Parsing is a pure function of the frame and its variant, so an unknown
//! command never reaches the warehouse.  Every failure is turned into a
//! status byte inside [`Dispatcher::handle`]; the connection layer only ever
//! sees a finished [`ResponseFrame`].  That includes a panic inside an
//! operation, which is answered with INTERNAL_ERROR.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use wms_core::protocol::codec::{read_u16, read_u32, read_u8};
use wms_core::protocol::command::{ControlCommand, DataCommand};
use wms_core::{
    ClearScope, ColorSensor, CyclingColorSensor, FrameVariant, ItemColor, MoveOutcome,
    RequestFrame, ResponseFrame, SectorId, SectorStore, StatusCode, StockError,
    WarehouseSnapshot,
};

use crate::application::robot_control::{Actuator, RobotController};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why a request did not succeed.  Each variant maps to one status byte.
#[derive(Debug, Error, PartialEq)]
pub enum DispatchError {
    /// The command code is not part of this frame variant's command set.
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    /// The payload failed a semantic check (zero quantity, bad color code).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A stock rule rejected the operation.
    #[error("stock operation rejected: {0}")]
    Stock(StockError),

    /// The robot refused the move.
    #[error("robot move rejected: {0:?}")]
    Robot(MoveOutcome),

    /// Unexpected fault inside the handler.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// The status byte sent back to the console.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::UnknownCommand(_) => StatusCode::InvalidCmd,
            DispatchError::InvalidData(_) => StatusCode::InvalidData,
            DispatchError::Stock(_) | DispatchError::Robot(_) => StatusCode::Failure,
            DispatchError::Internal(_) => StatusCode::InternalError,
        }
    }
}

impl From<StockError> for DispatchError {
    fn from(e: StockError) -> Self {
        if e.is_internal() {
            DispatchError::Internal(e.to_string())
        } else {
            DispatchError::Stock(e)
        }
    }
}

// ── Requests ──────────────────────────────────────────────────────────────────

/// Every operation the server can perform, independent of frame layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    SectorStock(SectorId),
    AllStock,
    Cumulative,
    /// `echo_stock` answers with the resulting RECEIVING stock (control `RE`);
    /// the data-frame `RI` is status only.
    Receive { qty: u32, echo_stock: bool },
    ShipOne(ItemColor),
    Classify(ItemColor),
    ShipItems { red: u16, green: u16, yellow: u16 },
    Clear(ClearScope),
    MoveRobot(SectorId),
    ReturnHome,
    ActuatorTest(Actuator),
    RequestAll,
    RegionalCounters,
}

impl Request {
    /// Parses a decoded frame for the given variant.
    ///
    /// # Errors
    ///
    /// [`DispatchError::UnknownCommand`] for codes outside the variant's set,
    /// [`DispatchError::InvalidData`] for payloads that fail validation.
    pub fn parse(variant: FrameVariant, frame: &RequestFrame) -> Result<Self, DispatchError> {
        match variant {
            FrameVariant::Control => parse_control(frame),
            FrameVariant::Data => parse_data(frame),
        }
    }
}

fn parse_control(frame: &RequestFrame) -> Result<Request, DispatchError> {
    let command = ControlCommand::try_from(frame.command.as_str())
        .map_err(|_| DispatchError::UnknownCommand(frame.command.clone()))?;
    let p = &frame.payload;

    let request = match command {
        ControlCommand::ReceivingStock => Request::SectorStock(SectorId::Receiving),
        ControlCommand::ShippingStock => Request::SectorStock(SectorId::Shipping),
        ControlCommand::ColorStock => Request::SectorStock(storage_of(color_at(p)?)),
        ControlCommand::AllStock => Request::AllStock,
        ControlCommand::Cumulative => Request::Cumulative,
        ControlCommand::ReceiveItems => {
            let qty = read_u32(p, 0).map_err(invalid)?;
            if qty == 0 {
                return Err(DispatchError::InvalidData("receive quantity is zero".into()));
            }
            Request::Receive {
                qty,
                echo_stock: true,
            }
        }
        ControlCommand::ShipItem => Request::ShipOne(color_at(p)?),
        ControlCommand::SortItem => Request::Classify(color_at(p)?),
        ControlCommand::ClearReceiving => Request::Clear(ClearScope::Receiving),
        ControlCommand::ClearStorage => Request::Clear(ClearScope::Storage),
        ControlCommand::ClearShipping => Request::Clear(ClearScope::Shipping),
        ControlCommand::ClearAll => Request::Clear(ClearScope::All),
        ControlCommand::RobotMove => Request::MoveRobot(position_at(p)?),
        ControlCommand::ConveyorTest => Request::ActuatorTest(Actuator::Conveyor),
        ControlCommand::AgvServoTest => Request::ActuatorTest(Actuator::AgvServo),
        ControlCommand::StorageMotorTest => {
            Request::ActuatorTest(Actuator::StorageServo(color_at(p)?))
        }
    };
    Ok(request)
}

fn parse_data(frame: &RequestFrame) -> Result<Request, DispatchError> {
    let command = DataCommand::try_from(frame.command.as_str())
        .map_err(|_| DispatchError::UnknownCommand(frame.command.clone()))?;
    let p = &frame.payload;

    let request = match command {
        DataCommand::ReceiveItems => {
            let qty = read_u16(p, 0).map_err(invalid)?;
            if qty == 0 {
                return Err(DispatchError::InvalidData("receive quantity is zero".into()));
            }
            Request::Receive {
                qty: u32::from(qty),
                echo_stock: false,
            }
        }
        DataCommand::ShipItems => {
            let red = read_u16(p, 0).map_err(invalid)?;
            let green = read_u16(p, 2).map_err(invalid)?;
            let yellow = read_u16(p, 4).map_err(invalid)?;
            if red == 0 && green == 0 && yellow == 0 {
                return Err(DispatchError::InvalidData("nothing to ship".into()));
            }
            Request::ShipItems { red, green, yellow }
        }
        DataCommand::RequestAll => Request::RequestAll,
        DataCommand::RegionalCounters => Request::RegionalCounters,
        DataCommand::ReturnHome => Request::ReturnHome,
        DataCommand::RobotMove => Request::MoveRobot(position_at(p)?),
    };
    Ok(request)
}

fn invalid(e: impl std::fmt::Display) -> DispatchError {
    DispatchError::InvalidData(e.to_string())
}

fn color_at(payload: &[u8]) -> Result<ItemColor, DispatchError> {
    let code = read_u8(payload, 0).map_err(invalid)?;
    ItemColor::try_from(code)
        .map_err(|_| DispatchError::InvalidData(format!("unknown color code 0x{code:02X}")))
}

fn position_at(payload: &[u8]) -> Result<SectorId, DispatchError> {
    let code = read_u8(payload, 0).map_err(invalid)?;
    SectorId::from_position(code)
        .ok_or_else(|| DispatchError::InvalidData(format!("unknown robot position {code}")))
}

fn storage_of(color: ItemColor) -> SectorId {
    // `color_at` never yields Unknown.
    color.storage_sector().unwrap_or(SectorId::Receiving)
}

/// The command code a response carries.  Only the data-frame `RA` differs
/// from the request code.
pub fn response_code(variant: FrameVariant, command: &str) -> String {
    match (variant, DataCommand::try_from(command)) {
        (FrameVariant::Data, Ok(cmd)) => cmd.response_code().to_string(),
        _ => command.to_string(),
    }
}

// ── Warehouse context ─────────────────────────────────────────────────────────

/// The shared warehouse: sector store, robot and classification sensor.
///
/// Built once at startup and shared by every connection behind an `Arc`.
pub struct Warehouse {
    store: SectorStore,
    robot: RobotController,
    sensor: Box<dyn ColorSensor>,
    auto_classify: bool,
}

impl Warehouse {
    pub fn new(store: SectorStore, robot: RobotController, sensor: Box<dyn ColorSensor>) -> Self {
        Self {
            store,
            robot,
            sensor,
            auto_classify: true,
        }
    }

    /// Whether received units are sorted into storage immediately.
    pub fn with_auto_classify(mut self, enabled: bool) -> Self {
        self.auto_classify = enabled;
        self
    }

    /// Default store, default robot timings and a cycling sensor.
    pub fn with_defaults() -> Self {
        Self::new(
            SectorStore::default(),
            RobotController::new(Default::default(), std::time::Duration::from_millis(200)),
            Box::new(CyclingColorSensor::new()),
        )
    }

    pub fn store(&self) -> &SectorStore {
        &self.store
    }

    pub fn robot(&self) -> &RobotController {
        &self.robot
    }
}

impl std::fmt::Debug for Warehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warehouse")
            .field("store", &self.store)
            .field("robot", &self.robot)
            .field("auto_classify", &self.auto_classify)
            .finish_non_exhaustive()
    }
}

// ── Handler seam ──────────────────────────────────────────────────────────────

/// Turns one decoded request into one response.
///
/// Implemented by [`Dispatcher`]; the session loop depends only on this trait
/// so it can be driven by a mock in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameHandler: Send + Sync {
    async fn handle(&self, variant: FrameVariant, frame: RequestFrame) -> ResponseFrame;
}

/// The production [`FrameHandler`].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    warehouse: Arc<Warehouse>,
}

impl Dispatcher {
    pub fn new(warehouse: Arc<Warehouse>) -> Self {
        Self { warehouse }
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    /// Runs a parsed request and returns the success payload.
    pub async fn execute(&self, request: Request) -> Result<Vec<u8>, DispatchError> {
        let wh = &*self.warehouse;
        match request {
            Request::SectorStock(id) => Ok(wh.store.stock(id)?.to_be_bytes().to_vec()),
            Request::AllStock => {
                let snap = wh.store.snapshot()?;
                Ok(be_u32s(SectorId::ALL.map(|id| snap.stock(id))))
            }
            Request::Cumulative => {
                let c = wh.store.counters()?;
                Ok(be_u32s([c.total_received, c.total_shipped]))
            }
            Request::Receive { qty, echo_stock } => {
                let report = wh
                    .store
                    .receive_items(qty, wh.sensor.as_ref(), wh.auto_classify)?;
                info!(
                    qty,
                    placed = report.placed_total(),
                    receiving = report.receiving_stock,
                    "items received"
                );
                if echo_stock {
                    Ok(report.receiving_stock.to_be_bytes().to_vec())
                } else {
                    Ok(Vec::new())
                }
            }
            Request::ShipOne(color) => {
                wh.store.ship_from_storage(color)?;
                Ok(Vec::new())
            }
            Request::Classify(color) => {
                wh.store.classify_and_store(color)?;
                Ok(Vec::new())
            }
            Request::ShipItems { red, green, yellow } => {
                wh.store
                    .ship_items(u32::from(red), u32::from(green), u32::from(yellow))?;
                info!(red, green, yellow, "items shipped");
                Ok(Vec::new())
            }
            Request::Clear(scope) => {
                wh.store.clear(scope)?;
                info!(?scope, "sectors cleared");
                Ok(Vec::new())
            }
            Request::MoveRobot(target) => robot_result(wh.robot.move_to(target).await),
            Request::ReturnHome => robot_result(wh.robot.return_home().await),
            Request::ActuatorTest(actuator) => {
                wh.robot.run_actuator_test(actuator).await;
                Ok(Vec::new())
            }
            Request::RequestAll => Ok(all_update_payload(&wh.store.snapshot()?)),
            Request::RegionalCounters => {
                let c = wh.store.counters()?;
                let values = ItemColor::STORED
                    .iter()
                    .flat_map(|&color| {
                        let cc = c.color(color);
                        [cc.received, cc.shipped]
                    })
                    .collect::<Vec<_>>();
                Ok(be_u16s_saturating(&values))
            }
        }
    }
}

#[async_trait]
impl FrameHandler for Dispatcher {
    async fn handle(&self, variant: FrameVariant, frame: RequestFrame) -> ResponseFrame {
        let code = response_code(variant, &frame.command);

        let result = match Request::parse(variant, &frame) {
            Ok(request) => {
                debug!(%variant, ?request, "dispatching");
                // A panicking operation must still produce a response.
                let this = self.clone();
                match tokio::spawn(async move { this.execute(request).await }).await {
                    Ok(result) => result,
                    Err(e) => Err(DispatchError::Internal(format!("request handler panicked: {e}"))),
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(payload) => ResponseFrame::success(code, payload),
            Err(e) => {
                match &e {
                    DispatchError::Internal(_) => {
                        error!(%variant, command = %frame.command, error = %e, "request failed")
                    }
                    DispatchError::UnknownCommand(_) | DispatchError::InvalidData(_) => {
                        warn!(%variant, command = %frame.command, error = %e, "request rejected")
                    }
                    _ => debug!(%variant, command = %frame.command, error = %e, "request refused"),
                }
                ResponseFrame::status_only(code, e.status())
            }
        }
    }
}

// ── Payload builders ──────────────────────────────────────────────────────────

fn robot_result(outcome: MoveOutcome) -> Result<Vec<u8>, DispatchError> {
    if outcome.is_success() {
        Ok(Vec::new())
    } else {
        Err(DispatchError::Robot(outcome))
    }
}

fn be_u32s<const N: usize>(values: [u32; N]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

fn be_u16s_saturating(values: &[u32]) -> Vec<u8> {
    values
        .iter()
        .flat_map(|&v| u16::try_from(v).unwrap_or(u16::MAX).to_be_bytes())
        .collect()
}

/// `AU` payload: five stocks, total received, total shipped (u16 each).
fn all_update_payload(snap: &WarehouseSnapshot) -> Vec<u8> {
    let mut values: Vec<u32> = SectorId::ALL.iter().map(|&id| snap.stock(id)).collect();
    values.push(snap.counters.total_received);
    values.push(snap.counters.total_shipped);
    be_u16s_saturating(&values)
}
